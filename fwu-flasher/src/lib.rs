//! # Introduction
//!
//! This crate flashes firmware to microcontroller boards by driving the external flashing tools
//! (esptool and avrdude) as child processes. It streams the tool output live, resolves a usable
//! Python interpreter for esptool and suggests a serial port for a project.
//!
//! # Usage
//!
//! ```no_run
//! use fwu_config::ProjectRegistry;
//! use fwu_flasher::{FlashRequest, Orchestrator, ToolLayout};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ProjectRegistry::load(None);
//!     let profile = registry.resolve("ESP32 - Generic").unwrap().clone();
//!
//!     let ports = fwu_flasher::ports::refresh_ports();
//!     let port = fwu_flasher::ports::select_best(&ports, profile.port_hint()).unwrap();
//!     let request = FlashRequest::new(profile, "/tmp/app.bin", port);
//!
//!     let orchestrator = Orchestrator::new(ToolLayout::from_tools_dir("tools".as_ref()));
//!     let res = orchestrator.flash(request, None).await.unwrap();
//!
//!     println!("{res}");
//! }
//! ```

mod command;
mod common;
mod error;
mod helpers;
mod orchestrator;
pub mod ports;
pub mod process;
pub mod resolver;

pub use command::{AVRDUDE_CONFIG, ESPTOOL_SCRIPT, ToolLayout, tool_args};
pub use common::*;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
