//! # Introduction
//!
//! Firmware Uploader flashes boards by delegating to existing tools (esptool, avrdude). Each
//! supported board is described by a named project, which carries everything needed to build the
//! tool invocation.
//!
//! This crate provides the [`FlashProfile`] data model, the JSON schema of the user project
//! catalogue, the compiled-in catalogue of generic boards and the [`ProjectRegistry`] which
//! overlays the two.
//!
//! # Usage
//!
//! ```no_run
//! let registry = fwu_config::ProjectRegistry::load(fwu_config::default_catalogue_path().as_deref());
//!
//! for name in registry.list_names(true) {
//!     println!("{name}");
//! }
//!
//! let profile = registry.resolve("ESP32 - Generic").unwrap();
//! assert_eq!(profile.chip, "esp32");
//! ```

pub mod catalogue;
mod error;
pub mod profile;
mod registry;

use std::path::PathBuf;

pub use catalogue::Catalogue;
pub use error::{Error, Result};
pub use profile::{FlashProfile, ProfileError, Tool};
pub use registry::ProjectRegistry;

/// File name of the user project catalogue
pub const CATALOGUE_FILE_NAME: &str = "projects_config.json";

/// File name suggested when exporting the sample catalogue
pub const SAMPLE_FILE_NAME: &str = "projects_config_sample.json";

pub const PACKAGE_QUALIFIER: (&str, &str, &str) = ("org", "fwu", "firmware-uploader");

/// Platform specific location of the user project catalogue.
pub fn default_catalogue_path() -> Option<PathBuf> {
    directories::ProjectDirs::from(PACKAGE_QUALIFIER.0, PACKAGE_QUALIFIER.1, PACKAGE_QUALIFIER.2)
        .map(|dirs| dirs.config_dir().join(CATALOGUE_FILE_NAME))
}
