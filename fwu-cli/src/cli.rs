use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Opt {
    #[command(subcommand)]
    /// Specifies the subcommand to execute.
    pub command: Commands,

    #[arg(long, global = true)]
    /// Project catalogue to use instead of the one in the user configuration directory.
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Directory containing the bundled tools. Defaults to `tools` beside the executable.
    pub tools_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flash firmware to a board using the settings of a project.
    Flash {
        #[arg(long)]
        /// Name of the project (see `list-projects`).
        project: String,

        #[arg(long)]
        /// Firmware file to flash (`.bin` for esptool, `.hex` or `.bin` for avrdude).
        firmware: PathBuf,

        #[arg(long)]
        /// Serial port of the board (e.g. `/dev/ttyUSB0`, `COM3`). Selected using the project
        /// port hint if not given.
        port: Option<String>,

        #[arg(long)]
        /// Do not print the tool output.
        quiet: bool,
    },

    /// List the available projects.
    ListProjects {
        #[arg(long)]
        /// Include the built-in generic boards.
        advanced: bool,
    },

    /// List serial ports.
    ListPorts {
        #[arg(long)]
        /// Mark the port that would be selected for this project.
        project: Option<String>,

        #[arg(long)]
        /// Only print paths separated by newline
        no_frills: bool,
    },

    /// Write an example project catalogue.
    ExportSampleConfig {
        /// Destination file (e.g. `projects_config_sample.json`).
        path: PathBuf,
    },

    /// Command to generate shell completion
    GenerateCompletion {
        /// Specifies the target shell type for completion
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opt::command().debug_assert();
    }

    #[test]
    fn flash_args() {
        let opt = Opt::parse_from([
            "fwu",
            "flash",
            "--project",
            "Arduino Uno",
            "--firmware",
            "blink.hex",
            "--tools-dir",
            "/opt/fwu/tools",
        ]);

        assert_eq!(opt.tools_dir, Some(PathBuf::from("/opt/fwu/tools")));
        match opt.command {
            Commands::Flash {
                project,
                firmware,
                port,
                quiet,
            } => {
                assert_eq!(project, "Arduino Uno");
                assert_eq!(firmware, PathBuf::from("blink.hex"));
                assert!(port.is_none());
                assert!(!quiet);
            }
            _ => panic!("Expected flash"),
        }
    }

    #[test]
    fn flash_requires_project() {
        assert!(Opt::try_parse_from(["fwu", "flash", "--firmware", "app.bin"]).is_err());
    }
}
