//! Command lines of the supported tools.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use fwu_config::{FlashProfile, ProfileError, Tool};

use crate::{process::user_local_bin, resolver::default_interpreter_candidates};

/// Launcher script running the bundled esptool, relative to the tools directory.
pub const ESPTOOL_SCRIPT: &str = "esptool_launcher.py";
/// avrdude configuration shipped with bundled avrdude builds, relative to the tools directory.
pub const AVRDUDE_CONFIG: &str = "avrdude.conf";

/// Where the tools live on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLayout {
    /// Python script started with the interpreter for [`Tool::Esptool`]
    pub esptool_script: PathBuf,
    /// Interpreters to try for the esptool script, in order
    pub interpreter_candidates: Vec<String>,
    /// avrdude executable
    pub avrdude: String,
    /// Passed to avrdude as `-C` when set
    pub avrdude_config: Option<PathBuf>,
    /// Directories prepended to `PATH` for the tool processes
    pub search_paths: Vec<PathBuf>,
}

impl ToolLayout {
    /// Layout for a tools directory containing [`ESPTOOL_SCRIPT`] and optionally
    /// [`AVRDUDE_CONFIG`] and an avrdude executable.
    pub fn from_tools_dir(dir: &Path) -> Self {
        let avrdude_config = Some(dir.join(AVRDUDE_CONFIG)).filter(|x| x.is_file());
        let search_paths = user_local_bin()
            .into_iter()
            .chain(Some(dir.to_path_buf()).filter(|x| x.is_dir()))
            .collect();

        Self {
            esptool_script: dir.join(ESPTOOL_SCRIPT),
            interpreter_candidates: default_interpreter_candidates(),
            avrdude: "avrdude".to_string(),
            avrdude_config,
            search_paths,
        }
    }
}

/// Arguments for the flashing tool of `profile`, excluding the program itself and, for esptool,
/// the launcher script.
///
/// - esptool: `--chip <chip> --baud <baud> --port <port> write-flash <address> <firmware>`
/// - avrdude: `-c <programmer> -p <chip> -P <port> -b <baud> -D -U flash:w:<firmware>:i`
pub fn tool_args(
    profile: &FlashProfile,
    port: &str,
    firmware: &Path,
) -> Result<Vec<OsString>, ProfileError> {
    profile.validate()?;

    let baud = profile.baud.to_string();

    let args: Vec<OsString> = match (&profile.tool, &profile.address, &profile.programmer) {
        (Tool::Esptool, Some(address), _) => vec![
            "--chip".into(),
            profile.chip.as_str().into(),
            "--baud".into(),
            baud.into(),
            "--port".into(),
            port.into(),
            "write-flash".into(),
            address.as_str().into(),
            firmware.into(),
        ],
        (Tool::Avrdude, _, Some(programmer)) => {
            let mut flash_op = OsString::from("flash:w:");
            flash_op.push(firmware);
            flash_op.push(":i");

            vec![
                "-c".into(),
                programmer.as_str().into(),
                "-p".into(),
                profile.chip.as_str().into(),
                "-P".into(),
                port.into(),
                "-b".into(),
                baud.into(),
                "-D".into(),
                "-U".into(),
                flash_op,
            ]
        }
        // `validate` ensures the fields are present
        (tool, _, _) => return Err(ProfileError::UnsupportedTool(tool.to_string().into())),
    };

    Ok(args)
}
