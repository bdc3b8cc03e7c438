//! Project catalogues: the user supplied JSON file, the compiled-in generic boards and the sample
//! catalogue offered for export.

use std::{collections::BTreeMap, num::NonZeroU32, path::Path};

use tracing::{info, warn};

use crate::{FlashProfile, Result};

/// Mapping from project name to its [`FlashProfile`]. Iterates in name order.
pub type Catalogue = BTreeMap<String, FlashProfile>;

const BAUD_460800: NonZeroU32 = NonZeroU32::new(460800).unwrap();
const BAUD_921600: NonZeroU32 = NonZeroU32::new(921600).unwrap();
const BAUD_115200: NonZeroU32 = NonZeroU32::new(115200).unwrap();
const BAUD_57600: NonZeroU32 = NonZeroU32::new(57600).unwrap();

/// Parse a catalogue (JSON object of objects).
pub fn from_json(data: &[u8]) -> serde_json::Result<Catalogue> {
    serde_json::from_slice(data)
}

/// Pretty printed JSON for a catalogue.
pub fn to_json(catalogue: &Catalogue) -> serde_json::Result<String> {
    serde_json::to_string_pretty(catalogue)
}

/// Read and parse a catalogue file.
pub fn try_load(path: &Path) -> Result<Catalogue> {
    let data = std::fs::read(path)?;
    let catalogue = from_json(&data)?;

    for (name, profile) in &catalogue {
        if let Err(e) = profile.validate() {
            warn!("Project {name:?} in {path:?} will not be flashable: {e}");
        }
    }

    Ok(catalogue)
}

/// Read a catalogue file, falling back to an empty catalogue on any failure.
///
/// Missing, unreadable or malformed files are logged and treated as an empty catalogue.
pub fn load(path: &Path) -> Catalogue {
    match try_load(path) {
        Ok(x) => {
            info!("Loaded {} project(s) from {:?}", x.len(), path);
            x
        }
        Err(crate::Error::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No project catalogue at {:?}, only built-in projects are available", path);
            Catalogue::new()
        }
        Err(e) => {
            warn!("Could not load {:?}: {}", path, e);
            Catalogue::new()
        }
    }
}

/// Generic boards which are always available, regardless of the user catalogue.
pub fn builtin() -> Catalogue {
    [
        (
            "ESP32 - Generic",
            FlashProfile::esptool("esp32", BAUD_460800, "0x10000", Some("CH9102")),
        ),
        (
            "ESP32-S3",
            FlashProfile::esptool("esp32s3", BAUD_460800, "0x10000", Some("USB JTAG")),
        ),
        (
            "ESP32-C3",
            FlashProfile::esptool("esp32c3", BAUD_460800, "0x0", Some("USB JTAG")),
        ),
        (
            "Olimex ESP32-POE-ISO",
            FlashProfile::esptool("esp32", BAUD_460800, "0x10000", Some("CH340 or FT232")),
        ),
        (
            "Arduino Uno",
            FlashProfile::avrdude("atmega328p", BAUD_115200, "arduino", Some("Arduino Uno")),
        ),
        (
            "Arduino Nano",
            FlashProfile::avrdude("atmega328p", BAUD_57600, "arduino", Some("CH340")),
        ),
        (
            "Arduino Nano (Old Bootloader)",
            FlashProfile::avrdude("atmega328p", BAUD_57600, "arduino", Some("FT232")),
        ),
    ]
    .into_iter()
    .map(|(name, profile)| (name.to_string(), profile))
    .collect()
}

/// Example catalogue users can export and edit.
pub fn sample() -> Catalogue {
    [
        (
            "Custom ESP32 Project",
            FlashProfile::esptool("esp32", BAUD_921600, "0x10000", Some("CH9102")),
        ),
        (
            "Custom Arduino Mega",
            FlashProfile::avrdude("atmega2560", BAUD_115200, "wiring", Some("Arduino Mega")),
        ),
    ]
    .into_iter()
    .map(|(name, profile)| (name.to_string(), profile))
    .collect()
}

/// [`sample`] as pretty printed JSON, ready to be written to a file.
pub fn sample_json() -> String {
    to_json(&sample()).expect("sample catalogue is always serializable")
}

/// Write the sample catalogue to `path`, replacing any existing file.
pub fn export_sample(path: &Path) -> Result<()> {
    std::fs::write(path, sample_json())?;
    info!("Sample catalogue written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::Tool;

    #[test]
    fn builtin_profiles_valid() {
        let c = builtin();

        assert_eq!(c.len(), 7);
        for (name, p) in &c {
            assert!(p.validate().is_ok(), "{name} is invalid");
        }

        assert_eq!(c["ESP32-C3"].address.as_deref(), Some("0x0"));
        assert_eq!(c["Arduino Nano"].baud.get(), 57600);
    }

    #[test]
    fn sample_round_trips() {
        let json = sample_json();
        let parsed = from_json(json.as_bytes()).unwrap();

        assert_eq!(parsed, sample());
        assert!(json.contains(r#""baud": "921600""#));
        assert!(json.contains(r#""programmer": "wiring""#));
    }

    #[test]
    fn export_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::SAMPLE_FILE_NAME);

        export_sample(&path).unwrap();
        assert_eq!(load(&path), sample());
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let c = load(&dir.path().join("projects_config.json"));
        assert!(c.is_empty());
    }

    #[test]
    fn load_malformed_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{ \"Broken\": { \"chip\": ").unwrap();

        assert!(matches!(try_load(f.path()), Err(crate::Error::JsonError(_))));
        assert!(load(f.path()).is_empty());
    }

    #[test]
    fn load_user_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            br#"{
                "Lab Sensor": {
                    "chip": "esp32s3",
                    "tool": "esptool",
                    "baud": "921600",
                    "address": "0x0",
                    "port_hint": "USB JTAG"
                },
                "Weird": { "chip": "x", "tool": "stlink", "baud": 9600 }
            }"#,
        )
        .unwrap();

        let c = load(f.path());
        assert_eq!(c.len(), 2);
        assert_eq!(c["Lab Sensor"].chip, "esp32s3");
        assert_eq!(c["Weird"].tool, Tool::Other("stlink".into()));
    }
}
