//! Flash profile of a single project.

use std::{fmt::Display, num::NonZeroU32};

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use thiserror::Error;

/// External utility used to flash a board.
///
/// Tool names not known to this crate are kept as [`Tool::Other`], so that a catalogue with a
/// typo in one project still loads. Such projects fail when flashing is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Tool {
    Esptool,
    Avrdude,
    Other(Box<str>),
}

impl Tool {
    /// File types (extensions) accepted by the tool. Can be used for filtering local files in
    /// applications
    pub const fn file_types(&self) -> &'static [&'static str] {
        match self {
            Tool::Esptool => &["bin"],
            Tool::Avrdude => &["hex", "bin"],
            Tool::Other(_) => &["bin", "hex"],
        }
    }
}

impl From<String> for Tool {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "esptool" => Self::Esptool,
            "avrdude" => Self::Avrdude,
            _ => Self::Other(value.into_boxed_str()),
        }
    }
}

impl From<Tool> for String {
    fn from(value: Tool) -> Self {
        value.to_string()
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tool::Esptool => f.write_str("esptool"),
            Tool::Avrdude => f.write_str("avrdude"),
            Tool::Other(x) => f.write_str(x),
        }
    }
}

/// Everything needed to flash one project.
///
/// Mirrors an entry of the project catalogue JSON:
///
/// ```json
/// {
///   "chip": "esp32",
///   "tool": "esptool",
///   "baud": "921600",
///   "address": "0x10000",
///   "port_hint": "CH9102"
/// }
/// ```
///
/// `baud` is written as a string, but a JSON number is accepted as well.
#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FlashProfile {
    pub chip: String,
    pub tool: Tool,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub baud: NonZeroU32,
    /// Flash offset. Only for [`Tool::Esptool`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// avrdude programmer id. Only for [`Tool::Avrdude`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programmer: Option<String>,
    /// Whitespace separated keywords expected in the serial port description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_hint: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Unsupported tool: {0}")]
    UnsupportedTool(Box<str>),
    #[error("Profile for {tool} requires `{field}`")]
    MissingField { tool: Tool, field: &'static str },
    #[error("Profile for {tool} does not accept `{field}`")]
    UnexpectedField { tool: Tool, field: &'static str },
}

impl FlashProfile {
    pub fn esptool(chip: &str, baud: NonZeroU32, address: &str, port_hint: Option<&str>) -> Self {
        Self {
            chip: chip.to_string(),
            tool: Tool::Esptool,
            baud,
            address: Some(address.to_string()),
            programmer: None,
            port_hint: port_hint.map(str::to_string),
        }
    }

    pub fn avrdude(chip: &str, baud: NonZeroU32, programmer: &str, port_hint: Option<&str>) -> Self {
        Self {
            chip: chip.to_string(),
            tool: Tool::Avrdude,
            baud,
            address: None,
            programmer: Some(programmer.to_string()),
            port_hint: port_hint.map(str::to_string),
        }
    }

    /// Check that exactly the fields required by [`FlashProfile::tool`] are populated.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let (required, forbidden) = match &self.tool {
            Tool::Esptool => (
                ("address", self.address.as_deref()),
                ("programmer", self.programmer.as_deref()),
            ),
            Tool::Avrdude => (
                ("programmer", self.programmer.as_deref()),
                ("address", self.address.as_deref()),
            ),
            Tool::Other(x) => return Err(ProfileError::UnsupportedTool(x.clone())),
        };

        if self.chip.trim().is_empty() {
            return Err(ProfileError::MissingField {
                tool: self.tool.clone(),
                field: "chip",
            });
        }

        match required.1 {
            Some(x) if !x.trim().is_empty() => {}
            _ => {
                return Err(ProfileError::MissingField {
                    tool: self.tool.clone(),
                    field: required.0,
                });
            }
        }

        if forbidden.1.is_some() {
            return Err(ProfileError::UnexpectedField {
                tool: self.tool.clone(),
                field: forbidden.0,
            });
        }

        Ok(())
    }

    /// Port hint, ignoring blank ones.
    pub fn port_hint(&self) -> Option<&str> {
        self.port_hint.as_deref().filter(|x| !x.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAUD: NonZeroU32 = NonZeroU32::new(115200).unwrap();

    #[test]
    fn baud_as_string_or_number() {
        let a: FlashProfile = serde_json::from_str(
            r#"{"chip": "esp32", "tool": "esptool", "baud": "921600", "address": "0x10000"}"#,
        )
        .unwrap();
        let b: FlashProfile = serde_json::from_str(
            r#"{"chip": "esp32", "tool": "esptool", "baud": 921600, "address": "0x10000"}"#,
        )
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.baud.get(), 921600);
        assert!(a.port_hint.is_none());
    }

    #[test]
    fn zero_baud_rejected() {
        let res = serde_json::from_str::<FlashProfile>(
            r#"{"chip": "esp32", "tool": "esptool", "baud": "0", "address": "0x0"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn baud_serialized_as_string() {
        let p = FlashProfile::avrdude("atmega2560", BAUD, "wiring", Some("Arduino Mega"));
        let json = serde_json::to_value(&p).unwrap();

        assert_eq!(json["baud"], "115200");
        assert_eq!(json["tool"], "avrdude");
        assert!(json.get("address").is_none());
    }

    #[test]
    fn unknown_tool_is_kept() {
        let p: FlashProfile = serde_json::from_str(
            r#"{"chip": "rp2040", "tool": "picotool", "baud": "115200"}"#,
        )
        .unwrap();

        assert_eq!(p.tool, Tool::Other("picotool".into()));
        assert_eq!(
            p.validate(),
            Err(ProfileError::UnsupportedTool("picotool".into()))
        );
    }

    #[test]
    fn tool_name_case_insensitive() {
        assert_eq!(Tool::from("ESPTool".to_string()), Tool::Esptool);
        assert_eq!(Tool::from(" avrdude ".to_string()), Tool::Avrdude);
    }

    #[test]
    fn validate_required_fields() {
        assert!(FlashProfile::esptool("esp32", BAUD, "0x10000", None).validate().is_ok());
        assert!(FlashProfile::avrdude("atmega328p", BAUD, "arduino", None).validate().is_ok());

        let mut p = FlashProfile::esptool("esp32", BAUD, "0x10000", None);
        p.address = None;
        assert_eq!(
            p.validate(),
            Err(ProfileError::MissingField {
                tool: Tool::Esptool,
                field: "address"
            })
        );

        let mut p = FlashProfile::avrdude("atmega328p", BAUD, "arduino", None);
        p.address = Some("0x0".to_string());
        assert_eq!(
            p.validate(),
            Err(ProfileError::UnexpectedField {
                tool: Tool::Avrdude,
                field: "address"
            })
        );

        let mut p = FlashProfile::avrdude("atmega328p", BAUD, "arduino", None);
        p.programmer = Some("  ".to_string());
        assert!(matches!(
            p.validate(),
            Err(ProfileError::MissingField {
                field: "programmer",
                ..
            })
        ));
    }

    #[test]
    fn blank_port_hint() {
        let p = FlashProfile::esptool("esp32", BAUD, "0x0", Some("   "));
        assert!(p.port_hint().is_none());
    }
}
