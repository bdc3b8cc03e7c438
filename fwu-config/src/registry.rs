use std::{collections::BTreeSet, path::Path};

use crate::{Catalogue, Error, FlashProfile, Result, catalogue};

/// Lookup of projects by name.
///
/// The user catalogue is overlaid on top of the built-in one, so a user project shadows a
/// built-in project with the same name. The registry is immutable once constructed. Reloading
/// means constructing a new one.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    user: Catalogue,
    builtin: Catalogue,
}

impl ProjectRegistry {
    pub fn new(user: Catalogue) -> Self {
        Self {
            user,
            builtin: catalogue::builtin(),
        }
    }

    /// Load the user catalogue from `path`. Never fails: without a usable file only the built-in
    /// projects are available.
    pub fn load(path: Option<&Path>) -> Self {
        Self::new(path.map(catalogue::load).unwrap_or_default())
    }

    pub fn resolve(&self, name: &str) -> Result<&FlashProfile> {
        self.user
            .get(name)
            .or_else(|| self.builtin.get(name))
            .ok_or_else(|| Error::UnknownProject(name.to_string()))
    }

    /// Sorted project names. Built-in projects are only listed with `include_builtins`.
    pub fn list_names(&self, include_builtins: bool) -> Vec<&str> {
        if include_builtins {
            self.user
                .keys()
                .chain(self.builtin.keys())
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            self.user.keys().map(String::as_str).collect()
        }
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new(Catalogue::new())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, num::NonZeroU32};

    use super::*;

    fn user_catalogue() -> Catalogue {
        let mut c = Catalogue::new();
        c.insert(
            "ESP32 - Generic".to_string(),
            FlashProfile::esptool(
                "esp32",
                NonZeroU32::new(921600).unwrap(),
                "0x1000",
                Some("CP2102"),
            ),
        );
        c.insert(
            "Beacon".to_string(),
            FlashProfile::avrdude(
                "atmega32u4",
                NonZeroU32::new(57600).unwrap(),
                "avr109",
                None,
            ),
        );
        c
    }

    #[test]
    fn unknown_project() {
        for r in [ProjectRegistry::default(), ProjectRegistry::new(user_catalogue())] {
            assert!(matches!(
                r.resolve("nonexistent"),
                Err(Error::UnknownProject(x)) if x == "nonexistent"
            ));
        }
    }

    #[test]
    fn builtins_without_user_catalogue() {
        let r = ProjectRegistry::default();

        assert!(r.list_names(false).is_empty());
        assert_eq!(r.list_names(true).len(), 7);
        assert_eq!(r.resolve("Arduino Uno").unwrap().chip, "atmega328p");
    }

    #[test]
    fn user_shadows_builtin() {
        let r = ProjectRegistry::new(user_catalogue());
        let p = r.resolve("ESP32 - Generic").unwrap();

        assert_eq!(p.address.as_deref(), Some("0x1000"));
        assert_eq!(p.baud.get(), 921600);
        // Builtin still reachable
        assert_eq!(r.resolve("ESP32-S3").unwrap().chip, "esp32s3");
    }

    #[test]
    fn names_sorted_and_deduplicated() {
        let r = ProjectRegistry::new(user_catalogue());

        assert_eq!(r.list_names(false), ["Beacon", "ESP32 - Generic"]);

        let all = r.list_names(true);
        assert_eq!(all.len(), 8);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all[0], "Arduino Nano");
    }

    #[test]
    fn reload_is_idempotent() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(catalogue::to_json(&user_catalogue()).unwrap().as_bytes())
            .unwrap();

        let a = ProjectRegistry::load(Some(f.path()));
        let b = ProjectRegistry::load(Some(f.path()));

        assert_eq!(
            a.resolve("ESP32 - Generic").unwrap(),
            b.resolve("ESP32 - Generic").unwrap()
        );
        assert_eq!(a.list_names(true), b.list_names(true));
    }

    #[test]
    fn malformed_source_keeps_builtins() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"not json").unwrap();

        let r = ProjectRegistry::load(Some(f.path()));
        assert!(r.list_names(false).is_empty());
        assert!(r.resolve("ESP32-C3").is_ok());
    }
}
