//! INI file configuration adapter.
//!
//! Section and key lookups are case-insensitive; `configparser` lowercases
//! both when reading.

use crate::domain::error::BarreplayError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BarreplayError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| BarreplayError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    /// Parses INI text held in memory, e.g. an embedded default profile.
    pub fn from_string(content: &str) -> Result<Self, BarreplayError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| BarreplayError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.ini.getfloat(section, key) {
            Ok(Some(value)) => value,
            _ => default,
        }
    }
}
