use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::Architecture;
use crate::track::DEFAULT_FRAME_RATE;

/// Load and save options, usually read from a TOML file.
///
/// ```toml
/// frame_rate = 30.0
///
/// [import]
/// architecture = "x64"
///
/// [export]
/// big_endian = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sampling rate given to every loaded track.
    pub frame_rate: f32,
    pub import: ImportOverrides,
    pub export: ExportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            import: ImportOverrides::default(),
            export: ExportSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Serialize(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOverrides {
    /// Skips pointer width detection.
    pub architecture: Option<Architecture>,
    /// Looks layouts up under this version instead of the stored one.
    pub version: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub big_endian: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let s = Settings::from_toml("[export]\nbig_endian = true\n").unwrap();
        assert!(s.export.big_endian);
        assert_eq!(s.frame_rate, 60.0);
        assert_eq!(s.import, ImportOverrides::default());
    }

    #[test]
    fn overrides() {
        let s = Settings::from_toml(
            "frame_rate = 30.0\n[import]\narchitecture = \"x86\"\nversion = 67\n",
        )
        .unwrap();
        assert_eq!(s.import.architecture, Some(Architecture::X86));
        assert_eq!(s.import.version, Some(67));
        assert_eq!(s.frame_rate, 30.0);
        assert_eq!(Settings::from_toml(&s.to_toml().unwrap()).unwrap(), s);
    }

    #[test]
    fn bad_input() {
        assert!(matches!(
            Settings::from_toml("[import]\narchitecture = \"arm\"\n"),
            Err(Error::Config(_))
        ));
    }
}
