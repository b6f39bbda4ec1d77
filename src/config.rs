//! Application settings using Figment.
//!
//! Settings are loaded from a TOML file merged with environment variables
//! (prefixed with `SCOPE_CAPTURE_`), validated, and persisted back to the
//! same file so the auto-increment counter and recent-directory list
//! survive across sessions.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! SCOPE_CAPTURE_SAVE_DIRECTORY=/data/bench3
//! SCOPE_CAPTURE_DEFAULT_FILENAME=bringup
//! SCOPE_CAPTURE_DATESTAMP=true
//! ```
//!
//! # Example
//!
//! ```no_run
//! use scope_capture::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Saving to: {}", settings.save_directory.display());
//!     Ok(())
//! }
//! ```

use crate::error::{AppResult, ScopeError};
use crate::naming::NamingMode;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Number of entries kept in the recent-directory list.
const RECENT_DIRECTORIES_CAP: usize = 5;

/// Image file format for saved screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Png,
}

impl FileFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Png => "png",
        }
    }
}

/// Screenshot background color, where the instrument supports ink-saver mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundColor {
    #[default]
    White,
    Black,
}

/// Placement of the post-capture preview (consumed by the GUI collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Embedded,
    Floating,
    Hidden,
}

/// Preview size (consumed by the GUI collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Destination directory layout beneath `save_directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DirectoryLayout {
    /// Save directly into `save_directory`.
    #[default]
    Basic,
    /// Two fixed levels: part number, then test name.
    Engineering { part_number: String, test: String },
    /// Arbitrary levels; each level joins its non-empty fields with `_`.
    Advanced { levels: Vec<Vec<String>> },
}

/// Persisted application configuration.
///
/// `auto_increment` and `datestamp` are mutually exclusive. The two booleans
/// are kept on the external surface for the settings file and GUI, but all
/// internal consumers go through [`Settings::naming_mode`], which collapses
/// them into a single three-valued mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for saved screenshots.
    pub save_directory: PathBuf,
    /// Base filename, without extension.
    pub default_filename: String,
    /// Image format for saved screenshots.
    #[serde(default)]
    pub file_format: FileFormat,
    /// Screenshot background color.
    #[serde(default)]
    pub background_color: BackgroundColor,
    /// Append `_NNN` to filenames, incrementing after each capture.
    #[serde(default)]
    pub auto_increment: bool,
    /// Append a wall-clock datestamp to filenames.
    #[serde(default)]
    pub datestamp: bool,
    /// Also export waveform data alongside the screenshot. Currently a no-op.
    #[serde(default)]
    pub save_waveform: bool,
    /// Preview placement.
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Preview size.
    #[serde(default)]
    pub display_size: DisplaySize,
    /// Next value of the auto-increment counter.
    #[serde(default = "default_counter")]
    pub auto_increment_counter: u32,
    /// Most recently used save directories, newest first.
    #[serde(default)]
    pub recent_directories: Vec<PathBuf>,
    /// Subdirectory layout beneath `save_directory`.
    /// Kept last so the TOML table serializes after the scalar fields.
    #[serde(default)]
    pub layout: DirectoryLayout,
}

fn default_counter() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        let save_directory = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scope_capture");
        Self {
            save_directory,
            default_filename: "capture".to_string(),
            file_format: FileFormat::default(),
            background_color: BackgroundColor::default(),
            auto_increment: false,
            datestamp: false,
            save_waveform: false,
            display_mode: DisplayMode::default(),
            display_size: DisplaySize::default(),
            auto_increment_counter: default_counter(),
            layout: DirectoryLayout::default(),
            recent_directories: Vec::new(),
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scope-capture")
            .join("config.toml")
    }

    /// Load settings from the default location and environment variables.
    ///
    /// A missing file is not an error; defaults are used and the file is
    /// created on the first save.
    pub fn load() -> AppResult<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load settings from a specific file path, merged with environment
    /// variables (highest precedence).
    ///
    /// # Errors
    ///
    /// Returns a `ScopeError` if the file cannot be parsed or validation
    /// fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Figment::from(figment::providers::Serialized::defaults(
            Settings::default(),
        ))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("SCOPE_CAPTURE_"))
        .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Persist settings as pretty-printed TOML, creating parent directories
    /// as needed. The file is written via a temporary sibling and renamed
    /// into place so a crash mid-write cannot corrupt it.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let path = path.as_ref();
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| ScopeError::ConfigValidation(format!("Failed to render TOML: {e}")))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(rendered.as_bytes())?;
            tmp.persist(path).map_err(|e| ScopeError::Io(e.error))?;
        } else {
            std::fs::write(path, rendered)?;
        }
        log::debug!("Settings saved to '{}'.", path.display());
        Ok(())
    }

    /// Validate settings after loading.
    ///
    /// Checks that the naming flags are not both set and that the counter
    /// has not been hand-edited below its starting value.
    pub fn validate(&self) -> AppResult<()> {
        if self.auto_increment && self.datestamp {
            return Err(ScopeError::ConfigValidation(
                "'auto_increment' and 'datestamp' are mutually exclusive".to_string(),
            ));
        }
        if self.auto_increment_counter == 0 {
            return Err(ScopeError::ConfigValidation(
                "'auto_increment_counter' must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective naming mode derived from the two exclusive flags.
    pub fn naming_mode(&self) -> NamingMode {
        if self.datestamp {
            NamingMode::Datestamp
        } else if self.auto_increment {
            NamingMode::AutoIncrement
        } else {
            NamingMode::Fixed
        }
    }

    /// Enable or disable auto-increment naming. Enabling clears `datestamp`.
    pub fn set_auto_increment(&mut self, enabled: bool) {
        self.auto_increment = enabled;
        if enabled {
            self.datestamp = false;
        }
    }

    /// Enable or disable datestamp naming. Enabling clears `auto_increment`.
    pub fn set_datestamp(&mut self, enabled: bool) {
        self.datestamp = enabled;
        if enabled {
            self.auto_increment = false;
        }
    }

    /// Change the save directory, pushing the new value onto the
    /// recent-directory list (newest first, capped, deduplicated).
    pub fn set_save_directory<P: Into<PathBuf>>(&mut self, directory: P) {
        let directory = directory.into();
        self.recent_directories.retain(|d| d != &directory);
        self.recent_directories.insert(0, directory.clone());
        self.recent_directories.truncate(RECENT_DIRECTORIES_CAP);
        self.save_directory = directory;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_mutually_exclusive() {
        // From every starting state, setting one flag clears the other.
        for (ai, ds) in [(false, false), (true, false), (false, true)] {
            let mut settings = Settings {
                auto_increment: ai,
                datestamp: ds,
                ..Settings::default()
            };
            settings.set_auto_increment(true);
            assert!(settings.auto_increment);
            assert!(!settings.datestamp);

            let mut settings = Settings {
                auto_increment: ai,
                datestamp: ds,
                ..Settings::default()
            };
            settings.set_datestamp(true);
            assert!(settings.datestamp);
            assert!(!settings.auto_increment);
        }
    }

    #[test]
    fn test_both_flags_false_is_legal() {
        let mut settings = Settings::default();
        settings.set_auto_increment(false);
        settings.set_datestamp(false);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.naming_mode(), NamingMode::Fixed);
    }

    #[test]
    fn test_validate_rejects_dual_true() {
        let settings = Settings {
            auto_increment: true,
            datestamp: true,
            ..Settings::default()
        };
        let result = settings.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("mutually exclusive"));
    }

    #[test]
    fn test_validate_rejects_zero_counter() {
        let settings = Settings {
            auto_increment_counter: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_naming_mode_mapping() {
        let mut settings = Settings::default();
        assert_eq!(settings.naming_mode(), NamingMode::Fixed);
        settings.set_auto_increment(true);
        assert_eq!(settings.naming_mode(), NamingMode::AutoIncrement);
        settings.set_datestamp(true);
        assert_eq!(settings.naming_mode(), NamingMode::Datestamp);
    }

    #[test]
    fn test_recent_directories_capped_and_deduplicated() {
        let mut settings = Settings::default();
        for i in 0..7 {
            settings.set_save_directory(format!("/data/run{i}"));
        }
        assert_eq!(settings.recent_directories.len(), 5);
        assert_eq!(settings.recent_directories[0], PathBuf::from("/data/run6"));

        settings.set_save_directory("/data/run4");
        assert_eq!(settings.recent_directories.len(), 5);
        assert_eq!(settings.recent_directories[0], PathBuf::from("/data/run4"));
        let dups = settings
            .recent_directories
            .iter()
            .filter(|d| **d == PathBuf::from("/data/run4"))
            .count();
        assert_eq!(dups, 1);
    }

    #[test]
    fn test_roundtrip_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.set_datestamp(true);
        settings.auto_increment_counter = 42;
        settings.layout = DirectoryLayout::Engineering {
            part_number: "IC123".to_string(),
            test: "TestA".to_string(),
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(loaded.auto_increment_counter, 1);
        assert_eq!(loaded.file_format, FileFormat::Png);
    }
}
