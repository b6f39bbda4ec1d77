//! File naming policy.
//!
//! Derives the next destination path for a capture from the current
//! settings, the auto-increment counter, and the capture-time wall clock.
//! This module performs no filesystem side effects; directory creation and
//! writing belong to the capture backend.
//!
//! ## Naming modes
//!
//! - `Fixed`: `{base}.{ext}` — repeated captures overwrite.
//! - `AutoIncrement`: `{base}_{NNN}.{ext}` — counter zero-padded to at
//!   least three digits, growing naturally past 999.
//! - `Datestamp`: `{base}_{YYYY.MM.DD_HH.MM.SS}.{ext}` — the timestamp is
//!   the capture instant, not the configuration-save instant.
//!
//! ## Directory layouts
//!
//! `Basic` uses the save directory as-is. `Engineering` appends two fixed
//! levels (part number, then test name). `Advanced` appends an arbitrary
//! number of levels, each formed by joining its non-empty field values
//! with underscores; a level with no non-empty fields is dropped.
//!
//! Field values and the base filename are rejected with a `Naming` error if
//! they contain characters the common filesystems disallow.

use crate::config::{DirectoryLayout, FileFormat, Settings};
use crate::error::{AppResult, ScopeError};
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// Characters rejected in filenames and layout field values.
pub const ILLEGAL_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Three-valued naming mode collapsing the two exclusive settings flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingMode {
    Fixed,
    AutoIncrement,
    Datestamp,
}

/// Reject values containing filesystem-hostile characters.
fn validate_component(what: &str, value: &str) -> AppResult<()> {
    if let Some(bad) = value.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
        return Err(ScopeError::Naming(format!(
            "{what} '{value}' contains illegal character '{bad}'"
        )));
    }
    Ok(())
}

/// Build the subdirectory levels for the configured layout, relative to the
/// save directory.
pub fn layout_subdirectory(layout: &DirectoryLayout) -> AppResult<PathBuf> {
    let mut sub = PathBuf::new();
    match layout {
        DirectoryLayout::Basic => {}
        DirectoryLayout::Engineering { part_number, test } => {
            for (what, value) in [("IC part number", part_number), ("test name", test)] {
                if value.is_empty() {
                    return Err(ScopeError::Naming(format!("{what} must not be empty")));
                }
                validate_component(what, value)?;
                sub.push(value);
            }
        }
        DirectoryLayout::Advanced { levels } => {
            for level in levels {
                let mut parts = Vec::new();
                for field in level {
                    if field.is_empty() {
                        continue;
                    }
                    validate_component("layout field", field)?;
                    parts.push(field.as_str());
                }
                if !parts.is_empty() {
                    sub.push(parts.join("_"));
                }
            }
        }
    }
    Ok(sub)
}

/// Derive the next filename for the given mode.
///
/// `counter` is the current (not yet committed) auto-increment value and
/// `now` is the capture instant.
pub fn next_filename(
    base: &str,
    mode: NamingMode,
    counter: u32,
    format: FileFormat,
    now: DateTime<Local>,
) -> AppResult<String> {
    if base.is_empty() {
        return Err(ScopeError::Naming(
            "default filename must not be empty".to_string(),
        ));
    }
    validate_component("filename", base)?;

    let ext = format.extension();
    let name = match mode {
        NamingMode::Fixed => format!("{base}.{ext}"),
        NamingMode::AutoIncrement => format!("{base}_{counter:03}.{ext}"),
        NamingMode::Datestamp => {
            format!("{base}_{}.{ext}", now.format("%Y.%m.%d_%H.%M.%S"))
        }
    };
    Ok(name)
}

/// Resolve the full destination path for a capture taken at `now`.
///
/// Pure with respect to the filesystem; the backend creates missing
/// directories before writing.
pub fn next_path(settings: &Settings, now: DateTime<Local>) -> AppResult<PathBuf> {
    let filename = next_filename(
        &settings.default_filename,
        settings.naming_mode(),
        settings.auto_increment_counter,
        settings.file_format,
        now,
    )?;
    let mut path = settings.save_directory.clone();
    path.push(layout_subdirectory(&settings.layout)?);
    path.push(filename);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_instant() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_fixed_name() {
        let name =
            next_filename("capture", NamingMode::Fixed, 1, FileFormat::Png, fixed_instant())
                .unwrap();
        assert_eq!(name, "capture.png");
    }

    #[test]
    fn test_auto_increment_zero_padding() {
        for (counter, expected) in [(1, "capture_001.png"), (42, "capture_042.png")] {
            let name = next_filename(
                "capture",
                NamingMode::AutoIncrement,
                counter,
                FileFormat::Png,
                fixed_instant(),
            )
            .unwrap();
            assert_eq!(name, expected);
        }
    }

    #[test]
    fn test_auto_increment_past_999() {
        let name = next_filename(
            "capture",
            NamingMode::AutoIncrement,
            1000,
            FileFormat::Png,
            fixed_instant(),
        )
        .unwrap();
        assert_eq!(name, "capture_1000.png");
    }

    #[test]
    fn test_datestamp_uses_capture_instant() {
        let name = next_filename(
            "capture",
            NamingMode::Datestamp,
            1,
            FileFormat::Png,
            fixed_instant(),
        )
        .unwrap();
        assert_eq!(name, "capture_2024.03.07_14.05.09.png");
    }

    #[test]
    fn test_empty_filename_rejected() {
        let result =
            next_filename("", NamingMode::Fixed, 1, FileFormat::Png, fixed_instant());
        assert!(matches!(result, Err(ScopeError::Naming(_))));
    }

    #[test]
    fn test_illegal_characters_rejected() {
        for bad in ILLEGAL_CHARS {
            let base = format!("cap{bad}ture");
            let result = next_filename(
                &base,
                NamingMode::Fixed,
                1,
                FileFormat::Png,
                fixed_instant(),
            );
            assert!(
                matches!(result, Err(ScopeError::Naming(_))),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_basic_layout_is_flat() {
        let sub = layout_subdirectory(&DirectoryLayout::Basic).unwrap();
        assert_eq!(sub, PathBuf::new());
    }

    #[test]
    fn test_engineering_layout_two_levels() {
        let layout = DirectoryLayout::Engineering {
            part_number: "IC123".to_string(),
            test: "TestA".to_string(),
        };
        assert_eq!(layout_subdirectory(&layout).unwrap(), PathBuf::from("IC123/TestA"));
    }

    #[test]
    fn test_engineering_layout_requires_fields() {
        let layout = DirectoryLayout::Engineering {
            part_number: String::new(),
            test: "TestA".to_string(),
        };
        assert!(matches!(
            layout_subdirectory(&layout),
            Err(ScopeError::Naming(_))
        ));
    }

    #[test]
    fn test_advanced_layout_joins_fields() {
        let layout = DirectoryLayout::Advanced {
            levels: vec![
                vec!["IC123".to_string(), "TestA".to_string()],
                vec!["Run1".to_string()],
            ],
        };
        assert_eq!(
            layout_subdirectory(&layout).unwrap(),
            PathBuf::from("IC123_TestA/Run1")
        );
    }

    #[test]
    fn test_advanced_layout_omits_empty_fields_and_levels() {
        let layout = DirectoryLayout::Advanced {
            levels: vec![
                vec!["IC123".to_string(), String::new(), "TestA".to_string()],
                vec![String::new()],
                vec!["Run1".to_string()],
            ],
        };
        assert_eq!(
            layout_subdirectory(&layout).unwrap(),
            PathBuf::from("IC123_TestA/Run1")
        );
    }

    #[test]
    fn test_advanced_layout_rejects_illegal_field() {
        let layout = DirectoryLayout::Advanced {
            levels: vec![vec!["IC:123".to_string()]],
        };
        assert!(matches!(
            layout_subdirectory(&layout),
            Err(ScopeError::Naming(_))
        ));
    }

    #[test]
    fn test_next_path_composes_layout_and_filename() {
        let mut settings = Settings::default();
        settings.save_directory = PathBuf::from("/data/scope");
        settings.default_filename = "bringup".to_string();
        settings.set_auto_increment(true);
        settings.auto_increment_counter = 7;
        settings.layout = DirectoryLayout::Advanced {
            levels: vec![
                vec!["IC123".to_string(), "TestA".to_string()],
                vec!["Run1".to_string()],
            ],
        };

        let path = next_path(&settings, fixed_instant()).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/scope/IC123_TestA/Run1/bringup_007.png")
        );
    }
}
