//! Capture sidecar metadata.
//!
//! Each capture can optionally record a companion JSON file next to the
//! image, holding the image filename, the capture instant, the instrument
//! identity, and user-supplied key/value fields (e.g. part number, test
//! name, operator notes). The sidecar makes a directory of screenshots
//! self-describing long after the bench is torn down.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata recorded alongside a captured screenshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureMetadata {
    /// Filename of the image this sidecar describes.
    pub image_file: String,
    /// Capture instant.
    pub captured_at: DateTime<Local>,
    /// `*IDN?` response of the instrument that produced the image.
    pub instrument: String,
    /// User-supplied key/value fields.
    pub fields: BTreeMap<String, String>,
    /// Version of the capture software.
    pub software_version: String,
}

impl CaptureMetadata {
    /// Sidecar path for an image: `{stem}_metadata.json` in the same directory.
    pub fn sidecar_path(image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        image_path.with_file_name(format!("{stem}_metadata.json"))
    }
}

/// A builder for constructing `CaptureMetadata` instances.
#[derive(Debug, Clone, Default)]
pub struct CaptureMetadataBuilder {
    fields: BTreeMap<String, String>,
}

impl CaptureMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn fields<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.fields.insert(k.into(), v.into());
        }
        self
    }

    /// Finish the sidecar with the capture-time facts supplied by the backend.
    pub fn build(
        self,
        image_path: &Path,
        captured_at: DateTime<Local>,
        instrument: &str,
    ) -> CaptureMetadata {
        CaptureMetadata {
            image_file: image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            captured_at,
            instrument: instrument.to_string(),
            fields: self.fields,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sidecar_path() {
        let image = Path::new("/data/scope/bringup_001.png");
        assert_eq!(
            CaptureMetadata::sidecar_path(image),
            PathBuf::from("/data/scope/bringup_001_metadata.json")
        );
    }

    #[test]
    fn test_builder_collects_fields() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        let meta = CaptureMetadataBuilder::new()
            .field("part_number", "IC123")
            .field("test", "TestA")
            .build(Path::new("/data/bringup_001.png"), now, "TEKTRONIX,MSO54");

        assert_eq!(meta.image_file, "bringup_001.png");
        assert_eq!(meta.fields["part_number"], "IC123");
        assert_eq!(meta.captured_at, now);
    }

    #[test]
    fn test_metadata_roundtrips_through_json() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
        let meta = CaptureMetadataBuilder::new()
            .field("operator", "bs")
            .build(Path::new("cap.png"), now, "TEKTRONIX,MSO54");

        let rendered = serde_json::to_string_pretty(&meta).unwrap();
        let parsed: CaptureMetadata = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, meta);
    }
}
