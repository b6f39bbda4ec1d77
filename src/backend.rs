//! Capture backend.
//!
//! Coordinates the instrument connection lifecycle and the
//! capture-and-save operation, independent of any UI. The backend owns the
//! session handle and an explicit [`ConnectionState`] machine:
//!
//! ```text
//! Disconnected --scan/connect success--> Connected
//! Connected --disconnect/instrument lost--> Disconnected
//! any instrument failure --> Error (recoverable via scan/connect)
//! ```
//!
//! Naming and file-write failures abort a capture without touching the
//! connection state or the auto-increment counter; connection and
//! instrument failures transition to `Error` and are surfaced verbatim.
//!
//! Captures are synchronous: each runs to completion or failure before
//! control returns, and callers hold off issuing another until it does.

use crate::config::Settings;
use crate::error::{AppResult, ScopeError};
use crate::instrument::{InstrumentDescriptor, ScopeLink, ScopeSession};
use crate::metadata::{CaptureMetadata, CaptureMetadataBuilder};
use crate::naming::{self, NamingMode};
use chrono::{DateTime, Local};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Connection lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connected(InstrumentDescriptor),
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Result of a successful capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// Where the image was written.
    pub path: PathBuf,
    /// Capture instant (also used for datestamp naming).
    pub captured_at: DateTime<Local>,
    /// Size of the written image.
    pub bytes_written: usize,
}

/// Write `bytes` to `path` through a temporary sibling file renamed into
/// place, so no partial file is left behind on any failure path. Missing
/// directories are created first.
fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<usize> {
    let parent = path.parent().ok_or_else(|| {
        ScopeError::Naming(format!("Path '{}' has no parent directory", path.display()))
    })?;
    let file_write = |source| ScopeError::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(parent).map_err(file_write)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(file_write)?;
    tmp.write_all(bytes).map_err(file_write)?;
    tmp.persist(path).map_err(|e| file_write(e.error))?;
    Ok(bytes.len())
}

/// Instrument-facing capture coordinator.
pub struct CaptureBackend<L: ScopeLink> {
    link: L,
    settings: Settings,
    settings_path: Option<PathBuf>,
    state: ConnectionState,
    session: Option<Box<dyn ScopeSession>>,
    /// `*IDN?` response cached at connect time, for sidecar metadata.
    idn: Option<String>,
}

impl<L: ScopeLink> CaptureBackend<L> {
    pub fn new(link: L, settings: Settings) -> Self {
        Self {
            link,
            settings,
            settings_path: None,
            state: ConnectionState::Disconnected,
            session: None,
            idn: None,
        }
    }

    /// Persist settings (notably the auto-increment counter) to `path`
    /// after each successful capture.
    pub fn with_settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// The path the next capture would be written to, using the current
    /// wall clock. Used by the GUI collaborator for its preview field.
    pub fn preview_path(&self) -> AppResult<PathBuf> {
        naming::next_path(&self.settings, Local::now())
    }

    /// Query the link for attached supported devices.
    ///
    /// Connection state is left untouched unless exactly one device is
    /// found, in which case an auto-connect is attempted. An auto-connect
    /// failure is logged and reflected in the state, but the device list
    /// is still returned.
    pub fn scan(&mut self) -> AppResult<Vec<InstrumentDescriptor>> {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Scanning);
        let devices = match self.link.discover() {
            Ok(devices) => devices,
            Err(e) => {
                self.state = ConnectionState::Error(e.to_string());
                return Err(e);
            }
        };
        info!("Scan found {} supported device(s)", devices.len());
        if devices.len() == 1 {
            if let Err(e) = self.connect(&devices[0]) {
                warn!("Auto-connect to {} failed: {e}", devices[0]);
            }
        } else {
            self.state = previous;
        }
        Ok(devices)
    }

    /// Open a session to the given instrument.
    pub fn connect(&mut self, descriptor: &InstrumentDescriptor) -> AppResult<()> {
        self.close_session();
        match self.link.open(descriptor) {
            Ok(mut session) => {
                match session.identify() {
                    Ok(idn) => self.idn = Some(idn),
                    Err(e) => warn!("Connected but *IDN? failed: {e}"),
                }
                self.session = Some(session);
                self.state = ConnectionState::Connected(descriptor.clone());
                info!("Connected to {descriptor}");
                Ok(())
            }
            Err(e) => {
                // A descriptor that is no longer attached means the device
                // went away between scan and connect, not a fault.
                let still_present = self
                    .link
                    .discover()
                    .map(|devices| devices.contains(descriptor))
                    .unwrap_or(false);
                self.state = if still_present {
                    ConnectionState::Error(e.to_string())
                } else {
                    ConnectionState::Disconnected
                };
                Err(e)
            }
        }
    }

    /// Release the instrument session. Idempotent.
    pub fn disconnect(&mut self) {
        self.close_session();
        self.state = ConnectionState::Disconnected;
    }

    /// Capture a screenshot and save it under the configured naming policy.
    pub fn capture(&mut self) -> AppResult<CaptureOutcome> {
        self.do_capture(None)
    }

    /// Capture a screenshot and write a metadata sidecar next to it.
    pub fn capture_annotated(
        &mut self,
        metadata: CaptureMetadataBuilder,
    ) -> AppResult<CaptureOutcome> {
        self.do_capture(Some(metadata))
    }

    fn do_capture(&mut self, sidecar: Option<CaptureMetadataBuilder>) -> AppResult<CaptureOutcome> {
        let descriptor = match &self.state {
            ConnectionState::Connected(descriptor) => descriptor.clone(),
            _ => return Err(ScopeError::NotConnected),
        };

        match self.session_mut()?.is_busy() {
            Ok(false) => {}
            Ok(true) => return Err(self.fail_instrument(ScopeError::InstrumentBusy)),
            Err(e) => return Err(self.fail_instrument(e)),
        }

        let background = self.settings.background_color;
        let image = match self.session_mut()?.query_image(background) {
            Ok(image) => image,
            Err(e) => return Err(self.fail_instrument(e)),
        };

        let now = Local::now();
        let path = naming::next_path(&self.settings, now)?;
        let bytes_written = write_atomic(&path, &image)?;

        if self.settings.save_waveform {
            // Waveform export is not implemented yet; the flag is accepted
            // and ignored.
            log::debug!("save_waveform is set but waveform export is not implemented");
        }

        if let Some(builder) = sidecar {
            let instrument = self
                .idn
                .clone()
                .unwrap_or_else(|| descriptor.to_string());
            let meta = builder.build(&path, now, &instrument);
            let sidecar_path = CaptureMetadata::sidecar_path(&path);
            let rendered = serde_json::to_string_pretty(&meta).map_err(|e| {
                ScopeError::FileWrite {
                    path: sidecar_path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                }
            })?;
            write_atomic(&sidecar_path, rendered.as_bytes())?;
        }

        // The counter commits only once the image is safely on disk.
        if self.settings.naming_mode() == NamingMode::AutoIncrement {
            self.settings.auto_increment_counter += 1;
            self.persist_settings();
        }

        info!("Captured {bytes_written} bytes to '{}'", path.display());
        Ok(CaptureOutcome {
            path,
            captured_at: now,
            bytes_written,
        })
    }

    fn session_mut(&mut self) -> AppResult<&mut Box<dyn ScopeSession>> {
        self.session.as_mut().ok_or(ScopeError::NotConnected)
    }

    fn fail_instrument(&mut self, err: ScopeError) -> ScopeError {
        self.state = ConnectionState::Error(err.to_string());
        err
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!("Error while closing session: {e}");
            }
        }
        self.idn = None;
    }

    fn persist_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save_to(path) {
                warn!("Failed to persist settings to '{}': {e}", path.display());
            }
        }
    }
}
