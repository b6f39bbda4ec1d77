//! Oscilloscope screenshot capture over USB/VISA.
//!
//! This library wraps instrument discovery, connection management, and the
//! capture-and-save operation behind a UI-independent backend. The file
//! naming policy (fixed name, auto-increment counter, or datestamp, plus
//! configurable directory layouts) lives in [`naming`] and is pure with
//! respect to the filesystem; [`backend`] owns the instrument session and
//! the atomic file writes.
//!
//! Hardware access goes through the [`instrument::ScopeLink`] capability
//! trait, with a VISA implementation behind the `instrument_visa` feature
//! and a mock for tests and hardware-free runs.

pub mod backend;
pub mod config;
pub mod error;
pub mod instrument;
pub mod metadata;
pub mod naming;

pub use backend::{CaptureBackend, CaptureOutcome, ConnectionState};
pub use config::Settings;
pub use error::{AppResult, ScopeError};
pub use instrument::{InstrumentDescriptor, ScopeLink, ScopeSession};
pub use metadata::{CaptureMetadata, CaptureMetadataBuilder};
pub use naming::NamingMode;
