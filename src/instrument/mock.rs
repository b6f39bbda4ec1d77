//! A mock oscilloscope link with scripted devices and fault injection.
//!
//! Used by the test suite and by hardware-free runs. Handles are cheap
//! clones over shared state, so a test can keep one handle to inject
//! faults and inspect instrument traffic while the backend owns another.

use crate::config::BackgroundColor;
use crate::error::{AppResult, ScopeError};
use crate::instrument::{InstrumentDescriptor, ScopeLink, ScopeSession};
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};

/// Fault injected into the next instrument operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MockFault {
    #[default]
    None,
    /// Scope reports it is armed and waiting for a trigger.
    Busy,
    /// Instrument layer times out.
    Timeout,
    /// Arbitrary instrument-side failure.
    Instrument(String),
}

struct MockInner {
    devices: Vec<InstrumentDescriptor>,
    image: Vec<u8>,
    fault: MockFault,
    open_fails: bool,
    image_queries: usize,
}

/// Scriptable mock scope link.
#[derive(Clone)]
pub struct MockScope {
    inner: Arc<Mutex<MockInner>>,
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScope {
    /// A mock exposing one Tektronix MSO5-family scope and a tiny PNG payload.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                devices: vec![InstrumentDescriptor {
                    model: "MSO54".to_string(),
                    serial: "C013066".to_string(),
                    address: "USB0::0x0699::0x0522::C013066::INSTR".to_string(),
                }],
                image: b"\x89PNG\r\n\x1a\nmock-image-data".to_vec(),
                fault: MockFault::None,
                open_fails: false,
                image_queries: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the set of discoverable devices.
    pub fn set_devices(&self, devices: Vec<InstrumentDescriptor>) {
        self.lock().devices = devices;
    }

    /// Replace the image bytes returned by `query_image`.
    pub fn set_image(&self, image: Vec<u8>) {
        self.lock().image = image;
    }

    /// Inject a fault into subsequent instrument operations.
    pub fn inject_fault(&self, fault: MockFault) {
        self.lock().fault = fault;
    }

    /// Make `open` fail with a connection error.
    pub fn set_open_fails(&self, fails: bool) {
        self.lock().open_fails = fails;
    }

    /// Number of image queries attempted so far.
    pub fn image_queries(&self) -> usize {
        self.lock().image_queries
    }
}

impl ScopeLink for MockScope {
    fn discover(&self) -> AppResult<Vec<InstrumentDescriptor>> {
        Ok(self.lock().devices.clone())
    }

    fn open(&self, descriptor: &InstrumentDescriptor) -> AppResult<Box<dyn ScopeSession>> {
        let inner = self.lock();
        if inner.open_fails {
            return Err(ScopeError::Connection(format!(
                "Failed to open session to {}",
                descriptor.address
            )));
        }
        if !inner.devices.contains(descriptor) {
            return Err(ScopeError::Connection(format!(
                "No device at {}",
                descriptor.address
            )));
        }
        info!("Mock session opened to {descriptor}");
        Ok(Box::new(MockSession {
            shared: self.clone(),
            descriptor: descriptor.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    shared: MockScope,
    descriptor: InstrumentDescriptor,
    closed: bool,
}

impl MockSession {
    fn check_open(&self) -> AppResult<()> {
        if self.closed {
            return Err(ScopeError::Connection("Session closed".to_string()));
        }
        Ok(())
    }
}

impl ScopeSession for MockSession {
    fn identify(&mut self) -> AppResult<String> {
        self.check_open()?;
        Ok(format!(
            "TEKTRONIX,{},{},CF:91.1CT FV:1.28",
            self.descriptor.model, self.descriptor.serial
        ))
    }

    fn is_busy(&mut self) -> AppResult<bool> {
        self.check_open()?;
        Ok(self.shared.lock().fault == MockFault::Busy)
    }

    fn query_image(&mut self, _background: BackgroundColor) -> AppResult<Vec<u8>> {
        self.check_open()?;
        let mut inner = self.shared.lock();
        inner.image_queries += 1;
        match inner.fault.clone() {
            MockFault::None => Ok(inner.image.clone()),
            MockFault::Busy => Err(ScopeError::InstrumentBusy),
            MockFault::Timeout => Err(ScopeError::InstrumentTimeout),
            MockFault::Instrument(msg) => Err(ScopeError::Instrument(msg)),
        }
    }

    fn drain_errors(&mut self) -> AppResult<Vec<(i32, String)>> {
        self.check_open()?;
        Ok(Vec::new())
    }

    fn close(&mut self) -> AppResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_and_open() {
        let mock = MockScope::new();
        let devices = mock.discover().unwrap();
        assert_eq!(devices.len(), 1);

        let mut session = mock.open(&devices[0]).unwrap();
        assert!(session.identify().unwrap().starts_with("TEKTRONIX,MSO54"));
    }

    #[test]
    fn test_open_unknown_descriptor_fails() {
        let mock = MockScope::new();
        let ghost = InstrumentDescriptor {
            model: "MSO58".to_string(),
            serial: "X000000".to_string(),
            address: "USB0::0x0699::0x0522::X000000::INSTR".to_string(),
        };
        assert!(matches!(mock.open(&ghost), Err(ScopeError::Connection(_))));
    }

    #[test]
    fn test_fault_injection() {
        let mock = MockScope::new();
        let devices = mock.discover().unwrap();
        let mut session = mock.open(&devices[0]).unwrap();

        mock.inject_fault(MockFault::Busy);
        assert!(session.is_busy().unwrap());

        mock.inject_fault(MockFault::Timeout);
        assert!(matches!(
            session.query_image(BackgroundColor::White),
            Err(ScopeError::InstrumentTimeout)
        ));
        assert_eq!(mock.image_queries(), 1);
    }

    #[test]
    fn test_closed_session_rejects_io() {
        let mock = MockScope::new();
        let devices = mock.discover().unwrap();
        let mut session = mock.open(&devices[0]).unwrap();
        session.close().unwrap();
        session.close().unwrap();
        assert!(session.identify().is_err());
    }
}
