//! VISA oscilloscope link.
//!
//! Implements [`ScopeLink`] on top of the `visa-rs` crate. Discovery walks
//! the resource list and keeps instruments whose `*IDN?` response matches a
//! Tektronix MSO5-family scope. The capture path drives the HARDCOPY
//! command set: ink-saver from the configured background color, PNG
//! format, then a block read of the image data.
//!
//! Enabled with the `instrument_visa` feature; the mock link is used
//! otherwise.

use crate::config::BackgroundColor;
use crate::error::{AppResult, ScopeError};
use crate::instrument::{
    ieee_block_payload, parse_scpi_error, InstrumentDescriptor, ScopeLink, ScopeSession,
};
use log::{debug, info, warn};
use std::ffi::CString;
use std::io::{Read, Write};
use std::time::Duration;
use visa_rs::prelude::*;

/// Substrings a `*IDN?` response must contain to count as a supported scope.
const SUPPORTED_VENDOR: &str = "TEKTRONIX";
const SUPPORTED_FAMILY: &str = "MSO5";

/// VISA-backed scope link.
pub struct VisaLink {
    timeout: Duration,
}

impl Default for VisaLink {
    fn default() -> Self {
        Self::new()
    }
}

impl VisaLink {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-operation VISA timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn open_resource(&self, rm: &DefaultRM, address: &str) -> AppResult<Instrument> {
        let c_string = CString::new(address)
            .map_err(|e| ScopeError::Connection(format!("Invalid resource string: {e}")))?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let mut instr = rm
            .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(|e| map_visa_error(e, address))?;
        instr
            .set_timeout(self.timeout.as_millis() as u32)
            .map_err(|e| map_visa_error(e, address))?;
        Ok(instr)
    }
}

/// Map a VISA error onto the application taxonomy, keeping the VISA
/// message intact for the caller.
fn map_visa_error(err: visa_rs::Error, address: &str) -> ScopeError {
    let text = err.to_string();
    if text.contains("VI_ERROR_TMO") || text.to_lowercase().contains("timeout") {
        ScopeError::InstrumentTimeout
    } else {
        ScopeError::Connection(format!("{address}: {text}"))
    }
}

fn descriptor_from_idn(idn: &str, address: &str) -> Option<InstrumentDescriptor> {
    if !idn.contains(SUPPORTED_VENDOR) || !idn.contains(SUPPORTED_FAMILY) {
        return None;
    }
    let mut fields = idn.split(',').map(str::trim);
    let _vendor = fields.next()?;
    let model = fields.next()?.to_string();
    let serial = fields.next().unwrap_or_default().to_string();
    Some(InstrumentDescriptor {
        model,
        serial,
        address: address.to_string(),
    })
}

impl ScopeLink for VisaLink {
    fn discover(&self) -> AppResult<Vec<InstrumentDescriptor>> {
        let rm = DefaultRM::new()
            .map_err(|e| ScopeError::Connection(format!("VISA resource manager: {e}")))?;
        let expr = CString::new("?*::INSTR")
            .map_err(|e| ScopeError::Connection(format!("Invalid search expression: {e}")))?;

        let mut found = Vec::new();
        let list = match rm.find_res_list(&visa_rs::VisaString::from(expr)) {
            Ok(list) => list,
            // An empty bus reports as a find error on some VISA backends.
            Err(e) => {
                debug!("VISA find returned no resources: {e}");
                return Ok(found);
            }
        };

        for resource in list {
            let address = match resource {
                Ok(r) => r.to_string(),
                Err(e) => {
                    warn!("Skipping unreadable VISA resource: {e}");
                    continue;
                }
            };
            // Probe each candidate; devices that fail to answer are skipped.
            let mut session = match self.open_resource(&rm, &address) {
                Ok(s) => s,
                Err(e) => {
                    debug!("Skipping '{address}': {e}");
                    continue;
                }
            };
            let idn = match raw_query(&mut session, "*IDN?") {
                Ok(r) => r,
                Err(e) => {
                    debug!("No *IDN? response from '{address}': {e}");
                    continue;
                }
            };
            let idn = String::from_utf8_lossy(&idn).trim().to_string();
            if let Some(descriptor) = descriptor_from_idn(&idn, &address) {
                info!("Found supported scope: {descriptor}");
                found.push(descriptor);
            }
        }
        Ok(found)
    }

    fn open(&self, descriptor: &InstrumentDescriptor) -> AppResult<Box<dyn ScopeSession>> {
        let rm = DefaultRM::new()
            .map_err(|e| ScopeError::Connection(format!("VISA resource manager: {e}")))?;
        let instr = self.open_resource(&rm, &descriptor.address)?;
        info!("Opened VISA session to {descriptor}");
        Ok(Box::new(VisaSession {
            instr: Some(instr),
            address: descriptor.address.clone(),
        }))
    }
}

fn raw_query(instr: &mut Instrument, cmd: &str) -> std::io::Result<Vec<u8>> {
    instr.write_all(format!("{cmd}\n").as_bytes())?;
    let mut buf = [0u8; 4096];
    let n = instr.read(&mut buf)?;
    Ok(buf[..n].to_vec())
}

struct VisaSession {
    instr: Option<Instrument>,
    address: String,
}

impl VisaSession {
    fn instr(&mut self) -> AppResult<&mut Instrument> {
        self.instr
            .as_mut()
            .ok_or_else(|| ScopeError::Connection("Session closed".to_string()))
    }

    fn write_cmd(&mut self, cmd: &str) -> AppResult<()> {
        let instr = self.instr()?;
        instr
            .write_all(format!("{cmd}\n").as_bytes())
            .map_err(map_io_error)?;
        Ok(())
    }

    fn query(&mut self, cmd: &str) -> AppResult<String> {
        let instr = self.instr()?;
        let raw = raw_query(instr, cmd).map_err(map_io_error)?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

fn map_io_error(err: std::io::Error) -> ScopeError {
    if err.kind() == std::io::ErrorKind::TimedOut {
        ScopeError::InstrumentTimeout
    } else {
        ScopeError::Instrument(err.to_string())
    }
}

impl ScopeSession for VisaSession {
    fn identify(&mut self) -> AppResult<String> {
        self.query("*IDN?")
    }

    fn is_busy(&mut self) -> AppResult<bool> {
        let state = self.query("TRIGGER:STATE?")?.to_uppercase();
        Ok(state.starts_with("READY") || state.starts_with("ARMED"))
    }

    fn query_image(&mut self, background: BackgroundColor) -> AppResult<Vec<u8>> {
        // Ink-saver inverts the display background for printing: 1 gives a
        // white background, 0 keeps the native black.
        let inksaver = match background {
            BackgroundColor::White => 1,
            BackgroundColor::Black => 0,
        };
        self.write_cmd(&format!("HARDCOPY:INKSAVER {inksaver}"))?;
        self.write_cmd("HARDCOPY:FORMAT PNG")?;
        self.write_cmd("HARDCOPY:LAYOUT PORTRAIT")?;
        self.write_cmd("HARDCOPY START")?;

        let instr = self.instr()?;
        let mut data = Vec::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = instr.read(&mut buf).map_err(map_io_error)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
        if data.is_empty() {
            return Err(ScopeError::Instrument(format!(
                "{}: empty hardcopy response",
                self.address
            )));
        }
        Ok(ieee_block_payload(&data)?.to_vec())
    }

    fn drain_errors(&mut self) -> AppResult<Vec<(i32, String)>> {
        let mut errors = Vec::new();
        loop {
            let response = self.query("SYST:ERR?")?;
            let (code, message) = parse_scpi_error(&response)?;
            if code == 0 {
                break;
            }
            warn!("{}: {code}, {message}", self.address);
            errors.push((code, message));
        }
        Ok(errors)
    }

    fn close(&mut self) -> AppResult<()> {
        if self.instr.take().is_some() {
            info!("Closed VISA session to {}", self.address);
        }
        Ok(())
    }
}
