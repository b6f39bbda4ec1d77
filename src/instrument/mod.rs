//! Instrument communication layer.
//!
//! The capture backend consumes oscilloscopes through the [`ScopeLink`] /
//! [`ScopeSession`] capability pair, keeping it independent of the transport.
//! Two implementations are provided: a VISA-backed link (behind the
//! `instrument_visa` feature) and a deterministic mock for tests and
//! hardware-free runs.

pub mod mock;
#[cfg(feature = "instrument_visa")]
pub mod visa;

use crate::config::BackgroundColor;
use crate::error::{AppResult, ScopeError};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identity of a discovered oscilloscope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentDescriptor {
    /// Model string, e.g. "MSO54".
    pub model: String,
    /// Instrument serial number.
    pub serial: String,
    /// VISA resource string, e.g. "USB0::0x0699::0x0522::C013066::INSTR".
    pub address: String,
}

impl std::fmt::Display for InstrumentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (S/N {}) at {}", self.model, self.serial, self.address)
    }
}

/// Discovery and session-open capability.
pub trait ScopeLink {
    /// List attached supported oscilloscopes.
    fn discover(&self) -> AppResult<Vec<InstrumentDescriptor>>;

    /// Open a session to the given instrument.
    fn open(&self, descriptor: &InstrumentDescriptor) -> AppResult<Box<dyn ScopeSession>>;
}

/// An open instrument session.
pub trait ScopeSession {
    /// Instrument identification string (`*IDN?`).
    fn identify(&mut self) -> AppResult<String>;

    /// Whether the scope is armed and waiting for a trigger. A busy scope
    /// refuses capture rather than blocking.
    fn is_busy(&mut self) -> AppResult<bool>;

    /// Request a screenshot and return the raw image bytes.
    fn query_image(&mut self, background: BackgroundColor) -> AppResult<Vec<u8>>;

    /// Read and clear the instrument error queue (`SYST:ERR?` loop).
    fn drain_errors(&mut self) -> AppResult<Vec<(i32, String)>>;

    /// Release the session. Idempotent.
    fn close(&mut self) -> AppResult<()>;
}

/// Transport information parsed from a VISA resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceInfo {
    Usb {
        vendor_id: String,
        product_id: String,
        serial_number: String,
    },
    Tcpip {
        host: String,
    },
    Unknown,
}

/// Parse a VISA resource string into its transport components.
pub fn parse_resource_string(resource: &str) -> ResourceInfo {
    if let Ok(re) = Regex::new(r"^USB[0-9]*::([^:]+)::([^:]+)::([^:]+)(?:::INSTR)?$") {
        if let Some(caps) = re.captures(resource) {
            return ResourceInfo::Usb {
                vendor_id: caps[1].to_string(),
                product_id: caps[2].to_string(),
                serial_number: caps[3].to_string(),
            };
        }
    }
    if let Ok(re) = Regex::new(r"^TCPIP[0-9]*::([^:]+)::[0-9]+::SOCKET$") {
        if let Some(caps) = re.captures(resource) {
            return ResourceInfo::Tcpip {
                host: caps[1].to_string(),
            };
        }
    }
    ResourceInfo::Unknown
}

/// Parse a `SYST:ERR?` response of the form `0,"No error"`.
pub fn parse_scpi_error(response: &str) -> AppResult<(i32, String)> {
    let mut parts = response.trim().splitn(2, ',');
    let code = parts
        .next()
        .and_then(|c| c.trim().parse::<i32>().ok())
        .ok_or_else(|| {
            ScopeError::Instrument(format!("Malformed SYST:ERR? response: '{response}'"))
        })?;
    let message = parts
        .next()
        .map(|m| m.trim().trim_matches('"').to_string())
        .unwrap_or_default();
    Ok((code, message))
}

/// Strip an IEEE 488.2 definite-length block header (`#nDDD...`) if present,
/// returning the payload. Data without a block header is returned unchanged.
pub fn ieee_block_payload(data: &[u8]) -> AppResult<&[u8]> {
    if data.first() != Some(&b'#') {
        return Ok(data);
    }
    let digits = data
        .get(1)
        .and_then(|d| (*d as char).to_digit(10))
        .ok_or_else(|| {
            ScopeError::Instrument("Malformed IEEE block: missing length digit".to_string())
        })? as usize;
    let header_len = 2 + digits;
    let len_field = data.get(2..header_len).ok_or_else(|| {
        ScopeError::Instrument("Malformed IEEE block: truncated length field".to_string())
    })?;
    let payload_len = std::str::from_utf8(len_field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ScopeError::Instrument("Malformed IEEE block: non-numeric length".to_string())
        })?;
    data.get(header_len..header_len + payload_len).ok_or_else(|| {
        ScopeError::Instrument(format!(
            "Malformed IEEE block: payload shorter than declared {payload_len} bytes"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb_resource() {
        let info = parse_resource_string("USB0::0x0699::0x0522::C013066::INSTR");
        assert_eq!(
            info,
            ResourceInfo::Usb {
                vendor_id: "0x0699".to_string(),
                product_id: "0x0522".to_string(),
                serial_number: "C013066".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tcpip_socket_resource() {
        let info = parse_resource_string("TCPIP0::192.168.1.50::4000::SOCKET");
        assert_eq!(
            info,
            ResourceInfo::Tcpip {
                host: "192.168.1.50".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unknown_resource() {
        assert_eq!(parse_resource_string("GPIB0::7::INSTR"), ResourceInfo::Unknown);
    }

    #[test]
    fn test_parse_scpi_error() {
        let (code, message) = parse_scpi_error("-222,\"Data out of range\"").unwrap();
        assert_eq!(code, -222);
        assert_eq!(message, "Data out of range");

        let (code, message) = parse_scpi_error("0,\"No error\"").unwrap();
        assert_eq!(code, 0);
        assert_eq!(message, "No error");
    }

    #[test]
    fn test_parse_scpi_error_rejects_garbage() {
        assert!(parse_scpi_error("not an error record").is_err());
    }

    #[test]
    fn test_ieee_block_payload() {
        let block = b"#3012Hello world!";
        assert_eq!(ieee_block_payload(block).unwrap(), b"Hello world!");
    }

    #[test]
    fn test_ieee_block_passthrough_without_header() {
        let raw = b"\x89PNG\r\n";
        assert_eq!(ieee_block_payload(raw).unwrap(), raw);
    }

    #[test]
    fn test_ieee_block_truncated() {
        assert!(ieee_block_payload(b"#3012Hi").is_err());
    }
}
