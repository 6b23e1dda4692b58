use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const DEFAULT_DEVICE: &str = "inst0";

/// A VXI-11 endpoint: the host to connect to and the device name on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub device: String,
}

impl Address {
    pub fn new(host: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            device: device.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TCPIP0::{}::{}::INSTR", self.host, self.device)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Accepts `TCPIP[n]::host[::device][::INSTR]`, `host/device` or a bare
    /// host. USB, GPIB and raw socket resources are not reachable over VXI-11.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAddress(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if !trimmed.contains("::") {
            let (host, device) = match trimmed.split_once('/') {
                Some((host, device)) => (host, device),
                None => (trimmed, DEFAULT_DEVICE),
            };
            if host.is_empty() || device.is_empty() {
                return Err(invalid());
            }
            return Ok(Address::new(host, device));
        }

        let mut parts: Vec<&str> = trimmed.split("::").collect();
        let interface = parts.remove(0).to_uppercase();
        let board = interface.strip_prefix("TCPIP").ok_or_else(invalid)?;
        if !board.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        match parts.last().map(|p| p.to_uppercase()) {
            Some(class) if class == "INSTR" => {
                parts.pop();
            }
            Some(class) if class == "SOCKET" => return Err(invalid()),
            _ => {}
        }

        match parts.as_slice() {
            [host] if !host.is_empty() => Ok(Address::new(*host, DEFAULT_DEVICE)),
            [host, device] if !host.is_empty() && !device.is_empty() => {
                Ok(Address::new(*host, *device))
            }
            _ => Err(invalid()),
        }
    }
}
