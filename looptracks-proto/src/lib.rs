//! Loop Tracks wire protocol - text commands and acknowledgements
//!
//! Commands are plain UTF-8 strings written to the TX characteristic:
//!
//! | Command            | Payload                  |
//! |--------------------|--------------------------|
//! | Set Wi-Fi          | `wifi:<ssid>,<password>` |
//! | Set transit system | `city:<cta\|mbta>`       |
//! | Set color          | `color:<color-id>`       |
//! | Reset              | `reset`                  |
//!
//! The device answers on RX with a single line: `ok`, a fixed error string,
//! or free-form diagnostics. Nothing ties an answer to the command that caused
//! it.

pub mod ble;
pub mod transit;

use std::fmt;

pub use transit::{LineColor, TransitSystem};

/// Acknowledgement line for a command the device accepted
pub const ACK_OK: &str = "ok";

/// Rejection lines the firmware is known to send
pub const KNOWN_ERRORS: &[&str] = &["incorrect railway color"];

/// Input rejected before anything is written to the device
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please set the wifi {0}")]
    EmptyField(&'static str),

    #[error("wifi {field} must not contain '{ch}'")]
    ReservedCharacter { field: &'static str, ch: char },

    #[error("unknown transit system: {0}")]
    UnknownTransitSystem(String),

    #[error("unknown line color: {0}")]
    UnknownColor(String),
}

/// Command sent from the app to the indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wifi { ssid: String, password: String },
    City(TransitSystem),
    Color(LineColor),
    Reset,
}

impl Command {
    /// Build a Wi-Fi command, rejecting empty fields and delimiter characters.
    ///
    /// The firmware splits on the first `:` and `,` and has no escaping, so a
    /// credential containing either would be cut at the wrong place.
    pub fn wifi(ssid: &str, password: &str) -> Result<Self, ValidationError> {
        if ssid.is_empty() {
            return Err(ValidationError::EmptyField("SSID"));
        }
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password"));
        }
        check_reserved("SSID", ssid)?;
        check_reserved("password", password)?;

        Ok(Command::Wifi {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    /// UTF-8 payload for the TX characteristic
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Wire string with the Wi-Fi password masked, for logs
    pub fn redacted(&self) -> String {
        match self {
            Command::Wifi { ssid, .. } => format!(
                "{}{}{ssid}{}***",
                ble::keys::WIFI,
                ble::KEY_SEPARATOR,
                ble::VALUE_SEPARATOR
            ),
            other => other.to_string(),
        }
    }
}

fn check_reserved(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match value
        .chars()
        .find(|c| *c == ble::KEY_SEPARATOR || *c == ble::VALUE_SEPARATOR)
    {
        Some(ch) => Err(ValidationError::ReservedCharacter { field, ch }),
        None => Ok(()),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::ble::{keys, KEY_SEPARATOR as K, VALUE_SEPARATOR as V};

        match self {
            Command::Wifi { ssid, password } => write!(f, "{}{K}{ssid}{V}{password}", keys::WIFI),
            Command::City(system) => write!(f, "{}{K}{system}", keys::CITY),
            Command::Color(color) => write!(f, "{}{K}{color}", keys::COLOR),
            Command::Reset => f.write_str(keys::RESET),
        }
    }
}

/// A line received from the indicator's RX characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Ok,
    KnownError(String),
    Unknown(String),
}

impl Acknowledgement {
    /// Classify a decoded line. Trailing line terminators and NULs from the
    /// firmware's fixed-size buffer are ignored.
    pub fn classify(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n', '\0']);
        if line == ACK_OK {
            Acknowledgement::Ok
        } else if KNOWN_ERRORS.contains(&line) {
            Acknowledgement::KnownError(line.to_string())
        } else {
            Acknowledgement::Unknown(line.to_string())
        }
    }

    /// Decode and classify raw notification bytes; `None` if not UTF-8
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        std::str::from_utf8(data).ok().map(Self::classify)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Acknowledgement::Ok)
    }
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acknowledgement::Ok => f.write_str(ACK_OK),
            Acknowledgement::KnownError(s) | Acknowledgement::Unknown(s) => f.write_str(s),
        }
    }
}
