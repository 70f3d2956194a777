//! Serial port names as make variables
//!
//! Upload targets address a board by a device base name and a mote number,
//! both derived from the port the IDE selected. The naming differs per host.

use regex::Regex;

/// Host flavour that decides how port names are split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => HostOs::Windows,
            "linux" => HostOs::Linux,
            "macos" => HostOs::MacOs,
            _ => HostOs::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTarget {
    pub device_base: String,
    pub mote: String,
}

impl SerialTarget {
    /// `USBDEVBASENAME=` and `MOTE=` make arguments
    pub fn make_args(&self) -> Vec<String> {
        vec![
            format!("USBDEVBASENAME={}", self.device_base),
            format!("MOTE={}", self.mote),
        ]
    }
}

/// Splits `port` into device base name and mote number for `os`.
///
/// Returns `None` when the port does not follow the host's naming scheme.
pub fn parse_serial_port(port: &str, os: HostOs) -> Option<SerialTarget> {
    let pattern = match os {
        HostOs::Windows => r"^(COM)([0-9]*)(\s*)$",
        HostOs::Linux => r"^([^0-9]*)([0-9]*)$",
        HostOs::MacOs => r"^(/dev/.*-)(.*?)(\s*)$",
        HostOs::Other => return None,
    };
    let caps = Regex::new(pattern).ok()?.captures(port)?;

    let mut device_base = caps[1].to_string();
    if os == HostOs::MacOs {
        device_base = device_base.replace("/dev/cu.usbserial", "/dev/tty.usbserial");
    }

    Some(SerialTarget {
        device_base,
        mote: caps[2].to_string(),
    })
}
