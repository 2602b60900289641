//! Error types for the USB transport

use std::fmt;

/// Result type for USB transport operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur talking to the boot responder over USB
#[derive(Debug)]
pub enum UsbError {
    /// No device with the responder's VID/PID
    DeviceNotFound,
    /// Failed to open device
    OpenFailed(String),
    /// Failed to claim interface
    ClaimFailed(String),
    /// USB transfer failed
    TransferFailed(String),
    /// Parameter parsing error
    InvalidParameter(String),
    /// Core library error
    Core(nuwriter_core::Error),
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::DeviceNotFound => {
                write!(f, "NuWriter device not found (VID:0416 PID:5963)")
            }
            UsbError::OpenFailed(msg) => write!(f, "Failed to open device: {}", msg),
            UsbError::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            UsbError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            UsbError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            UsbError::Core(e) => write!(f, "Core error: {}", e),
        }
    }
}

impl std::error::Error for UsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsbError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<nuwriter_core::Error> for UsbError {
    fn from(e: nuwriter_core::Error) -> Self {
        UsbError::Core(e)
    }
}

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}

impl From<UsbError> for nuwriter_core::Error {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::Core(inner) => inner,
            UsbError::DeviceNotFound => nuwriter_core::Error::NoDeviceFound,
            UsbError::InvalidParameter(msg) => nuwriter_core::Error::InvalidParameter(msg),
            other => nuwriter_core::Error::Transport(other.to_string()),
        }
    }
}
