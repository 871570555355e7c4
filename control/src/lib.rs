#![warn(missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc
)]

//! Enumerates USB3 Vision compatible cameras, opens a control channel to one, and exposes a
//! typed view of its bootstrap register map (ABRM / SBRM / SIRM / Manifest).
//!
//! The streaming (image payload) engine, `GenICam` XML feature-tree interpretation, and
//! event-channel decoding are external collaborators: this crate exposes just enough ([`Camera`],
//! [`DeviceControl::enable_streaming`], [`u3v::register_map::Sirm`], [`DeviceControl::genapi`]) for
//! them to be built on top.

#[macro_use]
mod utils;

pub mod camera;
pub mod u3v;

pub use camera::{Camera, CameraInfo, DeviceControl};
pub use u3v::register_map::{CompressionType, GenICamFileType};

use std::borrow::Cow;

/// The error type for control channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// A transport (USB) level failure.
    #[error("input/output error: {0}")]
    Io(anyhow::Error),

    /// The device doesn't follow the specification: a required descriptor, endpoint, or register
    /// is absent or malformed.
    #[error("device doesn't follow the specification: {0}")]
    InvalidDevice(Cow<'static, str>),

    /// A received packet failed validation: bad prefix, mismatched request id, or a length that
    /// overflows the negotiated buffer.
    #[error("invalid packet: {0}")]
    InvalidPacket(Cow<'static, str>),

    /// The device acknowledged a command with a non-success status.
    #[error("device returned a non-success status: {0}")]
    Nak(Cow<'static, str>),

    /// The operation timed out waiting for a response.
    #[error("operation timed out")]
    Timeout,

    /// The device kept replying with `PENDING_ACK` past the configured retry count.
    #[error("pending acknowledge retry count exceeded")]
    PendingAckExceeded,

    /// The handle must be opened before this operation.
    #[error("device is not opened")]
    NotOpened,

    /// The caller's buffer is too small to receive the requested data.
    #[error("buffer is too small to receive data")]
    BufferTooSmall,

    /// Register content violates its documented enum or bounds.
    #[error("failed to parse register content: {0}")]
    ParseError(Cow<'static, str>),

    /// The device doesn't support the requested optional feature.
    #[error("operation is not supported by the device")]
    UnsupportedOperation,
}

/// A specialized `Result` type for control channel operations.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

impl From<u3v_device::u3v::Error> for ControlError {
    fn from(err: u3v_device::u3v::Error) -> Self {
        use u3v_device::u3v::{Error, UsbError};

        match err {
            Error::Usb(usb_err) => match usb_err {
                UsbError::Timeout => ControlError::Timeout,
                UsbError::Disconnected | UsbError::NotFound => {
                    ControlError::InvalidDevice(format!("{usb_err}").into())
                }
                UsbError::Cancelled
                | UsbError::Stall
                | UsbError::Fault
                | UsbError::InvalidParam
                | UsbError::PermissionDenied
                | UsbError::Busy
                | UsbError::NotSupported
                | UsbError::Other => ControlError::Io(anyhow::Error::msg(format!("{usb_err}"))),
            },
            Error::InvalidPacket(msg) => ControlError::InvalidPacket(msg),
            Error::BufferIo(io_err) => ControlError::Io(io_err.into()),
            Error::InvalidDevice(msg) => ControlError::InvalidDevice(msg),
        }
    }
}
