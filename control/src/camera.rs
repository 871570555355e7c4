/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This module contains the main entry types for applications.
//!
//! # Examples
//! ```no_run
//! use u3v_control::u3v;
//!
//! // Enumerates all cameras connected to the host.
//! let mut cameras = u3v::enumerate_cameras().unwrap();
//!
//! if cameras.is_empty() {
//!     println!("no camera found");
//!     return;
//! }
//!
//! let mut camera = cameras.pop().unwrap();
//!
//! // Opens the camera.
//! camera.open().unwrap();
//!
//! // Read 64 bytes from address 0x0184.
//! let mut buffer = vec![0; 64];
//! camera.ctrl.read(0x0184, &mut buffer).unwrap();
//!
//! // Closes the camera.
//! camera.close().unwrap();
//! ```

use auto_impl::auto_impl;
use tracing::info;

use super::ControlResult;

/// Bundles a control handle with the basic identity of the camera it talks to.
///
/// The streaming (image payload) pipeline and `GenICam` feature-tree interpretation are external
/// collaborators built on top of [`DeviceControl::read`]/[`DeviceControl::write`] and
/// [`DeviceControl::genapi`]; this type doesn't own either of them.
#[derive(Debug, Clone)]
pub struct Camera<Ctrl> {
    /// Device control handle of the camera.
    pub ctrl: Ctrl,
    info: CameraInfo,
}

impl<Ctrl: DeviceControl> Camera<Ctrl> {
    /// Opens the camera. Ensure calling this method before starting to use the camera.
    ///
    /// See also [`close`](Self::close) which must be called when an opened camera is no longer
    /// needed.
    #[tracing::instrument(skip(self), level = "info", fields(camera = ?self.info()))]
    pub fn open(&mut self) -> ControlResult<()> {
        info!("try opening the device");
        self.ctrl.open()?;
        info!("opened the device successfully");
        Ok(())
    }

    /// Closes the camera.
    ///
    /// Make sure to call this method before the camera is dropped. To keep flexibility, this
    /// method is NOT automatically called when [`Camera`] is dropped.
    #[tracing::instrument(skip(self), level = "info", fields(camera = ?self.info()))]
    pub fn close(&mut self) -> ControlResult<()> {
        info!("try closing the device");
        self.ctrl.close()?;
        info!("closed the device successfully");
        Ok(())
    }

    /// Returns `true` if the camera is already opened.
    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.ctrl.is_opened()
    }

    /// Returns basic information of the camera.
    ///
    /// This information can be obtained without calling [`Self::open`].
    #[must_use]
    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Constructs a camera.
    pub fn new(ctrl: Ctrl, info: CameraInfo) -> Self {
        Self { ctrl, info }
    }

    /// Converts the internal control handle type.
    ///
    /// This method works the same as `std::convert::From`, it's just a hack to avoid `E0119`.
    pub fn convert_from<Ctrl2>(from: Camera<Ctrl2>) -> Self
    where
        Ctrl: From<Ctrl2>,
    {
        Camera::new(from.ctrl.into(), from.info)
    }

    /// Converts the internal control handle type.
    ///
    /// This method works the same as `std::convert::Into`, it's just a hack to avoid `E0119`.
    pub fn convert_into<Ctrl2>(self) -> Camera<Ctrl2>
    where
        Ctrl: Into<Ctrl2>,
    {
        Camera::new(self.ctrl.into(), self.info)
    }
}

/// Information of the camera.
#[derive(Clone, Debug, PartialEq, Hash)]
pub struct CameraInfo {
    /// Vendor name of the camera.
    pub vendor_name: String,
    /// Model name of the camera.
    pub model_name: String,
    /// Serial number of the camera.
    pub serial_number: String,
}

/// Provides operations on the device's memory, its connection state and its optional streaming
/// capability.
///
/// Both a plain [`ControlHandle`](super::u3v::ControlHandle) and its thread-safe
/// [`SharedControlHandle`](super::u3v::SharedControlHandle) wrapper implement this trait, so
/// generic code can be written against either without caring which one it holds.
#[auto_impl(&mut, Box)]
pub trait DeviceControl {
    /// Opens the handle.
    fn open(&mut self) -> ControlResult<()>;

    /// Closes the handle.
    fn close(&mut self) -> ControlResult<()>;

    /// Returns `true` if device is already opened.
    fn is_opened(&self) -> bool;

    /// Reads data from the device's memory.
    ///
    /// The read length is the same as `buf.len()`.
    fn read(&mut self, address: u64, buf: &mut [u8]) -> ControlResult<()>;

    /// Reads 4 bytes of data from the address.
    fn read_reg(&mut self, address: u64) -> ControlResult<u32>;

    /// Writes data to the device's memory.
    fn write(&mut self, address: u64, data: &[u8]) -> ControlResult<()>;

    /// Writes 4 bytes of data to the address.
    fn write_reg(&mut self, address: u64, data: u32) -> ControlResult<()>;

    /// Returns the `GenICam` XML string retrieved via the Manifest table.
    fn genapi(&mut self) -> ControlResult<String>;

    /// Enables streaming by programming SIRM. Fails with
    /// [`UnsupportedOperation`](super::ControlError::UnsupportedOperation) if the device has no
    /// SIRM.
    fn enable_streaming(&mut self) -> ControlResult<()>;

    /// Disables streaming.
    fn disable_streaming(&mut self) -> ControlResult<()>;
}
