/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This module provides low level API for U3V compatible devices.
//!
//! # Examples
//!
//! ```no_run
//! use u3v_control::u3v;
//!
//! // Enumerates cameras connected to the host.
//! let mut cameras = u3v::enumerate_cameras().unwrap();
//!
//! // If no camera is found, return.
//! if cameras.is_empty() {
//!     return;
//! }
//!
//! let mut camera = cameras.pop().unwrap();
//! // Opens the camera.
//! camera.open().unwrap();
//!
//! let ctrl = &mut camera.ctrl;
//! // Get Abrm.
//! let abrm = ctrl.abrm().unwrap();
//!
//! // Read serial number from ABRM.
//! let serial_number = abrm.serial_number(ctrl).unwrap();
//! println!("{}", serial_number);
//!
//! // Check user defined name feature is supported.
//! // If it is suppoted, read from and write to the register.
//! let device_capability = abrm.device_capability().unwrap();
//! if device_capability.is_user_defined_name_supported() {
//!     // Read from user defined name register.
//!     let user_defined_name = abrm.user_defined_name(ctrl).unwrap().unwrap();
//!     println!("{}", user_defined_name);
//!
//!     // Write new name to the register.
//!     abrm.set_user_defined_name(ctrl, "my-camera").unwrap();
//! }
//! ```
#![allow(clippy::missing_panics_doc)]

pub mod register_map;

pub mod control_handle;

pub use control_handle::{ControlHandle, SharedControlHandle};

pub use u3v_device::u3v::DeviceInfo;

use u3v_device::u3v;

use crate::{Camera, CameraInfo, ControlError, ControlResult};

/// Enumerate all U3V compatible cameras connected to the host.
///
/// # Examples
///
/// ```no_run
/// use u3v_control::u3v;
///
/// // Enumerate cameras connected to the host.
/// let mut cameras = u3v::enumerate_cameras().unwrap();
/// ```
pub fn enumerate_cameras() -> ControlResult<Vec<Camera<ControlHandle>>> {
    let devices = u3v::enumerate_devices().map_err(ControlError::from)?;

    let mut cameras = Vec::with_capacity(devices.len());
    for dev in devices {
        let ctrl = ControlHandle::new(&dev)?;

        let dev_info = dev.device_info();
        let camera_info = CameraInfo {
            vendor_name: dev_info.vendor_name.clone(),
            model_name: dev_info.model_name.clone(),
            serial_number: dev_info.serial_number.clone(),
        };

        cameras.push(Camera::new(ctrl, camera_info));
    }

    Ok(cameras)
}
