/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use nusb::MaybeFuture;
use semver::Version;
use u3v_impl::bytes_io::ReadBytes;

use crate::u3v::{BusSpeed, DeviceInfo, Error, Result};

use super::{
    channel::{ControlIfaceInfo, ReceiveIfaceInfo},
    device::Device,
};

const MISCELLANEOUS_CLASS: u8 = 0xEF;

const DEVICE_SUBCLASS: u8 = 0x02;
const DEVICE_PROTOCOL: u8 = 0x01;

const USB3V_SUBCLASS: u8 = 0x05;
const CONTROL_IFACE_PROTOCOL: u8 = 0x00;
const EVENT_IFACE_PROTOCOL: u8 = 0x01;
const STREAM_IFACE_PROTOCOL: u8 = 0x02;

const DEVICE_INFO_DESC_TYPE: u8 = 0x24;
const DEVICE_INFO_DESC_SUBTYPE: u8 = 0x01;

/// Enumerates every U3V-compliant device currently attached to the host.
///
/// Devices that fail to parse (malformed descriptors, missing endpoints) are skipped rather
/// than aborting the whole enumeration, matching how a GenTL producer is expected to degrade in
/// the presence of a single misbehaving device.
pub fn enumerate_devices() -> Result<Vec<Device>> {
    let device_list = nusb::list_devices().wait()?;

    Ok(device_list
        .filter(is_u3v_device)
        .filter_map(|info| DeviceBuilder::new(info).ok())
        .filter_map(|builder| builder.build().ok())
        .collect())
}

fn is_u3v_device(info: &nusb::DeviceInfo) -> bool {
    info.class() == MISCELLANEOUS_CLASS
        && info.subclass() == DEVICE_SUBCLASS
        && info.protocol() == DEVICE_PROTOCOL
}

struct DeviceBuilder {
    info: nusb::DeviceInfo,
    ctrl_iface_number: u8,
    event_iface_number: Option<u8>,
    stream_iface_number: Option<u8>,
}

impl DeviceBuilder {
    fn new(info: nusb::DeviceInfo) -> Result<Self> {
        let mut ctrl_iface_number = None;
        let mut event_iface_number = None;
        let mut stream_iface_number = None;

        for iface in info.interfaces() {
            if iface.class() != MISCELLANEOUS_CLASS || iface.subclass() != USB3V_SUBCLASS {
                continue;
            }

            match iface.protocol() {
                CONTROL_IFACE_PROTOCOL => ctrl_iface_number = Some(iface.interface_number()),
                EVENT_IFACE_PROTOCOL => event_iface_number = Some(iface.interface_number()),
                STREAM_IFACE_PROTOCOL => stream_iface_number = Some(iface.interface_number()),
                _ => {}
            }
        }

        let ctrl_iface_number = ctrl_iface_number.ok_or_else(|| Error::InvalidDevice("no U3V control interface found".into()))?;

        Ok(Self {
            info,
            ctrl_iface_number,
            event_iface_number,
            stream_iface_number,
        })
    }

    fn build(self) -> Result<Device> {
        let device = self.info.open().wait()?;
        let config = device.active_configuration().map_err(|_| Error::InvalidDevice("failed to read active configuration".into()))?;

        let ctrl_iface_info = Self::endpoints_of(&config, self.ctrl_iface_number)
            .and_then(|(bulk_in, bulk_out)| {
                Some(ControlIfaceInfo {
                    iface_number: self.ctrl_iface_number,
                    bulk_in_ep: bulk_in?,
                    bulk_out_ep: bulk_out?,
                })
            })
            .ok_or_else(|| Error::InvalidDevice("control interface is missing its bulk endpoints".into()))?;

        let event_iface_info = self.event_iface_number.and_then(|n| {
            let (bulk_in, _) = Self::endpoints_of(&config, n)?;
            Some(ReceiveIfaceInfo {
                iface_number: n,
                alt_setting: 0,
                bulk_in_ep: bulk_in?,
            })
        });

        let stream_iface_info = self.stream_iface_number.and_then(|n| {
            let (bulk_in, _) = Self::endpoints_of(&config, n)?;
            Some(ReceiveIfaceInfo {
                iface_number: n,
                alt_setting: 0,
                bulk_in_ep: bulk_in?,
            })
        });

        let device_info = Self::read_device_info(&config, self.ctrl_iface_number, &device)?;

        Ok(Device::new(
            device,
            ctrl_iface_info,
            event_iface_info,
            stream_iface_info,
            device_info,
        ))
    }

    /// Returns `(bulk_in_ep, bulk_out_ep)` addresses for alternate setting 0 of `iface_number`.
    fn endpoints_of(
        config: &nusb::descriptors::Configuration,
        iface_number: u8,
    ) -> Option<(Option<u8>, Option<u8>)> {
        let alt_setting = config
            .interface_alt_settings()
            .find(|alt| alt.interface_number() == iface_number && alt.alternate_setting() == 0)?;

        let mut bulk_in = None;
        let mut bulk_out = None;
        for ep in alt_setting.endpoints() {
            if ep.transfer_type() != nusb::transfer::EndpointType::Bulk {
                continue;
            }
            match ep.direction() {
                nusb::transfer::Direction::In => bulk_in = Some(ep.address()),
                nusb::transfer::Direction::Out => bulk_out = Some(ep.address()),
            }
        }

        Some((bulk_in, bulk_out))
    }

    /// Parses the U3V class-specific device info descriptor embedded as "extra" bytes right
    /// after the control interface's standard descriptor, and resolves its string indices
    /// against the device's USB string descriptor table.
    fn read_device_info(
        config: &nusb::descriptors::Configuration,
        ctrl_iface_number: u8,
        device: &nusb::Device,
    ) -> Result<DeviceInfo> {
        let alt_setting = config
            .interface_alt_settings()
            .find(|alt| alt.interface_number() == ctrl_iface_number && alt.alternate_setting() == 0)
            .ok_or_else(|| Error::InvalidDevice("control interface alt setting 0 not found".into()))?;

        let raw = alt_setting
            .descriptors()
            .find(|desc| desc.descriptor_type() == DEVICE_INFO_DESC_TYPE)
            .ok_or_else(|| Error::InvalidDevice("U3V device info descriptor not found".into()))?;

        let desc = DeviceInfoDescriptor::from_bytes(raw.as_bytes())?;
        desc.interpret(device)
    }
}

struct DeviceInfoDescriptor {
    gencp_version_major: u16,
    gencp_version_minor: u16,
    u3v_version_major: u16,
    u3v_version_minor: u16,
    guid_idx: u8,
    vendor_name_idx: u8,
    model_name_idx: u8,
    family_name_idx: u8,
    device_version_idx: u8,
    manufacturer_info_idx: u8,
    serial_number_idx: u8,
    user_defined_name_idx: u8,
    supported_speed_mask: u8,
}

impl DeviceInfoDescriptor {
    const MINIMUM_DESC_LENGTH: u8 = 20;

    fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::MINIMUM_DESC_LENGTH as usize {
            return Err(Error::InvalidDevice("device info descriptor is too short".into()));
        }

        let length: u8 = bytes.read_bytes_le()?;
        let descriptor_type: u8 = bytes.read_bytes_le()?;
        let descriptor_subtype: u8 = bytes.read_bytes_le()?;

        if length < Self::MINIMUM_DESC_LENGTH
            || descriptor_type != DEVICE_INFO_DESC_TYPE
            || descriptor_subtype != DEVICE_INFO_DESC_SUBTYPE
        {
            return Err(Error::InvalidDevice("malformed device info descriptor header".into()));
        }

        let gencp_version_minor = bytes.read_bytes_le()?;
        let gencp_version_major = bytes.read_bytes_le()?;
        let u3v_version_minor = bytes.read_bytes_le()?;
        let u3v_version_major = bytes.read_bytes_le()?;
        let guid_idx = bytes.read_bytes_le()?;
        let vendor_name_idx = bytes.read_bytes_le()?;
        let model_name_idx = bytes.read_bytes_le()?;
        let family_name_idx = bytes.read_bytes_le()?;
        let device_version_idx = bytes.read_bytes_le()?;
        let manufacturer_info_idx = bytes.read_bytes_le()?;
        let serial_number_idx = bytes.read_bytes_le()?;
        let user_defined_name_idx = bytes.read_bytes_le()?;
        let supported_speed_mask = bytes.read_bytes_le()?;

        Ok(Self {
            gencp_version_major,
            gencp_version_minor,
            u3v_version_major,
            u3v_version_minor,
            guid_idx,
            vendor_name_idx,
            model_name_idx,
            family_name_idx,
            device_version_idx,
            manufacturer_info_idx,
            serial_number_idx,
            user_defined_name_idx,
            supported_speed_mask,
        })
    }

    fn interpret(&self, device: &nusb::Device) -> Result<DeviceInfo> {
        let gencp_version = Version::new(
            self.gencp_version_major.into(),
            self.gencp_version_minor.into(),
            0,
        );
        let u3v_version = Version::new(
            self.u3v_version_major.into(),
            self.u3v_version_minor.into(),
            0,
        );

        let guid = Self::read_string(device, self.guid_idx)?
            .ok_or_else(|| Error::InvalidDevice("GUID string descriptor is required".into()))?;
        let vendor_name =
            Self::read_string(device, self.vendor_name_idx)?
                .ok_or_else(|| Error::InvalidDevice("vendor name string descriptor is required".into()))?;
        let model_name =
            Self::read_string(device, self.model_name_idx)?
                .ok_or_else(|| Error::InvalidDevice("model name string descriptor is required".into()))?;
        let family_name = Self::read_string(device, self.family_name_idx)?;
        let device_version =
            Self::read_string(device, self.device_version_idx)?
                .ok_or_else(|| Error::InvalidDevice("device version string descriptor is required".into()))?;
        let manufacturer_info =
            Self::read_string(device, self.manufacturer_info_idx)?
                .ok_or_else(|| Error::InvalidDevice("manufacturer info string descriptor is required".into()))?;
        let serial_number =
            Self::read_string(device, self.serial_number_idx)?
                .ok_or_else(|| Error::InvalidDevice("serial number string descriptor is required".into()))?;
        let user_defined_name = Self::read_string(device, self.user_defined_name_idx)?;

        let supported_speed = if self.supported_speed_mask >> 4 & 0b1 == 1 {
            BusSpeed::SuperSpeedPlus
        } else if self.supported_speed_mask >> 3 & 0b1 == 1 {
            BusSpeed::SuperSpeed
        } else if self.supported_speed_mask >> 2 & 0b1 == 1 {
            BusSpeed::HighSpeed
        } else if self.supported_speed_mask >> 1 & 0b1 == 1 {
            BusSpeed::FullSpeed
        } else if self.supported_speed_mask & 0b1 == 1 {
            BusSpeed::LowSpeed
        } else {
            return Err(Error::InvalidDevice("supported speed mask has no bit set".into()));
        };

        Ok(DeviceInfo {
            gencp_version,
            u3v_version,
            guid,
            vendor_name,
            model_name,
            family_name,
            device_version,
            manufacturer_info,
            serial_number,
            user_defined_name,
            supported_speed,
        })
    }

    fn read_string(device: &nusb::Device, index: u8) -> Result<Option<String>> {
        if index == 0 {
            return Ok(None);
        }

        let s = device
            .get_string_descriptor(index, 0, std::time::Duration::from_millis(250))
            .wait()?;
        Ok(Some(s))
    }
}
