//! Boot responder device handle
//!
//! Commands and data go over one bulk pipe pair. Media selection and the
//! information block use vendor control requests.

use std::time::Duration;

use nuwriter_core::info::DeviceInfo;
use nuwriter_core::{BlockAlign, Media, Transport};
use nusb::transfer::{Buffer, Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Endpoint, Interface, MaybeFuture};

use crate::error::{Result, UsbError};
use crate::protocol::*;

/// Configuration options for opening responder devices
#[derive(Debug, Clone)]
pub struct UsbConfig {
    /// Device to open when `all` is unset
    pub device_index: usize,
    /// Open every attached responder
    pub all: bool,
    /// Per-transfer timeout
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            all: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(UsbError::InvalidParameter(format!("{}: {}", key, value))),
    }
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<UsbConfig> {
    let mut config = UsbConfig::default();

    for (key, value) in options {
        match *key {
            "device" | "index" => {
                config.device_index = value
                    .parse()
                    .map_err(|_| UsbError::InvalidParameter(format!("device: {}", value)))?;
            }
            "all" => {
                config.all = parse_flag(key, value)?;
            }
            "timeout" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| UsbError::InvalidParameter(format!("timeout: {}", value)))?;
                config.timeout = Duration::from_millis(ms);
            }
            _ => {
                return Err(UsbError::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// Where an attached responder sits on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// Enumeration position, used as the device id
    pub id: usize,
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

fn responders() -> Result<Vec<nusb::DeviceInfo>> {
    Ok(nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == NUWRITER_USB_VENDOR && d.product_id() == NUWRITER_USB_PRODUCT)
        .collect())
}

/// List attached responders without opening them
pub fn list_devices() -> Result<Vec<UsbDeviceInfo>> {
    Ok(responders()?
        .iter()
        .enumerate()
        .map(|(id, d)| UsbDeviceInfo {
            id,
            bus: d.busnum(),
            address: d.device_address(),
        })
        .collect())
}

/// One opened boot responder
pub struct UsbTransport {
    interface: Interface,
    id: usize,
    timeout: Duration,
}

impl UsbTransport {
    /// Open the configured responder, or every one with `all` set
    pub fn open_all(config: &UsbConfig) -> Result<Vec<Self>> {
        let devices = responders()?;
        if devices.is_empty() {
            return Err(UsbError::DeviceNotFound);
        }

        if config.all {
            return devices
                .iter()
                .enumerate()
                .map(|(id, info)| Self::try_open_device(info, id, config))
                .collect();
        }
        let info = devices
            .get(config.device_index)
            .ok_or(UsbError::DeviceNotFound)?;
        Ok(vec![Self::try_open_device(info, config.device_index, config)?])
    }

    /// Try to open a specific USB device
    fn try_open_device(device_info: &nusb::DeviceInfo, id: usize, config: &UsbConfig) -> Result<Self> {
        log::info!(
            "Opening device {} at bus {} address {}",
            id,
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            interface,
            id,
            timeout: config.timeout,
        })
    }

    /// Bulk write
    fn bulk_write(&mut self, data: &[u8]) -> Result<()> {
        let mut out_ep: Endpoint<Bulk, Out> = self
            .interface
            .endpoint(BULK_OUT_EP)
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let mut out_buf = Buffer::new(data.len());
        out_buf.extend_from_slice(data);

        out_ep
            .transfer_blocking(out_buf, self.timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    /// Bulk read of up to `len` bytes
    fn bulk_read(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut in_ep: Endpoint<Bulk, In> = self
            .interface
            .endpoint(BULK_IN_EP)
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let max_packet_size = in_ep.max_packet_size();
        let request_len = len.max(1).div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let data = in_ep
            .transfer_blocking(in_buf, self.timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let n = data.len().min(len);
        Ok(data[..n].to_vec())
    }

    /// Raw information block
    fn info_block(&mut self) -> Result<Vec<u8>> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: REQ_GET_INFO,
                    value: 0,
                    index: 0,
                    length: nuwriter_core::info::INFO_SIZE as u16,
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(data.to_vec())
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, data: &[u8]) -> nuwriter_core::Result<()> {
        Ok(self.bulk_write(data)?)
    }

    fn read(&mut self, len: usize) -> nuwriter_core::Result<Vec<u8>> {
        Ok(self.bulk_read(len)?)
    }

    fn set_media(&mut self, media: Media) -> nuwriter_core::Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: REQ_SET_MEDIA,
                    value: media.code() as u16,
                    index: 0,
                    data: &[],
                },
                self.timeout,
            )
            .wait()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    fn get_align(&mut self) -> nuwriter_core::Result<BlockAlign> {
        let raw = self.info_block()?;
        Ok(DeviceInfo::parse(&raw)?.block_align())
    }

    fn get_info(&mut self) -> nuwriter_core::Result<Vec<u8>> {
        Ok(self.info_block()?)
    }

    fn get_id(&self) -> usize {
        self.id
    }
}
