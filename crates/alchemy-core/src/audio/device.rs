//! Audio device enumeration and management
//!
//! Drivers detect devices; devices own their streams. The [`DeviceManager`]
//! is an explicit value owned by the server: it is acquired once at startup
//! (running detection on every registered driver), queried while the server
//! runs, and released on shutdown, which closes every stream.

use serde::Serialize;

use super::error::{AudioError, AudioResult};
use super::stream::{InputHandle, OutputHandle, StreamInfo};
use super::virtual_device::VirtualDriver;
use crate::config::DriverConfig;
use crate::types::StreamId;

/// Device description for `GET_DEVICE_LIST` replies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub full_name: String,
    pub input_streams: Vec<StreamInfo>,
    pub output_streams: Vec<StreamInfo>,
}

/// An audio device exposing capture and playback streams
pub trait Device: Send {
    /// Short, stable name used to address the device (e.g. `alsa:0`)
    fn name(&self) -> &str;

    /// Human readable name
    fn full_name(&self) -> &str;

    fn input_streams(&self) -> Vec<StreamInfo>;

    fn output_streams(&self) -> Vec<StreamInfo>;

    fn input_stream(&self, id: StreamId) -> Option<InputHandle>;

    fn output_stream(&self, id: StreamId) -> Option<OutputHandle>;

    /// Close every stream of this device
    fn close_all(&self);

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name().to_string(),
            full_name: self.full_name().to_string(),
            input_streams: self.input_streams(),
            output_streams: self.output_streams(),
        }
    }
}

/// A driver backend able to detect devices
pub trait Driver: Send {
    fn name(&self) -> &str;

    /// Enumerate the devices currently available
    fn detect(&mut self) -> AudioResult<Vec<Box<dyn Device>>>;
}

/// Owns the registered drivers and the devices they detected
pub struct DeviceManager {
    drivers: Vec<Box<dyn Driver>>,
    devices: Vec<Box<dyn Device>>,
    acquired: bool,
}

impl DeviceManager {
    /// Create a manager with no drivers
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
            devices: Vec::new(),
            acquired: false,
        }
    }

    /// Create a manager with the drivers enabled in `config`
    pub fn from_config(config: &DriverConfig) -> Self {
        let mut manager = Self::new();
        #[cfg(feature = "cpal-backend")]
        {
            if config.cpal {
                manager.register(Box::new(super::cpal_backend::CpalDriver::new()));
            }
        }
        #[cfg(not(feature = "cpal-backend"))]
        {
            if config.cpal {
                log::warn!("[DEVICES] cpal driver requested but built without the cpal-backend feature");
            }
        }
        if config.virtual_device {
            manager.register(Box::new(VirtualDriver::default()));
        }
        manager
    }

    /// Register a driver; takes effect on the next acquire/refresh
    pub fn register(&mut self, driver: Box<dyn Driver>) {
        log::debug!("[DEVICES] Registered driver {}", driver.name());
        self.drivers.push(driver);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_driver(mut self, driver: Box<dyn Driver>) -> Self {
        self.register(driver);
        self
    }

    /// Run detection on every driver
    ///
    /// A driver that fails to detect is logged and skipped. Acquiring an
    /// already acquired manager is a no-op.
    pub fn acquire(&mut self) -> AudioResult<()> {
        if self.acquired {
            return Ok(());
        }
        self.detect_all();
        self.acquired = true;
        if self.devices.is_empty() {
            return Err(AudioError::NoDevices);
        }
        log::info!("[DEVICES] Acquired {} device(s)", self.devices.len());
        Ok(())
    }

    /// Re-run detection
    ///
    /// Stream handles already handed out stay valid; they keep the old
    /// device's stream alive until released by their holder.
    pub fn refresh(&mut self) -> AudioResult<()> {
        self.detect_all();
        self.acquired = true;
        log::info!("[DEVICES] Re-detected {} device(s)", self.devices.len());
        if self.devices.is_empty() {
            return Err(AudioError::NoDevices);
        }
        Ok(())
    }

    /// Close every stream and forget all devices
    pub fn release(&mut self) {
        if !self.acquired {
            return;
        }
        for device in &self.devices {
            device.close_all();
        }
        self.devices.clear();
        self.acquired = false;
        log::info!("[DEVICES] Released");
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn devices(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|d| d.as_ref())
    }

    /// Look up a device by short name
    pub fn device(&self, name: &str) -> AudioResult<&dyn Device> {
        self.devices()
            .find(|d| d.name() == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }

    pub fn input_stream(&self, device: &str, id: StreamId) -> AudioResult<InputHandle> {
        self.device(device)?
            .input_stream(id)
            .ok_or_else(|| AudioError::StreamNotFound {
                device: device.to_string(),
                stream: id,
            })
    }

    pub fn output_stream(&self, device: &str, id: StreamId) -> AudioResult<OutputHandle> {
        self.device(device)?
            .output_stream(id)
            .ok_or_else(|| AudioError::StreamNotFound {
                device: device.to_string(),
                stream: id,
            })
    }

    /// Describe every detected device
    pub fn device_list(&self) -> Vec<DeviceInfo> {
        self.devices().map(|d| d.info()).collect()
    }

    fn detect_all(&mut self) {
        let mut devices = Vec::new();
        for driver in &mut self.drivers {
            match driver.detect() {
                Ok(found) => {
                    log::debug!("[DEVICES] {} detected {} device(s)", driver.name(), found.len());
                    devices.extend(found);
                }
                Err(e) => log::warn!("[DEVICES] {} detection failed: {}", driver.name(), e),
            }
        }
        self.devices = devices;
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.release();
    }
}
