//! Device/Control Registry
//!
//! Owns the live model of remote devices, rebuilt purely from metadata
//! messages. Every mutation reports whether an observable field changed; that
//! flag is the only trigger for republishing, so replays of identical retained
//! messages never reach the hub.
//!
//! The registry performs no I/O. Creating a device or a control is reported in
//! [`Applied`] so the caller can subscribe to the topics that become relevant.

mod control;
mod device;

pub use control::{Control, ErrorState, MAX_SENTINEL};
pub use device::Device;

use std::collections::BTreeMap;

use crate::meta::{ControlMetaPatch, DeviceMetaPatch};

/// Outcome of applying one message to the registry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// An observable field changed; the device config must be republished
    pub changed: bool,
    /// The message created the device
    pub created_device: bool,
    /// The message created the control
    pub created_control: bool,
    /// The control moved into or out of the error state
    pub availability_changed: bool,
}

/// Errors for messages that cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Device not known yet: {0}")]
    UnknownDevice(String),
}

/// Entity graph of all devices seen since start
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<String, Device>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a device meta message, creating the device if absent
    pub fn apply_device_meta(&mut self, device_id: &str, patch: &DeviceMetaPatch) -> Applied {
        let created_device = !self.devices.contains_key(device_id);
        let device = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| Device::new(device_id));

        Applied {
            changed: device.merge(patch),
            created_device,
            ..Default::default()
        }
    }

    /// Apply a control meta message, creating the control if absent
    ///
    /// The parent device must already exist.
    pub fn apply_control_meta(
        &mut self,
        device_id: &str,
        control_id: &str,
        patch: &ControlMetaPatch,
    ) -> Result<Applied, RegistryError> {
        let device = self.device_entry(device_id)?;
        let (control, created_control) = device.control_entry(control_id);

        Ok(Applied {
            changed: control.merge(patch),
            created_control,
            ..Default::default()
        })
    }

    /// Apply a control error message, creating the control if absent
    pub fn apply_control_error(
        &mut self,
        device_id: &str,
        control_id: &str,
        has_error: bool,
    ) -> Result<Applied, RegistryError> {
        let device = self.device_entry(device_id)?;
        let (control, created_control) = device.control_entry(control_id);

        let previous = control.error_state;
        let next = ErrorState::from_flag(has_error);
        control.error_state = next;

        Ok(Applied {
            changed: previous != next,
            created_control,
            availability_changed: previous.is_error() != next.is_error(),
            ..Default::default()
        })
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn device_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    pub fn control(&self, device_id: &str, control_id: &str) -> Option<&Control> {
        self.device(device_id)?.control(control_id)
    }

    /// All devices ordered by id
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn device_entry(&mut self, device_id: &str) -> Result<&mut Device, RegistryError> {
        self.devices
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.to_string()))
    }
}
