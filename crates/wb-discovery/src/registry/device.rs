//! Device model

use std::collections::HashMap;

use wb_conventions::normalize_id;

use super::control::{Control, assign};
use crate::meta::DeviceMetaPatch;

/// A remote device and its controls
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    /// `[a-z0-9_]` form of `id`, used in discovery unique ids
    pub normalized_id: String,
    pub display_name: Option<String>,
    pub driver: Option<String>,
    /// Controls in arrival order
    controls: Vec<Control>,
    /// Control id -> position in `controls`
    index: HashMap<String, usize>,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            normalized_id: normalize_id(&id),
            id,
            display_name: None,
            driver: None,
            controls: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Merge the fields present in `patch`; returns whether anything changed
    pub fn merge(&mut self, patch: &DeviceMetaPatch) -> bool {
        let mut changed = false;
        changed |= assign(&mut self.display_name, &patch.display_name);
        changed |= assign(&mut self.driver, &patch.driver);
        changed
    }

    /// Name shown in the hub: display name, then driver, then id
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.driver.as_deref())
            .unwrap_or(&self.id)
    }

    /// Controls in insertion order
    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.index.get(id).map(|&i| &self.controls[i])
    }

    pub fn control_mut(&mut self, id: &str) -> Option<&mut Control> {
        self.index.get(id).map(|&i| &mut self.controls[i])
    }

    /// Get a control, creating it if absent; the flag reports creation
    pub(crate) fn control_entry(&mut self, id: &str) -> (&mut Control, bool) {
        let (position, created) = match self.index.get(id) {
            Some(&i) => (i, false),
            None => {
                self.controls.push(Control::new(&self.id, id));
                let i = self.controls.len() - 1;
                self.index.insert(id.to_string(), i);
                (i, true)
            }
        };
        (&mut self.controls[position], created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_fallbacks() {
        let mut device = Device::new("wb-msw_35");
        assert_eq!(device.name(), "wb-msw_35");

        device.driver = Some("wb-modbus".to_string());
        assert_eq!(device.name(), "wb-modbus");

        device.display_name = Some("MSW Kitchen".to_string());
        assert_eq!(device.name(), "MSW Kitchen");
    }

    #[test]
    fn test_controls_keep_insertion_order() {
        let mut device = Device::new("d");
        for id in ["Zeta", "Alpha", "Mid"] {
            device.control_entry(id);
        }
        let (_, created) = device.control_entry("Alpha");
        assert!(!created);

        let ids: Vec<_> = device.controls().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["Zeta", "Alpha", "Mid"]);
        assert_eq!(device.control("Mid").unwrap().device_id, "d");
    }

    #[test]
    fn test_normalized_id() {
        assert_eq!(Device::new("Room #1/Sensor").normalized_id, "room__1_sensor");
    }
}
