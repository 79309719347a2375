//! Control model

use crate::meta::ControlMetaPatch;

/// Ceiling used for a range control without a usable `max`
pub const MAX_SENTINEL: f64 = 1e9;

/// Error state of a control, known only after an error-topic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorState {
    #[default]
    Unknown,
    Ok,
    Error,
}

impl ErrorState {
    pub fn from_flag(has_error: bool) -> Self {
        if has_error { ErrorState::Error } else { ErrorState::Ok }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ErrorState::Error)
    }
}

/// A single control of a device, assembled from partial meta messages
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: String,
    pub device_id: String,
    /// Raw `type` meta value
    pub type_name: Option<String>,
    pub read_only: bool,
    pub units: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub title: Option<String>,
    pub error_state: ErrorState,
    /// An availability message was emitted since process start
    pub availability_published: bool,
}

impl Control {
    pub fn new(device_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            type_name: None,
            read_only: false,
            units: None,
            min: None,
            max: None,
            title: None,
            error_state: ErrorState::Unknown,
            availability_published: false,
        }
    }

    /// Merge the fields present in `patch`; returns whether anything changed
    pub fn merge(&mut self, patch: &ControlMetaPatch) -> bool {
        let mut changed = false;
        changed |= assign(&mut self.type_name, &patch.control_type);
        changed |= assign(&mut self.units, &patch.units);
        changed |= assign(&mut self.min, &patch.min);
        changed |= assign(&mut self.max, &patch.max);
        changed |= assign(&mut self.title, &patch.title);

        if let Some(read_only) = patch.read_only {
            if self.read_only != read_only {
                self.read_only = read_only;
                changed = true;
            }
        }

        changed
    }

    /// Lower bound, `0` when absent
    pub fn effective_min(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }

    /// Upper bound; absent or zero maps to [`MAX_SENTINEL`]
    pub fn effective_max(&self) -> f64 {
        self.max.filter(|max| *max != 0.0).unwrap_or(MAX_SENTINEL)
    }

    /// Availability payload for the current error state
    pub fn availability_payload(&self) -> &'static str {
        if self.error_state.is_error() { "0" } else { "1" }
    }
}

pub(crate) fn assign<T: PartialEq + Clone>(slot: &mut Option<T>, value: &Option<T>) -> bool {
    match value {
        Some(v) if slot.as_ref() != Some(v) => {
            *slot = Some(v.clone());
            true
        }
        _ => false,
    }
}
