//! Type Mapper
//!
//! Maps a control to the primitive discovery entity that represents it:
//!
//! | control type | read-only | platform |
//! |---|---|---|
//! | switch | yes | binary_sensor |
//! | switch | no | switch |
//! | alarm | - | binary_sensor |
//! | pushbutton | - | button |
//! | range | yes | sensor |
//! | range | no | number |
//! | measurement kinds | - | sensor with device class and unit |
//! | text, value, rgb | - | sensor |
//! | unrecognized | - | nothing (warned once per type) |

use std::collections::HashSet;
use std::fmt;

use wb_conventions::{ControlType, StateClass, device_class_for_units, display_precision};

use crate::registry::Control;

// ─────────────────────────────────────────────────────────────────────────────
// Platform
// ─────────────────────────────────────────────────────────────────────────────

/// Hub platform an entity is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    BinarySensor,
    Button,
    Sensor,
    Switch,
    Number,
    Light,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Button => "button",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
            Platform::Number => "number",
            Platform::Light => "light",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Primitive Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Sensor classification and formatting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSpec {
    pub device_class: Option<&'static str>,
    pub state_class: Option<StateClass>,
    pub unit: Option<String>,
    /// Decimal places for display and value rounding
    pub precision: Option<u8>,
}

/// Shape of a single-control entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    BinarySensor,
    Button,
    Sensor(SensorSpec),
    Switch,
    Number { min: f64, max: f64 },
}

impl EntityKind {
    pub fn platform(&self) -> Platform {
        match self {
            EntityKind::BinarySensor => Platform::BinarySensor,
            EntityKind::Button => Platform::Button,
            EntityKind::Sensor(_) => Platform::Sensor,
            EntityKind::Switch => Platform::Switch,
            EntityKind::Number { .. } => Platform::Number,
        }
    }
}

/// An entity wrapping exactly one control
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveEntity {
    pub control_id: String,
    pub control_type: ControlType,
    pub kind: EntityKind,
}

// ─────────────────────────────────────────────────────────────────────────────
// Type Mapper
// ─────────────────────────────────────────────────────────────────────────────

/// Maps controls to primitive entities
///
/// Holds the set of unknown type names already warned about, so each one is
/// logged exactly once per mapper.
#[derive(Debug, Default)]
pub struct TypeMapper {
    unknown_types: HashSet<String>,
}

impl TypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a control, or `None` while its type is missing or unrecognized
    pub fn map(&mut self, control: &Control) -> Option<PrimitiveEntity> {
        let type_name = control.type_name.as_deref()?;

        let control_type = match type_name.parse::<ControlType>() {
            Ok(t) => t,
            Err(_) => {
                if self.unknown_types.insert(type_name.to_string()) {
                    tracing::warn!(
                        "[{}/{}] Unknown control type '{}', control is not published",
                        control.device_id,
                        control.id,
                        type_name
                    );
                }
                return None;
            }
        };

        Some(PrimitiveEntity {
            control_id: control.id.clone(),
            control_type,
            kind: kind_for(control_type, control),
        })
    }

    /// Unknown type names seen so far
    pub fn unknown_types(&self) -> impl Iterator<Item = &str> {
        self.unknown_types.iter().map(String::as_str)
    }
}

fn kind_for(control_type: ControlType, control: &Control) -> EntityKind {
    match control_type {
        ControlType::Switch if control.read_only => EntityKind::BinarySensor,
        ControlType::Switch => EntityKind::Switch,
        ControlType::Alarm => EntityKind::BinarySensor,
        ControlType::Pushbutton => EntityKind::Button,
        ControlType::Range if control.read_only => EntityKind::Sensor(plain_sensor(control)),
        ControlType::Range => EntityKind::Number {
            min: control.effective_min(),
            max: control.effective_max(),
        },
        ControlType::Value => {
            let mut spec = plain_sensor(control);
            spec.device_class = control.units.as_deref().and_then(device_class_for_units);
            spec.precision = spec.device_class.and_then(display_precision);
            EntityKind::Sensor(spec)
        }
        ControlType::Text | ControlType::Rgb => EntityKind::Sensor(SensorSpec::default()),
        measured => match measured.measurement() {
            Some(m) => EntityKind::Sensor(SensorSpec {
                device_class: m.device_class,
                state_class: Some(m.state_class),
                unit: Some(m.unit.to_string()),
                precision: m.device_class.and_then(display_precision),
            }),
            None => EntityKind::Sensor(plain_sensor(control)),
        },
    }
}

fn plain_sensor(control: &Control) -> SensorSpec {
    SensorSpec {
        unit: control.units.clone(),
        ..Default::default()
    }
}
