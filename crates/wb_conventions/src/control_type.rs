// Control Types - The closed set of semantic control kinds
//
// Every control announces its kind through the `type` meta field. Generic kinds
// describe interaction (switch, range, ...); measurement kinds additionally
// imply a physical unit and a discovery device class.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Control Type
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic kind of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    // Generic kinds
    Switch,
    Alarm,
    Pushbutton,
    Range,
    Rgb,
    Text,
    Value,

    // Measurement kinds
    Temperature,
    RelHumidity,
    AtmosphericPressure,
    Rainfall,
    WindSpeed,
    Power,
    PowerConsumption,
    Voltage,
    Current,
    WaterFlow,
    WaterConsumption,
    Resistance,
    Concentration,
    HeatPower,
    HeatEnergy,
    Lux,
    SoundLevel,
}

/// Error returned when a `type` meta value is not a known control type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown control type: {0}")]
pub struct UnknownControlType(pub String);

impl ControlType {
    /// All known control types
    pub const ALL: [ControlType; 24] = [
        ControlType::Switch,
        ControlType::Alarm,
        ControlType::Pushbutton,
        ControlType::Range,
        ControlType::Rgb,
        ControlType::Text,
        ControlType::Value,
        ControlType::Temperature,
        ControlType::RelHumidity,
        ControlType::AtmosphericPressure,
        ControlType::Rainfall,
        ControlType::WindSpeed,
        ControlType::Power,
        ControlType::PowerConsumption,
        ControlType::Voltage,
        ControlType::Current,
        ControlType::WaterFlow,
        ControlType::WaterConsumption,
        ControlType::Resistance,
        ControlType::Concentration,
        ControlType::HeatPower,
        ControlType::HeatEnergy,
        ControlType::Lux,
        ControlType::SoundLevel,
    ];

    /// The wire name of this type as it appears in control meta
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Switch => "switch",
            ControlType::Alarm => "alarm",
            ControlType::Pushbutton => "pushbutton",
            ControlType::Range => "range",
            ControlType::Rgb => "rgb",
            ControlType::Text => "text",
            ControlType::Value => "value",
            ControlType::Temperature => "temperature",
            ControlType::RelHumidity => "rel_humidity",
            ControlType::AtmosphericPressure => "atmospheric_pressure",
            ControlType::Rainfall => "rainfall",
            ControlType::WindSpeed => "wind_speed",
            ControlType::Power => "power",
            ControlType::PowerConsumption => "power_consumption",
            ControlType::Voltage => "voltage",
            ControlType::Current => "current",
            ControlType::WaterFlow => "water_flow",
            ControlType::WaterConsumption => "water_consumption",
            ControlType::Resistance => "resistance",
            ControlType::Concentration => "concentration",
            ControlType::HeatPower => "heat_power",
            ControlType::HeatEnergy => "heat_energy",
            ControlType::Lux => "lux",
            ControlType::SoundLevel => "sound_level",
        }
    }

    /// Measurement metadata, or `None` for generic kinds
    pub fn measurement(&self) -> Option<Measurement> {
        use StateClass::{Measurement as Instant, TotalIncreasing};

        let (unit, device_class, state_class) = match self {
            ControlType::Temperature => ("°C", Some("temperature"), Instant),
            ControlType::RelHumidity => ("%", Some("humidity"), Instant),
            ControlType::AtmosphericPressure => ("mbar", Some("atmospheric_pressure"), Instant),
            ControlType::Rainfall => ("mm/h", Some("precipitation_intensity"), Instant),
            ControlType::WindSpeed => ("m/s", Some("wind_speed"), Instant),
            ControlType::Power => ("W", Some("power"), Instant),
            ControlType::PowerConsumption => ("kWh", Some("energy"), TotalIncreasing),
            ControlType::Voltage => ("V", Some("voltage"), Instant),
            ControlType::Current => ("A", Some("current"), Instant),
            ControlType::WaterFlow => ("m³/h", Some("volume_flow_rate"), Instant),
            ControlType::WaterConsumption => ("m³", Some("water"), TotalIncreasing),
            ControlType::Resistance => ("Ohm", None, Instant),
            ControlType::Concentration => ("ppm", Some("carbon_dioxide"), Instant),
            ControlType::HeatPower => ("Gcal/hour", None, Instant),
            ControlType::HeatEnergy => ("Gcal", None, TotalIncreasing),
            ControlType::Lux => ("lx", Some("illuminance"), Instant),
            ControlType::SoundLevel => ("dB", Some("sound_pressure"), Instant),
            _ => return None,
        };

        Some(Measurement {
            unit,
            device_class,
            state_class,
        })
    }

    /// Check if this is a measurement kind
    pub fn is_measurement(&self) -> bool {
        self.measurement().is_some()
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = UnknownControlType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownControlType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Measurement Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// How a measured value evolves over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous reading
    Measurement,
    /// Monotonically accumulated total (meters)
    TotalIncreasing,
}

impl StateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateClass::Measurement => "measurement",
            StateClass::TotalIncreasing => "total_increasing",
        }
    }
}

/// Unit and classification implied by a measurement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Canonical unit symbol, overrides the control's own `units`
    pub unit: &'static str,
    /// Discovery device class, if the hub defines one
    pub device_class: Option<&'static str>,
    pub state_class: StateClass,
}

/// Display precision (decimal places) defined for a device class
pub fn display_precision(device_class: &str) -> Option<u8> {
    match device_class {
        "temperature" => Some(1),
        _ => None,
    }
}

/// Device class for a `value` control, inferred from its free-form units
pub fn device_class_for_units(units: &str) -> Option<&'static str> {
    match units {
        "°C" => Some("temperature"),
        "ppb" => Some("volatile_organic_compounds_parts"),
        _ => None,
    }
}
