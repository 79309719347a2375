//! Metadata Patches
//!
//! Partial updates extracted from device and control meta messages. Metadata
//! arrives in two forms: a JSON object on `.../meta`, or one raw value per
//! `.../meta/<field>` topic. Both produce the same patch type, where `None`
//! means "not mentioned in this message".

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::router::RouteError;

// ─────────────────────────────────────────────────────────────────────────────
// Device Meta
// ─────────────────────────────────────────────────────────────────────────────

/// Partial update of a device's metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceMetaPatch {
    pub display_name: Option<String>,
    pub driver: Option<String>,
}

#[derive(Deserialize)]
struct RawDeviceMeta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "de_title")]
    title: Option<String>,
    #[serde(default)]
    driver: Option<String>,
}

impl DeviceMetaPatch {
    /// Parse the JSON form (`devices/<id>/meta`)
    ///
    /// `title` wins over `name` when both are present. Unknown keys are ignored.
    pub fn from_json(payload: &str) -> Result<Self, RouteError> {
        let raw: RawDeviceMeta = serde_json::from_str(payload)?;
        Ok(Self {
            display_name: raw.title.or(raw.name),
            driver: raw.driver,
        })
    }

    /// Parse the per-field form (`devices/<id>/meta/<field>`)
    pub fn from_field(field: &str, value: &str) -> Self {
        let value = non_empty(value);
        match field {
            "name" | "title" => Self {
                display_name: value,
                ..Default::default()
            },
            "driver" => Self {
                driver: value,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.driver.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control Meta
// ─────────────────────────────────────────────────────────────────────────────

/// Partial update of a control's metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlMetaPatch {
    /// Raw `type` string; validated later by the type mapper
    pub control_type: Option<String>,
    pub read_only: Option<bool>,
    pub units: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub title: Option<String>,
}

#[derive(Deserialize)]
struct RawControlMeta {
    #[serde(default, rename = "type")]
    control_type: Option<String>,
    #[serde(default)]
    readonly: Option<Flag>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    min: Option<Number>,
    #[serde(default)]
    max: Option<Number>,
    #[serde(default, deserialize_with = "de_title")]
    title: Option<String>,
}

impl ControlMetaPatch {
    /// Parse the JSON form (`devices/<id>/controls/<cid>/meta`)
    ///
    /// Keys such as `order` are accepted and ignored.
    pub fn from_json(payload: &str) -> Result<Self, RouteError> {
        let raw: RawControlMeta = serde_json::from_str(payload)?;

        let min = raw.min.map(|n| n.into_f64("min")).transpose()?.flatten();
        let max = raw.max.map(|n| n.into_f64("max")).transpose()?.flatten();

        Ok(Self {
            control_type: raw.control_type.and_then(|t| non_empty(&t)),
            read_only: raw.readonly.map(Flag::into_bool),
            units: raw.units.and_then(|u| non_empty(&u)),
            min,
            max,
            title: raw.title,
        })
    }

    /// Parse the per-field form (`devices/<id>/controls/<cid>/meta/<field>`)
    ///
    /// Empty values leave the field untouched. Unknown fields yield an empty
    /// patch.
    pub fn from_field(field: &str, value: &str) -> Result<Self, RouteError> {
        let mut patch = Self::default();
        let Some(value) = non_empty(value) else {
            return Ok(patch);
        };

        match field {
            "type" => patch.control_type = Some(value),
            "readonly" => patch.read_only = Some(parse_flag(&value)),
            "units" => patch.units = Some(value),
            "min" => patch.min = Some(parse_number(field, &value)?),
            "max" => patch.max = Some(parse_number(field, &value)?),
            "title" => patch.title = Some(value),
            _ => {}
        }

        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `title` is either a plain string or a map of language code to string
#[derive(Deserialize)]
#[serde(untagged)]
enum Title {
    Plain(String),
    Localized(HashMap<String, String>),
}

impl Title {
    fn into_english(self) -> Option<String> {
        match self {
            Title::Plain(s) => non_empty(&s),
            Title::Localized(mut by_lang) => by_lang
                .remove("en")
                .or_else(|| by_lang.into_values().next())
                .and_then(|s| non_empty(&s)),
        }
    }
}

fn de_title<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Title>::deserialize(deserializer)?.and_then(Title::into_english))
}

/// Boolean flag as published by different driver generations
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    fn into_bool(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
            Flag::Text(s) => parse_flag(&s),
        }
    }
}

/// Number that some drivers publish as a string
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Num(f64),
    Text(String),
}

impl Number {
    fn into_f64(self, field: &str) -> Result<Option<f64>, RouteError> {
        match self {
            Number::Num(n) => Ok(Some(n)),
            Number::Text(s) => match non_empty(&s) {
                Some(s) => parse_number(field, &s).map(Some),
                None => Ok(None),
            },
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

fn parse_number(field: &str, value: &str) -> Result<f64, RouteError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| RouteError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
