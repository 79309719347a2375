//! Discovery payloads
//!
//! Renders a [`DiscoveryEntity`] into its discovery topic and JSON document.
//! Optional fields are left out of the document instead of being sent as
//! `null`.

use serde::Serialize;
use serde_json::{Map, Value, json};
use wb_conventions::{Namespace, humanize_id, normalize_id};
use wildmatch::WildMatch;

use crate::compositor::{DiscoveryEntity, LightEntity};
use crate::config::DiscoveryConfig;
use crate::mapper::{EntityKind, PrimitiveEntity};
use crate::registry::{Control, Device};

/// `origin.name` of every document this bridge publishes
pub const ORIGIN_NAME: &str = "wb-mqtt-discovery";

const PAYLOAD_ON: &str = "1";
const PAYLOAD_OFF: &str = "0";

/// Discovery config document of one entity
#[derive(Debug, Serialize)]
pub struct ConfigDocument<'a> {
    name: String,
    unique_id: String,
    object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability: Option<Vec<AvailabilityEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_mode: Option<&'static str>,
    device: DeviceBlock<'a>,
    origin: OriginBlock,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct AvailabilityEntry {
    topic: String,
    payload_available: &'static str,
    payload_not_available: &'static str,
}

#[derive(Debug, Serialize)]
struct DeviceBlock<'a> {
    name: &'a str,
    identifiers: [&'a str; 1],
    manufacturer: &'a str,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct OriginBlock {
    name: &'static str,
    sw_version: &'static str,
}

/// Builds discovery topics and documents
pub struct PayloadBuilder {
    namespace: Namespace,
    prefix: String,
    node_id: Option<String>,
    manufacturer: String,
    ignore_availability: bool,
    inverse: Vec<WildMatch>,
}

impl PayloadBuilder {
    pub fn new(namespace: Namespace, config: &DiscoveryConfig) -> Self {
        Self {
            namespace,
            prefix: config.prefix.trim_end_matches('/').to_string(),
            node_id: config.node_id.clone(),
            manufacturer: config.manufacturer.clone(),
            ignore_availability: config.ignore_availability,
            inverse: config.inverse.iter().map(|p| WildMatch::new(p)).collect(),
        }
    }

    /// `<prefix>/<platform>/<node>/<object_id>/config`
    pub fn topic(&self, device: &Device, entity: &DiscoveryEntity) -> String {
        let node = self.node_id.as_deref().unwrap_or(&device.normalized_id);
        format!(
            "{}/{}/{}/{}/config",
            self.prefix,
            entity.platform(),
            node,
            object_id(device, entity.main_control_id())
        )
    }

    /// Config document for `entity`, ready to be serialized
    ///
    /// Returns `None` when a backing control is no longer in the device.
    pub fn document<'a>(
        &'a self,
        device: &'a Device,
        entity: &DiscoveryEntity,
    ) -> Option<ConfigDocument<'a>> {
        let main = device.control(entity.main_control_id())?;
        let unique_id = object_id(device, &main.id);

        let availability = if self.ignore_availability {
            None
        } else {
            let entries = entity
                .control_ids()
                .into_iter()
                .map(|id| AvailabilityEntry {
                    topic: self.namespace.availability_topic(&device.id, id),
                    payload_available: PAYLOAD_ON,
                    payload_not_available: PAYLOAD_OFF,
                })
                .collect();
            Some(entries)
        };

        let fields = match entity {
            DiscoveryEntity::Primitive(p) => {
                let inverted = self.inverse.iter().any(|w| w.matches(&unique_id));
                self.primitive_fields(device, main, p, inverted)
            }
            DiscoveryEntity::Light(light) => self.light_fields(device, light)?,
        };

        Some(ConfigDocument {
            name: display_name(main),
            object_id: unique_id.clone(),
            unique_id,
            availability_mode: availability.as_ref().map(|_| "all"),
            availability,
            device: DeviceBlock {
                name: device.name(),
                identifiers: [device.normalized_id.as_str()],
                manufacturer: &self.manufacturer,
                model: device.driver.as_deref().unwrap_or("UNKNOWN"),
            },
            origin: OriginBlock {
                name: ORIGIN_NAME,
                sw_version: env!("CARGO_PKG_VERSION"),
            },
            fields,
        })
    }

    fn primitive_fields(
        &self,
        device: &Device,
        control: &Control,
        entity: &PrimitiveEntity,
        inverted: bool,
    ) -> Map<String, Value> {
        let state_topic = self.namespace.control_topic(&device.id, &control.id);
        let command_topic = self.namespace.command_topic(&device.id, &control.id);
        let (on, off) = if inverted {
            (PAYLOAD_OFF, PAYLOAD_ON)
        } else {
            (PAYLOAD_ON, PAYLOAD_OFF)
        };

        let mut fields = Map::new();
        match &entity.kind {
            EntityKind::BinarySensor => {
                fields.insert("state_topic".into(), json!(state_topic));
                fields.insert("payload_on".into(), json!(on));
                fields.insert("payload_off".into(), json!(off));
            }
            EntityKind::Button => {
                fields.insert("command_topic".into(), json!(command_topic));
                fields.insert("payload_press".into(), json!(PAYLOAD_ON));
            }
            EntityKind::Switch => {
                fields.insert("state_topic".into(), json!(state_topic));
                fields.insert("command_topic".into(), json!(command_topic));
                fields.insert("payload_on".into(), json!(on));
                fields.insert("payload_off".into(), json!(off));
                fields.insert("state_on".into(), json!(on));
                fields.insert("state_off".into(), json!(off));
            }
            EntityKind::Number { min, max } => {
                fields.insert("state_topic".into(), json!(state_topic));
                fields.insert("command_topic".into(), json!(command_topic));
                fields.insert("min".into(), number(*min));
                fields.insert("max".into(), number(*max));
                fields.insert("mode".into(), json!("slider"));
                insert_opt(&mut fields, "unit_of_measurement", control.units.as_deref());
            }
            EntityKind::Sensor(spec) => {
                fields.insert("state_topic".into(), json!(state_topic));
                insert_opt(&mut fields, "device_class", spec.device_class);
                insert_opt(&mut fields, "state_class", spec.state_class.map(|s| s.as_str()));
                insert_opt(&mut fields, "unit_of_measurement", spec.unit.as_deref());
                if let Some(precision) = spec.precision {
                    fields.insert("suggested_display_precision".into(), json!(precision));
                    fields.insert(
                        "value_template".into(),
                        json!(format!("{{{{ float(value) | round({precision}) }}}}")),
                    );
                }
            }
        }
        fields
    }

    fn light_fields(&self, device: &Device, light: &LightEntity) -> Option<Map<String, Value>> {
        let ns = &self.namespace;
        let mut fields = Map::new();

        device.control(&light.switch_id)?;
        fields.insert("state_topic".into(), json!(ns.control_topic(&device.id, &light.switch_id)));
        fields.insert("command_topic".into(), json!(ns.command_topic(&device.id, &light.switch_id)));
        fields.insert("payload_on".into(), json!(PAYLOAD_ON));
        fields.insert("payload_off".into(), json!(PAYLOAD_OFF));

        if let Some(brightness) = &light.brightness {
            device.control(&brightness.control_id)?;
            fields.insert(
                "brightness_state_topic".into(),
                json!(ns.control_topic(&device.id, &brightness.control_id)),
            );
            fields.insert(
                "brightness_command_topic".into(),
                json!(ns.command_topic(&device.id, &brightness.control_id)),
            );
            fields.insert("brightness_scale".into(), number(brightness.scale));
        }

        if let Some(palette) = &light.palette_id {
            device.control(palette)?;
            fields.insert("rgb_state_topic".into(), json!(ns.control_topic(&device.id, palette)));
            fields.insert("rgb_command_topic".into(), json!(ns.command_topic(&device.id, palette)));
            fields.insert(
                "rgb_value_template".into(),
                json!("{{ value.split(';') | join(',') }}"),
            );
            fields.insert(
                "rgb_command_template".into(),
                json!("{{ red }};{{ green }};{{ blue }}"),
            );
        }

        Some(fields)
    }
}

/// Normalized `<device>_<control>`
pub fn object_id(device: &Device, control_id: &str) -> String {
    normalize_id(&format!("{}_{}", device.id, control_id))
}

/// Control title, or the id in title case
fn display_name(control: &Control) -> String {
    control
        .title
        .clone()
        .unwrap_or_else(|| humanize_id(&control.id))
}

fn insert_opt(fields: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), json!(value));
    }
}

/// Integral values are rendered as JSON integers
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Brightness, compose};
    use crate::mapper::TypeMapper;
    use crate::meta::{ControlMetaPatch, DeviceMetaPatch};
    use crate::registry::Registry;

    fn builder() -> PayloadBuilder {
        PayloadBuilder::new(Namespace::default(), &DiscoveryConfig::default())
    }

    fn device_with(controls: &[(&str, &str, bool)]) -> Device {
        let mut registry = Registry::new();
        registry.apply_device_meta(
            "wb-mdm3_58",
            &DeviceMetaPatch {
                driver: Some("wb-modbus".to_string()),
                ..Default::default()
            },
        );
        for (id, type_name, read_only) in controls {
            let patch = ControlMetaPatch {
                control_type: Some(type_name.to_string()),
                read_only: Some(*read_only),
                ..Default::default()
            };
            registry.apply_control_meta("wb-mdm3_58", id, &patch).unwrap();
        }
        registry.device("wb-mdm3_58").unwrap().clone()
    }

    fn render(b: &PayloadBuilder, device: &Device, entity: &DiscoveryEntity) -> Value {
        serde_json::to_value(b.document(device, entity).unwrap()).unwrap()
    }

    fn entities(device: &Device) -> Vec<DiscoveryEntity> {
        let mut mapper = TypeMapper::new();
        compose(device.controls().filter_map(|c| mapper.map(c)).collect())
    }

    #[test]
    fn test_switch_document() {
        let device = device_with(&[("K1", "switch", false)]);
        let all = entities(&device);
        let entity = &all[0];
        let b = builder();

        assert_eq!(b.topic(&device, entity), "homeassistant/switch/wb_mdm3_58/wb_mdm3_58_k1/config");

        let doc = render(&b, &device, entity);
        assert_eq!(doc["name"], "K1");
        assert_eq!(doc["unique_id"], "wb_mdm3_58_k1");
        assert_eq!(doc["object_id"], "wb_mdm3_58_k1");
        assert_eq!(doc["state_topic"], "/devices/wb-mdm3_58/controls/K1");
        assert_eq!(doc["command_topic"], "/devices/wb-mdm3_58/controls/K1/on");
        assert_eq!(doc["payload_on"], "1");
        assert_eq!(doc["state_off"], "0");
        assert_eq!(doc["device"]["identifiers"], json!(["wb_mdm3_58"]));
        assert_eq!(doc["device"]["manufacturer"], "Wiren Board");
        assert_eq!(doc["device"]["model"], "wb-modbus");
        assert_eq!(doc["origin"]["name"], ORIGIN_NAME);
        assert_eq!(doc["availability_mode"], "all");
        assert_eq!(
            doc["availability"],
            json!([{
                "topic": "/devices/wb-mdm3_58/controls/K1/availability",
                "payload_available": "1",
                "payload_not_available": "0"
            }])
        );
    }

    #[test]
    fn test_number_bounds_are_integers() {
        let device = device_with(&[("Level", "range", false)]);
        let all = entities(&device);
        let doc = render(&builder(), &device, &all[0]);
        assert_eq!(doc["min"], json!(0));
        assert_eq!(doc["max"], json!(1_000_000_000));
        assert_eq!(doc["mode"], "slider");
        assert!(doc.get("unit_of_measurement").is_none());
    }

    #[test]
    fn test_sensor_omits_absent_fields() {
        let device = device_with(&[("Serial", "text", true)]);
        let all = entities(&device);
        let doc = render(&builder(), &device, &all[0]);
        let object = doc.as_object().unwrap();
        assert!(!object.contains_key("device_class"));
        assert!(!object.contains_key("value_template"));
        assert!(!object.values().any(Value::is_null));
    }

    #[test]
    fn test_document_encodes_to_bytes() {
        let device = device_with(&[("K1", "switch", false)]);
        let all = entities(&device);
        let b = builder();
        let document = b.document(&device, &all[0]).unwrap();

        let bytes = serde_json::to_vec(&document).unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["unique_id"], "wb_mdm3_58_k1");
        assert_eq!(decoded["command_topic"], "/devices/wb-mdm3_58/controls/K1/on");
    }

    #[test]
    fn test_button_document() {
        let device = device_with(&[("Reset", "pushbutton", false)]);
        let all = entities(&device);
        let entity = &all[0];
        assert_eq!(
            builder().topic(&device, entity),
            "homeassistant/button/wb_mdm3_58/wb_mdm3_58_reset/config"
        );
        let doc = render(&builder(), &device, entity);
        assert_eq!(doc["payload_press"], "1");
        assert_eq!(doc["command_topic"], "/devices/wb-mdm3_58/controls/Reset/on");
    }

    #[test]
    fn test_light_document() {
        let device = device_with(&[("Channel 1", "switch", false), ("Channel 1 Brightness", "range", false)]);
        let light = DiscoveryEntity::Light(LightEntity {
            switch_id: "Channel 1".to_string(),
            brightness: Some(Brightness {
                control_id: "Channel 1 Brightness".to_string(),
                scale: 255.0,
            }),
            palette_id: None,
        });
        let b = builder();

        assert_eq!(
            b.topic(&device, &light),
            "homeassistant/light/wb_mdm3_58/wb_mdm3_58_channel_1/config"
        );
        let doc = render(&b, &device, &light);
        assert_eq!(doc["brightness_scale"], json!(255));
        assert_eq!(
            doc["brightness_command_topic"],
            "/devices/wb-mdm3_58/controls/Channel 1 Brightness/on"
        );
        assert_eq!(doc["availability"].as_array().unwrap().len(), 2);
        assert!(doc.get("rgb_state_topic").is_none());
    }

    #[test]
    fn test_light_with_missing_control() {
        let device = device_with(&[("Channel 1", "switch", false)]);
        let light = DiscoveryEntity::Light(LightEntity {
            switch_id: "Channel 1".to_string(),
            brightness: Some(Brightness {
                control_id: "Channel 1 Brightness".to_string(),
                scale: 255.0,
            }),
            palette_id: None,
        });
        assert!(builder().document(&device, &light).is_none());
    }

    #[test]
    fn test_title_and_node_id() {
        let mut device = device_with(&[("k1_power", "switch", true)]);
        let config = DiscoveryConfig {
            node_id: Some("wirenboard".to_string()),
            ..Default::default()
        };
        let b = PayloadBuilder::new(Namespace::default(), &config);
        let all = entities(&device);
        let entity = &all[0];

        assert_eq!(
            b.topic(&device, entity),
            "homeassistant/binary_sensor/wirenboard/wb_mdm3_58_k1_power/config"
        );
        assert_eq!(render(&b, &device, entity)["name"], "K1 Power");

        device.control_mut("k1_power").unwrap().title = Some("Door".to_string());
        assert_eq!(render(&b, &device, entity)["name"], "Door");
    }

    #[test]
    fn test_inverse_patterns() {
        let device = device_with(&[("Input 1", "switch", true), ("Input 2", "switch", true)]);
        let config = DiscoveryConfig {
            inverse: vec!["*_input_1".to_string()],
            ..Default::default()
        };
        let b = PayloadBuilder::new(Namespace::default(), &config);
        let all = entities(&device);

        let inverted = render(&b, &device, &all[0]);
        assert_eq!(inverted["payload_on"], "0");
        assert_eq!(inverted["payload_off"], "1");

        let plain = render(&b, &device, &all[1]);
        assert_eq!(plain["payload_on"], "1");
    }

    #[test]
    fn test_ignore_availability() {
        let device = device_with(&[("K1", "switch", false)]);
        let config = DiscoveryConfig {
            ignore_availability: true,
            ..Default::default()
        };
        let all = entities(&device);
        let doc = render(&PayloadBuilder::new(Namespace::default(), &config), &device, &all[0]);
        assert!(doc.get("availability").is_none());
        assert!(doc.get("availability_mode").is_none());
    }
}
