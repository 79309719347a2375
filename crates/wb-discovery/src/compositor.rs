//! Entity Compositor
//!
//! Collapses groups of primitive entities into composite lights. Runs over the
//! ordered primitives of one device:
//!
//! - RGB light: the reserved controls `RGB Strip` (switch), `RGB Brightness`
//!   (number) and `RGB Palette` (rgb) form one light with color support.
//! - Dimmable light: `<label>` (switch) paired with `<label> Brightness`
//!   (number), e.g. `Channel 1` / `Channel 1 Brightness`.
//!
//! Groups are matched on control ids and then checked against the mapped
//! kinds. Anything that does not fully match stays a primitive entity.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use wb_conventions::ControlType;

use crate::mapper::{EntityKind, Platform, PrimitiveEntity, TypeMapper};
use crate::registry::Device;

pub const RGB_SWITCH: &str = "RGB Strip";
pub const RGB_BRIGHTNESS: &str = "RGB Brightness";
pub const RGB_PALETTE: &str = "RGB Palette";

static BRIGHTNESS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(?P<label>.+) Brightness$").expect("BRIGHTNESS_RE is a valid regex pattern")
});

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Brightness channel of a light
#[derive(Debug, Clone, PartialEq)]
pub struct Brightness {
    pub control_id: String,
    /// Upper bound of the brightness control
    pub scale: f64,
}

/// Light assembled from a switch and its companion controls
#[derive(Debug, Clone, PartialEq)]
pub struct LightEntity {
    pub switch_id: String,
    pub brightness: Option<Brightness>,
    /// Control carrying `R;G;B` color values
    pub palette_id: Option<String>,
}

/// One entity to be announced to the hub
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEntity {
    Primitive(PrimitiveEntity),
    Light(LightEntity),
}

impl DiscoveryEntity {
    pub fn platform(&self) -> Platform {
        match self {
            DiscoveryEntity::Primitive(p) => p.kind.platform(),
            DiscoveryEntity::Light(_) => Platform::Light,
        }
    }

    /// Control the entity is named and keyed after
    pub fn main_control_id(&self) -> &str {
        match self {
            DiscoveryEntity::Primitive(p) => &p.control_id,
            DiscoveryEntity::Light(light) => &light.switch_id,
        }
    }

    /// Every control backing the entity, main control first
    pub fn control_ids(&self) -> Vec<&str> {
        match self {
            DiscoveryEntity::Primitive(p) => vec![p.control_id.as_str()],
            DiscoveryEntity::Light(light) => {
                let mut ids = vec![light.switch_id.as_str()];
                if let Some(brightness) = &light.brightness {
                    ids.push(brightness.control_id.as_str());
                }
                if let Some(palette) = &light.palette_id {
                    ids.push(palette.as_str());
                }
                ids
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composition
// ─────────────────────────────────────────────────────────────────────────────

/// Map every control of `device` and composite the result
pub fn build_entities(mapper: &mut TypeMapper, device: &Device) -> Vec<DiscoveryEntity> {
    let primitives = device.controls().filter_map(|c| mapper.map(c)).collect();
    compose(primitives)
}

/// Replace recognized control groups with composite lights
///
/// Each light takes the position of its switch; consumed brightness and
/// palette entities are dropped.
pub fn compose(primitives: Vec<PrimitiveEntity>) -> Vec<DiscoveryEntity> {
    let index: HashMap<&str, &PrimitiveEntity> =
        primitives.iter().map(|p| (p.control_id.as_str(), p)).collect();

    let mut lights: HashMap<String, LightEntity> = HashMap::new();
    let mut consumed: HashSet<String> = HashSet::new();

    if let Some(light) = rgb_light(&index) {
        consumed.extend(light.brightness.iter().map(|b| b.control_id.clone()));
        consumed.extend(light.palette_id.iter().cloned());
        lights.insert(light.switch_id.clone(), light);
    }

    for number in &primitives {
        let EntityKind::Number { max, .. } = number.kind else {
            continue;
        };
        if consumed.contains(&number.control_id) {
            continue;
        }
        let Some(label) = BRIGHTNESS_RE
            .captures(&number.control_id)
            .and_then(|caps| caps.name("label"))
            .map(|m| m.as_str())
        else {
            continue;
        };
        let Some(switch) = index.get(label) else {
            continue;
        };
        if switch.kind != EntityKind::Switch || lights.contains_key(label) {
            continue;
        }

        consumed.insert(number.control_id.clone());
        lights.insert(
            label.to_string(),
            LightEntity {
                switch_id: label.to_string(),
                brightness: Some(Brightness {
                    control_id: number.control_id.clone(),
                    scale: max,
                }),
                palette_id: None,
            },
        );
    }

    primitives
        .into_iter()
        .filter(|p| !consumed.contains(&p.control_id))
        .map(|p| match lights.remove(&p.control_id) {
            Some(light) => DiscoveryEntity::Light(light),
            None => DiscoveryEntity::Primitive(p),
        })
        .collect()
}

fn rgb_light(index: &HashMap<&str, &PrimitiveEntity>) -> Option<LightEntity> {
    let switch = index.get(RGB_SWITCH)?;
    let brightness = index.get(RGB_BRIGHTNESS)?;
    let palette = index.get(RGB_PALETTE)?;

    let EntityKind::Number { max, .. } = brightness.kind else {
        return None;
    };
    if switch.kind != EntityKind::Switch || palette.control_type != ControlType::Rgb {
        return None;
    }

    Some(LightEntity {
        switch_id: switch.control_id.clone(),
        brightness: Some(Brightness {
            control_id: brightness.control_id.clone(),
            scale: max,
        }),
        palette_id: Some(palette.control_id.clone()),
    })
}
