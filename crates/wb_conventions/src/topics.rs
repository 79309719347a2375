// Topic Namespace - Builders for the `/devices/...` topic tree
//
// The convention publishes under `<prefix>/devices/...`. The default prefix is
// empty, which yields the conventional leading slash (`/devices/wb-msw/meta`).

/// Topic tree of the sensor/actuator convention
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Create a namespace rooted at `prefix` (trailing slashes are dropped)
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strip the prefix and the leading `/` from an inbound topic
    ///
    /// Returns the remainder starting at `devices/...`, or `None` if the topic
    /// is outside this namespace.
    pub fn strip<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let rest = topic.strip_prefix(self.prefix.as_str())?;
        if self.prefix.is_empty() {
            Some(rest.strip_prefix('/').unwrap_or(rest))
        } else {
            rest.strip_prefix('/')
        }
    }

    /// `<ns>/devices`
    pub fn devices_root(&self) -> String {
        format!("{}/devices", self.prefix)
    }

    /// Wildcards matching every device meta message (JSON and per-field)
    pub fn device_meta_wildcards(&self) -> [String; 2] {
        let root = self.devices_root();
        [format!("{root}/+/meta"), format!("{root}/+/meta/+")]
    }

    /// Wildcards matching every control meta message of one device
    pub fn control_meta_wildcards(&self, device_id: &str) -> [String; 2] {
        let root = self.devices_root();
        [
            format!("{root}/{device_id}/controls/+/meta"),
            format!("{root}/{device_id}/controls/+/meta/+"),
        ]
    }

    /// `<ns>/devices/<device>/controls/<control>/meta/error`
    pub fn control_error_topic(&self, device_id: &str, control_id: &str) -> String {
        format!("{}/meta/error", self.control_topic(device_id, control_id))
    }

    /// `<ns>/devices/<device>/controls/<control>` (carries the control value)
    pub fn control_topic(&self, device_id: &str, control_id: &str) -> String {
        format!("{}/{device_id}/controls/{control_id}", self.devices_root())
    }

    /// `<control topic>/on` (accepts value writes)
    pub fn command_topic(&self, device_id: &str, control_id: &str) -> String {
        format!("{}/on", self.control_topic(device_id, control_id))
    }

    /// `<control topic>/availability`
    pub fn availability_topic(&self, device_id: &str, control_id: &str) -> String {
        format!("{}/availability", self.control_topic(device_id, control_id))
    }
}
