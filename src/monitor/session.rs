//! Session record and device classification.

use serde::{Deserialize, Serialize};

const TABLET_MARKERS: &[&str] = &["tablet", "ipad", "playbook", "silk"];
const MOBILE_MARKERS: &[&str] = &[
    "mobile",
    "iphone",
    "ipod",
    "android",
    "blackberry",
    "opera",
    "mini",
    "windows ce",
    "palm",
    "smartphone",
    "iemobile",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Desktop,
    Tablet,
}

impl DeviceClass {
    /// Classify an agent string. Tablet markers win over mobile markers.
    pub fn classify(agent_info: &str) -> Self {
        let agent = agent_info.to_ascii_lowercase();
        if TABLET_MARKERS.iter().any(|m| agent.contains(m)) {
            DeviceClass::Tablet
        } else if MOBILE_MARKERS.iter().any(|m| agent.contains(m)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Desktop => "desktop",
            DeviceClass::Tablet => "tablet",
        }
    }
}

/// One contiguous usage session.
///
/// `duration` is an estimate while the session runs and becomes exactly
/// `end_time - start_time` once it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    /// Epoch milliseconds
    pub start_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    /// Milliseconds
    pub duration: u64,
    pub is_active: bool,
    /// Location the session was recorded in, e.g. a page URL
    pub context: String,
    pub agent_info: String,
    pub device_class: DeviceClass,
}

impl Session {
    pub(crate) fn begin(
        id: String,
        owner_id: &str,
        start_time: u64,
        context: &str,
        agent_info: &str,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            start_time,
            end_time: None,
            duration: 0,
            is_active: true,
            context: context.to_string(),
            agent_info: agent_info.to_string(),
            device_class: DeviceClass::classify(agent_info),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    pub(crate) fn refresh_estimate(&mut self, now_ms: u64) {
        self.duration = now_ms.saturating_sub(self.start_time);
    }

    pub(crate) fn finish(&mut self, now_ms: u64) {
        let end_time = now_ms.max(self.start_time);
        self.end_time = Some(end_time);
        self.duration = end_time - self.start_time;
        self.is_active = false;
    }
}
