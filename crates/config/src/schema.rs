use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub channels: ChannelsConfig,
}

/// Channel accounts keyed by account ID.
///
/// Values stay untyped here; each transport deserializes its own account
/// config when the account is started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub gem: BTreeMap<String, serde_json::Value>,
    pub telegram: BTreeMap<String, serde_json::Value>,
}

impl ChannelsConfig {
    /// Every configured `(channel_type, account_id, config)` triple.
    pub fn accounts(&self) -> Vec<(&'static str, &str, &serde_json::Value)> {
        let gem = self.gem.iter().map(|(id, v)| ("gem", id.as_str(), v));
        let telegram = self
            .telegram
            .iter()
            .map(|(id, v)| ("telegram", id.as_str(), v));
        gem.chain(telegram).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.gem.is_empty() && self.telegram.is_empty()
    }
}
