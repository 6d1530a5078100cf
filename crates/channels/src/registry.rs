use {
    super::plugin::ChannelPlugin,
    std::collections::BTreeMap,
    tracing::{info, warn},
};

/// Registry of all loaded channel plugins.
pub struct ChannelRegistry {
    plugins: BTreeMap<String, Box<dyn ChannelPlugin>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        info!(channel = plugin.id(), "channel plugin registered");
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    pub fn get(&self, id: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(id).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Box<dyn ChannelPlugin>> {
        self.plugins.get_mut(id)
    }

    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }

    /// Stop every started account on every plugin.
    pub async fn stop_all(&mut self) {
        for (id, plugin) in self.plugins.iter_mut() {
            for account_id in plugin.account_ids() {
                if let Err(e) = plugin.stop_account(&account_id).await {
                    warn!(channel = %id, account_id, error = %e, "failed to stop account");
                }
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::plugin::ChannelStatus,
        async_trait::async_trait,
        std::sync::{Arc, Mutex},
    };

    struct FakePlugin {
        accounts: Vec<String>,
        stopped: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChannelPlugin for FakePlugin {
        fn id(&self) -> &str {
            "fake"
        }

        fn name(&self) -> &str {
            "Fake"
        }

        async fn start_account(
            &mut self,
            account_id: &str,
            _config: serde_json::Value,
        ) -> anyhow::Result<()> {
            self.accounts.push(account_id.to_string());
            Ok(())
        }

        async fn stop_account(&mut self, account_id: &str) -> anyhow::Result<()> {
            self.accounts.retain(|a| a != account_id);
            self.stopped.lock().unwrap().push(account_id.to_string());
            Ok(())
        }

        fn account_ids(&self) -> Vec<String> {
            self.accounts.clone()
        }

        fn status(&self) -> Option<&dyn ChannelStatus> {
            None
        }
    }

    #[tokio::test]
    async fn stop_all_stops_every_account() {
        let stopped = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ChannelRegistry::new();
        registry.register(Box::new(FakePlugin {
            accounts: Vec::new(),
            stopped: Arc::clone(&stopped),
        }));

        let plugin = registry.get_mut("fake").unwrap();
        plugin.start_account("a", serde_json::json!({})).await.unwrap();
        plugin.start_account("b", serde_json::json!({})).await.unwrap();
        assert_eq!(registry.list(), vec!["fake"]);

        registry.stop_all().await;
        assert_eq!(*stopped.lock().unwrap(), vec!["a", "b"]);
        assert!(registry.get("fake").unwrap().account_ids().is_empty());
    }
}
