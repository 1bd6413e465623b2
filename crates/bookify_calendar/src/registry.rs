//! Platform to adapter dispatch.

use crate::adapter::CalendarAdapter;
use crate::apple::AppleCalendarAdapter;
use crate::error::AdapterError;
use crate::google::GoogleCalendarAdapter;
use crate::microsoft::MicrosoftCalendarAdapter;
use bookify_common::create_client;
use bookify_common::models::Platform;
use bookify_config::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Adapters keyed by platform. Cheap to clone.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn CalendarAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its own platform, replacing any previous one.
    pub fn with_adapter(mut self, adapter: Arc<dyn CalendarAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    /// Builds one adapter per enabled platform, all sharing one HTTP client with the
    /// configured timeout.
    pub fn from_config(config: &AppConfig) -> Result<Self, AdapterError> {
        let client = create_client(config.sync.http_timeout_secs, true)
            .map_err(|e| AdapterError::Unsupported(format!("HTTP client: {}", e)))?;
        let mut registry = Self::new();

        if config.use_google {
            if let Some(google) = config.google.as_ref() {
                registry = registry
                    .with_adapter(Arc::new(GoogleCalendarAdapter::new(client.clone(), google)));
            }
        }
        if config.use_microsoft {
            if let Some(microsoft) = config.microsoft.as_ref() {
                for platform in [Platform::Outlook, Platform::Teams] {
                    registry = registry.with_adapter(Arc::new(MicrosoftCalendarAdapter::new(
                        platform,
                        client.clone(),
                        microsoft,
                    )));
                }
            }
        }
        if config.use_apple {
            let apple = config.apple.clone().unwrap_or_default();
            registry =
                registry.with_adapter(Arc::new(AppleCalendarAdapter::new(client.clone(), &apple)));
        }

        info!("Calendar adapters registered: {:?}", registry.platforms());
        Ok(registry)
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn CalendarAdapter>, AdapterError> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| AdapterError::Unsupported(format!("{} is not configured", platform)))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
