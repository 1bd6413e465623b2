// --- File: crates/bookify_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8086,
        }
    }
}

// --- Database Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String, // e.g. sqlite:data/bookify.db, loaded via BOOKIFY__DATABASE__URL
    #[serde(default)]
    pub max_connections: Option<u32>,
}

// --- Calendar Sync Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Days ahead of now covered by a regular sync cycle.
    pub fetch_window_days: i64,
    /// Days before now still refreshed, so events that just ended are reconciled.
    pub lookback_days: i64,
    /// Days ahead covered by an explicit backfill.
    pub backfill_days: i64,
    /// Upper bound on simultaneous connection syncs for one provider (clamped to 1..=8).
    pub max_concurrent_syncs: usize,
    /// Tokens expiring within this many minutes are refreshed before use.
    pub token_refresh_threshold_minutes: i64,
    /// Timeout applied to every adapter HTTP call.
    pub http_timeout_secs: u64,
    /// Run the fast-path sync before every availability lookup.
    pub sync_on_lookup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_window_days: 30,
            lookback_days: 1,
            backfill_days: 365,
            max_concurrent_syncs: 4,
            token_refresh_threshold_minutes: 5,
            http_timeout_secs: 30,
            sync_on_lookup: false,
        }
    }
}

// --- Scheduling Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Grid used when enumerating slot candidates inside a free interval.
    pub slot_step_minutes: i64,
    /// Used for providers whose stored time zone cannot be parsed.
    pub default_time_zone: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 15,
            default_time_zone: "Europe/Zurich".to_string(),
        }
    }
}

// --- OAuth platform Config (Google, Microsoft) ---
// client_secret is usually "secret_from_env" in the config files.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    /// Overrides the platform token endpoint.
    pub token_url: Option<String>,
    /// Overrides the platform API base URL.
    pub api_base: Option<String>,
    /// Overrides the platform revoke endpoint (Google only).
    pub revoke_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

// --- Apple CalDAV Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppleConfig {
    pub caldav_base_url: String,
}

impl Default for AppleConfig {
    fn default() -> Self {
        Self {
            caldav_base_url: "https://caldav.icloud.com".to_string(),
        }
    }
}

// --- Logging Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: Option<String>,
    /// When set, logs are additionally written to a daily rolling file in this directory.
    pub directory: Option<String>,
}

// --- Unified App Configuration ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    // --- Runtime Flags (optional in config file, default to false) ---
    #[serde(default)]
    pub use_google: bool,
    #[serde(default)]
    pub use_microsoft: bool,
    #[serde(default)]
    pub use_apple: bool,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    // --- Optional platform configurations ---
    #[serde(default)]
    pub google: Option<OAuthClientConfig>,
    #[serde(default)]
    pub microsoft: Option<OAuthClientConfig>,
    #[serde(default)]
    pub apple: Option<AppleConfig>,
}
