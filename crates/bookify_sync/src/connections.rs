//! Connecting, disconnecting and flagging calendar connections.

use bookify_calendar::{AdapterRegistry, ConnectRequest, Credential};
use bookify_common::models::{CalendarConnection, CalendarSettings, Platform};
use bookify_db::repositories::{
    ConnectionRepository, ProviderRepository, SqlConnectionRepository, SqlProviderRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::tokens::TokenLifecycleManager;

/// Input of [`ConnectionService::connect`].
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub provider_id: Uuid,
    pub platform: Platform,
    pub request: ConnectRequest,
    /// Empty means the account's primary calendar (OAuth platforms only).
    pub calendars: Vec<CalendarSettings>,
    pub make_default: bool,
}

#[derive(Clone)]
pub struct ConnectionService {
    connections: SqlConnectionRepository,
    providers: SqlProviderRepository,
    adapters: AdapterRegistry,
    tokens: TokenLifecycleManager,
}

impl ConnectionService {
    pub fn new(
        connections: SqlConnectionRepository,
        providers: SqlProviderRepository,
        adapters: AdapterRegistry,
        tokens: TokenLifecycleManager,
    ) -> Self {
        Self {
            connections,
            providers,
            adapters,
            tokens,
        }
    }

    /// Exchanges the credentials with the platform and stores an active connection.
    pub async fn connect(&self, new: NewConnection) -> Result<CalendarConnection, SyncError> {
        let mut calendars = new.calendars;
        if calendars.is_empty() {
            if !new.platform.uses_oauth() {
                return Err(SyncError::InvalidInput(
                    "Apple connections need at least one calendar collection".to_string(),
                ));
            }
            calendars.push(CalendarSettings::new("primary"));
        }
        if calendars.iter().any(|c| c.calendar_id.trim().is_empty()) {
            return Err(SyncError::InvalidInput("calendar_id must not be empty".to_string()));
        }
        if self.providers.find_provider(new.provider_id).await?.is_none() {
            return Err(SyncError::InvalidInput(format!(
                "unknown provider {}",
                new.provider_id
            )));
        }

        let adapter = self.adapters.get(new.platform)?;
        let grant = adapter.connect(new.request).await?;

        let mut connection =
            CalendarConnection::new(new.provider_id, new.platform, grant.access_token);
        connection.refresh_token = grant.refresh_token;
        connection.token_expires_at = grant.expires_at;
        connection.account_email = grant.account_email;
        connection.calendars = calendars;
        connection.is_default_for_bookings = new.make_default;

        let connection = self.connections.insert_connection(connection).await?;
        info!(
            provider_id = %connection.provider_id,
            connection_id = %connection.id,
            "Connected {} calendar",
            connection.platform
        );
        Ok(connection)
    }

    /// Revokes at the platform when possible, then deletes the connection and its cache.
    ///
    /// A connection of another provider is reported as not found and left untouched.
    pub async fn disconnect(&self, provider_id: Uuid, connection_id: Uuid) -> Result<(), SyncError> {
        let connection = self
            .connections
            .find_connection(connection_id)
            .await?
            .filter(|c| c.provider_id == provider_id)
            .ok_or(SyncError::ConnectionNotFound(connection_id))?;

        match self.adapters.get(connection.platform) {
            Ok(adapter) => {
                let credential = Credential {
                    access_token: connection.access_token.clone(),
                    account_email: connection.account_email.clone(),
                };
                if let Err(e) = adapter.disconnect(&credential).await {
                    warn!(connection_id = %connection_id, "Revocation failed: {}", e);
                }
            }
            Err(e) => warn!(connection_id = %connection_id, "Skipping revocation: {}", e),
        }

        if !self
            .connections
            .delete_connection(provider_id, connection_id)
            .await?
        {
            return Err(SyncError::ConnectionNotFound(connection_id));
        }
        self.tokens.forget(connection_id);
        info!(
            provider_id = %provider_id,
            connection_id = %connection_id,
            "Disconnected {} calendar",
            connection.platform
        );
        Ok(())
    }

    pub async fn set_default_for_bookings(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
    ) -> Result<(), SyncError> {
        if self
            .connections
            .set_default_for_bookings(provider_id, connection_id)
            .await?
        {
            Ok(())
        } else {
            Err(SyncError::ConnectionNotFound(connection_id))
        }
    }
}
