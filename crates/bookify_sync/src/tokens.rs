//! Token lifecycle: proactive refresh, refresh after rejection, reauth marking.
//!
//! Token reads and refreshes are serialised per connection. A task that waited on the lock
//! reads the connection afresh and uses whatever token the previous holder stored instead of
//! refreshing again.

use std::sync::Arc;

use bookify_calendar::{AdapterError, AdapterRegistry, Credential};
use bookify_common::models::CalendarConnection;
use bookify_config::SyncConfig;
use bookify_db::repositories::{ConnectionRepository, SqlConnectionRepository, TokenUpdate};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

#[derive(Clone)]
pub struct TokenLifecycleManager {
    connections: SqlConnectionRepository,
    adapters: AdapterRegistry,
    refresh_horizon: Duration,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TokenLifecycleManager {
    pub fn new(
        connections: SqlConnectionRepository,
        adapters: AdapterRegistry,
        config: &SyncConfig,
    ) -> Self {
        Self {
            connections,
            adapters,
            refresh_horizon: Duration::minutes(config.token_refresh_threshold_minutes.max(0)),
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(connection_id).or_default().clone()
    }

    /// Drops the lock entry of a deleted connection.
    pub fn forget(&self, connection_id: Uuid) {
        self.locks.remove(&connection_id);
    }

    async fn load(&self, connection_id: Uuid) -> Result<CalendarConnection, SyncError> {
        self.connections
            .find_connection(connection_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound(connection_id))
    }

    fn needs_refresh(&self, connection: &CalendarConnection) -> bool {
        connection.platform.uses_oauth()
            && connection.token_expires_within(Utc::now(), self.refresh_horizon)
    }

    /// A credential that is valid for at least the refresh horizon.
    ///
    /// The connection is read under the lock, so a caller arriving during a refresh gets the
    /// replacement token rather than the one being replaced.
    pub async fn ensure_valid_token(&self, connection_id: Uuid) -> Result<Credential, SyncError> {
        let lock = self.lock_for(connection_id);
        let _guard = lock.lock().await;

        let connection = self.load(connection_id).await?;
        ensure_active(&connection)?;
        if !self.needs_refresh(&connection) {
            return Ok(credential_of(&connection));
        }
        debug!(connection_id = %connection_id, "Token expires soon, refreshing");
        self.refresh_locked(&connection).await
    }

    /// Refreshes after the platform rejected `rejected_token`, unless another task already
    /// replaced it.
    pub async fn refresh_after_rejection(
        &self,
        connection_id: Uuid,
        rejected_token: &str,
    ) -> Result<Credential, SyncError> {
        let lock = self.lock_for(connection_id);
        let _guard = lock.lock().await;

        let connection = self.load(connection_id).await?;
        ensure_active(&connection)?;
        if connection.access_token != rejected_token {
            debug!(connection_id = %connection_id, "Rejected token already replaced");
            return Ok(credential_of(&connection));
        }
        self.refresh_locked(&connection).await
    }

    pub async fn mark_reauth_required(
        &self,
        connection_id: Uuid,
        reason: &str,
    ) -> Result<(), SyncError> {
        warn!(connection_id = %connection_id, "Connection needs reauthorization: {}", reason);
        self.connections.mark_reauth_required(connection_id).await?;
        Ok(())
    }

    /// Caller holds the connection lock.
    async fn refresh_locked(&self, connection: &CalendarConnection) -> Result<Credential, SyncError> {
        if !connection.platform.uses_oauth() {
            // an app-specific password cannot be refreshed; rejection means it was revoked
            self.mark_reauth_required(connection.id, "app-specific password rejected")
                .await?;
            return Err(SyncError::ReauthRequired(connection.id));
        }
        let Some(refresh_token) = connection.refresh_token.as_deref() else {
            self.mark_reauth_required(connection.id, "no refresh token stored")
                .await?;
            return Err(SyncError::ReauthRequired(connection.id));
        };

        let adapter = self.adapters.get(connection.platform)?;
        match adapter.refresh_token(refresh_token).await {
            Ok(grant) => {
                self.connections
                    .update_tokens(
                        connection.id,
                        TokenUpdate {
                            access_token: grant.access_token.clone(),
                            refresh_token: grant.refresh_token,
                            expires_at: grant.expires_at,
                        },
                    )
                    .await?;
                info!(
                    connection_id = %connection.id,
                    platform = %connection.platform,
                    "Refreshed access token"
                );
                Ok(Credential {
                    access_token: grant.access_token,
                    account_email: connection.account_email.clone(),
                })
            }
            Err(AdapterError::AuthExpired(reason)) => {
                self.mark_reauth_required(connection.id, &reason).await?;
                Err(SyncError::ReauthRequired(connection.id))
            }
            Err(err) => {
                warn!(connection_id = %connection.id, "Token refresh failed: {}", err);
                Err(err.into())
            }
        }
    }
}

fn ensure_active(connection: &CalendarConnection) -> Result<(), SyncError> {
    if connection.is_active && !connection.reauth_required {
        Ok(())
    } else {
        Err(SyncError::ReauthRequired(connection.id))
    }
}

fn credential_of(connection: &CalendarConnection) -> Credential {
    Credential {
        access_token: connection.access_token.clone(),
        account_email: connection.account_email.clone(),
    }
}
