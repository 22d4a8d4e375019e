use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::fetch::error::ApiError;
use crate::services::source_api::TokenSource;

struct TokenState {
    token: Option<String>,
    fetched_at: Option<Instant>,
}

/// Owns the shared bearer token.
///
/// Every read goes through the mutex, so workers always see the latest token.
/// The token is refreshed proactively once `refresh_interval` has elapsed and
/// reactively via [`CredentialBroker::force_refresh`] after a 401.
pub struct CredentialBroker {
    source: Arc<dyn TokenSource>,
    refresh_interval: Duration,
    state: Mutex<TokenState>,
}

impl CredentialBroker {
    pub fn new(source: Arc<dyn TokenSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            state: Mutex::new(TokenState {
                token: None,
                fetched_at: None,
            }),
        }
    }

    /// Returns the current token, fetching a new one first if none is held or
    /// the refresh interval has elapsed.
    ///
    /// A failed scheduled refresh keeps the held token and waits another
    /// interval. Errors surface only when no token is held.
    pub async fn current(&self) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        let fresh = match (&state.token, state.fetched_at) {
            (Some(_), Some(at)) => at.elapsed() < self.refresh_interval,
            _ => false,
        };
        if !fresh {
            if state.token.is_some() {
                info!("Refreshing access token on schedule");
            }
            if let Err(err) = self.refresh_locked(&mut state).await {
                if state.token.is_none() {
                    return Err(err);
                }
                warn!(error = %err, "Scheduled token refresh failed, keeping current token");
                state.fetched_at = Some(Instant::now());
            }
        }
        state.token.clone().ok_or(ApiError::Unauthorized)
    }

    /// Replaces `stale` with a new token.
    ///
    /// When another worker already swapped the token since `stale` was handed
    /// out, the newer token is returned without another round trip.
    pub async fn force_refresh(&self, stale: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.token.as_deref() {
            if current != stale {
                return Ok(current.to_string());
            }
        }
        warn!("Force refreshing access token");
        if let Err(err) = self.refresh_locked(&mut state).await {
            // The rejected token is useless; the next read fetches a new one.
            state.token = None;
            state.fetched_at = None;
            return Err(err);
        }
        state.token.clone().ok_or(ApiError::Unauthorized)
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> Result<(), ApiError> {
        let token = self.source.get_token().await?;
        state.token = Some(token);
        state.fetched_at = Some(Instant::now());
        Ok(())
    }
}
