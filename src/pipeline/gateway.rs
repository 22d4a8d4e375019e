use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::fetch::auth::CredentialBroker;
use crate::fetch::{ApiError, FailureClass, RateGovernor, RetryPolicy};
use crate::services::source_api::{Profile, TestSource, TestSummary};

/// The source API as the pipeline sees it: paced by the rate governor,
/// authenticated through the credential broker, retried per failure class
/// and bounded by a per-call timeout.
pub struct ResilientSource {
    source: Arc<dyn TestSource>,
    broker: CredentialBroker,
    governor: RateGovernor,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ResilientSource {
    pub fn new(
        source: Arc<dyn TestSource>,
        broker: CredentialBroker,
        governor: RateGovernor,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            broker,
            governor,
            retry,
            timeout,
        }
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ApiError> {
        let source = self.source.clone();
        let result = self
            .call("list_profiles", move |token| {
                let source = source.clone();
                async move { source.list_profiles(&token).await }
            })
            .await;
        empty_on_no_content(result)
    }

    /// Test history of one athlete. A 204 is an empty history.
    pub async fn list_tests(
        &self,
        profile_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TestSummary>, ApiError> {
        let source = self.source.clone();
        let profile_id = profile_id.to_string();
        let result = self
            .call("list_tests", move |token| {
                let source = source.clone();
                let profile_id = profile_id.clone();
                async move { source.list_tests(&profile_id, since, &token).await }
            })
            .await;
        empty_on_no_content(result)
    }

    /// Raw trial payload of one test. A 204 is an empty payload.
    pub async fn get_test_results(&self, test_id: &str) -> Result<Vec<u8>, ApiError> {
        let source = self.source.clone();
        let test_id = test_id.to_string();
        let result = self
            .call("get_test_results", move |token| {
                let source = source.clone();
                let test_id = test_id.clone();
                async move { source.get_test_results(&test_id, &token).await }
            })
            .await;
        empty_on_no_content(result)
    }

    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut rate_limited = 0u32;
        let mut unavailable = 0u32;
        let mut unauthorized = 0u32;

        loop {
            // Token errors go through the same failure classes as the call.
            let (token, outcome) = match self.broker.current().await {
                Ok(token) => {
                    let _permit = self.governor.acquire().await;
                    let call = tokio::time::timeout(self.timeout, f(token.clone()));
                    let outcome = match call.await {
                        Ok(result) => result,
                        Err(_) => Err(ApiError::Timeout),
                    };
                    (Some(token), outcome)
                }
                Err(err) => (None, Err(err)),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.class() {
                FailureClass::AuthExpired => {
                    unauthorized += 1;
                    if unauthorized >= self.retry.max_attempts(&err) {
                        warn!(op, attempts = unauthorized, "Unauthorized after token refresh");
                        return Err(err);
                    }
                    warn!(op, "Unauthorized, refreshing token");
                    if let Some(stale) = token {
                        if let Err(refresh_err) = self.broker.force_refresh(&stale).await {
                            warn!(op, error = %refresh_err, "Forced token refresh failed");
                        }
                    }
                }
                FailureClass::Transient => {
                    let counter = match err {
                        ApiError::RateLimited => &mut rate_limited,
                        _ => &mut unavailable,
                    };
                    *counter += 1;
                    let failures = *counter;
                    if failures >= self.retry.max_attempts(&err) {
                        warn!(op, attempts = failures, error = %err, "Giving up after retries");
                        return Err(err);
                    }
                    let delay = self.retry.backoff(failures - 1);
                    warn!(
                        op,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    debug!(op, error = %err, "Call failed");
                    return Err(err);
                }
            }
        }
    }
}

fn empty_on_no_content<T: Default>(result: Result<T, ApiError>) -> Result<T, ApiError> {
    match result {
        Err(ApiError::NoContent) => Ok(T::default()),
        other => other,
    }
}
