mod basic;
mod client;
pub mod auth;
pub mod error;
pub mod governor;
pub mod retry;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use error::{ApiError, FailureClass};
pub use governor::RateGovernor;
pub use retry::RetryPolicy;

/// Executes `req` and returns the body, mapping non-success statuses onto
/// [`ApiError`]. A 204 is reported as [`ApiError::NoContent`].
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    req: reqwest::Request,
) -> Result<Vec<u8>, ApiError> {
    let resp = client.execute(req).await?;
    let status = resp.status().as_u16();
    if status == 204 {
        return Err(ApiError::NoContent);
    }
    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, body).unwrap_or(ApiError::Status {
            status,
            body: String::new(),
        }));
    }
    Ok(resp.bytes().await?.to_vec())
}
