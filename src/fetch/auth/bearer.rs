use crate::fetch::client::HttpClient;
use crate::fetch::error::ApiError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};

/// An [`HttpClient`] wrapper that sends `Authorization: Bearer <token>`.
///
/// Built per call from the token the credential broker currently holds, so a
/// refreshed token is picked up by the very next request.
pub struct Bearer<'a, C> {
    inner: &'a C,
    value: HeaderValue,
}

impl<'a, C> Bearer<'a, C> {
    pub fn new(inner: &'a C, token: &str) -> Result<Self, ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ApiError::Unauthorized)?;
        value.set_sensitive(true);
        Ok(Self { inner, value })
    }
}

#[async_trait]
impl<'a, C: HttpClient> HttpClient for Bearer<'a, C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(AUTHORIZATION, self.value.clone());
        self.inner.execute(req).await
    }
}
