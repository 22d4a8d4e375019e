use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::fetch::auth::Bearer;
use crate::fetch::{ApiError, BasicClient, fetch_bytes};
use crate::services::source_api::{Profile, TestSource, TestSummary, TokenSource};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// HTTP client for the ForceDecks API and its profile and token services.
///
/// Each call is a single attempt; status codes are mapped onto [`ApiError`]
/// so the pipeline can decide how to react.
pub struct ForceDecksClient {
    config: ApiConfig,
    http: BasicClient,
}

impl ForceDecksClient {
    pub fn new(config: ApiConfig, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            config,
            http: BasicClient::with_timeout(timeout)?,
        })
    }

    async fn get_json(&self, url: reqwest::Url, token: &str) -> Result<Vec<u8>, ApiError> {
        let authed = Bearer::new(&self.http, token)?;
        let req = reqwest::Request::new(reqwest::Method::GET, url);
        fetch_bytes(&authed, req).await
    }
}

fn parse_url(base: &str, params: &[(&str, &str)]) -> Result<reqwest::Url, ApiError> {
    reqwest::Url::parse_with_params(base, params)
        .map_err(|e| ApiError::Transport(format!("invalid url '{base}': {e}")))
}

/// Accepts full timestamps or bare dates.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Some records omit the zone suffix; the source reports UTC.
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Extracts profiles from a `{"profiles": [...]}` body. Entries without an
/// identifier are dropped.
pub fn parse_profiles(body: &[u8]) -> Result<Vec<Profile>, ApiError> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let items = json["profiles"].as_array().cloned().unwrap_or_default();

    let profiles = items
        .into_iter()
        .filter_map(|item| {
            let profile_id = match &item["profileId"] {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(Profile {
                profile_id,
                given_name: item["givenName"].as_str().unwrap_or("").to_string(),
                family_name: item["familyName"].as_str().unwrap_or("").to_string(),
                date_of_birth: item["dateOfBirth"].as_str().and_then(parse_date),
            })
        })
        .collect();

    Ok(profiles)
}

/// Extracts test summaries from a `{"tests": [...]}` body. Entries without an
/// identifier or a parseable modification time are dropped.
pub fn parse_tests(body: &[u8]) -> Result<Vec<TestSummary>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let items = json["tests"].as_array().cloned().unwrap_or_default();

    let tests = items
        .into_iter()
        .filter_map(|item| {
            let test_id = item["testId"].as_str()?.to_string();
            let modified_at = item["modifiedDateUtc"].as_str().and_then(parse_timestamp)?;
            Some(TestSummary {
                test_id,
                test_type: item["testType"].as_str().unwrap_or("").to_string(),
                modified_at,
                recorded_at: item["recordedDateUtc"].as_str().and_then(parse_timestamp),
            })
        })
        .collect();

    Ok(tests)
}

#[async_trait]
impl TokenSource for ForceDecksClient {
    async fn get_token(&self) -> Result<String, ApiError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let req = self
            .http
            .inner()
            .post(&self.config.auth_url)
            .form(&params)
            .build()?;

        let body = fetch_bytes(&self.http, req).await?;
        let token: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        debug!("Access token issued");
        Ok(token.access_token)
    }
}

#[async_trait]
impl TestSource for ForceDecksClient {
    async fn list_profiles(&self, token: &str) -> Result<Vec<Profile>, ApiError> {
        let url = parse_url(
            &format!("{}/profiles", self.config.profile_url),
            &[("tenantId", self.config.tenant_id.as_str())],
        )?;
        let body = self.get_json(url, token).await?;
        parse_profiles(&body)
    }

    async fn list_tests(
        &self,
        profile_id: &str,
        since: DateTime<Utc>,
        token: &str,
    ) -> Result<Vec<TestSummary>, ApiError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let url = parse_url(
            &format!("{}/tests", self.config.forcedecks_url),
            &[
                ("TenantId", self.config.tenant_id.as_str()),
                ("ModifiedFromUtc", since.as_str()),
                ("ProfileId", profile_id),
            ],
        )?;
        let body = self.get_json(url, token).await?;
        parse_tests(&body)
    }

    async fn get_test_results(&self, test_id: &str, token: &str) -> Result<Vec<u8>, ApiError> {
        let raw = format!(
            "{}/v2019q3/teams/{}/tests/{}/trials",
            self.config.forcedecks_url, self.config.tenant_id, test_id
        );
        let url = reqwest::Url::parse(&raw)
            .map_err(|e| ApiError::Transport(format!("invalid url '{raw}': {e}")))?;
        self.get_json(url, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profiles() {
        let body = br#"{"profiles":[
            {"profileId":"a1","givenName":"Ada","familyName":"Lovelace","dateOfBirth":"2001-04-05T00:00:00Z"},
            {"profileId":"b2","givenName":"Bo","familyName":"Li","dateOfBirth":null},
            {"givenName":"No","familyName":"Id"}
        ]}"#;
        let profiles = parse_profiles(body).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].full_name(), "Ada Lovelace");
        assert_eq!(profiles[0].date_of_birth, NaiveDate::from_ymd_opt(2001, 4, 5));
        assert_eq!(profiles[1].date_of_birth, None);
    }

    #[test]
    fn test_parse_tests_accepts_timestamps_with_and_without_zone() {
        let body = br#"{"tests":[
            {"testId":"t1","testType":"CMJ","modifiedDateUtc":"2023-05-01T10:20:30.123Z"},
            {"testId":"t2","testType":"PPU","modifiedDateUtc":"2023-05-02T08:00:00"},
            {"testId":"t3","testType":"CMJ","modifiedDateUtc":"garbage"}
        ]}"#;
        let tests = parse_tests(body).unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].test_date(), NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        assert_eq!(tests[1].test_type, "PPU");
    }

    #[test]
    fn test_parse_tests_empty_body() {
        assert!(parse_tests(b"").unwrap().is_empty());
        assert!(parse_tests(b"{}").unwrap().is_empty());
        assert!(matches!(parse_tests(b"not json"), Err(ApiError::Decode(_))));
    }
}
