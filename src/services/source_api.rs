//! Traits and types for the force-plate source API.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::fetch::ApiError;

/// Athlete profile as listed by the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub profile_id: String,
    pub given_name: String,
    pub family_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name.trim(), self.family_name.trim())
            .trim()
            .to_string()
    }

    /// Whole years of age on `on`, if the date of birth is known and plausible.
    pub fn age_on(&self, on: NaiveDate) -> Option<i32> {
        let dob = self.date_of_birth?;
        if dob.year() <= 1920 || dob.year() >= on.year() {
            return None;
        }
        let birthday_pending = (on.month(), on.day()) < (dob.month(), dob.day());
        Some(on.year() - dob.year() - i32::from(birthday_pending))
    }
}

/// One test session in an athlete's history.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSummary {
    pub test_id: String,
    pub test_type: String,
    pub modified_at: DateTime<Utc>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl TestSummary {
    pub fn test_date(&self) -> NaiveDate {
        self.modified_at.date_naive()
    }
}

/// Issues bearer tokens for the source API.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_token(&self) -> Result<String, ApiError>;
}

/// Read side of the source API. Implementations perform a single attempt per
/// call; retries, pacing and token refresh are layered on top.
#[async_trait::async_trait]
pub trait TestSource: Send + Sync {
    async fn list_profiles(&self, token: &str) -> Result<Vec<Profile>, ApiError>;

    async fn list_tests(
        &self,
        profile_id: &str,
        since: DateTime<Utc>,
        token: &str,
    ) -> Result<Vec<TestSummary>, ApiError>;

    /// Raw JSON body of a test's trial results.
    async fn get_test_results(&self, test_id: &str, token: &str) -> Result<Vec<u8>, ApiError>;
}
