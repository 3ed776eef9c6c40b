//! Stub adapter used where no network client is wired in
//!
//! The stub accepts any content from an account with a non-empty token,
//! returns a synthetic external id and reports zeroed counters. It lets the
//! batch binaries run end to end against a real database without reaching an
//! external API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::platforms::{MetricReading, PlatformAdapter, PlatformOptions, PublishContent, PublishReceipt};
use crate::types::Credentials;

pub struct StubAdapter {
    name: String,
}

impl StubAdapter {
    pub fn new(platform: &str) -> Self {
        Self {
            name: platform.to_string(),
        }
    }

    fn check_credentials(&self, credentials: &Credentials) -> Result<()> {
        if credentials.access_token.expose_secret().is_empty() {
            return Err(PlatformError::Authentication(format!(
                "{} rejected an empty access token",
                self.name
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        content: &PublishContent,
        credentials: &Credentials,
        options: &PlatformOptions,
    ) -> Result<PublishReceipt> {
        self.check_credentials(credentials)?;

        let external_post_id = format!("{}_{}", self.name, uuid::Uuid::new_v4().simple());
        debug!(
            platform = %self.name,
            options = options.tag(),
            media = content.media.len(),
            external_post_id = %external_post_id,
            "stub publish"
        );

        Ok(PublishReceipt {
            external_post_id,
            published_at: chrono::Utc::now().timestamp(),
            platform_data: Some(serde_json::json!({ "stub": true })),
        })
    }

    async fn fetch_analytics(
        &self,
        credentials: &Credentials,
        external_post_id: &str,
    ) -> Result<MetricReading> {
        self.check_credentials(credentials)?;
        debug!(platform = %self.name, external_post_id, "stub analytics fetch");

        Ok(MetricReading {
            platform_data: Some(serde_json::json!({ "stub": true })),
            ..Default::default()
        })
    }
}
