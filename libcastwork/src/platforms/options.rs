//! Typed per-platform publishing options
//!
//! Accounts store their platform settings as a JSON object. The object is
//! decoded into a [`PlatformOptions`] variant once, when the account row is
//! loaded, so adapters never see untyped maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookOptions {
    pub page_id: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramOptions {
    pub business_account_id: Option<String>,
    pub share_to_feed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterOptions {
    /// Split long text into a thread instead of truncating
    pub thread_long_text: bool,
    pub reply_settings: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedinOptions {
    pub author_urn: Option<String>,
    pub visibility: String,
}

impl Default for LinkedinOptions {
    fn default() -> Self {
        Self {
            author_urn: None,
            visibility: "PUBLIC".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiktokOptions {
    pub privacy_level: String,
    pub disable_comments: bool,
}

impl Default for TiktokOptions {
    fn default() -> Self {
        Self {
            privacy_level: "PUBLIC_TO_EVERYONE".to_string(),
            disable_comments: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeOptions {
    pub channel_id: Option<String>,
    pub privacy_status: String,
    pub category_id: Option<String>,
}

impl Default for YoutubeOptions {
    fn default() -> Self {
        Self {
            channel_id: None,
            privacy_status: "public".to_string(),
            category_id: None,
        }
    }
}

/// Settings for platforms without a dedicated variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericOptions {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformOptions {
    Facebook(FacebookOptions),
    Instagram(InstagramOptions),
    Twitter(TwitterOptions),
    Linkedin(LinkedinOptions),
    Tiktok(TiktokOptions),
    Youtube(YoutubeOptions),
    Generic(GenericOptions),
}

impl PlatformOptions {
    /// Serde tag used for a platform identifier
    fn tag_for(platform: &str) -> &'static str {
        match platform {
            "facebook" => "facebook",
            "instagram" => "instagram",
            "twitter" | "x" => "twitter",
            "linkedin" => "linkedin",
            "tiktok" => "tiktok",
            "youtube" => "youtube",
            _ => "generic",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Facebook(_) => "facebook",
            Self::Instagram(_) => "instagram",
            Self::Twitter(_) => "twitter",
            Self::Linkedin(_) => "linkedin",
            Self::Tiktok(_) => "tiktok",
            Self::Youtube(_) => "youtube",
            Self::Generic(_) => "generic",
        }
    }

    pub fn default_for(platform: &str) -> Self {
        match Self::tag_for(platform) {
            "facebook" => Self::Facebook(FacebookOptions::default()),
            "instagram" => Self::Instagram(InstagramOptions::default()),
            "twitter" => Self::Twitter(TwitterOptions::default()),
            "linkedin" => Self::Linkedin(LinkedinOptions::default()),
            "tiktok" => Self::Tiktok(TiktokOptions::default()),
            "youtube" => Self::Youtube(YoutubeOptions::default()),
            _ => Self::Generic(GenericOptions::default()),
        }
    }

    /// Decode stored account metadata for `platform`
    ///
    /// The stored object may omit the `platform` tag; it is implied by the
    /// account. A tag naming a different platform is rejected.
    pub fn decode(platform: &str, metadata: Option<&str>) -> Result<Self, String> {
        let raw = match metadata.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Self::default_for(platform)),
        };

        let mut value: Value =
            serde_json::from_str(raw).map_err(|e| format!("invalid options JSON: {}", e))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| "platform options must be a JSON object".to_string())?;

        let expected = Self::tag_for(platform);
        object
            .entry("platform")
            .or_insert_with(|| Value::String(expected.to_string()));

        let options: Self = serde_json::from_value(value)
            .map_err(|e| format!("invalid {} options: {}", expected, e))?;

        if options.tag() != expected {
            return Err(format!(
                "options are tagged '{}' but the account is on '{}'",
                options.tag(),
                platform
            ));
        }

        Ok(options)
    }

    /// Encode for storage alongside the account
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
