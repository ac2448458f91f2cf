use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub const DEFAULT_API_BASE: &str = "https://api.gptsapi.net/api/v3";
pub const DEFAULT_PROVIDER: &str = "google";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-hd";
pub const DEFAULT_ASPECT: &str = "1:1";
pub const DEFAULT_RESOLUTION: &str = "1k";
pub const DEFAULT_UPLOAD_URL: &str = "https://0x0.st";
pub const API_KEY_ENV: &str = "GPTSAPI_API_KEY";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Which upstream contract the orchestrator talks to.
#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    EnumString,
    EnumIter,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    Default,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `models/{model}:generateContent`, image comes back inline.
    #[default]
    Multimodal,
    /// `{provider}/{model}/text-to-image|image-edit`, then poll `urls.get`.
    JobPolling,
}

/// Connection settings for one orchestrator. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub shape: ResponseShape,
    pub poll_interval: Duration,
    /// Overall polling deadline, also bounds the synchronous generate call.
    pub timeout: Duration,
    pub request_timeout: Duration,
    pub transfer_timeout: Duration,
    pub upload_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_key: None,
            shape: ResponseShape::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            upload_url: DEFAULT_UPLOAD_URL.into(),
        }
    }
}

impl GenerationConfig {
    pub(crate) fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}

/// Explicit argument first, then the configured value, then `GPTSAPI_API_KEY`.
pub fn resolve_api_key(explicit: Option<&str>, configured: Option<&str>) -> Option<String> {
    resolve_api_key_from(explicit, configured, std::env::var(API_KEY_ENV).ok().as_deref())
}

pub fn resolve_api_key_from(
    explicit: Option<&str>,
    configured: Option<&str>,
    env: Option<&str>,
) -> Option<String> {
    [explicit, configured, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_precedence() {
        assert_eq!(
            resolve_api_key_from(Some("arg"), Some("cfg"), Some("env")).as_deref(),
            Some("arg")
        );
        assert_eq!(
            resolve_api_key_from(None, Some("cfg"), Some("env")).as_deref(),
            Some("cfg")
        );
        assert_eq!(
            resolve_api_key_from(Some("  "), Some(""), Some("env")).as_deref(),
            Some("env")
        );
        assert_eq!(resolve_api_key_from(None, None, Some(" ")), None);
    }

    #[test]
    fn shape_names() {
        assert_eq!(ResponseShape::JobPolling.to_string(), "job-polling");
        assert_eq!(
            "multimodal".parse::<ResponseShape>().unwrap(),
            ResponseShape::Multimodal
        );
    }

    #[test]
    fn api_base_without_trailing_slash() {
        let cfg = GenerationConfig {
            api_base: "http://localhost/api/".into(),
            ..Default::default()
        };
        assert_eq!(cfg.api_base(), "http://localhost/api");
    }
}
