use serde::Deserialize;
use serde_json::Value;

use crate::{config::ResponseShape, error::Result, request::GenerationRequest, session::Session};

pub mod job_api;
pub mod multimodal;

/// What a backend hands back once the upstream is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// Decoded image bytes that came back in the response itself.
    Inline(Vec<u8>),
    /// A URL the image still has to be downloaded from.
    Url(String),
}

pub(crate) async fn acquire(
    shape: ResponseShape,
    session: &Session<'_>,
    request: &GenerationRequest,
) -> Result<Acquired> {
    match shape {
        ResponseShape::Multimodal => multimodal::acquire(session, request).await,
        ResponseShape::JobPolling => job_api::acquire(session, request).await,
    }
}

/// The `error` member both upstream contracts may embed in a 2xx body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamError {
    Text(String),
    Object {
        message: Option<String>,
        #[serde(flatten)]
        rest: serde_json::Map<String, Value>,
    },
    Other(Value),
}

impl UpstreamError {
    pub fn message(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Object {
                message: Some(message),
                ..
            } if !message.is_empty() => message.clone(),
            Self::Object { rest, .. } => Value::Object(rest.clone()).to_string(),
            Self::Other(value) => value.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Object { message, rest } => {
                message.as_deref().is_none_or(str::is_empty) && rest.is_empty()
            }
            Self::Other(value) => value.is_null(),
        }
    }
}

/// Deserializes `error`, mapping null, `""` and `{}` to `None`.
pub(crate) fn non_empty_error<'de, D>(deserializer: D) -> Result<Option<UpstreamError>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let err = Option::<UpstreamError>::deserialize(deserializer)?;
    Ok(err.filter(|err| !err.is_empty()))
}
