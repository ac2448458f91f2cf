//! Synchronous `generateContent` contract: one POST, the image comes back as base64.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Acquired, UpstreamError, non_empty_error},
    error::{GenerationError, Result},
    images::{self, InlineImagePart},
    request::GenerationRequest,
    session::Session,
    status::StatusEvent,
    transport::HttpRequest,
};

#[derive(Debug, Serialize)]
pub struct GenerateContentBody {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    Image(InlineImagePart),
}

#[derive(Debug, Serialize)]
pub struct GenerationSettings {
    #[serde(rename = "responseModalities")]
    pub response_modalities: Vec<&'static str>,
    #[serde(rename = "imageConfig")]
    pub image_config: ImageConfig,
}

#[derive(Debug, Default, Serialize)]
pub struct ImageConfig {
    #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(rename = "imageSize", skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
}

impl GenerateContentBody {
    /// Text-to-image when `images` is empty, image edit otherwise.
    pub fn new(request: &GenerationRequest, images: Vec<InlineImagePart>) -> Self {
        let parts = std::iter::once(Part::Text {
            text: request.prompt.clone(),
        })
        .chain(images.into_iter().map(Part::Image))
        .collect();

        let aspect = request.aspect_ratio.trim();
        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationSettings {
                response_modalities: vec!["IMAGE"],
                image_config: ImageConfig {
                    aspect_ratio: (!aspect.is_empty()).then(|| aspect.to_string()),
                    image_size: request.image_size(),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, deserialize_with = "non_empty_error")]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

impl GenerateContentResponse {
    /// First non-empty inline payload, in candidate then part order.
    /// An embedded `error` wins over any payload.
    pub fn inline_image(&self) -> Result<&str> {
        if let Some(err) = &self.error {
            return Err(GenerationError::Upstream {
                message: err.message(),
            });
        }
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| &content.parts)
            .filter_map(|part| part.inline_data.as_ref())
            .filter_map(|inline| inline.data.as_deref())
            .find(|data| !data.is_empty())
            .ok_or_else(|| GenerationError::NoImageData("No image data found in response".into()))
    }
}

pub fn generate_url(api_base: &str, model: &str) -> String {
    format!("{api_base}/models/{model}:generateContent")
}

pub(crate) async fn acquire(
    session: &Session<'_>,
    request: &GenerationRequest,
) -> Result<Acquired> {
    let parts = images::resolve_to_inline(session, &request.images).await?;
    let body = GenerateContentBody::new(request, parts);
    let payload = serde_json::to_value(&body)
        .map_err(|e| GenerationError::InvalidInput(format!("encoding request: {e}")))?;

    session.emit(StatusEvent::Submitting);
    debug!(
        "{} via generateContent, model {}",
        request.submission_kind(),
        request.model
    );
    let req = HttpRequest::post_json(
        generate_url(session.config.api_base(), &request.model),
        payload,
        session.config.timeout,
    )
    .bearer(Some(session.api_key));
    let response: GenerateContentResponse = session.send_json(req).await?;

    let data = response.inline_image()?;
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| GenerationError::InvalidResponse(format!("inline image is not base64: {e}")))?;
    Ok(Acquired::Inline(bytes))
}
