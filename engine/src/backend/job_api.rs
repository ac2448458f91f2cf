//! Asynchronous job contract: create a job, poll `urls.get`, download the output URL.

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::time::{Instant, timeout_at};

use crate::{
    backend::{Acquired, UpstreamError, non_empty_error},
    error::{GenerationError, Result},
    images,
    request::{GenerationRequest, OutputFormat, SubmissionKind},
    session::Session,
    status::{JobStatus, StatusEvent},
    transport::HttpRequest,
};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateBody<'a> {
    TextToImage {
        prompt: &'a str,
        aspect_ratio: &'a str,
        output_format: OutputFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolution: Option<String>,
    },
    ImageEdit {
        prompt: &'a str,
        images: Vec<String>,
        output_format: OutputFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolution: Option<String>,
    },
}

impl<'a> CreateBody<'a> {
    /// `images` are already resolved URLs; an empty list means text-to-image.
    pub fn new(request: &'a GenerationRequest, images: Vec<String>) -> Self {
        let resolution = request.image_size();
        if images.is_empty() {
            Self::TextToImage {
                prompt: &request.prompt,
                aspect_ratio: &request.aspect_ratio,
                output_format: request.output_format,
                resolution,
            }
        } else {
            Self::ImageEdit {
                prompt: &request.prompt,
                images,
                output_format: request.output_format,
                resolution,
            }
        }
    }

    pub fn kind(&self) -> SubmissionKind {
        match self {
            Self::TextToImage { .. } => SubmissionKind::TextToImage,
            Self::ImageEdit { .. } => SubmissionKind::ImageEdit,
        }
    }
}

/// Outer layer of a reply that wraps the job in `data`.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default, deserialize_with = "non_empty_error")]
    error: Option<UpstreamError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobData {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub urls: Option<JobUrls>,
    pub outputs: Option<OutputField>,
    pub output: Option<OutputField>,
    pub result: Option<ResultField>,
    #[serde(default, deserialize_with = "non_empty_error")]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
pub struct JobUrls {
    #[serde(default, deserialize_with = "lenient")]
    pub get: Option<String>,
}

/// A value of the wrong type reads as absent instead of failing the whole job.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OutputField {
    Many(Vec<OutputItem>),
    One(String),
    Unknown(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OutputItem {
    Url(String),
    Object {
        url: Option<String>,
        image: Option<String>,
    },
    Unknown(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResultField {
    Url(String),
    Nested {
        outputs: Option<OutputField>,
        output: Option<OutputField>,
    },
    Unknown(serde_json::Value),
}

impl OutputField {
    fn urls(&self) -> Vec<String> {
        match self {
            Self::Many(items) => items
                .iter()
                .filter_map(|item| match item {
                    OutputItem::Url(url) => Some(url.as_str()),
                    OutputItem::Object { url, image } => url.as_deref().or(image.as_deref()),
                    OutputItem::Unknown(_) => None,
                })
                .filter(|url| !url.is_empty())
                .map(String::from)
                .collect(),
            Self::One(url) if !url.is_empty() => vec![url.clone()],
            Self::One(_) | Self::Unknown(_) => vec![],
        }
    }
}

/// `outputs` if it yields anything, else `output`.
fn output_urls(outputs: Option<&OutputField>, output: Option<&OutputField>) -> Vec<String> {
    let first = outputs.map(OutputField::urls).unwrap_or_default();
    if !first.is_empty() {
        return first;
    }
    output.map(OutputField::urls).unwrap_or_default()
}

impl JobData {
    /// Reads a job reply, either wrapped in `data` or bare. A top-level
    /// `error` applies when the job itself carries none.
    pub fn from_reply(reply: Value) -> Result<Self> {
        let envelope = Envelope::deserialize(&reply).unwrap_or_default();
        match envelope.data {
            Some(data @ Value::Object(_)) => {
                let mut job = Self::decode(data)?;
                if job.error.is_none() {
                    job.error = envelope.error;
                }
                Ok(job)
            }
            _ => Self::decode(reply),
        }
    }

    fn decode(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| GenerationError::InvalidResponse(format!("malformed job data: {e}")))
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::parse(self.status.as_deref().unwrap_or_default())
    }

    pub fn polling_url(&self) -> Option<&str> {
        self.urls
            .as_ref()
            .and_then(|urls| urls.get.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    /// Result URLs, looking in `outputs`, `output`, then `result`.
    pub fn image_urls(&self) -> Vec<String> {
        let urls = output_urls(self.outputs.as_ref(), self.output.as_ref());
        if !urls.is_empty() {
            return urls;
        }
        match &self.result {
            Some(ResultField::Url(url)) if !url.is_empty() => vec![url.clone()],
            Some(ResultField::Nested { outputs, output }) => {
                output_urls(outputs.as_ref(), output.as_ref())
            }
            _ => vec![],
        }
    }

    /// First result URL of a finished job.
    pub fn first_image_url(&self) -> Result<String> {
        if let Some(err) = &self.error {
            return Err(GenerationError::Upstream {
                message: err.message(),
            });
        }
        if let Some(url) = self.image_urls().into_iter().next() {
            return Ok(url);
        }
        let message = if self.status().is_success() {
            "Image completed but no URLs found in response"
        } else {
            "No image URLs found in response"
        };
        Err(GenerationError::NoImageData(message.into()))
    }
}

pub fn create_url(api_base: &str, provider: &str, model: &str, kind: SubmissionKind) -> String {
    format!("{api_base}/{provider}/{model}/{kind}")
}

pub(crate) async fn acquire(
    session: &Session<'_>,
    request: &GenerationRequest,
) -> Result<Acquired> {
    let resolved = images::resolve_to_urls(session, &request.images).await?;
    let body = CreateBody::new(request, resolved);
    let url = create_url(
        session.config.api_base(),
        &request.provider,
        &request.model,
        body.kind(),
    );
    let payload = serde_json::to_value(&body)
        .map_err(|e| GenerationError::InvalidInput(format!("encoding request: {e}")))?;

    session.emit(StatusEvent::Submitting);
    let req = HttpRequest::post_json(url, payload, session.config.request_timeout)
        .bearer(Some(session.api_key));
    let created = JobData::from_reply(session.send_json::<Value>(req).await?)?;
    debug!("job created: {created:#?}");

    if let Some(err) = &created.error {
        return Err(GenerationError::Upstream {
            message: err.message(),
        });
    }
    let polling_url = created
        .polling_url()
        .ok_or(GenerationError::MissingPollingUrl)?
        .to_string();

    session.emit(StatusEvent::Polling);
    let finished = poll(session, &polling_url).await?;
    finished.first_image_url().map(Acquired::Url)
}

/// Polls until a terminal status or the overall deadline, whichever comes first.
pub(crate) async fn poll(session: &Session<'_>, polling_url: &str) -> Result<JobData> {
    let config = session.config;
    let deadline = deadline_after(config.timeout);
    let timed_out = || {
        GenerationError::Timeout(format!(
            "image was not ready after {}s",
            config.timeout.as_secs_f64()
        ))
    };

    loop {
        session.ensure_not_canceled()?;
        let req =
            HttpRequest::get(polling_url, config.request_timeout).bearer(Some(session.api_key));
        let reply = timeout_at(deadline, session.send_json::<Value>(req))
            .await
            .map_err(|_| timed_out())??;
        let data = JobData::from_reply(reply)?;

        let status = data.status();
        let raw = data.status.as_deref().unwrap_or_default().trim().to_lowercase();
        session.emit(StatusEvent::JobStatus(raw));
        if status.is_terminal() {
            if !status.is_success() {
                warn!("job ended with status {status:?}");
            }
            return Ok(data);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }
        session
            .sleep(config.poll_interval.min(deadline - now))
            .await?;
    }
}

/// `timeout` from now, saturating at roughly thirty years.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use serde_json::json;

    use super::*;
    use crate::request::ImageReference;

    fn data(value: serde_json::Value) -> JobData {
        JobData::from_reply(value).unwrap()
    }

    #[test]
    fn create_bodies() {
        let request = GenerationRequest::new("a lighthouse", "out.png");
        let body = CreateBody::new(&request, vec![]);
        assert_eq!(body.kind(), SubmissionKind::TextToImage);
        let expect = expect![[r#"{"prompt":"a lighthouse","aspect_ratio":"1:1","output_format":"png","resolution":"1K"}"#]];
        expect.assert_eq(&serde_json::to_string(&body).unwrap());

        let mut request = request.with_images([ImageReference::Url("https://h/a.png".into())]);
        request.resolution = None;
        let body = CreateBody::new(&request, vec!["https://h/a.png".into()]);
        assert_eq!(body.kind(), SubmissionKind::ImageEdit);
        let expect = expect![[r#"{"prompt":"a lighthouse","images":["https://h/a.png"],"output_format":"png"}"#]];
        expect.assert_eq(&serde_json::to_string(&body).unwrap());
    }

    #[test]
    fn create_urls() {
        assert_eq!(
            create_url("https://api/v3", "google", "m1", SubmissionKind::ImageEdit),
            "https://api/v3/google/m1/image-edit"
        );
        assert_eq!(
            create_url("https://api/v3", "google", "m1", SubmissionKind::TextToImage),
            "https://api/v3/google/m1/text-to-image"
        );
    }

    #[test]
    fn polling_url_lookup() {
        let created = data(json!({"data": {"id": "1", "urls": {"get": "https://api/jobs/1"}}}));
        assert_eq!(created.polling_url(), Some("https://api/jobs/1"));

        let created = data(json!({"id": "1", "urls": {"get": "https://api/jobs/1"}}));
        assert_eq!(created.polling_url(), Some("https://api/jobs/1"));

        let created = data(json!({"data": {"id": "1", "urls": {}}}));
        assert_eq!(created.polling_url(), None);
    }

    #[test]
    fn mistyped_fields_do_not_hide_the_job() {
        let created = data(json!({"data": {"id": 42, "urls": {"get": "https://api/jobs/1"}}}));
        assert_eq!(created.polling_url(), Some("https://api/jobs/1"));

        let done = data(json!({"data": {
            "status": "succeeded",
            "urls": {"get": 5},
            "outputs": ["https://cdn/a.png"],
            "progress": "n/a"
        }}));
        assert_eq!(done.status(), JobStatus::Succeeded);
        assert_eq!(done.polling_url(), None);
        assert_eq!(done.image_urls(), ["https://cdn/a.png"]);

        let odd = data(json!({"data": {"status": 3, "urls": "https://api/jobs/1"}}));
        assert_eq!(odd.status(), JobStatus::InProgress(String::new()));
        assert_eq!(odd.polling_url(), None);
    }

    #[test]
    fn outer_error_and_non_object_replies() {
        let d = data(json!({"error": {"message": "quota"}, "data": {"status": "failed"}}));
        assert_eq!(d.error.map(|e| e.message()).as_deref(), Some("quota"));

        let err = JobData::from_reply(json!(["not", "a", "job"])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidResponse);
    }

    #[test]
    fn deadline_saturates() {
        let now = Instant::now();
        assert!(deadline_after(Duration::MAX) > now + Duration::from_secs(86_400));
        assert_eq!(
            deadline_after(Duration::from_secs(5)).duration_since(now).as_secs(),
            5
        );
    }

    #[test]
    fn output_shapes() {
        let d = data(
            json!({"data": {"status": "succeeded", "outputs": ["https://a", "https://b"]}}),
        );
        assert_eq!(d.image_urls(), ["https://a", "https://b"]);

        let d = data(
            json!({"data": {"status": "succeeded", "outputs": [{"url": "https://a"}, {"image": "https://b"}, 3]}}),
        );
        assert_eq!(d.image_urls(), ["https://a", "https://b"]);

        let d = data(
            json!({"data": {"status": "succeeded", "outputs": [], "output": "https://c"}}),
        );
        assert_eq!(d.image_urls(), ["https://c"]);

        let d = data(
            json!({"data": {"status": "succeeded", "result": {"outputs": ["https://d"]}}}),
        );
        assert_eq!(d.image_urls(), ["https://d"]);

        let d = data(json!({"data": {"status": "succeeded", "result": "https://e"}}));
        assert_eq!(d.image_urls(), ["https://e"]);
    }

    #[test]
    fn no_urls_messages() {
        let d = data(json!({"data": {"status": "Succeeded", "outputs": []}}));
        match d.first_image_url() {
            Err(GenerationError::NoImageData(msg)) => {
                assert!(msg.contains("completed but no URLs"))
            }
            other => panic!("unexpected {other:?}"),
        }

        let d = data(json!({"data": {"status": "failed"}}));
        match d.first_image_url() {
            Err(GenerationError::NoImageData(msg)) => {
                assert_eq!(msg, "No image URLs found in response")
            }
            other => panic!("unexpected {other:?}"),
        }

        let d = data(json!({"data": {"status": "failed", "error": "nsfw content"}}));
        assert!(matches!(
            d.first_image_url(),
            Err(GenerationError::Upstream { message }) if message == "nsfw content"
        ));
    }
}
