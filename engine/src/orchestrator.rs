use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use tokio::task::JoinHandle;
use url::Url;

use crate::{
    backend::{self, Acquired},
    config::{API_KEY_ENV, GenerationConfig, resolve_api_key_from},
    error::{GenerationError, Result},
    images,
    request::GenerationRequest,
    session::Session,
    status::{CancelToken, StatusEvent, StatusReceiver, StatusSender, status_channel},
    transport::{HttpRequest, ReqwestTransport, Transport},
};

/// Runs one generation at a time: resolve images, submit, wait, download, save.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    config: Arc<GenerationConfig>,
    transport: Arc<dyn Transport>,
    /// `GPTSAPI_API_KEY` as seen at construction, used when the config has no key.
    env_key: Option<String>,
}

/// A generation running on its own task.
pub struct GenerationHandle {
    pub status: StatusReceiver,
    pub cancel: CancelToken,
    pub task: JoinHandle<Result<PathBuf>>,
}

impl GenerationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the task. An aborted task counts as canceled, a panic is
    /// resumed on the caller.
    pub async fn join(self) -> Result<PathBuf> {
        match self.task.await {
            Ok(res) => res,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(GenerationError::Canceled),
        }
    }
}

impl GenerationOrchestrator {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        Ok(Self::with_transport(config, ReqwestTransport::new()?))
    }

    pub fn with_transport(config: GenerationConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            env_key: std::env::var(API_KEY_ENV).ok(),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
        status: &StatusSender,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let config = self.config.as_ref();
        let api_key =
            resolve_api_key_from(config.api_key.as_deref(), None, self.env_key.as_deref())
                .ok_or(GenerationError::MissingCredential)?;
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidInput("Prompt is required".into()));
        }
        images::check_references(&request.images).await?;

        let session = Session::new(config, &api_key, self.transport.as_ref(), status, cancel);
        info!(
            "{} with {} ({}/{}), {} image(s)",
            request.submission_kind(),
            config.shape,
            request.provider,
            request.model,
            request.images.len()
        );

        let acquired = backend::acquire(config.shape, &session, &request).await?;
        session.ensure_not_canceled()?;

        let bytes = match acquired {
            Acquired::Inline(bytes) => {
                session.emit(StatusEvent::Saving);
                bytes
            }
            Acquired::Url(url) => {
                session.emit(StatusEvent::Downloading);
                debug!("downloading {url}");
                let bearer = same_host(&url, &config.api_base).then_some(api_key.as_str());
                let req = HttpRequest::get(url, config.transfer_timeout)
                    .accept("*/*")
                    .bearer(bearer);
                session.send(req).await?.body.to_vec()
            }
        };

        write_output(&request.output_path, &bytes).await?;
        session.emit(StatusEvent::Saved(request.output_path.clone()));
        Ok(request.output_path)
    }

    /// Runs `generate` on a background task so the caller stays responsive.
    pub fn spawn(&self, request: GenerationRequest) -> GenerationHandle {
        let (tx, rx) = status_channel();
        let cancel = CancelToken::new();
        let this = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { this.generate(request, &tx, &task_cancel).await });
        GenerationHandle {
            status: rx,
            cancel,
            task,
        }
    }
}

fn same_host(url: &str, api_base: &str) -> bool {
    match (Url::parse(url), Url::parse(api_base)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(GenerationError::io(format!("creating {}", dir.display())))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(GenerationError::io(format!("writing {}", path.display())))
}
