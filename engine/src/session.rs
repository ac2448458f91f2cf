use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::{
    config::GenerationConfig,
    error::{GenerationError, Result},
    status::{CancelToken, StatusEvent, StatusSender, emit},
    transport::{HttpRequest, HttpResponse, Transport},
};

/// Everything one `generate` call needs, borrowed for its duration.
pub(crate) struct Session<'a> {
    pub config: &'a GenerationConfig,
    pub api_key: &'a str,
    transport: &'a dyn Transport,
    status: &'a StatusSender,
    cancel: &'a CancelToken,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a GenerationConfig,
        api_key: &'a str,
        transport: &'a dyn Transport,
        status: &'a StatusSender,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            config,
            api_key,
            transport,
            status,
            cancel,
        }
    }

    pub fn emit(&self, event: StatusEvent) {
        emit(self.status, event);
    }

    pub fn ensure_not_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            Err(GenerationError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Sends `req` unless canceled, aborting if cancel fires mid-flight.
    /// Non-success statuses become `GenerationError::Http`.
    pub async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.ensure_not_canceled()?;
        let url = req.url.clone();
        let resp = tokio::select! {
            resp = self.transport.send(req) => resp?,
            _ = self.cancel.canceled() => return Err(GenerationError::Canceled),
        };
        self.ensure_not_canceled()?;

        if !resp.is_success() {
            let body = resp.text();
            warn!("{url} returned {}: {body}", resp.status);
            return Err(GenerationError::Http {
                status: resp.status,
                body,
            });
        }
        Ok(resp)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, req: HttpRequest) -> Result<T> {
        let resp = self.send(req).await?;
        debug!("response body: {}", resp.text());
        serde_json::from_slice(&resp.body)
            .map_err(|e| GenerationError::InvalidResponse(format!("{e}: {}", resp.text())))
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.canceled() => Err(GenerationError::Canceled),
        }
    }
}
