pub mod backend;
pub mod config;
pub mod error;
pub mod images;
pub mod orchestrator;
pub mod request;
pub mod status;
pub mod transport;

mod session;

pub use config::{GenerationConfig, ResponseShape};
pub use error::{ErrorKind, GenerationError};
pub use orchestrator::{GenerationHandle, GenerationOrchestrator};
pub use request::{GenerationRequest, ImageReference, OutputFormat, SubmissionKind};
pub use status::{CancelToken, JobStatus, StatusEvent};
