use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use url::Url;

use crate::config::{DEFAULT_ASPECT, DEFAULT_MODEL, DEFAULT_PROVIDER, DEFAULT_RESOLUTION};

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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
    Webp,
}

/// An input image, either already hosted somewhere or sitting on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Url(String),
    LocalPath(PathBuf),
}

impl ImageReference {
    /// Absolute http(s) URLs become `Url`, everything else is a path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Url(trimmed.to_string()),
            _ => Self::LocalPath(PathBuf::from(trimmed)),
        }
    }

    /// Splits a comma separated list, skipping blank entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::LocalPath(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubmissionKind {
    #[strum(to_string = "text-to-image")]
    TextToImage,
    #[strum(to_string = "image-edit")]
    ImageEdit,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub aspect_ratio: String,
    pub output_format: OutputFormat,
    pub resolution: Option<String>,
    pub images: Vec<ImageReference>,
    pub output_path: PathBuf,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, output_path: impl AsRef<Path>) -> Self {
        Self {
            prompt: prompt.into(),
            provider: DEFAULT_PROVIDER.into(),
            model: DEFAULT_MODEL.into(),
            aspect_ratio: DEFAULT_ASPECT.into(),
            output_format: OutputFormat::default(),
            resolution: normalize_resolution(DEFAULT_RESOLUTION),
            images: vec![],
            output_path: output_path.as_ref().to_path_buf(),
        }
    }

    pub fn with_images(mut self, images: impl IntoIterator<Item = ImageReference>) -> Self {
        self.images.extend(images);
        self
    }

    pub fn submission_kind(&self) -> SubmissionKind {
        if self.images.is_empty() {
            SubmissionKind::TextToImage
        } else {
            SubmissionKind::ImageEdit
        }
    }

    pub fn image_size(&self) -> Option<String> {
        self.resolution.as_deref().and_then(normalize_resolution)
    }
}

/// Maps the accepted spellings of 1K/2K/4K onto the canonical ones.
/// Blank input means "no preference"; unknown values are kept as typed.
pub fn normalize_resolution(value: &str) -> Option<String> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    let canonical = match text.to_ascii_lowercase().as_str() {
        "1k" | "1024" => "1K",
        "2k" | "2048" => "2K",
        "4k" | "4096" => "4K",
        _ => text,
    };
    Some(canonical.to_string())
}
