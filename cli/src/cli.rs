use std::path::PathBuf;

use engine::{OutputFormat, ResponseShape};

/// Generate or edit an image from a text prompt.
#[derive(Debug, clap::Parser)]
#[command(name = "ai-draw", version)]
pub struct Cli {
    /// Text prompt for image generation
    pub prompt: String,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub provider: Option<String>,

    /// Aspect ratio, e.g. 1:1 or 16:9
    #[arg(long)]
    pub aspect: Option<String>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output resolution: 1K, 2K or 4K
    #[arg(long)]
    pub resolution: Option<String>,

    /// Image URL or local file for image-edit (repeatable)
    #[arg(long = "image")]
    pub image: Vec<String>,

    /// Comma-separated image URLs or files for image-edit
    #[arg(long)]
    pub images: Option<String>,

    #[arg(long, default_value = "output.png")]
    pub out: PathBuf,

    /// Seconds between status polls
    #[arg(long)]
    pub poll_interval: Option<f64>,

    /// Seconds to wait for the image before giving up
    #[arg(long)]
    pub timeout: Option<f64>,

    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    /// Upstream contract to use
    #[arg(long, value_enum)]
    pub shape: Option<ResponseShape>,

    /// Store the effective options as the new defaults
    #[arg(long)]
    pub save_config: bool,

    /// Print status updates and debug logs
    #[arg(short, long)]
    pub verbose: bool,
}
