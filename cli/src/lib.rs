use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, ensure, eyre},
};
use engine::{
    GenerationConfig, GenerationRequest, ImageReference, OutputFormat, ResponseShape,
    config::{
        DEFAULT_API_BASE, DEFAULT_ASPECT, DEFAULT_MODEL, DEFAULT_POLL_INTERVAL, DEFAULT_PROVIDER,
        DEFAULT_RESOLUTION, DEFAULT_TIMEOUT, resolve_api_key,
    },
    request::normalize_resolution,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::cli::Cli;

pub mod cli;

pub const CONFIG_FILE_NAME: &str = "ai_draw.ron";

/// Module filters for `--verbose`. Status events are printed by the binary
/// itself, so the engine's status log is kept below `info`.
pub const VERBOSE_LOG_FILTERS: &[(&str, LevelFilter)] = &[
    ("engine", LevelFilter::Debug),
    ("engine::status", LevelFilter::Warn),
];

/// User preferences persisted between runs. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base: String,
    pub api_key: String,
    pub provider: String,
    pub model: String,
    pub aspect: String,
    pub format: OutputFormat,
    pub resolution: String,
    /// seconds
    pub poll_interval: f64,
    /// seconds
    pub timeout: f64,
    pub shape: ResponseShape,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_key: String::new(),
            provider: DEFAULT_PROVIDER.into(),
            model: DEFAULT_MODEL.into(),
            aspect: DEFAULT_ASPECT.into(),
            format: OutputFormat::default(),
            resolution: DEFAULT_RESOLUTION.into(),
            poll_interval: DEFAULT_POLL_INTERVAL.as_secs_f64(),
            timeout: DEFAULT_TIMEOUT.as_secs_f64(),
            shape: ResponseShape::default(),
        }
    }
}

impl Settings {
    /// Command line flags override the stored values.
    pub fn apply(&mut self, cli: &Cli) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        set(&mut self.api_base, &cli.api_base);
        set(&mut self.api_key, &cli.api_key);
        set(&mut self.provider, &cli.provider);
        set(&mut self.model, &cli.model);
        set(&mut self.aspect, &cli.aspect);
        set(&mut self.format, &cli.format);
        set(&mut self.resolution, &cli.resolution);
        set(&mut self.poll_interval, &cli.poll_interval);
        set(&mut self.timeout, &cli.timeout);
        set(&mut self.shape, &cli.shape);
    }

    pub fn generation_config(&self, explicit_key: Option<&str>) -> Result<GenerationConfig> {
        Ok(GenerationConfig {
            api_base: self.api_base.clone(),
            api_key: resolve_api_key(explicit_key, Some(&self.api_key)),
            shape: self.shape,
            poll_interval: seconds(self.poll_interval, "poll interval")?,
            timeout: seconds(self.timeout, "timeout")?,
            ..Default::default()
        })
    }

    pub fn generation_request(&self, cli: &Cli) -> GenerationRequest {
        let images = cli
            .image
            .iter()
            .map(|raw| ImageReference::parse(raw))
            .chain(cli.images.as_deref().map(ImageReference::parse_list).unwrap_or_default());

        GenerationRequest {
            prompt: cli.prompt.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            aspect_ratio: self.aspect.clone(),
            output_format: self.format,
            resolution: normalize_resolution(&self.resolution),
            images: images.collect(),
            output_path: cli.out.clone(),
        }
    }
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    ensure!(value > 0.0, "{what} must be positive, got {value}");
    Duration::try_from_secs_f64(value).wrap_err_with(|| format!("invalid {what}: {value}"))
}

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn save_ron_file<T: Serialize>(path: &Path, x: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let pretty = ron::ser::PrettyConfig::default();
    Ok(fs::write(path, ron::ser::to_string_pretty(x, pretty)?)?)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(CONFIG_FILE_NAME))
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        Ok(Settings::default())
    } else {
        load_ron_file(path).wrap_err_with(|| format!("reading settings from {}", path.display()))
    }
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(&config_path()?)
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf> {
    let path = config_path()?;
    save_ron_file(&path, settings)?;
    Ok(path)
}
