use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the retouch-ai library.
///
/// Controls which AI backend to use, how remote calls are retried and
/// throttled, how frames are composited, and how exports are named.
///
/// # Loading
///
/// ```rust,no_run
/// use retouch_ai::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.ai_services.gemini.api_key = "AIza...".into();
/// config.scheduler.spacing_ms = 6000;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AI backend configurations (Gemini, OpenAI).
    pub ai_services: AiServices,
    /// Order in which backends are considered; the first usable one wins.
    pub service_order: Vec<String>,
    /// Retry and circuit-breaker tuning.
    pub resilience: ResilienceConfig,
    /// Privacy detection queue tuning.
    pub scheduler: SchedulerConfig,
    /// Redaction, preview, and watermark settings.
    pub compositing: CompositingConfig,
    /// Output naming and location.
    pub export: ExportConfig,
}

/// Configuration for all available AI backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiServices {
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
}

/// Google Gemini backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Model used for enhancement suggestions and region detection.
    pub model: String,
    /// Image-output model used for background removal.
    pub image_model: String,
    pub enabled: bool,
}

/// OpenAI backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub image_model: String,
    pub enabled: bool,
}

/// Retry budget, backoff, and quota cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retries after the first attempt on quota-classified failures.
    pub max_retries: u32,
    /// First backoff delay; doubles on each further retry.
    pub base_delay_ms: u64,
    /// How long AI features stay disabled after quota exhaustion.
    pub cooldown_ms: u64,
}

/// Privacy detection queue timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period after the last workspace change before a run starts.
    pub debounce_ms: u64,
    /// Pause after each successfully processed image.
    pub spacing_ms: u64,
}

/// Compositing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositingConfig {
    /// Pixelation block size is `frame width / pixel_block_divisor`.
    pub pixel_block_divisor: u32,
    /// Smallest pixelation block, in pixels.
    pub min_pixel_block: u32,
    /// Longest edge of the downsampled preview frame.
    pub preview_max_dimension: u32,
    /// Optional font file for watermarks; system fonts are used otherwise.
    pub font_path: Option<String>,
}

/// Export naming and output location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Prefix prepended to every exported file name.
    pub file_prefix: String,
    /// File name of the archive produced for multi-image exports.
    pub archive_name: String,
    /// Directory exports are written to.
    pub output_dir: Option<String>,
}

impl Default for AiServices {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: String::new(),
                model: "gemini-2.5-flash".to_string(),
                image_model: "gemini-2.5-flash-image".to_string(),
                enabled: true,
            },
            openai: OpenAiConfig {
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                image_model: "gpt-image-1".to_string(),
                enabled: false,
            },
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2000,
            cooldown_ms: 60_000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            spacing_ms: 4000,
        }
    }
}

impl Default for CompositingConfig {
    fn default() -> Self {
        Self {
            pixel_block_divisor: 40,
            min_pixel_block: 8,
            preview_max_dimension: 1280,
            font_path: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_prefix: "edited_".to_string(),
            archive_name: "edited_images.zip".to_string(),
            output_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_services: AiServices::default(),
            service_order: vec!["gemini".to_string(), "openai".to_string()],
            resilience: ResilienceConfig::default(),
            scheduler: SchedulerConfig::default(),
            compositing: CompositingConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl ResilienceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
}

impl Config {
    /// Resolve the config file path: the same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Get the ordered list of enabled AI backends.
    pub fn enabled_services(&self) -> Vec<String> {
        self.service_order
            .iter()
            .filter(|name| match name.as_str() {
                "gemini" => self.ai_services.gemini.enabled,
                "openai" => self.ai_services.openai.enabled,
                _ => false,
            })
            .cloned()
            .collect()
    }
}
