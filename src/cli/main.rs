use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use retouch_ai::assist::{AiAssistant, AssistStatus};
use retouch_ai::compose::Compositor;
use retouch_ai::export::BatchExporter;
use retouch_ai::model::{AdjustmentSet, ImageId};
use retouch_ai::presets::PresetStore;
use retouch_ai::resilience::{QuotaCircuitBreaker, ResilientInvoker};
use retouch_ai::scheduler::{PrivacyDetectionScheduler, RunReport};
use retouch_ai::workspace::{ImageSource, RegionState, Workspace};
use retouch_ai::{config, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "retouch-ai",
    version,
    about = "Batch photo retouching with AI-assisted enhancement, background removal, and privacy redaction"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Directory to write the export to (default: export.output_dir or ".")
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// JSON file with the adjustments to apply to every image
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    adjustments: Option<PathBuf>,

    /// Apply a saved preset by id
    #[arg(long, value_name = "ID")]
    preset: Option<String>,

    /// Presets file used by --preset
    #[arg(long, value_name = "FILE", default_value = "presets.json")]
    presets: PathBuf,

    /// Watermark text drawn bottom-right
    #[arg(long, value_name = "TEXT")]
    watermark: Option<String>,

    /// Detect faces and license plates and pixelate them
    #[arg(long = "privacy-blur")]
    privacy_blur: bool,

    /// Let the AI suggest brightness, contrast, saturation, and warmth
    #[arg(long = "auto-enhance")]
    auto_enhance: bool,

    /// Replace each image with a transparent-background PNG first
    #[arg(long = "remove-background")]
    remove_background: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let config = config::Config::load(cli.config.as_deref())?;

    // Collect images
    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }
    log::info!("Found {} image(s) to process", images.len());

    let workspace = Workspace::new();
    for path in &images {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        workspace.add_image(name, ImageSource::File(path.clone()));
    }
    workspace.select_all();
    workspace.set_viewed(workspace.ids().first().copied());

    // Adjustments
    let mut adjustments = base_adjustments(&cli)?;
    if let Some(text) = &cli.watermark {
        adjustments = adjustments.with_watermark(text.as_str());
    }
    if cli.privacy_blur {
        adjustments = adjustments.with_privacy_blur(true);
    }
    workspace.apply_to_selection(&adjustments);

    // AI services
    let client = pipeline::build_vision_client(&config);
    match &client {
        Some(c) => log::info!("AI backend: {}", c.name()),
        None if cli.auto_enhance || cli.remove_background || cli.privacy_blur => {
            log::warn!(
                "No AI services configured. Run `retouch-ai-cli --init` to create a config file, then add your API keys."
            );
        }
        None => {}
    }
    let breaker = Arc::new(QuotaCircuitBreaker::new(config.resilience.cooldown()));
    let invoker = ResilientInvoker::from_config(&config.resilience);
    let assistant = AiAssistant::new(client.clone(), invoker.clone(), Arc::clone(&breaker));

    let ids = workspace.selected_ids();
    let mut statuses: Vec<(ImageId, &str, AssistStatus)> = Vec::new();

    if cli.remove_background {
        for &id in &ids {
            let status = assistant.remove_background(&workspace, id).await;
            log::info!("  {status}");
            statuses.push((id, "remove_background", status));
        }
    }

    if cli.auto_enhance {
        for &id in &ids {
            let status = assistant.auto_enhance(&workspace, id).await;
            log::info!("  {status}");
            statuses.push((id, "auto_enhance", status));
        }
    }

    // Privacy detection
    let mut privacy: Option<RunReport> = None;
    if cli.privacy_blur {
        match client.clone() {
            Some(client) => {
                let scheduler = PrivacyDetectionScheduler::new(
                    workspace.clone(),
                    client,
                    invoker.clone(),
                    Arc::clone(&breaker),
                    config.scheduler.clone(),
                );
                let report = scheduler.trigger().await;
                log::info!("{}", report.status_message());
                privacy = Some(report);
            }
            None => log::warn!("Privacy blur requested but no AI backend is available; nothing will be redacted"),
        }

        let undetected = workspace
            .selected_entries()
            .iter()
            .filter(|e| e.region_state() == RegionState::Undetected)
            .count();
        if undetected > 0 {
            log::warn!("{undetected} image(s) were not scanned and will be exported unredacted");
        }
    }

    // Export
    let compositor = Arc::new(Compositor::new(config.compositing.clone()));
    let exporter = BatchExporter::new(compositor, config.export.clone());
    let entries = workspace.selected_entries();
    let artifact = exporter
        .export(&entries, |done, total| {
            log::info!("[{done}/{total}] Composited");
        })
        .await?;

    let out_dir = cli
        .out
        .clone()
        .or_else(|| config.export.output_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let written = artifact.write_to(&out_dir)?;
    log::info!("Wrote {}", written.display());

    // JSON output
    if cli.json {
        let images: Vec<serde_json::Value> = workspace
            .selected_entries()
            .iter()
            .map(|e| {
                let ai: Vec<serde_json::Value> = statuses
                    .iter()
                    .filter(|(id, _, _)| *id == e.id)
                    .map(|(_, op, s)| {
                        serde_json::json!({
                            "operation": op,
                            "outcome": format!("{:?}", s.outcome),
                            "message": s.message,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "name": e.name,
                    "regions": region_label(e.region_state()),
                    "adjustments": e.adjustments,
                    "ai": ai,
                })
            })
            .collect();

        let summary = serde_json::json!({
            "output": written.display().to_string(),
            "images": images,
            "privacy": privacy.as_ref().map(|r| serde_json::json!({
                "outcome": format!("{:?}", r.outcome),
                "scanned": r.processed.len(),
                "redacted": r.redacted,
                "clean": r.clean,
                "failed": r.failed.len(),
                "message": r.status_message(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    log::info!("Done: exported {} image(s)", entries.len());
    Ok(())
}

/// Adjustments from --adjustments or --preset, else neutral.
fn base_adjustments(cli: &Cli) -> Result<AdjustmentSet> {
    if let Some(path) = &cli.adjustments {
        return load_adjustments(path);
    }
    if let Some(id) = &cli.preset {
        let store = PresetStore::load(&cli.presets)?;
        let preset = store.get(id).with_context(|| {
            format!("Preset '{id}' not found in {}", cli.presets.display())
        })?;
        log::info!("Using preset '{}'", preset.name);
        return Ok(preset.adjustments.clone());
    }
    Ok(AdjustmentSet::default())
}

fn load_adjustments(path: &Path) -> Result<AdjustmentSet> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read adjustments from {}", path.display()))?;
    let adjustments: AdjustmentSet =
        serde_json::from_str(&contents).context("Failed to parse adjustments file")?;
    Ok(adjustments.clamped())
}

fn region_label(state: RegionState) -> String {
    match state {
        RegionState::Undetected => "undetected".into(),
        RegionState::Clean => "clean".into(),
        RegionState::Redacting(n) => format!("{n} region(s)"),
    }
}
