//! # retouch-ai
//!
//! Batch photo retouching: tone filters, warmth, image overlays, and text
//! watermarks, plus three AI-assisted operations backed by a remote vision
//! model (Google Gemini or OpenAI): auto-enhance suggestions, background
//! removal, and detection of faces and license plates for privacy redaction.
//!
//! ## Quick Start
//!
//! Build a workspace, apply adjustments to the selection, scan for privacy
//! regions, and export:
//!
//! ```rust,no_run
//! use retouch_ai::compose::Compositor;
//! use retouch_ai::config::Config;
//! use retouch_ai::export::BatchExporter;
//! use retouch_ai::model::AdjustmentSet;
//! use retouch_ai::pipeline::{build_vision_client, collect_images};
//! use retouch_ai::resilience::{QuotaCircuitBreaker, ResilientInvoker};
//! use retouch_ai::scheduler::PrivacyDetectionScheduler;
//! use retouch_ai::workspace::{ImageSource, Workspace};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!
//!     let workspace = Workspace::new();
//!     for path in collect_images(&[PathBuf::from("./photos")]) {
//!         let name = path.file_name().unwrap().to_string_lossy().into_owned();
//!         workspace.add_image(name, ImageSource::File(path));
//!     }
//!     workspace.select_all();
//!     workspace.apply_to_selection(
//!         &AdjustmentSet::default()
//!             .with_contrast(115.0)
//!             .with_watermark("© Studio")
//!             .with_privacy_blur(true),
//!     );
//!
//!     // Detect faces and plates before export; the exporter never calls the AI.
//!     if let Some(client) = build_vision_client(&config) {
//!         let scheduler = PrivacyDetectionScheduler::new(
//!             workspace.clone(),
//!             client,
//!             ResilientInvoker::from_config(&config.resilience),
//!             Arc::new(QuotaCircuitBreaker::new(config.resilience.cooldown())),
//!             config.scheduler.clone(),
//!         );
//!         println!("{}", scheduler.trigger().await.status_message());
//!     }
//!
//!     let compositor = Arc::new(Compositor::new(config.compositing.clone()));
//!     let exporter = BatchExporter::new(compositor, config.export.clone());
//!     let artifact = exporter
//!         .export(&workspace.selected_entries(), |done, total| println!("{done}/{total}"))
//!         .await?;
//!     artifact.write_to("./out".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Compositing order
//!
//! Preview and export run the same stages in the same order: redaction, tone
//! (brightness, contrast, saturation, blur, sepia, grayscale), warmth, overlay,
//! watermark. See [`compose`].
//!
//! ## Quota handling
//!
//! Every remote call goes through a [`resilience::ResilientInvoker`], which
//! retries rate-limited calls with exponential backoff. When the budget runs
//! out, the shared [`resilience::QuotaCircuitBreaker`] is tripped and every AI
//! entry point refuses to start until the cooldown passes.
//!
//! ## Modules
//!
//! - [`ai`]: vision backend trait, Gemini and OpenAI implementations, response parsing
//! - [`assist`]: auto-enhance and background removal entry points
//! - [`compose`]: the compositing pipeline
//! - [`config`]: configuration types and loading/saving
//! - [`error`]: error types
//! - [`export`]: batch export to a file or zip archive
//! - [`model`]: adjustment and region value types
//! - [`pipeline`]: input collection, format detection, backend selection
//! - [`presets`]: named adjustment snapshots
//! - [`resilience`]: retry and circuit breaker
//! - [`scheduler`]: background privacy-region detection
//! - [`workspace`]: per-image editing state

pub mod ai;
pub mod assist;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod presets;
pub mod resilience;
pub mod scheduler;
pub mod workspace;
