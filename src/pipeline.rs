use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::ai::{self, VisionClient};
use crate::config::Config;

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Format of an input image, determined by its file extension.
///
/// Drives the MIME type sent to the vision backend and the encoder used
/// when the edited image is exported.
///
/// # Example
///
/// ```rust
/// use retouch_ai::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("photo.JPG")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_name("cutout.png"), Some(ImageKind::Png));
/// assert_eq!(ImageKind::from_name("notes.txt"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Same as [`from_path`](Self::from_path) for a bare file name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_path(Path::new(name))
    }

    /// Get the MIME type for sending to AI services.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// Encoder used when exporting an image of this kind.
    pub fn output_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files with supported image extensions
/// are included.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("photo.jpg"),       // single file
///     PathBuf::from("./photos/"),        // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_supported_image(p))
                .collect();
            found.sort();
            images.extend(found);
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Build the vision backend from configuration.
///
/// Walks `service_order` and returns the first enabled backend that has
/// credentials. `None` means AI features are unavailable.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::config::Config;
/// use retouch_ai::pipeline::build_vision_client;
///
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
/// match build_vision_client(&config) {
///     Some(client) => println!("Using {}", client.name()),
///     None => println!("AI features disabled"),
/// }
/// ```
pub fn build_vision_client(config: &Config) -> Option<Arc<dyn VisionClient>> {
    for name in config.enabled_services() {
        match name.as_str() {
            "gemini" => {
                let gemini = &config.ai_services.gemini;
                if gemini.api_key.is_empty() {
                    log::warn!("Gemini enabled but no API key configured");
                    continue;
                }
                return Some(Arc::new(ai::GeminiService::new(
                    gemini.api_key.clone(),
                    gemini.model.clone(),
                    gemini.image_model.clone(),
                )));
            }
            "openai" => {
                let openai = &config.ai_services.openai;
                if openai.api_key.is_empty() {
                    log::warn!("OpenAI enabled but no API key configured");
                    continue;
                }
                return Some(Arc::new(ai::OpenAiService::new(
                    openai.api_key.clone(),
                    openai.model.clone(),
                    openai.image_model.clone(),
                )));
            }
            _ => {}
        }
    }

    None
}
