//! Batch export of the selection.
//!
//! Every image is composited at full resolution, strictly one after another
//! on the blocking pool. One image becomes one file; several become one zip
//! archive. Nothing is delivered unless every image succeeds.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::compose::Compositor;
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::pipeline::ImageKind;
use crate::workspace::ImageEntry;

/// The deliverable of one export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportArtifact {
    Single {
        name: String,
        bytes: Vec<u8>,
    },
    Archive {
        name: String,
        bytes: Vec<u8>,
        /// File names inside the archive, in export order.
        entries: Vec<String>,
    },
}

impl ExportArtifact {
    pub fn name(&self) -> &str {
        match self {
            Self::Single { name, .. } | Self::Archive { name, .. } => name,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Single { bytes, .. } | Self::Archive { bytes, .. } => bytes,
        }
    }

    /// Write the artifact into `dir` (created if missing). Returns the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.name());
        std::fs::write(&path, self.bytes())?;
        Ok(path)
    }
}

/// Drives the [`Compositor`] over a list of images.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::compose::Compositor;
/// use retouch_ai::config::Config;
/// use retouch_ai::export::BatchExporter;
/// use retouch_ai::workspace::Workspace;
/// use std::sync::Arc;
///
/// # async fn example(workspace: Workspace) -> anyhow::Result<()> {
/// let config = Config::default();
/// let compositor = Arc::new(Compositor::new(config.compositing.clone()));
/// let exporter = BatchExporter::new(compositor, config.export.clone());
///
/// let artifact = exporter
///     .export(&workspace.selected_entries(), |done, total| println!("{done}/{total}"))
///     .await?;
/// artifact.write_to("out".as_ref())?;
/// # Ok(())
/// # }
/// ```
pub struct BatchExporter {
    compositor: Arc<Compositor>,
    config: ExportConfig,
}

impl BatchExporter {
    pub fn new(compositor: Arc<Compositor>, config: ExportConfig) -> Self {
        Self { compositor, config }
    }

    /// Export `entries`, calling `progress(done, total)` after each image.
    pub async fn export(
        &self,
        entries: &[ImageEntry],
        mut progress: impl FnMut(usize, usize),
    ) -> Result<ExportArtifact, ExportError> {
        if entries.is_empty() {
            return Err(ExportError::Empty);
        }

        let total = entries.len();
        let mut outputs = Vec::with_capacity(total);
        let mut used = HashSet::new();

        for (i, entry) in entries.iter().enumerate() {
            let (format, renamed) = output_format(&entry.name);
            let name = unique_name(&format!("{}{renamed}", self.config.file_prefix), &mut used);
            log::info!("Exporting {} as {name} ({}/{total})", entry.name, i + 1);

            let bytes = self.render(i + 1, entry, format).await?;
            outputs.push((name, bytes));
            progress(i + 1, total);
        }

        if outputs.len() == 1 {
            let (name, bytes) = outputs.remove(0);
            return Ok(ExportArtifact::Single { name, bytes });
        }

        let (bytes, entries) = build_archive(outputs)?;
        Ok(ExportArtifact::Archive {
            name: self.config.archive_name.clone(),
            bytes,
            entries,
        })
    }

    /// Composite and encode one image on the blocking pool.
    async fn render(
        &self,
        index: usize,
        entry: &ImageEntry,
        format: ImageFormat,
    ) -> Result<Vec<u8>, ExportError> {
        let compositor = Arc::clone(&self.compositor);
        let entry = entry.clone();

        tokio::task::spawn_blocking(move || {
            let source = entry.source.load_blocking().map_err(|e| ExportError::Source {
                name: entry.name.clone(),
                source: e,
            })?;
            compositor
                .render_encoded(&source, &entry.adjustments, entry.regions.as_deref(), format)
                .map_err(|e| ExportError::Composite {
                    index,
                    name: entry.name.clone(),
                    source: e,
                })
        })
        .await
        .map_err(|e| ExportError::Task(e.to_string()))?
    }
}

/// Encoder for an original file name, and the name to export under.
///
/// Names whose format cannot be re-encoded get PNG and a `.png` extension.
fn output_format(name: &str) -> (ImageFormat, String) {
    match ImageKind::from_name(name) {
        Some(kind) => (kind.output_format(), name.to_string()),
        None => {
            let renamed = Path::new(name).with_extension("png");
            (ImageFormat::Png, renamed.to_string_lossy().into_owned())
        }
    }
}

/// `name`, or `stem (n).ext` when it is already taken.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());
    (2..)
        .map(|n| match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        })
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

fn build_archive(outputs: Vec<(String, Vec<u8>)>) -> Result<(Vec<u8>, Vec<String>), ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut names = Vec::with_capacity(outputs.len());

    for (name, bytes) in outputs {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&bytes)?;
        names.push(name);
    }

    let cursor = zip.finish()?;
    Ok((cursor.into_inner(), names))
}
