//! The set of images being edited, with their per-image state.
//!
//! Each [`ImageEntry`] owns its [`AdjustmentSet`] and its region state.
//! Batch edits write a copy of the same value into every selected image, so
//! later edits to one image never leak into another.
//!
//! Region state has three meanings, carried by `Option<Vec<_>>`:
//!
//! | value            | meaning                                   |
//! |------------------|-------------------------------------------|
//! | `None`           | never detected; eligible for detection    |
//! | `Some(vec![])`   | detection ran and found nothing           |
//! | `Some(regions)`  | regions to redact                         |
//!
//! Every mutation bumps a revision on a [`watch`] channel; the privacy
//! scheduler debounces on it.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::model::{AdjustmentSet, DetectionRegion, ImageId};
use crate::pipeline::ImageKind;

/// Where an image's original pixels come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

impl ImageSource {
    /// Read the encoded bytes.
    pub async fn load(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            Self::Bytes(bytes) => Ok(Arc::clone(bytes)),
            Self::File(path) => Ok(tokio::fs::read(path).await?.into()),
        }
    }

    /// Blocking variant for use off the async thread.
    pub fn load_blocking(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            Self::Bytes(bytes) => Ok(Arc::clone(bytes)),
            Self::File(path) => Ok(std::fs::read(path)?.into()),
        }
    }
}

/// Summary of an image's detection state, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Undetected,
    Clean,
    Redacting(usize),
}

/// One image in the workspace.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub id: ImageId,
    /// Original file name, used for MIME detection and export naming.
    pub name: String,
    pub source: ImageSource,
    pub adjustments: AdjustmentSet,
    pub regions: Option<Vec<DetectionRegion>>,
}

impl ImageEntry {
    pub fn mime_type(&self) -> &'static str {
        ImageKind::from_name(&self.name)
            .map(ImageKind::mime_type)
            .unwrap_or("image/jpeg")
    }

    pub fn region_state(&self) -> RegionState {
        match &self.regions {
            None => RegionState::Undetected,
            Some(r) if r.is_empty() => RegionState::Clean,
            Some(r) => RegionState::Redacting(r.len()),
        }
    }

    /// Selected-ness aside, whether this image still needs detection.
    pub fn needs_detection(&self) -> bool {
        self.adjustments.privacy_blur && self.regions.is_none()
    }
}

#[derive(Debug, Default)]
struct WorkspaceState {
    next_id: u64,
    images: Vec<ImageEntry>,
    selected: HashSet<ImageId>,
    viewed: Option<ImageId>,
}

impl WorkspaceState {
    fn find_mut(&mut self, id: ImageId) -> Option<&mut ImageEntry> {
        self.images.iter_mut().find(|img| img.id == id)
    }
}

/// Shared handle to the images being edited.
///
/// Cloning the handle shares the same state. Locks are only held inside
/// each method, never across an `.await`.
///
/// # Example
///
/// ```rust
/// use retouch_ai::model::AdjustmentSet;
/// use retouch_ai::workspace::Workspace;
///
/// let ws = Workspace::new();
/// let a = ws.add_bytes("a.jpg", vec![1, 2, 3]);
/// let b = ws.add_bytes("b.jpg", vec![4, 5, 6]);
/// ws.select_all();
/// ws.apply_to_selection(&AdjustmentSet::default().with_sepia(50.0));
/// assert_eq!(ws.get(a).unwrap().adjustments.sepia, 50.0);
/// assert_eq!(ws.get(b).unwrap().adjustments.sepia, 50.0);
/// ```
#[derive(Clone)]
pub struct Workspace {
    state: Arc<RwLock<WorkspaceState>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(WorkspaceState::default())),
            changes: Arc::new(tx),
        }
    }

    /// Receiver that sees a new revision after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }

    fn notify(&self) {
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    /// Run `f` on one image; notify when it reports a change.
    fn modify(&self, id: ImageId, f: impl FnOnce(&mut ImageEntry) -> bool) -> bool {
        let changed = {
            let mut state = self.state.write();
            match state.find_mut(id) {
                Some(img) => f(img),
                None => false,
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    // ── images ───────────────────────────────────────────────────────

    pub fn add_image(&self, name: impl Into<String>, source: ImageSource) -> ImageId {
        let id = {
            let mut state = self.state.write();
            state.next_id += 1;
            let id = ImageId(state.next_id);
            state.images.push(ImageEntry {
                id,
                name: name.into(),
                source,
                adjustments: AdjustmentSet::default(),
                regions: None,
            });
            id
        };
        self.notify();
        id
    }

    pub fn add_bytes(&self, name: impl Into<String>, bytes: Vec<u8>) -> ImageId {
        self.add_image(name, ImageSource::Bytes(bytes.into()))
    }

    pub fn remove_image(&self, id: ImageId) -> bool {
        let removed = {
            let mut state = self.state.write();
            let before = state.images.len();
            state.images.retain(|img| img.id != id);
            state.selected.remove(&id);
            if state.viewed == Some(id) {
                state.viewed = None;
            }
            state.images.len() != before
        };
        if removed {
            self.notify();
        }
        removed
    }

    pub fn get(&self, id: ImageId) -> Option<ImageEntry> {
        self.state.read().images.iter().find(|img| img.id == id).cloned()
    }

    pub fn ids(&self) -> Vec<ImageId> {
        self.state.read().images.iter().map(|img| img.id).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── selection / focus ────────────────────────────────────────────

    /// Replace the selection. Unknown ids are ignored.
    pub fn set_selection(&self, ids: &[ImageId]) {
        {
            let mut state = self.state.write();
            let known: HashSet<ImageId> = state.images.iter().map(|img| img.id).collect();
            state.selected = ids.iter().copied().filter(|id| known.contains(id)).collect();
        }
        self.notify();
    }

    pub fn select_all(&self) {
        {
            let mut state = self.state.write();
            let all = state.images.iter().map(|img| img.id).collect();
            state.selected = all;
        }
        self.notify();
    }

    /// Selected ids in workspace order.
    pub fn selected_ids(&self) -> Vec<ImageId> {
        let state = self.state.read();
        state
            .images
            .iter()
            .filter(|img| state.selected.contains(&img.id))
            .map(|img| img.id)
            .collect()
    }

    /// Snapshots of the selected images, in workspace order.
    pub fn selected_entries(&self) -> Vec<ImageEntry> {
        let state = self.state.read();
        state
            .images
            .iter()
            .filter(|img| state.selected.contains(&img.id))
            .cloned()
            .collect()
    }

    /// Mark the image currently shown to the user.
    pub fn set_viewed(&self, id: Option<ImageId>) {
        {
            let mut state = self.state.write();
            let viewed = id.filter(|id| state.images.iter().any(|img| img.id == *id));
            state.viewed = viewed;
        }
        self.notify();
    }

    pub fn viewed(&self) -> Option<ImageId> {
        self.state.read().viewed
    }

    // ── adjustments ──────────────────────────────────────────────────

    /// Replace one image's adjustments wholesale.
    pub fn replace_adjustments(&self, id: ImageId, adjustments: AdjustmentSet) -> bool {
        let adjustments = adjustments.clamped();
        self.modify(id, |img| {
            img.adjustments = adjustments;
            true
        })
    }

    /// Replace one image's adjustments with `f(current)`.
    pub fn update_adjustments(
        &self,
        id: ImageId,
        f: impl FnOnce(&AdjustmentSet) -> AdjustmentSet,
    ) -> bool {
        self.modify(id, |img| {
            img.adjustments = f(&img.adjustments).clamped();
            true
        })
    }

    /// Copy `adjustments` into every selected image. Returns how many changed.
    pub fn apply_to_selection(&self, adjustments: &AdjustmentSet) -> usize {
        let adjustments = adjustments.clamped();
        let count = {
            let mut state = self.state.write();
            let WorkspaceState {
                images, selected, ..
            } = &mut *state;
            let mut count = 0;
            for img in images.iter_mut().filter(|img| selected.contains(&img.id)) {
                img.adjustments = adjustments.clone();
                count += 1;
            }
            count
        };
        if count > 0 {
            self.notify();
        }
        count
    }

    /// Toggle privacy blur on the selection.
    ///
    /// Region state is left alone: an image that was already scanned keeps
    /// its result when blur is switched back on.
    pub fn set_privacy_blur_for_selection(&self, enabled: bool) -> usize {
        let count = {
            let mut state = self.state.write();
            let WorkspaceState {
                images, selected, ..
            } = &mut *state;
            let mut count = 0;
            for img in images.iter_mut().filter(|img| selected.contains(&img.id)) {
                img.adjustments = img.adjustments.with_privacy_blur(enabled);
                count += 1;
            }
            count
        };
        if count > 0 {
            self.notify();
        }
        count
    }

    // ── regions ──────────────────────────────────────────────────────

    /// Store a detection result. False if the image is gone.
    pub fn set_regions(&self, id: ImageId, regions: Vec<DetectionRegion>) -> bool {
        self.modify(id, |img| {
            img.regions = Some(regions);
            true
        })
    }

    /// Forget an image's detection result so it is scanned again.
    pub fn rescan(&self, id: ImageId) -> bool {
        self.modify(id, |img| img.regions.take().is_some())
    }

    /// Selected images with privacy blur on and no detection result, the
    /// viewed image first and the rest in workspace order.
    pub fn detection_candidates(&self) -> Vec<ImageId> {
        let state = self.state.read();
        let mut candidates: Vec<ImageId> = state
            .images
            .iter()
            .filter(|img| state.selected.contains(&img.id) && img.needs_detection())
            .map(|img| img.id)
            .collect();

        if let Some(viewed) = state.viewed {
            if let Some(pos) = candidates.iter().position(|&id| id == viewed) {
                let first = candidates.remove(pos);
                candidates.insert(0, first);
            }
        }
        candidates
    }

    // ── sources ──────────────────────────────────────────────────────

    /// Swap an image's source pixels (e.g. after background removal).
    ///
    /// The name's extension is switched to `.png` since the new bytes are PNG.
    pub fn replace_source_png(&self, id: ImageId, png: Vec<u8>) -> bool {
        self.modify(id, |img| {
            img.source = ImageSource::Bytes(png.into());
            img.name = std::path::Path::new(&img.name)
                .with_extension("png")
                .to_string_lossy()
                .into_owned();
            true
        })
    }
}
