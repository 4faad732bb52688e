//! Template cache – parsed templates keyed by path.
//!
//! Warm reads never block: a loaded template is published once and read
//! without locking. Cold loads are serialized per key, so concurrent callers
//! for the same path wait for the first loader and then share its result.
//! Callers for other paths are not blocked. A failed load leaves the slot
//! empty so the next caller retries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::error::RenderError;
use crate::render::CachedTemplate;

#[derive(Debug, Default)]
struct Slot {
    ready: OnceLock<Arc<CachedTemplate>>,
    /// Held only while loading.
    loading: Mutex<()>,
}

#[derive(Debug, Default)]
pub struct TemplateCache {
    slots: RwLock<HashMap<PathBuf, Arc<Slot>>>,
    loads: AtomicUsize,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the parsed template for `path`, loading it on first use.
    pub fn get(&self, path: &Path) -> Result<Arc<CachedTemplate>, RenderError> {
        let slot = self.slot(path);
        if let Some(template) = slot.ready.get() {
            return Ok(Arc::clone(template));
        }

        // A poisoned lock only means another loader panicked before
        // publishing anything.
        let _loading = slot.loading.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(template) = slot.ready.get() {
            return Ok(Arc::clone(template));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        log::info!("loading template {}", path.display());
        let template = Arc::new(CachedTemplate::load(path)?);
        Ok(Arc::clone(slot.ready.get_or_init(|| template)))
    }

    /// Number of loads attempted so far (hits are not counted).
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of paths currently holding a parsed template.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        slots
            .values()
            .filter(|slot| slot.ready.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, path: &Path) -> Arc<Slot> {
        {
            let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
            if let Some(slot) = slots.get(path) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(slots.entry(path.to_path_buf()).or_default())
    }
}
