use crate::metrics::slugify;
use crate::models::{DocumentDraft, DraftPatch};
use std::sync::Arc;

pub type DraftObserver = Box<dyn FnMut(&Arc<DocumentDraft>)>;

/// Owner of the draft under edit.
///
/// Every committed change replaces the shared [`DocumentDraft`] value wholesale, so a
/// reader holding an `Arc` from [`DraftStore::get`] never sees a half-applied patch.
/// Observers run synchronously, in registration order, before the mutating call returns.
pub struct DraftStore {
    current: Arc<DocumentDraft>,
    observers: Vec<DraftObserver>,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("current", &self.current)
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn normalize_tag(tag: &str) -> Option<String> {
    let t = tag.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

impl DraftStore {
    pub fn new() -> Self {
        Self::from_draft(DocumentDraft::default())
    }

    pub fn from_draft(draft: DocumentDraft) -> Self {
        Self {
            current: Arc::new(draft),
            observers: Vec::new(),
        }
    }

    pub fn get(&self) -> Arc<DocumentDraft> {
        Arc::clone(&self.current)
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&Arc<DocumentDraft>) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Merge `patch` into the draft. Returns whether anything changed.
    pub fn update(&mut self, patch: DraftPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        let mut next = (*self.current).clone();
        apply_patch(&mut next, patch);
        self.commit(next)
    }

    /// Turn manual slug mode on or off. Turning it off re-derives the slug from the title.
    pub fn set_slug_manual(&mut self, manual: bool) -> bool {
        let mut next = (*self.current).clone();
        next.slug_manually_edited = manual;
        sync_slug(&mut next);
        self.commit(next)
    }

    /// Adding a tag that is already present (case-sensitive) is a no-op.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let Some(tag) = normalize_tag(tag) else {
            return false;
        };
        if self.current.tags.contains(&tag) {
            return false;
        }
        let mut next = (*self.current).clone();
        next.tags.insert(tag);
        self.commit(next)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        if !self.current.tags.contains(tag) {
            return false;
        }
        let mut next = (*self.current).clone();
        next.tags.remove(tag);
        self.commit(next)
    }

    /// Swap in a whole draft, e.g. one rehydrated from a snapshot.
    pub fn replace(&mut self, draft: DocumentDraft) -> bool {
        self.commit(draft)
    }

    fn commit(&mut self, next: DocumentDraft) -> bool {
        if next == *self.current {
            return false;
        }
        self.current = Arc::new(next);
        let snapshot = Arc::clone(&self.current);
        for observer in self.observers.iter_mut() {
            observer(&snapshot);
        }
        true
    }
}

fn sync_slug(draft: &mut DocumentDraft) {
    if !draft.slug_manually_edited {
        draft.slug = slugify(&draft.title);
    }
}

fn apply_patch(d: &mut DocumentDraft, p: DraftPatch) {
    if let Some(v) = p.title {
        d.title = v;
    }
    if let Some(v) = p.body {
        d.body = v;
    }
    if let Some(v) = p.excerpt {
        d.excerpt = v;
    }
    if let Some(v) = p.category_id {
        d.category_id = v;
    }
    if let Some(tags) = p.tags {
        d.tags = tags.iter().filter_map(|t| normalize_tag(t)).collect();
    }
    if let Some(v) = p.cover_image_url {
        d.cover_image_url = v;
    }
    if let Some(v) = p.cover_image_alt {
        d.cover_image_alt = v;
    }
    if let Some(v) = p.visibility {
        d.visibility = v;
    }
    if let Some(v) = p.status {
        d.status = v;
    }
    if let Some(v) = p.publish_at {
        d.publish_at = v;
    }
    if let Some(v) = p.slug {
        // A slug typed by the user pins it.
        d.slug = v;
        d.slug_manually_edited = true;
    }
    if let Some(v) = p.meta_title {
        d.meta_title = v;
    }
    if let Some(v) = p.meta_description {
        d.meta_description = v;
    }
    if let Some(v) = p.focus_keyword {
        d.focus_keyword = v;
    }
    if let Some(v) = p.canonical_url {
        d.canonical_url = v;
    }
    sync_slug(d);
}
