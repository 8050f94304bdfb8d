mod autosave;

pub use autosave::{
    run_remote_save, AutosaveTimer, PersistenceCoordinator, RemoteReceipt, RemoteTarget,
    SaveMode, SaveRejected, SaveState, SaveTicket, DEFAULT_AUTOSAVE_DELAY_MS,
};

use crate::api::{ApiResult, ContentStore, ImageUpload};
use crate::drafts::DraftStore;
use crate::editor::{build_fragment, commit_fragment, InsertionRequest, ValidationError};
use crate::layout::{Pane, ScrollCommand, ScrollMetrics, ScrollSyncController, SplitViewController};
use crate::metrics::{DraftMetrics, DEFAULT_WORDS_PER_MINUTE};
use crate::models::{CursorRange, DocumentDraft, DraftPatch, DraftSnapshot};
use crate::storage::DurableStorage;
use crate::util::Clock;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// `"new"` for an unsaved post, otherwise the remote post id.
    pub session_key: String,
    pub autosave_delay_ms: u32,
    pub words_per_minute: usize,
}

impl SessionConfig {
    pub const NEW_POST: &'static str = "new";

    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            ..Default::default()
        }
    }

    pub fn is_new_post(&self) -> bool {
        self.session_key == Self::NEW_POST
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_key: Self::NEW_POST.to_string(),
            autosave_delay_ms: DEFAULT_AUTOSAVE_DELAY_MS,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }
}

/// Result of splicing a fragment into the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Caret just after the inserted fragment.
    pub caret: CursorRange,
    pub autosave: Option<AutosaveTimer>,
}

/// One editing session: the draft, its derived metrics, persistence and pane layout.
///
/// The host shell owns this value and forwards UI events to it. Every draft mutation
/// recomputes metrics and informs persistence before the call returns; any returned
/// [`AutosaveTimer`] must be scheduled by the host.
pub struct ComposerSession<S: DurableStorage, C: Clock> {
    config: SessionConfig,
    clock: C,
    store: DraftStore,
    metrics: DraftMetrics,
    persistence: PersistenceCoordinator<S>,
    split: SplitViewController,
    scroll: ScrollSyncController,
    cursor: CursorRange,
}

impl<S: DurableStorage, C: Clock> ComposerSession<S, C> {
    pub fn new(config: SessionConfig, storage: S, clock: C) -> Self {
        let mut persistence =
            PersistenceCoordinator::new(storage, config.session_key.clone(), config.autosave_delay_ms);
        if !config.is_new_post() {
            persistence.set_post_id(config.session_key.clone());
        }
        persistence.set_words_per_minute(config.words_per_minute);
        let store = DraftStore::new();
        let metrics = DraftMetrics::compute(&store.get(), config.words_per_minute);
        Self {
            config,
            clock,
            store,
            metrics,
            persistence,
            split: SplitViewController::new(),
            scroll: ScrollSyncController::new(),
            cursor: CursorRange::default(),
        }
    }

    /// Load a post fetched from the server as the starting point, without marking it dirty.
    pub fn load_remote(&mut self, draft: DocumentDraft) {
        self.store.replace(draft);
        self.refresh_metrics();
    }

    /// Check for a recoverable snapshot. Must run before editing begins.
    pub fn start(&mut self, discard_requested: bool) -> Option<DraftSnapshot> {
        self.persistence.start(discard_requested)
    }

    pub fn accept_recovery(&mut self) -> bool {
        let Some(snap) = self.persistence.accept_recovery() else {
            return false;
        };
        self.store.replace(snap.draft);
        self.refresh_metrics();
        self.cursor = CursorRange::default();
        true
    }

    pub fn decline_recovery(&mut self) -> Option<AutosaveTimer> {
        let now = self.clock.now_ms();
        self.persistence.decline_recovery(now)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn draft(&self) -> Arc<DocumentDraft> {
        self.store.get()
    }

    pub fn metrics(&self) -> &DraftMetrics {
        &self.metrics
    }

    pub fn persistence(&self) -> &PersistenceCoordinator<S> {
        &self.persistence
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&Arc<DocumentDraft>) + 'static) {
        self.store.subscribe(observer);
    }

    fn refresh_metrics(&mut self) {
        self.metrics = DraftMetrics::compute(&self.store.get(), self.config.words_per_minute);
    }

    fn after_change(&mut self, changed: bool) -> Option<AutosaveTimer> {
        if !changed {
            return None;
        }
        self.refresh_metrics();
        let now = self.clock.now_ms();
        self.persistence.note_mutation(now)
    }

    pub fn update(&mut self, patch: DraftPatch) -> Option<AutosaveTimer> {
        let changed = self.store.update(patch);
        self.after_change(changed)
    }

    pub fn set_slug_manual(&mut self, manual: bool) -> Option<AutosaveTimer> {
        let changed = self.store.set_slug_manual(manual);
        self.after_change(changed)
    }

    pub fn add_tag(&mut self, tag: &str) -> Option<AutosaveTimer> {
        let changed = self.store.add_tag(tag);
        self.after_change(changed)
    }

    pub fn remove_tag(&mut self, tag: &str) -> Option<AutosaveTimer> {
        let changed = self.store.remove_tag(tag);
        self.after_change(changed)
    }

    /// Remember the body selection; called on focus/select and before a sub-flow opens.
    pub fn capture_cursor(&mut self, range: CursorRange) {
        self.cursor = range;
    }

    pub fn cursor(&self) -> CursorRange {
        self.cursor
    }

    /// Build the fragment for `request` and splice it in at the captured cursor.
    ///
    /// On a validation error nothing changes, so the sub-flow can stay open.
    pub fn insert(&mut self, request: &InsertionRequest) -> Result<InsertOutcome, ValidationError> {
        let fragment = build_fragment(request)?;
        let before = self.store.get();
        let caret = commit_fragment(&mut self.store, &fragment, self.cursor);
        let changed = !Arc::ptr_eq(&before, &self.store.get());
        self.cursor = caret;
        Ok(InsertOutcome {
            caret,
            autosave: self.after_change(changed),
        })
    }

    pub fn autosave_due(&mut self, token: u64) -> bool {
        let now = self.clock.now_ms();
        let draft = self.store.get();
        self.persistence.autosave_due(token, &draft, now)
    }

    pub fn begin_save(&mut self, mode: SaveMode) -> Result<SaveTicket, SaveRejected> {
        let now = self.clock.now_ms();
        let draft = self.store.get();
        self.persistence.begin_remote_save(mode, &draft, now)
    }

    pub fn finish_save(&mut self, result: ApiResult<RemoteReceipt>) -> Option<AutosaveTimer> {
        let now = self.clock.now_ms();
        let draft = self.store.get();
        self.persistence.finish_remote_save(result, &draft, now)
    }

    pub fn should_confirm_unload(&self) -> bool {
        self.persistence.should_confirm_unload()
    }

    pub fn split(&self) -> &SplitViewController {
        &self.split
    }

    pub fn split_mut(&mut self) -> &mut SplitViewController {
        &mut self.split
    }

    pub fn mark_scroll_intent(&mut self, pane: Pane) {
        self.scroll.mark_user_intent(pane);
    }

    pub fn on_scroll(
        &mut self,
        pane: Pane,
        source: ScrollMetrics,
        mirror: ScrollMetrics,
    ) -> Option<ScrollCommand> {
        self.scroll.on_scroll(pane, source, mirror, &self.split)
    }
}

/// Upload a picked image and turn the stored URL into an image insertion request.
pub async fn upload_image_request(
    store: &impl ContentStore,
    file: ImageUpload,
    alt: &str,
) -> ApiResult<InsertionRequest> {
    let res = store.upload_image(file).await?;
    Ok(InsertionRequest::Image {
        alt: alt.trim().to_string(),
        url: res.url,
        caption: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiErrorKind, CreatePostResponse, PostPayload, UploadImageResponse};
    use crate::cache::{load_draft_snapshot, save_draft_snapshot};
    use crate::storage::MemoryStorage;
    use crate::util::ManualClock;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type TestSession = ComposerSession<Rc<MemoryStorage>, ManualClock>;

    fn session() -> (Rc<MemoryStorage>, ManualClock, TestSession) {
        let storage = Rc::new(MemoryStorage::new());
        let clock = ManualClock::new(0);
        let mut s =
            ComposerSession::new(SessionConfig::default(), Rc::clone(&storage), clock.clone());
        assert!(s.start(false).is_none());
        (storage, clock, s)
    }

    #[derive(Default)]
    struct FakeStore {
        fail: Cell<bool>,
        omit_id: Cell<bool>,
        created: RefCell<Vec<PostPayload>>,
        updated: RefCell<Vec<(String, PostPayload)>>,
    }

    impl ContentStore for FakeStore {
        async fn fetch_post(&self, id: &str) -> ApiResult<PostPayload> {
            let draft = DocumentDraft {
                title: format!("Post {id}"),
                slug: format!("post-{id}"),
                ..Default::default()
            };
            Ok(PostPayload::from_draft(
                &draft,
                crate::models::PostStatus::Published,
                DEFAULT_WORDS_PER_MINUTE,
            ))
        }

        async fn create_post(&self, payload: &PostPayload) -> ApiResult<CreatePostResponse> {
            if self.fail.get() {
                return Err(ApiError::http(500, "boom".to_string(), "Create post failed"));
            }
            self.created.borrow_mut().push(payload.clone());
            Ok(CreatePostResponse {
                slug: payload.slug.clone(),
                id: (!self.omit_id.get()).then(|| "p-1".to_string()),
            })
        }

        async fn update_post(&self, id: &str, payload: &PostPayload) -> ApiResult<()> {
            if self.fail.get() {
                return Err(ApiError::http(500, "boom".to_string(), "Update post failed"));
            }
            self.updated
                .borrow_mut()
                .push((id.to_string(), payload.clone()));
            Ok(())
        }

        async fn upload_image(&self, file: ImageUpload) -> ApiResult<UploadImageResponse> {
            Ok(UploadImageResponse {
                url: format!("https://cdn.example/{}", file.file_name),
            })
        }
    }

    #[test]
    fn test_metrics_follow_every_update() {
        let (_storage, _clock, mut s) = session();
        assert_eq!(s.metrics().report.score, 0);

        s.update(DraftPatch {
            cover_image_url: Some("https://img.example/c.png".to_string()),
            ..Default::default()
        });
        assert_eq!(s.metrics().report.score, 15);

        s.update(DraftPatch::body("one two three"));
        assert_eq!(s.metrics().word_count, 3);
        assert_eq!(s.persistence().state(), SaveState::Dirty);
    }

    #[test]
    fn test_noop_update_does_not_dirty() {
        let (_storage, _clock, mut s) = session();
        assert!(s.update(DraftPatch::default()).is_none());
        assert!(s.add_tag("").is_none());
        assert_eq!(s.persistence().state(), SaveState::Clean);
    }

    #[test]
    fn test_autosave_then_recover_in_new_session() {
        let (storage, clock, mut s) = session();
        s.update(DraftPatch::title("Recover me"));
        s.add_tag("rust");
        let timer = s.update(DraftPatch::body("Some text")).expect("timer");
        clock.advance(timer.delay_ms as i64);
        assert!(s.autosave_due(timer.token));
        let saved = s.draft();

        let mut next = ComposerSession::new(
            SessionConfig::default(),
            Rc::clone(&storage),
            ManualClock::new(10_000),
        );
        let offered = next.start(false).expect("should offer recovery");
        assert_eq!(offered.saved_at, 5_000);
        assert!(next.accept_recovery());
        assert_eq!(*next.draft(), *saved);
        assert_eq!(next.metrics().word_count, 2);
        assert_eq!(next.persistence().state(), SaveState::Clean);
    }

    #[test]
    fn test_insert_uses_captured_cursor() {
        let (_storage, _clock, mut s) = session();
        s.update(DraftPatch::body("See  for details."));
        s.capture_cursor(CursorRange::caret(4));
        let out = s
            .insert(&InsertionRequest::Link {
                text: "docs".to_string(),
                url: "https://docs.example".to_string(),
            })
            .expect("valid link");
        assert_eq!(s.draft().body, "See [docs](https://docs.example) for details.");
        assert_eq!(out.caret, CursorRange::caret(32));
        assert_eq!(s.cursor(), out.caret);
        assert!(out.autosave.is_some());
    }

    #[test]
    fn test_invalid_insert_changes_nothing() {
        let (_storage, _clock, mut s) = session();
        s.update(DraftPatch::body("keep"));
        let err = s
            .insert(&InsertionRequest::Diagram {
                source: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.field, "source");
        assert_eq!(s.draft().body, "keep");
    }

    #[test]
    fn test_existing_post_session_updates() {
        let storage = Rc::new(MemoryStorage::new());
        let mut s = ComposerSession::new(SessionConfig::new("p-42"), storage, ManualClock::new(0));
        s.start(false);
        s.update(DraftPatch::title("Existing"));
        let ticket = s.begin_save(SaveMode::Draft).expect("should start");
        assert_eq!(ticket.target, RemoteTarget::Update("p-42".to_string()));
    }

    #[test]
    fn test_load_remote_is_clean() {
        let (_storage, _clock, mut s) = session();
        s.load_remote(DocumentDraft {
            title: "From server".to_string(),
            body: "a b".to_string(),
            ..Default::default()
        });
        assert_eq!(s.metrics().word_count, 2);
        assert!(!s.should_confirm_unload());
    }

    #[tokio::test]
    async fn test_fetched_post_keeps_its_slug() {
        let storage = Rc::new(MemoryStorage::new());
        let mut s = ComposerSession::new(SessionConfig::new("7"), storage, ManualClock::new(0));
        let fake = FakeStore::default();
        let post = fake.fetch_post("7").await.expect("fetch");
        s.load_remote(post.into_draft());
        s.update(DraftPatch::title("Renamed"));
        assert_eq!(s.draft().slug, "post-7");
    }

    #[tokio::test]
    async fn test_edits_while_post_loads_keep_older_snapshot() {
        let storage = Rc::new(MemoryStorage::new());
        let older = DocumentDraft {
            title: "Unsaved work from yesterday".to_string(),
            ..Default::default()
        };
        save_draft_snapshot(storage.as_ref(), "p-1", &older, 1).expect("seed");

        let clock = ManualClock::new(0);
        let mut s = ComposerSession::new(SessionConfig::new("p-1"), Rc::clone(&storage), clock.clone());
        assert!(s.update(DraftPatch::body("x")).is_none());
        clock.advance(5_000);
        assert!(!s.autosave_due(1));

        let post = FakeStore::default().fetch_post("p-1").await.expect("fetch");
        s.load_remote(post.into_draft());
        assert!(!s.should_confirm_unload());

        let offered = s.start(false).expect("older draft still offered");
        assert_eq!(offered.draft.title, "Unsaved work from yesterday");
        assert!(s.accept_recovery());
        assert_eq!(s.draft().title, "Unsaved work from yesterday");
    }

    #[tokio::test]
    async fn test_create_without_id_is_not_repeated() {
        let (_storage, _clock, mut s) = session();
        let fake = FakeStore::default();
        fake.omit_id.set(true);
        s.update(DraftPatch::title("Only a slug"));

        for _ in 0..2 {
            let ticket = s.begin_save(SaveMode::Draft).expect("should start");
            let result = run_remote_save(&fake, &ticket).await;
            s.finish_save(result);
        }
        assert_eq!(fake.created.borrow().len(), 1);
        assert_eq!(fake.updated.borrow().len(), 1);
        assert_eq!(fake.updated.borrow()[0].0, "only-a-slug");
    }

    #[test]
    fn test_scroll_sync_through_session() {
        let (_storage, _clock, mut s) = session();
        s.mark_scroll_intent(Pane::Editor);
        let cmd = s
            .on_scroll(
                Pane::Editor,
                ScrollMetrics::new(50.0, 200.0, 100.0),
                ScrollMetrics::new(0.0, 400.0, 100.0),
            )
            .expect("should mirror");
        assert_eq!(cmd.scroll_top, 150.0);

        s.split_mut().set_mode(crate::layout::ViewMode::Editor);
        assert!(s
            .on_scroll(
                Pane::Editor,
                ScrollMetrics::new(60.0, 200.0, 100.0),
                ScrollMetrics::new(0.0, 400.0, 100.0),
            )
            .is_none());
    }

    #[tokio::test]
    async fn test_publish_roundtrip_against_store() {
        let (storage, clock, mut s) = session();
        let fake = FakeStore::default();
        s.update(DraftPatch::title("Shipping it"));
        s.update(DraftPatch::body("Done."));

        let ticket = s.begin_save(SaveMode::Publish).expect("should start");
        assert!(s.begin_save(SaveMode::Publish).is_err());
        let result = run_remote_save(&fake, &ticket).await;
        clock.advance(100);
        s.finish_save(result);

        assert_eq!(s.persistence().state(), SaveState::Clean);
        assert_eq!(fake.created.borrow().len(), 1);
        assert_eq!(fake.created.borrow()[0].title, "Shipping it");
        assert!(load_draft_snapshot(storage.as_ref(), "new").is_none());

        s.update(DraftPatch::body("Done. Again."));
        let ticket = s.begin_save(SaveMode::Publish).expect("should start");
        let result = run_remote_save(&fake, &ticket).await;
        s.finish_save(result);
        assert_eq!(fake.updated.borrow()[0].0, "p-1");
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_local_copy() {
        let (storage, _clock, mut s) = session();
        let fake = FakeStore::default();
        fake.fail.set(true);
        s.update(DraftPatch::title("Will fail"));

        let ticket = s.begin_save(SaveMode::Publish).expect("should start");
        let result = run_remote_save(&fake, &ticket).await;
        assert_eq!(result.as_ref().unwrap_err().kind, ApiErrorKind::Http);
        s.finish_save(result);

        assert_eq!(s.persistence().state(), SaveState::SaveFailed);
        let snap = load_draft_snapshot(storage.as_ref(), "new").expect("safety net");
        assert_eq!(snap.draft.title, "Will fail");
    }

    #[tokio::test]
    async fn test_uploaded_image_becomes_insertable() {
        let fake = FakeStore::default();
        let req = upload_image_request(
            &fake,
            ImageUpload {
                file_name: "cat.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            },
            " A cat ",
        )
        .await
        .expect("upload should succeed");
        assert_eq!(
            build_fragment(&req).expect("should build"),
            "![A cat](https://cdn.example/cat.png)"
        );
    }

    #[test]
    fn test_snapshot_seeded_by_other_tab_is_offered() {
        let (storage, _clock, mut s) = session();
        let d = DocumentDraft {
            title: "Other tab".to_string(),
            ..Default::default()
        };
        save_draft_snapshot(storage.as_ref(), "new", &d, 3).expect("seed");
        assert!(s.start(false).is_some());
        assert!(s.begin_save(SaveMode::Draft).is_err());
        assert!(s.decline_recovery().is_none());
        assert!(s.begin_save(SaveMode::Draft).is_ok());
    }
}
