use crate::api::{ApiError, ApiResult, ContentStore, PostPayload};
use crate::cache::{clear_draft_snapshot, load_draft_snapshot, save_draft_snapshot};
use crate::editor::ValidationError;
use crate::metrics::{slugify, DEFAULT_WORDS_PER_MINUTE};
use crate::models::{DocumentDraft, DraftSnapshot, PostStatus};
use crate::storage::DurableStorage;

pub const DEFAULT_AUTOSAVE_DELAY_MS: u32 = 5_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum SaveState {
    Clean,
    Dirty,
    Saving,
    SaveFailed,
}

/// A debounce timer the host should schedule. When it fires, hand the token back to
/// `autosave_due`; tokens from superseded timers are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutosaveTimer {
    pub token: u64,
    pub delay_ms: u32,
}

#[derive(Clone, Copy, Debug)]
struct PendingAutosave {
    token: u64,
    due_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum SaveMode {
    Draft,
    Publish,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteTarget {
    Create,
    Update(String),
}

/// Everything needed to perform one remote write, captured when the save began.
#[derive(Clone, Debug)]
pub struct SaveTicket {
    pub mode: SaveMode,
    pub target: RemoteTarget,
    pub payload: PostPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteReceipt {
    pub id: Option<String>,
    pub slug: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SaveRejected {
    #[error("a save is already in progress")]
    AlreadySaving,
    #[error("resolve the draft recovery prompt first")]
    RecoveryPending,
    #[error("the session is still loading")]
    NotStarted,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Tracks whether the draft is durably saved and drives local autosave and remote saves.
///
/// Local snapshot writes that fail are logged and recorded as a warning; they never
/// change the draft and never propagate.
pub struct PersistenceCoordinator<S: DurableStorage> {
    storage: S,
    session_key: String,
    delay_ms: u32,
    words_per_minute: usize,
    state: SaveState,
    next_token: u64,
    pending: Option<PendingAutosave>,
    started: bool,
    recovery: Option<DraftSnapshot>,
    edited_while_saving: bool,
    last_saved_at: Option<i64>,
    last_warning: Option<String>,
    last_error: Option<ApiError>,
    post_id: Option<String>,
    published_slug: Option<String>,
}

impl<S: DurableStorage> PersistenceCoordinator<S> {
    pub fn new(storage: S, session_key: impl Into<String>, delay_ms: u32) -> Self {
        Self {
            storage,
            session_key: session_key.into(),
            delay_ms,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            state: SaveState::Clean,
            next_token: 0,
            pending: None,
            started: false,
            recovery: None,
            edited_while_saving: false,
            last_saved_at: None,
            last_warning: None,
            last_error: None,
            post_id: None,
            published_slug: None,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.last_saved_at
    }

    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    pub fn published_slug(&self) -> Option<&str> {
        self.published_slug.as_deref()
    }

    /// Editing an existing post: later saves update it instead of creating a new one.
    pub fn set_post_id(&mut self, id: impl Into<String>) {
        self.post_id = Some(id.into());
    }

    /// Reading speed used for the reading time sent with remote saves.
    pub fn set_words_per_minute(&mut self, words_per_minute: usize) {
        self.words_per_minute = words_per_minute;
    }

    /// When the pending autosave is due, if any.
    pub fn pending_due_at(&self) -> Option<i64> {
        self.pending.map(|p| p.due_at)
    }

    pub fn status_label(&self) -> &'static str {
        match self.state {
            SaveState::Clean => "Saved",
            SaveState::Dirty => "Unsaved changes",
            SaveState::Saving => "Saving…",
            SaveState::SaveFailed => "Save failed",
        }
    }

    /// Leaving the session must be confirmed while changes are not yet durable.
    pub fn should_confirm_unload(&self) -> bool {
        matches!(self.state, SaveState::Dirty | SaveState::Saving)
    }

    /// Look for a snapshot left by an earlier session. Returns it when the user should be
    /// asked whether to restore it; autosave stays off until they answer.
    pub fn start(&mut self, discard_requested: bool) -> Option<DraftSnapshot> {
        self.started = true;
        if discard_requested {
            self.clear_local();
            return None;
        }
        let snap = load_draft_snapshot(&self.storage, &self.session_key)?;
        tracing::debug!(saved_at = snap.saved_at, "found recoverable draft");
        self.recovery = Some(snap.clone());
        Some(snap)
    }

    pub fn recovery_pending(&self) -> bool {
        self.recovery.is_some()
    }

    /// Accept the offered snapshot. The caller rehydrates its draft from the result.
    pub fn accept_recovery(&mut self) -> Option<DraftSnapshot> {
        let snap = self.recovery.take()?;
        self.cancel_pending();
        self.state = SaveState::Clean;
        self.last_saved_at = Some(snap.saved_at);
        Some(snap)
    }

    /// Decline the offered snapshot and delete it.
    pub fn decline_recovery(&mut self, now: i64) -> Option<AutosaveTimer> {
        self.recovery.take()?;
        self.clear_local();
        if self.state == SaveState::Dirty {
            return Some(self.arm(now));
        }
        None
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Record a draft mutation. Returns the timer to schedule, if one should run.
    ///
    /// Before `start` has looked for a recoverable snapshot, mutations are not tracked:
    /// a timer armed then could overwrite that snapshot.
    pub fn note_mutation(&mut self, now: i64) -> Option<AutosaveTimer> {
        if !self.started {
            tracing::debug!("mutation before session start ignored by autosave");
            return None;
        }
        match self.state {
            SaveState::Saving => {
                self.edited_while_saving = true;
                None
            }
            SaveState::Clean | SaveState::SaveFailed | SaveState::Dirty => {
                if self.state != SaveState::Dirty {
                    tracing::debug!(from = %self.state, "draft is dirty");
                }
                self.state = SaveState::Dirty;
                if self.recovery.is_some() {
                    return None;
                }
                Some(self.arm(now))
            }
        }
    }

    fn arm(&mut self, now: i64) -> AutosaveTimer {
        self.next_token += 1;
        let token = self.next_token;
        self.pending = Some(PendingAutosave {
            token,
            due_at: now + i64::from(self.delay_ms),
        });
        AutosaveTimer {
            token,
            delay_ms: self.delay_ms,
        }
    }

    fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// The debounce timer for `token` fired. Writes the snapshot if that timer is still
    /// the live one and the draft is dirty. Returns whether a write happened.
    pub fn autosave_due(&mut self, token: u64, draft: &DocumentDraft, now: i64) -> bool {
        match self.pending {
            Some(p) if p.token == token => {}
            _ => return false,
        }
        self.pending = None;
        if self.state != SaveState::Dirty {
            return false;
        }
        if self.write_local(draft, now) {
            self.state = SaveState::Clean;
            true
        } else {
            false
        }
    }

    fn write_local(&mut self, draft: &DocumentDraft, now: i64) -> bool {
        match save_draft_snapshot(&self.storage, &self.session_key, draft, now) {
            Ok(_) => {
                self.last_saved_at = Some(now);
                self.last_warning = None;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "local draft snapshot not written");
                self.last_warning = Some(e.to_string());
                false
            }
        }
    }

    fn clear_local(&mut self) {
        if let Err(e) = clear_draft_snapshot(&self.storage, &self.session_key) {
            tracing::warn!(error = %e, "local draft snapshot not cleared");
            self.last_warning = Some(e.to_string());
        }
    }

    /// Start an explicit save or publish. Only one may be in flight.
    pub fn begin_remote_save(
        &mut self,
        mode: SaveMode,
        draft: &DocumentDraft,
        now: i64,
    ) -> Result<SaveTicket, SaveRejected> {
        if !self.started {
            return Err(SaveRejected::NotStarted);
        }
        if self.state == SaveState::Saving {
            return Err(SaveRejected::AlreadySaving);
        }
        if self.recovery.is_some() {
            return Err(SaveRejected::RecoveryPending);
        }
        let status = resolve_status(mode, draft, now)?;

        self.cancel_pending();
        // The local snapshot must hold exactly what is being sent.
        self.write_local(draft, now);
        self.state = SaveState::Saving;
        self.edited_while_saving = false;
        tracing::debug!(%mode, %status, "remote save started");

        let target = match &self.post_id {
            Some(id) => RemoteTarget::Update(id.clone()),
            None => RemoteTarget::Create,
        };
        Ok(SaveTicket {
            mode,
            target,
            payload: PostPayload::from_draft(draft, status, self.words_per_minute),
        })
    }

    /// Settle the save started by `begin_remote_save`.
    ///
    /// `draft` is the current draft, which may have changed while the request was out.
    pub fn finish_remote_save(
        &mut self,
        result: ApiResult<RemoteReceipt>,
        draft: &DocumentDraft,
        now: i64,
    ) -> Option<AutosaveTimer> {
        if self.state != SaveState::Saving {
            return None;
        }
        let edited = std::mem::take(&mut self.edited_while_saving);

        match result {
            Ok(receipt) => {
                self.clear_local();
                if self.post_id.is_none() {
                    // A create that returns no id is addressed by its slug from now on.
                    let id = receipt.id.unwrap_or_else(|| receipt.slug.clone());
                    // Snapshots for this post now live under its id.
                    self.session_key = id.clone();
                    self.post_id = Some(id);
                }
                self.published_slug = Some(receipt.slug);
                self.last_error = None;
                self.last_saved_at = Some(now);
                if edited {
                    self.state = SaveState::Dirty;
                    Some(self.arm(now))
                } else {
                    self.state = SaveState::Clean;
                    None
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "remote save failed");
                self.last_error = Some(e);
                self.state = SaveState::SaveFailed;
                if edited {
                    self.write_local(draft, now);
                }
                None
            }
        }
    }
}

fn resolve_status(
    mode: SaveMode,
    draft: &DocumentDraft,
    now: i64,
) -> Result<PostStatus, ValidationError> {
    if mode == SaveMode::Draft {
        return Ok(PostStatus::Draft);
    }
    if draft.title.trim().is_empty() {
        return Err(ValidationError::new("title", "A title is required to publish"));
    }
    if draft.slug.is_empty() || slugify(&draft.slug) != draft.slug {
        return Err(ValidationError::new(
            "slug",
            "Slug may only contain lowercase letters, digits and hyphens",
        ));
    }
    let in_future = draft.publish_at.is_some_and(|at| at > now);
    if draft.status == PostStatus::Scheduled || in_future {
        if draft.publish_at.is_none() {
            return Err(ValidationError::new(
                "publishAt",
                "Scheduled posts need a publish date",
            ));
        }
        return Ok(PostStatus::Scheduled);
    }
    Ok(PostStatus::Published)
}

/// Perform the remote write described by `ticket`.
pub async fn run_remote_save(
    store: &impl ContentStore,
    ticket: &SaveTicket,
) -> ApiResult<RemoteReceipt> {
    match &ticket.target {
        RemoteTarget::Create => {
            let res = store.create_post(&ticket.payload).await?;
            Ok(RemoteReceipt {
                id: res.id,
                slug: res.slug,
            })
        }
        RemoteTarget::Update(id) => {
            store.update_post(id, &ticket.payload).await?;
            Ok(RemoteReceipt {
                id: Some(id.clone()),
                slug: ticket.payload.slug.clone(),
            })
        }
    }
}
