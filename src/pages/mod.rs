use crate::api::{ApiClient, ContentStore, ImageUpload};
use crate::editor::{InsertionKind, InsertionRequest, ValidationError};
use crate::layout::{Pane, ScrollMetrics, ViewMode};
use crate::metrics::DraftMetrics;
use crate::models::{CursorRange, DocumentDraft, DraftPatch, DraftSnapshot, Visibility};
use crate::state::{
    run_remote_save, upload_image_request, AutosaveTimer, ComposerSession, SaveMode, SaveState,
    SessionConfig,
};
use crate::storage::{BrowserStorage, DurableStorage, VIEW_MODE_KEY};
use crate::util::{format_saved_ago, now_ms, SystemClock};
use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_dom::helpers::{window_event_listener, WindowListenerHandle};
use leptos_router::hooks::{use_params_map, use_query_map};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use wasm_bindgen::JsCast;

type BrowserSession = ComposerSession<BrowserStorage, SystemClock>;
type Session = StoredValue<BrowserSession, LocalStorage>;

/// Reactive mirror of the session, refreshed after every session call.
#[derive(Clone, Copy)]
struct ComposerSignals {
    draft: RwSignal<Arc<DocumentDraft>>,
    metrics: RwSignal<DraftMetrics>,
    save_state: RwSignal<SaveState>,
    saved_at: RwSignal<Option<i64>>,
    warning: RwSignal<Option<String>>,
    remote_error: RwSignal<Option<String>>,
}

impl ComposerSignals {
    fn new() -> Self {
        Self {
            draft: RwSignal::new(Arc::new(DocumentDraft::default())),
            metrics: RwSignal::new(DraftMetrics::default()),
            save_state: RwSignal::new(SaveState::Clean),
            saved_at: RwSignal::new(None),
            warning: RwSignal::new(None),
            remote_error: RwSignal::new(None),
        }
    }

    fn sync(self, session: Session) {
        session.with_value(|s| {
            let p = s.persistence();
            self.draft.set(s.draft());
            self.metrics.set(s.metrics().clone());
            self.save_state.set(p.state());
            self.saved_at.set(p.last_saved_at());
            self.warning.set(p.last_warning().map(str::to_string));
            self.remote_error.set(p.last_error().map(|e| e.to_string()));
        });
    }
}

fn schedule_autosave(
    session: Session,
    sig: ComposerSignals,
    timer_id: StoredValue<Option<i32>>,
    timer: AutosaveTimer,
) {
    let win = window();
    if let Some(tid) = timer_id.get_value() {
        win.clear_timeout_with_handle(tid);
    }

    let cb = wasm_bindgen::closure::Closure::once_into_js(move || {
        timer_id.set_value(None);
        session.update_value(|s| {
            s.autosave_due(timer.token);
        });
        sig.sync(session);
    });

    let tid = win
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            cb.as_ref().unchecked_ref(),
            timer.delay_ms as i32,
        )
        .ok();
    timer_id.set_value(tid);
}

fn scroll_metrics(el: &web_sys::Element) -> ScrollMetrics {
    ScrollMetrics::new(
        el.scroll_top() as f64,
        el.scroll_height() as f64,
        el.client_height() as f64,
    )
}

async fn read_upload(file: &web_sys::File) -> Result<ImageUpload, String> {
    let buf = wasm_bindgen_futures::JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| format!("{e:?}"))?;
    Ok(ImageUpload {
        file_name: file.name(),
        mime_type: file.type_(),
        bytes: js_sys::Uint8Array::new(&buf).to_vec(),
    })
}

/// (field name, label, multiline) per insertion form.
fn form_fields(kind: InsertionKind) -> &'static [(&'static str, &'static str, bool)] {
    match kind {
        InsertionKind::Link => &[("text", "Text", false), ("url", "URL", false)],
        InsertionKind::Image => &[
            ("alt", "Alt text", false),
            ("url", "Image URL", false),
            ("caption", "Caption", false),
        ],
        InsertionKind::Code => &[
            ("language", "Language", false),
            ("filename", "File name", false),
            ("code", "Code", true),
        ],
        InsertionKind::Diagram => &[("source", "Mermaid source", true)],
        InsertionKind::Embed => &[
            ("type", "Type (youtube, vimeo, codepen, gist, twitter)", false),
            ("url", "URL", false),
        ],
    }
}

fn parse_datetime_local(v: &str) -> Option<i64> {
    if v.trim().is_empty() {
        return None;
    }
    let ms = js_sys::Date::parse(v);
    ms.is_finite().then_some(ms as i64)
}

fn format_datetime_local(ms: Option<i64>) -> String {
    let Some(ms) = ms else {
        return String::new();
    };
    let d = js_sys::Date::new(&wasm_bindgen::JsValue::from_f64(ms as f64));
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}",
        d.get_full_year(),
        d.get_month() + 1,
        d.get_date(),
        d.get_hours(),
        d.get_minutes()
    )
}

#[component]
pub fn ComposerPage() -> impl IntoView {
    let params = use_params_map();
    let query = use_query_map();
    let post_id = params.with_untracked(|p| p.get("id"));
    let discard = query
        .with_untracked(|q| q.get("discard"))
        .is_some_and(|v| v == "1");

    let config = SessionConfig::new(
        post_id
            .clone()
            .unwrap_or_else(|| SessionConfig::NEW_POST.to_string()),
    );
    let session: Session =
        StoredValue::new_local(ComposerSession::new(config, BrowserStorage, SystemClock));
    let sig = ComposerSignals::new();
    let timer_id: StoredValue<Option<i32>> = StoredValue::new(None);

    let recovery: RwSignal<Option<DraftSnapshot>> = RwSignal::new(None);
    let load_error: RwSignal<Option<String>> = RwSignal::new(None);
    let notice: RwSignal<Option<String>> = RwSignal::new(None);
    let started = RwSignal::new(false);

    let ratio = RwSignal::new(session.with_value(|s| s.split().ratio()));
    let dragging = RwSignal::new(false);
    let stored_mode = BrowserStorage
        .get_item(VIEW_MODE_KEY)
        .ok()
        .flatten()
        .and_then(|v| ViewMode::from_str(&v).ok())
        .unwrap_or_default();
    session.update_value(|s| s.split_mut().set_mode(stored_mode));
    let mode = RwSignal::new(stored_mode);

    let dialog: RwSignal<Option<InsertionKind>> = RwSignal::new(None);
    let fields: RwSignal<BTreeMap<String, String>> = RwSignal::new(BTreeMap::new());
    let dialog_error: RwSignal<Option<ValidationError>> = RwSignal::new(None);
    let uploading = RwSignal::new(false);

    let editor_ref: NodeRef<html::Textarea> = NodeRef::new();
    let preview_ref: NodeRef<html::Div> = NodeRef::new();

    let after_edit = move |timer: Option<AutosaveTimer>| {
        if let Some(t) = timer {
            schedule_autosave(session, sig, timer_id, t);
        }
        sig.sync(session);
    };

    let apply = move |patch: DraftPatch| {
        let timer = session.try_update_value(|s| s.update(patch)).flatten();
        after_edit(timer);
    };

    // Recovery check runs before any edit can arm the autosave timer.
    // Inputs stay disabled until then.
    let start_session = move || {
        let offered = session.try_update_value(|s| s.start(discard)).flatten();
        recovery.set(offered);
        started.set(true);
        sig.sync(session);
    };

    match post_id {
        Some(id) => {
            spawn_local(async move {
                let api = ApiClient::load_from_storage();
                match api.fetch_post(&id).await {
                    Ok(post) => session.update_value(|s| s.load_remote(post.into_draft())),
                    Err(e) => load_error.set(Some(e.to_string())),
                }
                start_session();
            });
        }
        None => start_session(),
    }

    let on_restore = move |_: web_sys::MouseEvent| {
        session.update_value(|s| {
            s.accept_recovery();
        });
        recovery.set(None);
        sig.sync(session);
    };

    let on_discard = move |_: web_sys::MouseEvent| {
        let timer = session.try_update_value(|s| s.decline_recovery()).flatten();
        recovery.set(None);
        after_edit(timer);
    };

    // Leaving with unsaved or in-flight changes needs confirmation.
    let _unload_handle = window_event_listener(ev::beforeunload, move |ev: web_sys::BeforeUnloadEvent| {
        if session.with_value(|s| s.should_confirm_unload()) {
            ev.prevent_default();
            ev.set_return_value("You have unsaved changes.");
        }
    });

    let capture_cursor = move || {
        if let Some(el) = editor_ref.get_untracked() {
            let start = el.selection_start().ok().flatten().unwrap_or(0) as usize;
            let end = el.selection_end().ok().flatten().unwrap_or(start as u32) as usize;
            session.update_value(|s| s.capture_cursor(CursorRange::new(start, end)));
        }
    };

    let focus_caret = move |caret: CursorRange| {
        // Defer to next tick so the textarea has the new value.
        let _ = window().set_timeout_with_callback_and_timeout_and_arguments_0(
            wasm_bindgen::closure::Closure::once_into_js(move || {
                if let Some(el) = editor_ref.get_untracked() {
                    let _ = el.focus();
                    let _ = el.set_selection_range(caret.start as u32, caret.end as u32);
                }
            })
            .as_ref()
            .unchecked_ref(),
            0,
        );
    };

    let commit_request = move |req: InsertionRequest| -> Result<(), ValidationError> {
        let Some(outcome) = session.try_update_value(|s| s.insert(&req)) else {
            return Ok(());
        };
        let outcome = outcome?;
        after_edit(outcome.autosave);
        focus_caret(outcome.caret);
        Ok(())
    };

    let open_dialog = move |kind: InsertionKind| {
        capture_cursor();
        fields.set(BTreeMap::new());
        dialog_error.set(None);
        dialog.set(Some(kind));
    };

    let submit_dialog = move |_: web_sys::MouseEvent| {
        let Some(kind) = dialog.get_untracked() else {
            return;
        };
        let result = InsertionRequest::from_fields(kind, &fields.get_untracked())
            .and_then(commit_request);
        match result {
            Ok(()) => dialog.set(None),
            Err(e) => dialog_error.set(Some(e)),
        }
    };

    let on_file = move |ev: web_sys::Event| {
        let Some(input) = ev
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
        else {
            return;
        };
        let Some(file) = input.files().and_then(|f| f.get(0)) else {
            return;
        };
        let alt = fields.with_untracked(|f| f.get("alt").cloned().unwrap_or_default());
        uploading.set(true);
        dialog_error.set(None);

        spawn_local(async move {
            let api = ApiClient::load_from_storage();
            let result = match read_upload(&file).await {
                Ok(upload) => upload_image_request(&api, upload, &alt)
                    .await
                    .map_err(|e| ValidationError::new("file", e.to_string())),
                Err(e) => Err(ValidationError::new("file", e)),
            };
            match result.and_then(commit_request) {
                Ok(()) => dialog.set(None),
                Err(e) => dialog_error.set(Some(e)),
            }
            uploading.set(false);
        });
    };

    let save = move |mode: SaveMode| {
        let Some(begun) = session.try_update_value(|s| s.begin_save(mode)) else {
            return;
        };
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(e) => {
                notice.set(Some(e.to_string()));
                return;
            }
        };
        notice.set(None);
        if let Some(tid) = timer_id.get_value() {
            window().clear_timeout_with_handle(tid);
            timer_id.set_value(None);
        }
        sig.sync(session);

        spawn_local(async move {
            let api = ApiClient::load_from_storage();
            let result = run_remote_save(&api, &ticket).await;
            let timer = session.try_update_value(|s| s.finish_save(result)).flatten();
            after_edit(timer);
        });
    };

    // Drag-resize listeners live only for one gesture.
    let drag_handles: StoredValue<Vec<WindowListenerHandle>, LocalStorage> =
        StoredValue::new_local(Vec::new());

    let end_drag = move || {
        session.update_value(|s| s.split_mut().end_drag());
        dragging.set(false);
        let handles = drag_handles
            .try_update_value(std::mem::take)
            .unwrap_or_default();
        for h in handles {
            h.remove();
        }
    };

    let on_divider_down = move |e: web_sys::PointerEvent| {
        e.prevent_default();
        session.update_value(|s| s.split_mut().begin_drag());
        dragging.set(true);

        let on_move = window_event_listener(ev::pointermove, move |e: web_sys::PointerEvent| {
            let width = window()
                .inner_width()
                .ok()
                .and_then(|w| w.as_f64())
                .unwrap_or(0.0);
            let next = session
                .try_update_value(|s| s.split_mut().pointer_move(e.client_x() as f64, width))
                .flatten();
            if let Some(r) = next {
                ratio.set(r);
            }
        });
        let on_up = window_event_listener(ev::pointerup, move |_| end_drag());
        let on_cancel = window_event_listener(ev::pointercancel, move |_| end_drag());
        drag_handles.update_value(|h| h.extend([on_move, on_up, on_cancel]));
    };

    let on_divider_reset = move |_: web_sys::MouseEvent| {
        if let Some(r) = session.try_update_value(|s| s.split_mut().reset_ratio()) {
            ratio.set(r);
        }
    };

    let set_mode = move |m: ViewMode| {
        session.update_value(|s| s.split_mut().set_mode(m));
        mode.set(m);
        if let Err(e) = BrowserStorage.set_item(VIEW_MODE_KEY, m.as_ref()) {
            tracing::warn!(error = %e, "could not persist view mode");
        }
    };

    let sync_scroll = move |pane: Pane| {
        let (Some(editor), Some(preview)) = (editor_ref.get_untracked(), preview_ref.get_untracked())
        else {
            return;
        };
        let editor: &web_sys::Element = &editor;
        let preview: &web_sys::Element = &preview;
        let (source, mirror) = match pane {
            Pane::Editor => (scroll_metrics(editor), scroll_metrics(preview)),
            Pane::Preview => (scroll_metrics(preview), scroll_metrics(editor)),
        };
        let cmd = session
            .try_update_value(|s| s.on_scroll(pane, source, mirror))
            .flatten();
        if let Some(cmd) = cmd {
            let top = cmd.scroll_top.round() as i32;
            match cmd.target {
                Pane::Editor => editor.set_scroll_top(top),
                Pane::Preview => preview.set_scroll_top(top),
            }
        }
    };
    let intent = move |pane: Pane| session.update_value(|s| s.mark_scroll_intent(pane));

    let add_tag = move |tag: String| {
        let timer = session.try_update_value(|s| s.add_tag(&tag)).flatten();
        after_edit(timer);
    };
    let remove_tag = move |tag: String| {
        let timer = session.try_update_value(|s| s.remove_tag(&tag)).flatten();
        after_edit(timer);
    };
    let set_slug_manual = move |manual: bool| {
        let timer = session.try_update_value(|s| s.set_slug_manual(manual)).flatten();
        after_edit(timer);
    };

    let draft = sig.draft;
    let metrics = sig.metrics;
    let save_state = sig.save_state;
    let busy = move || !started.get() || save_state.get() == SaveState::Saving;
    let loading = move || !started.get();
    let status_label = move || {
        let state = save_state.get();
        let label = session.with_value(|s| s.persistence().status_label());
        match sig.saved_at.get() {
            Some(at) if state == SaveState::Clean => {
                format!("{label} {}", format_saved_ago(at, now_ms()))
            }
            _ => label.to_string(),
        }
    };

    view! {
        <div class="composer flex h-screen flex-col">
            {move || load_error.get().map(|e| view! {
                <div class="composer-alert text-xs text-destructive">{format!("Could not load post: {e}")}</div>
            })}

            {move || recovery.get().map(|snap| view! {
                <div class="composer-recovery flex items-center gap-2 px-3 py-2 text-xs">
                    <span>
                        {format!(
                            "An unsaved draft \"{}\" from {} was found.",
                            snap.draft.title,
                            format_saved_ago(snap.saved_at, now_ms()),
                        )}
                    </span>
                    <button class="btn" on:click=on_restore>"Restore"</button>
                    <button class="btn" on:click=on_discard>"Discard"</button>
                </div>
            })}

            <header class="composer-toolbar flex items-center gap-2 px-3 py-2">
                <button class="btn" disabled=loading on:click=move |_| open_dialog(InsertionKind::Link)>"Link"</button>
                <button class="btn" disabled=loading on:click=move |_| open_dialog(InsertionKind::Image)>"Image"</button>
                <button class="btn" disabled=loading on:click=move |_| open_dialog(InsertionKind::Code)>"Code"</button>
                <button class="btn" disabled=loading on:click=move |_| open_dialog(InsertionKind::Diagram)>"Diagram"</button>
                <button class="btn" disabled=loading on:click=move |_| open_dialog(InsertionKind::Embed)>"Embed"</button>

                <span class="mx-2 h-4 w-px bg-border"></span>

                <button class="btn" class:active=move || mode.get() == ViewMode::Editor on:click=move |_| set_mode(ViewMode::Editor)>"Write"</button>
                <button class="btn" class:active=move || mode.get() == ViewMode::Split on:click=move |_| set_mode(ViewMode::Split)>"Split"</button>
                <button class="btn" class:active=move || mode.get() == ViewMode::Preview on:click=move |_| set_mode(ViewMode::Preview)>"Preview"</button>

                <span class="ml-auto text-xs text-muted-foreground">{status_label}</span>
                <button class="btn" disabled=busy on:click=move |_| save(SaveMode::Draft)>"Save draft"</button>
                <button class="btn btn-primary" disabled=busy on:click=move |_| save(SaveMode::Publish)>"Publish"</button>
            </header>

            {move || notice.get().map(|n| view! { <div class="composer-alert text-xs text-destructive">{n}</div> })}
            {move || sig.remote_error.get().map(|e| view! {
                <div class="composer-alert text-xs text-destructive">{format!("Save failed: {e}. Your draft is still stored on this device.")}</div>
            })}
            {move || sig.warning.get().map(|w| view! {
                <div class="composer-alert text-xs text-muted-foreground">{format!("Local backup unavailable: {w}")}</div>
            })}

            <div class="composer-body flex min-h-0 flex-1">
                <div class="composer-panes flex min-w-0 flex-1" class:select-none=move || dragging.get()>
                    <textarea
                        node_ref=editor_ref
                        class="composer-editor h-full resize-none overflow-auto p-4 font-mono text-sm"
                        prop:disabled=loading
                        class:hidden=move || mode.get() == ViewMode::Preview
                        style:width=move || match mode.get() {
                            ViewMode::Split => format!("{}%", ratio.get()),
                            _ => "100%".to_string(),
                        }
                        placeholder="Write your article…"
                        prop:value=move || draft.with(|d| d.body.clone())
                        on:input=move |ev| apply(DraftPatch::body(event_target_value(&ev)))
                        on:select=move |_| capture_cursor()
                        on:keyup=move |_| capture_cursor()
                        on:click=move |_| capture_cursor()
                        on:blur=move |_| capture_cursor()
                        on:wheel=move |_| intent(Pane::Editor)
                        on:pointerdown=move |_| intent(Pane::Editor)
                        on:keydown=move |_| intent(Pane::Editor)
                        on:scroll=move |_| sync_scroll(Pane::Editor)
                    ></textarea>

                    <div
                        class="composer-divider w-1 cursor-col-resize bg-border"
                        class:hidden=move || mode.get() != ViewMode::Split
                        on:pointerdown=on_divider_down
                        on:dblclick=on_divider_reset
                    ></div>

                    <div
                        node_ref=preview_ref
                        class="composer-preview h-full flex-1 overflow-auto p-4"
                        class:hidden=move || mode.get() == ViewMode::Editor
                        on:wheel=move |_| intent(Pane::Preview)
                        on:pointerdown=move |_| intent(Pane::Preview)
                        on:touchstart=move |_| intent(Pane::Preview)
                        on:scroll=move |_| sync_scroll(Pane::Preview)
                    >
                        <h1 class="text-2xl font-semibold">{move || draft.with(|d| d.title.clone())}</h1>
                        <pre class="whitespace-pre-wrap text-sm">{move || draft.with(|d| d.body.clone())}</pre>
                    </div>
                </div>

                <aside class="composer-sidebar w-80 shrink-0 overflow-auto border-l p-3 text-xs">
                    <fieldset class="contents" prop:disabled=loading>
                        <label class="field">
                            <span>"Title"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.title.clone())
                                on:input=move |ev| apply(DraftPatch::title(event_target_value(&ev)))
                            />
                        </label>

                        <label class="field">
                            <span>"Slug"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.slug.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    slug: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>
                        <label class="field-inline">
                            <input
                                type="checkbox"
                                prop:checked=move || !draft.with(|d| d.slug_manually_edited)
                                on:change=move |ev| set_slug_manual(!event_target_checked(&ev))
                            />
                            <span>"Generate slug from title"</span>
                        </label>

                        <label class="field">
                            <span>"Excerpt"</span>
                            <textarea
                                rows="3"
                                prop:value=move || draft.with(|d| d.excerpt.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    excerpt: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            ></textarea>
                        </label>

                        <label class="field">
                            <span>"Category"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.category_id.clone().unwrap_or_default())
                                on:change=move |ev| {
                                    let v = event_target_value(&ev);
                                    let v = v.trim();
                                    apply(DraftPatch {
                                        category_id: Some((!v.is_empty()).then(|| v.to_string())),
                                        ..Default::default()
                                    })
                                }
                            />
                        </label>

                        <div class="field">
                            <span>"Tags"</span>
                            <div class="flex flex-wrap gap-1">
                                {move || {
                                    draft
                                        .with(|d| d.tags.iter().cloned().collect::<Vec<_>>())
                                        .into_iter()
                                        .map(|tag| {
                                            let t = tag.clone();
                                            view! {
                                                <span class="tag">
                                                    {tag}
                                                    <button class="tag-remove" on:click=move |_| remove_tag(t.clone())>"×"</button>
                                                </span>
                                            }
                                        })
                                        .collect_view()
                                }}
                            </div>
                            <input
                                type="text"
                                placeholder="Add tag and press Enter"
                                on:keydown=move |ev: web_sys::KeyboardEvent| {
                                    if ev.key() != "Enter" {
                                        return;
                                    }
                                    ev.prevent_default();
                                    add_tag(event_target_value(&ev));
                                    if let Some(input) = ev
                                        .target()
                                        .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
                                    {
                                        input.set_value("");
                                    }
                                }
                            />
                        </div>

                        <label class="field">
                            <span>"Cover image URL"</span>
                            <input
                                type="url"
                                prop:value=move || draft.with(|d| d.cover_image_url.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    cover_image_url: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>
                        <label class="field">
                            <span>"Cover image alt text"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.cover_image_alt.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    cover_image_alt: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>

                        <label class="field">
                            <span>"Visibility"</span>
                            <select
                                prop:value=move || draft.with(|d| d.visibility.to_string())
                                on:change=move |ev| {
                                    if let Ok(v) = Visibility::from_str(&event_target_value(&ev)) {
                                        apply(DraftPatch {
                                            visibility: Some(v),
                                            ..Default::default()
                                        });
                                    }
                                }
                            >
                                <option value="public">"Public"</option>
                                <option value="unlisted">"Unlisted"</option>
                                <option value="private">"Private"</option>
                            </select>
                        </label>

                        <label class="field">
                            <span>"Publish at"</span>
                            <input
                                type="datetime-local"
                                prop:value=move || draft.with(|d| format_datetime_local(d.publish_at))
                                on:change=move |ev| apply(DraftPatch {
                                    publish_at: Some(parse_datetime_local(&event_target_value(&ev))),
                                    ..Default::default()
                                })
                            />
                        </label>

                        <h3 class="mt-4 font-medium">"SEO"</h3>
                        <label class="field">
                            <span>"Meta title"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.meta_title.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    meta_title: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>
                        <label class="field">
                            <span>{move || format!("Meta description ({})", draft.with(|d| d.meta_description.chars().count()))}</span>
                            <textarea
                                rows="3"
                                prop:value=move || draft.with(|d| d.meta_description.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    meta_description: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            ></textarea>
                        </label>
                        <label class="field">
                            <span>"Focus keyword"</span>
                            <input
                                type="text"
                                prop:value=move || draft.with(|d| d.focus_keyword.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    focus_keyword: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>
                        <label class="field">
                            <span>"Canonical URL"</span>
                            <input
                                type="url"
                                prop:value=move || draft.with(|d| d.canonical_url.clone())
                                on:input=move |ev| apply(DraftPatch {
                                    canonical_url: Some(event_target_value(&ev)),
                                    ..Default::default()
                                })
                            />
                        </label>

                        <div class="composer-metrics mt-4 flex flex-col gap-1">
                            <div>{move || format!("SEO score: {}/100", metrics.with(|m| m.report.score))}</div>
                            <div>{move || format!("{} words · {} min read", metrics.with(|m| m.word_count), metrics.with(|m| m.reading_time_minutes))}</div>
                            <div>{move || format!("Keyword density: {:.2}%", metrics.with(|m| m.keyword_density))}</div>
                            <ul class="checklist">
                                {move || {
                                    metrics
                                        .with(|m| m.report.checklist.clone())
                                        .into_iter()
                                        .map(|item| view! {
                                            <li class:passed=item.passed>
                                                {if item.passed { "✓ " } else { "○ " }}
                                                {item.label}
                                            </li>
                                        })
                                        .collect_view()
                                }}
                            </ul>
                        </div>
                    </fieldset>
                </aside>
            </div>

            {move || dialog.get().map(|kind| {
                let inputs = form_fields(kind)
                    .iter()
                    .map(|&(name, label, multiline)| {
                        let on_input = move |ev: web_sys::Event| {
                            let v = event_target_value(&ev);
                            fields.update(|f| {
                                f.insert(name.to_string(), v);
                            });
                        };
                        let value = move || fields.with(|f| f.get(name).cloned().unwrap_or_default());
                        let error = move || {
                            dialog_error.with(|e| {
                                e.as_ref()
                                    .filter(|e| e.field == name)
                                    .map(|e| e.message.clone())
                            })
                        };
                        let control = if multiline {
                            view! { <textarea rows="8" class="font-mono" prop:value=value on:input=on_input></textarea> }.into_any()
                        } else {
                            view! { <input type="text" prop:value=value on:input=on_input /> }.into_any()
                        };
                        view! {
                            <label class="field">
                                <span>{label}</span>
                                {control}
                                <span class="field-error text-destructive">{error}</span>
                            </label>
                        }
                    })
                    .collect_view();

                view! {
                    <div class="composer-dialog fixed inset-0 flex items-center justify-center bg-black/40">
                        <div class="w-[28rem] rounded-md bg-background p-4 text-xs">
                            <h3 class="mb-2 font-medium">{format!("Insert {kind}")}</h3>
                            {inputs}
                            {(kind == InsertionKind::Image).then(|| view! {
                                <label class="field">
                                    <span>"…or upload a file"</span>
                                    <input type="file" accept="image/*" disabled=move || uploading.get() on:change=on_file />
                                </label>
                            })}
                            {move || dialog_error.with(|e| {
                                e.as_ref()
                                    .filter(|e| !form_fields(kind).iter().any(|(n, _, _)| *n == e.field))
                                    .map(|e| e.to_string())
                            })}
                            <div class="mt-3 flex justify-end gap-2">
                                <button class="btn" on:click=move |_| dialog.set(None)>"Cancel"</button>
                                <button class="btn btn-primary" disabled=move || uploading.get() on:click=submit_dialog>"Insert"</button>
                            </div>
                        </div>
                    </div>
                }
            })}
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_form_field_is_read_by_from_fields() {
        // Filling every form field must yield a valid request for each kind.
        let samples: BTreeMap<&str, &str> = [
            ("text", "Docs"),
            ("url", "https://example.com/x.png"),
            ("alt", "Alt"),
            ("caption", "Cap"),
            ("language", "rust"),
            ("filename", "lib.rs"),
            ("code", "fn f() {}"),
            ("source", "graph TD; A-->B"),
            ("type", "youtube"),
        ]
        .into_iter()
        .collect();

        for kind in [
            InsertionKind::Link,
            InsertionKind::Image,
            InsertionKind::Code,
            InsertionKind::Diagram,
            InsertionKind::Embed,
        ] {
            let fields: BTreeMap<String, String> = form_fields(kind)
                .iter()
                .map(|(name, _, _)| (name.to_string(), samples[name].to_string()))
                .collect();
            let req = InsertionRequest::from_fields(kind, &fields).expect("valid request");
            assert_eq!(req.kind(), kind);
            assert!(crate::editor::build_fragment(&req).is_ok(), "{kind} should build");
        }
    }
}
