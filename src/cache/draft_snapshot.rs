use crate::models::{DocumentDraft, DraftSnapshot};
use crate::storage::{load_json_from_storage, save_json_to_storage, DurableStorage, PersistenceError};

fn key(session_key: &str) -> String {
    format!("article_composer_draft::{session_key}")
}

pub fn save_draft_snapshot(
    storage: &impl DurableStorage,
    session_key: &str,
    draft: &DocumentDraft,
    saved_at: i64,
) -> Result<DraftSnapshot, PersistenceError> {
    let snap = DraftSnapshot {
        saved_at,
        draft: draft.clone(),
    };
    save_json_to_storage(storage, &key(session_key), &snap)?;
    Ok(snap)
}

pub fn load_draft_snapshot(storage: &impl DurableStorage, session_key: &str) -> Option<DraftSnapshot> {
    if session_key.trim().is_empty() {
        return None;
    }
    load_json_from_storage::<DraftSnapshot>(storage, &key(session_key))
}

pub fn clear_draft_snapshot(
    storage: &impl DurableStorage,
    session_key: &str,
) -> Result<(), PersistenceError> {
    storage.remove_item(&key(session_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostStatus, Visibility};
    use crate::storage::MemoryStorage;

    fn sample_draft() -> DocumentDraft {
        DocumentDraft {
            title: "Zero-cost futures".to_string(),
            body: "# Intro\n\nPolling all the way down.".to_string(),
            excerpt: "How futures compile".to_string(),
            category_id: Some("cat-7".to_string()),
            tags: ["async", "rust"].iter().map(|s| s.to_string()).collect(),
            cover_image_url: "https://img.example/f.png".to_string(),
            cover_image_alt: "A state machine".to_string(),
            visibility: Visibility::Unlisted,
            status: PostStatus::Scheduled,
            publish_at: Some(1_800_000_000_000),
            slug: "custom-slug".to_string(),
            meta_title: "Futures".to_string(),
            meta_description: "All about polling".to_string(),
            focus_keyword: "futures".to_string(),
            canonical_url: "https://blog.example/futures".to_string(),
            slug_manually_edited: true,
        }
    }

    #[test]
    fn test_snapshot_roundtrip_reconstructs_every_field() {
        let storage = MemoryStorage::new();
        let draft = sample_draft();
        save_draft_snapshot(&storage, "new", &draft, 1234).expect("should save");

        let snap = load_draft_snapshot(&storage, "new").expect("should load");
        assert_eq!(snap.saved_at, 1234);
        assert_eq!(snap.draft, draft);
    }

    #[test]
    fn test_snapshot_slots_are_per_session() {
        let storage = MemoryStorage::new();
        save_draft_snapshot(&storage, "post-1", &sample_draft(), 1).expect("should save");
        assert!(load_draft_snapshot(&storage, "post-2").is_none());
        assert!(load_draft_snapshot(&storage, "").is_none());
    }

    #[test]
    fn test_clear_snapshot() {
        let storage = MemoryStorage::new();
        save_draft_snapshot(&storage, "new", &sample_draft(), 1).expect("should save");
        clear_draft_snapshot(&storage, "new").expect("should clear");
        assert!(load_draft_snapshot(&storage, "new").is_none());
    }
}
