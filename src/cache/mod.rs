pub mod draft_snapshot;

pub use draft_snapshot::{clear_draft_snapshot, load_draft_snapshot, save_draft_snapshot};
