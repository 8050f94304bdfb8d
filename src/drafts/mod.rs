mod store;

pub use store::{DraftObserver, DraftStore};
