mod scroll_sync;
mod split;

pub use scroll_sync::{Pane, ScrollCommand, ScrollMetrics, ScrollSyncController};
pub use split::{SplitLayout, SplitViewController, ViewMode, MAX_RATIO, MIN_RATIO};
