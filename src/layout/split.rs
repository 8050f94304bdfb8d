use serde::{Deserialize, Serialize};

pub const MIN_RATIO: f64 = 20.0;
pub const MAX_RATIO: f64 = 80.0;
const DEFAULT_RATIO: f64 = 50.0;

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ViewMode {
    Editor,
    #[default]
    Split,
    Preview,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitLayout {
    /// Width of the editor pane, as a percentage of the viewport.
    pub ratio_percent: f64,
    pub dragging: bool,
}

/// Two-pane layout state. The ratio never leaves `[MIN_RATIO, MAX_RATIO]` so both
/// panes keep a usable width.
#[derive(Clone, Debug)]
pub struct SplitViewController {
    layout: SplitLayout,
    mode: ViewMode,
}

impl Default for SplitViewController {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitViewController {
    pub fn new() -> Self {
        Self {
            layout: SplitLayout {
                ratio_percent: DEFAULT_RATIO,
                dragging: false,
            },
            mode: ViewMode::Split,
        }
    }

    pub fn layout(&self) -> SplitLayout {
        self.layout
    }

    pub fn ratio(&self) -> f64 {
        self.layout.ratio_percent
    }

    pub fn is_dragging(&self) -> bool {
        self.layout.dragging
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    /// Whether the editor and the preview are both on screen.
    pub fn both_panes_visible(&self) -> bool {
        self.mode == ViewMode::Split
    }

    /// Apply `percent`, clamped into the allowed band. Non-finite input is ignored.
    /// Returns the stored ratio.
    pub fn set_ratio(&mut self, percent: f64) -> f64 {
        if !percent.is_finite() {
            return self.layout.ratio_percent;
        }
        let clamped = percent.clamp(MIN_RATIO, MAX_RATIO);
        if clamped != percent {
            tracing::trace!(requested = percent, applied = clamped, "split ratio clamped");
        }
        self.layout.ratio_percent = clamped;
        clamped
    }

    pub fn reset_ratio(&mut self) -> f64 {
        self.set_ratio(DEFAULT_RATIO)
    }

    pub fn begin_drag(&mut self) {
        self.layout.dragging = true;
    }

    /// Track the pointer while a drag is active. Outside a drag this does nothing.
    pub fn pointer_move(&mut self, pointer_x: f64, viewport_width: f64) -> Option<f64> {
        if !self.layout.dragging || viewport_width.is_nan() || viewport_width <= 0.0 {
            return None;
        }
        Some(self.set_ratio(100.0 * pointer_x / viewport_width))
    }

    pub fn end_drag(&mut self) {
        self.layout.dragging = false;
    }

    pub fn pointer_cancel(&mut self) {
        self.end_drag();
    }
}
