use super::split::SplitViewController;

/// Echoes within this distance (px) of the position we wrote count as our own scroll.
const ECHO_TOLERANCE_PX: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    Editor,
    Preview,
}

impl Pane {
    pub fn other(self) -> Pane {
        match self {
            Pane::Editor => Pane::Preview,
            Pane::Preview => Pane::Editor,
        }
    }
}

/// The three numbers a scroll container reports.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    fn scrollable(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    /// Scroll progress in `[0, 1]`; `0` when the content fits without scrolling.
    pub fn ratio(&self) -> f64 {
        let range = self.scrollable();
        if range <= 0.0 {
            return 0.0;
        }
        (self.scroll_top / range).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollCommand {
    pub target: Pane,
    pub scroll_top: f64,
}

/// Mirrors scroll progress from the pane the user is driving into the other one.
///
/// Only the active pane is mirrored from; the scroll event our own write causes in
/// the passive pane is recognised and dropped, so the panes never chase each other.
#[derive(Clone, Debug, Default)]
pub struct ScrollSyncController {
    active: Option<Pane>,
    echo: Option<(Pane, f64)>,
}

impl ScrollSyncController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_pane(&self) -> Option<Pane> {
        self.active
    }

    /// Record a user-initiated interaction (wheel, touch, pointer, keys) with `pane`.
    pub fn mark_user_intent(&mut self, pane: Pane) {
        self.active = Some(pane);
        self.echo = None;
    }

    pub fn on_scroll(
        &mut self,
        pane: Pane,
        source: ScrollMetrics,
        mirror: ScrollMetrics,
        layout: &SplitViewController,
    ) -> Option<ScrollCommand> {
        if let Some((echo_pane, echo_top)) = self.echo {
            if echo_pane == pane && (source.scroll_top - echo_top).abs() <= ECHO_TOLERANCE_PX {
                self.echo = None;
                return None;
            }
        }

        match self.active {
            Some(active) if active != pane => return None,
            Some(_) => {}
            None => self.active = Some(pane),
        }

        if !layout.both_panes_visible() {
            return None;
        }

        let scroll_top = source.ratio() * mirror.scrollable();
        let target = pane.other();
        self.echo = Some((target, scroll_top));
        Some(ScrollCommand { target, scroll_top })
    }
}
