/// Load-more trigger driven by sentinel visibility
///
/// The sentinel sits right below the last row of cards. Each time it
/// becomes visible while the load condition holds, the trigger fires once.

/// Scroll position of the gallery's scrollable area
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollViewport {
    /// Distance scrolled from the top
    pub offset: f32,
    /// Visible height
    pub height: f32,
}

impl ScrollViewport {
    pub fn new(offset: f32, height: f32) -> Self {
        Self { offset, height }
    }

    /// Whether a sentinel starting at `sentinel_top` is within `margin` of the
    /// visible area. Content shorter than the viewport always counts as visible.
    pub fn sees(&self, sentinel_top: f32, margin: f32) -> bool {
        self.offset + self.height + margin >= sentinel_top
    }
}

/// Fires a load request on each rising edge of "sentinel visible and
/// condition true"
#[derive(Debug, Clone, Default)]
pub struct ViewportLoadTrigger {
    was_active: bool,
}

impl ViewportLoadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest visibility and condition.
    ///
    /// Returns `true` exactly when the caller should load.
    pub fn observe(&mut self, visible: bool, condition: bool) -> bool {
        let active = visible && condition;
        let fire = active && !self.was_active;
        self.was_active = active;
        fire
    }

    /// Like `observe`, but runs `load` instead of returning a flag
    pub fn observe_with<T>(&mut self, visible: bool, condition: bool, load: impl FnOnce() -> T) -> Option<T> {
        self.observe(visible, condition).then(load)
    }

    /// Forget the last observation so the next visible one fires again
    pub fn rearm(&mut self) {
        self.was_active = false;
    }
}
