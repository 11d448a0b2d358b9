//! Autoscroll controller for drag-reorganization
//!
//! While a drag is in flight the list scrolls itself when the dragged
//! card sits near the scroll container's top or bottom edge. Velocity
//! magnitude ramps linearly from a minimum (at the threshold distance)
//! to a maximum (edge distance zero), negative toward the top and
//! positive toward the bottom. The frontend owns the frame loop; the
//! controller answers "what velocity" and integrates one clamped step
//! at a time, telling the loop when to stop rescheduling.

/// Vertical extent of a box along the scroll axis, in px
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSpan {
    pub top: f64,
    pub bottom: f64,
}

impl EdgeSpan {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }
}

/// Tuning for the edge bands and the frame integration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoscrollParams {
    /// Distance from a container edge that arms scrolling, in px
    pub edge_threshold: f64,
    /// Magnitude at the threshold distance, in px/s
    pub min_velocity: f64,
    /// Magnitude when the edge distance reaches zero, in px/s
    pub max_velocity: f64,
    /// Magnitudes below this stop the frame loop, in px/s
    pub stop_epsilon: f64,
}

impl Default for AutoscrollParams {
    fn default() -> Self {
        Self {
            edge_threshold: 64.0,
            min_velocity: 60.0,
            max_velocity: 720.0,
            stop_epsilon: 1.0,
        }
    }
}

impl AutoscrollParams {
    /// Magnitude for an edge gap, ramping min → max as the gap closes.
    /// Gaps past the edge (negative) saturate at max.
    fn magnitude(&self, gap: f64) -> f64 {
        let closeness = (1.0 - gap / self.edge_threshold).clamp(0.0, 1.0);
        self.min_velocity + (self.max_velocity - self.min_velocity) * closeness
    }
}

/// Signed velocity for a dragged box within a scroll container.
///
/// Negative scrolls up, positive scrolls down, zero outside both edge
/// bands. When both edges sit inside their bands (short containers),
/// the closer edge wins.
pub fn drag_velocity(drag: &EdgeSpan, container: &EdgeSpan, params: &AutoscrollParams) -> f64 {
    let top_gap = drag.top - container.top;
    let bottom_gap = container.bottom - drag.bottom;

    let top_armed = top_gap < params.edge_threshold;
    let bottom_armed = bottom_gap < params.edge_threshold;

    if top_armed && (!bottom_armed || top_gap <= bottom_gap) {
        -params.magnitude(top_gap)
    } else if bottom_armed {
        params.magnitude(bottom_gap)
    } else {
        0.0
    }
}

/// Integrates drag velocity into a clamped scroll position
#[derive(Debug, Clone)]
pub struct Autoscroller {
    params: AutoscrollParams,
    scroll_top: f64,
}

impl Autoscroller {
    /// Controller at scroll position 0 with the given tuning
    pub fn new(params: AutoscrollParams) -> Self {
        Self {
            params,
            scroll_top: 0.0,
        }
    }

    /// Current scroll position
    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Adopt a position changed outside the controller
    pub fn set_scroll_top(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top.max(0.0);
    }

    /// Velocity for the current drag geometry
    pub fn velocity(&self, drag: &EdgeSpan, container: &EdgeSpan) -> f64 {
        drag_velocity(drag, container, &self.params)
    }

    /// One frame of integration: `scroll_top += velocity * dt`, clamped
    /// into `[0, scroll_height - client_height]`. Returns false when the
    /// magnitude is under the stop epsilon and the loop should end
    /// instead of rescheduling.
    pub fn step(&mut self, velocity: f64, dt: f64, scroll_height: f64, client_height: f64) -> bool {
        if velocity.abs() < self.params.stop_epsilon {
            return false;
        }
        let max = (scroll_height - client_height).max(0.0);
        self.scroll_top = (self.scroll_top + velocity * dt).clamp(0.0, max);
        true
    }
}

impl Default for Autoscroller {
    fn default() -> Self {
        Self::new(AutoscrollParams::default())
    }
}
