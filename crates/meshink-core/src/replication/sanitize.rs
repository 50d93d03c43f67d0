//! Post-apply cleanup of attributes untrusted peers must not control.

use crate::shapes::{Shape, DEFAULT_STROKE_WIDTH};

/// Which repairs run on every shape after a remote snapshot is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizePolicy {
    /// Freehand strokes are never filled locally.
    pub strip_freehand_fill: bool,
    /// Keep opacity inside `[0, 1]`.
    pub clamp_opacity: bool,
    /// Replace negative or non-finite stroke widths with the default.
    pub repair_stroke_width: bool,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            strip_freehand_fill: true,
            clamp_opacity: true,
            repair_stroke_width: true,
        }
    }
}

impl SanitizePolicy {
    /// A policy that leaves shapes untouched.
    pub fn none() -> Self {
        Self {
            strip_freehand_fill: false,
            clamp_opacity: false,
            repair_stroke_width: false,
        }
    }

    /// Sanitize one shape in place. Returns true if anything changed.
    pub fn apply(&self, shape: &mut Shape) -> bool {
        let strip_fill = self.strip_freehand_fill && shape.is_freehand();
        let style = shape.style_mut();
        let mut changed = false;

        if strip_fill && style.fill_color.take().is_some() {
            changed = true;
        }

        if self.clamp_opacity {
            let opacity = if style.opacity.is_finite() {
                style.opacity.clamp(0.0, 1.0)
            } else {
                1.0
            };
            if opacity != style.opacity {
                style.opacity = opacity;
                changed = true;
            }
        }

        if self.repair_stroke_width
            && (!style.stroke_width.is_finite() || style.stroke_width < 0.0)
        {
            style.stroke_width = DEFAULT_STROKE_WIDTH;
            changed = true;
        }

        changed
    }
}
