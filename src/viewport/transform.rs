// Transform engine: pure functions over ViewportState plus container
// dimensions. No I/O, no widget access; the overlay applies the returned
// patches and syncs them to the picture widget.

use super::state::{StatePatch, ViewportState};

/// Reserved band at the bottom of the container, excluded from fit and
/// centering math. Holds the footer (toolbar/nav/description).
pub const FOOTER_HEIGHT: f64 = 84.0;

/// Container dimensions the viewer renders within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Sizing limits the transform engine operates under.
#[derive(Debug, Clone, Copy)]
pub struct ScaleLimits {
    pub min_scale: f64,
    pub max_scale: Option<f64>,
    pub no_limit_initialization_size: bool,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: None,
            no_limit_initialization_size: false,
        }
    }
}

/// Fit `(img_w, img_h)` within 80% of the container width and 80% of the
/// container height above the footer band, preserving aspect ratio.
/// Width-first, then height clamp with width recomputed. In no-limit mode
/// the natural size passes through unchanged. The bounds floor at zero so
/// an unallocated container (or one shorter than the footer band) degrades
/// to a zero-sized box instead of a negative one.
pub fn fit_display_size(
    img_w: f64,
    img_h: f64,
    container: ContainerSize,
    no_limit: bool,
) -> (f64, f64) {
    let max_width = (container.width * 0.8).max(0.0);
    let max_height = ((container.height - FOOTER_HEIGHT) * 0.8).max(0.0);
    let mut width = max_width.min(img_w);
    let mut height = (width / img_w) * img_h;
    if height > max_height {
        height = max_height;
        width = (height / img_h) * img_w;
    }
    if no_limit {
        width = img_w;
        height = img_h;
    }
    (width, height)
}

/// Position centering a `w` x `h` box in the container above the footer.
pub fn centered_position(container: ContainerSize, w: f64, h: f64) -> (f64, f64) {
    let left = (container.width - w) / 2.0;
    let top = (container.height - h - FOOTER_HEIGHT) / 2.0;
    (left, top)
}

/// Geometric center of the currently rendered box.
pub fn image_center(state: &ViewportState) -> (f64, f64) {
    (
        state.left + state.width / 2.0,
        state.top + state.height / 2.0,
    )
}

fn axis_direction(scale: f64) -> f64 {
    if scale >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Zoom about `(target_x, target_y)` in container coordinates.
///
/// `direction` is +1 (in) or -1 (out), `step` the fractional scale change.
/// When the box has no size yet (no load applied) this bootstraps: fit the
/// natural dimensions, center, and set both scales to 1. Otherwise scale
/// multiplicatively per axis with independent magnitude clamping, and shift
/// the position so the target point stays anchored. Note the cross-axis
/// signs: `top` moves with the X flip direction and `left` with the Y one —
/// long-standing behavior, keep the pairing as is.
pub fn zoom(
    state: &ViewportState,
    target_x: f64,
    target_y: f64,
    direction: f64,
    step: f64,
    container: ContainerSize,
    limits: ScaleLimits,
) -> StatePatch {
    let (center_x, center_y) = image_center(state);
    let diff_x = target_x - center_x;
    let diff_y = target_y - center_y;

    let mut patch = StatePatch {
        loading: Some(false),
        ..Default::default()
    };

    if state.width == 0.0 {
        let (img_w, img_h) = fit_display_size(
            state.image_width,
            state.image_height,
            container,
            limits.no_limit_initialization_size,
        );
        let (left, top) = centered_position(container, img_w, img_h);
        patch.left = Some(left);
        patch.top = Some(top);
        patch.width = Some(state.width + img_w);
        patch.height = Some(state.height + img_h);
        patch.scale_x = Some(1.0);
        patch.scale_y = Some(1.0);
        return patch;
    }

    let direct_x = axis_direction(state.scale_x);
    let direct_y = axis_direction(state.scale_y);
    let mut scale_x = state.scale_x * (1.0 + step * direction * direct_x);
    let mut scale_y = state.scale_y * (1.0 + step * direction * direct_y);
    if let Some(max_scale) = limits.max_scale {
        if scale_x.abs() > max_scale {
            scale_x = max_scale * direct_x;
        }
        if scale_y.abs() > max_scale {
            scale_y = max_scale * direct_y;
        }
    }
    if scale_x.abs() < limits.min_scale {
        scale_x = limits.min_scale * direct_x;
    }
    if scale_y.abs() < limits.min_scale {
        scale_y = limits.min_scale * direct_y;
    }

    patch.scale_x = Some(scale_x);
    patch.scale_y = Some(scale_y);
    patch.top = Some(state.top + -direction * diff_y * step * direct_x);
    patch.left = Some(state.left + -direction * diff_x * step * direct_y);
    patch.width = Some(state.width);
    patch.height = Some(state.height);
    patch
}

/// Rotate 90 degrees; accumulation is unbounded in both directions.
pub fn rotate(state: &ViewportState, clockwise: bool) -> StatePatch {
    StatePatch {
        rotate: Some(state.rotate + if clockwise { 90 } else { -90 }),
        ..Default::default()
    }
}

/// Force the horizontal scale sign negative. Not a toggle; repeated calls
/// keep the image flipped.
pub fn flip_horizontal(state: &ViewportState) -> StatePatch {
    StatePatch {
        scale_x: Some(-state.scale_x.abs()),
        ..Default::default()
    }
}

/// Force the vertical scale sign negative. Not a toggle.
pub fn flip_vertical(state: &ViewportState) -> StatePatch {
    StatePatch {
        scale_y: Some(-state.scale_y.abs()),
        ..Default::default()
    }
}

/// Re-center the current (possibly zoomed) box in a resized container.
/// Width/height/scale are untouched.
pub fn recenter(state: &ViewportState, container: ContainerSize) -> StatePatch {
    let (left, top) = centered_position(container, state.width, state.height);
    StatePatch {
        left: Some(left),
        top: Some(top),
        ..Default::default()
    }
}
