// Shared transform record for the viewer overlay plus its transition set.
// All mutation goes through `Transition::apply`, which returns the next
// snapshot; callers never poke individual fields.

/// Transform and lifecycle state for the currently displayed image.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    /// Target open state requested by the consumer.
    pub visible: bool,
    /// Actually-rendered open state, trailing `visible` through the
    /// enter/exit transition.
    pub visible_start: bool,
    pub transition_end: bool,
    /// Index into the image sequence; -1 when there is nothing to show.
    pub active_index: i32,
    /// Rendered box size in layout pixels.
    pub width: f64,
    pub height: f64,
    /// Box position, container-relative.
    pub top: f64,
    pub left: f64,
    /// Cumulative rotation in degrees, multiples of 90, never normalized.
    pub rotate: i32,
    /// Natural dimensions of the loaded image.
    pub image_width: f64,
    pub image_height: f64,
    /// Signed scale factors; sign encodes flip, magnitude encodes zoom.
    pub scale_x: f64,
    pub scale_y: f64,
    pub loading: bool,
    pub load_failed: bool,
    /// Request flag consumed by the load pipeline.
    pub start_loading: bool,
}

impl ViewportState {
    pub fn initial(active_index: i32, default_scale: f64) -> Self {
        Self {
            visible: false,
            visible_start: false,
            transition_end: false,
            active_index,
            width: 0.0,
            height: 0.0,
            top: 15.0,
            left: 0.0,
            rotate: 0,
            image_width: 0.0,
            image_height: 0.0,
            scale_x: default_scale,
            scale_y: default_scale,
            loading: false,
            load_failed: false,
            start_loading: false,
        }
    }
}

/// Partial update applied over the current snapshot. `None` leaves the
/// field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub top: Option<f64>,
    pub left: Option<f64>,
    pub rotate: Option<i32>,
    pub image_width: Option<f64>,
    pub image_height: Option<f64>,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
    pub loading: Option<bool>,
    pub load_failed: Option<bool>,
    pub start_loading: Option<bool>,
    pub visible_start: Option<bool>,
    pub transition_end: Option<bool>,
}

/// Tagged transition requests over `ViewportState`.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    SetVisible(bool),
    /// Records the new index and raises `start_loading` for the pipeline.
    SetActiveIndex(i32),
    Update(StatePatch),
    /// Close-time reset: size/scale/rotation/position/load flags, but not
    /// visibility. `default_scale` restores the configured starting zoom.
    Clear { default_scale: f64 },
}

impl Transition {
    pub fn apply(self, s: &ViewportState) -> ViewportState {
        let mut next = s.clone();
        match self {
            Transition::SetVisible(visible) => {
                next.visible = visible;
            }
            Transition::SetActiveIndex(index) => {
                next.active_index = index;
                next.start_loading = true;
            }
            Transition::Update(patch) => {
                macro_rules! take {
                    ($field:ident) => {
                        if let Some(v) = patch.$field {
                            next.$field = v;
                        }
                    };
                }
                take!(width);
                take!(height);
                take!(top);
                take!(left);
                take!(rotate);
                take!(image_width);
                take!(image_height);
                take!(scale_x);
                take!(scale_y);
                take!(loading);
                take!(load_failed);
                take!(start_loading);
                take!(visible_start);
                take!(transition_end);
            }
            Transition::Clear { default_scale } => {
                next.width = 0.0;
                next.height = 0.0;
                next.scale_x = default_scale;
                next.scale_y = default_scale;
                next.rotate = 0;
                next.image_width = 0.0;
                next.image_height = 0.0;
                next.load_failed = false;
                next.top = 0.0;
                next.left = 0.0;
                next.loading = false;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_active_index_raises_start_loading() {
        let s = ViewportState::initial(0, 1.0);
        let next = Transition::SetActiveIndex(2).apply(&s);
        assert_eq!(next.active_index, 2);
        assert!(next.start_loading);
    }

    #[test]
    fn test_update_leaves_unset_fields_alone() {
        let mut s = ViewportState::initial(0, 1.0);
        s.width = 640.0;
        s.top = 30.0;
        let next = Transition::Update(StatePatch {
            left: Some(12.0),
            ..Default::default()
        })
        .apply(&s);
        assert_eq!(next.left, 12.0);
        assert_eq!(next.width, 640.0);
        assert_eq!(next.top, 30.0);
    }

    #[test]
    fn test_clear_resets_transform_but_not_visibility() {
        let mut s = ViewportState::initial(1, 2.0);
        s.visible = true;
        s.width = 800.0;
        s.height = 600.0;
        s.scale_x = -3.0;
        s.rotate = 450;
        s.load_failed = true;
        let next = Transition::Clear { default_scale: 2.0 }.apply(&s);
        assert!(next.visible);
        assert_eq!(next.active_index, 1);
        assert_eq!(next.width, 0.0);
        assert_eq!(next.height, 0.0);
        assert_eq!(next.scale_x, 2.0);
        assert_eq!(next.scale_y, 2.0);
        assert_eq!(next.rotate, 0);
        assert!(!next.load_failed);
        assert!(!next.loading);
    }
}
