// ViewerCore: the viewport controller. Owns the shared transform record and
// derives it from input commands, load results, and resize events. The core
// never touches widgets; it returns effects the overlay executes (submit a
// load, fire a callback, sync the rendered layer).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{Action, ImageSource, ViewerConfig};

use super::lifecycle::{Effect as LifecycleEffect, Lifecycle, Phase};
use super::loader::{LoadReply, LoadRequest};
use super::router::{self, KeyCommand, PinchTracker, ZoomRequest};
use super::state::{StatePatch, Transition, ViewportState};
use super::transform::{self, ContainerSize, ScaleLimits};

/// Side effects the overlay must run after a core call.
#[derive(Debug)]
pub enum CoreEffect {
    /// Hand the request to the load worker.
    RequestLoad(LoadRequest),
    AcquireScrollLock,
    ReleaseScrollLock,
    /// Invoke the consumer's close callback.
    NotifyClose,
    /// Invoke the consumer's change callback.
    NotifyChange { image: ImageSource, index: i32 },
    /// Open the download URL of the active image.
    OpenDownload { url: String, new_window: bool },
    /// The transform record changed; sync the rendered layer.
    Render,
}

pub struct ViewerCore {
    config: ViewerConfig,
    state: ViewportState,
    container: ContainerSize,
    /// Most recently requested load index; the stale-discard gate.
    current_load_index: i32,
    load_generation: u64,
    /// Shared with the worker so stale decodes can bail early.
    generation: Arc<AtomicU64>,
    pinch: PinchTracker,
    lifecycle: Lifecycle,
    /// Consumer-requested open state; `state.visible` trails it through
    /// the exit transition.
    target_visible: bool,
}

impl ViewerCore {
    pub fn new(config: ViewerConfig, container: ContainerSize) -> Self {
        let state = ViewportState::initial(config.active_index, config.default_scale);
        let lifecycle = Lifecycle::new(config.custom_container);
        Self {
            state,
            container,
            current_load_index: config.active_index,
            load_generation: 0,
            generation: Arc::new(AtomicU64::new(0)),
            pinch: PinchTracker::new(),
            lifecycle,
            config,
            target_visible: false,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Generation cell shared with the load worker.
    pub fn generation_cell(&self) -> Arc<AtomicU64> {
        self.generation.clone()
    }

    pub fn active_image(&self) -> ImageSource {
        self.config.image_at(self.state.active_index)
    }

    fn limits(&self) -> ScaleLimits {
        ScaleLimits {
            min_scale: self.config.min_scale,
            max_scale: self.config.max_scale,
            no_limit_initialization_size: self.config.no_limit_initialization_size,
        }
    }

    fn apply(&mut self, transition: Transition) {
        self.state = transition.apply(&self.state);
    }

    fn lifecycle_effects(&mut self, effects: Vec<LifecycleEffect>, out: &mut Vec<CoreEffect>) {
        for effect in effects {
            match effect {
                LifecycleEffect::AcquireScrollLock => out.push(CoreEffect::AcquireScrollLock),
                LifecycleEffect::ReleaseScrollLock => out.push(CoreEffect::ReleaseScrollLock),
                LifecycleEffect::ResetTransform => {
                    self.apply(Transition::Clear {
                        default_scale: self.config.default_scale,
                    });
                }
            }
        }
    }

    /// Consumer-facing open/close. Opening starts a load of the active
    /// index; closing resets the transform and lets the exit transition
    /// finish before the rendered flag drops.
    pub fn set_visible(&mut self, visible: bool) -> Vec<CoreEffect> {
        let mut out = Vec::new();
        if visible == self.target_visible {
            return out;
        }
        self.target_visible = visible;
        if visible {
            let effects = self.lifecycle.set_visible(true);
            self.lifecycle_effects(effects, &mut out);
            self.apply(Transition::SetVisible(true));
            self.apply(Transition::Update(StatePatch {
                visible_start: Some(true),
                transition_end: Some(false),
                ..Default::default()
            }));
            self.apply(Transition::SetActiveIndex(self.state.active_index));
            out.extend(self.begin_load(false));
        } else {
            let effects = self.lifecycle.set_visible(false);
            self.lifecycle_effects(effects, &mut out);
            self.apply(Transition::Update(StatePatch {
                transition_end: Some(false),
                ..Default::default()
            }));
            out.push(CoreEffect::Render);
        }
        out
    }

    /// Transition-end signal from the rendered layer. A close completes
    /// only if the target flag is still false.
    pub fn transition_finished(&mut self) -> Vec<CoreEffect> {
        let mut out = Vec::new();
        self.apply(Transition::Update(StatePatch {
            transition_end: Some(true),
            ..Default::default()
        }));
        self.lifecycle.transition_finished(self.target_visible);
        if !self.target_visible && self.state.visible {
            self.apply(Transition::SetVisible(false));
            self.apply(Transition::Update(StatePatch {
                visible_start: Some(false),
                ..Default::default()
            }));
            out.push(CoreEffect::Render);
        }
        out
    }

    /// Teardown; pending resolutions must never mutate state after this.
    pub fn dispose(&mut self) -> Vec<CoreEffect> {
        let mut out = Vec::new();
        let effects = self.lifecycle.dispose();
        self.lifecycle_effects(effects, &mut out);
        // Orphan any in-flight work.
        self.load_generation = self.load_generation.wrapping_add(1);
        self.generation.store(self.load_generation, Ordering::Release);
        self.current_load_index = -1;
        out
    }

    /// Consumer updated the image sequence; reload the active entry if open.
    pub fn set_images(&mut self, images: Vec<ImageSource>) -> Vec<CoreEffect> {
        self.config.images = images;
        if self.target_visible {
            self.apply(Transition::SetActiveIndex(self.state.active_index));
            self.begin_load(false)
        } else {
            Vec::new()
        }
    }

    /// Consumer moved the active index directly (not via navigation).
    pub fn set_active_index(&mut self, index: i32) -> Vec<CoreEffect> {
        self.apply(Transition::SetActiveIndex(index));
        if self.target_visible {
            self.begin_load(false)
        } else {
            Vec::new()
        }
    }

    /// Navigate to `new_index`, clamping or wrapping per configuration.
    pub fn change_index(&mut self, new_index: i32) -> Vec<CoreEffect> {
        let resolved = match router::resolve_index(
            new_index,
            self.state.active_index,
            self.config.images.len(),
            self.config.loop_navigation,
        ) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let mut out = vec![CoreEffect::NotifyChange {
            image: self.config.image_at(resolved),
            index: resolved,
        }];
        self.apply(Transition::SetActiveIndex(resolved));
        out.extend(self.begin_load(false));
        out
    }

    /// Start a load for the current active index. Marks the index as the
    /// only one whose resolution may be applied.
    pub fn begin_load(&mut self, is_reset: bool) -> Vec<CoreEffect> {
        let index = self.state.active_index;
        self.apply(Transition::Update(StatePatch {
            loading: Some(true),
            load_failed: Some(false),
            start_loading: Some(false),
            ..Default::default()
        }));
        self.current_load_index = index;
        self.load_generation = self.load_generation.wrapping_add(1);
        self.generation.store(self.load_generation, Ordering::Release);
        vec![
            CoreEffect::RequestLoad(LoadRequest {
                index,
                src: self.config.image_at(index).src,
                generation: self.load_generation,
                is_reset,
            }),
            CoreEffect::Render,
        ]
    }

    /// Apply a terminal load outcome. Resolutions for any index other than
    /// the most recently requested one are discarded, whatever order they
    /// arrive in.
    pub fn complete_load(&mut self, reply: &LoadReply) -> Vec<CoreEffect> {
        if reply.index != self.current_load_index {
            tracing::debug!(
                index = reply.index,
                current = self.current_load_index,
                "Discarding stale load resolution"
            );
            return Vec::new();
        }
        match &reply.outcome {
            Ok(decoded) => self.apply_load_success(
                decoded.natural_width as f64,
                decoded.natural_height as f64,
                true,
                reply.is_reset,
            ),
            Err(_) => {
                if let Some(fallback) = self.config.default_img.clone() {
                    self.apply(Transition::Update(StatePatch {
                        loading: Some(false),
                        load_failed: Some(true),
                        start_loading: Some(false),
                        ..Default::default()
                    }));
                    let width = fallback.width.unwrap_or(self.container.width * 0.5);
                    let height = fallback.height.unwrap_or(self.container.height * 0.5);
                    self.apply_load_success(width, height, false, reply.is_reset)
                } else {
                    self.apply(Transition::Update(StatePatch {
                        loading: Some(false),
                        load_failed: Some(false),
                        start_loading: Some(false),
                        ..Default::default()
                    }));
                    vec![CoreEffect::Render]
                }
            }
        }
    }

    fn apply_load_success(
        &mut self,
        img_width: f64,
        img_height: f64,
        success: bool,
        is_reset: bool,
    ) -> Vec<CoreEffect> {
        // Display size: per-image override beats the global default beats
        // the natural dimensions.
        let mut real_width = img_width;
        let mut real_height = img_height;
        if let Some(size) = self.config.default_size {
            real_width = size.width;
            real_height = size.height;
        }
        if let Some(size) = self.active_image().default_size {
            real_width = size.width;
            real_height = size.height;
        }
        let (width, height) = transform::fit_display_size(
            real_width,
            real_height,
            self.container,
            self.config.no_limit_initialization_size,
        );
        let (left, top) = transform::centered_position(self.container, width, height);
        let (scale_x, scale_y) = if self.config.no_reset_zoom_after_change && !is_reset {
            (self.state.scale_x, self.state.scale_y)
        } else {
            (self.config.default_scale, self.config.default_scale)
        };
        self.apply(Transition::Update(StatePatch {
            width: Some(width),
            height: Some(height),
            left: Some(left),
            top: Some(top),
            image_width: Some(img_width),
            image_height: Some(img_height),
            loading: Some(false),
            rotate: Some(0),
            scale_x: Some(scale_x),
            scale_y: Some(scale_y),
            load_failed: Some(!success),
            start_loading: Some(false),
            ..Default::default()
        }));
        vec![CoreEffect::Render]
    }

    /// Keyboard entry point. Returns whether the event was consumed.
    pub fn handle_key(&mut self, key: gtk4::gdk::Key, ctrl: bool) -> (bool, Vec<CoreEffect>) {
        let command = match router::key_command(key, ctrl, self.config.disable_keyboard_support) {
            Some(cmd) => cmd,
            None => return (false, Vec::new()),
        };
        let effects = match command {
            KeyCommand::Close => vec![CoreEffect::NotifyClose],
            KeyCommand::Prev => self.change_index(self.state.active_index - 1),
            KeyCommand::Next => self.change_index(self.state.active_index + 1),
            KeyCommand::ZoomIn => self.zoom_center(1.0),
            KeyCommand::ZoomOut => self.zoom_center(-1.0),
            KeyCommand::RotateLeft => self.rotate(false),
            KeyCommand::RotateRight => self.rotate(true),
            KeyCommand::Reload => self.begin_load(true),
        };
        (true, effects)
    }

    /// Wheel entry point; `x`/`y` are container-relative.
    pub fn handle_wheel(&mut self, delta_y: f64, x: f64, y: f64) -> Vec<CoreEffect> {
        match router::wheel_zoom(
            delta_y,
            x,
            y,
            self.config.zoom_speed,
            self.state.loading,
            self.config.disable_mouse_zoom,
        ) {
            Some(req) => self.zoom_request(req),
            None => Vec::new(),
        }
    }

    /// Two-finger gesture start.
    pub fn pinch_begin(&mut self, distance: f64) {
        self.pinch.begin(distance, self.config.disable_pinch_zoom);
    }

    /// Two-finger gesture move; `mid` is the container-relative midpoint.
    pub fn pinch_update(&mut self, distance: f64, mid: (f64, f64)) -> Vec<CoreEffect> {
        let request = self.pinch.update(
            distance,
            mid,
            self.config.pinch_speed,
            self.state.loading,
            self.config.disable_pinch_zoom,
        );
        match request {
            Some(req) => self.zoom_request(req),
            None => Vec::new(),
        }
    }

    pub fn pinch_end(&mut self) {
        self.pinch.end();
    }

    /// Toolbar/nav action dispatch.
    pub fn dispatch(&mut self, action: Action) -> Vec<CoreEffect> {
        match action {
            Action::Prev => self.change_index(self.state.active_index - 1),
            Action::Next => self.change_index(self.state.active_index + 1),
            Action::ZoomIn => self.zoom_center(1.0),
            Action::ZoomOut => self.zoom_center(-1.0),
            Action::RotateLeft => self.rotate(false),
            Action::RotateRight => self.rotate(true),
            Action::Reset => self.begin_load(true),
            Action::FlipX => {
                let patch = transform::flip_horizontal(&self.state);
                self.apply(Transition::Update(patch));
                vec![CoreEffect::Render]
            }
            Action::FlipY => {
                let patch = transform::flip_vertical(&self.state);
                self.apply(Transition::Update(patch));
                vec![CoreEffect::Render]
            }
            Action::Download => self.download(),
        }
    }

    fn download(&self) -> Vec<CoreEffect> {
        match self.active_image().download_url {
            Some(url) if !url.is_empty() => vec![CoreEffect::OpenDownload {
                url,
                new_window: self.config.download_in_new_window,
            }],
            _ => Vec::new(),
        }
    }

    fn zoom_request(&mut self, req: ZoomRequest) -> Vec<CoreEffect> {
        self.zoom_at(req.x, req.y, req.direction, req.step)
    }

    /// Zoom about a container-relative point.
    pub fn zoom_at(
        &mut self,
        x: f64,
        y: f64,
        direction: f64,
        step: f64,
    ) -> Vec<CoreEffect> {
        // Nothing loaded yet and nothing to bootstrap from.
        if self.state.width == 0.0 && self.state.image_width == 0.0 {
            return Vec::new();
        }
        let patch = transform::zoom(
            &self.state,
            x,
            y,
            direction,
            step,
            self.container,
            self.limits(),
        );
        self.apply(Transition::Update(patch));
        vec![CoreEffect::Render]
    }

    /// Zoom about the image's current geometric center.
    pub fn zoom_center(&mut self, direction: f64) -> Vec<CoreEffect> {
        let (x, y) = transform::image_center(&self.state);
        self.zoom_at(x, y, direction, self.config.zoom_speed)
    }

    fn rotate(&mut self, clockwise: bool) -> Vec<CoreEffect> {
        let patch = transform::rotate(&self.state, clockwise);
        self.apply(Transition::Update(patch));
        vec![CoreEffect::Render]
    }

    /// Pan/drag position reported back by the rendered layer. Stored
    /// verbatim; panning outside the viewport is allowed.
    pub fn set_canvas_state(&mut self, width: f64, height: f64, top: f64, left: f64) {
        self.apply(Transition::Update(StatePatch {
            width: Some(width),
            height: Some(height),
            top: Some(top),
            left: Some(left),
            ..Default::default()
        }));
    }

    /// Container was resized: re-center the current box, keep size/scale.
    /// A load that resolved against an unallocated container left a
    /// zero-sized box; size it now that real dimensions exist.
    pub fn handle_resize(&mut self, container: ContainerSize) -> Vec<CoreEffect> {
        self.container = container;
        if !self.target_visible {
            return Vec::new();
        }
        if self.state.width == 0.0 && self.state.image_width > 0.0 && !self.state.loading {
            let success = !self.state.load_failed;
            return self.apply_load_success(
                self.state.image_width,
                self.state.image_height,
                success,
                true,
            );
        }
        let patch = transform::recenter(&self.state, container);
        self.apply(Transition::Update(patch));
        vec![CoreEffect::Render]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackImage, Size, ViewerConfig};
    use crate::viewport::loader::{DecodedImage, ProbeError};
    use std::path::PathBuf;

    const CONTAINER: ContainerSize = ContainerSize {
        width: 1000.0,
        height: 800.0,
    };

    fn images(count: usize) -> Vec<ImageSource> {
        (0..count)
            .map(|i| ImageSource::new(format!("img-{i}.png"), format!("image {i}")))
            .collect()
    }

    fn core_with(count: usize, tweak: impl FnOnce(&mut ViewerConfig)) -> ViewerCore {
        let mut config = ViewerConfig {
            images: images(count),
            ..Default::default()
        };
        tweak(&mut config);
        ViewerCore::new(config, CONTAINER)
    }

    fn success_reply(index: i32, generation: u64, w: u32, h: u32) -> LoadReply {
        LoadReply {
            index,
            generation,
            is_reset: false,
            outcome: Ok(DecodedImage {
                natural_width: w,
                natural_height: h,
                rgba: Vec::new(),
                pix_width: w,
                pix_height: h,
            }),
        }
    }

    fn failure_reply(index: i32, generation: u64) -> LoadReply {
        LoadReply {
            index,
            generation,
            is_reset: false,
            outcome: Err(ProbeError::EmptySource),
        }
    }

    fn requested_index(effects: &[CoreEffect]) -> Option<i32> {
        effects.iter().find_map(|e| match e {
            CoreEffect::RequestLoad(req) => Some(req.index),
            _ => None,
        })
    }

    fn changed_index(effects: &[CoreEffect]) -> Option<i32> {
        effects.iter().find_map(|e| match e {
            CoreEffect::NotifyChange { index, .. } => Some(*index),
            _ => None,
        })
    }

    #[test]
    fn test_open_requests_load_of_active_index() {
        let mut core = core_with(3, |c| c.active_index = 1);
        let effects = core.set_visible(true);
        assert_eq!(requested_index(&effects), Some(1));
        assert!(core.state().loading);
        assert!(core.state().visible);
        assert_eq!(core.phase(), Phase::Open);
    }

    #[test]
    fn test_load_success_fits_and_centers() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        let effects = core.complete_load(&success_reply(0, 1, 4000, 3000));
        assert!(matches!(effects[0], CoreEffect::Render));
        let s = core.state();
        assert!(!s.loading);
        assert!(!s.load_failed);
        assert_eq!(s.image_width, 4000.0);
        assert_eq!(s.image_height, 3000.0);
        assert!(s.width <= CONTAINER.width * 0.8);
        assert_eq!(s.left, (CONTAINER.width - s.width) / 2.0);
        assert_eq!(s.rotate, 0);
        assert_eq!(s.scale_x, 1.0);
    }

    #[test]
    fn test_stale_resolution_discarded_in_any_order() {
        let mut core = core_with(3, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 100, 100));

        // changeIndex(2) then changeIndex(0) before the first load resolves
        let first = core.change_index(2);
        assert_eq!(changed_index(&first), Some(2));
        let second = core.change_index(0);
        assert_eq!(changed_index(&second), Some(0));
        assert_eq!(core.state().active_index, 0);

        // The index-2 resolution lands late and must change nothing visible
        let before = core.state().clone();
        let effects = core.complete_load(&success_reply(2, 2, 999, 999));
        assert!(effects.is_empty());
        assert_eq!(*core.state(), before);

        // The index-0 resolution applies
        core.complete_load(&success_reply(0, 3, 640, 480));
        assert_eq!(core.state().image_width, 640.0);
        assert!(!core.state().loading);
    }

    #[test]
    fn test_change_index_wraps_and_notifies() {
        let mut core = core_with(3, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 100, 100));

        let effects = core.change_index(-1);
        assert_eq!(changed_index(&effects), Some(2));
        assert_eq!(requested_index(&effects), Some(2));

        let effects = core.change_index(3);
        assert_eq!(changed_index(&effects), Some(0));
    }

    #[test]
    fn test_change_index_clamped_without_loop() {
        let mut core = core_with(3, |c| c.loop_navigation = false);
        core.set_visible(true);
        assert!(core.change_index(-1).is_empty());
        assert!(core.change_index(3).is_empty());
        assert_eq!(core.state().active_index, 0);
    }

    #[test]
    fn test_change_index_same_index_is_noop() {
        let mut core = core_with(3, |_| {});
        core.set_visible(true);
        assert!(core.change_index(0).is_empty());
    }

    #[test]
    fn test_load_failure_with_fallback_half_container() {
        let mut core = core_with(1, |c| {
            c.default_img = Some(FallbackImage {
                src: PathBuf::from("x.png"),
                width: None,
                height: None,
            });
        });
        core.set_visible(true);
        core.complete_load(&failure_reply(0, 1));
        let s = core.state();
        assert!(s.load_failed);
        assert!(!s.loading);
        // Fallback dims are half the container, then fit-scaled for display
        let (w, h) = transform::fit_display_size(
            CONTAINER.width * 0.5,
            CONTAINER.height * 0.5,
            CONTAINER,
            false,
        );
        assert_eq!((s.width, s.height), (w, h));
    }

    #[test]
    fn test_load_failure_without_fallback_is_blank() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&failure_reply(0, 1));
        let s = core.state();
        assert!(!s.load_failed);
        assert!(!s.loading);
        assert!(!s.start_loading);
        assert_eq!(s.width, 0.0);
    }

    #[test]
    fn test_default_size_overrides_sizing_not_natural_dims() {
        let mut core = core_with(1, |c| {
            c.default_size = Some(Size {
                width: 100.0,
                height: 50.0,
            });
        });
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 4000, 3000));
        let s = core.state();
        assert_eq!((s.width, s.height), (100.0, 50.0));
        // Natural dimensions still reported for the attribute line
        assert_eq!((s.image_width, s.image_height), (4000.0, 3000.0));
    }

    #[test]
    fn test_per_image_size_beats_global_default() {
        let mut core = core_with(1, |c| {
            c.default_size = Some(Size {
                width: 100.0,
                height: 50.0,
            });
            c.images[0].default_size = Some(Size {
                width: 200.0,
                height: 80.0,
            });
        });
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 4000, 3000));
        assert_eq!(core.state().width, 200.0);
    }

    #[test]
    fn test_no_reset_zoom_preserved_across_change_but_not_reset() {
        let mut core = core_with(2, |c| c.no_reset_zoom_after_change = true);
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        core.zoom_center(1.0);
        let zoomed = core.state().scale_x;
        assert!(zoomed > 1.0);

        core.change_index(1);
        core.complete_load(&success_reply(1, 2, 800, 600));
        assert_eq!(core.state().scale_x, zoomed);

        // Explicit reset restores the default scale
        core.dispatch(Action::Reset);
        let reply = LoadReply {
            is_reset: true,
            ..success_reply(1, 3, 800, 600)
        };
        core.complete_load(&reply);
        assert_eq!(core.state().scale_x, 1.0);
    }

    #[test]
    fn test_wheel_zoom_out_scenario() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        core.handle_wheel(120.0, 500.0, 400.0);
        assert!((core.state().scale_x - 0.95).abs() < 1e-9);
        assert!((core.state().scale_y - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_wheel_ignored_while_loading() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        assert!(core.state().loading);
        assert!(core.handle_wheel(120.0, 500.0, 400.0).is_empty());
    }

    #[test]
    fn test_keyboard_navigation_and_rotation() {
        let mut core = core_with(3, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));

        let (consumed, effects) = core.handle_key(gtk4::gdk::Key::Right, false);
        assert!(consumed);
        assert_eq!(changed_index(&effects), Some(1));

        let (consumed, _) = core.handle_key(gtk4::gdk::Key::Right, true);
        assert!(consumed);
        assert_eq!(core.state().rotate, 90);

        let (consumed, effects) = core.handle_key(gtk4::gdk::Key::x, false);
        assert!(!consumed);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_escape_notifies_close_only() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        let (consumed, effects) = core.handle_key(gtk4::gdk::Key::Escape, false);
        assert!(consumed);
        assert!(matches!(effects[..], [CoreEffect::NotifyClose]));
        // The consumer decides; the viewer is still open
        assert!(core.state().visible);
    }

    #[test]
    fn test_close_resets_transform_and_finishes_on_transition_end() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        assert!(core.state().width > 0.0);

        let effects = core.set_visible(false);
        assert!(effects
            .iter()
            .any(|e| matches!(e, CoreEffect::ReleaseScrollLock)));
        assert_eq!(core.state().width, 0.0);
        assert_eq!(core.state().rotate, 0);
        // Rendered flag holds until the exit transition reports back
        assert!(core.state().visible);
        core.transition_finished();
        assert!(!core.state().visible);
        assert_eq!(core.phase(), Phase::Closed);
    }

    #[test]
    fn test_reopen_during_close_transition() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.set_visible(false);
        let effects = core.set_visible(true);
        assert!(effects
            .iter()
            .any(|e| matches!(e, CoreEffect::AcquireScrollLock)));
        // Stale exit transition must not hide the reopened viewer
        core.transition_finished();
        assert!(core.state().visible);
        assert_eq!(core.phase(), Phase::Open);
    }

    #[test]
    fn test_scroll_lock_skipped_in_custom_container() {
        let mut core = core_with(1, |c| c.custom_container = true);
        let effects = core.set_visible(true);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, CoreEffect::AcquireScrollLock)));
    }

    #[test]
    fn test_download_requires_url() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        assert!(core.dispatch(Action::Download).is_empty());

        let mut core = core_with(1, |c| {
            c.images[0].download_url = Some("https://example.com/a.png".into());
            c.download_in_new_window = true;
        });
        core.set_visible(true);
        let effects = core.dispatch(Action::Download);
        assert!(matches!(
            &effects[..],
            [CoreEffect::OpenDownload { url, new_window: true }] if url == "https://example.com/a.png"
        ));
    }

    #[test]
    fn test_resize_recenters_without_touching_scale() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        core.zoom_center(1.0);
        let (w, h, scale) = {
            let s = core.state();
            (s.width, s.height, s.scale_x)
        };
        core.handle_resize(ContainerSize::new(500.0, 400.0));
        let s = core.state();
        assert_eq!((s.width, s.height, s.scale_x), (w, h, scale));
        assert_eq!(s.left, (500.0 - w) / 2.0);
    }

    #[test]
    fn test_canvas_drag_report_stored_verbatim() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        core.set_canvas_state(400.0, 300.0, -250.0, 1400.0);
        let s = core.state();
        assert_eq!((s.top, s.left), (-250.0, 1400.0));
    }

    #[test]
    fn test_pinch_zoom_through_core() {
        let mut core = core_with(1, |_| {});
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        core.pinch_begin(100.0);
        let effects = core.pinch_update(150.0, (500.0, 400.0));
        assert!(!effects.is_empty());
        // step = 50 * 0.01 = 0.5 zooming in from 1.0
        assert!((core.state().scale_x - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_noop_without_any_image() {
        let mut core = core_with(0, |_| {});
        core.set_visible(true);
        core.complete_load(&failure_reply(0, 1));
        assert!(core.zoom_center(1.0).is_empty());
    }

    #[test]
    fn test_load_resolving_before_allocation_stays_non_negative() {
        // The decode worker can reply before the widget tree is allocated
        let config = ViewerConfig {
            images: images(1),
            ..Default::default()
        };
        let mut core = ViewerCore::new(config, ContainerSize::new(0.0, 0.0));
        core.set_visible(true);
        core.complete_load(&success_reply(0, 1, 800, 600));
        let s = core.state();
        assert_eq!((s.width, s.height), (0.0, 0.0));
        assert!(!s.loading);
        assert_eq!((s.image_width, s.image_height), (800.0, 600.0));

        // The allocation notification repairs the degenerate box
        let effects = core.handle_resize(CONTAINER);
        assert!(matches!(effects[..], [CoreEffect::Render]));
        let s = core.state();
        assert!(s.width > 0.0 && s.height > 0.0);
        assert!(s.width <= CONTAINER.width * 0.8);
        assert_eq!(s.left, (CONTAINER.width - s.width) / 2.0);
    }

    #[test]
    fn test_dispose_orphans_pending_loads() {
        let mut core = core_with(2, |_| {});
        core.set_visible(true);
        core.dispose();
        let before = core.state().clone();
        assert!(core.complete_load(&success_reply(0, 1, 800, 600)).is_empty());
        assert_eq!(*core.state(), before);
    }
}
