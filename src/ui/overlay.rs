// Image viewer overlay widget.
// Wires GTK input controllers and the footer controls to the ViewerCore
// state machine, and syncs the rendered picture from the shared transform
// record. All viewer semantics live in the core; this file is plumbing.

use gdk4::{MemoryFormat, MemoryTexture, Texture};
use gtk4::prelude::*;
use gtk4::subclass::prelude::*;
use gtk4::{
    gio, glib, Align, Box as GtkBox, Button, EventControllerKey, EventControllerMotion,
    EventControllerScroll, EventControllerScrollFlags, Fixed, GestureClick, GestureDrag,
    GestureZoom, Label, Orientation, Overlay, Picture, Widget,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::{Action, ImageSource, ViewerConfig};
use crate::viewport::loader::{DecodedImage, FileProbe, LoadReply, LoadWorker};
use crate::viewport::{ContainerSize, CoreEffect, ScrollLockGuard, ViewerCore};

/// Duration of the enter/exit fade, after which the core gets the
/// transition-end signal.
const TRANSITION_MS: u64 = 300;
/// Synthetic two-finger span fed to the pinch tracker; GestureZoom reports
/// a relative factor, not absolute touch positions.
const PINCH_BASELINE: f64 = 200.0;

type CloseCallback = Rc<dyn Fn()>;
type ChangeCallback = Rc<dyn Fn(ImageSource, i32)>;
type MaskClickCallback = Rc<dyn Fn()>;
type ScrollHook = Rc<dyn Fn()>;

mod imp {
    use super::*;

    pub struct ViewerOverlayInner {
        pub core: RefCell<Option<Rc<RefCell<ViewerCore>>>>,
        // Widget tree
        pub overlay: RefCell<Option<Overlay>>,
        pub fixed: RefCell<Option<Fixed>>,
        pub picture: RefCell<Option<Picture>>,
        pub attribute_label: RefCell<Option<Label>>,
        pub description_label: RefCell<Option<Label>>,
        pub nav_box: RefCell<Option<GtkBox>>,
        pub nav_buttons: RefCell<Vec<Button>>,
        // Load pipeline
        pub load_worker: RefCell<Option<LoadWorker>>,
        // Pixels of the applied load, re-oriented on rotate/flip changes
        pub decoded: RefCell<Option<DecodedImage>>,
        pub texture: RefCell<Option<Texture>>,
        pub texture_orientation: Cell<(i32, bool, bool)>,
        // Scroll lock held while open outside a custom container
        pub scroll_guard: RefCell<Option<ScrollLockGuard>>,
        pub scroll_lock_hook: RefCell<Option<ScrollHook>>,
        pub scroll_unlock_hook: RefCell<Option<ScrollHook>>,
        // Consumer callbacks
        pub on_close: RefCell<Option<CloseCallback>>,
        pub on_change: RefCell<Option<ChangeCallback>>,
        pub on_mask_click: RefCell<Option<MaskClickCallback>>,
        // Pending transition-end timer
        pub transition_timer: RefCell<Option<glib::SourceId>>,
        // Drag origin in core coordinates
        pub drag_start_top: Cell<f64>,
        pub drag_start_left: Cell<f64>,
        // Last pointer position, relative to the fixed layer
        pub pointer_x: Cell<f64>,
        pub pointer_y: Cell<f64>,
        // Last synced geometry to avoid redundant relayout work
        pub last_req_w: Cell<i32>,
        pub last_req_h: Cell<i32>,
        pub last_pos_x: Cell<f64>,
        pub last_pos_y: Cell<f64>,
    }

    impl Default for ViewerOverlayInner {
        fn default() -> Self {
            Self {
                core: RefCell::new(None),
                overlay: RefCell::new(None),
                fixed: RefCell::new(None),
                picture: RefCell::new(None),
                attribute_label: RefCell::new(None),
                description_label: RefCell::new(None),
                nav_box: RefCell::new(None),
                nav_buttons: RefCell::new(Vec::new()),
                load_worker: RefCell::new(None),
                decoded: RefCell::new(None),
                texture: RefCell::new(None),
                texture_orientation: Cell::new((0, false, false)),
                scroll_guard: RefCell::new(None),
                scroll_lock_hook: RefCell::new(None),
                scroll_unlock_hook: RefCell::new(None),
                on_close: RefCell::new(None),
                on_change: RefCell::new(None),
                on_mask_click: RefCell::new(None),
                transition_timer: RefCell::new(None),
                drag_start_top: Cell::new(0.0),
                drag_start_left: Cell::new(0.0),
                pointer_x: Cell::new(0.0),
                pointer_y: Cell::new(0.0),
                last_req_w: Cell::new(-1),
                last_req_h: Cell::new(-1),
                last_pos_x: Cell::new(f64::NAN),
                last_pos_y: Cell::new(f64::NAN),
            }
        }
    }

    #[glib::object_subclass]
    impl ObjectSubclass for ViewerOverlayInner {
        const NAME: &'static str = "PictorViewerOverlay";
        type Type = super::ViewerOverlay;
        type ParentType = glib::Object;
    }

    impl ObjectImpl for ViewerOverlayInner {}
}

glib::wrapper! {
    pub struct ViewerOverlay(ObjectSubclass<imp::ViewerOverlayInner>);
}

impl ViewerOverlay {
    pub fn new(config: ViewerConfig) -> Self {
        let obj: Self = glib::Object::builder().build();
        let visible = config.visible;
        let core = ViewerCore::new(config, ContainerSize::new(0.0, 0.0));
        *obj.imp().core.borrow_mut() = Some(Rc::new(RefCell::new(core)));
        obj.setup_channels();
        obj.setup_widgets();
        if visible {
            obj.set_visible(true);
        }
        obj
    }

    fn core(&self) -> Rc<RefCell<ViewerCore>> {
        self.imp()
            .core
            .borrow()
            .as_ref()
            .expect("core initialized in new()")
            .clone()
    }

    /// Set up the background load worker and the main-loop reply drain.
    fn setup_channels(&self) {
        let imp = self.imp();
        let (reply_tx, reply_rx) = async_channel::unbounded::<LoadReply>();
        let generation = self.core().borrow().generation_cell();
        let worker = LoadWorker::spawn(FileProbe, reply_tx, generation);
        *imp.load_worker.borrow_mut() = Some(worker);

        let viewer_weak = self.downgrade();
        glib::spawn_future_local(async move {
            while let Ok(reply) = reply_rx.recv().await {
                if let Some(viewer) = viewer_weak.upgrade() {
                    viewer.handle_load_reply(reply);
                } else {
                    // Overlay was dropped; pending resolutions die with it
                    break;
                }
            }
        });
    }

    fn handle_load_reply(&self, reply: LoadReply) {
        let effects = self.core().borrow_mut().complete_load(&reply);
        if effects.is_empty() {
            return;
        }
        match &reply.outcome {
            Ok(decoded) => {
                *self.imp().decoded.borrow_mut() = Some(decoded.clone());
                self.imp().texture.borrow_mut().take();
            }
            Err(_) => {
                self.imp().decoded.borrow_mut().take();
                let fallback = self
                    .core()
                    .borrow()
                    .config()
                    .default_img
                    .as_ref()
                    .map(|f| f.src.clone());
                let texture = match fallback {
                    Some(src) => match Texture::from_filename(&src) {
                        Ok(tex) => Some(tex),
                        Err(err) => {
                            tracing::warn!(src = ?src, error = %err, "Fallback image failed to load");
                            None
                        }
                    },
                    None => None,
                };
                *self.imp().texture.borrow_mut() = texture;
            }
        }
        self.run_effects(effects);
        self.sync_view();
    }

    fn setup_widgets(&self) {
        let imp = self.imp();
        let core = self.core();

        let overlay = Overlay::new();
        overlay.set_hexpand(true);
        overlay.set_vexpand(true);
        overlay.set_focusable(true);
        overlay.add_css_class("viewer-overlay");
        overlay.set_visible(false);

        let fixed = Fixed::new();
        fixed.set_hexpand(true);
        fixed.set_vexpand(true);

        let picture = Picture::new();
        picture.set_can_shrink(true);
        picture.set_content_fit(gtk4::ContentFit::Fill);
        picture.add_css_class("viewer-image");
        fixed.put(&picture, 0.0, 0.0);
        overlay.set_child(Some(&fixed));

        let (no_close, no_footer, no_toolbar, no_navbar, attribute) = {
            let c = core.borrow();
            let cfg = c.config();
            (
                cfg.no_close,
                cfg.no_footer,
                cfg.no_toolbar,
                cfg.no_navbar,
                cfg.attribute,
            )
        };

        if !no_close {
            let close_btn = Button::with_label("[X]");
            close_btn.set_halign(Align::End);
            close_btn.set_valign(Align::Start);
            close_btn.set_margin_top(8);
            close_btn.set_margin_end(8);
            close_btn.set_tooltip_text(Some("Close viewer (Escape)"));
            let viewer_weak = self.downgrade();
            close_btn.connect_clicked(move |_| {
                if let Some(viewer) = viewer_weak.upgrade() {
                    viewer.notify_close();
                }
            });
            overlay.add_overlay(&close_btn);
        }

        if attribute {
            let attribute_label = Label::new(None);
            attribute_label.set_halign(Align::Start);
            attribute_label.set_valign(Align::Start);
            attribute_label.set_margin_top(8);
            attribute_label.set_margin_start(8);
            attribute_label.add_css_class("muted");
            overlay.add_overlay(&attribute_label);
            *imp.attribute_label.borrow_mut() = Some(attribute_label);
        }

        if !no_footer {
            let footer = GtkBox::new(Orientation::Vertical, 4);
            footer.set_halign(Align::Fill);
            footer.set_valign(Align::End);
            footer.add_css_class("viewer-footer");
            footer.set_margin_bottom(8);

            let description_label = Label::new(None);
            description_label.set_halign(Align::Center);
            description_label.add_css_class("muted");
            description_label.set_ellipsize(gtk4::pango::EllipsizeMode::Middle);
            footer.append(&description_label);
            *imp.description_label.borrow_mut() = Some(description_label);

            if !no_toolbar {
                footer.append(&self.build_toolbar());
            }

            if !no_navbar {
                let nav_box = GtkBox::new(Orientation::Horizontal, 4);
                nav_box.set_halign(Align::Center);
                nav_box.add_css_class("viewer-nav");
                footer.append(&nav_box);
                *imp.nav_box.borrow_mut() = Some(nav_box);
                self.rebuild_nav();
            }

            overlay.add_overlay(&footer);
        }

        *imp.overlay.borrow_mut() = Some(overlay.clone());
        *imp.fixed.borrow_mut() = Some(fixed.clone());
        *imp.picture.borrow_mut() = Some(picture);

        self.setup_gestures(&overlay, &fixed);
        self.setup_keyboard(&overlay);
    }

    fn build_toolbar(&self) -> GtkBox {
        let toolbar = GtkBox::new(Orientation::Horizontal, 8);
        toolbar.set_halign(Align::Center);
        toolbar.add_css_class("viewer-toolbar");

        let actions = self.core().borrow().config().toolbar_actions();
        for action in actions {
            let label = match action {
                Action::Prev => "[<]",
                Action::Next => "[>]",
                Action::ZoomIn => "[+]",
                Action::ZoomOut => "[-]",
                Action::RotateLeft => "[CCW]",
                Action::RotateRight => "[CW]",
                Action::Reset => "[RESET]",
                Action::FlipX => "[FLIP X]",
                Action::FlipY => "[FLIP Y]",
                Action::Download => "[DL]",
            };
            let btn = Button::with_label(label);
            let viewer_weak = self.downgrade();
            btn.connect_clicked(move |_| {
                if let Some(viewer) = viewer_weak.upgrade() {
                    viewer.dispatch(action);
                }
            });
            toolbar.append(&btn);
        }
        toolbar
    }

    /// Rebuild the index strip; one button per image, active one marked.
    fn rebuild_nav(&self) {
        let imp = self.imp();
        let nav_box = imp.nav_box.borrow();
        let Some(nav_box) = nav_box.as_ref() else {
            return;
        };
        for btn in imp.nav_buttons.borrow_mut().drain(..) {
            nav_box.remove(&btn);
        }
        let core = self.core();
        let count = core.borrow().config().images.len();
        let mut buttons = Vec::with_capacity(count);
        for i in 0..count {
            let btn = Button::with_label(&format!("{}", i + 1));
            let viewer_weak = self.downgrade();
            btn.connect_clicked(move |_| {
                if let Some(viewer) = viewer_weak.upgrade() {
                    viewer.change_index(i as i32);
                }
            });
            nav_box.append(&btn);
            buttons.push(btn);
        }
        *imp.nav_buttons.borrow_mut() = buttons;
        self.highlight_nav();
    }

    fn highlight_nav(&self) {
        let active = self.core().borrow().state().active_index;
        for (i, btn) in self.imp().nav_buttons.borrow().iter().enumerate() {
            if i as i32 == active {
                btn.add_css_class("nav-active");
            } else {
                btn.remove_css_class("nav-active");
            }
        }
    }

    fn setup_gestures(&self, overlay: &Overlay, fixed: &Fixed) {
        // Mouse-down on the backdrop outside the image box
        let mask_click = GestureClick::new();
        mask_click.set_button(1);
        let viewer_weak = self.downgrade();
        mask_click.connect_pressed(move |_, _n, x, y| {
            if let Some(viewer) = viewer_weak.upgrade() {
                let imp = viewer.imp();
                let on_image = x >= imp.last_pos_x.get()
                    && x <= imp.last_pos_x.get() + imp.last_req_w.get() as f64
                    && y >= imp.last_pos_y.get()
                    && y <= imp.last_pos_y.get() + imp.last_req_h.get() as f64;
                if !on_image {
                    if let Some(ref callback) = *imp.on_mask_click.borrow() {
                        callback();
                    }
                }
            }
        });
        fixed.add_controller(mask_click);

        // Drag pans the image; the core stores whatever position the drag
        // produces, including positions outside the viewport.
        let drag_enabled = self.core().borrow().config().drag;
        if drag_enabled {
            let drag_gesture = GestureDrag::new();
            drag_gesture.set_button(1);
            let viewer_weak = self.downgrade();
            drag_gesture.connect_drag_begin(move |_, _x, _y| {
                if let Some(viewer) = viewer_weak.upgrade() {
                    let imp = viewer.imp();
                    let core = viewer.core();
                    let state = core.borrow().state().clone();
                    imp.drag_start_top.set(state.top);
                    imp.drag_start_left.set(state.left);
                }
            });
            let viewer_weak = self.downgrade();
            drag_gesture.connect_drag_update(move |_, offset_x, offset_y| {
                if let Some(viewer) = viewer_weak.upgrade() {
                    let imp = viewer.imp();
                    let core = viewer.core();
                    {
                        let mut core = core.borrow_mut();
                        let (width, height) = {
                            let s = core.state();
                            (s.width, s.height)
                        };
                        core.set_canvas_state(
                            width,
                            height,
                            imp.drag_start_top.get() + offset_y,
                            imp.drag_start_left.get() + offset_x,
                        );
                    }
                    viewer.sync_view();
                }
            });
            fixed.add_controller(drag_gesture);
        }

        // Pointer tracking for the wheel zoom anchor. Motion coordinates are
        // relative to the fixed layer, unlike the raw event position, which
        // is surface-relative and offset by window decorations.
        let motion_controller = EventControllerMotion::new();
        let viewer_weak = self.downgrade();
        motion_controller.connect_motion(move |_, x, y| {
            if let Some(viewer) = viewer_weak.upgrade() {
                viewer.imp().pointer_x.set(x);
                viewer.imp().pointer_y.set(y);
            }
        });
        fixed.add_controller(motion_controller);

        // Scroll wheel zoom, anchored at the pointer
        let scroll_controller = EventControllerScroll::new(EventControllerScrollFlags::VERTICAL);
        let viewer_weak = self.downgrade();
        scroll_controller.connect_scroll(move |_, _dx, dy| {
            if let Some(viewer) = viewer_weak.upgrade() {
                let px = viewer.imp().pointer_x.get();
                let py = viewer.imp().pointer_y.get();
                let effects = viewer.core().borrow_mut().handle_wheel(dy, px, py);
                viewer.run_effects(effects);
                viewer.sync_view();
            }
            glib::Propagation::Stop
        });
        fixed.add_controller(scroll_controller);

        // Pinch zoom; the gesture reports a relative factor, so feed the
        // tracker a synthetic span that scales with it.
        let zoom_gesture = GestureZoom::new();
        let viewer_weak = self.downgrade();
        zoom_gesture.connect_begin(move |_, _sequence| {
            if let Some(viewer) = viewer_weak.upgrade() {
                viewer.core().borrow_mut().pinch_begin(PINCH_BASELINE);
            }
        });
        let viewer_weak = self.downgrade();
        zoom_gesture.connect_scale_changed(move |gesture, scale| {
            if let Some(viewer) = viewer_weak.upgrade() {
                let mid = gesture.bounding_box_center().unwrap_or((0.0, 0.0));
                let effects = viewer
                    .core()
                    .borrow_mut()
                    .pinch_update(PINCH_BASELINE * scale, mid);
                viewer.run_effects(effects);
                viewer.sync_view();
            }
        });
        let viewer_weak = self.downgrade();
        zoom_gesture.connect_end(move |_, _sequence| {
            if let Some(viewer) = viewer_weak.upgrade() {
                viewer.core().borrow_mut().pinch_end();
            }
        });
        overlay.add_controller(zoom_gesture);
    }

    fn setup_keyboard(&self, overlay: &Overlay) {
        let key_controller = EventControllerKey::new();
        let viewer_weak = self.downgrade();
        key_controller.connect_key_pressed(move |_, key, _code, modifiers| {
            let Some(viewer) = viewer_weak.upgrade() else {
                return glib::Propagation::Proceed;
            };
            let ctrl = modifiers.contains(gdk4::ModifierType::CONTROL_MASK);
            let (consumed, effects) = viewer.core().borrow_mut().handle_key(key, ctrl);
            if !consumed {
                return glib::Propagation::Proceed;
            }
            viewer.run_effects(effects);
            viewer.sync_view();
            glib::Propagation::Stop
        });
        overlay.add_controller(key_controller);
    }

    /// Execute the effects the core asked for.
    fn run_effects(&self, effects: Vec<CoreEffect>) {
        for effect in effects {
            match effect {
                CoreEffect::RequestLoad(request) => {
                    tracing::debug!(index = request.index, src = ?request.src, "Requesting image load");
                    if let Some(worker) = self.imp().load_worker.borrow().as_ref() {
                        worker.submit(request);
                    }
                }
                CoreEffect::AcquireScrollLock => {
                    let lock = self.imp().scroll_lock_hook.borrow().clone();
                    let unlock = self.imp().scroll_unlock_hook.borrow().clone();
                    let guard = ScrollLockGuard::acquire(
                        move || {
                            if let Some(hook) = lock {
                                hook();
                            }
                        },
                        move || {
                            if let Some(hook) = unlock {
                                hook();
                            }
                        },
                    );
                    *self.imp().scroll_guard.borrow_mut() = Some(guard);
                }
                CoreEffect::ReleaseScrollLock => {
                    self.imp().scroll_guard.borrow_mut().take();
                }
                CoreEffect::NotifyClose => self.notify_close(),
                CoreEffect::NotifyChange { image, index } => {
                    self.highlight_nav();
                    if let Some(ref callback) = *self.imp().on_change.borrow() {
                        callback(image, index);
                    }
                }
                CoreEffect::OpenDownload { url, new_window } => {
                    tracing::info!(url = %url, new_window, "Opening download URL");
                    gtk4::UriLauncher::new(&url).launch(
                        None::<&gtk4::Window>,
                        None::<&gio::Cancellable>,
                        |result| {
                            if let Err(err) = result {
                                tracing::warn!(error = %err, "Failed to open download URL");
                            }
                        },
                    );
                }
                CoreEffect::Render => self.sync_view(),
            }
        }
    }

    fn notify_close(&self) {
        if let Some(ref callback) = *self.imp().on_close.borrow() {
            callback();
        }
    }

    /// Consumer-facing open/close, mirroring the `visible` configuration
    /// flag. Closing starts the exit fade; state resets immediately.
    pub fn set_visible(&self, visible: bool) {
        let effects = self.core().borrow_mut().set_visible(visible);
        self.run_effects(effects);
        if visible {
            if let Some(overlay) = self.imp().overlay.borrow().as_ref() {
                overlay.set_visible(true);
                overlay.grab_focus();
            }
            self.update_container_size();
            self.highlight_nav();
        }
        self.schedule_transition_end();
        self.sync_view();
    }

    pub fn is_visible(&self) -> bool {
        self.core().borrow().state().visible
    }

    /// Jump straight to an index (consumer API, bypasses wrap logic).
    pub fn set_active_index(&self, index: i32) {
        let effects = self.core().borrow_mut().set_active_index(index);
        self.run_effects(effects);
        self.highlight_nav();
        self.sync_view();
    }

    /// Replace the image sequence.
    pub fn set_images(&self, images: Vec<ImageSource>) {
        let effects = self.core().borrow_mut().set_images(images);
        self.rebuild_nav();
        self.run_effects(effects);
        self.sync_view();
    }

    /// Navigate with clamp/wrap semantics; used by the nav strip.
    pub fn change_index(&self, index: i32) {
        let effects = self.core().borrow_mut().change_index(index);
        self.run_effects(effects);
        self.sync_view();
    }

    /// Toolbar action entry point.
    pub fn dispatch(&self, action: Action) {
        let effects = self.core().borrow_mut().dispatch(action);
        self.run_effects(effects);
        self.sync_view();
    }

    /// Tell the core the container changed size. Consumers call this from
    /// their window size notifications; it is also invoked on open.
    pub fn notify_resize(&self) {
        self.update_container_size();
        self.sync_view();
    }

    fn update_container_size(&self) {
        let Some(fixed) = self.imp().fixed.borrow().clone() else {
            return;
        };
        let (w, h) = (fixed.width() as f64, fixed.height() as f64);
        if w <= 0.0 || h <= 0.0 {
            // Not allocated yet; try again shortly so the first load does
            // not fit against a zero-sized container.
            self.schedule_allocation_retry();
            return;
        }
        let effects = self
            .core()
            .borrow_mut()
            .handle_resize(ContainerSize::new(w, h));
        self.run_effects(effects);
    }

    fn schedule_allocation_retry(&self) {
        let viewer_weak = self.downgrade();
        let mut attempts = 0u8;
        glib::timeout_add_local(std::time::Duration::from_millis(16), move || {
            attempts = attempts.saturating_add(1);
            let Some(viewer) = viewer_weak.upgrade() else {
                return glib::ControlFlow::Break;
            };
            let allocated = viewer
                .imp()
                .fixed
                .borrow()
                .as_ref()
                .map(|f| f.width() > 0 && f.height() > 0)
                .unwrap_or(false);
            if allocated {
                viewer.notify_resize();
                return glib::ControlFlow::Break;
            }
            if attempts >= 30 {
                glib::ControlFlow::Break
            } else {
                glib::ControlFlow::Continue
            }
        });
    }

    /// Arm the transition-end timer; the rendered layer reports completion
    /// of the enter/exit fade back to the core through it.
    fn schedule_transition_end(&self) {
        if let Some(timer) = self.imp().transition_timer.borrow_mut().take() {
            timer.remove();
        }
        let viewer_weak = self.downgrade();
        let source_id = glib::timeout_add_local(
            std::time::Duration::from_millis(TRANSITION_MS),
            move || {
                if let Some(viewer) = viewer_weak.upgrade() {
                    viewer.imp().transition_timer.borrow_mut().take();
                    let effects = viewer.core().borrow_mut().transition_finished();
                    viewer.run_effects(effects);
                    viewer.sync_view();
                }
                glib::ControlFlow::Break
            },
        );
        *self.imp().transition_timer.borrow_mut() = Some(source_id);
    }

    /// Sync widgets from the shared transform record.
    fn sync_view(&self) {
        let imp = self.imp();
        let core = self.core();
        let state = core.borrow().state().clone();

        if let Some(overlay) = imp.overlay.borrow().as_ref() {
            overlay.set_visible(state.visible);
            overlay.set_opacity(if state.visible_start { 1.0 } else { 0.0 });
        }

        self.refresh_texture(state.rotate, state.scale_x < 0.0, state.scale_y < 0.0);

        let fixed = imp.fixed.borrow();
        let picture = imp.picture.borrow();
        if let (Some(fixed), Some(picture)) = (fixed.as_ref(), picture.as_ref()) {
            picture.set_paintable(imp.texture.borrow().as_ref());

            // Rendered extents: box size scaled by the zoom magnitude,
            // swapped on odd quarter turns, centered on the box center.
            let quarters = (state.rotate / 90).rem_euclid(4);
            let draw_w = state.width * state.scale_x.abs();
            let draw_h = state.height * state.scale_y.abs();
            let (draw_w, draw_h) = if quarters % 2 == 1 {
                (draw_h, draw_w)
            } else {
                (draw_w, draw_h)
            };
            let center_x = state.left + state.width / 2.0;
            let center_y = state.top + state.height / 2.0;
            let pos_x = center_x - draw_w / 2.0;
            let pos_y = center_y - draw_h / 2.0;

            let req_w = draw_w.round().max(0.0) as i32;
            let req_h = draw_h.round().max(0.0) as i32;
            if req_w != imp.last_req_w.get() || req_h != imp.last_req_h.get() {
                picture.set_size_request(req_w, req_h);
                imp.last_req_w.set(req_w);
                imp.last_req_h.set(req_h);
            }
            let last_x = imp.last_pos_x.get();
            let last_y = imp.last_pos_y.get();
            if last_x.is_nan()
                || last_y.is_nan()
                || (pos_x - last_x).abs() > 0.01
                || (pos_y - last_y).abs() > 0.01
            {
                fixed.move_(picture, pos_x, pos_y);
                imp.last_pos_x.set(pos_x);
                imp.last_pos_y.set(pos_y);
            }
        }

        self.update_attribute_line(&state);
    }

    /// Rebuild the displayed texture when rotation quarter or flip state
    /// changed since the last sync.
    fn refresh_texture(&self, rotate: i32, flip_x: bool, flip_y: bool) {
        let imp = self.imp();
        let quarters = (rotate / 90).rem_euclid(4);
        let orientation = (quarters, flip_x, flip_y);
        if imp.texture.borrow().is_some() && imp.texture_orientation.get() == orientation {
            return;
        }
        let decoded = imp.decoded.borrow();
        let Some(decoded) = decoded.as_ref() else {
            return;
        };
        let Some(mut img) = image::RgbaImage::from_raw(
            decoded.pix_width,
            decoded.pix_height,
            decoded.rgba.clone(),
        ) else {
            tracing::warn!(
                width = decoded.pix_width,
                height = decoded.pix_height,
                "Decoded buffer size mismatch"
            );
            return;
        };
        if flip_x {
            img = image::imageops::flip_horizontal(&img);
        }
        if flip_y {
            img = image::imageops::flip_vertical(&img);
        }
        for _ in 0..quarters {
            img = image::imageops::rotate90(&img);
        }
        let (w, h) = (img.width(), img.height());
        *imp.texture.borrow_mut() = Self::create_texture_from_rgba(&img.into_raw(), w, h);
        imp.texture_orientation.set(orientation);
    }

    fn create_texture_from_rgba(data: &[u8], width: u32, height: u32) -> Option<Texture> {
        if width == 0 || height == 0 {
            return None;
        }
        let expected = (width as u64)
            .saturating_mul(height as u64)
            .saturating_mul(4);
        if (data.len() as u64) < expected {
            tracing::warn!(
                "Skipping texture: data too small ({} bytes for {}x{})",
                data.len(),
                width,
                height
            );
            return None;
        }
        let bytes = glib::Bytes::from(data);
        let texture = MemoryTexture::new(
            width as i32,
            height as i32,
            MemoryFormat::R8g8b8a8,
            &bytes,
            (width * 4) as usize,
        );
        Some(texture.upcast())
    }

    fn update_attribute_line(&self, state: &crate::viewport::ViewportState) {
        let imp = self.imp();
        let core = self.core();
        let core = core.borrow();
        let config = core.config();
        let image = core.active_image();

        if let Some(label) = imp.attribute_label.borrow().as_ref() {
            let mut text = image.alt.clone();
            if !config.no_img_dimension && state.image_width > 0.0 {
                text.push_str(&format!(
                    " [{}x{}]",
                    state.image_width as i64, state.image_height as i64
                ));
            }
            if config.show_total && !config.images.is_empty() {
                text.push_str(&format!(
                    "  {} {} {}",
                    state.active_index + 1,
                    config.total_name,
                    config.images.len()
                ));
            }
            if state.loading {
                text.push_str(" (loading)");
            }
            label.set_text(&text);
        }

        if let Some(label) = imp.description_label.borrow().as_ref() {
            label.set_text(image.description.as_deref().unwrap_or(""));
        }
    }

    /// The widget to mount into the consumer's window or container.
    pub fn widget(&self) -> Widget {
        self.imp()
            .overlay
            .borrow()
            .as_ref()
            .expect("widgets built in new()")
            .clone()
            .upcast()
    }

    pub fn connect_close<F: Fn() + 'static>(&self, callback: F) {
        *self.imp().on_close.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn connect_change<F: Fn(ImageSource, i32) + 'static>(&self, callback: F) {
        *self.imp().on_change.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn connect_mask_click<F: Fn() + 'static>(&self, callback: F) {
        *self.imp().on_mask_click.borrow_mut() = Some(Rc::new(callback));
    }

    /// Hooks run on the scroll lock's 0->1 / 1->0 edges; consumers use them
    /// to freeze whatever scrolled surface sits beneath the overlay.
    pub fn connect_scroll_lock<L, U>(&self, lock: L, unlock: U)
    where
        L: Fn() + 'static,
        U: Fn() + 'static,
    {
        *self.imp().scroll_lock_hook.borrow_mut() = Some(Rc::new(lock));
        *self.imp().scroll_unlock_hook.borrow_mut() = Some(Rc::new(unlock));
    }

    /// Teardown: release the scroll lock and orphan in-flight loads.
    pub fn teardown(&self) {
        if let Some(timer) = self.imp().transition_timer.borrow_mut().take() {
            timer.remove();
        }
        let effects = self.core().borrow_mut().dispose();
        self.run_effects(effects);
        self.imp().load_worker.borrow_mut().take();
    }
}
