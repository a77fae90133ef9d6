// Input router: translates keyboard, wheel, and two-finger touch input into
// viewer commands. Stateless apart from the pinch distance sample; feature
// flags are applied here so the overlay wiring stays mechanical.

use gtk4::gdk::Key;

/// Zoom request in container coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRequest {
    pub x: f64,
    pub y: f64,
    /// +1 zooms in, -1 zooms out.
    pub direction: f64,
    pub step: f64,
}

/// Command produced by a recognized key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Close,
    Prev,
    Next,
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
    /// Ctrl+1: reload the current image with a full transform reset.
    Reload,
}

/// Map a key press to a command. Returns None for unrecognized keys (and
/// for everything while keyboard support is disabled) so the event keeps
/// propagating; Some means the caller must consume the event.
pub fn key_command(key: Key, ctrl: bool, disable_keyboard: bool) -> Option<KeyCommand> {
    if disable_keyboard {
        return None;
    }
    match key {
        Key::Escape => Some(KeyCommand::Close),
        Key::Left => Some(if ctrl {
            KeyCommand::RotateLeft
        } else {
            KeyCommand::Prev
        }),
        Key::Right => Some(if ctrl {
            KeyCommand::RotateRight
        } else {
            KeyCommand::Next
        }),
        Key::Up => Some(KeyCommand::ZoomIn),
        Key::Down => Some(KeyCommand::ZoomOut),
        Key::_1 | Key::KP_1 if ctrl => Some(KeyCommand::Reload),
        _ => None,
    }
}

/// Map a wheel event to a zoom request. `x`/`y` must already be
/// container-relative. Positive `delta_y` zooms out; zero is a no-op, as is
/// anything while a load is in flight or mouse zoom is disabled.
pub fn wheel_zoom(
    delta_y: f64,
    x: f64,
    y: f64,
    zoom_speed: f64,
    loading: bool,
    disabled: bool,
) -> Option<ZoomRequest> {
    if disabled || loading {
        return None;
    }
    if delta_y == 0.0 {
        return None;
    }
    let direction = if delta_y > 0.0 { -1.0 } else { 1.0 };
    Some(ZoomRequest {
        x,
        y,
        direction,
        step: zoom_speed,
    })
}

/// Two-finger pinch state. The distance sample re-bases on every move event,
/// so zoom direction always compares against the previous sample rather
/// than the gesture start.
#[derive(Debug, Default)]
pub struct PinchTracker {
    distance: f64,
}

impl PinchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the initial inter-finger distance on a two-finger start.
    pub fn begin(&mut self, distance: f64, disabled: bool) {
        if disabled {
            return;
        }
        self.distance = distance;
    }

    /// Feed a two-finger move. `mid` is the container-relative midpoint of
    /// the touch points. Returns the zoom to apply, if any.
    pub fn update(
        &mut self,
        distance: f64,
        mid: (f64, f64),
        pinch_speed: f64,
        loading: bool,
        disabled: bool,
    ) -> Option<ZoomRequest> {
        if disabled || loading {
            return None;
        }
        if self.distance <= 0.0 {
            return None;
        }
        let previous = self.distance;
        self.distance = distance;
        let step = (distance - previous).abs() * pinch_speed;
        if distance > previous {
            Some(ZoomRequest {
                x: mid.0,
                y: mid.1,
                direction: 1.0,
                step,
            })
        } else if distance < previous {
            Some(ZoomRequest {
                x: mid.0,
                y: mid.1,
                direction: -1.0,
                step,
            })
        } else {
            None
        }
    }

    pub fn end(&mut self) {
        self.distance = 0.0;
    }
}

/// Resolve a navigation target index against the sequence length.
/// Clamping mode (`loop_navigation=false`) rejects out-of-range targets;
/// loop mode wraps. Equality with the current index (checked post-wrap) and
/// an empty sequence are no-ops.
pub fn resolve_index(
    new_index: i32,
    current_index: i32,
    count: usize,
    loop_navigation: bool,
) -> Option<i32> {
    if count == 0 {
        return None;
    }
    let count = count as i32;
    if !loop_navigation && (new_index >= count || new_index < 0) {
        return None;
    }
    let mut resolved = new_index;
    if resolved >= count {
        resolved = 0;
    }
    if resolved < 0 {
        resolved = count - 1;
    }
    if resolved == current_index {
        return None;
    }
    Some(resolved)
}
