// Public configuration surface for the pictor overlay.
// All fields optional with the documented defaults; consumers build a
// ViewerConfig once and hand it to the overlay on construction.

use std::path::PathBuf;
use std::rc::Rc;

/// Explicit display size override, in layout pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// One entry of the image sequence shown by the viewer.
#[derive(Debug, Clone, Default)]
pub struct ImageSource {
    /// Path of the primary image file.
    pub src: PathBuf,
    /// Short label shown in the attribute line.
    pub alt: String,
    /// Optional URL opened by the download action.
    pub download_url: Option<String>,
    /// Optional caption rendered in the footer.
    pub description: Option<String>,
    /// Per-image display size, overrides the global default size.
    pub default_size: Option<Size>,
}

impl ImageSource {
    pub fn new(src: impl Into<PathBuf>, alt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: alt.into(),
            ..Self::default()
        }
    }
}

/// Substitute image shown when the primary one fails to load.
/// Without explicit dimensions the fallback is sized to half the container.
#[derive(Debug, Clone, Default)]
pub struct FallbackImage {
    pub src: PathBuf,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Toolbar action identifiers dispatched by the toolbar collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prev,
    Next,
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
    Reset,
    FlipX,
    FlipY,
    Download,
}

/// Hook rewriting the default tool list before the toolbar renders it.
pub type ToolbarHook = Rc<dyn Fn(Vec<Action>) -> Vec<Action>>;

pub struct ViewerConfig {
    pub visible: bool,
    pub active_index: i32,
    pub images: Vec<ImageSource>,
    /// Requested stacking order of the viewer layer. Informational under
    /// GTK, where overlay children stack in insertion order (last on top);
    /// consumers embedding several layers use it to decide where to insert
    /// the widget.
    pub z_index: i32,
    pub drag: bool,
    pub attribute: bool,
    pub zoomable: bool,
    pub rotatable: bool,
    pub scalable: bool,
    pub changeable: bool,
    pub zoom_speed: f64,
    pub pinch_speed: f64,
    pub min_scale: f64,
    /// None means unbounded zoom-in.
    pub max_scale: Option<f64>,
    pub default_scale: f64,
    pub loop_navigation: bool,
    pub disable_keyboard_support: bool,
    pub disable_mouse_zoom: bool,
    pub disable_pinch_zoom: bool,
    pub no_reset_zoom_after_change: bool,
    pub no_limit_initialization_size: bool,
    pub downloadable: bool,
    pub download_in_new_window: bool,
    pub no_img_dimension: bool,
    pub no_toolbar: bool,
    pub no_navbar: bool,
    pub no_footer: bool,
    pub no_close: bool,
    pub show_total: bool,
    pub total_name: String,
    pub default_img: Option<FallbackImage>,
    pub default_size: Option<Size>,
    /// True when the overlay renders inside a consumer-supplied container
    /// instead of its own top-level layer; suppresses the scroll lock.
    pub custom_container: bool,
    pub custom_toolbar: Option<ToolbarHook>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            visible: false,
            active_index: 0,
            images: Vec::new(),
            z_index: 1000,
            drag: true,
            attribute: true,
            zoomable: true,
            rotatable: true,
            scalable: true,
            changeable: true,
            zoom_speed: 0.05,
            pinch_speed: 0.01,
            min_scale: 0.1,
            max_scale: None,
            default_scale: 1.0,
            loop_navigation: true,
            disable_keyboard_support: false,
            disable_mouse_zoom: false,
            disable_pinch_zoom: false,
            no_reset_zoom_after_change: false,
            no_limit_initialization_size: false,
            downloadable: false,
            download_in_new_window: false,
            no_img_dimension: false,
            no_toolbar: false,
            no_navbar: false,
            no_footer: false,
            no_close: false,
            show_total: true,
            total_name: "of".to_string(),
            default_img: None,
            default_size: None,
            custom_container: false,
            custom_toolbar: None,
        }
    }
}

impl ViewerConfig {
    /// Default tool list, filtered by the feature flags and then passed
    /// through the custom toolbar hook.
    pub fn toolbar_actions(&self) -> Vec<Action> {
        let mut tools = Vec::new();
        if self.zoomable {
            tools.push(Action::ZoomIn);
            tools.push(Action::ZoomOut);
        }
        tools.push(Action::Reset);
        if self.changeable {
            tools.push(Action::Prev);
            tools.push(Action::Next);
        }
        if self.rotatable {
            tools.push(Action::RotateLeft);
            tools.push(Action::RotateRight);
        }
        if self.scalable {
            tools.push(Action::FlipX);
            tools.push(Action::FlipY);
        }
        if self.downloadable {
            tools.push(Action::Download);
        }
        match &self.custom_toolbar {
            Some(hook) => hook(tools),
            None => tools,
        }
    }

    /// Image for `index`, or a blank placeholder when the sequence is empty
    /// or the index is out of range.
    pub fn image_at(&self, index: i32) -> ImageSource {
        if index >= 0 {
            if let Some(img) = self.images.get(index as usize) {
                return img.clone();
            }
        }
        ImageSource::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ViewerConfig::default();
        assert!(!config.visible);
        assert_eq!(config.active_index, 0);
        assert_eq!(config.z_index, 1000);
        assert_eq!(config.zoom_speed, 0.05);
        assert_eq!(config.pinch_speed, 0.01);
        assert_eq!(config.min_scale, 0.1);
        assert!(config.max_scale.is_none());
        assert_eq!(config.default_scale, 1.0);
        assert!(config.loop_navigation);
        assert!(config.show_total);
        assert_eq!(config.total_name, "of");
    }

    #[test]
    fn test_toolbar_respects_feature_flags() {
        let config = ViewerConfig {
            zoomable: false,
            scalable: false,
            downloadable: true,
            ..Default::default()
        };
        let tools = config.toolbar_actions();
        assert!(!tools.contains(&Action::ZoomIn));
        assert!(!tools.contains(&Action::FlipX));
        assert!(tools.contains(&Action::Reset));
        assert!(tools.contains(&Action::Download));
    }

    #[test]
    fn test_custom_toolbar_hook_rewrites_tools() {
        let config = ViewerConfig {
            custom_toolbar: Some(Rc::new(|mut tools: Vec<Action>| {
                tools.retain(|t| *t != Action::Reset);
                tools
            })),
            ..Default::default()
        };
        assert!(!config.toolbar_actions().contains(&Action::Reset));
    }

    #[test]
    fn test_image_at_out_of_range_is_blank() {
        let config = ViewerConfig::default();
        let img = config.image_at(-1);
        assert_eq!(img.src, PathBuf::new());
        assert!(img.alt.is_empty());
    }
}
