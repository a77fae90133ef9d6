pub mod overlay;

pub use overlay::ViewerOverlay;
