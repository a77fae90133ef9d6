// Viewport controller: the transform state machine behind the overlay.
// Pure logic only; widget wiring lives in ui::overlay.

pub mod core;
pub mod lifecycle;
pub mod loader;
pub mod router;
pub mod state;
pub mod transform;

pub use core::{CoreEffect, ViewerCore};
pub use lifecycle::{Lifecycle, Phase, ScrollLockGuard};
pub use loader::{DimensionProbe, FileProbe, LoadReply, LoadRequest, LoadWorker, ProbeError};
pub use router::PinchTracker;
pub use state::{StatePatch, Transition, ViewportState};
pub use transform::{ContainerSize, FOOTER_HEIGHT};
