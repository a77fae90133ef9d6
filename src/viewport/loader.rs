// Asynchronous image load pipeline. Requests are keyed by sequence index; a
// persistent worker thread decodes off the main loop and replies over an
// async channel. Replies for indices that are no longer current are
// discarded by the core, so rapid navigation never shows a stale image.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::image_loader;

/// Why a probe failed. Never surfaced to the consumer; failures degrade to
/// the fallback image or the blank outcome.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("image source path is empty")]
    EmptySource,
    #[error("failed to load image")]
    Load(#[source] anyhow::Error),
}

/// A decoded image ready for texture upload, plus its natural dimensions.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub natural_width: u32,
    pub natural_height: u32,
    /// Tightly packed RGBA8 rows.
    pub rgba: Vec<u8>,
    pub pix_width: u32,
    pub pix_height: u32,
}

/// One load request issued by the core.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub index: i32,
    pub src: PathBuf,
    pub generation: u64,
    /// True for explicit reset/reload actions; controls zoom preservation.
    pub is_reset: bool,
}

/// Terminal outcome for a request, delivered back on the main loop.
pub struct LoadReply {
    pub index: i32,
    pub generation: u64,
    pub is_reset: bool,
    pub outcome: Result<DecodedImage, ProbeError>,
}

/// Resolves a source path to a decoded image. The default implementation
/// reads from disk; tests substitute synthetic resolutions to drive
/// completions in arbitrary order.
pub trait DimensionProbe: Send + 'static {
    fn probe(&self, src: &Path) -> Result<DecodedImage, ProbeError>;
}

/// Disk-backed probe over the image crate.
pub struct FileProbe;

impl DimensionProbe for FileProbe {
    fn probe(&self, src: &Path) -> Result<DecodedImage, ProbeError> {
        if src.as_os_str().is_empty() {
            return Err(ProbeError::EmptySource);
        }
        let img = image_loader::open_image(src).map_err(ProbeError::Load)?;
        let rgba = img.to_rgba8();
        let (w, h) = (rgba.width(), rgba.height());
        Ok(DecodedImage {
            natural_width: w,
            natural_height: h,
            rgba: rgba.into_raw(),
            pix_width: w,
            pix_height: h,
        })
    }
}

/// Handle to the background load worker. Dropping the handle closes the
/// request queue and ends the thread.
pub struct LoadWorker {
    request_tx: flume::Sender<LoadRequest>,
}

impl LoadWorker {
    /// Spawn the worker. `generation` mirrors the most recent request so
    /// decodes that are already stale can be skipped before and after the
    /// (potentially expensive) decode; the index check on apply remains the
    /// authoritative gate.
    pub fn spawn(
        probe: impl DimensionProbe,
        reply_tx: async_channel::Sender<LoadReply>,
        generation: Arc<AtomicU64>,
    ) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<LoadRequest>();

        std::thread::spawn(move || {
            while let Ok(req) = request_rx.recv() {
                if req.generation != generation.load(Ordering::Acquire) {
                    continue;
                }
                let outcome = probe.probe(&req.src);
                if req.generation != generation.load(Ordering::Acquire) {
                    continue;
                }
                if let Err(ref err) = outcome {
                    tracing::debug!(src = ?req.src, error = %err, "Image probe failed");
                }
                let reply = LoadReply {
                    index: req.index,
                    generation: req.generation,
                    is_reset: req.is_reset,
                    outcome,
                };
                if reply_tx.send_blocking(reply).is_err() {
                    break;
                }
            }
        });

        Self { request_tx }
    }

    pub fn submit(&self, request: LoadRequest) {
        let _ = self.request_tx.send(request);
    }
}
