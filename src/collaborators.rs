//! Interfaces to components deliberately out of scope for this crate: the
//! DRM/KMS modeset, the hardware video decoder, and the MP4 recorder. Only
//! the shapes the core needs are defined here; concrete implementations are
//! external collaborators.

use crate::config::RecordMode;
use crate::error::Result;

/// Resolved mode info returned by a successful modeset.
#[derive(Debug, Clone)]
pub struct ModesetResult {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
}

#[derive(Debug, Clone)]
pub struct ModesetConfig {
    pub connector: Option<String>,
    pub plane_id: u32,
}

/// DRM/KMS atomic modeset collaborator.
pub trait DisplayTarget {
    fn modeset(card_fd: std::os::unix::io::RawFd, cfg: &ModesetConfig) -> Result<ModesetResult>;
}

/// Outcome of handing one access unit to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Ok,
    Busy,
}

/// Hardware video decoder collaborator. Implementations drive the overlay
/// plane directly; this crate only ever calls through the trait.
pub trait Decoder {
    fn new() -> Self
    where
        Self: Sized;
    fn init(
        &mut self,
        modeset: &ModesetResult,
        drm_fd: std::os::unix::io::RawFd,
    ) -> Result<()>;
    /// Upper bound on a single AU's size; the AU Consumer skips larger AUs.
    fn max_packet_size(&self) -> usize;
    fn start(&mut self) -> Result<()>;
    /// Whether the decoder is still running. The AU Consumer stops feeding
    /// once this goes false, rather than spinning against a dead decoder.
    fn is_running(&self) -> bool;
    fn feed(&mut self, data: &[u8], pts: Option<u64>) -> Result<FeedOutcome>;
    fn send_eos(&mut self);
    fn stop(&mut self);
    fn deinit(&mut self);
}

/// Fallback upper bound used when a decoder hasn't been initialised yet or
/// reports zero.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub mode: RecordMode,
    pub output_path: String,
}

/// Snapshot of recorder state under the recorder lock.
#[derive(Debug, Clone, Default)]
pub struct RecorderStats {
    pub active: bool,
    pub bytes_written: u64,
    pub elapsed_ns: u64,
    pub media_duration_ns: u64,
    pub output_path: String,
}

/// MP4 writer collaborator.
pub trait Recorder: Send {
    fn new(cfg: &RecordConfig) -> Result<Self>
    where
        Self: Sized;
    fn handle_sample(&mut self, data: &[u8], pts: Option<u64>) -> Result<()>;
    fn get_stats(&self) -> RecorderStats;
}
