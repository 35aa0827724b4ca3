//! AU Consumer: pulls access units from the Access-Unit Sink and
//! demultiplexes each one to the decoder and, if recording is active, to
//! the recorder.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::collaborators::{Decoder, FeedOutcome, Recorder, DEFAULT_MAX_PACKET_SIZE};
use crate::error::{PixelPilotError, Result};

const PULL_TIMEOUT_MS: u64 = 100;

#[derive(Default)]
pub struct ConsumerStats {
    pub aus_delivered: AtomicU64,
    pub aus_skipped_oversized: AtomicU64,
}

pub type SharedRecorder = Arc<Mutex<Option<Box<dyn Recorder>>>>;

/// Spawn the AU Consumer thread. The decoder is moved into the thread and
/// handed back as the join result so the caller can stop/deinit it after
/// EOS has been sent — consumer and decoder lifecycle are joined together.
pub fn spawn<D>(
    au_sink: gst_app::AppSink,
    decoder: D,
    recorder: SharedRecorder,
    stop: Arc<AtomicBool>,
    stats: Arc<ConsumerStats>,
) -> Result<JoinHandle<D>>
where
    D: Decoder + Send + 'static,
{
    std::thread::Builder::new()
        .name("au-consumer".into())
        .spawn(move || run(au_sink, decoder, recorder, stop, stats))
        .map_err(|e| PixelPilotError::ThreadSpawn(format!("AU consumer: {e}")))
}

fn run<D: Decoder>(
    au_sink: gst_app::AppSink,
    mut decoder: D,
    recorder: SharedRecorder,
    stop: Arc<AtomicBool>,
    stats: Arc<ConsumerStats>,
) -> D {
    let max_packet = match decoder.max_packet_size() {
        0 => DEFAULT_MAX_PACKET_SIZE,
        n => n,
    };

    while !stop.load(Ordering::SeqCst) && decoder.is_running() {
        let sample = match au_sink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS)) {
            Some(s) => s,
            None => continue, // timeout, re-check stop_requested
        };

        let Some(buffer) = sample.buffer() else { continue };
        let pts = buffer.pts().or_else(|| buffer.dts()).map(|t| t.nseconds());

        let Ok(map) = buffer.map_readable() else { continue };
        let data = map.as_slice();

        if data.is_empty() || data.len() > max_packet {
            stats.aus_skipped_oversized.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        {
            // Held only for this one delivery — never across pulls — so
            // enabling/disabling recording races with delivery only at AU
            // boundaries.
            let mut guard = recorder.lock();
            if let Some(rec) = guard.as_mut() {
                if let Err(e) = rec.handle_sample(data, pts) {
                    warn!(error = %e, "recorder sample delivery failed");
                }
            }
        }

        match decoder.feed(data, pts) {
            Ok(FeedOutcome::Ok) => {
                stats.aus_delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(FeedOutcome::Busy) => {
                // Drop-newest at the decoder boundary: the AU is not retried.
                debug!("decoder reported busy, AU dropped");
            }
            Err(e) => {
                warn!(error = %e, "decoder feed failed");
            }
        }
    }

    decoder.send_eos();
    decoder
}
