//! Streaming Source: the graph's programmable input element.
//!
//! Wraps a `gst_app::AppSrc` configured live, auto-timestamped, not
//! seekable, non-blocking on push — the producer (Socket Ingress) must
//! never wait on this element.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use crate::error::{PixelPilotError, Result};

/// `appsrc`'s (`GstBaseSrc`) "leaky-type" property nick for dropping the
/// oldest queued buffer on overrun, matching the head queue's leaky mode.
const LEAKY_TYPE_UPSTREAM: &str = "upstream";

/// Thin wrapper around the `appsrc` configured per §4.2.
pub struct StreamingSource {
    appsrc: gst_app::AppSrc,
}

impl StreamingSource {
    /// Build an `appsrc` with RTP/H.265 caps for the given payload type.
    pub fn new(vid_pt: i32) -> Result<Self> {
        let appsrc = gst::ElementFactory::make("appsrc")
            .name("rtp_source")
            .build()
            .map_err(|e| PixelPilotError::GraphBuild(format!("appsrc: {e}")))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| PixelPilotError::GraphBuild("appsrc downcast failed".into()))?;

        let caps = gst::Caps::builder("application/x-rtp")
            .field("media", "video")
            .field("encoding-name", "H265")
            .field("clock-rate", 90_000i32)
            .field("payload", vid_pt)
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(true);
        appsrc.set_stream_type(gst_app::AppStreamType::Stream);
        appsrc.set_property("block", false);
        appsrc.set_property_from_str("leaky-type", LEAKY_TYPE_UPSTREAM);
        // Unbounded at the source; the head queue and jitter buffer impose
        // the real bounds downstream.
        appsrc.set_max_bytes(0);

        Ok(Self { appsrc })
    }

    pub fn element(&self) -> gst::Element {
        self.appsrc.clone().upcast()
    }

    /// Pending-bytes level, queried by the ingress back-pressure gate.
    pub fn current_level_bytes(&self) -> u64 {
        self.appsrc.current_level_bytes()
    }

    /// Push a buffer, transferring ownership unconditionally. A non-OK
    /// result must only be logged — the producer never retries or blocks.
    pub fn push(&self, buffer: gst::Buffer) -> Result<gst::FlowSuccess, gst::FlowError> {
        self.appsrc.push_buffer(buffer)
    }

    pub fn send_eos(&self) {
        let _ = self.appsrc.end_of_stream();
    }
}
