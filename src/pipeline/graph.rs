//! Transform Chain construction: head queue → jitter buffer → RTP/H.265
//! depayloader → H.265 parser → caps enforcement → Access-Unit Sink.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use crate::error::{PixelPilotError, Result};
use crate::source::StreamingSource;

/// Head queue leak type: drop the oldest buffer on overrun rather than
/// back-pressuring the producer. GStreamer's `queue` leaky enum: 0 = no
/// leak, 1 = upstream (old buffers), 2 = downstream (new buffers).
const QUEUE_LEAKY_UPSTREAM: i32 = 1;

/// `rtpjitterbuffer` "mode" property nick for `GST_RTP_JITTER_BUFFER_MODE_SYNCED`.
const JITTERBUFFER_MODE_SYNCED: &str = "synced";

const JITTERBUFFER_LATENCY_MS: u32 = 10;

pub struct TransformChain {
    pub pipeline: gst::Pipeline,
    pub au_sink: gst_app::AppSink,
}

/// Build and link the full graph: `source → queue → rtpjitterbuffer →
/// rtph265depay → h265parse → capsfilter → appsink`. On any construction or
/// linking failure, the partially-built pipeline is torn down and an error
/// is returned — no partial graph is left behind.
pub fn build(source: &StreamingSource, appsink_max_buffers: u32) -> Result<TransformChain> {
    let pipeline = gst::Pipeline::new();

    let make = |factory: &str, name: &str| -> Result<gst::Element> {
        gst::ElementFactory::make(factory)
            .name(name)
            .build()
            .map_err(|e| PixelPilotError::GraphBuild(format!("{factory}: {e}")))
    };

    let result = (|| -> Result<TransformChain> {
        let source_elem = source.element();
        let queue = make("queue", "head_queue")?;
        queue.set_property("leaky", QUEUE_LEAKY_UPSTREAM);
        queue.set_property("max-size-buffers", 0u32);
        queue.set_property("max-size-bytes", 0u32);
        queue.set_property("max-size-time", 0u64);

        let jitterbuffer = make("rtpjitterbuffer", "jitter_buffer")?;
        jitterbuffer.set_property("latency", JITTERBUFFER_LATENCY_MS);
        jitterbuffer.set_property("do-lost", true);
        // Preserved verbatim: late packets still propagate downstream —
        // the decoder, not the jitter buffer, decides what to do with them.
        jitterbuffer.set_property("drop-on-late", false);
        jitterbuffer.set_property_from_str("mode", JITTERBUFFER_MODE_SYNCED);

        let depay = make("rtph265depay", "h265_depay")?;

        let parser = make("h265parse", "h265_parse")?;
        parser.set_property("config-interval", -1i32);
        parser.set_property("disable-passthrough", true);

        let capsfilter = make("capsfilter", "au_caps")?;
        let au_caps = gst::Caps::builder("video/x-h265")
            .field("stream-format", "byte-stream")
            .field("alignment", "au")
            .build();
        capsfilter.set_property("caps", &au_caps);

        let appsink = make("appsink", "au_sink")?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| PixelPilotError::GraphBuild("appsink downcast failed".into()))?;
        appsink.set_property("max-buffers", appsink_max_buffers);
        appsink.set_property("drop", true);
        appsink.set_property("sync", false);
        appsink.set_property("emit-signals", false);
        appsink.set_caps(Some(&au_caps));

        let appsink_elem: gst::Element = appsink.clone().upcast();
        let elements = [
            &source_elem,
            &queue,
            &jitterbuffer,
            &depay,
            &parser,
            &capsfilter,
            &appsink_elem,
        ];
        pipeline
            .add_many(elements)
            .map_err(|e| PixelPilotError::GraphBuild(format!("add_many: {e}")))?;
        gst::Element::link_many(elements)
            .map_err(|e| PixelPilotError::GraphLink(format!("link_many: {e}")))?;

        Ok(TransformChain { pipeline: pipeline.clone(), au_sink: appsink })
    })();

    if result.is_err() {
        let _ = pipeline.set_state(gst::State::Null);
    }
    result
}
