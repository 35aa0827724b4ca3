//! Pipeline Supervisor: constructs the streaming graph, starts/stops
//! components in the required order, guarantees every worker thread joins,
//! handles restart, and exposes the recording toggle.

pub mod bus;
pub mod consumer;
pub mod graph;

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::collaborators::{Decoder, ModesetResult, RecordConfig, Recorder, RecorderStats};
use crate::config::Config;
use crate::datagram::{StreamingBufferPool, DATAGRAM_MAX};
use crate::error::{PixelPilotError, Result};
use crate::ingress::{IngestStats, SocketIngress};
use crate::source::StreamingSource;
use bus::BusExitSignal;
use consumer::{ConsumerStats, SharedRecorder};
use graph::TransformChain;

const GRAPH_STATE_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(1);
pub const DEFAULT_STOP_WAIT_MS: u64 = 700;
pub const HARD_STOP_DEADLINE_MS: u64 = 5_000;

/// `STOPPED | RUNNING | STOPPING`. `STOPPED` implies every worker thread
/// has joined and every owned resource has been released — the only
/// externally observable lifecycle fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
    Stopping,
}

struct RunningResources<D: Decoder + Send + 'static> {
    ingress: SocketIngress,
    chain: TransformChain,
    consumer_handle: std::thread::JoinHandle<D>,
    bus_handle: std::thread::JoinHandle<()>,
    bus_exit: Arc<BusExitSignal>,
}

pub struct PipelineSupervisor<D: Decoder + Send + 'static, R: Recorder + 'static> {
    config: Config,
    _recorder_type: std::marker::PhantomData<R>,
    /// Guards `state`; lock order is pipeline mutex before recorder mutex,
    /// never inverted.
    state: Mutex<PipelineState>,
    stop_requested: Arc<AtomicBool>,
    encountered_error: Arc<AtomicBool>,
    pool: Arc<StreamingBufferPool>,
    recorder: SharedRecorder,
    ingest_stats: Arc<IngestStats>,
    consumer_stats: Arc<ConsumerStats>,
    running: Mutex<Option<RunningResources<D>>>,
}

impl<D: Decoder + Send + 'static, R: Recorder + 'static> PipelineSupervisor<D, R> {
    pub fn new(config: Config) -> Result<Self> {
        let pool = StreamingBufferPool::new(DATAGRAM_MAX)
            .map_err(|e| PixelPilotError::GraphBuild(format!("buffer pool: {e}")))?;
        Ok(Self {
            config,
            _recorder_type: std::marker::PhantomData,
            state: Mutex::new(PipelineState::Stopped),
            stop_requested: Arc::new(AtomicBool::new(false)),
            encountered_error: Arc::new(AtomicBool::new(false)),
            pool: Arc::new(pool),
            recorder: Arc::new(Mutex::new(None)),
            ingest_stats: Arc::new(IngestStats::default()),
            consumer_stats: Arc::new(ConsumerStats::default()),
            running: Mutex::new(None),
        })
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn ingest_stats(&self) -> &IngestStats {
        &self.ingest_stats
    }

    pub fn consumer_stats(&self) -> &ConsumerStats {
        &self.consumer_stats
    }

    /// Start from `STOPPED`. `modeset` and `drm_fd` come from the
    /// out-of-scope DRM/KMS collaborator.
    pub fn start(&self, modeset: ModesetResult, drm_fd: RawFd) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != PipelineState::Stopped {
                return Err(PixelPilotError::GraphState(
                    "pipeline_start called while not STOPPED".into(),
                ));
            }
            *state = PipelineState::Running; // optimistic; rewound on failure below
        }

        match self.try_start(modeset, drm_fd) {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.lock() = PipelineState::Stopped;
                Err(e)
            }
        }
    }

    fn try_start(&self, modeset: ModesetResult, drm_fd: RawFd) -> Result<()> {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.encountered_error.store(false, Ordering::SeqCst);

        let source = Arc::new(StreamingSource::new(self.config.vid_pt)?);
        let chain = graph::build(&source, self.config.appsink_max_buffers)?;

        let ingress = SocketIngress::start(
            self.config.udp_port,
            self.config.vid_pt,
            source,
            self.pool.clone(),
            self.ingest_stats.clone(),
        )
        .inspect_err(|_| {
            let _ = chain.pipeline.set_state(gst::State::Null);
        })?;

        chain
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| PixelPilotError::GraphState(format!("PLAYING transition: {e}")))?;
        if chain.pipeline.state(Some(GRAPH_STATE_TIMEOUT)).1 != gst::State::Playing {
            return Err(PixelPilotError::GraphState(
                "pipeline did not reach PLAYING within 1s".into(),
            ));
        }

        let mut decoder = D::new();
        decoder
            .init(&modeset, drm_fd)
            .map_err(|e| PixelPilotError::DecoderInit(e.to_string()))?;
        decoder.start().map_err(|e| PixelPilotError::DecoderStart(e.to_string()))?;

        let consumer_handle = consumer::spawn(
            chain.au_sink.clone(),
            decoder,
            self.recorder.clone(),
            self.stop_requested.clone(),
            self.consumer_stats.clone(),
        )?;

        let bus_exit = Arc::new(BusExitSignal::default());
        let bus_handle = bus::spawn(
            chain.pipeline.bus().expect("pipeline has a bus"),
            self.stop_requested.clone(),
            self.encountered_error.clone(),
            bus_exit.clone(),
        )?;

        *self.running.lock() = Some(RunningResources { ingress, chain, consumer_handle, bus_handle, bus_exit });

        info!(port = self.config.udp_port, vid_pt = self.config.vid_pt, "pipeline RUNNING");
        Ok(())
    }

    /// Stop, waiting up to `wait_ms` for the Bus Monitor. No-op if already
    /// `STOPPED`.
    pub fn stop(&self, wait_ms: u64) {
        {
            let mut state = self.state.lock();
            if *state == PipelineState::Stopped {
                return;
            }
            *state = PipelineState::Stopping;
        }
        self.stop_requested.store(true, Ordering::SeqCst);

        if let Some(mut res) = self.running.lock().take() {
            let _ = res.chain.pipeline.send_event(gst::event::Eos::new());
            let _ = res.chain.pipeline.set_state(gst::State::Null);

            res.ingress.stop();

            let decoder = res.consumer_handle.join().ok();
            if let Some(mut decoder) = decoder {
                decoder.stop();
                decoder.deinit();
            }

            res.bus_exit.wait(wait_ms);
            let _ = res.bus_handle.join();
        }

        if self.disable_recording_internal().is_some() {
            info!("recorder torn down during pipeline stop");
        }

        *self.state.lock() = PipelineState::Stopped;
        info!("pipeline STOPPED");
    }

    /// `stop(wait_ms)` followed by `start`. Recording, if enabled, stays
    /// attached — it lives in `self.recorder`, untouched by stop/start.
    pub fn restart(&self, wait_ms: u64, modeset: ModesetResult, drm_fd: RawFd) -> Result<()> {
        self.stop(wait_ms);
        self.start(modeset, drm_fd)
    }

    /// Install a recorder if none exists. A second call with no
    /// intervening disable is a no-op — the new writer is discarded.
    pub fn enable_recording(&self, cfg: RecordConfig) -> Result<()> {
        if cfg.output_path.is_empty() {
            return Err(PixelPilotError::Config("recording output path is empty".into()));
        }
        let recorder = R::new(&cfg)?;
        let mut guard = self.recorder.lock();
        if guard.is_some() {
            warn!("recording already enabled, discarding new writer");
            return Ok(());
        }
        *guard = Some(Box::new(recorder));
        info!(output_path = %cfg.output_path, "recording enabled");
        Ok(())
    }

    fn disable_recording_internal(&self) -> Option<Box<dyn Recorder>> {
        let mut guard = self.recorder.lock();
        guard.take()
    }

    /// Detach and destroy the writer outside the recorder lock.
    pub fn disable_recording(&self) {
        if self.disable_recording_internal().is_some() {
            info!("recording disabled");
        }
    }

    pub fn recording_stats(&self) -> Option<RecorderStats> {
        self.recorder.lock().as_ref().map(|r| r.get_stats())
    }

    /// Non-blocking check: if the Bus Monitor has exited, join it, tear
    /// down, and transition to `STOPPED`. Returns whether an error was
    /// observed.
    pub fn poll_child(&self) -> Option<bool> {
        let exited = {
            let running = self.running.lock();
            match running.as_ref() {
                Some(res) => res.bus_handle.is_finished(),
                None => return None,
            }
        };
        if !exited {
            return None;
        }
        self.stop(DEFAULT_STOP_WAIT_MS);
        Some(self.encountered_error.load(Ordering::SeqCst))
    }
}
