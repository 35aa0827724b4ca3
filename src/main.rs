//! pixelpilot-mini-rk — RTP/H.265 ingest core.
//!
//! Usage:
//!   pixelpilot-mini-rk --udp-port 5600 --vid-pt 97 --card /dev/dri/card0 --plane-id 76

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pixelpilot_mini_rk::collaborators::{
    Decoder, DisplayTarget, FeedOutcome, ModesetConfig, ModesetResult, RecordConfig as CollabRecordConfig,
    Recorder, RecorderStats,
};
use pixelpilot_mini_rk::config::{Cli, Config};
use pixelpilot_mini_rk::error::Result;
use pixelpilot_mini_rk::pipeline::{PipelineSupervisor, HARD_STOP_DEADLINE_MS};
use pixelpilot_mini_rk::signals::{self, SignalIntents};
use pixelpilot_mini_rk::single_instance::SingleInstanceGuard;

const MAIN_LOOP_POLL_MS: u64 = 100;

/// Stand-in DRM/KMS modeset: the real implementation lives in whatever
/// board-support crate owns `/dev/dri/cardN`. This one just trusts the
/// configured plane exists and reports a fixed mode.
struct NoopDisplayTarget;

impl DisplayTarget for NoopDisplayTarget {
    fn modeset(_card_fd: RawFd, cfg: &ModesetConfig) -> Result<ModesetResult> {
        debug!(plane_id = cfg.plane_id, connector = ?cfg.connector, "modeset (no-op stand-in)");
        Ok(ModesetResult { width: 1920, height: 1080, refresh_hz: 60 })
    }
}

/// Stand-in hardware decoder: the real implementation drives the overlay
/// plane from a vendor decode API. This one only tracks that it was fed.
struct NoopDecoder {
    running: bool,
}

impl Decoder for NoopDecoder {
    fn new() -> Self {
        Self { running: false }
    }
    fn init(&mut self, modeset: &ModesetResult, _drm_fd: RawFd) -> Result<()> {
        debug!(width = modeset.width, height = modeset.height, "decoder init (no-op stand-in)");
        Ok(())
    }
    fn max_packet_size(&self) -> usize {
        0 // falls back to the consumer's default
    }
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }
    fn is_running(&self) -> bool {
        self.running
    }
    fn feed(&mut self, _data: &[u8], _pts: Option<u64>) -> Result<FeedOutcome> {
        Ok(FeedOutcome::Ok)
    }
    fn send_eos(&mut self) {}
    fn stop(&mut self) {
        self.running = false;
    }
    fn deinit(&mut self) {}
}

/// Stand-in MP4 writer: the real implementation muxes AUs into fragmented
/// or sequential MP4. This one counts bytes so `get_recording_stats` has
/// something real to report.
struct NoopRecorder {
    output_path: String,
    bytes_written: u64,
    started: std::time::Instant,
}

impl Recorder for NoopRecorder {
    fn new(cfg: &CollabRecordConfig) -> Result<Self> {
        info!(output_path = %cfg.output_path, mode = ?cfg.mode, "recorder opened (no-op stand-in)");
        Ok(Self { output_path: cfg.output_path.clone(), bytes_written: 0, started: std::time::Instant::now() })
    }
    fn handle_sample(&mut self, data: &[u8], _pts: Option<u64>) -> Result<()> {
        self.bytes_written += data.len() as u64;
        Ok(())
    }
    fn get_stats(&self) -> RecorderStats {
        RecorderStats {
            active: true,
            bytes_written: self.bytes_written,
            elapsed_ns: self.started.elapsed().as_nanos() as u64,
            media_duration_ns: 0,
            output_path: self.output_path.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::resolve(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if config.verbose { "debug" } else { "info" })
        }))
        .init();

    if config.gst_log && std::env::var("GST_DEBUG").is_err() {
        std::env::set_var("GST_DEBUG", "3");
    }

    if let Err(e) = gstreamer::init() {
        error!(error = %e, "gstreamer init failed");
        std::process::exit(1);
    }

    // Signals must be blocked here, on the main thread, before any other
    // thread is spawned — new threads inherit this mask.
    if let Err(e) = signals::block_signals() {
        error!(error = %e, "failed to block signals");
        std::process::exit(1);
    }

    let _instance_guard = match SingleInstanceGuard::acquire(pixelpilot_mini_rk::single_instance::PID_FILE_PATH) {
        Ok(guard) => guard,
        Err(e) => {
            error!(error = %e, "another instance is already running");
            std::process::exit(1);
        }
    };

    if let Err(code) = run(config) {
        std::process::exit(code);
    }
}

fn run(config: Config) -> std::result::Result<(), i32> {
    let supervisor: PipelineSupervisor<NoopDecoder, NoopRecorder> = PipelineSupervisor::new(config.clone())
        .map_err(|e| {
            error!(error = %e, "failed to construct pipeline supervisor");
            1
        })?;

    let modeset_cfg = ModesetConfig { connector: config.connector.clone(), plane_id: config.plane_id };
    let card_fd: RawFd = -1; // opening /dev/dri/cardN is a DisplayTarget concern, not this core's.
    let modeset = NoopDisplayTarget::modeset(card_fd, &modeset_cfg).map_err(|e| {
        error!(error = %e, "modeset failed");
        1
    })?;

    if let Err(e) = supervisor.start(modeset.clone(), card_fd) {
        error!(error = %e, "pipeline start failed");
        return Err(1);
    }

    if config.record.enabled {
        let record_cfg = CollabRecordConfig { mode: config.record.mode, output_path: config.record.output_path.clone() };
        if let Err(e) = supervisor.enable_recording(record_cfg) {
            warn!(error = %e, "recording requested but could not be enabled");
        }
    }

    let intents = Arc::new(SignalIntents::default());
    if let Err(e) = signals::spawn_signal_supervisor(intents.clone()) {
        error!(error = %e, "failed to spawn signal supervisor");
        supervisor.stop(pixelpilot_mini_rk::pipeline::DEFAULT_STOP_WAIT_MS);
        return Err(1);
    }

    // Only start-path failures (initial start, restart) turn into a non-zero
    // exit. A fatal graph error surfacing through `poll_child` trips a clean
    // stop and exits 0 once STOPPED — it's logged, not propagated.
    let mut fatal_error = false;
    loop {
        std::thread::sleep(Duration::from_millis(MAIN_LOOP_POLL_MS));

        if let Some(had_error) = supervisor.poll_child() {
            info!(had_error, "pipeline exited on its own (EOS or graph error)");
            break;
        }

        if intents.take_exit() {
            info!("exit requested");
            break;
        }

        if intents.take_restart() {
            info!("restart requested");
            if let Err(e) = supervisor.restart(pixelpilot_mini_rk::pipeline::DEFAULT_STOP_WAIT_MS, modeset.clone(), card_fd) {
                error!(error = %e, "restart failed");
                fatal_error = true;
                break;
            }
        }

        if intents.take_record_enable() {
            if config.record.output_path.is_empty() {
                warn!("recording enable requested but no output path is configured");
            } else {
                let record_cfg = CollabRecordConfig {
                    mode: config.record.mode,
                    output_path: config.record.output_path.clone(),
                };
                if let Err(e) = supervisor.enable_recording(record_cfg) {
                    warn!(error = %e, "recording enable failed");
                }
            }
        }

        if intents.take_record_disable() {
            supervisor.disable_recording();
        }
    }

    stop_with_deadline(&supervisor);

    if fatal_error {
        Err(1)
    } else {
        Ok(())
    }
}

/// `supervisor.stop` should complete well within the hard deadline; if it
/// doesn't, something downstream (decoder, bus) is wedged and waiting
/// longer would hang the process on SIGTERM.
fn stop_with_deadline<D, R>(supervisor: &PipelineSupervisor<D, R>)
where
    D: Decoder + Send + 'static,
    R: Recorder + 'static,
{
    let stop_deadline = Duration::from_millis(HARD_STOP_DEADLINE_MS);
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            supervisor.stop(pixelpilot_mini_rk::pipeline::DEFAULT_STOP_WAIT_MS);
            let _ = done_tx.send(());
        });
        if done_rx.recv_timeout(stop_deadline).is_err() {
            error!("pipeline stop did not complete within the hard deadline, forcing exit");
            std::process::exit(128);
        }
    });
}
