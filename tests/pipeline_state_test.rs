//! Exercises `PipelineSupervisor` lifecycle transitions end-to-end against
//! a real GStreamer graph, using fake Decoder/Recorder collaborators so the
//! test doesn't need real hardware.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pixelpilot_mini_rk::collaborators::{
    Decoder, FeedOutcome, ModesetResult, RecordConfig, Recorder, RecorderStats,
};
use pixelpilot_mini_rk::config::Config;
use pixelpilot_mini_rk::error::Result;
use pixelpilot_mini_rk::pipeline::{PipelineState, PipelineSupervisor};

fn init_gst() {
    let _ = gstreamer::init();
}

fn free_udp_port() -> u16 {
    let probe = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    probe.local_addr().unwrap().port()
}

struct FakeDecoder {
    feeds: Arc<AtomicUsize>,
}

impl Decoder for FakeDecoder {
    fn new() -> Self {
        Self { feeds: Arc::new(AtomicUsize::new(0)) }
    }
    fn init(&mut self, _modeset: &ModesetResult, _drm_fd: std::os::unix::io::RawFd) -> Result<()> {
        Ok(())
    }
    fn max_packet_size(&self) -> usize {
        0
    }
    fn start(&mut self) -> Result<()> {
        Ok(())
    }
    fn is_running(&self) -> bool {
        true
    }
    fn feed(&mut self, _data: &[u8], _pts: Option<u64>) -> Result<FeedOutcome> {
        self.feeds.fetch_add(1, Ordering::SeqCst);
        Ok(FeedOutcome::Ok)
    }
    fn send_eos(&mut self) {}
    fn stop(&mut self) {}
    fn deinit(&mut self) {}
}

struct FakeRecorder;

impl Recorder for FakeRecorder {
    fn new(_cfg: &RecordConfig) -> Result<Self> {
        Ok(FakeRecorder)
    }
    fn handle_sample(&mut self, _data: &[u8], _pts: Option<u64>) -> Result<()> {
        Ok(())
    }
    fn get_stats(&self) -> RecorderStats {
        RecorderStats { active: true, ..Default::default() }
    }
}

fn test_config(port: u16) -> Config {
    let mut cfg = Config::default();
    cfg.udp_port = port;
    cfg.vid_pt = 97;
    cfg
}

fn fixed_modeset() -> ModesetResult {
    ModesetResult { width: 640, height: 480, refresh_hz: 30 }
}

#[test]
fn starts_runs_and_stops_cleanly() {
    init_gst();
    let supervisor: PipelineSupervisor<FakeDecoder, FakeRecorder> =
        PipelineSupervisor::new(test_config(free_udp_port())).unwrap();

    assert_eq!(supervisor.state(), PipelineState::Stopped);
    supervisor.start(fixed_modeset(), -1).unwrap();
    assert_eq!(supervisor.state(), PipelineState::Running);

    supervisor.stop(200);
    assert_eq!(supervisor.state(), PipelineState::Stopped);
}

#[test]
fn start_while_running_is_rejected() {
    init_gst();
    let supervisor: PipelineSupervisor<FakeDecoder, FakeRecorder> =
        PipelineSupervisor::new(test_config(free_udp_port())).unwrap();

    supervisor.start(fixed_modeset(), -1).unwrap();
    let second = supervisor.start(fixed_modeset(), -1);
    assert!(second.is_err());

    supervisor.stop(200);
}

#[test]
fn stop_on_already_stopped_is_a_noop() {
    init_gst();
    let supervisor: PipelineSupervisor<FakeDecoder, FakeRecorder> =
        PipelineSupervisor::new(test_config(free_udp_port())).unwrap();
    supervisor.stop(200); // no-op, never started
    assert_eq!(supervisor.state(), PipelineState::Stopped);
}

#[test]
fn recording_enable_is_idempotent_and_disable_clears_stats() {
    init_gst();
    let supervisor: PipelineSupervisor<FakeDecoder, FakeRecorder> =
        PipelineSupervisor::new(test_config(free_udp_port())).unwrap();
    supervisor.start(fixed_modeset(), -1).unwrap();

    let cfg = RecordConfig {
        mode: pixelpilot_mini_rk::config::RecordMode::Standard,
        output_path: "/tmp/out.mp4".into(),
    };
    supervisor.enable_recording(cfg.clone()).unwrap();
    assert!(supervisor.recording_stats().is_some());

    // Second enable must not replace the existing recorder.
    supervisor.enable_recording(cfg).unwrap();
    assert!(supervisor.recording_stats().is_some());

    supervisor.disable_recording();
    assert!(supervisor.recording_stats().is_none());

    supervisor.stop(200);
}

#[test]
fn restart_preserves_recording() {
    init_gst();
    let supervisor: PipelineSupervisor<FakeDecoder, FakeRecorder> =
        PipelineSupervisor::new(test_config(free_udp_port())).unwrap();
    supervisor.start(fixed_modeset(), -1).unwrap();

    let cfg = RecordConfig {
        mode: pixelpilot_mini_rk::config::RecordMode::Standard,
        output_path: "/tmp/out.mp4".into(),
    };
    supervisor.enable_recording(cfg).unwrap();

    supervisor.restart(200, fixed_modeset(), -1).unwrap();
    assert_eq!(supervisor.state(), PipelineState::Running);
    assert!(supervisor.recording_stats().is_some());

    supervisor.stop(200);
}
