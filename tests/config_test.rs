//! Exercises the full CLI parse → config resolve path via `clap::Parser`,
//! rather than hand-built `Cli` structs.

use clap::Parser;
use pixelpilot_mini_rk::config::{Cli, Config};

#[test]
fn argv_parses_and_resolves_with_defaults() {
    let cli = Cli::parse_from(["pixelpilot-mini-rk"]);
    let cfg = Config::resolve(&cli).unwrap();
    assert_eq!(cfg.udp_port, pixelpilot_mini_rk::config::DEFAULT_UDP_PORT);
    assert!(!cfg.record.enabled);
}

#[test]
fn argv_record_video_without_value_enables_recording_with_ini_path() {
    let dir = tempfile::tempdir().unwrap();
    let ini_path = dir.path().join("pp.ini");
    std::fs::write(&ini_path, "[record]\noutput_path=/tmp/out.mp4\n").unwrap();

    let cli = Cli::parse_from([
        "pixelpilot-mini-rk",
        "--config",
        ini_path.to_str().unwrap(),
        "--record-video",
    ]);
    let cfg = Config::resolve(&cli).unwrap();
    assert!(cfg.record.enabled);
    assert_eq!(cfg.record.output_path, "/tmp/out.mp4");
}

#[test]
fn argv_record_video_with_value_overrides_ini_path() {
    let dir = tempfile::tempdir().unwrap();
    let ini_path = dir.path().join("pp.ini");
    std::fs::write(&ini_path, "[record]\noutput_path=/tmp/old.mp4\n").unwrap();

    let cli = Cli::parse_from([
        "pixelpilot-mini-rk",
        "--config",
        ini_path.to_str().unwrap(),
        "--record-video",
        "/tmp/new.mp4",
    ]);
    let cfg = Config::resolve(&cli).unwrap();
    assert!(cfg.record.enabled);
    assert_eq!(cfg.record.output_path, "/tmp/new.mp4");
}

#[test]
fn argv_no_record_video_overrides_ini_enable() {
    let dir = tempfile::tempdir().unwrap();
    let ini_path = dir.path().join("pp.ini");
    std::fs::write(&ini_path, "[record]\nenable=true\noutput_path=/tmp/out.mp4\n").unwrap();

    let cli = Cli::parse_from([
        "pixelpilot-mini-rk",
        "--config",
        ini_path.to_str().unwrap(),
        "--no-record-video",
    ]);
    let cfg = Config::resolve(&cli).unwrap();
    assert!(!cfg.record.enabled);
}

#[test]
fn argv_rejects_unknown_record_mode() {
    let cli = Cli::parse_from(["pixelpilot-mini-rk", "--record-mode", "bogus"]);
    assert!(Config::resolve(&cli).is_err());
}
