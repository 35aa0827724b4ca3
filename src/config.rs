//! CLI + INI configuration surface.
//!
//! Resolution order is defaults → INI (only if `--config` was given) → CLI,
//! with CLI winning on every overlapping key. The merge is a single pass
//! over an explicit "did the CLI touch this field" set, not two independent
//! parses — see [`Config::resolve`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;

use crate::error::{PixelPilotError, Result};

pub const DEFAULT_CARD_PATH: &str = "/dev/dri/card0";
pub const DEFAULT_PLANE_ID: u32 = 76;
pub const DEFAULT_UDP_PORT: u16 = 5600;
pub const DEFAULT_VID_PT: i32 = 97;
pub const DEFAULT_APPSINK_MAX_BUFFERS: u32 = 4;

/// Tagged variant consumed by the recorder collaborator; the core only
/// ever carries the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    Standard,
    Sequential,
    Fragmented,
}

impl RecordMode {
    /// Canonical lowercase name — round-trips through [`FromStr`].
    pub fn canonical_name(self) -> &'static str {
        match self {
            RecordMode::Standard => "standard",
            RecordMode::Sequential => "sequential",
            RecordMode::Fragmented => "fragmented",
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for RecordMode {
    type Err = PixelPilotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(RecordMode::Standard),
            "sequential" | "append" => Ok(RecordMode::Sequential),
            "fragmented" | "fragment" => Ok(RecordMode::Fragmented),
            other => Err(PixelPilotError::Config(format!(
                "unknown record mode '{other}' (expected standard|sequential|fragmented)"
            ))),
        }
    }
}

/// Raw command-line surface. Fields that can also come from INI have no
/// `default_value`: `None` means "the user didn't touch this", which is
/// exactly what the merge step needs to implement CLI-wins-on-overlap
/// without re-deriving precedence from argv a second time.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixelpilot-mini-rk", about = "RTP/H.265 ingest core", version)]
pub struct Cli {
    #[arg(long)]
    pub card: Option<PathBuf>,

    #[arg(long)]
    pub connector: Option<String>,

    #[arg(long = "plane-id")]
    pub plane_id: Option<u32>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long = "udp-port")]
    pub udp_port: Option<u16>,

    #[arg(long = "vid-pt")]
    pub vid_pt: Option<i32>,

    #[arg(long = "appsink-max-buffers")]
    pub appsink_max_buffers: Option<u32>,

    /// Optional value: treated as a path only if it doesn't start with `--`.
    #[arg(long = "record-video", num_args = 0..=1, require_equals = false)]
    pub record_video: Option<Option<String>>,

    #[arg(long = "record-mode")]
    pub record_mode: Option<String>,

    #[arg(long = "no-record-video")]
    pub no_record_video: bool,

    #[arg(long = "gst-log")]
    pub gst_log: bool,

    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub enabled: bool,
    pub mode: RecordMode,
    pub output_path: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self { enabled: false, mode: RecordMode::Standard, output_path: String::new() }
    }
}

/// Fully resolved configuration the rest of the core consumes.
#[derive(Debug, Clone)]
pub struct Config {
    pub card_path: PathBuf,
    pub connector: Option<String>,
    pub plane_id: u32,
    pub udp_port: u16,
    pub vid_pt: i32,
    pub appsink_max_buffers: u32,
    pub record: RecordConfig,
    pub gst_log: bool,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            card_path: PathBuf::from(DEFAULT_CARD_PATH),
            connector: None,
            plane_id: DEFAULT_PLANE_ID,
            udp_port: DEFAULT_UDP_PORT,
            vid_pt: DEFAULT_VID_PT,
            appsink_max_buffers: DEFAULT_APPSINK_MAX_BUFFERS,
            record: RecordConfig::default(),
            gst_log: false,
            verbose: false,
        }
    }
}

/// Parsed `[section] key=value` pairs, case-insensitive on both.
#[derive(Debug, Default)]
struct IniDocument {
    sections: std::collections::HashMap<String, std::collections::HashMap<String, String>>,
}

impl IniDocument {
    fn parse(text: &str) -> Self {
        let mut doc = IniDocument::default();
        let mut section = String::new();
        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_ascii_lowercase();
                doc.sections.entry(section.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else { continue };
            doc.sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        doc
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(|s| s.as_str())
    }

    fn get_alias(&self, section: &str, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(section, k))
    }
}

fn strip_comment(line: &str) -> &str {
    let hash = line.find('#');
    let semi = line.find(';');
    match (hash, semi) {
        (Some(h), Some(s)) => &line[..h.min(s)],
        (Some(h), None) => &line[..h],
        (None, Some(s)) => &line[..s],
        (None, None) => line,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Resolve defaults → INI (if `cli.config` is set) → CLI.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut cfg = Config::default();

        if let Some(path) = &cli.config {
            cfg.apply_ini(path)?;
        }

        cfg.apply_cli(cli)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_ini(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PixelPilotError::Config(format!("cannot read INI file: {e}")))?;
        let doc = IniDocument::parse(&text);

        if let Some(v) = doc.get("video", "card_path") {
            self.card_path = PathBuf::from(v);
        }
        if let Some(v) = doc.get_alias("video", &["connector", "connector_name"]) {
            self.connector = Some(v.to_string());
        }
        if let Some(v) = doc.get("video", "plane_id") {
            self.plane_id = v
                .parse()
                .map_err(|_| PixelPilotError::Config(format!("invalid plane_id '{v}'")))?;
        }
        if let Some(v) = doc.get("video", "udp_port") {
            self.udp_port = v
                .parse()
                .map_err(|_| PixelPilotError::Config(format!("invalid udp_port '{v}'")))?;
        }
        if let Some(v) = doc.get_alias("video", &["vid_pt", "video_payload_type"]) {
            self.vid_pt = v
                .parse()
                .map_err(|_| PixelPilotError::Config(format!("invalid vid_pt '{v}'")))?;
        }
        if let Some(v) = doc.get("video", "appsink_max_buffers") {
            self.appsink_max_buffers = v
                .parse()
                .map_err(|_| PixelPilotError::Config(format!("invalid appsink_max_buffers '{v}'")))?;
        }
        if let Some(v) = doc.get("video", "gst_log") {
            self.gst_log = parse_bool(v)
                .ok_or_else(|| PixelPilotError::Config(format!("invalid gst_log '{v}'")))?;
        }

        if let Some(v) = doc.get("record", "enable") {
            self.record.enabled = parse_bool(v)
                .ok_or_else(|| PixelPilotError::Config(format!("invalid record.enable '{v}'")))?;
        }
        if let Some(v) = doc.get_alias("record", &["output_path", "path"]) {
            self.record.output_path = v.to_string();
        }
        if let Some(v) = doc.get("record", "mode") {
            self.record.mode = v.parse()?;
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) -> Result<()> {
        if let Some(v) = &cli.card {
            self.card_path = v.clone();
        }
        if let Some(v) = &cli.connector {
            self.connector = Some(v.clone());
        }
        if let Some(v) = cli.plane_id {
            self.plane_id = v;
        }
        if let Some(v) = cli.udp_port {
            self.udp_port = v;
        }
        if let Some(v) = cli.vid_pt {
            self.vid_pt = v;
        }
        if let Some(v) = cli.appsink_max_buffers {
            self.appsink_max_buffers = v;
        }
        if let Some(mode) = &cli.record_mode {
            self.record.mode = mode.parse()?;
        }
        // `--record-video [PATH]`: present without a value keeps the
        // existing/INI output path but turns recording on; present with a
        // value (that doesn't look like the next flag) sets the path too.
        if let Some(maybe_path) = &cli.record_video {
            self.record.enabled = true;
            if let Some(path) = maybe_path {
                self.record.output_path = path.clone();
            }
        }
        if cli.no_record_video {
            self.record.enabled = false;
        }
        if cli.gst_log {
            self.gst_log = true;
        }
        if cli.verbose {
            self.verbose = true;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.appsink_max_buffers == 0 {
            return Err(PixelPilotError::Config("appsink_max_buffers must be > 0".into()));
        }
        if self.record.enabled && self.record.output_path.is_empty() {
            return Err(PixelPilotError::Config(
                "recording enabled but output_path is empty".into(),
            ));
        }
        Ok(())
    }

    /// Serialize back to INI text. Used by the round-trip config test;
    /// keys come out lowercase regardless of how they were originally cased.
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        out.push_str("[video]\n");
        out.push_str(&format!("card_path={}\n", self.card_path.display()));
        if let Some(c) = &self.connector {
            out.push_str(&format!("connector={c}\n"));
        }
        out.push_str(&format!("plane_id={}\n", self.plane_id));
        out.push_str(&format!("udp_port={}\n", self.udp_port));
        out.push_str(&format!("vid_pt={}\n", self.vid_pt));
        out.push_str(&format!("appsink_max_buffers={}\n", self.appsink_max_buffers));
        out.push_str(&format!("gst_log={}\n", self.gst_log));
        out.push_str("\n[record]\n");
        out.push_str(&format!("enable={}\n", self.record.enabled));
        out.push_str(&format!("output_path={}\n", self.record.output_path));
        out.push_str(&format!("mode={}\n", self.record.mode));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_config(path: &Path) -> Cli {
        Cli {
            card: None,
            connector: None,
            plane_id: None,
            config: Some(path.to_path_buf()),
            udp_port: None,
            vid_pt: None,
            appsink_max_buffers: None,
            record_video: None,
            record_mode: None,
            no_record_video: false,
            gst_log: false,
            verbose: false,
        }
    }

    #[test]
    fn record_mode_round_trips() {
        for m in [RecordMode::Standard, RecordMode::Sequential, RecordMode::Fragmented] {
            let parsed: RecordMode = m.canonical_name().parse().unwrap();
            assert_eq!(parsed, m);
        }
    }

    #[test]
    fn record_mode_aliases_are_case_insensitive() {
        assert_eq!("DEFAULT".parse::<RecordMode>().unwrap(), RecordMode::Standard);
        assert_eq!("Append".parse::<RecordMode>().unwrap(), RecordMode::Sequential);
        assert_eq!("FRAGMENT".parse::<RecordMode>().unwrap(), RecordMode::Fragmented);
    }

    #[test]
    fn cli_overrides_ini_on_overlapping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = dir.path().join("pp.ini");
        std::fs::write(&ini_path, "[video]\nudp_port=1234\nvid_pt=50\n").unwrap();

        let mut cli = cli_with_config(&ini_path);
        cli.udp_port = Some(9999);

        let cfg = Config::resolve(&cli).unwrap();
        assert_eq!(cfg.udp_port, 9999, "CLI must win over INI");
        assert_eq!(cfg.vid_pt, 50, "INI value kept where CLI didn't touch it");
    }

    #[test]
    fn ini_comments_and_case_insensitive_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = dir.path().join("pp.ini");
        std::fs::write(
            &ini_path,
            "; leading comment\n[VIDEO]\nUDP_PORT=7000 # inline comment\nVID_PT=97\n",
        )
        .unwrap();

        let cli = cli_with_config(&ini_path);
        let cfg = Config::resolve(&cli).unwrap();
        assert_eq!(cfg.udp_port, 7000);
        assert_eq!(cfg.vid_pt, 97);
    }

    #[test]
    fn ini_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let ini_path = dir.path().join("pp.ini");

        let mut cli = cli_with_config(&ini_path);
        std::fs::write(&ini_path, "[video]\nudp_port=6000\n").unwrap();
        cli.appsink_max_buffers = Some(8);
        let original = Config::resolve(&cli).unwrap();

        let written = original.to_ini_string();
        std::fs::write(&ini_path, written).unwrap();

        let reload_cli = cli_with_config(&ini_path);
        let reloaded = Config::resolve(&reload_cli).unwrap();

        assert_eq!(reloaded.udp_port, original.udp_port);
        assert_eq!(reloaded.appsink_max_buffers, original.appsink_max_buffers);
        assert_eq!(reloaded.record.mode, original.record.mode);
    }

    #[test]
    fn defaults_without_config_file() {
        let cli = Cli {
            card: None,
            connector: None,
            plane_id: None,
            config: None,
            udp_port: None,
            vid_pt: None,
            appsink_max_buffers: None,
            record_video: None,
            record_mode: None,
            no_record_video: false,
            gst_log: false,
            verbose: false,
        };
        let cfg = Config::resolve(&cli).unwrap();
        assert_eq!(cfg.udp_port, DEFAULT_UDP_PORT);
        assert_eq!(cfg.vid_pt, DEFAULT_VID_PT);
        assert_eq!(cfg.appsink_max_buffers, DEFAULT_APPSINK_MAX_BUFFERS);
    }

    #[test]
    fn record_enabled_requires_output_path() {
        let mut cli = Cli {
            card: None,
            connector: None,
            plane_id: None,
            config: None,
            udp_port: None,
            vid_pt: None,
            appsink_max_buffers: None,
            record_video: None,
            record_mode: None,
            no_record_video: false,
            gst_log: false,
            verbose: false,
        };
        cli.record_video = Some(None);
        let err = Config::resolve(&cli).unwrap_err();
        assert!(matches!(err, PixelPilotError::Config(_)));
    }
}
