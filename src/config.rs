/*
 *  config.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML file, command line
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::frame::FrameSettings;

pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_AUDIO_ASSET: &str = "music.wav";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOSTNAME: &str = "photoframe.local";

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every field is optional so layers can be
/// merged; the accessors below supply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub card: Option<CardConfig>,
    pub slideshow: Option<SlideshowConfig>,
    pub audio: Option<AudioConfig>,
    pub display: Option<DisplayConfig>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CardConfig {
    /// Where the card is mounted
    pub root: Option<PathBuf>,
    /// Names never shown in file listings
    pub hidden: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlideshowConfig {
    pub interval_secs: Option<u64>,
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioConfig {
    pub asset: Option<String>,
    pub gain: Option<f32>,          // 0.0-1.0
    pub mono: Option<bool>,
    pub play_after_upload: Option<bool>,
    /// s16le PCM goes here (a FIFO for aplay, say); discarded when unset
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotate_deg: Option<u16>,
    /// Show the connection screen at boot
    pub splash: Option<bool>,
    /// Write each flushed frame here as PPM
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub port: Option<u16>,
    pub hostname: Option<String>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "photoframe", version, about = "SD card photo frame with audio playback")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Mount point of the storage card
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub card_root: Option<PathBuf>,
    #[arg(long)]
    pub interval_secs: Option<u64>,
    #[arg(long)]
    pub audio_asset: Option<String>,
    #[arg(long)]
    pub audio_gain: Option<f32>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub audio_output: Option<PathBuf>,
    #[arg(long, action = ArgAction::Set)]
    pub play_after_upload: Option<bool>,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long)]
    pub display_rotate_deg: Option<u16>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub display_snapshot: Option<PathBuf>,
    /// Skip the connection screen
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_splash: bool,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub hostname: Option<String>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Everything but the argument parsing
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/photoframe/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/photoframe/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/photoframe.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["photoframe.yaml", "config.yaml", "config/photoframe.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Take `src` where it is set
macro_rules! overlay {
    ($dst:expr, $src:expr, $($field:ident),+) => {
        $( if $src.$field.is_some() { $dst.$field = $src.$field; } )+
    };
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    if let Some(s) = src.card {
        let d = dst.card.get_or_insert_with(Default::default);
        overlay!(d, s, root, hidden);
    }
    if let Some(s) = src.slideshow {
        let d = dst.slideshow.get_or_insert_with(Default::default);
        overlay!(d, s, interval_secs, extensions);
    }
    if let Some(s) = src.audio {
        let d = dst.audio.get_or_insert_with(Default::default);
        overlay!(d, s, asset, gain, mono, play_after_upload, output);
    }
    if let Some(s) = src.display {
        let d = dst.display.get_or_insert_with(Default::default);
        overlay!(d, s, width, height, rotate_deg, splash, snapshot);
    }
    if let Some(s) = src.network {
        let d = dst.network.get_or_insert_with(Default::default);
        overlay!(d, s, port, hostname);
    }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() { cfg.log_level = cli.log_level.clone(); }
    if cli.debug { cfg.log_level = Some("debug".to_string()); }

    if cli.card_root.is_some() {
        cfg.card.get_or_insert_with(Default::default).root = cli.card_root.clone();
    }
    if cli.interval_secs.is_some() {
        cfg.slideshow.get_or_insert_with(Default::default).interval_secs = cli.interval_secs;
    }

    if cli.audio_asset.is_some() || cli.audio_gain.is_some() || cli.audio_output.is_some() || cli.play_after_upload.is_some() {
        let audio = cfg.audio.get_or_insert_with(Default::default);
        if cli.audio_asset.is_some()       { audio.asset = cli.audio_asset.clone(); }
        if cli.audio_gain.is_some()        { audio.gain = cli.audio_gain; }
        if cli.audio_output.is_some()      { audio.output = cli.audio_output.clone(); }
        if cli.play_after_upload.is_some() { audio.play_after_upload = cli.play_after_upload; }
    }

    let any_display = cli.display_width.is_some()
        || cli.display_height.is_some()
        || cli.display_rotate_deg.is_some()
        || cli.display_snapshot.is_some()
        || cli.no_splash;
    if any_display {
        let display = cfg.display.get_or_insert_with(Default::default);
        if cli.display_width.is_some()      { display.width = cli.display_width; }
        if cli.display_height.is_some()     { display.height = cli.display_height; }
        if cli.display_rotate_deg.is_some() { display.rotate_deg = cli.display_rotate_deg; }
        if cli.display_snapshot.is_some()   { display.snapshot = cli.display_snapshot.clone(); }
        if cli.no_splash                    { display.splash = Some(false); }
    }

    if cli.port.is_some() || cli.hostname.is_some() {
        let network = cfg.network.get_or_insert_with(Default::default);
        if cli.port.is_some()     { network.port = cli.port; }
        if cli.hostname.is_some() { network.hostname = cli.hostname.clone(); }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(slideshow) = cfg.slideshow.as_ref() {
        if slideshow.interval_secs == Some(0) {
            return Err(ConfigError::Validation("slideshow interval_secs must be >= 1".into()));
        }
        if let Some(exts) = slideshow.extensions.as_ref() {
            if exts.is_empty() || exts.iter().any(|e| e.trim_start_matches('.').is_empty()) {
                return Err(ConfigError::Validation("slideshow extensions must be non-empty".into()));
            }
        }
    }
    if let Some(gain) = cfg.audio.as_ref().and_then(|a| a.gain) {
        if !(0.0..=1.0).contains(&gain) {
            return Err(ConfigError::Validation("audio gain must be 0.0..=1.0".into()));
        }
    }
    if let Some(asset) = cfg.audio.as_ref().and_then(|a| a.asset.as_deref()) {
        crate::storage::validate_name(asset)
            .map_err(|_| ConfigError::Validation(format!("audio asset {:?} is not a card file name", asset)))?;
    }
    if let Some(display) = cfg.display.as_ref() {
        if display.width == Some(0) || display.height == Some(0) {
            return Err(ConfigError::Validation("display width/height must be > 0".into()));
        }
        if let Some(rot) = display.rotate_deg {
            match rot {
                0 | 90 | 180 | 270 => {},
                _ => return Err(ConfigError::Validation("display rotate_deg must be 0|90|180|270".into()))
            }
        }
    }
    if cfg.network.as_ref().and_then(|n| n.port) == Some(0) {
        return Err(ConfigError::Validation("network port must be > 0".into()));
    }
    Ok(())
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn card_root(&self) -> PathBuf {
        self.card
            .as_ref()
            .and_then(|c| c.root.clone())
            .unwrap_or_else(|| PathBuf::from("/mnt/sdcard"))
    }

    pub fn hidden_names(&self) -> Vec<String> {
        self.card
            .as_ref()
            .and_then(|c| c.hidden.clone())
            .unwrap_or_else(|| vec!["System Volume Information".to_string()])
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(
            self.slideshow.as_ref().and_then(|s| s.interval_secs).unwrap_or(DEFAULT_INTERVAL_SECS),
        )
    }

    pub fn extensions(&self) -> Vec<String> {
        self.slideshow
            .as_ref()
            .and_then(|s| s.extensions.clone())
            .unwrap_or_else(|| vec!["jpg".to_string(), "jpeg".to_string()])
    }

    pub fn audio_asset(&self) -> String {
        self.audio
            .as_ref()
            .and_then(|a| a.asset.clone())
            .unwrap_or_else(|| DEFAULT_AUDIO_ASSET.to_string())
    }

    pub fn audio_gain(&self) -> f32 {
        self.audio.as_ref().and_then(|a| a.gain).unwrap_or(0.5)
    }

    pub fn audio_mono(&self) -> bool {
        self.audio.as_ref().and_then(|a| a.mono).unwrap_or(true)
    }

    pub fn audio_output(&self) -> Option<PathBuf> {
        self.audio.as_ref().and_then(|a| a.output.clone())
    }

    pub fn play_after_upload(&self) -> bool {
        self.audio.as_ref().and_then(|a| a.play_after_upload).unwrap_or(true)
    }

    pub fn display_size(&self) -> (u32, u32) {
        let d = self.display.as_ref();
        (
            d.and_then(|d| d.width).unwrap_or(320),
            d.and_then(|d| d.height).unwrap_or(240),
        )
    }

    pub fn rotate_deg(&self) -> u16 {
        self.display.as_ref().and_then(|d| d.rotate_deg).unwrap_or(0)
    }

    pub fn splash(&self) -> bool {
        self.display.as_ref().and_then(|d| d.splash).unwrap_or(true)
    }

    pub fn display_snapshot(&self) -> Option<PathBuf> {
        self.display.as_ref().and_then(|d| d.snapshot.clone())
    }

    pub fn port(&self) -> u16 {
        self.network.as_ref().and_then(|n| n.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn hostname(&self) -> String {
        self.network
            .as_ref()
            .and_then(|n| n.hostname.clone())
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string())
    }

    /// What the frame core needs out of all this
    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            extensions: self.extensions(),
            hidden: self.hidden_names(),
            interval: self.interval(),
            audio_asset: self.audio_asset(),
            play_after_upload: self.play_after_upload(),
        }
    }
}
