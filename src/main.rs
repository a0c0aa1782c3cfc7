/*
 *  main.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
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

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use local_ip_address::local_ip;
use log::{error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use photoframe::audio::{AudioStreamer, NullSink, PcmSink, WavStreamer};
use photoframe::config::{self, Config};
use photoframe::display::{DisplayDriver, HeadlessDriver, PanelPainter};
use photoframe::storage::DirCard;
use photoframe::{run_slideshow_loop, LoopEvent, PhotoFrame};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const POLL: Duration = Duration::from_millis(100);

/// SIGINT, SIGTERM or SIGHUP end the run; SIGUSR1 is the button and SIGUSR2
/// plays the audio asset
async fn signal_handler(events: mpsc::Sender<LoopEvent>) -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    loop {
        let event = tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received. Initiating graceful shutdown.");
                LoopEvent::Shutdown
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received. Initiating graceful shutdown.");
                LoopEvent::Shutdown
            }
            _ = sighup.recv() => {
                info!("SIGHUP received. Initiating graceful shutdown.");
                LoopEvent::Shutdown
            }
            _ = sigusr1.recv() => LoopEvent::Button,
            _ = sigusr2.recv() => LoopEvent::PlayAudio,
        };
        if events.send(event).await.is_err() || event == LoopEvent::Shutdown {
            return Ok(());
        }
    }
}

fn build_streamer(cfg: &Config) -> anyhow::Result<Box<dyn AudioStreamer>> {
    let gain = cfg.audio_gain();
    let mono = cfg.audio_mono();
    Ok(match cfg.audio_output() {
        Some(path) => {
            let out = File::create(&path).with_context(|| format!("audio output {}", path.display()))?;
            info!("audio: raw PCM to {}", path.display());
            Box::new(WavStreamer::new(PcmSink::new(BufWriter::new(out)), gain, mono))
        }
        None => {
            info!("audio: no output configured, playback is silent");
            Box::new(WavStreamer::new(NullSink::new(), gain, mono))
        }
    })
}

fn build_driver(cfg: &Config) -> anyhow::Result<HeadlessDriver> {
    let (width, height) = cfg.display_size();
    let mut driver = HeadlessDriver::new(width, height);
    if let Some(path) = cfg.display_snapshot() {
        driver = driver.with_snapshot(path);
    }
    driver.set_rotation(cfg.rotate_deg())?;
    Ok(driver)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} - one card, one bus, many hands", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let painter = PanelPainter::new(build_driver(&cfg)?)?;
    let card_root = cfg.card_root();
    info!("card at {}", card_root.display());

    let frame = Arc::new(PhotoFrame::new(
        Box::new(DirCard::new(card_root)),
        Box::new(painter),
        build_streamer(&cfg)?,
        cfg.frame_settings(),
    ));

    if cfg.splash() {
        let inet = match local_ip() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                warn!("no local address: {}", e);
                "0.0.0.0".to_string()
            }
        };
        let text = format!(
            "use your browser to connect to\nhttp://{}:{}\nor http://{}",
            inet,
            cfg.port(),
            cfg.hostname()
        );
        if let Err(e) = frame.show_message(&text) {
            warn!("splash: {}", e);
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    {
        let frame = Arc::clone(&frame);
        match tokio::task::spawn_blocking(move || frame.boot()).await? {
            Ok(count) => info!("{} image(s), slideshow running", count),
            Err(e) => error!("boot failed: {}; press the button to retry", e),
        }
    }

    let (tx, rx) = mpsc::channel(16);
    let signals = tokio::spawn(signal_handler(tx));
    run_slideshow_loop(Arc::clone(&frame), rx, POLL).await;

    signals.abort();
    info!("final state {}", frame.status_json()?);
    info!("Exiting application.");
    Ok(())
}
