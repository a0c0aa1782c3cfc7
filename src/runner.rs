/*
 *  runner.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Slideshow loop: interval timer, button presses and audio triggers
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

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::error::FrameError;
use crate::frame::PhotoFrame;
use crate::slideshow::{Advance, SlideshowPhase, Ticker};

/// Inputs to the slideshow loop besides the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// Physical button
    Button,
    Jump(usize),
    PlayAudio,
    Shutdown,
}

/// Run `op` on the blocking pool; card and panel work never sits on the
/// async workers
async fn blocking<T, F>(frame: &Arc<PhotoFrame>, what: &'static str, op: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&PhotoFrame) -> Result<T, FrameError> + Send + 'static,
{
    let frame = Arc::clone(frame);
    match tokio::task::spawn_blocking(move || op(&frame)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{}: {}", what, e);
            None
        }
        Err(e) => {
            error!("{} worker failed: {}", what, e);
            None
        }
    }
}

fn log_advance(what: &str, outcome: &Advance) {
    match outcome {
        Advance::Shown(entry) => debug!("{}: {} [{}]", what, entry.name, entry.ordinal),
        Advance::Dropped => debug!("{}: dropped, slideshow stopped", what),
        Advance::NoImages => debug!("{}: nothing to show", what),
    }
}

/// Drive the slideshow until `Shutdown` or until every sender is gone.
///
/// The interval is checked every `poll`; a late check still yields a single
/// advance, and so does the first check after a stop (audio playback, say)
/// that outlasted the interval. Parked on the "no images" screen the timer
/// is held back, and any manual advance restarts it.
pub async fn run_slideshow_loop(frame: Arc<PhotoFrame>, mut events: mpsc::Receiver<LoopEvent>, poll: Duration) {
    let mut ticker = Ticker::new(Instant::now());
    info!("slideshow loop started, interval {:?}", frame.slideshow().interval());

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    info!("slideshow loop: all event sources closed");
                    break;
                };
                match event {
                    LoopEvent::Shutdown => {
                        info!("slideshow loop: shutdown requested");
                        break;
                    }
                    LoopEvent::Button => {
                        if let Some(outcome) = blocking(&frame, "button", |f| f.button()).await {
                            log_advance("button", &outcome);
                        }
                        ticker.reset(Instant::now());
                    }
                    LoopEvent::Jump(ordinal) => {
                        if let Some(outcome) = blocking(&frame, "jump", move |f| f.jump_to(ordinal)).await {
                            log_advance("jump", &outcome);
                        }
                        ticker.reset(Instant::now());
                    }
                    LoopEvent::PlayAudio => {
                        if let Some(session) = blocking(&frame, "play audio", |f| f.request_play_audio()).await {
                            // the session hands the card back by itself; this only reports
                            tokio::task::spawn_blocking(move || {
                                if let Err(e) = session.wait() {
                                    warn!("audio session: {}", e);
                                }
                            });
                        }
                    }
                }
            }
            _ = tokio::time::sleep(poll) => {
                let now = Instant::now();
                let slideshow = frame.slideshow();
                if slideshow.phase() == SlideshowPhase::Stopped {
                    // ticks missed here fold into one advance after resume
                    continue;
                }
                if slideshow.timer_suspended() {
                    ticker.reset(now);
                    continue;
                }
                if ticker.due(now, slideshow.interval()) {
                    if let Some(outcome) = blocking(&frame, "tick", |f| f.advance()).await {
                        log_advance("tick", &outcome);
                    }
                }
            }
        }
    }
}
