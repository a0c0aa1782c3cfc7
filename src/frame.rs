/*
 *  frame.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  The frame: wires card, panel, catalog, slideshow, audio and viewers
 *  together and answers the control surface
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

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::audio::{AudioPhase, AudioSession, AudioSessionManager, AudioStreamer};
use crate::bus::{Bus, BusArbiter};
use crate::catalog::{CatalogEntry, ImageCatalog};
use crate::display::painter::Painter;
use crate::error::FrameError;
use crate::notify::{FrameChanged, ViewerHandle, ViewerId, ViewerRegistry};
use crate::slideshow::{Advance, SlideshowController, SlideshowPhase};
use crate::storage::{validate_name, CardDriver, MountMode, StorageAdapter, StorageError};

pub const MOUNT_FAILED_MESSAGE: &str = "SD card mount failed";

/// Uploads are written this many bytes at a time
pub const UPLOAD_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct FrameSettings {
    /// Image extensions, without the dot
    pub extensions: Vec<String>,
    /// Names left out of file listings
    pub hidden: Vec<String>,
    pub interval: Duration,
    pub audio_asset: String,
    /// Play the audio asset after each upload, if it is on the card
    pub play_after_upload: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            hidden: vec!["System Volume Information".to_string()],
            interval: Duration::from_secs(10),
            audio_asset: "music.wav".to_string(),
            play_after_upload: true,
        }
    }
}

/// How an upload ended
pub struct UploadOutcome {
    /// Catalog size after the rebuild
    pub count: usize,
    /// Set when the upload kicked off playback
    pub audio: Option<AudioSession>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    /// (name, reason)
    pub failed: Vec<(String, String)>,
    pub count: usize,
}

impl DeleteReport {
    pub fn all_deleted(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Point in time view for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct FrameStatus {
    pub count: usize,
    pub current: usize,
    pub displayed: Option<String>,
    pub slideshow: SlideshowPhase,
    pub audio: AudioPhase,
    pub audio_error: Option<String>,
    pub mount: MountMode,
    pub interval_secs: u64,
    pub viewers: usize,
    pub last_advance: Option<DateTime<Local>>,
}

fn copy_chunks(source: &mut dyn Read, out: &mut dyn Write) -> std::io::Result<usize> {
    let mut buf = [0u8; UPLOAD_CHUNK];
    let mut written = 0usize;
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n;
    }
    out.flush()?;
    Ok(written)
}

pub struct PhotoFrame {
    arbiter: Arc<BusArbiter>,
    catalog: Arc<ImageCatalog>,
    slideshow: Arc<SlideshowController>,
    audio: Arc<AudioSessionManager>,
    viewers: Arc<ViewerRegistry>,
    mode_rx: watch::Receiver<MountMode>,
    settings: FrameSettings,
}

impl PhotoFrame {
    pub fn new(
        card: Box<dyn CardDriver>,
        painter: Box<dyn Painter>,
        streamer: Box<dyn AudioStreamer>,
        settings: FrameSettings,
    ) -> Self {
        let storage = StorageAdapter::new(card);
        let mode_rx = storage.subscribe_mode();
        let arbiter = Arc::new(BusArbiter::new(Bus { storage, painter }));
        let catalog = Arc::new(ImageCatalog::new(Arc::clone(&arbiter), &settings.extensions));
        let viewers = Arc::new(ViewerRegistry::new());
        let slideshow = Arc::new(SlideshowController::new(
            Arc::clone(&arbiter),
            Arc::clone(&catalog),
            Arc::clone(&viewers),
            settings.interval,
        ));
        let audio = Arc::new(AudioSessionManager::new(
            Arc::clone(&arbiter),
            Arc::clone(&slideshow),
            streamer,
            settings.audio_asset.clone(),
        ));
        Self { arbiter, catalog, slideshow, audio, viewers, mode_rx, settings }
    }

    pub fn slideshow(&self) -> &SlideshowController {
        &self.slideshow
    }

    pub fn audio(&self) -> &AudioSessionManager {
        &self.audio
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    /// Scan the card and start the slideshow. A card that will not mount
    /// leaves the mount failure message on the panel; the next user action
    /// retries.
    pub fn boot(&self) -> Result<usize, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| match self.catalog.rebuild_locked(bus) {
            Ok(count) => {
                info!("boot: {} image(s) on the card", count);
                self.resume_after_scan(bus);
                Ok(count)
            }
            Err(e) => {
                error!("boot: {}", e);
                if e.is_mount_failure() {
                    self.slideshow.blank_locked(bus);
                    bus.painter.show_message(MOUNT_FAILED_MESSAGE)?;
                }
                Err(e)
            }
        })
    }

    /// Full screen text, e.g. the connection screen
    pub fn show_message(&self, text: &str) -> Result<(), FrameError> {
        self.arbiter.with_exclusive_bus(|bus| Ok(bus.painter.show_message(text)?))
    }

    /// Audio owns the card from the first phase change until it is back in
    /// filesystem mode
    fn ensure_card_free(&self, bus: &Bus) -> Result<(), FrameError> {
        if self.audio.phase().is_active() || bus.storage.mode() == MountMode::Raw {
            return Err(FrameError::AudioActive);
        }
        Ok(())
    }

    fn resume_after_scan(&self, bus: &mut Bus) {
        self.slideshow.rewind_locked(bus);
        if let Err(e) = self.slideshow.resume_locked(bus) {
            warn!("slideshow resume: {}", e);
        }
    }

    /// Re-read the card from scratch. Also the way back from a failed mount.
    pub fn rescan(&self) -> Result<usize, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| {
            self.ensure_card_free(bus)?;
            let count = self.catalog.rebuild_locked(bus)?;
            self.resume_after_scan(bus);
            Ok(count)
        })
    }

    pub fn request_upload(&self, name: &str, bytes: &[u8]) -> Result<UploadOutcome, FrameError> {
        self.request_upload_from(name, &mut &bytes[..])
    }

    /// Write `name` from `source` in chunks, rebuild, then either play the
    /// audio asset or resume the slideshow from the top. Refused outright
    /// while audio owns the card.
    pub fn request_upload_from(&self, name: &str, source: &mut dyn Read) -> Result<UploadOutcome, FrameError> {
        let name = validate_name(name)?.to_string();

        let (count, play) = self.arbiter.with_exclusive_bus(|bus| {
            self.ensure_card_free(bus)?;
            bus.storage.mount_filesystem()?;

            let mut out = bus.storage.open_for_write_truncate(&name)?;
            let copied = copy_chunks(source, &mut out);
            drop(out);
            let written = match copied {
                Ok(written) => written,
                Err(e) => {
                    // a truncated file must not reach the catalog
                    if let Err(rm) = bus.storage.remove(&name) {
                        warn!("removing partial {}: {}", name, rm);
                    }
                    return Err(FrameError::from(StorageError::from(e)));
                }
            };
            info!("uploaded {} ({} bytes)", name, written);

            let count = self.catalog.rebuild_locked(bus)?;
            self.slideshow.rewind_locked(bus);
            let play = self.settings.play_after_upload && bus.storage.exists(&self.settings.audio_asset)?;
            if !play {
                if let Err(e) = self.slideshow.resume_locked(bus) {
                    warn!("slideshow resume: {}", e);
                }
            }
            Ok::<_, FrameError>((count, play))
        })?;

        let audio = if play {
            match self.audio.request_play() {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("play after upload: {}", e);
                    self.resume_if_card_free();
                    None
                }
            }
        } else {
            None
        };
        Ok(UploadOutcome { count, audio })
    }

    fn resume_if_card_free(&self) {
        let resumed = self.arbiter.with_exclusive_bus(|bus| {
            self.ensure_card_free(bus)?;
            self.slideshow.resume_locked(bus)
        });
        if let Err(e) = resumed {
            warn!("slideshow resume: {}", e);
        }
    }

    /// Delete a batch in one bus hold. Each name is checked, then removed;
    /// failures are collected rather than stopping the batch.
    pub fn request_delete<S: AsRef<str>>(&self, names: &[S]) -> Result<DeleteReport, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| {
            self.ensure_card_free(bus)?;
            bus.storage.mount_filesystem()?;

            let mut report = DeleteReport::default();
            for raw in names {
                let raw = raw.as_ref();
                let outcome = validate_name(raw).and_then(|name| bus.storage.remove(name));
                match outcome {
                    Ok(()) => {
                        info!("deleted {}", raw);
                        report.deleted.push(raw.to_string());
                    }
                    Err(e) => {
                        warn!("delete {}: {}", raw, e);
                        report.failed.push((raw.to_string(), e.to_string()));
                    }
                }
            }

            report.count = self.catalog.rebuild_locked(bus)?;
            self.resume_after_scan(bus);
            Ok(report)
        })
    }

    pub fn request_play_audio(&self) -> Result<AudioSession, FrameError> {
        self.audio.request_play()
    }

    pub fn request_set_interval(&self, secs: u64) -> Result<(), FrameError> {
        self.slideshow.set_interval(secs)
    }

    pub fn request_view_register(&self, handle: ViewerHandle) -> ViewerId {
        self.viewers.register(handle)
    }

    pub fn request_view_unregister(&self, id: ViewerId) -> bool {
        self.viewers.unregister(id)
    }

    pub fn subscribe_viewer(&self) -> (ViewerId, mpsc::UnboundedReceiver<FrameChanged>) {
        self.viewers.subscribe()
    }

    pub fn advance(&self) -> Result<Advance, FrameError> {
        self.slideshow.advance()
    }

    pub fn jump_to(&self, ordinal: usize) -> Result<Advance, FrameError> {
        self.slideshow.jump_to(ordinal)
    }

    /// Physical button: next image, or a fresh mount attempt if the card
    /// never came up
    pub fn button(&self) -> Result<Advance, FrameError> {
        if self.mount_mode() == MountMode::Unmounted {
            info!("button: retrying card");
            return self.arbiter.with_exclusive_bus(|bus| {
                self.ensure_card_free(bus)?;
                self.catalog.rebuild_locked(bus)?;
                self.slideshow.rewind_locked(bus);
                self.slideshow.resume_locked(bus)
            });
        }
        self.advance()
    }

    /// Every non-hidden file on the card, images or not
    pub fn list_files(&self) -> Result<Vec<String>, FrameError> {
        let hidden = &self.settings.hidden;
        self.arbiter.with_exclusive_bus(|bus| {
            self.ensure_card_free(bus)?;
            bus.storage.mount_filesystem()?;
            Ok(bus
                .storage
                .list_entries(|name| !hidden.iter().any(|h| h.eq_ignore_ascii_case(name)))?)
        })
    }

    /// Name and bytes of the image on the panel. The name is read without the
    /// arbiter, the file with it.
    pub fn read_current_image(&self) -> Result<Option<(Arc<str>, Vec<u8>)>, FrameError> {
        let Some(name) = self.slideshow.displayed() else {
            return Ok(None);
        };
        let bytes = self.arbiter.with_exclusive_bus(|bus| {
            if bus.storage.mode() == MountMode::Raw {
                return Err(FrameError::AudioActive);
            }
            let mut stream = bus.storage.open_for_read(&name)?;
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).map_err(StorageError::from)?;
            Ok(bytes)
        })?;
        Ok(Some((name, bytes)))
    }

    pub fn count(&self) -> usize {
        self.catalog.count()
    }

    pub fn catalog(&self) -> Arc<[CatalogEntry]> {
        self.catalog.snapshot()
    }

    pub fn displayed(&self) -> Option<Arc<str>> {
        self.slideshow.displayed()
    }

    pub fn audio_phase(&self) -> AudioPhase {
        self.audio.phase()
    }

    pub fn mount_mode(&self) -> MountMode {
        *self.mode_rx.borrow()
    }

    pub fn status(&self) -> FrameStatus {
        FrameStatus {
            count: self.count(),
            current: self.slideshow.current(),
            displayed: self.displayed().map(|n| n.to_string()),
            slideshow: self.slideshow.phase(),
            audio: self.audio.phase(),
            audio_error: self.audio.last_error(),
            mount: self.mount_mode(),
            interval_secs: self.slideshow.interval().as_secs(),
            viewers: self.viewers.len(),
            last_advance: self.slideshow.last_advance(),
        }
    }

    pub fn status_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::ScriptedStreamer;
    use crate::display::mock::{MockDisplay, Painted};
    use crate::storage::mock::MockCard;
    use std::thread;

    struct Rig {
        card: MockCard,
        display: MockDisplay,
        frame: PhotoFrame,
    }

    fn rig_with(names: &[&str], streamer: ScriptedStreamer, settings: FrameSettings) -> Rig {
        let card = MockCard::with_files(names);
        let display = MockDisplay::new();
        let frame = PhotoFrame::new(Box::new(card.clone()), Box::new(display.clone()), Box::new(streamer), settings);
        Rig { card, display, frame }
    }

    fn rig(names: &[&str]) -> Rig {
        rig_with(names, ScriptedStreamer::new(), FrameSettings::default())
    }

    #[test]
    fn test_boot_shows_first_image() {
        let r = rig(&["a.jpg", "b.jpg"]);
        assert_eq!(r.frame.boot().unwrap(), 2);
        assert_eq!(r.frame.displayed().as_deref(), Some("a.jpg"));
        assert_eq!(r.frame.slideshow().phase(), SlideshowPhase::RunningIdle);
    }

    #[test]
    fn test_reboot_without_card_clears_displayed_name() {
        let r = rig(&["a.jpg"]);
        r.frame.boot().unwrap();
        assert_eq!(r.frame.displayed().as_deref(), Some("a.jpg"));

        r.frame
            .arbiter
            .with_exclusive_bus(|bus| {
                bus.storage.unmount();
                Ok::<_, FrameError>(())
            })
            .unwrap();
        r.card.state().lock().unwrap().present = false;
        assert!(r.frame.boot().unwrap_err().is_mount_failure());
        assert!(r.frame.displayed().is_none());
        assert!(r.frame.status().displayed.is_none());
    }

    #[test]
    fn test_boot_without_card() {
        let r = rig(&["a.jpg"]);
        r.card.state().lock().unwrap().present = false;
        assert!(r.frame.boot().unwrap_err().is_mount_failure());
        assert_eq!(r.display.messages(), vec![MOUNT_FAILED_MESSAGE]);

        // no automatic retry; the button is the user action that retries
        r.card.state().lock().unwrap().present = true;
        r.frame.button().unwrap();
        assert_eq!(r.frame.count(), 1);
        assert_eq!(r.frame.displayed().as_deref(), Some("a.jpg"));
    }

    #[test]
    fn test_upload_rebuilds_and_plays_when_asset_present() {
        let r = rig(&["a.jpg", "music.wav"]);
        r.frame.boot().unwrap();
        let outcome = r.frame.request_upload("new.jpg", b"new.jpg").unwrap();
        assert_eq!(outcome.count, 2);
        assert_eq!(r.card.file("new.jpg").unwrap(), b"new.jpg");

        outcome.audio.expect("audio session").wait().unwrap();
        assert_eq!(r.frame.audio_phase(), AudioPhase::Idle);
        assert_eq!(r.frame.slideshow().current(), 0);
        assert_eq!(r.frame.displayed().as_deref(), Some("a.jpg"));
    }

    #[test]
    fn test_upload_without_asset_resumes_from_top() {
        let r = rig(&["b.jpg", "c.jpg"]);
        r.frame.boot().unwrap();
        r.frame.advance().unwrap();
        assert_eq!(r.frame.slideshow().current(), 1);

        let outcome = r.frame.request_upload("a.jpg", b"a.jpg").unwrap();
        assert!(outcome.audio.is_none());
        assert_eq!(outcome.count, 3);
        assert_eq!(r.frame.slideshow().current(), 0);
        assert_eq!(r.frame.displayed().as_deref(), Some("b.jpg"));
    }

    #[test]
    fn test_upload_in_chunks() {
        let r = rig(&[]);
        r.frame.boot().unwrap();
        let big: Vec<u8> = (0..UPLOAD_CHUNK * 2 + 17).map(|i| (i % 251) as u8).collect();
        r.frame.request_upload("big.jpg", &big).unwrap();
        assert_eq!(r.card.file("big.jpg").unwrap(), big);
    }

    /// Hands out `good` bytes, then fails
    struct BrokenUpload {
        good: usize,
    }

    impl Read for BrokenUpload {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.good == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away"));
            }
            let n = buf.len().min(self.good);
            buf[..n].fill(0xAB);
            self.good -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_failed_upload_leaves_no_partial_file() {
        let r = rig(&["a.jpg"]);
        r.frame.boot().unwrap();
        let mut source = BrokenUpload { good: UPLOAD_CHUNK + 10 };

        let err = r.frame.request_upload_from("half.jpg", &mut source).err().unwrap();
        assert!(matches!(err, FrameError::Storage(StorageError::Io(_))));
        assert!(r.card.file("half.jpg").is_none());

        r.frame.rescan().unwrap();
        assert_eq!(r.frame.count(), 1);
    }

    #[test]
    fn test_upload_rejected_while_streaming() {
        let (streamer, gate) = ScriptedStreamer::new().gated();
        let r = rig_with(&["a.jpg", "music.wav"], streamer, FrameSettings::default());
        r.frame.boot().unwrap();
        let session = r.frame.request_play_audio().unwrap();
        while r.frame.audio_phase() != AudioPhase::Streaming {
            thread::yield_now();
        }
        let events_before = r.card.state().lock().unwrap().events.len();

        assert!(matches!(r.frame.request_upload("x.jpg", b"x"), Err(FrameError::AudioActive)));
        assert!(matches!(r.frame.request_delete(&["a.jpg"]), Err(FrameError::AudioActive)));
        assert!(matches!(r.frame.list_files(), Err(FrameError::AudioActive)));
        assert!(matches!(r.frame.read_current_image(), Err(FrameError::AudioActive)));
        assert!(matches!(r.frame.rescan(), Err(FrameError::AudioActive)));

        let state = r.card.state();
        assert_eq!(state.lock().unwrap().events.len(), events_before);
        assert!(!state.lock().unwrap().overlap_detected);
        assert!(r.card.file("x.jpg").is_none());

        drop(gate);
        session.wait().unwrap();
        assert!(r.frame.request_upload("x.jpg", b"x").is_ok());
    }

    #[test]
    fn test_upload_bad_name() {
        let r = rig(&[]);
        assert!(matches!(
            r.frame.request_upload("../etc/passwd", b"x"),
            Err(FrameError::Storage(StorageError::InvalidName(_)))
        ));
    }

    #[test]
    fn test_delete_batch_reports_failures() {
        let r = rig(&["a.jpg", "b.jpg", "c.jpg"]);
        r.frame.boot().unwrap();
        let report = r.frame.request_delete(&["a.jpg", "zz.jpg", "c.jpg", "../x"]).unwrap();

        assert_eq!(report.deleted, vec!["a.jpg", "c.jpg"]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.all_deleted());
        assert_eq!(report.count, 1);
        assert_eq!(r.frame.displayed().as_deref(), Some("b.jpg"));
    }

    #[test]
    fn test_delete_everything_shows_no_images() {
        let r = rig(&["a.jpg"]);
        r.frame.boot().unwrap();
        let report = r.frame.request_delete(&["a.jpg"]).unwrap();
        assert!(report.all_deleted());
        assert_eq!(r.frame.count(), 0);
        assert!(r.frame.displayed().is_none());
        assert!(r.frame.status().displayed.is_none());
        assert!(matches!(r.frame.read_current_image(), Ok(None)));
        assert_eq!(
            r.display.painted().last(),
            Some(&Painted::Message(crate::slideshow::NO_IMAGES_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_list_files_skips_hidden() {
        let r = rig(&["a.jpg", "music.wav", "System Volume Information", "notes.txt"]);
        r.frame.boot().unwrap();
        assert_eq!(r.frame.list_files().unwrap(), vec!["a.jpg", "music.wav", "notes.txt"]);
    }

    #[test]
    fn test_read_current_image() {
        let r = rig(&["a.jpg"]);
        assert!(r.frame.read_current_image().unwrap().is_none());
        r.frame.boot().unwrap();
        let (name, bytes) = r.frame.read_current_image().unwrap().unwrap();
        assert_eq!(&*name, "a.jpg");
        assert_eq!(bytes, b"a.jpg");
    }

    #[test]
    fn test_status_snapshot() {
        let r = rig(&["a.jpg", "b.jpg"]);
        r.frame.boot().unwrap();
        let (_id, _rx) = r.frame.subscribe_viewer();
        r.frame.request_set_interval(4).unwrap();

        let status = r.frame.status();
        assert_eq!(status.count, 2);
        assert_eq!(status.displayed.as_deref(), Some("a.jpg"));
        assert_eq!(status.mount, MountMode::Filesystem);
        assert_eq!(status.interval_secs, 4);
        assert_eq!(status.viewers, 1);
        assert!(status.last_advance.is_some());

        let json: serde_json::Value = serde_json::from_str(&r.frame.status_json().unwrap()).unwrap();
        assert_eq!(json["audio"], "idle");
        assert_eq!(json["slideshow"], "running_idle");
        assert_eq!(json["mount"], "filesystem");
    }

    #[test]
    fn test_viewer_register_unregister() {
        let r = rig(&["a.jpg", "b.jpg"]);
        r.frame.boot().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = r.frame.request_view_register(tx);
        r.frame.advance().unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(r.frame.request_view_unregister(id));
        r.frame.advance().unwrap();
        assert!(rx.try_recv().is_err());
    }
}
