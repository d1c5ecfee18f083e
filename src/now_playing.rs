use std::{
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use crate::audio::{AudioSessionBridge, VolumeState};

/// Requests older than this are considered lost so polling can resume.
const INFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub state: PlayState,
}

impl Default for NowPlaying {
    fn default() -> Self {
        Self {
            title: "-".into(),
            artist: "-".into(),
            state: PlayState::Unknown,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub enum PlayState {
    Closed,
    Opened,
    Changing,
    Stopped,
    Playing,
    Paused,
    NoSession,
    #[default]
    Unknown,
}

impl PlayState {
    pub fn label(self) -> &'static str {
        match self {
            PlayState::Closed => "Closed",
            PlayState::Opened => "Opened",
            PlayState::Changing => "Changing",
            PlayState::Stopped => "Stopped",
            PlayState::Playing => "Playing",
            PlayState::Paused => "Paused",
            PlayState::NoSession => "No session",
            PlayState::Unknown => "Unknown",
        }
    }
}

/// One worker reply. The media query and the volume reading fail independently.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// When the UI sent the request this answers.
    pub requested_at: Instant,
    pub now: std::result::Result<NowPlaying, String>,
    /// `None` when the endpoint could not be read on the worker.
    pub volume: Option<VolumeState>,
}

enum SnapshotCommand {
    Fetch { requested_at: Instant },
    Shutdown,
}

fn display_text(value: String) -> String {
    if value.trim().is_empty() {
        "-".into()
    } else {
        value
    }
}

#[cfg(target_os = "windows")]
mod session {
    use std::future::IntoFuture;

    use futures::executor::block_on;
    use windows::{
        core::Result as WinResult,
        Media::Control::{
            GlobalSystemMediaTransportControlsSessionManager,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus,
        },
    };

    use super::{display_text, NowPlaying, PlayState};

    fn block_on_operation<O, T>(operation: O) -> WinResult<T>
    where
        O: IntoFuture<Output = WinResult<T>>,
    {
        block_on(operation.into_future())
    }

    pub fn fetch_now_playing() -> WinResult<NowPlaying> {
        let manager =
            block_on_operation(GlobalSystemMediaTransportControlsSessionManager::RequestAsync()?)?;
        let Ok(session) = manager.GetCurrentSession() else {
            return Ok(NowPlaying {
                state: PlayState::NoSession,
                ..Default::default()
            });
        };

        let props = block_on_operation(session.TryGetMediaPropertiesAsync()?)?;
        let status = session.GetPlaybackInfo()?.PlaybackStatus()?;

        let state = match status {
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Closed => PlayState::Closed,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Opened => PlayState::Opened,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Changing => PlayState::Changing,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped => PlayState::Stopped,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => PlayState::Playing,
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => PlayState::Paused,
            _ => PlayState::Unknown,
        };

        Ok(NowPlaying {
            title: display_text(props.Title()?.to_string_lossy()),
            artist: display_text(props.Artist()?.to_string_lossy()),
            state,
        })
    }
}

#[cfg(target_os = "windows")]
fn fetch_now_playing() -> std::result::Result<NowPlaying, String> {
    session::fetch_now_playing().map_err(|e| format!("{e:?}"))
}

#[cfg(not(target_os = "windows"))]
fn fetch_now_playing() -> std::result::Result<NowPlaying, String> {
    Err("media session queries are only supported on Windows".into())
}

fn run_worker(
    request_rx: Receiver<SnapshotCommand>,
    snapshot_tx: Sender<Snapshot>,
    call_budget: Duration,
) {
    #[cfg(target_os = "windows")]
    let _apartment = match crate::com::ComApartment::enter(
        windows::Win32::System::Com::COINIT_MULTITHREADED,
    ) {
        Ok(apartment) => apartment,
        Err(hr) => {
            log::error!("snapshot worker COM init failed: {hr:?}");
            return;
        }
    };

    let mut audio = AudioSessionBridge::system(call_budget);

    while let Ok(command) = request_rx.recv() {
        match command {
            SnapshotCommand::Fetch { requested_at } => {
                let snapshot = Snapshot {
                    requested_at,
                    now: fetch_now_playing(),
                    volume: audio.get_volume().ok(),
                };
                let _ = snapshot_tx.send(snapshot);
            }
            SnapshotCommand::Shutdown => break,
        }
    }
    log::info!("snapshot worker stopped");
}

/// Background poller for the media session and the endpoint volume.
///
/// All OS queries run on the worker thread; results travel back over a
/// channel and are applied on the UI thread.
pub struct SnapshotPoller {
    request_tx: Option<Sender<SnapshotCommand>>,
    snapshot_rx: Option<Receiver<Snapshot>>,
    inflight_since: Option<Instant>,
    last_pull: Option<Instant>,
}

impl SnapshotPoller {
    pub fn spawn(call_budget: Duration) -> Self {
        let (snapshot_tx, snapshot_rx) = mpsc::channel();
        let (request_tx, request_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("snapshot-worker".into())
            .spawn(move || run_worker(request_rx, snapshot_tx, call_budget));

        match spawned {
            Ok(_) => Self {
                request_tx: Some(request_tx),
                snapshot_rx: Some(snapshot_rx),
                inflight_since: None,
                last_pull: None,
            },
            Err(err) => {
                log::error!("failed to start snapshot worker: {err}");
                Self::disconnected()
            }
        }
    }

    pub fn disconnected() -> Self {
        Self {
            request_tx: None,
            snapshot_rx: None,
            inflight_since: None,
            last_pull: None,
        }
    }

    /// Sends a fetch if none is in flight and `interval` has passed since the last result.
    pub fn maybe_request(&mut self, interval: Duration, now: Instant) {
        if let Some(sent_at) = self.inflight_since {
            if now.duration_since(sent_at) <= INFLIGHT_TIMEOUT {
                return;
            }
            log::warn!("snapshot request timed out, polling again");
            self.inflight_since = None;
        }

        if let Some(last) = self.last_pull {
            if now.duration_since(last) < interval {
                return;
            }
        }

        if let Some(tx) = self.request_tx.as_ref() {
            match tx.send(SnapshotCommand::Fetch { requested_at: now }) {
                Ok(()) => self.inflight_since = Some(now),
                Err(_) => self.request_tx = None,
            }
        }
    }

    /// Collects every result that arrived since the last frame.
    pub fn drain(&mut self, now: Instant) -> Vec<Snapshot> {
        let mut results = Vec::new();
        if let Some(rx) = self.snapshot_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(res) => results.push(res),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.snapshot_rx = None;
                        self.request_tx = None;
                        break;
                    }
                }
            }
        }
        if !results.is_empty() {
            self.inflight_since = None;
            self.last_pull = Some(now);
        }
        results
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.request_tx.take() {
            let _ = tx.send(SnapshotCommand::Shutdown);
        }
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller_with_channels() -> (SnapshotPoller, Receiver<SnapshotCommand>, Sender<Snapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel();
        let (request_tx, request_rx) = mpsc::channel();
        let poller = SnapshotPoller {
            request_tx: Some(request_tx),
            snapshot_rx: Some(snapshot_rx),
            inflight_since: None,
            last_pull: None,
        };
        (poller, request_rx, snapshot_tx)
    }

    #[test]
    fn only_one_request_is_in_flight() {
        let (mut poller, requests, _results) = poller_with_channels();
        let t0 = Instant::now();
        poller.maybe_request(Duration::ZERO, t0);
        poller.maybe_request(Duration::ZERO, t0 + Duration::from_millis(100));
        assert_eq!(requests.try_iter().count(), 1);
    }

    #[test]
    fn stale_request_is_abandoned() {
        let (mut poller, requests, _results) = poller_with_channels();
        let t0 = Instant::now();
        poller.maybe_request(Duration::ZERO, t0);
        poller.maybe_request(Duration::ZERO, t0 + INFLIGHT_TIMEOUT + Duration::from_secs(1));
        assert_eq!(requests.try_iter().count(), 2);
    }

    #[test]
    fn results_respect_poll_interval() {
        let (mut poller, requests, results) = poller_with_channels();
        let t0 = Instant::now();
        poller.maybe_request(Duration::from_secs(1), t0);
        results
            .send(Snapshot {
                requested_at: t0,
                now: Ok(NowPlaying::default()),
                volume: None,
            })
            .unwrap();
        assert_eq!(poller.drain(t0).len(), 1);

        poller.maybe_request(Duration::from_secs(1), t0 + Duration::from_millis(500));
        poller.maybe_request(Duration::from_secs(1), t0 + Duration::from_secs(2));
        assert_eq!(requests.try_iter().count(), 2);
    }

    #[test]
    fn dropped_worker_disconnects() {
        let (mut poller, requests, results) = poller_with_channels();
        drop(results);
        drop(requests);
        assert!(poller.drain(Instant::now()).is_empty());
        assert!(poller.request_tx.is_none());
    }

    #[test]
    fn requests_carry_their_send_time() {
        let (mut poller, requests, _results) = poller_with_channels();
        let t0 = Instant::now();
        poller.maybe_request(Duration::ZERO, t0);
        match requests.try_recv() {
            Ok(SnapshotCommand::Fetch { requested_at }) => assert_eq!(requested_at, t0),
            _ => panic!("expected a fetch request"),
        }
    }

    #[test]
    fn blank_metadata_displays_as_dash() {
        assert_eq!(display_text("  ".into()), "-");
        assert_eq!(display_text("Song".into()), "Song");
    }
}
