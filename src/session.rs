//! Playback session tracking.
//!
//! One [`PlaybackTracker`] per source consumes that source's periodic
//! snapshots and decides when a play is announced ("now playing") and when
//! it is durable enough to be recorded (a scrobble). Pure in-memory state;
//! never blocks and never fails - contradictory snapshots are clamped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::scrobble::Scrobble;
use crate::source::PlayerSnapshot;

/// Tracks at or below this length are exempt from the percent rule (but not
/// from the absolute minimum-duration rule).
const SHORT_TRACK_FLOOR: Duration = Duration::from_secs(30);

/// Scrobbling thresholds, fixed for the lifetime of the loop.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Absolute minimum accumulated play time.
    pub min_duration: Duration,
    /// Minimum accumulated play time as a percentage (1-100) of track length.
    pub min_percent: u32,
}

/// An event emitted by the tracker, already carrying normalized metadata.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Transient announcement that a track started; emitted once per session.
    NowPlaying(Scrobble),
    /// A play that crossed the threshold; emitted once per session. Carries
    /// the session's play-start timestamp and accumulated play time.
    Scrobble(Scrobble),
}

/// The tracked lifetime of one contiguous play of a single track identity.
struct Session {
    /// Identity plus play-start timestamp. `duration` holds the track length
    /// for the now-playing announcement and is replaced by the accumulated
    /// play time on the scrobble event.
    candidate: Scrobble,
    length: Option<Duration>,
    accumulated: Duration,
    scrobbled: bool,
}

impl Session {
    fn start(snapshot: &PlayerSnapshot, now_utc: DateTime<Utc>) -> Self {
        // Seed from the reported elapsed position when the source supplies
        // one, clamped to the track length for contradictory reports.
        let seed = match (snapshot.position, snapshot.length) {
            (Some(position), Some(length)) => position.min(length),
            (Some(position), None) => position,
            (None, _) => Duration::ZERO,
        };

        let started = now_utc
            - chrono::Duration::from_std(seed).unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            candidate: Scrobble {
                artists: snapshot.artists.clone(),
                track: snapshot.track.clone(),
                album: snapshot.album.clone(),
                duration: snapshot.length.unwrap_or_default(),
                timestamp: started,
            },
            length: snapshot.length,
            accumulated: seed,
            scrobbled: false,
        }
    }

    fn matches(&self, snapshot: &PlayerSnapshot) -> bool {
        self.candidate.artists == snapshot.artists
            && self.candidate.track == snapshot.track
            && self.candidate.album == snapshot.album
    }
}

/// Per-source state machine deciding when to announce and when to scrobble.
pub struct PlaybackTracker {
    thresholds: Thresholds,
    session: Option<Session>,
    last_tick: Option<Instant>,
}

impl PlaybackTracker {
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            session: None,
            last_tick: None,
        }
    }

    /// Feed one snapshot into the state machine.
    ///
    /// `now` is the tick's wall-clock instant; play time advances by the
    /// delta between consecutive ticks while the source reports "playing".
    /// The snapshot must already have passed the metadata transformer;
    /// `None` means the source reported nothing playing (or its candidate
    /// was dropped).
    pub fn tick(&mut self, snapshot: Option<&PlayerSnapshot>, now: Instant) -> Vec<PlaybackEvent> {
        let delta = self
            .last_tick
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_tick = Some(now);

        let mut events = Vec::new();

        let Some(snapshot) = snapshot else {
            if let Some(session) = self.session.take() {
                debug!(track = %session.candidate.track, "source went quiet, discarding session");
            }
            return events;
        };

        match self.session.as_mut() {
            Some(session) if session.matches(snapshot) => {
                // Same identity: accumulate while playing, freeze while paused.
                if snapshot.playing {
                    session.accumulated += delta;
                }
            }
            _ => {
                if let Some(old) = self.session.take() {
                    debug!(track = %old.candidate.track, "track changed, discarding session");
                }

                // A new identity only opens a session once it is actually
                // playing; a paused track stays idle.
                if snapshot.playing {
                    let session = Session::start(snapshot, Utc::now());
                    events.push(PlaybackEvent::NowPlaying(session.candidate.clone()));
                    self.session = Some(session);
                }
            }
        }

        if let Some(session) = self.session.as_mut() {
            if !session.scrobbled && session.accumulated >= threshold(self.thresholds, session.length)
            {
                let mut scrobble = session.candidate.clone();
                scrobble.duration = session.accumulated;
                events.push(PlaybackEvent::Scrobble(scrobble));
                session.scrobbled = true;
            }
        }

        events
    }
}

/// Accumulated play time required before a play counts as a scrobble.
///
/// The lower of the absolute minimum and the percent-of-length minimum when
/// the length is known (and long enough for the percent rule to apply);
/// the absolute minimum alone otherwise.
fn threshold(thresholds: Thresholds, length: Option<Duration>) -> Duration {
    match length {
        Some(length) if length > SHORT_TRACK_FLOOR => {
            let percent = length.mul_f64(f64::from(thresholds.min_percent) / 100.0);
            thresholds.min_duration.min(percent)
        }
        _ => thresholds.min_duration,
    }
}
