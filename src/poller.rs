//! The main loop: poll every source on a fixed cadence, feed trackers,
//! dispatch events.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::session::{PlaybackTracker, Thresholds};
use crate::source::Source;
use crate::transform::Transformer;

/// Drives the system for the process's lifetime: one tick per poll
/// interval, no concurrent ticks. Each source owns its own tracker; sources
/// never share or merge state.
pub struct Poller {
    sources: Vec<Box<dyn Source>>,
    trackers: HashMap<String, PlaybackTracker>,
    transformer: Transformer,
    dispatcher: Dispatcher,
    thresholds: Thresholds,
    interval: Duration,
}

impl Poller {
    #[must_use]
    pub fn new(config: &Config, sources: Vec<Box<dyn Source>>, dispatcher: Dispatcher) -> Self {
        let thresholds = Thresholds {
            min_duration: Duration::from_secs(config.min_playback_duration),
            min_percent: config.min_playback_percent,
        };

        Self {
            sources,
            trackers: HashMap::new(),
            transformer: Transformer::from_config(config),
            dispatcher,
            thresholds,
            interval: Duration::from_secs(config.poll_rate),
        }
    }

    /// Run until ctrl-c. A tick always runs to completion before the next
    /// one starts; a slow source or sink delays the tick, never overlaps it.
    pub async fn run(&mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.sources.len(),
            "starting poll loop"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal, stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&mut self) {
        for source in &self.sources {
            let snapshot = match source.poll().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // A failed poll counts as nothing playing for this tick.
                    warn!(source = source.name(), error = %e, "source poll failed");
                    None
                }
            };

            let snapshot = snapshot.and_then(|s| self.transformer.apply(s));

            let tracker = self
                .trackers
                .entry(source.name().to_string())
                .or_insert_with(|| PlaybackTracker::new(self.thresholds));

            let events = tracker.tick(snapshot.as_ref(), Instant::now());
            for event in events {
                self.dispatcher.dispatch(&event).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::scrobble::Scrobble;
    use crate::sink::Sink;
    use crate::source::PlayerSnapshot;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct ScriptedSource {
        name: &'static str,
        snapshots: Mutex<Vec<Result<Option<PlayerSnapshot>>>>,
    }

    #[async_trait]
    impl Source for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn poll(&self) -> Result<Option<PlayerSnapshot>> {
            self.snapshots
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(None))
        }
    }

    fn playing(artist: &str, track: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            artists: vec![artist.to_string()],
            track: track.to_string(),
            album: "Album".to_string(),
            length: None,
            position: None,
            playing: true,
        }
    }

    fn poller_with(
        config: &Config,
        script: Vec<Result<Option<PlayerSnapshot>>>,
    ) -> (Poller, std::sync::Arc<CapturedEvents>) {
        let captured = std::sync::Arc::new(CapturedEvents::default());
        let source = ScriptedSource {
            name: "scripted",
            snapshots: Mutex::new(script),
        };
        let sink = ForwardingSink {
            events: captured.clone(),
        };
        let dispatcher = Dispatcher::new(vec![Box::new(sink)], None, false, false);
        let poller = Poller::new(config, vec![Box::new(source)], dispatcher);
        (poller, captured)
    }

    #[derive(Default)]
    struct CapturedEvents {
        now_playing: Mutex<Vec<Scrobble>>,
        scrobbles: Mutex<Vec<Scrobble>>,
    }

    struct ForwardingSink {
        events: std::sync::Arc<CapturedEvents>,
    }

    #[async_trait]
    impl Sink for ForwardingSink {
        fn name(&self) -> &str {
            "forwarding"
        }

        async fn now_playing(&self, scrobble: &Scrobble) -> Result<()> {
            self.events.now_playing.lock().unwrap().push(scrobble.clone());
            Ok(())
        }

        async fn scrobble(&self, scrobble: &Scrobble) -> Result<()> {
            self.events.scrobbles.lock().unwrap().push(scrobble.clone());
            Ok(())
        }

        async fn scrobbles(
            &self,
            _limit: i64,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Scrobble>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_playing_snapshot_reaches_sink_as_now_playing() {
        let config = Config::default();
        // Scripts pop from the back.
        let (mut poller, captured) = poller_with(&config, vec![Ok(Some(playing("A", "T")))]);

        poller.tick().await;

        let events = captured.now_playing.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track, "T");
    }

    #[tokio::test]
    async fn test_poll_error_is_treated_as_nothing_playing() {
        let config = Config::default();
        let (mut poller, captured) =
            poller_with(&config, vec![Err(Error::other("bus is down"))]);

        poller.tick().await;

        assert!(captured.now_playing.lock().unwrap().is_empty());
        assert!(captured.scrobbles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blacklisted_candidate_never_reaches_a_sink() {
        let config = Config {
            blacklist: vec!["Nickelback".to_string()],
            ..Config::default()
        };
        let (mut poller, captured) = poller_with(
            &config,
            vec![
                Ok(Some(playing("Nickelback", "Photograph"))),
                Ok(Some(playing("Nickelback", "Photograph"))),
            ],
        );

        poller.tick().await;
        poller.tick().await;

        assert!(captured.now_playing.lock().unwrap().is_empty());
        assert!(captured.scrobbles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_rules_run_before_events_are_emitted() {
        let config = Config {
            regexes: vec![crate::config::RegexRule {
                pattern: r"\s*\(Remastered.*\)".to_string(),
                replace: String::new(),
                track: true,
                ..crate::config::RegexRule::default()
            }],
            ..Config::default()
        };
        let (mut poller, captured) = poller_with(
            &config,
            vec![Ok(Some(playing("John Lennon", "Imagine (Remastered 2010)")))],
        );

        poller.tick().await;

        let events = captured.now_playing.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track, "Imagine");
    }
}
