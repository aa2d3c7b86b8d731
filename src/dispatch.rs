//! Event dispatcher: fans tracker events out to every configured sink.

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::notify::Notifier;
use crate::scrobble::Scrobble;
use crate::session::PlaybackEvent;
use crate::sink::Sink;

/// Delivers events to all sinks, isolating per-sink failures.
///
/// No retry and no deduplication: a failed delivery loses that event for
/// that sink only. All calls for one event run concurrently and are awaited
/// before the dispatcher returns, so the tick ordering guarantee holds.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    notifier: Option<Notifier>,
    notify_on_scrobble: bool,
    notify_on_error: bool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sinks: Vec<Box<dyn Sink>>,
        notifier: Option<Notifier>,
        notify_on_scrobble: bool,
        notify_on_error: bool,
    ) -> Self {
        Self {
            sinks,
            notifier,
            notify_on_scrobble,
            notify_on_error,
        }
    }

    pub async fn dispatch(&self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::NowPlaying(scrobble) => self.dispatch_now_playing(scrobble).await,
            PlaybackEvent::Scrobble(scrobble) => self.dispatch_scrobble(scrobble).await,
        }
    }

    async fn dispatch_now_playing(&self, scrobble: &Scrobble) {
        debug!(
            artists = %scrobble.join_artists(),
            track = %scrobble.track,
            "dispatching now playing"
        );

        let outcomes = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name(), sink.now_playing(scrobble).await)
        }))
        .await;

        for (name, outcome) in outcomes {
            if let Err(e) = outcome {
                error!(sink = name, error = %e, "error sending now playing");
            }
        }
    }

    async fn dispatch_scrobble(&self, scrobble: &Scrobble) {
        info!(
            artists = %scrobble.join_artists(),
            track = %scrobble.track,
            played = %scrobble.pretty_duration(),
            "scrobbling"
        );

        let outcomes = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name(), sink.scrobble(scrobble).await)
        }))
        .await;

        let mut failed = false;
        for (name, outcome) in outcomes {
            if let Err(e) = outcome {
                failed = true;
                error!(sink = name, error = %e, "error sending scrobble");
            }
        }

        let Some(ref notifier) = self.notifier else {
            return;
        };

        let body = format!("{} - {}", scrobble.join_artists(), scrobble.track);
        if failed && self.notify_on_error {
            notifier.send("Scrobble failed", &body).await;
        } else if !failed && self.notify_on_scrobble {
            notifier.send("Scrobbled", &body).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        now_playing: AtomicU32,
        scrobbles: AtomicU32,
    }

    struct RecordingSink {
        name: &'static str,
        fail: bool,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            self.name
        }

        async fn now_playing(&self, _scrobble: &Scrobble) -> Result<()> {
            self.counters.now_playing.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::other("boom"));
            }
            Ok(())
        }

        async fn scrobble(&self, _scrobble: &Scrobble) -> Result<()> {
            self.counters.scrobbles.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::other("boom"));
            }
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

    fn scrobble() -> Scrobble {
        Scrobble {
            artists: vec!["A".to_string()],
            track: "T".to_string(),
            album: "L".to_string(),
            duration: Duration::from_secs(200),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let failing = Arc::new(Counters::default());
        let healthy = Arc::new(Counters::default());

        let dispatcher = Dispatcher::new(
            vec![
                Box::new(RecordingSink {
                    name: "bad",
                    fail: true,
                    counters: failing.clone(),
                }),
                Box::new(RecordingSink {
                    name: "good",
                    fail: false,
                    counters: healthy.clone(),
                }),
            ],
            None,
            false,
            false,
        );

        dispatcher
            .dispatch(&PlaybackEvent::Scrobble(scrobble()))
            .await;

        assert_eq!(failing.scrobbles.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.scrobbles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_now_playing_goes_to_every_sink() {
        let a = Arc::new(Counters::default());
        let b = Arc::new(Counters::default());

        let dispatcher = Dispatcher::new(
            vec![
                Box::new(RecordingSink {
                    name: "a",
                    fail: false,
                    counters: a.clone(),
                }),
                Box::new(RecordingSink {
                    name: "b",
                    fail: false,
                    counters: b.clone(),
                }),
            ],
            None,
            false,
            false,
        );

        dispatcher
            .dispatch(&PlaybackEvent::NowPlaying(scrobble()))
            .await;

        assert_eq!(a.now_playing.load(Ordering::SeqCst), 1);
        assert_eq!(b.now_playing.load(Ordering::SeqCst), 1);
        assert_eq!(a.scrobbles.load(Ordering::SeqCst), 0);
    }
}
