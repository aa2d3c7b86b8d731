//! File-backed sink: one CSV record per scrobble.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::scrobble::Scrobble;

use super::Sink;

/// Appends scrobbles to a local CSV file.
///
/// "Append" is read-everything, add, rewrite-atomically: the whole file is
/// parsed on every write, so corruption is detected at the first write after
/// it happens rather than at some later read.
pub struct CsvSink {
    filename: PathBuf,
}

impl CsvSink {
    #[must_use]
    pub fn new(filename: PathBuf) -> Self {
        Self { filename }
    }

    /// Parse every record in the file, oldest first. A missing file is zero
    /// records; a malformed line is a hard error.
    fn read_all(&self) -> Result<Vec<Scrobble>> {
        if !self.filename.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&self.filename)?;

        let mut scrobbles = Vec::new();
        for record in reader.records() {
            scrobbles.push(Scrobble::from_record(&record?)?);
        }
        Ok(scrobbles)
    }

    /// Rewrite the whole file via a temp file in the same directory, so a
    /// crash mid-write never leaves a truncated history behind.
    fn write_all(&self, scrobbles: &[Scrobble]) -> Result<()> {
        let directory = self.filename.parent().unwrap_or_else(|| ".".as_ref());
        std::fs::create_dir_all(directory)?;

        let temp = tempfile::NamedTempFile::new_in(directory)?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file());
            for scrobble in scrobbles {
                writer.write_record(&scrobble.to_record())?;
            }
            writer.flush()?;
        }
        temp.persist(&self.filename).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    /// Now-playing state is transient; the file only holds history.
    async fn now_playing(&self, _scrobble: &Scrobble) -> Result<()> {
        Ok(())
    }

    async fn scrobble(&self, scrobble: &Scrobble) -> Result<()> {
        let mut scrobbles = self.read_all()?;
        scrobbles.push(scrobble.clone());
        self.write_all(&scrobbles)
    }

    async fn scrobbles(
        &self,
        limit: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Scrobble>> {
        debug!(filename = %self.filename.display(), "reading scrobbles");

        // Append order is not timestamp order once two sources interleave,
        // so sort rather than just reversing the file.
        let mut all = self.read_all()?;
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let unbounded = limit <= 0;
        let mut selected = Vec::new();
        for scrobble in all {
            if scrobble.timestamp < from || scrobble.timestamp > to {
                continue;
            }
            if !unbounded && selected.len() as i64 >= limit {
                break;
            }
            selected.push(scrobble);
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn scrobble_at(track: &str, unix: i64) -> Scrobble {
        Scrobble {
            artists: vec!["Múm".to_string(), "Sigur Rós".to_string()],
            track: track.to_string(),
            album: "Compilation".to_string(),
            duration: Duration::from_secs(200),
            timestamp: Utc.timestamp_opt(unix, 0).unwrap(),
        }
    }

    fn sink() -> (tempfile::TempDir, CsvSink) {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("scrobbles.csv"));
        (dir, sink)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let (_dir, sink) = sink();
        let original = scrobble_at("Green Grass of Tunnel", 1_700_000_000);

        sink.scrobble(&original).await.unwrap();

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let far_future = Utc.timestamp_opt(4_000_000_000, 0).unwrap();
        let fetched = sink.scrobbles(0, epoch, far_future).await.unwrap();

        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].artists, original.artists);
        assert_eq!(fetched[0].track, original.track);
        assert_eq!(fetched[0].album, original.album);
        assert_eq!(fetched[0].duration, original.duration);
        assert_eq!(fetched[0].timestamp, original.timestamp);
    }

    #[tokio::test]
    async fn test_history_is_most_recent_first() {
        let (_dir, sink) = sink();
        for (track, unix) in [("a", 100), ("b", 200), ("c", 300)] {
            sink.scrobble(&scrobble_at(track, unix)).await.unwrap();
        }

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let far_future = Utc.timestamp_opt(4_000_000_000, 0).unwrap();
        let fetched = sink.scrobbles(0, epoch, far_future).await.unwrap();

        let tracks: Vec<_> = fetched.iter().map(|s| s.track.as_str()).collect();
        assert_eq!(tracks, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_window_bounds_are_inclusive_and_limit_applies() {
        let (_dir, sink) = sink();
        for unix in [100, 200, 300, 400] {
            sink.scrobble(&scrobble_at("t", unix)).await.unwrap();
        }

        let from = Utc.timestamp_opt(200, 0).unwrap();
        let to = Utc.timestamp_opt(300, 0).unwrap();
        let fetched = sink.scrobbles(0, from, to).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].timestamp.timestamp(), 300);
        assert_eq!(fetched[1].timestamp.timestamp(), 200);

        let limited = sink.scrobbles(1, from, to).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].timestamp.timestamp(), 300);
    }

    #[tokio::test]
    async fn test_history_sorts_interleaved_appends_by_timestamp() {
        let (_dir, sink) = sink();
        // Two sources appending concurrently can land out of order on disk.
        for (track, unix) in [("late", 300), ("early", 100), ("middle", 200)] {
            sink.scrobble(&scrobble_at(track, unix)).await.unwrap();
        }

        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let far_future = Utc.timestamp_opt(4_000_000_000, 0).unwrap();
        let fetched = sink.scrobbles(0, epoch, far_future).await.unwrap();

        let tracks: Vec<_> = fetched.iter().map(|s| s.track.as_str()).collect();
        assert_eq!(tracks, vec!["late", "middle", "early"]);
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let (_dir, sink) = sink();
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let now = Utc::now();
        assert!(sink.scrobbles(0, epoch, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrobbles.csv");
        std::fs::write(&path, "only,three,fields\n").unwrap();

        let sink = CsvSink::new(path);
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let now = Utc::now();
        assert!(sink.scrobbles(0, epoch, now).await.is_err());

        // Writes parse the existing file first, so they fail too.
        assert!(sink.scrobble(&scrobble_at("t", 100)).await.is_err());
    }
}
