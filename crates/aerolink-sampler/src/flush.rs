//! Batch flush: stamp, persist, and trim when over budget.

use crate::batch::BatchAccumulator;
use crate::cursor::RetentionCursor;
use aerolink_core::{SinkError, TelemetryRecord, TelemetrySink, storage_key};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Records removed per retention pass.
pub const TRIM_BATCH_SIZE: u32 = 50;

/// Drains the accumulator into `sink` under a key derived from `at`.
///
/// When the cursor crosses its high-water mark a trim batch runs and
/// the cursor is credited with the count actually removed. A failed
/// trim is logged and left for a later cycle; a failed ingest is
/// surfaced so the caller can log and continue. Returns the storage key
/// used, or `None` when the accumulator was empty.
pub async fn flush_batch<S: TelemetrySink>(
    sink: &mut S,
    batch: &mut BatchAccumulator,
    cursor: &mut RetentionCursor,
    at: DateTime<Utc>,
    location: Option<&str>,
) -> Result<Option<String>, SinkError> {
    let Some(avg) = batch.average() else {
        return Ok(None);
    };
    batch.reset();

    let record = TelemetryRecord {
        pm1_0: avg.pm1_0,
        pm2_5: avg.pm2_5,
        pm4_0: avg.pm4_0,
        pm10_0: avg.pm10_0,
        voc_index: avg.voc_index,
        nox_index: avg.nox_index,
        co2_ppm: avg.co2_ppm,
        temperature_c: avg.temperature_c,
        humidity_pct: avg.humidity_pct,
        date: at.format("%Y-%m-%d").to_string(),
        time: at.format("%H:%M:%S").to_string(),
        location: location.map(str::to_string),
        boot_time: None,
    };
    let encoded = serde_json::to_vec(&record).map_err(|_| SinkError::Malformed)?;
    let key = storage_key(&at);

    sink.ingest(&key, &record).await?;
    cursor.observe(encoded.len());
    info!(key = %key, bytes = encoded.len(), "batch flushed");

    if cursor.should_trim() {
        match sink.trim_oldest(TRIM_BATCH_SIZE).await {
            Ok(removed) => {
                cursor.note_removed(removed);
                info!(
                    removed,
                    approx_count = cursor.approx_count(),
                    "retention trim complete"
                );
            }
            Err(err) => warn!(%err, "retention trim failed, retrying on a later cycle"),
        }
    }

    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Reading;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// In-memory sink recording every call.
    #[derive(Default)]
    struct FakeSink {
        stored: Vec<(String, TelemetryRecord)>,
        trims: Vec<u32>,
        fail_ingest: bool,
        fail_trim: bool,
    }

    #[async_trait]
    impl TelemetrySink for FakeSink {
        async fn ingest(&mut self, key: &str, record: &TelemetryRecord) -> Result<(), SinkError> {
            if self.fail_ingest {
                return Err(SinkError::Request(500));
            }
            self.stored.push((key.to_string(), record.clone()));
            Ok(())
        }

        async fn delete_all(&mut self) -> Result<(), SinkError> {
            self.stored.clear();
            Ok(())
        }

        async fn trim_oldest(&mut self, batch_size: u32) -> Result<usize, SinkError> {
            if self.fail_trim {
                return Err(SinkError::Retention("patch failed".into()));
            }
            self.trims.push(batch_size);
            Ok(batch_size as usize)
        }
    }

    fn one_reading() -> Reading {
        Reading {
            co2_ppm: 420,
            temperature_c: 21.0,
            humidity_pct: 40.0,
            ..Reading::default()
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 12, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn flush_stores_the_average_under_a_time_key() {
        let mut sink = FakeSink::default();
        let mut batch = BatchAccumulator::new();
        let mut cursor = RetentionCursor::default();
        batch.push(&one_reading());
        batch.push(&one_reading());

        let key = flush_batch(&mut sink, &mut batch, &mut cursor, noon(), Some("north-field"))
            .await
            .unwrap();

        assert_eq!(key.as_deref(), Some("26-03-09_12-30-00"));
        assert!(batch.is_empty());
        assert_eq!(sink.stored.len(), 1);
        let (stored_key, record) = &sink.stored[0];
        assert_eq!(stored_key, "26-03-09_12-30-00");
        assert_eq!(record.co2_ppm, 420);
        assert_eq!(record.date, "2026-03-09");
        assert_eq!(record.time, "12:30:00");
        assert_eq!(record.location.as_deref(), Some("north-field"));
        assert_eq!(cursor.approx_count(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let mut sink = FakeSink::default();
        let mut batch = BatchAccumulator::new();
        let mut cursor = RetentionCursor::default();

        let key = flush_batch(&mut sink, &mut batch, &mut cursor, noon(), None)
            .await
            .unwrap();

        assert_eq!(key, None);
        assert!(sink.stored.is_empty());
        assert_eq!(cursor.approx_count(), 0);
    }

    #[tokio::test]
    async fn crossing_the_high_water_mark_triggers_one_trim() {
        let mut sink = FakeSink::default();
        let mut batch = BatchAccumulator::new();
        // A tiny budget so a single record overflows it.
        let mut cursor = RetentionCursor::new(64);
        for _ in 0..60 {
            cursor.observe(128);
        }
        batch.push(&one_reading());

        flush_batch(&mut sink, &mut batch, &mut cursor, noon(), None)
            .await
            .unwrap();

        assert_eq!(sink.trims, vec![TRIM_BATCH_SIZE]);
        // 61 observed, 50 credited back.
        assert_eq!(cursor.approx_count(), 11);
    }

    #[tokio::test]
    async fn trim_failures_do_not_fail_the_flush() {
        let mut sink = FakeSink {
            fail_trim: true,
            ..FakeSink::default()
        };
        let mut batch = BatchAccumulator::new();
        let mut cursor = RetentionCursor::new(64);
        for _ in 0..60 {
            cursor.observe(128);
        }
        batch.push(&one_reading());

        let key = flush_batch(&mut sink, &mut batch, &mut cursor, noon(), None)
            .await
            .unwrap();

        assert!(key.is_some());
        assert_eq!(sink.stored.len(), 1);
        assert_eq!(cursor.approx_count(), 61);
    }

    #[tokio::test]
    async fn ingest_failures_surface_to_the_caller() {
        let mut sink = FakeSink {
            fail_ingest: true,
            ..FakeSink::default()
        };
        let mut batch = BatchAccumulator::new();
        let mut cursor = RetentionCursor::default();
        batch.push(&one_reading());

        let err = flush_batch(&mut sink, &mut batch, &mut cursor, noon(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SinkError::Request(500)));
        // Nothing stored, nothing counted.
        assert_eq!(cursor.approx_count(), 0);
    }
}
