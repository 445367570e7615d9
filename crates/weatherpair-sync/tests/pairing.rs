// Pairing behaviour of the resolver driven on tokio's paused clock

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use weatherpair_core::{
    CaptureStamp, DeviceSlot, InboundReading, ManualClock, Measurements, MemorySink, RowSink,
    SinkError, SlotRegistry, SlotRow, SyncError,
};
use weatherpair_sync::{Outcome, PairingResolver, SyncConfig, DEFAULT_PAIR_WINDOW};

struct Harness {
    resolver: Arc<PairingResolver>,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(CaptureStamp::new("2025-01-21", "10:00:00")));
    let resolver = Arc::new(PairingResolver::new(
        SyncConfig::default(),
        SlotRegistry::default(),
        clock.clone(),
        sink.clone(),
    ));
    Harness {
        resolver,
        sink,
        clock,
    }
}

fn reading(device: &str, temperature: f64) -> InboundReading {
    InboundReading::new(
        device,
        Measurements::new(Some(temperature), Some(45.0), Some(1012.0)),
    )
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn partner_within_window_commits_pair() {
    let h = harness();

    let first = h.resolver.handle_report(reading("ATOM_001", 21.0)).await;
    assert_eq!(first, Ok(Outcome::Pending { slot: DeviceSlot::First }));
    assert!(h.sink.is_empty());

    advance(3).await;
    h.clock.set(CaptureStamp::new("2025-01-21", "10:00:03"));
    let second = h.resolver.handle_report(reading("ATOM_002", 19.5)).await;
    assert_eq!(
        second,
        Ok(Outcome::PairedCommit {
            slot: DeviceSlot::Second
        })
    );

    let rows = h.sink.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].slot, DeviceSlot::First);
    assert_eq!(rows[0].measurements.temperature, Some(21.0));
    assert_eq!(rows[1].slot, DeviceSlot::Second);
    assert_eq!(rows[1].measurements.temperature, Some(19.5));
    for row in &rows {
        assert_eq!(row.stamp, CaptureStamp::new("2025-01-21", "10:00:03"));
    }

    // The cancelled deadline must not add a timeout commit later.
    advance(60).await;
    assert_eq!(h.sink.len(), 2);
    assert_eq!(h.resolver.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn pairing_is_order_independent() {
    let h = harness();

    assert!(matches!(
        h.resolver.handle_report(reading("ATOM_002", 18.0)).await,
        Ok(Outcome::Pending { .. })
    ));
    advance(10).await;
    assert!(matches!(
        h.resolver.handle_report(reading("ATOM_001", 22.0)).await,
        Ok(Outcome::PairedCommit { .. })
    ));

    advance(60).await;
    assert_eq!(h.sink.rows_for(DeviceSlot::First).len(), 1);
    assert_eq!(h.sink.rows_for(DeviceSlot::Second).len(), 1);
    assert_eq!(
        h.sink.rows_for(DeviceSlot::Second)[0].measurements.temperature,
        Some(18.0)
    );
}

#[tokio::test(start_paused = true)]
async fn missing_partner_times_out_with_null_row() {
    let h = harness();

    h.resolver
        .handle_report(reading("ATOM_001", 21.0))
        .await
        .unwrap();
    h.clock.set(CaptureStamp::new("2025-01-21", "10:00:17"));

    advance(DEFAULT_PAIR_WINDOW.as_secs() - 1).await;
    assert!(h.sink.is_empty());

    advance(2).await;
    let first = h.sink.rows_for(DeviceSlot::First);
    let second = h.sink.rows_for(DeviceSlot::Second);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].measurements.temperature, Some(21.0));
    assert!(second[0].measurements.is_empty());

    // Both rows keep the arrival stamp, not the expiry time.
    assert_eq!(first[0].stamp.hour, "10:00:00");
    assert_eq!(second[0].stamp.hour, "10:00:00");
    assert_eq!(h.resolver.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_partner_starts_its_own_window() {
    let h = harness();

    h.resolver
        .handle_report(reading("ATOM_001", 21.0))
        .await
        .unwrap();
    advance(18).await;
    assert_eq!(h.sink.len(), 2);

    h.clock.set(CaptureStamp::new("2025-01-21", "10:00:18"));
    let late = h.resolver.handle_report(reading("ATOM_002", 19.0)).await;
    assert_eq!(late, Ok(Outcome::Pending { slot: DeviceSlot::Second }));

    advance(19).await;
    let rows = h.sink.rows();
    assert_eq!(rows.len(), 4);
    assert!(rows[2].measurements.is_empty());
    assert_eq!(rows[3].measurements.temperature, Some(19.0));
    assert_eq!(rows[3].stamp.hour, "10:00:18");
}

#[tokio::test(start_paused = true)]
async fn repeated_report_supersedes_waiting_one() {
    let h = harness();

    h.resolver
        .handle_report(reading("ATOM_001", 20.0))
        .await
        .unwrap();
    advance(5).await;
    h.clock.set(CaptureStamp::new("2025-01-21", "10:00:05"));
    let again = h.resolver.handle_report(reading("ATOM_001", 20.4)).await;
    assert_eq!(again, Ok(Outcome::Pending { slot: DeviceSlot::First }));

    // Older report committed alone right away, with its own stamp.
    let rows = h.sink.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].measurements.temperature, Some(20.0));
    assert_eq!(rows[0].stamp.hour, "10:00:00");
    assert_eq!(h.resolver.pending_len(), 1);

    // Past the first report's deadline: nothing extra.
    advance(13).await;
    assert_eq!(h.sink.len(), 2);

    advance(5).await;
    let rows = h.sink.rows();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[2].measurements.temperature, Some(20.4));
    assert_eq!(rows[2].stamp.hour, "10:00:05");
}

#[tokio::test(start_paused = true)]
async fn unknown_device_is_rejected_before_buffering() {
    let h = harness();

    let err = h
        .resolver
        .handle_report(reading("ATOM_003", 25.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidSlot { .. }));
    assert_eq!(h.resolver.pending_len(), 0);

    advance(60).await;
    assert!(h.sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_commits_waiting_reports_once() {
    let h = harness();

    h.resolver
        .handle_report(reading("ATOM_002", 16.5))
        .await
        .unwrap();
    assert_eq!(h.resolver.flush_pending().await, 1);
    assert_eq!(h.sink.len(), 2);
    assert!(h.sink.rows_for(DeviceSlot::First)[0].measurements.is_empty());

    assert_eq!(h.resolver.flush_pending().await, 0);
    advance(60).await;
    assert_eq!(h.sink.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn write_failure_still_clears_entry() {
    let h = harness();
    h.sink.fail_writes_for(DeviceSlot::Second);

    h.resolver
        .handle_report(reading("ATOM_001", 23.0))
        .await
        .unwrap();
    advance(18).await;

    assert_eq!(h.resolver.pending_len(), 0);
    assert_eq!(h.sink.rows_for(DeviceSlot::First).len(), 1);
    assert!(h.sink.rows_for(DeviceSlot::Second).is_empty());

    // No retry later either.
    advance(60).await;
    assert_eq!(h.sink.len(), 1);
}

/// Sink whose writes take a while.
struct SlowSink {
    inner: MemorySink,
    delay: Duration,
}

#[async_trait]
impl RowSink for SlowSink {
    async fn write_row(&self, row: &SlotRow) -> Result<(), SinkError> {
        tokio::time::sleep(self.delay).await;
        self.inner.write_row(row).await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_sink_does_not_block_other_arrivals() {
    let sink = Arc::new(SlowSink {
        inner: MemorySink::new(),
        delay: Duration::from_secs(5),
    });
    let resolver = Arc::new(PairingResolver::new(
        SyncConfig::default(),
        SlotRegistry::default(),
        Arc::new(ManualClock::new(CaptureStamp::new("2025-01-21", "11:00:00"))),
        sink.clone(),
    ));

    resolver
        .handle_report(reading("ATOM_001", 20.0))
        .await
        .unwrap();

    let pairing = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.handle_report(reading("ATOM_002", 19.0)).await })
    };
    while resolver.pending_len() != 0 {
        tokio::task::yield_now().await;
    }

    // The pair is being written; the next arrival must not wait for it.
    let next = tokio::time::timeout(
        Duration::from_secs(1),
        resolver.handle_report(reading("ATOM_001", 20.2)),
    )
    .await
    .expect("arrival blocked behind a slow sink");
    assert_eq!(next, Ok(Outcome::Pending { slot: DeviceSlot::First }));
    assert!(!pairing.is_finished());

    assert!(matches!(
        pairing.await.unwrap(),
        Ok(Outcome::PairedCommit { .. })
    ));
    assert_eq!(sink.inner.len(), 2);
}

fn slow_resolver(delay: Duration) -> (Arc<PairingResolver>, Arc<SlowSink>) {
    let sink = Arc::new(SlowSink {
        inner: MemorySink::new(),
        delay,
    });
    let resolver = Arc::new(PairingResolver::new(
        SyncConfig::default(),
        SlotRegistry::default(),
        Arc::new(ManualClock::new(CaptureStamp::new("2025-01-21", "11:00:00"))),
        sink.clone(),
    ));
    (resolver, sink)
}

#[tokio::test(start_paused = true)]
async fn dropped_request_still_commits_pair() {
    let (resolver, sink) = slow_resolver(Duration::from_millis(50));

    let first = resolver.handle_report(reading("ATOM_001", 20.0)).await;
    assert_eq!(first, Ok(Outcome::Pending { slot: DeviceSlot::First }));

    // The client goes away while the pair is being written.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        resolver.handle_report(reading("ATOM_002", 19.0)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(resolver.pending_len(), 0);

    advance(60).await;
    let first = sink.inner.rows_for(DeviceSlot::First);
    let second = sink.inner.rows_for(DeviceSlot::Second);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].measurements.temperature, Some(20.0));
    assert_eq!(second[0].measurements.temperature, Some(19.0));
    assert_eq!(resolver.commits_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_waits_for_timeout_commit_in_progress() {
    let (resolver, sink) = slow_resolver(Duration::from_secs(5));

    resolver
        .handle_report(reading("ATOM_002", 17.0))
        .await
        .unwrap();

    // Deadline has fired; its first row is still being written.
    advance(DEFAULT_PAIR_WINDOW.as_secs() + 1).await;
    assert_eq!(resolver.pending_len(), 0);
    assert_eq!(resolver.commits_in_flight(), 1);
    assert!(sink.inner.is_empty());

    assert_eq!(resolver.flush_pending().await, 0);
    assert_eq!(resolver.commits_in_flight(), 0);
    assert_eq!(sink.inner.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_arrivals_never_double_commit() {
    let sink = Arc::new(MemorySink::new());
    let resolver = Arc::new(PairingResolver::new(
        SyncConfig {
            pair_window: Duration::from_secs(60),
        },
        SlotRegistry::default(),
        Arc::new(ManualClock::new(CaptureStamp::new("2025-01-21", "12:00:00"))),
        sink.clone(),
    ));

    for round in 1..=100 {
        let tasks: Vec<_> = ["ATOM_001", "ATOM_002"]
            .into_iter()
            .map(|device| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.handle_report(reading(device, 20.0)).await })
            })
            .collect();

        let mut paired = 0;
        let mut pending = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                Outcome::PairedCommit { .. } => paired += 1,
                Outcome::Pending { .. } => pending += 1,
            }
        }

        assert_eq!((paired, pending), (1, 1), "round {}", round);
        assert_eq!(resolver.pending_len(), 0);
        assert_eq!(sink.len(), round * 2);
    }

    assert_eq!(sink.rows_for(DeviceSlot::First).len(), 100);
    assert_eq!(sink.rows_for(DeviceSlot::Second).len(), 100);
}
