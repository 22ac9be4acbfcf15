//! Integration tests for DeliveryScheduler

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crashops_core::domain::{settings, Scalar, StoredReport};
use crashops_core::ports::{HostContext, IHostScheduler, IReportStore};
use crashops_delivery::{
    DeliveryObserver, DeliveryScheduler, RunOutcome, TokioHostScheduler, JOB_NAME,
};

use crate::common::{open_store, sample_report, RecordingTransport};

const HOUR: Duration = Duration::from_secs(3600);

fn detached() -> HostContext {
    HostContext::detached("test-app", "0.0.0")
}

// ============================================================================
// Delivery runs
// ============================================================================

#[tokio::test]
async fn test_successful_run_marks_report_delivered() {
    let (_dir, store) = open_store();
    let id = store.append(&sample_report("NullPointer")).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);

    let outcome = scheduler.run_now().await;

    assert_eq!(outcome, RunOutcome::Success { delivered: 1 });
    assert!(store.list_pending().unwrap().is_empty());
    assert!(store.get(id).unwrap().unwrap().report.is_delivered());
    assert_eq!(transport.calls(), vec!["NullPointer".to_string()]);
}

#[tokio::test]
async fn test_reports_delivered_oldest_first() {
    let (_dir, store) = open_store();
    for title in ["first", "second", "third"] {
        store.append(&sample_report(title)).unwrap();
    }
    let transport = Arc::new(RecordingTransport::default());
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);

    scheduler.run_now().await;
    assert_eq!(transport.calls(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_failed_report_stays_pending_and_run_continues() {
    let (_dir, store) = open_store();
    store.append(&sample_report("ok-1")).unwrap();
    store.append(&sample_report("flaky")).unwrap();
    store.append(&sample_report("ok-2")).unwrap();
    let transport = Arc::new(RecordingTransport::failing(&["flaky"]));
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);

    let outcome = scheduler.run_now().await;
    match outcome {
        RunOutcome::Failure {
            delivered,
            remaining,
            error,
        } => {
            assert_eq!(delivered, 2);
            assert_eq!(remaining, 1);
            assert!(error.contains("503"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Not retried within the same run
    assert_eq!(transport.calls(), vec!["ok-1", "flaky", "ok-2"]);

    // Retried on the next run
    scheduler.run_now().await;
    assert_eq!(transport.calls().len(), 4);
    assert_eq!(store.pending_count(), 1);
}

#[tokio::test]
async fn test_observer_sees_only_delivered_reports() {
    let (_dir, store) = open_store();
    store.append(&sample_report("ok-1")).unwrap();
    store.append(&sample_report("flaky")).unwrap();
    let transport = Arc::new(RecordingTransport::failing(&["flaky"]));
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport, Handle::current(), HOUR, true);

    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: DeliveryObserver = Arc::new(move |reports: Vec<StoredReport>| {
        let titles = reports.iter().map(|r| r.report.title().to_string()).collect();
        sink.lock().unwrap().push(titles);
    });
    scheduler.set_delivery_observer(Some(observer));

    scheduler.run_now().await;
    // Nothing new delivered, so no second call
    scheduler.run_now().await;

    assert_eq!(*seen.lock().unwrap(), vec![vec!["ok-1".to_string()]]);

    scheduler.set_delivery_observer(None);
    store.append(&sample_report("ok-2")).unwrap();
    scheduler.run_now().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reports_appended_during_run_are_picked_up() {
    let (_dir, store) = open_store();
    store.append(&sample_report("early")).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    *transport.append_on_first.lock().unwrap() = Some((store.clone(), sample_report("late")));
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);

    let outcome = scheduler.run_now().await;

    assert_eq!(outcome, RunOutcome::Success { delivered: 2 });
    assert_eq!(transport.calls(), vec!["early", "late"]);
}

#[tokio::test]
async fn test_empty_store_is_success() {
    let (_dir, store) = open_store();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler = DeliveryScheduler::new(store.clone(), transport, Handle::current(), HOUR, true);

    assert_eq!(
        scheduler.run_now().await,
        RunOutcome::Success { delivered: 0 }
    );
    assert!(matches!(
        store.get_setting(settings::LAST_DELIVERY_AT, Scalar::Int(0)),
        Scalar::Int(ts) if ts > 0
    ));
}

#[tokio::test]
async fn test_disabled_delivery_is_skipped() {
    let (_dir, store) = open_store();
    store.append(&sample_report("boom")).unwrap();
    store
        .set_setting(settings::ENABLED, Scalar::Bool(false), false)
        .unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);

    let (tx, rx) = oneshot::channel();
    let started = scheduler.run_if_idle(&detached(), move |outcome| {
        let _ = tx.send(outcome);
    });

    assert!(!started);
    assert_eq!(rx.await.unwrap(), RunOutcome::Skipped);
    assert!(transport.calls().is_empty());
    assert_eq!(store.pending_count(), 1);
}

// ============================================================================
// Single-flight
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_run_is_refused_while_one_is_in_flight() {
    let (_dir, store) = open_store();
    for i in 0..5 {
        store.append(&sample_report(&format!("report-{i}"))).unwrap();
    }
    let transport = Arc::new(RecordingTransport::with_delay(Duration::from_millis(20)));
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport.clone(), Handle::current(), HOUR, true);
    let host = detached();

    let (tx1, rx1) = oneshot::channel();
    assert!(scheduler.run_if_idle(&host, move |outcome| {
        let _ = tx1.send(outcome);
    }));
    assert!(scheduler.is_running());

    let (tx2, rx2) = oneshot::channel();
    assert!(!scheduler.run_if_idle(&host, move |outcome| {
        let _ = tx2.send(outcome);
    }));
    assert_eq!(rx2.await.unwrap(), RunOutcome::Skipped);

    // Racing callers from other tasks are refused as well
    let racers: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_now().await })
        })
        .collect();
    for racer in racers {
        assert_eq!(racer.await.unwrap(), RunOutcome::Skipped);
    }

    assert_eq!(rx1.await.unwrap(), RunOutcome::Success { delivered: 5 });
    assert!(!scheduler.is_running());
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls().len(), 5);
}

#[tokio::test]
async fn test_on_complete_called_exactly_once() {
    let (_dir, store) = open_store();
    store.append(&sample_report("boom")).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler = DeliveryScheduler::new(store, transport, Handle::current(), HOUR, true);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    scheduler.run_if_idle(&detached(), move |outcome| {
        let _ = tx.send(outcome);
    });

    assert_eq!(rx.recv().await, Some(RunOutcome::Success { delivered: 1 }));
    // Sender dropped after the single call
    assert_eq!(rx.recv().await, None);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_self_with_live_host() {
    let (_dir, store) = open_store();
    let transport = Arc::new(RecordingTransport::default());
    let host_scheduler = Arc::new(TokioHostScheduler::new(Handle::current()));
    let as_port: Arc<dyn IHostScheduler> = host_scheduler.clone();
    let host = HostContext::new("test-app", "1.2.3", &as_port);
    let scheduler = DeliveryScheduler::new(store, transport, Handle::current(), HOUR, true);

    assert!(scheduler.register_self(&host));
    assert!(host_scheduler.is_scheduled(JOB_NAME));

    // Registering again keeps the existing job
    assert!(scheduler.register_self(&host));

    assert!(scheduler.unregister(&host));
    assert!(!host_scheduler.is_scheduled(JOB_NAME));
}

#[tokio::test]
async fn test_register_self_fails_without_host() {
    let (_dir, store) = open_store();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler = DeliveryScheduler::new(store, transport, Handle::current(), HOUR, true);

    let host_scheduler: Arc<dyn IHostScheduler> =
        Arc::new(TokioHostScheduler::new(Handle::current()));
    let host = HostContext::new("test-app", "1.2.3", &host_scheduler);
    drop(host_scheduler);

    assert!(!scheduler.register_self(&host));
    assert!(!scheduler.register_self(&detached()));
}

#[tokio::test]
async fn test_interval_follows_setting() {
    let (_dir, store) = open_store();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport, Handle::current(), HOUR, true);
    assert_eq!(scheduler.interval(), HOUR);

    store
        .set_setting(settings::DELIVERY_INTERVAL_SECS, Scalar::Int(600), true)
        .unwrap();
    assert_eq!(scheduler.interval(), Duration::from_secs(600));

    store
        .set_setting(settings::DELIVERY_INTERVAL_SECS, Scalar::Int(-5), true)
        .unwrap();
    assert_eq!(scheduler.interval(), HOUR);
}

#[tokio::test]
async fn test_oversized_interval_setting_falls_back_and_still_registers() {
    let (_dir, store) = open_store();
    store
        .set_setting(settings::DELIVERY_INTERVAL_SECS, Scalar::Int(i64::MAX), true)
        .unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let scheduler =
        DeliveryScheduler::new(store.clone(), transport, Handle::current(), HOUR, true);
    assert_eq!(scheduler.interval(), HOUR);

    let host_scheduler = Arc::new(TokioHostScheduler::new(Handle::current()));
    let dyn_scheduler: Arc<dyn IHostScheduler> = host_scheduler.clone();
    let host = HostContext::new("test-app", "1.2.3", &dyn_scheduler);
    assert!(scheduler.register_self(&host));
    assert!(host_scheduler.is_scheduled(JOB_NAME));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registered_job_delivers_on_tick() {
    let (_dir, store) = open_store();
    store.append(&sample_report("boom")).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let host_scheduler: Arc<dyn IHostScheduler> =
        Arc::new(TokioHostScheduler::new(Handle::current()));
    let host = HostContext::new("test-app", "1.2.3", &host_scheduler);
    let scheduler = DeliveryScheduler::new(
        store.clone(),
        transport.clone(),
        Handle::current(),
        Duration::from_secs(1),
        true,
    );

    assert!(scheduler.register_self(&host));
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Let the spawned run and its blocking store calls finish
    for _ in 0..200 {
        if store.pending_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.calls(), vec!["boom".to_string()]);
    assert_eq!(store.pending_count(), 0);
}
