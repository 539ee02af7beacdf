use super::*;
use std::time::Duration;

use crate::config::SeedData;

fn route() -> Arc<AgentRoute> {
    let (events, _) = broadcast::channel(64);
    AgentRoute::new(RouteSettings::default(), SeedData::default().stops, events)
}

fn ids(stops: &[Stop]) -> Vec<&str> {
    stops.iter().map(|stop| stop.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn completing_a_scan_dequeues_head_and_pays_once() {
    let route = route();
    assert_eq!(route.status().await, RouteStatus::Idle);
    assert_eq!(route.earnings_cents().await, 4550);

    route.begin_scan().await.expect("begin");
    assert_eq!(route.status().await, RouteStatus::Scanning);

    let done = route.complete_scan().await.expect("complete");
    assert_eq!(done.id.as_str(), "JOB-8821");
    assert_eq!(route.status().await, RouteStatus::Completed);
    assert_eq!(ids(&route.queue().await), vec!["JOB-8822", "JOB-8823"]);
    assert_eq!(route.earnings_cents().await, 4800);

    assert!(route.complete_scan().await.is_err());
    assert_eq!(route.earnings_cents().await, 4800);
}

#[tokio::test(start_paused = true)]
async fn completed_returns_to_idle_after_display_delay() {
    let route = route();
    route.begin_scan().await.expect("begin");
    route.complete_scan().await.expect("complete");

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(route.status().await, RouteStatus::Completed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(route.status().await, RouteStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn dismiss_returns_early_and_disarms_auto_return() {
    let route = route();
    route.begin_scan().await.expect("begin");
    route.complete_scan().await.expect("complete");
    route.dismiss().await.expect("dismiss");
    assert_eq!(route.status().await, RouteStatus::Idle);

    route.begin_scan().await.expect("begin second");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(route.status().await, RouteStatus::Scanning);
}

#[tokio::test]
async fn cancel_scan_changes_nothing() {
    let route = route();
    assert!(route.cancel_scan().await.is_err());

    route.begin_scan().await.expect("begin");
    route.cancel_scan().await.expect("cancel");

    let snapshot = route.snapshot().await;
    assert_eq!(snapshot.status, RouteStatus::Idle);
    assert_eq!(snapshot.queue.len(), 3);
    assert_eq!(snapshot.earnings_cents, 4550);
    assert_eq!(snapshot.completed_stops, 0);
}

#[tokio::test(start_paused = true)]
async fn capture_completes_after_latency() {
    let route = route();
    route.begin_scan().await.expect("begin");
    route.capture().await.expect("capture");
    route.capture().await.expect("second capture is ignored");

    tokio::time::sleep(Duration::from_millis(1400)).await;
    assert_eq!(route.status().await, RouteStatus::Scanning);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = route.snapshot().await;
    assert_eq!(snapshot.status, RouteStatus::Completed);
    assert_eq!(snapshot.completed_stops, 1);
    assert_eq!(snapshot.earnings_cents, 4800);
    assert_eq!(ids(&snapshot.queue), vec!["JOB-8822", "JOB-8823"]);
}

#[tokio::test(start_paused = true)]
async fn cancel_scan_aborts_capture() {
    let route = route();
    route.begin_scan().await.expect("begin");
    route.capture().await.expect("capture");
    route.cancel_scan().await.expect("cancel");

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = route.snapshot().await;
    assert_eq!(snapshot.status, RouteStatus::Idle);
    assert_eq!(snapshot.queue.len(), 3);
}

#[tokio::test]
async fn camera_error_blocks_capture_but_not_cancel() {
    let route = route();
    assert!(route.report_camera_unavailable("denied").await.is_err());

    route.begin_scan().await.expect("begin");
    route
        .report_camera_unavailable("Unable to access camera")
        .await
        .expect("report");
    assert_eq!(
        route.snapshot().await.camera_error.as_deref(),
        Some("Unable to access camera")
    );
    assert_eq!(
        route.capture().await,
        Err(RouteError::CameraUnavailable("Unable to access camera".into()))
    );
    assert_eq!(route.status().await, RouteStatus::Scanning);

    route.cancel_scan().await.expect("cancel");
    assert_eq!(route.snapshot().await.camera_error, None);
}

#[tokio::test]
async fn empty_queue_is_all_caught_up() {
    let route = route();
    for _ in 0..3 {
        route.begin_scan().await.expect("begin");
        route.complete_scan().await.expect("complete");
        route.dismiss().await.expect("dismiss");
    }

    assert_eq!(route.status().await, RouteStatus::AllCaughtUp);
    assert_eq!(route.current_stop().await, None);
    assert_eq!(route.begin_scan().await, Err(RouteError::QueueEmpty));
    assert_eq!(route.earnings_cents().await, 4550 + 3 * 250);
}

#[tokio::test]
async fn begin_scan_rejected_while_completed() {
    let route = route();
    route.begin_scan().await.expect("begin");
    assert!(matches!(
        route.begin_scan().await,
        Err(RouteError::InvalidTransition { status: "scanning", .. })
    ));
    route.complete_scan().await.expect("complete");
    assert!(matches!(
        route.begin_scan().await,
        Err(RouteError::InvalidTransition { status: "completed", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_route() {
    let route = route();
    route.begin_scan().await.expect("begin");
    route.shutdown().await;

    assert_eq!(route.status().await, RouteStatus::Idle);
    assert_eq!(route.begin_scan().await, Err(RouteError::Closed));
    assert_eq!(route.earnings_cents().await, 4550);
    assert_eq!(route.queue().await.len(), 3);
}
