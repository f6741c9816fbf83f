//! Integration tests for the paper status poller against the mock scanner.
//!
//! Time is paused so interval and watchdog behaviour is deterministic.

use std::time::Duration;

use precinct_hardware::mock::MockScanner;
use precinct_hardware::{PaperStatus, PaperStatusEvent, PaperStatusPoller, PollError, PollerConfig};
use tokio::time::Instant;

fn poller() -> PaperStatusPoller {
    PaperStatusPoller::new(PollerConfig {
        interval: Duration::from_millis(500),
        timeout: Duration::from_millis(2000),
    })
}

/// Polls happen immediately and then once per interval.
#[tokio::test(start_paused = true)]
async fn test_polls_on_interval_until_stopped() {
    let (scanner, handle) = MockScanner::connected();
    let start = Instant::now();

    let mut seen = Vec::new();
    poller()
        .run(&scanner, |result| {
            seen.push(result);
            seen.len() < 3
        })
        .await;

    assert_eq!(seen, vec![Ok(PaperStatusEvent::NoPaper); 3]);
    assert_eq!(handle.calls().paper_status, 3);
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

/// Status changes made between polls are picked up by the next poll.
#[tokio::test(start_paused = true)]
async fn test_reports_status_changes() {
    let (scanner, handle) = MockScanner::connected();

    let mut seen = Vec::new();
    poller()
        .run(&scanner, |result| {
            seen.push(result);
            handle.load_sheet();
            seen.len() < 2
        })
        .await;

    assert_eq!(
        seen,
        vec![Ok(PaperStatusEvent::NoPaper), Ok(PaperStatusEvent::ReadyToScan)]
    );
}

/// A hung driver trips the watchdog and stops polling.
#[tokio::test(start_paused = true)]
async fn test_watchdog_timeout_stops_polling() {
    let (scanner, handle) = MockScanner::connected();
    handle.hang_paper_status(true);

    let mut seen = Vec::new();
    poller()
        .run(&scanner, |result| {
            seen.push(result);
            true
        })
        .await;

    assert_eq!(seen, vec![Err(PollError::TimedOut { duration_ms: 2000 })]);
}

/// A disconnect is an event, not a failure, so polling continues.
#[tokio::test(start_paused = true)]
async fn test_disconnect_is_reported_as_event() {
    let (scanner, handle) = MockScanner::connected();
    handle.disconnect();

    let mut seen = Vec::new();
    poller()
        .run(&scanner, |result| {
            seen.push(result);
            seen.len() < 2
        })
        .await;

    assert_eq!(seen, vec![Ok(PaperStatusEvent::Disconnected); 2]);
}

/// An unrecognized status is reported once and ends polling.
#[tokio::test(start_paused = true)]
async fn test_unexpected_status_stops_polling() {
    let (scanner, handle) = MockScanner::connected();
    handle.set_paper_status(Some(PaperStatus::Unrecognized(13)));

    let mut seen = Vec::new();
    poller()
        .run(&scanner, |result| {
            seen.push(result);
            true
        })
        .await;

    assert_eq!(
        seen,
        vec![Err(PollError::UnexpectedPaperStatus(PaperStatus::Unrecognized(13)))]
    );
    assert_eq!(handle.calls().paper_status, 1);
}
