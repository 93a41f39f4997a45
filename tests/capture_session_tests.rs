// Integration tests for the capture session controller
//
// These tests drive the full begin/end state machine against simulated
// devices, recorders and preview sinks.

use anyhow::Result;
use futures::FutureExt;
use loqa_capture::simulated::{
    MemoryPreviewSink, SimulatedDevices, SimulatedRecorderConfig, SimulatedRecorderFactory,
};
use loqa_capture::{decode_data_uri, CaptureConfig, CaptureController, CaptureError, SessionStatus};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    devices: Arc<SimulatedDevices>,
    recorders: Arc<SimulatedRecorderFactory>,
    preview: Arc<MemoryPreviewSink>,
    controller: CaptureController,
}

fn harness(devices: SimulatedDevices, recorder_config: SimulatedRecorderConfig) -> Harness {
    harness_with_config(devices, recorder_config, CaptureConfig::default())
}

fn harness_with_config(
    devices: SimulatedDevices,
    recorder_config: SimulatedRecorderConfig,
    config: CaptureConfig,
) -> Harness {
    let devices = Arc::new(devices);
    let recorders = Arc::new(SimulatedRecorderFactory::new(recorder_config));
    let preview = Arc::new(MemoryPreviewSink::new());

    let controller = CaptureController::new(
        config,
        devices.clone(),
        recorders.clone(),
        preview.clone(),
    );

    Harness {
        devices,
        recorders,
        preview,
        controller,
    }
}

/// Poll until `check` holds, failing after one second
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_begin_then_end_produces_data_uri() -> Result<()> {
    // Scenario A: granted stream, record, stop
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await;
    assert!(stream.is_some(), "begin should return the live stream");
    assert_eq!(h.controller.status(), SessionStatus::Recording);
    assert!(h.controller.error().is_none());

    let feed = h.recorders.last_feed().expect("recorder should be started");
    assert!(feed.push(vec![7u8; 32]).await);

    let uri = h.controller.end().await;

    assert_eq!(h.controller.status(), SessionStatus::Stopped);
    assert!(uri.starts_with("data:video/webm;base64,"));

    let decoded = decode_data_uri(&uri)?;
    assert_eq!(decoded.mime_type, "video/webm");
    assert_eq!(decoded.data, vec![7u8; 32]);

    Ok(())
}

#[tokio::test]
async fn test_preview_attached_muted_and_playing() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await.expect("stream granted");

    let attached = h.preview.current_stream().expect("preview should show the stream");
    assert!(attached.same_stream(&stream));
    assert!(h.preview.is_muted(), "self-view must be muted");
    assert!(h.preview.is_looping());
    assert_eq!(h.preview.plays(), 1);

    h.controller.end().await;
    assert!(h.preview.current_stream().is_none());

    Ok(())
}

#[tokio::test]
async fn test_denied_access_sets_error() -> Result<()> {
    // Scenario B: device access rejected
    let h = harness(
        SimulatedDevices::denying(CaptureError::PermissionDenied),
        SimulatedRecorderConfig::default(),
    );

    let stream = h.controller.begin().await;

    assert!(stream.is_none());
    assert_eq!(h.controller.status(), SessionStatus::Error);
    assert_eq!(h.controller.error(), Some(CaptureError::PermissionDenied));
    assert!(!h.controller.holds_stream().await);
    assert!(!h.controller.holds_recorder().await);
    assert_eq!(h.recorders.created(), 0);
    assert!(h.preview.current_stream().is_none());

    Ok(())
}

#[tokio::test]
async fn test_end_when_idle_resolves_immediately() -> Result<()> {
    // Scenario C: nothing to finalize
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let uri = h.controller.end().now_or_never();

    assert_eq!(uri, Some(String::new()));
    assert_eq!(h.controller.status(), SessionStatus::Idle);

    Ok(())
}

#[tokio::test]
async fn test_end_during_permission_request_does_not_wait() -> Result<()> {
    let h = harness(SimulatedDevices::gated(), SimulatedRecorderConfig::default());

    let begin = h.controller.begin();
    tokio::pin!(begin);

    // Drive begin() until it is parked on the permission prompt
    assert!(futures::poll!(&mut begin).is_pending());
    assert_eq!(h.controller.status(), SessionStatus::PermissionRequested);

    let uri = h.controller.end().now_or_never();
    assert_eq!(uri, Some(String::new()));
    assert_eq!(h.recorders.created(), 0);

    // The pending request still completes normally afterwards
    h.devices.release();
    assert!(begin.await.is_some());
    assert_eq!(h.controller.status(), SessionStatus::Recording);

    h.controller.end().await;
    Ok(())
}

#[tokio::test]
async fn test_superseded_grant_is_discarded() -> Result<()> {
    // Scenario D: second begin while the first is still waiting for permission
    let h = harness(SimulatedDevices::gated(), SimulatedRecorderConfig::default());

    let first = h.controller.begin();
    let second = h.controller.begin();
    tokio::pin!(first);
    tokio::pin!(second);

    assert!(futures::poll!(&mut first).is_pending());
    assert!(futures::poll!(&mut second).is_pending());
    assert_eq!(h.devices.requests(), 2);

    // Requests resolve in order: the first grant arrives after being superseded
    h.devices.release();
    assert!(first.await.is_none(), "stale grant must not be returned");

    h.devices.release();
    let stream = second.await.expect("second begin wins");

    let tracks = h.devices.issued_tracks();
    assert_eq!(tracks.len(), 2);
    assert!(
        tracks[0].iter().all(|t| t.stop_calls() >= 1),
        "superseded stream must be stopped"
    );
    assert!(tracks[1].iter().all(|t| t.stop_calls() == 0));

    let attached = h.preview.current_stream().expect("winner attached");
    assert!(attached.same_stream(&stream));
    assert_eq!(h.recorders.created(), 1);
    assert_eq!(h.controller.status(), SessionStatus::Recording);

    h.controller.end().await;
    Ok(())
}

#[tokio::test]
async fn test_begin_while_recording_releases_previous_stream() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let first = h.controller.begin().await.expect("first stream");
    let old_feed = h.recorders.last_feed().expect("first recorder");
    assert!(old_feed.push(vec![1u8; 10]).await);

    let second = h.controller.begin().await.expect("second stream");

    assert!(!first.is_active(), "previous stream tracks stopped");
    assert!(second.is_active());
    assert_eq!(h.recorders.created(), 2);
    assert_eq!(h.recorders.live(), 1);
    assert_eq!(h.recorders.max_live(), 1);

    // Segments of the first recording never reach the new artifact
    let feed = h.recorders.last_feed().expect("second recorder");
    assert_eq!(old_feed.stream_id(), first.id());
    assert_eq!(feed.stream_id(), second.id());
    assert!(!old_feed.is_open(), "preempted recorder closed its events");
    assert!(feed.push(vec![2u8; 5]).await);

    let decoded = decode_data_uri(&h.controller.end().await)?;
    assert_eq!(decoded.data, vec![2u8; 5]);

    Ok(())
}

#[tokio::test]
async fn test_at_most_one_stream_live_across_many_begins() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    for _ in 0..5 {
        h.controller.begin().await.expect("stream granted");

        let live_streams = h
            .devices
            .issued_streams()
            .iter()
            .filter(|s| s.is_active())
            .count();
        assert_eq!(live_streams, 1);
        assert!(h.recorders.live() <= 1);
        assert_eq!(h.recorders.open_feeds(), 1);
    }

    assert_eq!(h.recorders.max_live(), 1);

    h.controller.end().await;
    assert!(h.devices.issued_streams().iter().all(|s| !s.is_active()));
    assert_eq!(h.recorders.open_feeds(), 0);

    Ok(())
}

#[tokio::test]
async fn test_artifact_length_matches_non_empty_segments() -> Result<()> {
    let h = harness(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            flush_on_stop: Some(vec![9u8; 3]),
            ..SimulatedRecorderConfig::default()
        },
    );

    h.controller.begin().await.expect("stream granted");
    let feed = h.recorders.last_feed().expect("recorder started");

    for size in [100usize, 0, 250, 0, 1] {
        assert!(feed.push(vec![0xAB; size]).await);
    }

    let recording = h.controller.finish().await.expect("recording finalized");

    // Flushed segment is included: it precedes the stop confirmation
    assert_eq!(recording.len(), 100 + 250 + 1 + 3);
    assert_eq!(recording.segment_count, 4);
    assert_eq!(&recording.data[recording.len() - 3..], &[9u8, 9, 9]);

    let stats = h.controller.stats().await;
    assert_eq!(stats.segments_buffered, 0, "buffer empty after finalization");
    assert_eq!(stats.bytes_buffered, 0);
    assert_eq!(stats.segments_discarded, 2);
    assert_eq!(stats.recordings_completed, 1);

    Ok(())
}

#[tokio::test]
async fn test_end_with_full_event_channel_keeps_every_segment() -> Result<()> {
    let h = harness_with_config(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            flush_on_stop: Some(vec![2u8; 4]),
            ..SimulatedRecorderConfig::default()
        },
        CaptureConfig {
            stop_timeout_ms: 300,
            ..CaptureConfig::default()
        },
    );

    h.controller.begin().await.expect("stream granted");
    let feed = h.recorders.last_feed().expect("recorder started");

    // Fills the recorder's event channel before the collector drains it
    for _ in 0..64 {
        assert!(feed.push(vec![1u8; 10]).await);
    }

    let uri = h.controller.end().await;

    assert_eq!(h.controller.status(), SessionStatus::Stopped);
    assert!(h.controller.error().is_none());

    let decoded = decode_data_uri(&uri)?;
    assert_eq!(decoded.data.len(), 64 * 10 + 4);
    assert_eq!(&decoded.data[decoded.data.len() - 4..], &[2u8; 4]);

    Ok(())
}

#[tokio::test]
async fn test_zero_length_segment_leaves_buffer_unchanged() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    h.controller.begin().await.expect("stream granted");
    let feed = h.recorders.last_feed().expect("recorder started");

    assert!(feed.push(vec![1u8; 8]).await);
    let controller = &h.controller;
    eventually(move || async move { controller.stats().await.segments_buffered == 1 }).await;

    assert!(feed.push(Vec::new()).await);
    eventually(move || async move { controller.stats().await.segments_discarded == 1 }).await;

    let stats = h.controller.stats().await;
    assert_eq!(stats.segments_buffered, 1);
    assert_eq!(stats.bytes_buffered, 8);

    h.controller.end().await;
    Ok(())
}

#[tokio::test]
async fn test_end_releases_every_track_and_clears_preview() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    h.controller.begin().await.expect("stream granted");
    h.controller.end().await;

    let tracks = h.devices.issued_tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].len(), 2, "audio and video tracks");
    assert!(tracks[0].iter().all(|t| t.stop_calls() >= 1));

    assert!(h.preview.current_stream().is_none());
    assert!(!h.controller.holds_stream().await);
    assert!(!h.controller.holds_recorder().await);
    assert_eq!(h.recorders.live(), 0);

    Ok(())
}

#[tokio::test]
async fn test_second_end_is_a_noop() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    h.controller.begin().await.expect("stream granted");
    let first = h.controller.end().await;
    let second = h.controller.end().await;

    assert!(!first.is_empty());
    assert_eq!(second, "");
    assert_eq!(h.controller.status(), SessionStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_retry_after_error() -> Result<()> {
    let h = harness(
        SimulatedDevices::denying(CaptureError::DeviceBusy("camera in use".into())),
        SimulatedRecorderConfig::default(),
    );

    assert!(h.controller.begin().await.is_none());
    assert_eq!(h.controller.status(), SessionStatus::Error);

    h.devices.set_denial(None);
    assert!(h.controller.begin().await.is_some());

    assert_eq!(h.controller.status(), SessionStatus::Recording);
    assert!(h.controller.error().is_none(), "fresh attempt clears the error");

    h.controller.end().await;
    Ok(())
}

#[tokio::test]
async fn test_recorder_create_failure_releases_stream() -> Result<()> {
    let h = harness(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            fail_create: Some(CaptureError::Unsupported("no webm encoder".into())),
            ..SimulatedRecorderConfig::default()
        },
    );

    assert!(h.controller.begin().await.is_none());

    assert_eq!(h.controller.status(), SessionStatus::Error);
    assert_eq!(
        h.controller.error(),
        Some(CaptureError::Unsupported("no webm encoder".into()))
    );
    assert!(h.devices.issued_streams().iter().all(|s| !s.is_active()));
    assert!(h.preview.current_stream().is_none());
    assert!(!h.controller.holds_stream().await);

    Ok(())
}

#[tokio::test]
async fn test_recorder_start_failure_releases_stream() -> Result<()> {
    let h = harness(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            fail_start: Some(CaptureError::DeviceBusy("encoder busy".into())),
            ..SimulatedRecorderConfig::default()
        },
    );

    assert!(h.controller.begin().await.is_none());

    assert_eq!(h.controller.status(), SessionStatus::Error);
    assert_eq!(
        h.controller.error(),
        Some(CaptureError::DeviceBusy("encoder busy".into()))
    );
    assert_eq!(h.recorders.created(), 1);
    assert_eq!(h.recorders.live(), 0);

    let tracks = h.devices.issued_tracks();
    assert_eq!(tracks.len(), 1);
    assert!(tracks[0].iter().all(|t| t.stop_calls() >= 1));

    // Preview was attached before the recorder failed, then cleared
    assert_eq!(h.preview.plays(), 1);
    assert!(h.preview.current_stream().is_none());
    assert!(!h.controller.holds_stream().await);
    assert!(!h.controller.holds_recorder().await);

    Ok(())
}

#[tokio::test]
async fn test_event_stream_closing_without_confirmation_fails_session() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await.expect("stream granted");
    let feed = h.recorders.last_feed().expect("recorder started");

    assert!(feed.push(vec![3u8; 12]).await);
    assert!(feed.close());

    let controller = &h.controller;
    eventually(move || async move { controller.status() == SessionStatus::Error }).await;

    assert_eq!(
        h.controller.error(),
        Some(CaptureError::Recorder(
            "event stream closed before stop confirmation".into()
        ))
    );
    assert!(!stream.is_active());
    assert!(h.preview.current_stream().is_none());
    assert!(!h.controller.holds_stream().await);
    assert_eq!(h.recorders.live(), 0);
    assert_eq!(h.controller.stats().await.segments_buffered, 0);

    assert_eq!(h.controller.end().await, "");
    Ok(())
}

#[tokio::test]
async fn test_recorder_failure_while_recording() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await.expect("stream granted");
    let feed = h.recorders.last_feed().expect("recorder started");

    assert!(feed.push(vec![1u8; 16]).await);
    assert!(feed.fail("encoder crashed").await);

    let controller = &h.controller;
    eventually(move || async move { controller.status() == SessionStatus::Error }).await;

    assert_eq!(
        h.controller.error(),
        Some(CaptureError::Recorder("encoder crashed".into()))
    );
    assert!(!stream.is_active());
    assert!(h.preview.current_stream().is_none());
    assert!(!h.controller.holds_stream().await);
    assert_eq!(h.controller.stats().await.segments_buffered, 0);

    assert_eq!(h.controller.end().await, "");
    Ok(())
}

#[tokio::test]
async fn test_missing_stop_confirmation_times_out() -> Result<()> {
    let h = harness_with_config(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            confirm_stop: false,
            ..SimulatedRecorderConfig::default()
        },
        CaptureConfig {
            stop_timeout_ms: 50,
            ..CaptureConfig::default()
        },
    );

    let stream = h.controller.begin().await.expect("stream granted");

    let uri = h.controller.end().await;

    assert_eq!(uri, "");
    assert_eq!(h.controller.status(), SessionStatus::Error);
    assert_eq!(h.controller.error(), Some(CaptureError::StopTimeout(50)));
    assert!(!stream.is_active());
    assert!(h.preview.current_stream().is_none());

    Ok(())
}

#[tokio::test]
async fn test_pending_stop_does_not_block_queries() -> Result<()> {
    let h = harness_with_config(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            confirm_stop: false,
            ..SimulatedRecorderConfig::default()
        },
        CaptureConfig {
            stop_timeout_ms: 200,
            ..CaptureConfig::default()
        },
    );

    h.controller.begin().await.expect("stream granted");

    let end = h.controller.end();
    tokio::pin!(end);
    assert!(futures::poll!(&mut end).is_pending());

    let stats = h
        .controller
        .stats()
        .now_or_never()
        .expect("stats available while stopping");
    assert_eq!(stats.status, SessionStatus::Recording);
    assert_eq!(h.controller.holds_stream().now_or_never(), Some(true));
    assert_eq!(h.controller.holds_recorder().now_or_never(), Some(false));

    // A concurrent end does not wait on the stop in progress
    assert_eq!(h.controller.end().now_or_never(), Some(String::new()));

    assert_eq!(end.await, "");
    assert_eq!(h.controller.error(), Some(CaptureError::StopTimeout(200)));
    assert!(!h.controller.holds_stream().await);

    Ok(())
}

#[tokio::test]
async fn test_begin_during_stop_supersedes_the_recording() -> Result<()> {
    let h = harness_with_config(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            confirm_stop: false,
            ..SimulatedRecorderConfig::default()
        },
        CaptureConfig {
            stop_timeout_ms: 200,
            ..CaptureConfig::default()
        },
    );

    let first = h.controller.begin().await.expect("first stream");

    let end = h.controller.end();
    tokio::pin!(end);
    assert!(futures::poll!(&mut end).is_pending());

    let second = h.controller.begin().await.expect("second stream");
    assert!(!first.is_active(), "stopping stream released by the new begin");
    assert_eq!(h.controller.status(), SessionStatus::Recording);

    // The superseded stop resolves empty and leaves the new session alone
    assert_eq!(end.await, "");
    assert_eq!(h.controller.status(), SessionStatus::Recording);
    assert!(h.controller.error().is_none());
    assert!(second.is_active());

    let attached = h.preview.current_stream().expect("new stream still previewed");
    assert!(attached.same_stream(&second));
    assert!(h.controller.holds_recorder().await);

    h.controller.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_releases_without_changing_status() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await.expect("stream granted");
    h.controller.shutdown().await;

    assert!(!stream.is_active());
    assert!(h.preview.current_stream().is_none());
    assert_eq!(h.recorders.live(), 0);
    assert_eq!(h.controller.status(), SessionStatus::Recording);
    assert!(!h.controller.holds_stream().await);

    // Nothing left to finalize
    assert_eq!(h.controller.end().await, "");

    Ok(())
}

#[tokio::test]
async fn test_grant_after_shutdown_is_discarded() -> Result<()> {
    let h = harness(SimulatedDevices::gated(), SimulatedRecorderConfig::default());

    let begin = h.controller.begin();
    tokio::pin!(begin);
    assert!(futures::poll!(&mut begin).is_pending());

    h.controller.shutdown().await;
    h.devices.release();

    assert!(begin.await.is_none());
    assert!(h.devices.issued_streams().iter().all(|s| !s.is_active()));
    assert!(h.preview.current_stream().is_none());
    assert_eq!(h.recorders.created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_drop_tears_down_held_stream() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());

    let stream = h.controller.begin().await.expect("stream granted");
    let Harness {
        preview, controller, ..
    } = h;

    drop(controller);

    assert!(!stream.is_active());
    assert!(preview.current_stream().is_none());

    Ok(())
}

#[tokio::test]
async fn test_failed_playback_does_not_fail_session() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::granting());
    let recorders = Arc::new(SimulatedRecorderFactory::default());
    let preview = Arc::new(MemoryPreviewSink::failing_playback());
    let controller = CaptureController::new(
        CaptureConfig::default(),
        devices,
        recorders,
        preview.clone(),
    );

    assert!(controller.begin().await.is_some());
    assert_eq!(controller.status(), SessionStatus::Recording);
    assert!(preview.current_stream().is_some());

    controller.end().await;
    Ok(())
}

#[tokio::test]
async fn test_subscribers_observe_transitions() -> Result<()> {
    let h = harness(SimulatedDevices::granting(), SimulatedRecorderConfig::default());
    let mut states = h.controller.subscribe();

    h.controller.begin().await.expect("stream granted");
    assert!(states.has_changed()?);
    assert_eq!(states.borrow_and_update().status, SessionStatus::Recording);

    h.controller.end().await;
    assert!(states.has_changed()?);
    assert_eq!(states.borrow_and_update().status, SessionStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_ticking_recorder_accumulates_while_recording() -> Result<()> {
    let h = harness(
        SimulatedDevices::granting(),
        SimulatedRecorderConfig {
            segment_interval: Some(Duration::from_millis(5)),
            segment_bytes: 64,
            ..SimulatedRecorderConfig::default()
        },
    );

    h.controller.begin().await.expect("stream granted");
    let controller = &h.controller;
    eventually(move || async move { controller.stats().await.segments_buffered >= 3 }).await;

    let stats = h.controller.stats().await;
    assert!(stats.recording_started_at.is_some());
    assert_eq!(stats.bytes_buffered, stats.segments_buffered * 64);

    let recording = h.controller.finish().await.expect("recording finalized");
    assert!(recording.len() >= 3 * 64);
    assert_eq!(recording.len() % 64, 0);

    // Nothing accumulates once stopped
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.controller.stats().await.segments_buffered, 0);

    Ok(())
}
