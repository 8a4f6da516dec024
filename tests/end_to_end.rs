// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! End-to-end coverage for the six literal scenarios in the spec's
//! testable-properties section, driven against the pure detection/ledger
//! core and the ffmpeg/external-process boundaries directly (no live
//! camera, no real ONVIF session).

use std::time::{Duration, Instant};

use onvifeye::config::CameraConfig;
use onvifeye::detection::{DetectionTable, HandledLedger, Seen};
use onvifeye::error::NvrError;
use onvifeye::{external, ffmpeg};

fn seen_at(base: Instant, wall: chrono::DateTime<chrono::Local>, offset: Duration) -> Seen {
    Seen {
        at: base + offset,
        wall,
    }
}

/// Scenario 1: two events at the same instant form one incident, fire the
/// handler exactly once, and both keys land in HandledLedger under that
/// instant.
#[test]
fn two_events_one_incident() {
    let table = DetectionTable::new();
    let t0 = Seen::now();
    table.insert_if_absent("IsPeople".into(), t0);
    table.insert_if_absent("IsCar".into(), t0);

    let snapshot = table.snapshot_relevant(|_| true);
    assert_eq!(snapshot.len(), 2);

    let mut ledger = HandledLedger::new();
    let mut fire_count = 0;
    if ledger.is_new_trigger(&snapshot) {
        fire_count += 1;
        ledger.mark_handled(&snapshot);
    }
    // A second poll of the same, unchanged snapshot must not fire again.
    let snapshot2 = table.snapshot_relevant(|_| true);
    assert!(!ledger.is_new_trigger(&snapshot2));
    if ledger.is_new_trigger(&snapshot2) {
        fire_count += 1;
    }

    assert_eq!(fire_count, 1);
}

/// Scenario 2: an inactive transition is tracked as a distinct sentinel key
/// and never counted as a new, relevant trigger.
#[test]
fn inactive_transitions_are_ignored_by_handlers() {
    let table = DetectionTable::new();
    let wall = chrono::Local::now();
    let t0 = Instant::now();

    table.insert_if_absent("IsPeople".into(), Seen { at: t0, wall });
    table.insert_if_absent(
        "IsPeople_False".into(),
        Seen {
            at: t0 + Duration::from_secs(1),
            wall,
        },
    );

    assert!(table.get("IsPeople").is_some());
    assert!(table.get("IsPeople_False").is_some());

    let relevant = table.snapshot_relevant(|_| true);
    assert_eq!(relevant.len(), 1);
    assert_eq!(relevant[0].0, "IsPeople");

    let mut ledger = HandledLedger::new();
    let mut saves = 0;
    if ledger.is_new_trigger(&relevant) {
        saves += 1;
        ledger.mark_handled(&relevant);
    }
    assert_eq!(saves, 1);
}

/// Scenario 3: an entry older than expiry is evicted, and a later arrival of
/// the same key is a distinct incident.
#[test]
fn expired_detection_is_a_new_incident_on_return() {
    let table = DetectionTable::new();
    let wall = chrono::Local::now();
    let t0 = Instant::now();
    let expiry = Duration::from_secs(60);

    table.insert_if_absent("IsPeople".into(), seen_at(t0, wall, Duration::ZERO));

    let at_61 = t0 + Duration::from_secs(61);
    table.evict_older_than(expiry, at_61);
    assert!(table.get("IsPeople").is_none());

    let at_62 = seen_at(t0, wall, Duration::from_secs(62));
    table.insert_if_absent("IsPeople".into(), at_62);
    assert_eq!(table.get("IsPeople").unwrap().at, at_62.at);

    let mut ledger = HandledLedger::new();
    let first = vec![("IsPeople".to_string(), seen_at(t0, wall, Duration::ZERO))];
    ledger.mark_handled(&first);
    let second = vec![("IsPeople".to_string(), at_62)];
    assert!(ledger.is_new_trigger(&second));
}

/// Scenario 4: a wedged ffmpeg process is killed at the timeout and reported
/// as an encoder failure; the daemon is free to proceed to the next
/// incident immediately afterward.
#[tokio::test]
async fn ffmpeg_timeout_is_reported_and_does_not_hang() {
    let dir = tempfile::tempdir().unwrap();
    let stub = dir.path().join("ffmpeg");
    std::fs::write(&stub, "#!/bin/sh\nsleep 30\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let old_path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", dir.path().display(), old_path));

    let result = ffmpeg::run("cam1", &["-y".to_string()], Duration::from_millis(200)).await;
    std::env::set_var("PATH", old_path);

    match result {
        Err(NvrError::Encoder { reason, .. }) => assert!(reason.contains("timed out")),
        other => panic!("expected an Encoder timeout error, got {other:?}"),
    }
}

/// Scenario 5: `--create-config`/discover round-trips the full default
/// schema, and rejects a filename without `.conf`.
#[test]
fn create_config_round_trips_defaults() {
    let dir = tempfile::tempdir().unwrap();
    onvifeye::config::create_config(dir.path(), std::path::Path::new("cam1.conf")).unwrap();

    let configs = onvifeye::config::discover_configs(dir.path()).unwrap();
    assert_eq!(configs.len(), 1);
    let cfg = &configs[0];
    assert_eq!(cfg.camera_stream_name, "mainStream");
    assert_eq!(cfg.camera_stills_stream_name, "jpegStream");
    assert_eq!(cfg.camera_clip_seconds, 30);
    assert!(cfg.camera_grab_stills_from_video);

    let err = onvifeye::config::create_config(dir.path(), std::path::Path::new("cam1")).unwrap_err();
    assert!(matches!(err, NvrError::Config(_)));
}

/// Scenario 6: the external handler is invoked with exactly one argv
/// positional per triggered event, shaped `<name>/<YYYYMMDD-HHMMSS>`.
#[tokio::test]
async fn external_handler_receives_expected_argv() {
    let dir = tempfile::tempdir().unwrap();
    let out_file = dir.path().join("argv.txt");
    let script = dir.path().join("record_argv.sh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" > {}\n", out_file.display()),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let mut cfg = CameraConfig::default();
    cfg.camera_event_exec = script.to_string_lossy().into_owned();

    // Built via `from_local_datetime` (not a UTC-to-Local conversion) so the
    // formatted wall-clock value below is independent of the host's timezone.
    use chrono::TimeZone;
    let naive = chrono::NaiveDateTime::parse_from_str("2025-01-02 03:04:05", "%Y-%m-%d %H:%M:%S").unwrap();
    let wall = chrono::Local.from_local_datetime(&naive).unwrap();
    let incident = Seen {
        at: Instant::now(),
        wall,
    };

    external::spawn_handler(&cfg, "front-door", &[("IsPeople".to_string(), incident)])
        .await
        .unwrap();

    // The script runs detached; give it a moment to flush its output.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let contents = std::fs::read_to_string(&out_file).unwrap();
    assert_eq!(contents.trim(), "front-door IsPeople/20250102-030405");
}
