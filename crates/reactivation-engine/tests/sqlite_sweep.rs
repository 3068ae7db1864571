//! End-to-end sweeps against an in-memory SQLite database.
//!
//! Run with:
//!   cargo test -p reactivation-engine --test sqlite_sweep

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use database::models::{Conversation, SettingsRecord, StepRecord};
use database::{conversation, cursor, human_queue, settings, step, Database};
use reactivation_engine::{
    EngineConfig, RecordingChannel, ReactivationEngine, ReactivationScheduler, SqliteStore,
};

const TENANT: &str = "acme";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap()
}

fn minutes(n: i64) -> DateTime<Utc> {
    start() + Duration::minutes(n)
}

async fn test_db() -> Database {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .unwrap();
    db.migrate().await.unwrap();
    db
}

fn settings_record() -> SettingsRecord {
    SettingsRecord {
        tenant_id: TENANT.to_string(),
        enabled: true,
        exhausted_action: "do_nothing".to_string(),
        exhausted_message: None,
        max_window_minutes: None,
        max_window_action: "do_nothing".to_string(),
        max_window_message: None,
        utc_offset_minutes: 0,
    }
}

fn step_record(id: &str, position: i64, wait: i64, action: &str, text: Option<&str>) -> StepRecord {
    StepRecord {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        position,
        wait_minutes: wait,
        action_type: action.to_string(),
        action_parameter: text.map(str::to_string),
        window_start: None,
        window_end: None,
        tag_ids: "[]".to_string(),
    }
}

async fn add_conversation(db: &Database, id: &str, last_inbound_at: DateTime<Utc>) {
    let at_ms = last_inbound_at.timestamp_millis();
    conversation::create_conversation(
        db.pool(),
        &Conversation {
            id: id.to_string(),
            tenant_id: TENANT.to_string(),
            status: "open".to_string(),
            automation_enabled: true,
            last_inbound_at_ms: Some(at_ms),
            created_at_ms: at_ms,
            updated_at_ms: at_ms,
        },
    )
    .await
    .unwrap();
}

struct Harness {
    db: Database,
    channel: Arc<RecordingChannel>,
    engine: ReactivationEngine,
}

async fn harness(settings_record: SettingsRecord, steps: Vec<StepRecord>) -> Harness {
    let db = test_db().await;
    settings::upsert_settings(db.pool(), &settings_record).await.unwrap();
    step::replace_steps(db.pool(), TENANT, &steps).await.unwrap();

    let store = Arc::new(SqliteStore::new(db.clone(), Duration::minutes(1)));
    let channel = Arc::new(RecordingChannel::new());
    let engine = ReactivationEngine::new(store, channel.clone(), &EngineConfig::default());

    Harness { db, channel, engine }
}

#[tokio::test]
async fn test_sequence_runs_in_order_then_transfers() {
    let mut first = step_record("nudge", 0, 30, "send_message", Some("Still there?"));
    first.tag_ids = StepRecord::encode_tags(&["nudged".to_string()]).unwrap();
    let h = harness(
        settings_record(),
        vec![
            first,
            step_record("reminder", 1, 60, "send_audio", Some("Quick reminder")),
            step_record("handover", 2, 120, "transfer_to_human", None),
        ],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;

    assert_eq!(h.engine.sweep(minutes(29)).await.waiting, 1);
    assert_eq!(h.engine.sweep(minutes(30)).await.executed, 1);
    assert_eq!(h.engine.sweep(minutes(89)).await.waiting, 1);
    assert_eq!(h.engine.sweep(minutes(90)).await.executed, 1);
    assert_eq!(h.engine.sweep(minutes(210)).await.executed, 1);

    assert_eq!(
        h.channel.sent_to("c1").await,
        vec!["Still there?".to_string(), "Quick reminder".to_string()]
    );
    assert_eq!(
        conversation::list_tags(h.db.pool(), "c1").await.unwrap(),
        vec!["nudged".to_string()]
    );

    let queued = human_queue::list_pending(h.db.pool(), TENANT).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].conversation_id, "c1");

    let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(record.status, "resolved");
    assert_eq!(record.last_executed_step_index, 2);
    assert_eq!(record.claimed_at_ms, None);

    // Automation is off now, so the conversation is no longer a candidate.
    assert_eq!(h.engine.sweep(minutes(600)).await.candidates, 0);
}

#[tokio::test]
async fn test_concurrent_schedulers_send_once() {
    let h = harness(
        settings_record(),
        vec![step_record("nudge", 0, 30, "send_message", Some("Hello?"))],
    )
    .await;
    for n in 0..12 {
        add_conversation(&h.db, &format!("conv-{}", n), start()).await;
    }

    let other: Arc<ReactivationScheduler> = {
        let store = Arc::new(SqliteStore::new(h.db.clone(), Duration::minutes(1)));
        ReactivationEngine::new(store, h.channel.clone(), &EngineConfig::default()).scheduler()
    };

    let (a, b) = tokio::join!(h.engine.sweep(minutes(31)), other.sweep(minutes(31)));
    assert_eq!(a.errors + b.errors, 0);

    for n in 0..12 {
        assert_eq!(
            h.channel.sent_to(&format!("conv-{}", n)).await,
            vec!["Hello?".to_string()]
        );
    }
}

#[tokio::test]
async fn test_reply_resets_the_sequence() {
    let h = harness(
        settings_record(),
        vec![
            step_record("nudge", 0, 30, "send_message", Some("First")),
            step_record("again", 1, 30, "send_message", Some("Second")),
        ],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;

    h.engine.sweep(minutes(30)).await;
    h.engine.on_inbound_message("c1", minutes(45)).await.unwrap();

    let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(record.anchor_at_ms, minutes(45).timestamp_millis());
    assert_eq!(record.last_executed_step_index, -1);

    // 60 minutes after the original anchor, but only 15 after the reply.
    assert_eq!(h.engine.sweep(minutes(60)).await.executed, 0);
    h.engine.sweep(minutes(75)).await;

    assert_eq!(
        h.channel.sent_to("c1").await,
        vec!["First".to_string(), "First".to_string()]
    );
}

#[tokio::test]
async fn test_window_defers_until_open() {
    let mut gated = step_record("business-hours", 0, 10, "send_message", Some("Good morning"));
    gated.window_start = Some(9 * 60);
    gated.window_end = Some(17 * 60);
    let h = harness(settings_record(), vec![gated]).await;

    let evening = Utc.with_ymd_and_hms(2026, 1, 12, 20, 0, 0).unwrap();
    add_conversation(&h.db, "c1", evening).await;

    let report = h.engine.sweep(evening + Duration::minutes(30)).await;
    assert_eq!(report.waiting, 1);
    assert!(h.channel.sent().await.is_empty());

    let next_morning = Utc.with_ymd_and_hms(2026, 1, 13, 9, 0, 0).unwrap();
    assert_eq!(h.engine.sweep(next_morning).await.executed, 1);
    assert_eq!(h.channel.sent_to("c1").await, vec!["Good morning".to_string()]);
}

#[tokio::test]
async fn test_max_window_beats_pending_step() {
    let settings_record = SettingsRecord {
        max_window_minutes: Some(60),
        max_window_action: "close_conversation".to_string(),
        max_window_message: Some("Closing this chat for now.".to_string()),
        ..settings_record()
    };
    let h = harness(
        settings_record,
        vec![step_record("late", 0, 90, "send_message", Some("Never sent"))],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;

    assert_eq!(h.engine.sweep(minutes(60)).await.waiting, 1);
    assert_eq!(h.engine.sweep(minutes(61)).await.executed, 1);

    assert_eq!(
        h.channel.sent_to("c1").await,
        vec!["Closing this chat for now.".to_string()]
    );
    let conv = conversation::get_conversation(h.db.pool(), "c1").await.unwrap();
    assert_eq!(conv.status, "closed");
    assert_eq!(h.engine.sweep(minutes(120)).await.candidates, 0);
}

#[tokio::test]
async fn test_exhausted_fallback_runs_once() {
    let settings_record = SettingsRecord {
        exhausted_action: "send_message".to_string(),
        exhausted_message: Some("Reach out whenever you're ready.".to_string()),
        ..settings_record()
    };
    let h = harness(
        settings_record,
        vec![step_record("nudge", 0, 30, "send_message", Some("Hello?"))],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;

    h.engine.sweep(minutes(30)).await;
    h.engine.sweep(minutes(31)).await;
    h.engine.sweep(minutes(500)).await;

    assert_eq!(
        h.channel.sent_to("c1").await,
        vec![
            "Hello?".to_string(),
            "Reach out whenever you're ready.".to_string()
        ]
    );
    let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(record.status, "resolved");
}

#[tokio::test]
async fn test_send_failure_rolls_back_and_retries() {
    let h = harness(
        settings_record(),
        vec![step_record("nudge", 0, 30, "send_message", Some("Hello?"))],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;
    h.channel.fail_next(2);

    for expected_failures in 1..=2 {
        assert_eq!(h.engine.sweep(minutes(30)).await.failed, 1);
        let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
        assert_eq!(record.consecutive_failures, expected_failures);
        assert_eq!(record.last_executed_step_index, -1);
        assert_eq!(record.claimed_at_ms, None);
    }

    assert_eq!(h.engine.sweep(minutes(31)).await.executed, 1);
    let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.last_executed_step_index, 0);
    assert_eq!(h.channel.sent_to("c1").await, vec!["Hello?".to_string()]);
}

#[tokio::test]
async fn test_corrupt_candidate_does_not_block_the_sweep() {
    let h = harness(
        settings_record(),
        vec![step_record("nudge", 0, 30, "send_message", Some("Still there?"))],
    )
    .await;
    add_conversation(&h.db, "good", start()).await;
    conversation::create_conversation(
        h.db.pool(),
        &Conversation {
            id: "bad".to_string(),
            tenant_id: TENANT.to_string(),
            status: "open".to_string(),
            automation_enabled: true,
            last_inbound_at_ms: Some(i64::MIN),
            created_at_ms: start().timestamp_millis(),
            updated_at_ms: start().timestamp_millis(),
        },
    )
    .await
    .unwrap();

    let report = h.engine.sweep(minutes(30)).await;
    assert_eq!(report.candidates, 1);
    assert_eq!(report.executed, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(h.channel.sent_to("good").await, vec!["Still there?".to_string()]);
    assert!(h.channel.sent_to("bad").await.is_empty());
}

#[tokio::test]
async fn test_redelivered_inbound_does_not_reset() {
    let h = harness(
        settings_record(),
        vec![
            step_record("nudge", 0, 30, "send_message", Some("Still there?")),
            step_record("again", 1, 60, "send_message", Some("Last check")),
        ],
    )
    .await;
    add_conversation(&h.db, "c1", start()).await;

    let at = start() + Duration::microseconds(1500);
    h.engine.on_inbound_message("c1", at).await.unwrap();
    assert_eq!(h.engine.sweep(minutes(31)).await.executed, 1);

    h.engine.on_inbound_message("c1", at).await.unwrap();
    let record = cursor::get_cursor(h.db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(record.last_executed_step_index, 0);

    h.engine.sweep(minutes(60)).await;
    assert_eq!(h.channel.sent_to("c1").await, vec!["Still there?".to_string()]);
}
