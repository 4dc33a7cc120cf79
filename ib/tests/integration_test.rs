//! End-to-end tests: the real scheduler, stores, and agents running in
//! deterministic mock mode against a temp storage directory.

use std::sync::Arc;
use std::time::Duration;

use invisibrow::agent::MANUAL_LOGIN_GOAL;
use invisibrow::browser::{PageDriver, StubDriver};
use invisibrow::config::ModelsConfig;
use invisibrow::domain::{InteractiveElement, PageSnapshot, TaskStatus};
use invisibrow::events::{Event, EventBus};
use invisibrow::llm::{ChatClient, MessageLog, ScriptedChat};
use invisibrow::scheduler::{DriverFactory, Scheduler, SchedulerConfig, SchedulerDeps};
use invisibrow::store::{RESTART_ERROR, SessionStore, TaskStore};
use memstore::{MemoryStatus, MemoryStore};
use tempfile::TempDir;

struct Harness {
    scheduler: Scheduler,
    sessions: Arc<SessionStore>,
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    bus: Arc<EventBus>,
    chat: Arc<ScriptedChat>,
    driver: Arc<StubDriver>,
    dir: TempDir,
}

fn harness(max_concurrent: usize) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let storage = dir.path().to_path_buf();

    let tasks = Arc::new(TaskStore::open(&storage).unwrap());
    let sessions = Arc::new(SessionStore::open(&storage).unwrap());
    let memory = Arc::new(MemoryStore::open(storage.join("memory.sqlite")).unwrap());
    let bus = Arc::new(EventBus::with_default_capacity());
    let chat = Arc::new(ScriptedChat::new());
    let driver = Arc::new(StubDriver::new());

    let factory: DriverFactory = {
        let driver = driver.clone();
        Arc::new(move || driver.clone() as Arc<dyn PageDriver>)
    };

    let scheduler = Scheduler::new(
        SchedulerConfig { max_concurrent },
        ModelsConfig::default(),
        SchedulerDeps {
            tasks: tasks.clone(),
            sessions: sessions.clone(),
            memory: memory.clone(),
            bus: bus.clone(),
            chat: chat.clone() as Arc<dyn ChatClient>,
            audit: Arc::new(MessageLog::new(&storage)),
            storage_dir: storage,
            driver_factory: factory,
        },
    );

    Harness {
        scheduler,
        sessions,
        tasks,
        memory,
        bus,
        chat,
        driver,
        dir,
    }
}

async fn wait_for(tasks: &TaskStore, id: &str, status: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if tasks.get(id).map(|t| t.status) == Some(status) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for task {} to reach {}",
            id,
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_full_pipeline_persists_everything() {
    let h = harness(2);
    let session = h.sessions.create("work").unwrap();

    let task_id = h.scheduler.submit(&session.id, "look something up").unwrap();
    wait_for(&h.tasks, &task_id, TaskStatus::Completed).await;

    // durable layout: sessions.json, tasks.json, memory.sqlite, message/
    assert!(h.dir.path().join("sessions.json").exists());
    assert!(h.dir.path().join("tasks.json").exists());
    assert!(h.dir.path().join("memory.sqlite").exists());
    let planner_msgs = h.dir.path().join("message").join(&session.id).join("planner");
    assert!(planner_msgs.exists());
    assert!(std::fs::read_dir(&planner_msgs).unwrap().count() >= 1);

    // the task round-trips through a fresh store with step order intact
    let before = h.tasks.get(&task_id).unwrap();
    let reopened = TaskStore::open(h.dir.path()).unwrap();
    let after = reopened.get(&task_id).unwrap();
    assert_eq!(after.status, TaskStatus::Completed);
    assert_eq!(
        before.steps.iter().map(|s| s.command.clone()).collect::<Vec<_>>(),
        after.steps.iter().map(|s| s.command.clone()).collect::<Vec<_>>(),
    );

    // memory record and session history both exist exactly once
    let record = h.memory.get(&task_id).unwrap().unwrap();
    assert_eq!(record.status, MemoryStatus::Success);
    assert_eq!(h.sessions.history(&session.id).len(), 1);
}

#[tokio::test]
async fn test_session_stats_updated_events_flow() {
    let h = harness(2);
    let session = h.sessions.create("s").unwrap();
    let mut rx = h.bus.subscribe();

    let task_id = h.scheduler.submit(&session.id, "count my tokens").unwrap();
    wait_for(&h.tasks, &task_id, TaskStatus::Completed).await;

    let mut stats_updates = 0;
    while let Ok(event) = rx.try_recv() {
        if let Event::SessionStatsUpdated { session_id } = event {
            assert_eq!(session_id, session.id);
            stats_updates += 1;
        }
    }
    // one stats event per LLM call
    assert_eq!(stats_updates, h.chat.call_count());

    let stats = h.sessions.get(&session.id).unwrap().stats;
    assert_eq!(stats.tokens, h.chat.call_count() as u64 * 160);
    assert!(stats.cost > 0.0);
}

#[tokio::test]
async fn test_intervention_round_trip() {
    let h = harness(2);
    let session = h.sessions.create("s").unwrap();

    // the first page the executor sees trips the tier-1 keyword scan
    h.driver.add_page("about:blank", PageSnapshot {
        url: "about:blank".to_string(),
        title: "CAPTCHA check".to_string(),
        interactive_elements: vec![],
        content_snippet: String::new(),
    });

    let mut rx = h.bus.subscribe();
    let task_id = h.scheduler.submit(&session.id, "read the page").unwrap();

    // the core announces the block
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let (needed_session, url) = loop {
        assert!(tokio::time::Instant::now() < deadline, "no verification request seen");
        match rx.recv().await.unwrap() {
            Event::VerificationNeeded { session_id, url, .. } => break (session_id, url),
            _ => continue,
        }
    };
    assert_eq!(needed_session, session.id);
    assert_eq!(url, "about:blank");
    // browser flipped to GUI mode while the human works
    assert!(!h.driver.is_headless());
    assert!(h.sessions.get(&session.id).unwrap().is_verifying);

    // the human solves the block; the page is clean afterwards
    h.driver.add_page("about:blank", PageSnapshot {
        url: "about:blank".to_string(),
        title: "Plain article".to_string(),
        interactive_elements: vec![InteractiveElement {
            index: 0,
            tag: "a".to_string(),
            text: "next".to_string(),
        }],
        content_snippet: "readable content".to_string(),
    });
    h.bus.emit(Event::VerificationResolved {
        session_id: session.id.clone(),
    });

    wait_for(&h.tasks, &task_id, TaskStatus::Completed).await;
    // preferred mode restored, verifying flag cleared
    assert!(h.driver.is_headless());
    assert!(!h.sessions.get(&session.id).unwrap().is_verifying);
}

#[tokio::test]
async fn test_restart_marks_inflight_tasks_failed() {
    let h = harness(1);
    let session = h.sessions.create("s").unwrap();

    // a task parked behind a blocker is still pending when the "process"
    // dies
    let blocker = h.scheduler.submit(&session.id, MANUAL_LOGIN_GOAL).unwrap();
    wait_for(&h.tasks, &blocker, TaskStatus::Running).await;
    let parked = h.scheduler.submit(&session.id, "never gets to run").unwrap();

    // simulate restart: reload the store from disk
    let reopened = TaskStore::open(h.dir.path()).unwrap();
    for id in [&blocker, &parked] {
        let task = reopened.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some(RESTART_ERROR));
    }

    h.scheduler.stop(&blocker);
    h.scheduler.stop(&parked);
}

#[tokio::test]
async fn test_learned_keywords_survive_and_prefilter() {
    let h = harness(1);
    let session = h.sessions.create("s").unwrap();

    // tier 2 confirms an intervention and teaches new keywords
    h.driver.add_page("about:blank", PageSnapshot {
        url: "about:blank".to_string(),
        title: "Pardon Our Interruption".to_string(),
        interactive_elements: vec![],
        content_snippet: "please verify".to_string(),
    });
    h.chat.push("watchdog_check", serde_json::json!({
        "is_stuck": false,
        "needs_intervention": true,
        "reason": "verification wall covers the page",
        "new_block_keywords": ["pardon our interruption"],
    }));

    let mut rx = h.bus.subscribe();
    let task_id = h.scheduler.submit(&session.id, "read it").unwrap();

    loop {
        if let Event::VerificationNeeded { .. } = rx.recv().await.unwrap() {
            break;
        }
    }
    // the phrase is now in the durable keyword list
    let keywords = h.memory.get_bot_keywords().unwrap();
    assert!(keywords.iter().any(|k| k == "pardon our interruption"));
    // and tokenized title words of length >= 4 came along
    assert!(keywords.iter().any(|k| k == "interruption"));

    h.scheduler.stop(&task_id);
    wait_for(&h.tasks, &task_id, TaskStatus::Cancelled).await;
}

#[tokio::test]
async fn test_executor_goal_embeds_known_values() {
    let h = harness(1);
    let session = h.sessions.create("s").unwrap();
    h.sessions
        .push_history(&session.id, "2026-07-01 09:00 goal: find the member id / result: member id is X-991")
        .unwrap();

    // scripted planner reply that follows the embed-known-values rule
    h.chat.push("plan_step", serde_json::json!({
        "thought": "the member id is already known from this session",
        "command": "browser",
        "input": {"goal": "open the portal and enter member id X-991", "answer": null},
    }));

    let task_id = h.scheduler.submit(&session.id, "log into the member portal").unwrap();
    wait_for(&h.tasks, &task_id, TaskStatus::Completed).await;

    // the plan prompt carried the history entry verbatim
    let plan_request = h
        .chat
        .requests()
        .into_iter()
        .find(|r| r.schema_name == "plan_step")
        .unwrap();
    assert!(plan_request.system.contains("member id is X-991"));

    // and the first browser step's command embeds the known value
    let task = h.tasks.get(&task_id).unwrap();
    let browser_step = task.steps.iter().find(|s| s.command.starts_with("browser:")).unwrap();
    assert!(browser_step.command.contains("X-991"));
}
