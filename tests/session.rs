use std::{sync::Arc, time::Duration};

use blipnote::{
    Config, FileKeyValueStore, KeyValueStore, ManualClock, MemoSession, MemoryKeyValueStore,
    NotePatch, RecordingNotifier,
};

const T0: i64 = 1_700_000_000_000;

fn open_session(
    config: &Config,
    kv: Arc<dyn KeyValueStore>,
) -> (MemoSession, Arc<ManualClock>, Arc<RecordingNotifier>) {
    let clock = Arc::new(ManualClock::new(T0));
    let notifier = Arc::new(RecordingNotifier::new());
    let session = MemoSession::open(config, kv, notifier.clone(), clock.clone()).unwrap();
    (session, clock, notifier)
}

fn quiet_sweeper() -> Config {
    Config {
        sweep_interval_ms: 600_000,
        warning_window_ms: 600_000,
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn edits_are_coalesced_into_one_write() {
    let kv = MemoryKeyValueStore::new();
    let (mut session, _, _) = open_session(&quiet_sweeper(), Arc::new(kv.clone()));
    session.start().unwrap();

    // The blank note created on restore is written after the quiet window.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(kv.get("memoList").unwrap().is_some());

    let store = session.store();
    let id = store.lock().await.list()[0].id;
    for text in ["b", "bu", "buy"] {
        store.lock().await.update(id, NotePatch::text(text)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let saved = kv.get("memoList").unwrap().unwrap();
    assert!(!saved.contains("\"bu"), "written before edits went quiet: {saved}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let saved = kv.get("memoList").unwrap().unwrap();
    assert!(saved.contains("\"buy\""), "{saved}");
    assert!(!store.lock().await.is_dirty());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn flush_now_skips_the_quiet_window() {
    let kv = MemoryKeyValueStore::new();
    let config = Config {
        persist_debounce_ms: 60_000,
        ..quiet_sweeper()
    };
    let (mut session, _, _) = open_session(&config, Arc::new(kv.clone()));
    session.start().unwrap();

    let store = session.store();
    let id = store.lock().await.list()[0].id;
    store
        .lock()
        .await
        .update(id, NotePatch::text("right away"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(kv.get("memoList").unwrap().is_none());

    session.persister().flush_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(kv.get("memoList").unwrap().unwrap().contains("right away"));
    assert!(!store.lock().await.is_dirty());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sweeper_task_warns_and_evicts() {
    let kv = MemoryKeyValueStore::new();
    let (mut session, clock, notifier) = open_session(&Config::default(), Arc::new(kv));
    session.start().unwrap();
    assert!(session.sweeper().status().is_running);

    let store = session.store();
    let id = store.lock().await.list()[0].id;
    store.lock().await.update(id, NotePatch::arm("2")).unwrap();

    clock.set(T0 + 59_000);
    session.sweeper().sweep_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(notifier.pending().len(), 1);
    assert!(store.lock().await.is_warned(id));

    clock.set(T0 + 120_000);
    session.sweeper().sweep_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    {
        let store = store.lock().await;
        assert!(store.get(id).is_none());
        assert_eq!(store.len(), 1);
    }

    let status = session.sweeper().status();
    assert!(status.ticks >= 2);
    assert_eq!(status.total_evicted, 1);
    assert_eq!(status.total_warnings, 1);

    session.shutdown().await.unwrap();
    assert!(!session.sweeper().status().is_running);
}

#[tokio::test(start_paused = true)]
async fn periodic_ticks_run_without_commands() {
    let (mut session, clock, _) =
        open_session(&Config::default(), Arc::new(MemoryKeyValueStore::new()));
    let store = session.store();
    let id = store.lock().await.list()[0].id;
    store.lock().await.update(id, NotePatch::arm("1")).unwrap();
    session.start().unwrap();

    clock.set(T0 + 60_000);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(store.lock().await.get(id).is_none());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_writes_pending_edits() {
    let kv = MemoryKeyValueStore::new();
    let (mut session, _, _) = open_session(&quiet_sweeper(), Arc::new(kv.clone()));
    session.start().unwrap();

    let store = session.store();
    let id = store.lock().await.list()[0].id;
    store
        .lock()
        .await
        .update(id, NotePatch::text("last words"))
        .unwrap();
    session.shutdown().await.unwrap();

    assert!(kv.get("memoList").unwrap().unwrap().contains("last words"));
}

#[tokio::test]
async fn notes_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..quiet_sweeper()
    };

    let kv = FileKeyValueStore::open(&config.data_dir, None).unwrap();
    let (mut session, _, _) = open_session(&config, Arc::new(kv));
    let id = {
        let store = session.store();
        let mut store = store.lock().await;
        let id = store.list()[0].id;
        store.update(id, NotePatch::text("remember")).unwrap();
        store.update(id, NotePatch::arm("10")).unwrap();
        id
    };
    session.shutdown().await.unwrap();

    let kv = FileKeyValueStore::open(&config.data_dir, None).unwrap();
    let (session, _, _) = open_session(&config, Arc::new(kv));
    let store = session.store();
    let store = store.lock().await;
    let note = store.get(id).unwrap();
    assert_eq!(note.text, "remember");
    assert_eq!(note.duration_magnitude, "10");
    assert_eq!(note.last_armed_at, Some(T0));
}

#[tokio::test]
async fn starting_twice_is_harmless() {
    let (mut session, _, _) =
        open_session(&quiet_sweeper(), Arc::new(MemoryKeyValueStore::new()));
    session.start().unwrap();
    session.start().unwrap();
    assert!(session.persister().is_running());
    session.shutdown().await.unwrap();
    assert!(!session.persister().is_running());
}
