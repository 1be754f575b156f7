use pacekeeper::store::{GroupPatch, StoreStats, UserPatch, UserStore};
use pacekeeper::ManualClock;
use pacekeeper_sqlite::SqliteStore;

#[tokio::test]
async fn get_user_creates_default_record_once() {
    let store = SqliteStore::open_in_memory().unwrap().with_clock(ManualClock::starting_at(1_000));

    let user = store.get_user("42", Some("Ann")).await.unwrap();
    assert_eq!(user.coins, 0);
    assert_eq!(user.exp, 0);
    assert_eq!(user.level, 1);
    assert_eq!(user.command_count, 0);
    assert_eq!(user.join_date, 1_000);

    store.get_user("42", None).await.unwrap();
    assert_eq!(store.stats().await.unwrap(), StoreStats { user_count: 1, group_count: 0 });
}

#[tokio::test]
async fn name_hint_refreshes_stored_name() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.get_user("42", Some("Ann")).await.unwrap();
    let renamed = store.get_user("42", Some("Annie")).await.unwrap();
    assert_eq!(renamed.name, "Annie");
    assert_eq!(store.get_user("42", None).await.unwrap().name, "Annie");
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.update_user("42", UserPatch::default().coins(10).exp(5)).await.unwrap();
    let user = store.update_user("42", UserPatch::default().level(3)).await.unwrap();
    assert_eq!(user.coins, 10);
    assert_eq!(user.exp, 5);
    assert_eq!(user.level, 3);
}

#[tokio::test]
async fn track_command_increments_count() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.track_command("42", Some("Ann"), 10).await.unwrap();
    let user = store.track_command("42", Some("Ann"), 20).await.unwrap();
    assert_eq!(user.command_count, 2);
    assert_eq!(user.last_active, 20);
}

#[tokio::test]
async fn groups_default_and_upsert() {
    let store = SqliteStore::open_in_memory().unwrap();
    let group = store.get_group("g1").await.unwrap();
    assert!(group.settings.is_empty());
    assert!(group.members.is_empty());
    assert_eq!(group.command_count, 0);

    let updated = store.update_group("g2", GroupPatch::default().command_count(4)).await.unwrap();
    assert_eq!(updated.command_count, 4);
    assert_eq!(store.stats().await.unwrap().group_count, 2);
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("agent.db");
    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.update_user("42", UserPatch::default().coins(99)).await.unwrap();
    }
    let store = SqliteStore::open(&path).await.unwrap();
    assert_eq!(store.get_user("42", None).await.unwrap().coins, 99);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_track_command_loses_no_increments() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("bot.db")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.track_command("42", Some("Ann"), i).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let user = store.get_user("42", None).await.unwrap();
    assert_eq!(user.command_count, 10);
    assert_eq!(user.name, "Ann");
}
