use super::*;
use crate::token::Token;
use crate::token::tests::jwt_with_exp;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn far_future_token() -> Token {
    Token::parse(jwt_with_exp(4_000_000_000))
}

// -----------------------------------------------------------------------
// JsonStore
// -----------------------------------------------------------------------

#[tokio::test]
async fn missing_file_loads_as_empty() {
    let dir = TempDir::new().unwrap();
    let store: JsonStore<String> = JsonStore::new(dir.path().join("absent.json"));
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_file_loads_as_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blank.json");
    std::fs::write(&path, "  \n").unwrap();

    let store: JsonStore<String> = JsonStore::new(&path);
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_writes_pretty_json_and_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("map.json");
    let store: JsonStore<String> = JsonStore::new(&path);

    let mut entries = BTreeMap::new();
    entries.insert("0xabc".to_string(), "value".to_string());
    store.save(&entries).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "{\n  \"0xabc\": \"value\"\n}");
    assert!(!dir.path().join("nested").join("map.json.tmp").exists());
    assert_eq!(store.load().await.unwrap(), entries);
}

#[tokio::test]
async fn corrupt_file_is_a_store_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ nope").unwrap();

    let store: JsonStore<String> = JsonStore::new(&path);
    match store.load().await {
        Err(Error::Store { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected store error, got {other:?}"),
    }
}

// -----------------------------------------------------------------------
// UserAgentStore
// -----------------------------------------------------------------------

#[tokio::test]
async fn user_agent_is_created_once_and_reused() {
    let dir = TempDir::new().unwrap();
    let store = UserAgentStore::new(dir.path().join("session_user_agents.json"));

    let first = store
        .get_or_create("0xabc", || "agent-1".to_string())
        .await
        .unwrap();
    let second = store
        .get_or_create("0xabc", || "agent-2".to_string())
        .await
        .unwrap();

    assert_eq!(first, "agent-1");
    assert_eq!(second, "agent-1");
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn user_agent_binding_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session_user_agents.json");

    {
        let store = UserAgentStore::new(&path);
        store
            .get_or_create("0xabc", || "agent-1".to_string())
            .await
            .unwrap();
    }

    let reopened = UserAgentStore::new(&path);
    assert_eq!(
        reopened.get("0xabc").await.unwrap().as_deref(),
        Some("agent-1")
    );
    let again = reopened
        .get_or_create("0xabc", || "agent-other".to_string())
        .await
        .unwrap();
    assert_eq!(again, "agent-1");
}

#[tokio::test]
async fn concurrent_get_or_create_binds_one_agent() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(UserAgentStore::new(dir.path().join("ua.json")));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .get_or_create("0xabc", move || format!("agent-{i}"))
                .await
                .unwrap()
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap());
    }
    seen.dedup();
    assert_eq!(seen.len(), 1, "all sessions must see the same agent: {seen:?}");
}

#[tokio::test]
async fn set_overwrites_binding() {
    let dir = TempDir::new().unwrap();
    let store = UserAgentStore::new(dir.path().join("ua.json"));
    assert!(store.is_empty().await.unwrap());

    store.set("0xabc", "first").await.unwrap();
    store.set("0xabc", "second").await.unwrap();

    assert_eq!(store.get("0xabc").await.unwrap().as_deref(), Some("second"));
}

// -----------------------------------------------------------------------
// TokenStore and writer
// -----------------------------------------------------------------------

#[tokio::test]
async fn persisted_token_reloads_as_valid() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("tokens.json"));
    let (writer, handle) = spawn_token_writer(store.clone(), CancellationToken::new());

    let token = far_future_token();
    writer.persist("0xabc", &token).await.unwrap();

    let snapshot = store.reload().await.unwrap();
    let reloaded = snapshot.get("0xabc").unwrap();
    assert_eq!(reloaded, token);
    assert!(!reloaded.is_expired());
    assert!(snapshot.get("0xother").is_none());

    drop(writer);
    handle.await.unwrap();
}

#[tokio::test]
async fn concurrent_writes_keep_every_entry() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("tokens.json"));
    let (writer, handle) = spawn_token_writer(store.clone(), CancellationToken::new());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let writer = writer.clone();
        tasks.push(tokio::spawn(async move {
            writer
                .persist(&format!("0x{i:02}"), &far_future_token())
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = store.reload().await.unwrap();
    assert_eq!(snapshot.len(), 20);

    drop(writer);
    handle.await.unwrap();
}

#[tokio::test]
async fn snapshot_is_not_affected_by_later_writes() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("tokens.json"));
    let (writer, _handle) = spawn_token_writer(store.clone(), CancellationToken::new());

    let before = store.reload().await.unwrap();
    writer.persist("0xabc", &far_future_token()).await.unwrap();

    assert!(before.is_empty());
    assert_eq!(store.reload().await.unwrap().len(), 1);
}

#[tokio::test]
async fn writer_replaces_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.json");
    std::fs::write(&path, "not json").unwrap();

    let store = TokenStore::new(&path);
    assert!(store.reload().await.is_err());

    let (writer, _handle) = spawn_token_writer(store.clone(), CancellationToken::new());
    writer.persist("0xabc", &far_future_token()).await.unwrap();

    assert_eq!(store.reload().await.unwrap().len(), 1);
}

#[tokio::test]
async fn persist_fails_after_writer_cancelled() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("tokens.json"));
    let cancel = CancellationToken::new();
    let (writer, handle) = spawn_token_writer(store, cancel.clone());

    cancel.cancel();
    handle.await.unwrap();

    assert!(writer.persist("0xabc", &far_future_token()).await.is_err());
}

#[tokio::test]
async fn snapshot_reads_json_encoded_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tokens.json");
    let raw = jwt_with_exp(4_000_000_000);
    let encoded = serde_json::json!({ "token": raw }).to_string();
    let file = serde_json::json!({ "0xabc": encoded, "0xdef": raw });
    std::fs::write(&path, file.to_string()).unwrap();

    let snapshot = TokenStore::new(&path).reload().await.unwrap();
    assert_eq!(snapshot.get("0xabc").unwrap().as_str(), raw);
    assert_eq!(snapshot.get("0xdef").unwrap().as_str(), raw);
}
