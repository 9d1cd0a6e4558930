//! Integration tests for the key-value store over the in-memory contents API.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

use gitkv::storage::{HttpMethod, InMemoryContentsTransport};
use gitkv::{Error, KvStore, Querier, StoreConfig};
use std::sync::Arc;
use std::thread;

fn config() -> StoreConfig {
    StoreConfig::builder()
        .with_host("git@github.com:octocat/kv-data.git")
        .with_token("ghp_integration")
        .build()
        .unwrap()
}

fn open(config: StoreConfig) -> (Arc<InMemoryContentsTransport>, KvStore) {
    let transport = Arc::new(InMemoryContentsTransport::new());
    let store = KvStore::with_transport(config, transport.clone()).unwrap();
    (transport, store)
}

#[test]
fn test_error_types() {
    let err = Error::InvalidInput("test message".to_string());
    let display = format!("{err}");
    assert!(display.contains("invalid input"));
    assert!(display.contains("test message"));

    let err = Error::Unauthorized("Bad credentials".to_string());
    assert_eq!(err.to_string(), "unauthorized: Bad credentials");

    let err = Error::Transport {
        operation: "GET repos/o/r/contents/default".to_string(),
        cause: "connection refused".to_string(),
    };
    let display = format!("{err}");
    assert!(display.contains("GET repos/o/r/contents/default"));
    assert!(display.contains("connection refused"));
}

#[test]
fn test_documented_sequence() {
    let (_, store) = open(config());

    let record = store.set("alpha", "v1").unwrap();
    assert_eq!(record.size, 2);

    let record = store.append("alpha", "v2").unwrap();
    assert_eq!(record.content, "v1v2");
    assert_eq!(record.size, 4);

    let record = store.delete("alpha").unwrap();
    assert!(!record.commit.is_empty());

    assert_eq!(store.get("alpha").unwrap().size, -1);
}

#[test]
fn test_get_after_set_makes_no_remote_read() {
    let (transport, store) = open(config());
    store.set("k", "v").unwrap();
    let before = transport.calls(HttpMethod::Get);

    assert_eq!(store.get("k").unwrap().content, "v");
    assert_eq!(transport.calls(HttpMethod::Get), before);
}

#[test]
fn test_empty_value_is_present() {
    let (_, store) = open(config());
    store.set("empty", "").unwrap();
    store.clear_cache();

    let record = store.get("empty").unwrap();
    assert_eq!(record.size, 0);
    assert!(store.exists("empty").unwrap());
}

#[test]
fn test_value_written_by_other_client_is_read() {
    let (transport, store) = open(config());
    transport.put_file("master", "default/external", "from elsewhere");

    let record = store.get("external").unwrap();
    assert_eq!(record.content, "from elsewhere");
    assert_eq!(record.name, "external");
    assert!(record.raw_url.contains("default/external"));
}

#[test]
fn test_overwrite_of_unseen_key_recovers_token() {
    let (transport, store) = open(config());
    transport.put_file("master", "default/k", "theirs");

    let record = store.set("k", "ours").unwrap();
    assert_eq!(record.content, "ours");
    assert_eq!(transport.file("master", "default/k").as_deref(), Some("ours"));
    assert_eq!(transport.calls(HttpMethod::Put), 2);
}

#[test]
fn test_token_persists_across_writes() {
    let (transport, store) = open(config());
    for i in 0..5 {
        store.set("counter", &i.to_string()).unwrap();
    }

    // one create plus four updates, no recovery reads
    assert_eq!(transport.calls(HttpMethod::Put), 5);
    assert_eq!(transport.calls(HttpMethod::Get), 0);
    assert!(store.querier().cached_token("counter").is_some());
}

#[test]
fn test_namespaces_are_isolated() {
    let (transport, store) = open(config());

    store.set_namespace("sessions").unwrap();
    store.set("user", "ada").unwrap();
    store.set_namespace("cache").unwrap();
    store.set("user", "grace").unwrap();

    assert_eq!(transport.file("master", "sessions/user").as_deref(), Some("ada"));
    assert_eq!(transport.file("master", "cache/user").as_deref(), Some("grace"));

    store.set_namespace("sessions").unwrap();
    assert_eq!(store.get("user").unwrap().content, "ada");
    let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["user"]);
}

#[test]
fn test_list_only_returns_files() {
    let (transport, store) = open(config());
    transport.put_file("master", "default/a", "1");
    transport.put_file("master", "default/sub/b", "2");

    let records = store.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "a");
    assert!(records[0].size >= 0);
}

#[test]
fn test_branch_is_respected() {
    let config = config().to_builder().with_branch("data").build().unwrap();
    let (transport, store) = open(config);

    store.set("k", "v").unwrap();
    assert_eq!(transport.file("data", "default/k").as_deref(), Some("v"));
    assert!(transport.file("master", "default/k").is_none());

    let requests = transport.requests();
    assert_eq!(requests[0].body.as_ref().unwrap()["branch"], "data");
}

#[test]
fn test_unauthorized_surfaces() {
    let (transport, store) = open(config());
    transport.fail_next(401, "{\"message\":\"Bad credentials\"}");

    assert!(matches!(store.get("k"), Err(Error::Unauthorized(_))));
}

#[test]
fn test_server_error_surfaces() {
    let (transport, store) = open(config());
    transport.fail_next(502, "Bad Gateway");

    assert!(matches!(
        store.set("k", "v"),
        Err(Error::RemoteRejected { status: 502, .. })
    ));
}

#[test]
fn test_encrypted_store_roundtrip() {
    let config = config().to_builder().with_secret("hello world").build().unwrap();
    let (transport, store) = open(config.clone());

    store.set("mykey", "myvalue").unwrap();
    for path in transport.paths("master") {
        assert!(!path.contains("mykey"));
    }

    // a fresh store with the same secret reads the data back
    let reopened = KvStore::with_transport(config, transport.clone()).unwrap();
    assert_eq!(reopened.get("mykey").unwrap().content, "myvalue");

    // a store with another secret sees the key as absent
    let other = config_with_secret("another secret");
    let stranger = KvStore::with_transport(other, transport.clone()).unwrap();
    assert_eq!(stranger.get("mykey").unwrap().size, -1);
    assert!(stranger.list().unwrap().is_empty());
}

fn config_with_secret(secret: &str) -> StoreConfig {
    config().to_builder().with_secret(secret).build().unwrap()
}

#[test]
fn test_concurrent_writers_to_distinct_keys() {
    let (transport, store) = open(config());
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.set(&format!("key-{i}"), &format!("value-{i}")).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(transport.paths("master").len(), 8);
    assert_eq!(store.list().unwrap().len(), 8);
}

#[test]
fn test_missing_configuration_fails_before_io() {
    let err = StoreConfig::builder()
        .with_host("git@github.com:octocat/kv-data.git")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = StoreConfig::builder()
        .with_host("ftp://example.com/repo")
        .with_token("t")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn test_escaping_paths_never_reach_the_remote() {
    let (transport, store) = open(config());
    store.set("k", "v").unwrap();
    let before = transport.total_calls();

    assert!(matches!(store.set_namespace("../x"), Err(Error::InvalidInput(_))));
    assert_eq!(store.namespace(), "default");
    assert!(matches!(store.set("..", "v"), Err(Error::InvalidInput(_))));
    assert!(matches!(store.get("."), Err(Error::InvalidInput(_))));
    assert!(matches!(store.delete("../default/k"), Err(Error::InvalidInput(_))));

    assert_eq!(transport.total_calls(), before);
    assert_eq!(transport.file("master", "default/k").as_deref(), Some("v"));
}
