//! In-memory contents API.
//!
//! [`InMemoryContentsTransport`] answers requests the way the hosted
//! contents API does, without a network:
//!
//! - files live in per-branch trees keyed by their full path
//! - every file carries a content hash as its version token
//! - updates and deletes need the current token: a missing one answers 422
//!   (`"sha" wasn't supplied`), a stale one answers 409
//! - file payloads come back base64 encoded with a line break every 60
//!   characters
//!
//! Call counters and injected failures make it useful for tests.

use crate::storage::traits::{HttpMethod, Transport, TransportRequest, TransportResponse};
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Branch used when a read names no `ref`.
const DEFAULT_BRANCH: &str = "master";

/// Line width of base64 payloads in file responses.
const BASE64_LINE_WIDTH: usize = 60;

/// Number of most recent requests kept for inspection.
pub const REQUEST_LOG_CAPACITY: usize = 256;

/// A stored file.
#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    sha: String,
}

/// A queued answer that replaces the next request's real handling.
#[derive(Debug, Clone)]
enum Injected {
    Response(TransportResponse),
    Unreachable(String),
}

#[derive(Debug, Default)]
struct State {
    branches: HashMap<String, BTreeMap<String, StoredFile>>,
    calls: HashMap<HttpMethod, usize>,
    requests: VecDeque<TransportRequest>,
    injected: VecDeque<Injected>,
    commits: u64,
}

/// Transport that simulates the contents API in memory.
#[derive(Debug, Default)]
pub struct InMemoryContentsTransport {
    state: Mutex<State>,
}

impl InMemoryContentsTransport {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("In-memory transport mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }

    /// Number of requests received with `method`.
    #[must_use]
    pub fn calls(&self, method: HttpMethod) -> usize {
        self.lock().calls.get(&method).copied().unwrap_or(0)
    }

    /// Number of requests received.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// The most recent requests, oldest first.
    ///
    /// At most [`REQUEST_LOG_CAPACITY`] are kept. Call counters are not
    /// bounded.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.lock().requests.iter().cloned().collect()
    }

    /// Drops the recorded requests. Call counters are kept.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Answers the next request with `status` and `body` instead of handling
    /// it. Injected answers are consumed in order.
    pub fn fail_next(&self, status: u16, body: impl Into<String>) {
        self.lock()
            .injected
            .push_back(Injected::Response(TransportResponse::new(status, body)));
    }

    /// Fails the next request with a transport error.
    pub fn fail_next_unreachable(&self, cause: impl Into<String>) {
        self.lock()
            .injected
            .push_back(Injected::Unreachable(cause.into()));
    }

    /// Writes a file directly, bypassing the API, as another client would.
    ///
    /// `path` is repository-relative, e.g. `default/alpha`. Returns the new
    /// version token.
    pub fn put_file(&self, branch: &str, path: &str, content: &str) -> String {
        let sha = blob_sha(content);
        self.lock().branches.entry(branch.to_string()).or_default().insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                sha: sha.clone(),
            },
        );
        sha
    }

    /// Removes a file directly, bypassing the API.
    pub fn remove_file(&self, branch: &str, path: &str) -> bool {
        self.lock()
            .branches
            .get_mut(branch)
            .is_some_and(|tree| tree.remove(path).is_some())
    }

    /// Returns a file's content, bypassing the API.
    #[must_use]
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.lock()
            .branches
            .get(branch)
            .and_then(|tree| tree.get(path))
            .map(|file| file.content.clone())
    }

    /// Repository-relative paths of every file on a branch.
    #[must_use]
    pub fn paths(&self, branch: &str) -> Vec<String> {
        self.lock()
            .branches
            .get(branch)
            .map(|tree| tree.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn handle(state: &mut State, request: &TransportRequest) -> TransportResponse {
        let Some(path) = contents_path(&request.path) else {
            return not_found();
        };

        match request.method {
            HttpMethod::Get => {
                let branch = request.query_value("ref").unwrap_or(DEFAULT_BRANCH);
                Self::get(state, branch, &path)
            },
            HttpMethod::Put => Self::put(state, &path, request.body.as_ref()),
            HttpMethod::Delete => Self::delete(state, &path, request.body.as_ref()),
        }
    }

    fn get(state: &State, branch: &str, path: &str) -> TransportResponse {
        let Some(tree) = state.branches.get(branch) else {
            return not_found();
        };

        if let Some(file) = tree.get(path) {
            return TransportResponse::new(200, file_entry(path, file, true).to_string());
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for (full, file) in tree.range(prefix.clone()..) {
            let Some(rest) = full.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                },
                None => files.push(file_entry(full, file, false)),
            }
        }

        if files.is_empty() && dirs.is_empty() {
            return not_found();
        }

        let mut entries: Vec<Value> = dirs
            .into_iter()
            .map(|dir| {
                let full = format!("{prefix}{dir}");
                json!({
                    "name": dir,
                    "path": full,
                    "sha": blob_sha(&full),
                    "size": 0,
                    "download_url": null,
                    "html_url": format!("https://github.com/tree/{full}"),
                    "type": "dir",
                })
            })
            .collect();
        entries.extend(files);
        TransportResponse::new(200, Value::Array(entries).to_string())
    }

    fn put(state: &mut State, path: &str, body: Option<&Value>) -> TransportResponse {
        let Some(body) = body else {
            return validation_failed("Invalid request.\n\nBody is required.");
        };
        let Some(encoded) = body.get("content").and_then(Value::as_str) else {
            return validation_failed("Invalid request.\n\n\"content\" wasn't supplied.");
        };
        let Ok(bytes) = STANDARD.decode(encoded) else {
            return validation_failed("content is not valid Base64");
        };
        let Ok(content) = String::from_utf8(bytes) else {
            return validation_failed("content is not valid UTF-8");
        };
        let branch = branch_of(body);
        let supplied = body.get("sha").and_then(Value::as_str);

        let tree = state.branches.entry(branch).or_default();
        if tree.keys().any(|p| p.starts_with(&format!("{path}/"))) {
            return validation_failed("Invalid request.\n\npath is a directory");
        }

        let created = match (tree.get(path), supplied) {
            (Some(_), None) => {
                return validation_failed("Invalid request.\n\n\"sha\" wasn't supplied.");
            },
            (Some(current), Some(sha)) if current.sha != sha => {
                return conflict(path, sha);
            },
            (None, Some(sha)) => return conflict(path, sha),
            (Some(_), Some(_)) => false,
            (None, None) => true,
        };

        let file = StoredFile {
            sha: blob_sha(&content),
            content,
        };
        let entry = file_entry(path, &file, false);
        tree.insert(path.to_string(), file);

        let commit = next_commit(state);
        TransportResponse::new(
            if created { 201 } else { 200 },
            json!({ "content": entry, "commit": { "sha": commit } }).to_string(),
        )
    }

    fn delete(state: &mut State, path: &str, body: Option<&Value>) -> TransportResponse {
        let branch = body.map_or_else(|| DEFAULT_BRANCH.to_string(), branch_of);
        let supplied = body.and_then(|b| b.get("sha")).and_then(Value::as_str);

        let Some(tree) = state.branches.get_mut(&branch) else {
            return not_found();
        };
        let Some(current) = tree.get(path) else {
            return not_found();
        };
        match supplied {
            None => return validation_failed("Invalid request.\n\n\"sha\" wasn't supplied."),
            Some(sha) if current.sha != sha => return conflict(path, sha),
            Some(_) => {},
        }
        tree.remove(path);

        let commit = next_commit(state);
        TransportResponse::new(
            200,
            json!({ "content": null, "commit": { "sha": commit } }).to_string(),
        )
    }
}

impl Transport for InMemoryContentsTransport {
    fn invoke(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let mut state = self.lock();
        *state.calls.entry(request.method).or_insert(0) += 1;
        if state.requests.len() == REQUEST_LOG_CAPACITY {
            state.requests.pop_front();
        }
        state.requests.push_back(request.clone());

        match state.injected.pop_front() {
            Some(Injected::Response(response)) => Ok(response),
            Some(Injected::Unreachable(cause)) => Err(Error::Transport {
                operation: format!("{} {}", request.method, request.path),
                cause,
            }),
            None => Ok(Self::handle(&mut state, request)),
        }
    }
}

/// Extracts the repository-relative path from `repos/{owner}/{repo}/contents/...`.
fn contents_path(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let (Some("repos"), Some(_owner), Some(_repo), Some("contents")) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };
    Some(segments.collect::<Vec<_>>().join("/"))
}

fn branch_of(body: &Value) -> String {
    body.get("branch")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_BRANCH)
        .to_string()
}

/// Git-style blob hash, truncated to 40 hex characters.
fn blob_sha(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content.as_bytes());
    let mut sha = hex::encode(hasher.finalize());
    sha.truncate(40);
    sha
}

fn next_commit(state: &mut State) -> String {
    state.commits += 1;
    let mut sha = hex::encode(Sha256::digest(state.commits.to_be_bytes()));
    sha.truncate(40);
    sha
}

fn wrap_base64(content: &str) -> String {
    let encoded = STANDARD.encode(content);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH + 1);
    for (i, ch) in encoded.chars().enumerate() {
        if i > 0 && i % BASE64_LINE_WIDTH == 0 {
            wrapped.push('\n');
        }
        wrapped.push(ch);
    }
    wrapped.push('\n');
    wrapped
}

fn file_entry(path: &str, file: &StoredFile, with_content: bool) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut entry = json!({
        "name": name,
        "path": path,
        "sha": file.sha,
        "size": file.content.len(),
        "download_url": format!("https://raw.githubusercontent.com/{path}"),
        "html_url": format!("https://github.com/blob/{path}"),
        "type": "file",
    });
    if with_content {
        entry["content"] = Value::String(wrap_base64(&file.content));
        entry["encoding"] = Value::String("base64".to_string());
    }
    entry
}

fn not_found() -> TransportResponse {
    TransportResponse::new(404, json!({ "message": "Not Found" }).to_string())
}

fn validation_failed(message: &str) -> TransportResponse {
    TransportResponse::new(422, json!({ "message": message }).to_string())
}

fn conflict(path: &str, sha: &str) -> TransportResponse {
    TransportResponse::new(
        409,
        json!({ "message": format!("{path} does not match {sha}") }).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(
        transport: &InMemoryContentsTransport,
        path: &str,
        content: &str,
        sha: Option<&str>,
    ) -> TransportResponse {
        let mut body = json!({
            "message": "test",
            "content": STANDARD.encode(content),
            "branch": "master",
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }
        let request = TransportRequest::new(HttpMethod::Put, format!("repos/o/r/contents/{path}"))
            .with_body(body);
        transport.invoke(&request).unwrap()
    }

    fn get(transport: &InMemoryContentsTransport, path: &str) -> TransportResponse {
        let request = TransportRequest::new(HttpMethod::Get, format!("repos/o/r/contents/{path}"))
            .with_query("ref", "master");
        transport.invoke(&request).unwrap()
    }

    #[test]
    fn test_create_then_update_requires_sha() {
        let transport = InMemoryContentsTransport::new();

        assert_eq!(put(&transport, "ns/a", "v1", None).status, 201);
        let missing = put(&transport, "ns/a", "v2", None);
        assert_eq!(missing.status, 422);
        assert!(missing.body.contains("sha"));

        let stale = put(&transport, "ns/a", "v2", Some("0000"));
        assert_eq!(stale.status, 409);

        let sha = blob_sha("v1");
        assert_eq!(put(&transport, "ns/a", "v2", Some(&sha)).status, 200);
        assert_eq!(transport.file("master", "ns/a").as_deref(), Some("v2"));
    }

    #[test]
    fn test_get_wraps_base64() {
        let transport = InMemoryContentsTransport::new();
        let long = "x".repeat(200);
        transport.put_file("master", "ns/long", &long);

        let response = get(&transport, "ns/long");
        let value: Value = serde_json::from_str(&response.body).unwrap();
        let content = value["content"].as_str().unwrap();
        assert!(content.contains('\n'));
        assert_eq!(value["encoding"], "base64");
        assert_eq!(value["size"], 200);
    }

    #[test]
    fn test_directory_listing() {
        let transport = InMemoryContentsTransport::new();
        transport.put_file("master", "ns/a", "1");
        transport.put_file("master", "ns/b", "22");
        transport.put_file("master", "ns/sub/c", "3");
        transport.put_file("master", "other/d", "4");

        let response = get(&transport, "ns");
        let entries: Vec<Value> = serde_json::from_str(&response.body).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["sub", "a", "b"]);
        assert_eq!(entries[0]["type"], "dir");
        assert!(entries[1].get("content").is_none());

        assert_eq!(get(&transport, "missing").status, 404);
    }

    #[test]
    fn test_delete_requires_current_sha() {
        let transport = InMemoryContentsTransport::new();
        let sha = transport.put_file("master", "ns/a", "v1");
        let delete = |sha: Option<&str>| {
            let mut body = json!({ "message": "rm", "branch": "master" });
            if let Some(sha) = sha {
                body["sha"] = Value::String(sha.to_string());
            }
            let request = TransportRequest::new(HttpMethod::Delete, "repos/o/r/contents/ns/a")
                .with_body(body);
            transport.invoke(&request).unwrap()
        };

        assert_eq!(delete(None).status, 422);
        assert_eq!(delete(Some("bad")).status, 409);
        assert_eq!(delete(Some(&sha)).status, 200);
        assert_eq!(delete(Some(&sha)).status, 404);
        assert_eq!(transport.calls(HttpMethod::Delete), 4);
    }

    #[test]
    fn test_injected_failures_are_consumed_in_order() {
        let transport = InMemoryContentsTransport::new();
        transport.fail_next(500, "{\"message\":\"boom\"}");
        transport.fail_next_unreachable("connection reset");

        assert_eq!(get(&transport, "ns").status, 500);
        let request = TransportRequest::new(HttpMethod::Get, "repos/o/r/contents/ns");
        assert!(matches!(
            transport.invoke(&request),
            Err(Error::Transport { .. })
        ));
        assert_eq!(get(&transport, "ns").status, 404);
        assert_eq!(transport.total_calls(), 3);
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn test_request_log_is_bounded_and_clearable() {
        let transport = InMemoryContentsTransport::new();
        for i in 0..REQUEST_LOG_CAPACITY + 10 {
            get(&transport, &format!("ns/key-{i}"));
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), REQUEST_LOG_CAPACITY);
        assert_eq!(requests[0].path, "repos/o/r/contents/ns/key-10");
        assert_eq!(transport.total_calls(), REQUEST_LOG_CAPACITY + 10);

        transport.clear_requests();
        assert!(transport.requests().is_empty());
        assert_eq!(transport.total_calls(), REQUEST_LOG_CAPACITY + 10);
    }
}
