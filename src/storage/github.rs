//! GitHub contents API adapter.
//!
//! Each key is one file at `{namespace}/{key}` on the configured branch.
//!
//! # Version tokens
//!
//! The API refuses an update or delete unless the request names the file's
//! current `sha`. [`GithubQuerier`] caches the token from every successful
//! read, listing and write so that steady-state writes need no extra read.
//!
//! # Conflict recovery
//!
//! A write or delete rejected because the token is missing (422 mentioning
//! `sha`) or stale (409) triggers exactly one recovery cycle: read the key to
//! refresh the token, then retry once. The retry's failure is surfaced.
//!
//! ```text
//! write(k) ──► PUT ──► 200/201 ─────────────────────────────► Ok
//!               │
//!               └──► 409 / 422 "sha" ──► read(k) ──► PUT ──► Ok | Err
//! ```

use crate::config::{Committer, StoreConfig};
use crate::git::Host;
use crate::models::{Record, VersionToken};
use crate::storage::path::{validate_key, validate_namespace};
use crate::storage::traits::{HttpMethod, Querier, Transport, TransportRequest, TransportResponse};
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Provider tag handled by [`GithubQuerier`].
pub const PROVIDER: &str = "github.com";

/// Commit message for a create.
const CREATE_MESSAGE: &str = "gitkv create a key";
/// Commit message for an update.
const UPDATE_MESSAGE: &str = "gitkv update a key";
/// Commit message for a delete.
const DELETE_MESSAGE: &str = "gitkv delete a key";

/// One entry of a file or directory response.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    sha: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl ContentEntry {
    fn is_file(&self) -> bool {
        self.kind == "file"
    }

    fn into_record(self, content: String) -> Record {
        Record {
            name: self.name,
            content,
            size: self.size,
            raw_url: self.download_url.unwrap_or_default(),
            html_url: self.html_url.unwrap_or_default(),
            commit: String::new(),
        }
    }
}

/// Body of a PUT or DELETE response.
#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    content: Option<ContentEntry>,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Classified answer.
enum Reply {
    Success(String),
    NotFound(String),
}

/// Mutable adapter state.
///
/// `generation` is bumped on every namespace switch. A response that started
/// under an older generation never writes into the token cache.
#[derive(Debug)]
struct QuerierState {
    namespace: String,
    generation: u64,
    tokens: HashMap<String, VersionToken>,
}

/// Adapter for the GitHub contents API.
pub struct GithubQuerier {
    host: Host,
    branch: String,
    committer: Committer,
    transport: Arc<dyn Transport>,
    state: Mutex<QuerierState>,
}

impl GithubQuerier {
    /// Creates a querier for the repository and branch in `config`.
    #[must_use]
    pub fn new(config: &StoreConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            host: config.parsed_host().clone(),
            branch: config.branch().to_string(),
            committer: config.committer().clone(),
            transport,
            state: Mutex::new(QuerierState {
                namespace: config.namespace().to_string(),
                generation: 0,
                tokens: HashMap::new(),
            }),
        }
    }

    /// Returns the repository this querier writes to.
    #[must_use]
    pub const fn host(&self) -> &Host {
        &self.host
    }

    /// Returns the branch this querier writes to.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn lock(&self) -> MutexGuard<'_, QuerierState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Querier mutex was poisoned, recovering");
                metrics::counter!("gitkv_mutex_poison_recovery_total").increment(1);
                poisoned.into_inner()
            },
        }
    }

    /// Namespace and generation at the start of a request.
    fn snapshot(&self) -> (String, u64) {
        let state = self.lock();
        (state.namespace.clone(), state.generation)
    }

    /// Namespace, generation and cached token for `key`.
    fn snapshot_with_token(&self, key: &str) -> (String, u64, Option<VersionToken>) {
        let state = self.lock();
        (
            state.namespace.clone(),
            state.generation,
            state.tokens.get(key).cloned(),
        )
    }

    fn remember(&self, generation: u64, key: &str, token: &str) {
        let mut state = self.lock();
        if state.generation == generation {
            state
                .tokens
                .insert(key.to_string(), VersionToken::new(token));
        }
    }

    fn forget(&self, generation: u64, key: &str) {
        let mut state = self.lock();
        if state.generation == generation {
            state.tokens.remove(key);
        }
    }

    fn contents_path(&self, namespace: &str, key: Option<&str>) -> String {
        let mut path = format!("repos/{}/{}/contents", self.host.owner, self.host.repo);
        for segment in [Some(namespace), key].into_iter().flatten() {
            if !segment.is_empty() {
                path.push('/');
                path.push_str(segment);
            }
        }
        path
    }

    fn commit_body(&self, message: &str, token: Option<&VersionToken>) -> Value {
        let mut body = json!({
            "message": message,
            "branch": self.branch,
            "committer": {
                "name": self.committer.name,
                "email": self.committer.email,
            },
        });
        if let Some(token) = token {
            body["sha"] = Value::String(token.as_str().to_string());
        }
        body
    }

    fn get(&self, path: String) -> Result<TransportResponse> {
        let request =
            TransportRequest::new(HttpMethod::Get, path).with_query("ref", self.branch.as_str());
        self.transport.invoke(&request)
    }

    fn put_once(&self, key: &str, value: &str) -> Result<Record> {
        let (namespace, generation, token) = self.snapshot_with_token(key);
        let message = if token.is_some() {
            UPDATE_MESSAGE
        } else {
            CREATE_MESSAGE
        };
        let mut body = self.commit_body(message, token.as_ref());
        body["content"] = Value::String(STANDARD.encode(value));

        let request = TransportRequest::new(HttpMethod::Put, self.contents_path(&namespace, Some(key)))
            .with_body(body);
        let response = self.transport.invoke(&request)?;

        let body = match classify(response, key)? {
            Reply::Success(body) => body,
            Reply::NotFound(message) => {
                return Err(Error::RemoteRejected {
                    status: 404,
                    message,
                });
            },
        };
        let parsed: CommitResponse = parse_json(&body, "decode_write_response")?;
        let entry = parsed.content.ok_or_else(|| Error::OperationFailed {
            operation: "decode_write_response".to_string(),
            cause: "response carries no content entry".to_string(),
        })?;

        self.remember(generation, key, &entry.sha);
        tracing::debug!(
            category = "github",
            key,
            namespace = %namespace,
            created = token.is_none(),
            "Wrote key"
        );

        let mut record = entry.into_record(String::new());
        record.set_content(value.to_string());
        record.commit = parsed.commit.sha;
        Ok(record)
    }

    fn delete_once(&self, key: &str) -> Result<Record> {
        let (namespace, generation, token) = self.snapshot_with_token(key);
        let body = self.commit_body(DELETE_MESSAGE, token.as_ref());

        let request =
            TransportRequest::new(HttpMethod::Delete, self.contents_path(&namespace, Some(key)))
                .with_body(body);
        let response = self.transport.invoke(&request)?;

        match classify(response, key)? {
            Reply::NotFound(_) => {
                self.forget(generation, key);
                tracing::debug!(category = "github", key, "Delete of absent key");
                Ok(Record::removed(""))
            },
            Reply::Success(body) => {
                let parsed: CommitResponse = parse_json(&body, "decode_delete_response")?;
                self.forget(generation, key);
                tracing::debug!(category = "github", key, namespace = %namespace, "Deleted key");
                Ok(Record::removed(parsed.commit.sha))
            },
        }
    }
}

impl Querier for GithubQuerier {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn namespace(&self) -> String {
        self.lock().namespace.clone()
    }

    fn select_namespace(&self, namespace: &str) -> Result<()> {
        let namespace = validate_namespace(namespace)?;
        let mut state = self.lock();
        state.namespace = namespace;
        state.generation = state.generation.wrapping_add(1);
        state.tokens.clear();
        tracing::debug!(category = "github", namespace = %state.namespace, "Switched namespace");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Record>> {
        let (namespace, generation) = self.snapshot();
        let response = self.get(self.contents_path(&namespace, None))?;

        let body = match classify(response, &namespace)? {
            Reply::Success(body) => body,
            Reply::NotFound(_) => return Ok(Vec::new()),
        };
        let value: Value = parse_json(&body, "decode_listing")?;
        if !value.is_array() {
            return Err(Error::InvalidInput(format!(
                "namespace '{namespace}' is a file, not a directory"
            )));
        }
        let entries: Vec<ContentEntry> = serde_json::from_value(value).map_err(|e| {
            Error::OperationFailed {
                operation: "decode_listing".to_string(),
                cause: e.to_string(),
            }
        })?;

        let records: Vec<Record> = entries
            .into_iter()
            .filter(ContentEntry::is_file)
            .map(|entry| {
                self.remember(generation, &entry.name, &entry.sha);
                entry.into_record(String::new())
            })
            .collect();

        tracing::debug!(
            category = "github",
            namespace = %namespace,
            count = records.len(),
            "Listed namespace"
        );
        Ok(records)
    }

    fn read(&self, key: &str) -> Result<Record> {
        validate_key(key)?;
        let (namespace, generation) = self.snapshot();
        let response = self.get(self.contents_path(&namespace, Some(key)))?;

        let body = match classify(response, key)? {
            Reply::Success(body) => body,
            Reply::NotFound(_) => {
                self.forget(generation, key);
                tracing::debug!(category = "github", key, "Key not found");
                return Ok(Record::missing());
            },
        };
        let value: Value = parse_json(&body, "decode_read_response")?;
        if value.is_array() {
            return Err(Error::InvalidInput(format!(
                "'{key}' is a directory, not a key"
            )));
        }
        let entry: ContentEntry =
            serde_json::from_value(value).map_err(|e| Error::OperationFailed {
                operation: "decode_read_response".to_string(),
                cause: e.to_string(),
            })?;
        if !entry.is_file() {
            return Err(Error::InvalidInput(format!(
                "'{key}' is a {}, not a key",
                entry.kind
            )));
        }

        let content = decode_content(entry.content.as_deref(), entry.encoding.as_deref())?;
        self.remember(generation, key, &entry.sha);
        tracing::debug!(category = "github", key, namespace = %namespace, "Read key");
        Ok(entry.into_record(content))
    }

    fn write(&self, key: &str, value: &str) -> Result<Record> {
        validate_key(key)?;
        match self.put_once(key, value) {
            Err(Error::Conflict { message, .. }) => {
                tracing::debug!(
                    category = "github",
                    key,
                    reason = %message,
                    "Write conflicted, refreshing version token"
                );
                metrics::counter!("gitkv_conflict_retries_total", "operation" => "write")
                    .increment(1);
                self.read(key)?;
                self.put_once(key, value)
            },
            other => other,
        }
    }

    fn remove(&self, key: &str) -> Result<Record> {
        validate_key(key)?;
        match self.delete_once(key) {
            Err(Error::Conflict { message, .. }) => {
                tracing::debug!(
                    category = "github",
                    key,
                    reason = %message,
                    "Delete conflicted, refreshing version token"
                );
                metrics::counter!("gitkv_conflict_retries_total", "operation" => "delete")
                    .increment(1);
                if !self.read(key)?.exists() {
                    return Ok(Record::removed(""));
                }
                self.delete_once(key)
            },
            other => other,
        }
    }

    fn cached_token(&self, key: &str) -> Option<VersionToken> {
        self.lock().tokens.get(key).cloned()
    }
}

impl std::fmt::Debug for GithubQuerier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubQuerier")
            .field("host", &self.host)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

/// Maps a status code onto the error taxonomy.
fn classify(response: TransportResponse, key: &str) -> Result<Reply> {
    let TransportResponse { status, body } = response;
    match status {
        200..=299 => Ok(Reply::Success(body)),
        404 => Ok(Reply::NotFound(error_message(&body))),
        401 => Err(Error::Unauthorized(error_message(&body))),
        409 => Err(Error::Conflict {
            key: key.to_string(),
            message: error_message(&body),
        }),
        422 => {
            let message = error_message(&body);
            if message.contains("sha") {
                Err(Error::Conflict {
                    key: key.to_string(),
                    message,
                })
            } else {
                Err(Error::Validation { message })
            }
        },
        _ => Err(Error::RemoteRejected {
            status,
            message: error_message(&body),
        }),
    }
}

/// Provider message from an error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.trim().to_string(), |parsed| parsed.message)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str, operation: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })
}

/// Decodes a file payload.
///
/// `base64` payloads are wrapped across lines, so whitespace is stripped
/// before decoding.
fn decode_content(content: Option<&str>, encoding: Option<&str>) -> Result<String> {
    let content = content.unwrap_or_default();
    match encoding {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| Error::OperationFailed {
                    operation: "decode_content".to_string(),
                    cause: format!("invalid base64: {e}"),
                })?;
            String::from_utf8(bytes).map_err(|e| Error::OperationFailed {
                operation: "decode_content".to_string(),
                cause: format!("content is not UTF-8: {e}"),
            })
        },
        None | Some("") => Ok(content.to_string()),
        Some(other) => Err(Error::UnsupportedEncoding(other.to_string())),
    }
}
