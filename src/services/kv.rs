//! Key-value store facade.
//!
//! [`KvStore`] is the public entry point. It layers two caches and optional
//! encryption over a [`Querier`]:
//!
//! - **Read cache**: plaintext key to decrypted [`Record`]. A hit answers
//!   `get` with no I/O and no decryption. `set` refreshes the entry, `delete`
//!   evicts it.
//! - **Listing cache**: the last full listing, replaced only by `list`.
//!
//! Both caches are cleared on namespace switch and bypassed when caching is
//! disabled. Locks are never held across a remote call, so concurrent
//! operations proceed in parallel and the last response to complete wins.

use crate::config::{CipherSetting, StoreConfig};
use crate::models::Record;
use crate::security::{Cipher, SecretCipher};
use crate::storage::traits::{Querier, Transport};
use crate::storage::{HttpTransport, QuerierFactory, validate_key};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Default)]
struct Caches {
    generation: u64,
    records: HashMap<String, Record>,
    listing: Vec<Record>,
}

/// Key-value store over a git hosting provider.
///
/// # Example
///
/// ```rust
/// use gitkv::storage::InMemoryContentsTransport;
/// use gitkv::{KvStore, StoreConfig};
/// use std::sync::Arc;
///
/// let config = StoreConfig::builder()
///     .with_host("git@github.com:octocat/kv-data.git")
///     .with_token("ghp_example")
///     .build()?;
/// let store = KvStore::with_transport(config, Arc::new(InMemoryContentsTransport::new()))?;
///
/// store.set("greeting", "hello")?;
/// assert_eq!(store.get("greeting")?.content, "hello");
/// assert!(!store.exists("absent")?);
/// # Ok::<(), gitkv::Error>(())
/// ```
pub struct KvStore {
    config: StoreConfig,
    querier: Arc<dyn Querier>,
    cipher: Option<Arc<dyn Cipher>>,
    caches: Mutex<Caches>,
}

impl KvStore {
    /// Opens a store that talks to the provider over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unsupported, the API base URL is
    /// invalid or the cipher cannot be built.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Opens a store over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unsupported or the cipher cannot
    /// be built.
    pub fn with_transport(config: StoreConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let querier = QuerierFactory::new().create(&config, transport)?;
        Self::from_querier(config, querier)
    }

    /// Wraps an existing querier.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher cannot be built.
    pub fn from_querier(config: StoreConfig, querier: Arc<dyn Querier>) -> Result<Self> {
        let cipher: Option<Arc<dyn Cipher>> = match config.cipher() {
            Some(CipherSetting::Secret(secret)) => Some(Arc::new(SecretCipher::new(secret)?)),
            Some(CipherSetting::Custom(cipher)) => Some(Arc::clone(cipher)),
            None => None,
        };

        tracing::debug!(
            category = "kv",
            host = %config.parsed_host(),
            namespace = %querier.namespace(),
            branch = config.branch(),
            encrypted = cipher.is_some(),
            cache = config.cache_enabled(),
            "Opened store"
        );

        Ok(Self {
            config,
            querier,
            cipher,
            caches: Mutex::new(Caches::default()),
        })
    }

    /// The configuration this store was built from.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying querier.
    #[must_use]
    pub fn querier(&self) -> &Arc<dyn Querier> {
        &self.querier
    }

    /// Returns the current namespace.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.querier.namespace()
    }

    /// Switches namespace and clears both caches.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the namespace has a `.`,
    /// `..` or empty segment. The store stays in its current namespace.
    pub fn set_namespace(&self, namespace: &str) -> Result<()> {
        let mut caches = self.lock();
        self.querier.select_namespace(namespace)?;
        caches.generation = caches.generation.wrapping_add(1);
        caches.records.clear();
        caches.listing.clear();
        Ok(())
    }

    /// Drops both caches.
    pub fn clear_cache(&self) {
        let mut caches = self.lock();
        caches.records.clear();
        caches.listing.clear();
    }

    /// Creates or overwrites a key.
    ///
    /// The returned record carries the plaintext value; its size is the
    /// plaintext length.
    pub fn set(&self, key: &str, value: &str) -> Result<Record> {
        validate_key(key)?;
        let started = Instant::now();
        let generation = self.generation();
        let remote_key = self.encode(key)?;
        let remote_value = self.encode(value)?;

        let mut record = self.querier.write(&remote_key, &remote_value)?;
        record.name = key.to_string();
        record.set_content(value.to_string());

        self.cache_record(generation, key, &record);
        metrics::counter!("gitkv_operations_total", "operation" => "set").increment(1);
        tracing::debug!(
            category = "kv",
            key,
            size = record.size,
            elapsed_ms = elapsed_ms(started),
            "Set key"
        );
        Ok(record)
    }

    /// Reads a key.
    ///
    /// A missing key is not an error: the record has `size == -1`.
    pub fn get(&self, key: &str) -> Result<Record> {
        validate_key(key)?;
        if let Some(record) = self.cached_record(key) {
            metrics::counter!("gitkv_cache_hits_total").increment(1);
            tracing::debug!(category = "kv", key, "Read cache hit");
            return Ok(record);
        }
        metrics::counter!("gitkv_cache_misses_total").increment(1);

        let started = Instant::now();
        let generation = self.generation();
        let remote_key = self.encode(key)?;
        let mut record = self.querier.read(&remote_key)?;

        if record.exists() {
            let plaintext = self.decode(&record.content)?;
            record.name = key.to_string();
            record.set_content(plaintext);
        }

        self.cache_record(generation, key, &record);
        metrics::counter!("gitkv_operations_total", "operation" => "get").increment(1);
        tracing::debug!(
            category = "kv",
            key,
            found = record.exists(),
            elapsed_ms = elapsed_ms(started),
            "Got key"
        );
        Ok(record)
    }

    /// Appends `suffix` to a key's value, creating the key if absent.
    ///
    /// This is a read followed by a write. A concurrent writer between the
    /// two can lose its update.
    pub fn append(&self, key: &str, suffix: &str) -> Result<Record> {
        let current = self.get(key)?;
        let previous = if current.exists() {
            current.content
        } else {
            String::new()
        };
        self.set(key, &format!("{previous}{suffix}"))
    }

    /// Lists the keys in the current namespace.
    ///
    /// Entries carry names and sizes but no content. With a cipher
    /// configured, names that do not decrypt are skipped and sizes are those
    /// of the decrypted values. A cipher that cannot derive the plaintext
    /// length from the ciphertext length costs one read per entry.
    pub fn list(&self) -> Result<Vec<Record>> {
        if let Some(listing) = self.cached_listing() {
            metrics::counter!("gitkv_cache_hits_total").increment(1);
            return Ok(listing);
        }

        let started = Instant::now();
        let generation = self.generation();
        let entries = self.querier.list()?;

        let mut records = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let Some(cipher) = &self.cipher else {
                records.push(entry);
                continue;
            };
            let name = match cipher.decode(&entry.name) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(
                        category = "cipher",
                        name = %entry.name,
                        error = %e,
                        "Skipping entry whose name does not decrypt"
                    );
                    continue;
                },
            };
            // gone between the listing and the read
            let Some(size) = self.plaintext_size(cipher.as_ref(), &entry)? else {
                continue;
            };
            entry.name = name;
            entry.size = size;
            records.push(entry);
        }

        if self.config.cache_enabled() {
            let mut caches = self.lock();
            if caches.generation == generation {
                caches.listing.clone_from(&records);
            }
        }
        metrics::counter!("gitkv_operations_total", "operation" => "list").increment(1);
        tracing::debug!(
            category = "kv",
            count = records.len(),
            elapsed_ms = elapsed_ms(started),
            "Listed keys"
        );
        Ok(records)
    }

    /// Returns true if the key exists.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.exists())
    }

    /// Deletes a key.
    ///
    /// Deleting a missing key succeeds with an empty commit.
    pub fn delete(&self, key: &str) -> Result<Record> {
        validate_key(key)?;
        let started = Instant::now();
        let remote_key = self.encode(key)?;
        let record = self.querier.remove(&remote_key)?;

        self.lock().records.remove(key);
        metrics::counter!("gitkv_operations_total", "operation" => "delete").increment(1);
        tracing::debug!(
            category = "kv",
            key,
            removed = !record.commit.is_empty(),
            elapsed_ms = elapsed_ms(started),
            "Deleted key"
        );
        Ok(record)
    }

    fn lock(&self) -> MutexGuard<'_, Caches> {
        match self.caches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Store cache mutex was poisoned, recovering");
                metrics::counter!("gitkv_mutex_poison_recovery_total").increment(1);
                poisoned.into_inner()
            },
        }
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn cached_record(&self, key: &str) -> Option<Record> {
        if !self.config.cache_enabled() {
            return None;
        }
        self.lock().records.get(key).cloned()
    }

    fn cached_listing(&self) -> Option<Vec<Record>> {
        if !self.config.cache_enabled() {
            return None;
        }
        let caches = self.lock();
        (!caches.listing.is_empty()).then(|| caches.listing.clone())
    }

    fn cache_record(&self, generation: u64, key: &str, record: &Record) {
        if !self.config.cache_enabled() {
            return;
        }
        let mut caches = self.lock();
        if caches.generation == generation {
            caches.records.insert(key.to_string(), record.clone());
        }
    }

    /// Size of a listed entry's decrypted value, or `None` if the entry no
    /// longer exists.
    fn plaintext_size(&self, cipher: &dyn Cipher, entry: &Record) -> Result<Option<i64>> {
        let derived = usize::try_from(entry.size)
            .ok()
            .and_then(|len| cipher.plaintext_len(len));
        if let Some(len) = derived {
            return Ok(Some(i64::try_from(len).unwrap_or(i64::MAX)));
        }

        let record = self.querier.read(&entry.name)?;
        if !record.exists() {
            return Ok(None);
        }
        let plaintext = cipher.decode(&record.content)?;
        Ok(Some(i64::try_from(plaintext.len()).unwrap_or(i64::MAX)))
    }

    fn encode(&self, plaintext: &str) -> Result<String> {
        match &self.cipher {
            Some(cipher) => cipher.encode(plaintext),
            None => Ok(plaintext.to_string()),
        }
    }

    fn decode(&self, ciphertext: &str) -> Result<String> {
        match &self.cipher {
            Some(cipher) => cipher.decode(ciphertext),
            None => Ok(ciphertext.to_string()),
        }
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("host", &self.config.parsed_host().to_string())
            .field("namespace", &self.querier.namespace())
            .field("encrypted", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::FnCipher;
    use crate::storage::memory::InMemoryContentsTransport;
    use crate::storage::traits::HttpMethod;

    fn config() -> StoreConfig {
        StoreConfig::builder()
            .with_host("git@github.com:octocat/kv-data.git")
            .with_token("ghp_test")
            .build()
            .unwrap()
    }

    fn store_with(config: StoreConfig) -> (Arc<InMemoryContentsTransport>, KvStore) {
        let transport = Arc::new(InMemoryContentsTransport::new());
        let store = KvStore::with_transport(config, transport.clone()).unwrap();
        (transport, store)
    }

    #[test]
    fn test_get_absent_key() {
        let (_, store) = store_with(config());
        let record = store.get("never-written").unwrap();
        assert_eq!(record.size, -1);
        assert!(!store.exists("never-written").unwrap());
    }

    #[test]
    fn test_set_then_get_hits_cache() {
        let (transport, store) = store_with(config());
        store.set("alpha", "v1").unwrap();

        let record = store.get("alpha").unwrap();
        assert_eq!(record.content, "v1");
        assert_eq!(transport.calls(HttpMethod::Get), 0);
    }

    #[test]
    fn test_cache_disabled_always_reads() {
        let config = config().to_builder().with_cache(false).build().unwrap();
        let (transport, store) = store_with(config);
        store.set("alpha", "v1").unwrap();

        assert_eq!(store.get("alpha").unwrap().content, "v1");
        assert_eq!(store.get("alpha").unwrap().content, "v1");
        assert_eq!(transport.calls(HttpMethod::Get), 2);
    }

    #[test]
    fn test_set_append_delete_sequence() {
        let (_, store) = store_with(config());

        let set = store.set("alpha", "v1").unwrap();
        assert_eq!(set.size, 2);

        let appended = store.append("alpha", "v2").unwrap();
        assert_eq!(appended.content, "v1v2");
        assert_eq!(appended.size, 4);

        let deleted = store.delete("alpha").unwrap();
        assert!(!deleted.commit.is_empty());

        assert_eq!(store.get("alpha").unwrap().size, -1);
    }

    #[test]
    fn test_append_to_absent_key_creates_it() {
        let (_, store) = store_with(config());
        let record = store.append("fresh", "tail").unwrap();
        assert_eq!(record.content, "tail");
    }

    #[test]
    fn test_delete_absent_key() {
        let (_, store) = store_with(config());
        let record = store.delete("ghost").unwrap();
        assert_eq!(record.commit, "");
        assert_eq!(record.size, -1);
    }

    #[test]
    fn test_namespace_isolation() {
        let (_, store) = store_with(config());
        store.set_namespace("n1").unwrap();
        store.set("shared", "one").unwrap();

        store.set_namespace("n2").unwrap();
        assert_eq!(store.namespace(), "n2");
        assert_eq!(store.get("shared").unwrap().size, -1);

        store.set_namespace("n1").unwrap();
        assert_eq!(store.get("shared").unwrap().content, "one");
    }

    #[test]
    fn test_list_caches_and_is_cleared_by_namespace_switch() {
        let (transport, store) = store_with(config());
        store.set("a", "1").unwrap();
        store.set("b", "22").unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        store.list().unwrap();
        assert_eq!(transport.calls(HttpMethod::Get), 1);

        store.set_namespace("elsewhere").unwrap();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(transport.calls(HttpMethod::Get), 2);
    }

    #[test]
    fn test_cipher_encrypts_names_and_values() {
        let config = config().to_builder().with_secret("hello world").build().unwrap();
        let (transport, store) = store_with(config);

        let record = store.set("mykey", "myvalue").unwrap();
        assert_eq!(record.name, "mykey");
        assert_eq!(record.content, "myvalue");
        assert_eq!(record.size, 7);

        let paths = transport.paths("master");
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].contains("mykey"));
        let stored = transport.file("master", &paths[0]).unwrap();
        assert_ne!(stored, "myvalue");

        store.clear_cache();
        assert_eq!(store.get("mykey").unwrap().content, "myvalue");
        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["mykey"]);

        let deleted = store.delete("mykey").unwrap();
        assert!(!deleted.commit.is_empty());
        assert!(transport.paths("master").is_empty());
    }

    #[test]
    fn test_list_skips_names_that_do_not_decrypt() {
        let config = config().to_builder().with_secret("s").build().unwrap();
        let (transport, store) = store_with(config);
        store.set("good", "v").unwrap();
        transport.put_file("master", "default/plain-name", "x");

        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["good"]);
    }

    #[test]
    fn test_encrypted_list_reports_plaintext_size() {
        let config = config().to_builder().with_secret("hello world").build().unwrap();
        let (transport, store) = store_with(config);
        store.set("alpha", "v1").unwrap();
        store.set("beta", "").unwrap();
        store.clear_cache();

        let listed = store.list().unwrap();
        assert_eq!(transport.calls(HttpMethod::Get), 1);
        for record in &listed {
            let read = store.get(&record.name).unwrap();
            assert_eq!(record.size, read.size, "size of {}", record.name);
        }
        let sizes: Vec<_> = listed.iter().map(|r| (r.name.as_str(), r.size)).collect();
        assert!(sizes.contains(&("alpha", 2)));
        assert!(sizes.contains(&("beta", 0)));
    }

    #[test]
    fn test_custom_cipher_list_reads_value_for_size() {
        let cipher = FnCipher::new(
            |s| format!("{s}{s}"),
            |s| s[..s.len() / 2].to_string(),
        );
        let config = config()
            .to_builder()
            .with_cipher(Arc::new(cipher))
            .build()
            .unwrap();
        let (transport, store) = store_with(config);
        store.set("key", "value").unwrap();
        assert_eq!(transport.file("master", "default/keykey").as_deref(), Some("valuevalue"));

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "key");
        assert_eq!(listed[0].size, 5);
        // one listing plus one read for the size
        assert_eq!(transport.calls(HttpMethod::Get), 2);
    }

    #[test]
    fn test_set_namespace_rejects_dot_segments() {
        let (transport, store) = store_with(config());
        store.set("alpha", "v1").unwrap();

        for namespace in ["../x", "..", "a/./b", "a//b"] {
            assert!(matches!(
                store.set_namespace(namespace),
                Err(crate::Error::InvalidInput(_))
            ));
        }
        assert_eq!(store.namespace(), "default");
        assert_eq!(store.get("alpha").unwrap().content, "v1");
        assert_eq!(transport.calls(HttpMethod::Get), 0);
    }

    #[test]
    fn test_dot_segment_keys_rejected_with_and_without_cipher() {
        let encrypted = config().to_builder().with_secret("s").build().unwrap();
        for config in [config(), encrypted] {
            let (transport, store) = store_with(config);
            for key in ["", ".", "..", "../default", "a//b"] {
                assert!(matches!(store.set(key, "v"), Err(crate::Error::InvalidInput(_))));
                assert!(matches!(store.get(key), Err(crate::Error::InvalidInput(_))));
                assert!(matches!(store.append(key, "v"), Err(crate::Error::InvalidInput(_))));
                assert!(matches!(store.delete(key), Err(crate::Error::InvalidInput(_))));
            }
            assert_eq!(transport.total_calls(), 0);
        }
    }

    #[test]
    fn test_custom_cipher() {
        let cipher = FnCipher::new(
            |s| s.chars().rev().collect(),
            |s| s.chars().rev().collect(),
        );
        let config = config()
            .to_builder()
            .with_cipher(Arc::new(cipher))
            .build()
            .unwrap();
        let (transport, store) = store_with(config);

        store.set("abc", "xyz").unwrap();
        assert_eq!(transport.file("master", "default/cba").as_deref(), Some("zyx"));

        store.clear_cache();
        assert_eq!(store.get("abc").unwrap().content, "xyz");
    }

    #[test]
    fn test_delete_evicts_read_cache() {
        let (transport, store) = store_with(config());
        store.set("alpha", "v1").unwrap();
        store.delete("alpha").unwrap();

        assert_eq!(store.get("alpha").unwrap().size, -1);
        assert_eq!(transport.calls(HttpMethod::Get), 1);
    }
}
