//! Persistent key/value store for session state.
//!
//! A fixed set of named slots, partitioned by lifetime: tab-scoped (the
//! access token, cleared when the browsing context closes) and durable
//! (everything needed to come back after a restart). Every mutation
//! synchronously updates an in-memory mirror and notifies subscribers
//! before the backend write, so local consumers never wait on a storage
//! round trip. Writing `None` removes the key: presence-check and
//! value-check are the same operation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use latchkey_types::{DurableSnapshot, Step, TokenPair};

/// Intended lifetime of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Survives restarts.
    Durable,
    /// Cleared when the browsing context (tab) closes.
    Tab,
}

/// The fixed set of persisted slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    RefreshToken,
    SessionId,
    Email,
    LoginOptions,
    RecoverableStep,
    AccessToken,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::RefreshToken,
        Slot::SessionId,
        Slot::Email,
        Slot::LoginOptions,
        Slot::RecoverableStep,
        Slot::AccessToken,
    ];

    pub fn scope(self) -> Scope {
        match self {
            Slot::AccessToken => Scope::Tab,
            _ => Scope::Durable,
        }
    }

    /// Stable storage key suffix. Stability matters more than spelling:
    /// these names are what other tabs and later SDK versions read.
    pub fn key(self) -> &'static str {
        match self {
            Slot::RefreshToken => "refresh_token",
            Slot::SessionId => "session_id",
            Slot::Email => "email",
            Slot::LoginOptions => "login_options",
            Slot::RecoverableStep => "recoverable_step",
            Slot::AccessToken => "access_token",
        }
    }
}

/// Where a change originated. Backends only ever report `External` for
/// writes made by another browsing context, never for local writes, so
/// republishing external changes cannot feed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    External,
}

/// One change notification: the slots touched by a single mutating call.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub origin: Origin,
    pub slots: Vec<Slot>,
}

/// Raw storage underneath a [`Store`]. Implementations swallow their own
/// I/O failures (a full or revoked storage area must not take the session
/// engine down); a failed write costs recoverability, not correctness.
pub trait StorageBackend: Send + Sync {
    fn read(&self, scope: Scope, key: &str) -> Option<String>;
    fn write(&self, scope: Scope, key: &str, value: &str);
    fn remove(&self, scope: Scope, key: &str);
}

/// In-memory backend for tests and for hosts that bridge storage
/// themselves.
#[derive(Default)]
pub struct MemoryBackend {
    durable: Mutex<HashMap<String, String>>,
    tab: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn area(&self, scope: Scope) -> &Mutex<HashMap<String, String>> {
        match scope {
            Scope::Durable => &self.durable,
            Scope::Tab => &self.tab,
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, scope: Scope, key: &str) -> Option<String> {
        self.area(scope).lock().ok()?.get(key).cloned()
    }

    fn write(&self, scope: Scope, key: &str, value: &str) {
        if let Ok(mut area) = self.area(scope).lock() {
            area.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, scope: Scope, key: &str) {
        if let Ok(mut area) = self.area(scope).lock() {
            area.remove(key);
        }
    }
}

/// File-backed backend: one JSON object per scope, written with
/// restricted permissions (0600) on unix. Lets native hosts persist
/// durable slots across runs.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, scope: Scope) -> PathBuf {
        let name = match scope {
            Scope::Durable => "durable.json",
            Scope::Tab => "tab.json",
        };
        self.dir.join(name)
    }

    fn load(&self, scope: Scope) -> HashMap<String, String> {
        let path = self.path(scope);
        let Ok(contents) = fs::read_to_string(&path) else {
            return HashMap::new();
        };
        // A corrupt file reads as empty; it gets rewritten on the next write.
        serde_json::from_str(&contents).unwrap_or_default()
    }

    fn save(&self, scope: Scope, map: &HashMap<String, String>) {
        let path = self.path(scope);
        if let Err(err) = fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "storage dir create failed");
            return;
        }
        let Ok(contents) = serde_json::to_string_pretty(map) else {
            return;
        };
        if let Err(err) = write_restricted(&path, &contents) {
            tracing::warn!(path = %path.display(), error = %err, "storage write failed");
        }
    }
}

#[cfg(unix)]
fn write_restricted(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

impl StorageBackend for FileBackend {
    fn read(&self, scope: Scope, key: &str) -> Option<String> {
        self.load(scope).remove(key)
    }

    fn write(&self, scope: Scope, key: &str, value: &str) {
        let mut map = self.load(scope);
        map.insert(key.to_string(), value.to_string());
        self.save(scope, &map);
    }

    fn remove(&self, scope: Scope, key: &str) {
        let mut map = self.load(scope);
        if map.remove(key).is_some() {
            self.save(scope, &map);
        }
    }
}

fn changes_channel() -> broadcast::Sender<StoreChange> {
    let (tx, _) = broadcast::channel(64);
    tx
}

/// The persistent store: typed slot access over a [`StorageBackend`],
/// with a synchronous in-memory mirror and change notifications.
pub struct Store {
    backend: Box<dyn StorageBackend>,
    namespace: String,
    mirror: RwLock<HashMap<Slot, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Store {
    /// Builds a store, seeding the mirror from whatever the backend
    /// already holds under `namespace`.
    pub fn new(backend: impl StorageBackend + 'static, namespace: impl Into<String>) -> Self {
        let store = Self {
            backend: Box::new(backend),
            namespace: namespace.into(),
            mirror: RwLock::new(HashMap::new()),
            changes: changes_channel(),
        };
        let mut mirror = HashMap::new();
        for slot in Slot::ALL {
            if let Some(value) = store.backend.read(slot.scope(), &store.full_key(slot)) {
                mirror.insert(slot, value);
            }
        }
        if let Ok(mut guard) = store.mirror.write() {
            *guard = mirror;
        }
        store
    }

    fn full_key(&self, slot: Slot) -> String {
        if self.namespace.is_empty() {
            slot.key().to_string()
        } else {
            format!("{}:{}", self.namespace, slot.key())
        }
    }

    /// Reads a slot from the mirror. Never touches the backend.
    pub fn get(&self, slot: Slot) -> Option<String> {
        self.mirror.read().ok()?.get(&slot).cloned()
    }

    /// Reads and JSON-decodes a slot. A parse failure reads as absent,
    /// never as an error: persisted data may come from an older or newer
    /// SDK version.
    pub fn get_json<T: DeserializeOwned>(&self, slot: Slot) -> Option<T> {
        let raw = self.get(slot)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(slot = slot.key(), error = %err, "corrupt persisted value ignored");
                None
            }
        }
    }

    /// Writes or removes a single slot.
    pub fn set(&self, slot: Slot, value: Option<&str>) {
        self.set_many(&[(slot, value.map(str::to_string))]);
    }

    /// JSON-encodes and writes a slot.
    pub fn set_json<T: Serialize>(&self, slot: Slot, value: Option<&T>) {
        let encoded = value.and_then(|v| serde_json::to_string(v).ok());
        self.set_many(&[(slot, encoded)]);
    }

    /// Applies several slot writes as one mutation: mirror first, one
    /// local notification, then the backend write-through.
    pub fn set_many(&self, entries: &[(Slot, Option<String>)]) {
        if entries.is_empty() {
            return;
        }
        if let Ok(mut mirror) = self.mirror.write() {
            for (slot, value) in entries {
                match value {
                    Some(v) => {
                        mirror.insert(*slot, v.clone());
                    }
                    None => {
                        mirror.remove(slot);
                    }
                }
            }
        }
        self.notify(Origin::Local, entries.iter().map(|(s, _)| *s).collect());
        for (slot, value) in entries {
            let key = self.full_key(*slot);
            match value {
                Some(v) => self.backend.write(slot.scope(), &key, v),
                None => self.backend.remove(slot.scope(), &key),
            }
        }
    }

    /// Entry point for changes made by *another* browsing context. The
    /// host wires its platform storage-change event here. Updates the
    /// mirror and notifies with `Origin::External`; the backend already
    /// holds the value, so there is no write-through.
    pub fn ingest_external(&self, slot: Slot, value: Option<String>) {
        if let Ok(mut mirror) = self.mirror.write() {
            match value {
                Some(v) => {
                    mirror.insert(slot, v);
                }
                None => {
                    mirror.remove(&slot);
                }
            }
        }
        self.notify(Origin::External, vec![slot]);
    }

    fn notify(&self, origin: Origin, slots: Vec<Slot>) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.changes.send(StoreChange { origin, slots });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Reads the full durable state as one atomic unit.
    pub fn durable_snapshot(&self) -> DurableSnapshot {
        DurableSnapshot {
            refresh_token: self.get(Slot::RefreshToken),
            session_id: self.get(Slot::SessionId),
            email: self.get(Slot::Email),
            login_options: self.get_json(Slot::LoginOptions),
            recoverable_step: self
                .get(Slot::RecoverableStep)
                .and_then(|raw| Step::parse(&raw)),
        }
    }

    /// Persists a freshly minted token pair and its session id.
    pub fn put_tokens(&self, session_id: &str, tokens: &TokenPair) {
        let mut entries = vec![
            (Slot::AccessToken, Some(tokens.access_token.clone())),
            (Slot::SessionId, Some(session_id.to_string())),
        ];
        if let Some(refresh) = &tokens.refresh_token {
            entries.push((Slot::RefreshToken, Some(refresh.clone())));
        }
        self.set_many(&entries);
    }

    /// Clears every credential-bearing slot. Used when a session is
    /// destroyed or a refresh definitively fails.
    pub fn clear_auth(&self) {
        self.set_many(&[
            (Slot::AccessToken, None),
            (Slot::RefreshToken, None),
            (Slot::SessionId, None),
            (Slot::RecoverableStep, None),
        ]);
    }
}
