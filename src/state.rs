//! Session state shared across one workflow run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Well-known state keys used by the revision loop machinery.
///
/// Any step may read or write any key (cooperative, not access-controlled);
/// these constants exist so steps that communicate across iterations agree
/// on spelling.
pub mod keys {
    /// Number of completed loop passes, incremented by [`Loop`](crate::Loop).
    pub const REVISION_ITERATION: &str = "revision_iteration";
    /// Reviewer feedback for the producer to act on in the next pass.
    pub const MANAGER_FEEDBACK: &str = "manager_feedback";
    /// The draft submitted to the reviewer in the most recent pass.
    pub const PREVIOUS_DRAFT: &str = "previous_draft";
    /// Set by the reviewing step; read by the loop end condition.
    pub const IS_APPROVED: &str = "is_approved";
}

/// A value stored in [`SessionState`].
///
/// State carries small scalars and text blobs, not arbitrary objects;
/// structured step payloads travel in [`Content`](crate::Content) instead.
///
/// # Examples
///
/// ```
/// use kumihimo::Value;
///
/// let v: Value = 3.into();
/// assert_eq!(v.as_int(), Some(3));
///
/// let v: Value = "draft".into();
/// assert_eq!(v.as_text(), Some("draft"));
/// assert_eq!(v.as_bool(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer counter or count.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Text blob (feedback, drafts, markers).
    Text(String),
}

impl Value {
    /// Returns the integer value, or `None` for other variants.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value, or `None` for other variants.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the text value, or `None` for other variants.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Key/value store shared across all steps within one workflow run.
///
/// Created with defaults when a run begins, mutated in place by step
/// executors, dropped when the run completes. Any step may read or write
/// any key; during concurrent phases callers must write disjoint keys
/// (see [`SharedState`]).
///
/// # Examples
///
/// ```
/// use kumihimo::SessionState;
///
/// let mut state = SessionState::new();
/// state.set("count", 2);
/// state.set("done", false);
///
/// assert_eq!(state.get_int("count"), Some(2));
/// assert_eq!(state.get_bool("done"), Some(false));
/// assert_eq!(state.get_text("count"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    entries: HashMap<String, Value>,
}

impl SessionState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state seeded with the documented revision-loop schema:
    /// `revision_iteration = 0`, `is_approved = false`, and placeholder
    /// feedback/draft text.
    pub fn with_revision_defaults() -> Self {
        let mut state = Self::new();
        state.set(keys::REVISION_ITERATION, 0);
        state.set(keys::IS_APPROVED, false);
        state.set(
            keys::MANAGER_FEEDBACK,
            "No feedback yet - this is the initial draft",
        );
        state.set(keys::PREVIOUS_DRAFT, "No previous draft");
        state
    }

    /// Returns the value for the given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Sets a value, replacing any previous entry for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the integer at `key`, or `None` if absent or a different type.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    /// Returns the boolean at `key`, or `None` if absent or a different type.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns the text at `key`, or `None` if absent or a different type.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    /// Returns `true` if the state contains the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns an iterator over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the state contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cloneable handle to the [`SessionState`] of a running workflow.
///
/// The engine passes one handle through every step, parallel child, and
/// loop pass. The interior lock exists so concurrent parallel children can
/// share the map safely in Rust; it is not a coordination mechanism. The
/// caller contract from the workflow design still applies: children running
/// concurrently must write disjoint keys, and writes to the same key are
/// last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedState {
    /// Wraps an initial state for a run.
    pub fn new(initial: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Returns a clone of the value for the given key.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Sets a value, replacing any previous entry for the key.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().await.set(key, value);
    }

    /// Returns the integer at `key`, or `None` if absent or a different type.
    pub async fn get_int(&self, key: &str) -> Option<i64> {
        self.inner.read().await.get_int(key)
    }

    /// Returns the boolean at `key`, or `None` if absent or a different type.
    pub async fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.read().await.get_bool(key)
    }

    /// Returns an owned copy of the text at `key`.
    pub async fn get_text(&self, key: &str) -> Option<String> {
        self.inner.read().await.get_text(key).map(str::to_string)
    }

    /// Applies a mutation under a single write lock.
    ///
    /// Used by the engine for read-modify-write sequences (the loop pass
    /// counter) that must not interleave with concurrent writers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionState),
    {
        let mut guard = self.inner.write().await;
        f(&mut guard);
    }

    /// Returns a point-in-time copy of the whole state.
    ///
    /// This is the read-only view handed to agents and to loop end
    /// conditions.
    pub async fn snapshot(&self) -> SessionState {
        self.inner.read().await.clone()
    }
}
