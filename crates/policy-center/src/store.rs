use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::errors::PolicyError;

/// Store key of the feature settings blob.
pub const SETTINGS_KEY: &str = "settings";

/// Extension-scoped key/value storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, PolicyError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), PolicyError>;
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: impl Into<String>, value: Value) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value);
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PolicyError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), PolicyError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object on disk; each store key is a top-level member.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, PolicyError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(PolicyError::Io(format!("{}: {err}", self.path.display()))),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(PolicyError::Invalid(format!(
                "{} is not a JSON object (found {})",
                self.path.display(),
                kind_of(&other)
            ))),
            Err(err) => Err(PolicyError::Invalid(format!("{}: {err}", self.path.display()))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PolicyError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), PolicyError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| PolicyError::Io(format!("{}: {err}", parent.display())))?;
            }
        }
        let rendered = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|err| PolicyError::Invalid(format!("{err}")))?;
        tokio::fs::write(&self.path, rendered)
            .await
            .map_err(|err| PolicyError::Io(format!("{}: {err}", self.path.display())))
    }
}
