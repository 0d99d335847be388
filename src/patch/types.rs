use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON-patch step. Paths are JSON pointers (`/a/0/b`, `""` for the root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Add { path: path.into(), value: value.into() }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Replace { path: path.into(), value: value.into() }
    }

    pub fn move_to(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Move { from: from.into(), path: path.into() }
    }

    pub fn copy_to(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Copy { from: from.into(), path: path.into() }
    }

    pub fn test(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Test { path: path.into(), value: value.into() }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }
}

/// An opaque script run by the backend against each target document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPatch {
    pub script: String,
    #[serde(default)]
    pub params: Value,
}

impl ScriptPatch {
    pub fn new(script: impl Into<String>) -> Self {
        Self { script: script.into(), params: Value::Null }
    }

    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Patch {
    Operations(Vec<PatchOperation>),
    /// JSON merge document: objects merge recursively, `null` removes.
    Partial(Value),
    Script(ScriptPatch),
}

impl Patch {
    #[must_use]
    pub const fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

impl From<Vec<PatchOperation>> for Patch {
    fn from(ops: Vec<PatchOperation>) -> Self {
        Self::Operations(ops)
    }
}

impl From<ScriptPatch> for Patch {
    fn from(script: ScriptPatch) -> Self {
        Self::Script(script)
    }
}
