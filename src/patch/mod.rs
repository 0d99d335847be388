//! Partial updates: ordered JSON-patch operations, JSON merge documents and
//! backend-executed scripts.

mod core;
mod pointer;
mod types;

pub use core::{apply, merge};
pub use types::{Patch, PatchOperation, ScriptPatch};
