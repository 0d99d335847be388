mod core;
mod types;

pub use core::{Document, DocumentExt};
pub use types::Capabilities;
