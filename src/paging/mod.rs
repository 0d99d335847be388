//! Pull-based result continuation over offset pages or a snapshot cursor.

mod fetcher;
mod results;

pub use fetcher::{FindHit, Page, PageFetcher, PageRequest};
pub use results::{FindResults, TERMINAL_PAGE};
