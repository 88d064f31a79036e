pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod measure;
pub mod node;
pub mod owner;
pub mod progress;
pub mod render;
pub mod scanner;
pub mod session;
pub mod view_cache;

pub use cancel::CancelToken;
pub use error::{Cancelled, ConfigError, ScanError};
pub use filter::TreeFilter;
pub use node::FolderNode;
pub use render::{RenderOptions, TreeRenderer, TreeRow};
pub use scanner::{ScanOptions, count_entries, scan};
pub use view_cache::{SortDirection, SortKey, ViewFilterCache, ViewParams};
