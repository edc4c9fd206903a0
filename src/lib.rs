pub mod classifier;
pub mod collector;
pub mod config;
pub mod fetcher;
pub mod normalizer;
pub mod resolver;
pub mod store;
pub mod types;

pub use classifier::{classify_all, ClassifyItem, WorkflowClassifier};
pub use collector::{Collector, RunSummary};
pub use config::{load_config, CollectorConfig};
pub use fetcher::{FeedFetcher, FetchFeed};
pub use store::{ItemRepository, PgItemStore};
pub use types::*;
