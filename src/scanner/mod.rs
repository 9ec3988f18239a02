pub mod walk;

pub use walk::{CrawlConfig, Crawler};
