//! Sitemapper Core — errors, configuration, persisted settings, host limits.

pub mod config;
pub mod error;
pub mod host;

pub use config::{DataPaths, SitemapSettings, SitemapperConfig};
pub use error::{Error, Result};
pub use host::{current_memory_usage, HostLimits};
