//! DNS query filtering module.
//!
//! Provides ad-blocking by checking queried names against a blacklist of
//! known ad/tracking domains, assembled from remote and local list sources.

mod blacklist;
mod extract;
mod loader;
mod source;

pub use blacklist::BlacklistCache;
pub use extract::extract_domains;
pub use loader::BlacklistLoader;
pub use source::{HttpFetcher, SourceFetcher, SourceStore, StoredList, local_path};
