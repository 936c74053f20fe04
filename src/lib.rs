//! nullroute - a DNS forwarding proxy that sinkholes ad and tracker domains.
//!
//! Queries for blacklisted domains get a null address, known answers come
//! from a TTL-bounded cache and everything else is forwarded to DNS-over-HTTPS
//! or plain UDP upstreams.

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod filter;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod upstream;
