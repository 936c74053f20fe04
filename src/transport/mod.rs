//! Transport layer for the proxy.
//!
//! Only UDP is served. Each received datagram becomes its own task so a slow
//! upstream never holds up other clients.

pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Default cap on concurrently running query tasks.
pub const DEFAULT_MAX_INFLIGHT: usize = 1024;
