//! Round-robin selection of upstream servers.

use std::sync::{Mutex, PoisonError};

use crate::error::ConfigError;

/// Cycles through a fixed list of upstream endpoints.
pub struct RoundRobin {
    endpoints: Vec<String>,
    cursor: Mutex<usize>,
}

impl RoundRobin {
    /// Blank entries are ignored; an empty list is a configuration error.
    pub fn new<I, S>(endpoints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if endpoints.is_empty() {
            return Err(ConfigError::NoUpstreamsConfigured);
        }

        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
        })
    }

    /// The endpoint to use for the next query.
    pub fn next_endpoint(&self) -> &str {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let index = *cursor % self.endpoints.len();
        *cursor = (index + 1) % self.endpoints.len();
        &self.endpoints[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn visits_each_endpoint_once_then_wraps() {
        let pool = RoundRobin::new(["1.1.1.1", "1.0.0.1", "9.9.9.9"]).unwrap();

        let picked: Vec<&str> = (0..4).map(|_| pool.next_endpoint()).collect();

        assert_eq!(picked, vec!["1.1.1.1", "1.0.0.1", "9.9.9.9", "1.1.1.1"]);
    }

    #[test]
    fn single_endpoint_always_returned() {
        let pool = RoundRobin::new(["1.1.1.1"]).unwrap();

        assert_eq!(pool.next_endpoint(), "1.1.1.1");
        assert_eq!(pool.next_endpoint(), "1.1.1.1");
    }

    #[test]
    fn blank_entries_are_skipped_and_trimmed() {
        let pool = RoundRobin::new([" 1.1.1.1 ", "", "9.9.9.9"]).unwrap();

        let picked: Vec<&str> = (0..3).map(|_| pool.next_endpoint()).collect();

        assert_eq!(picked, vec!["1.1.1.1", "9.9.9.9", "1.1.1.1"]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            RoundRobin::new(Vec::<String>::new()),
            Err(ConfigError::NoUpstreamsConfigured)
        ));
        assert!(matches!(
            RoundRobin::new(["", "  "]),
            Err(ConfigError::NoUpstreamsConfigured)
        ));
    }

    #[test]
    fn concurrent_callers_share_the_rotation() {
        let pool = RoundRobin::new(["a", "b"]).unwrap();

        let picks: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..100)
                            .map(|_| pool.next_endpoint().to_string())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        for pick in picks {
            *counts.entry(pick).or_default() += 1;
        }
        assert_eq!(counts["a"], 200);
        assert_eq!(counts["b"], 200);
    }
}
