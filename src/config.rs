//! Configuration for graph compilation
//!
//! [`GraphConfig`] is an opaque string-to-string property map. The graph
//! forwards it verbatim to every operator when kernels are created; only a
//! handful of well-known keys are interpreted by the runtime itself.

use std::collections::BTreeMap;

use serde::Serialize;

/// Number of worker threads for the compiled graph's thread pool
pub const KEY_CPU_THREADS_NUM: &str = "CPU_THREADS_NUM";

/// `YES` / `NO`: whether per-node timings are measured
pub const KEY_PERF_COUNT: &str = "PERF_COUNT";

pub const YES: &str = "YES";
pub const NO: &str = "NO";

/// Compilation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphConfig {
    properties: BTreeMap<String, String>,
}

impl GraphConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the worker thread count
    pub fn with_threads(self, threads: usize) -> Self {
        self.with_property(KEY_CPU_THREADS_NUM, threads.to_string())
    }

    /// Enable or disable per-node timing
    pub fn with_perf_count(self, enabled: bool) -> Self {
        self.with_property(KEY_PERF_COUNT, if enabled { YES } else { NO })
    }

    /// Merge properties, overwriting existing keys
    pub fn set_properties<I, K, V>(&mut self, properties: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in properties {
            self.properties.insert(k.into(), v.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Requested worker thread count. Zero, unparsable or missing values
    /// mean "use the global pool".
    pub fn threads(&self) -> Option<usize> {
        let raw = self.get(KEY_CPU_THREADS_NUM)?;
        match raw.trim().parse::<usize>() {
            Ok(0) => None,
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(
                    "ignoring {}={:?}: not a thread count",
                    KEY_CPU_THREADS_NUM,
                    raw
                );
                None
            }
        }
    }

    /// Whether per-node timings are measured (default: yes)
    pub fn perf_count(&self) -> bool {
        match self.get(KEY_PERF_COUNT) {
            Some(v) => !v.eq_ignore_ascii_case(NO),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_config_default() {
        let config = GraphConfig::default();
        assert!(config.properties().is_empty());
        assert_eq!(config.threads(), None);
        assert!(config.perf_count());
    }

    #[test]
    fn test_graph_config_builder() {
        let config = GraphConfig::new()
            .with_threads(4)
            .with_perf_count(false)
            .with_property("VENDOR_KEY", "opaque");

        assert_eq!(config.threads(), Some(4));
        assert!(!config.perf_count());
        assert_eq!(config.get("VENDOR_KEY"), Some("opaque"));
    }

    #[test]
    fn test_invalid_thread_count_falls_back() {
        let config = GraphConfig::new().with_property(KEY_CPU_THREADS_NUM, "many");
        assert_eq!(config.threads(), None);
        let config = GraphConfig::new().with_threads(0);
        assert_eq!(config.threads(), None);
    }

    #[test]
    fn test_set_properties_overwrites() {
        let mut config = GraphConfig::from_properties([("A", "1"), ("B", "2")]);
        config.set_properties([("B", "3")]);
        assert_eq!(config.get("A"), Some("1"));
        assert_eq!(config.get("B"), Some("3"));
    }
}
