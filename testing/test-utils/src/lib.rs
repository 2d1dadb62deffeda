//! Shared test infrastructure for the atom crate.
//!
//! Provides `TestRedis`, a disposable containerized Redis instance, and
//! `TestDataBuilder`, a deterministic generator for element/stream names so
//! that parallel tests never collide on the same keys.

mod redis;

pub use redis::TestRedis;

use tracing_subscriber::EnvFilter;

/// Installs a pretty-printed subscriber for tests that want to see their own
/// `tracing` output, honoring `RUST_LOG` and defaulting to `debug` otherwise.
/// Infallible: a second call (or a harness that already installed one) is a
/// silent no-op rather than a panic.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Builder for collision-free test names, seeded from the test's own name.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash).
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique element or stream name for testing.
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}
