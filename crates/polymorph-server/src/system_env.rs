//! `SystemEnv`: the `Environment` every real connection runs on.

use polymorph_core::{EntropyError, Environment};

/// Wall-clock time plus OS entropy for node parameters and frame nonces.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.try_random_bytes(buffer).unwrap_or_else(|e| {
            // NOTE: getrandom does not fail on supported platforms. Node ids
            // and seeds have no error path, so log loudly and fall back to
            // zeros. Nonces never take this path.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }

    fn try_random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        getrandom::fill(buffer).map_err(|e| EntropyError { reason: e.to_string() })
    }
}
