//! Simulated infrastructure collaborators
//!
//! Stand-ins for a service registry, log index, metrics platform, config drift
//! detector, remediation executor and health checker. Outcomes are randomised;
//! pass a seed for reproducible runs. Tests use deterministic doubles instead.

mod executor;
mod infrastructure;

pub use executor::{SimulatedExecutor, SimulatedHealthChecker};
pub use infrastructure::SimulatedInfrastructure;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seeded or entropy-backed RNG shared behind a mutex
///
/// The guard is only held inside synchronous closures, never across an await.
#[derive(Debug)]
pub(crate) struct SharedRng(Mutex<StdRng>);

impl SharedRng {
    pub(crate) fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self(Mutex::new(rng))
    }

    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.0.lock())
    }
}
