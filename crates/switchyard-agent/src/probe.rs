//! Backing-service availability probing with a TTL-stamped verdict cache.
//!
//! A probe never errors: failures and timeouts both resolve to
//! unavailable, which simply excludes dependent capabilities from the next
//! catalog build. Verdicts are explicit `(available, checked_at, ttl)`
//! values so staleness is checked at read time and tests can inject a
//! clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on one live check.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a cached verdict.
pub const DEFAULT_PROBE_TTL: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────────────────────────────────────
// Service Availability
// ─────────────────────────────────────────────────────────────────────────────

/// A cached availability verdict for one backing service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAvailability {
    /// Whether the service answered its liveness check.
    pub available: bool,
    /// When the verdict was computed.
    pub checked_at: Instant,
    /// How long the verdict stays valid.
    pub ttl: Duration,
}

impl ServiceAvailability {
    /// Create a verdict stamped now.
    pub fn new(available: bool, checked_at: Instant, ttl: Duration) -> Self {
        Self {
            available,
            checked_at,
            ttl,
        }
    }

    /// Whether the verdict is still usable at `now`. A stale verdict is
    /// unknown and must be re-probed before use.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.checked_at) < self.ttl
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for service liveness checks.
///
/// Implementations perform a cheap metadata call against the service.
/// The return value is the whole contract: true means usable, false means
/// not. Errors have no channel by design.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// Check whether the service is currently usable.
    async fn check_live(&self, service_id: &str) -> bool;
}

/// A probe that can be shared across catalog builds.
pub type SharedProbe = Arc<dyn AvailabilityProbe>;

// ─────────────────────────────────────────────────────────────────────────────
// Probe Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Clock function used for verdict stamping. Injectable for tests.
type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// TTL-stamped verdict cache wrapping an [`AvailabilityProbe`].
///
/// A fresh cached verdict short-circuits the live check. Stale entries are
/// re-probed on access. Live checks run under a bounded timeout; expiry
/// counts as unavailable.
pub struct ProbeCache {
    probe: SharedProbe,
    entries: Mutex<HashMap<String, ServiceAvailability>>,
    ttl: Duration,
    timeout: Duration,
    clock: Clock,
}

impl ProbeCache {
    /// Create a cache with default TTL and timeout.
    pub fn new(probe: SharedProbe) -> Self {
        Self {
            probe,
            entries: Mutex::new(HashMap::new()),
            ttl: DEFAULT_PROBE_TTL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            clock: Arc::new(Instant::now),
        }
    }

    /// Create a cache with TTL and timeout taken from the file config.
    pub fn from_file_config(
        probe: SharedProbe,
        section: &switchyard_config::ProbeSection,
    ) -> Self {
        Self::new(probe)
            .with_ttl(Duration::from_secs(section.ttl_secs))
            .with_timeout(Duration::from_secs(section.timeout_secs))
    }

    /// Set the verdict TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the live-check timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the clock. Tests use this to age verdicts without sleeping.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Check one service, consulting the cache first.
    pub async fn check(&self, service_id: &str) -> bool {
        let now = (self.clock)();

        if let Some(verdict) = self.entries.lock().get(service_id) {
            if verdict.is_fresh(now) {
                tracing::debug!(
                    service_id,
                    available = verdict.available,
                    "Probe cache hit"
                );
                return verdict.available;
            }
        }

        let available = match tokio::time::timeout(self.timeout, self.probe.check_live(service_id))
            .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::warn!(
                    service_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Probe timed out, treating service as unavailable"
                );
                false
            }
        };

        tracing::debug!(service_id, available, "Probe result");
        self.entries.lock().insert(
            service_id.to_string(),
            ServiceAvailability::new(available, (self.clock)(), self.ttl),
        );
        available
    }

    /// The verdict TTL in effect.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The live-check timeout in effect.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of cached verdicts.
    pub fn cached_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drop all cached verdicts.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for ProbeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeCache")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("cached", &self.cached_count())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Probe
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic probe for testing.
///
/// Answers from a fixed availability map (unknown services are
/// unavailable) and records every live check it receives.
#[derive(Debug, Default)]
pub struct MockProbe {
    availability: Mutex<HashMap<String, bool>>,
    delay: Option<Duration>,
    checks: Mutex<Vec<String>>,
}

impl MockProbe {
    /// Create a probe where every service is unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a service as available or not.
    pub fn with_service(self, service_id: impl Into<String>, available: bool) -> Self {
        self.availability.lock().insert(service_id.into(), available);
        self
    }

    /// Sleep this long on every live check, to exercise the probe timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Flip a service's availability after construction.
    pub fn set_service(&self, service_id: impl Into<String>, available: bool) {
        self.availability.lock().insert(service_id.into(), available);
    }

    /// Service ids live-checked so far, in order.
    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().clone()
    }

    /// Number of live checks performed.
    pub fn check_count(&self) -> usize {
        self.checks.lock().len()
    }
}

#[async_trait]
impl AvailabilityProbe for MockProbe {
    async fn check_live(&self, service_id: &str) -> bool {
        self.checks.lock().push(service_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.availability
            .lock()
            .get(service_id)
            .copied()
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
