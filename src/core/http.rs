//! Shared HTTP client utilities
//!
//! Centralizes reqwest client configuration for connection pooling
//! and consistent timeouts across registry and advisory calls.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ADVISORY_TIMEOUT: Duration = Duration::from_secs(30);
const ADVISORY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static SHARED_CLIENT: LazyLock<Client> =
    LazyLock::new(|| build_client(configured_timeout(DEFAULT_TIMEOUT), DEFAULT_CONNECT_TIMEOUT));
static ADVISORY_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    build_client(configured_timeout(ADVISORY_TIMEOUT), ADVISORY_CONNECT_TIMEOUT)
});

/// `NULLVOID_NETWORK_TIMEOUT` (seconds) overrides the built-in timeout.
fn configured_timeout(default: Duration) -> Duration {
    std::env::var("NULLVOID_NETWORK_TIMEOUT")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Build HTTP client with standard configuration.
///
/// This function uses `.expect()` because:
/// 1. All configuration values are static and known-valid
/// 2. Building can only fail with TLS backend issues (extremely rare)
/// 3. Without a working client, none of the registry or advisory
///    integrations can function at all
///
/// # Panics
/// Panics if the HTTP client cannot be built, which should only happen with:
/// - Missing TLS certificates (system misconfiguration)
/// - Incompatible TLS backend (build issue)
#[allow(clippy::expect_used)] // System misconfiguration or build issue; panics documented above
fn build_client(timeout: Duration, connect_timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!("nullvoid/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to build HTTP client - check TLS configuration")
}

/// Shared default HTTP client (registry metadata lookups).
#[must_use]
pub fn shared_client() -> &'static Client {
    &SHARED_CLIENT
}

/// Shared HTTP client with extended timeouts for slow advisory feeds.
#[must_use]
pub fn advisory_client() -> &'static Client {
    &ADVISORY_CLIENT
}
