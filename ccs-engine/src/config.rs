//! Engine and transport configuration
//!
//! Runtime knobs loaded from environment variables; the placement policy
//! itself lives in `ccs_core::policy`.

use std::time::Duration;

/// Default cluster REST API port
pub const DEFAULT_API_PORT: u16 = 9094;
/// Default IPFS gateway port
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Settings shared by the batch scans (repair, rebalance, ensure-pins, tag-pins)
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Report what would change without writing to the cluster
    pub dry_run: bool,

    /// Pause after each write so the control plane is not flooded
    pub request_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            request_delay: Duration::from_millis(100),
        }
    }
}

impl ScanConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let request_delay_ms = std::env::var("CCS_REQUEST_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let dry_run = std::env::var("CCS_DRY_RUN")
            .ok()
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            dry_run,
            request_delay: Duration::from_millis(request_delay_ms),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// No delay between writes (tests, small clusters)
    pub fn unthrottled(mut self) -> Self {
        self.request_delay = Duration::ZERO;
        self
    }

    pub(crate) async fn throttle(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Cluster REST API port
    pub api_port: u16,

    /// IPFS gateway port used for DAG sizes and downloads
    pub gateway_port: u16,

    /// Timeout for ordinary requests in seconds
    pub request_timeout_secs: u64,

    /// Extra add timeout per MiB of payload, in seconds
    pub add_timeout_per_mib_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_port: DEFAULT_API_PORT,
            gateway_port: DEFAULT_GATEWAY_PORT,
            request_timeout_secs: 300,
            add_timeout_per_mib_secs: 1,
        }
    }
}

impl TransportConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_port = std::env::var("CCS_API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.api_port);

        let gateway_port = std::env::var("CCS_GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.gateway_port);

        let request_timeout_secs = std::env::var("CCS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        Self {
            api_port,
            gateway_port,
            request_timeout_secs,
            ..defaults
        }
    }

    /// Timeout for ordinary requests
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout for an add carrying `payload_bytes`; grows with the payload
    pub fn add_timeout(&self, payload_bytes: u64) -> Duration {
        let mib = payload_bytes.div_ceil(1024 * 1024);
        Duration::from_secs(
            self.request_timeout_secs
                .saturating_add(mib.saturating_mul(self.add_timeout_per_mib_secs)),
        )
    }
}
