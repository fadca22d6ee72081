//! Liquidator configuration.
//!
//! Values come from an optional TOML file (`LIQUIDATOR_CONFIG`, default
//! `config/liquidator.toml`) with `${VAR}` placeholders expanded, then from
//! environment overrides. `PRIVATE_KEY` is never part of this struct.

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use liquidator_chain::{LIQUIDATION_HELPER, POOL_ADDRESSES_PROVIDER};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/liquidator.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidatorConfig {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub dex: DexConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub liquidation: LiquidationConfig,

    #[serde(default)]
    pub failover: FailoverConfig,
}

/// RPC endpoints, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Node URLs, primary first
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

fn default_chain_id() -> u64 {
    42793 // Etherlink mainnet
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            chain_id: default_chain_id(),
        }
    }
}

impl RpcConfig {
    /// Usable node URLs, primary first.
    ///
    /// Blank entries and entries still holding an unexpanded `${VAR}`
    /// (an unset optional backup) are dropped.
    pub fn endpoint_urls(&self) -> Vec<String> {
        self.urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && !u.contains("${"))
            .map(str::to_string)
            .collect()
    }
}

/// Position store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Lending protocol contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_addresses_provider")]
    pub addresses_provider: Address,

    /// FlashLiquidations helper contract
    #[serde(default = "default_liquidation_helper")]
    pub liquidation_helper: Address,
}

fn default_addresses_provider() -> Address {
    POOL_ADDRESSES_PROVIDER
}
fn default_liquidation_helper() -> Address {
    LIQUIDATION_HELPER
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            addresses_provider: default_addresses_provider(),
            liquidation_helper: default_liquidation_helper(),
        }
    }
}

/// IguanaDEX V3 contracts used for route discovery and quoting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexConfig {
    #[serde(default)]
    pub factory: Option<Address>,

    #[serde(default)]
    pub quoter_v2: Option<Address>,
}

/// Cycle trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron-style expression (see [`CycleSchedule::parse`])
    #[serde(default = "default_cron")]
    pub cron: String,
}

fn default_cron() -> String {
    "*/5 * * * *".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

/// Liquidation execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Users fetched concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Blocks to wait after inclusion
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Flat per-liquidation cost deducted from profit (USD)
    #[serde(default)]
    pub flat_cost_usd: f64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    10
}
fn default_confirmations() -> u64 {
    2
}
fn default_confirmation_timeout() -> u64 {
    120
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            confirmations: default_confirmations(),
            flat_cost_usd: 0.0,
            confirmation_timeout_secs: default_confirmation_timeout(),
        }
    }
}

impl LiquidationConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Delay between endpoint attempts. `backoff_initial_ms = 0` disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_backoff_max() -> u64 {
    5_000
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: 0,
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl FailoverConfig {
    /// `(initial, max)` when backoff is enabled.
    pub fn backoff(&self) -> Option<(Duration, Duration)> {
        (self.backoff_initial_ms > 0).then(|| {
            (
                Duration::from_millis(self.backoff_initial_ms),
                Duration::from_millis(self.backoff_max_ms.max(self.backoff_initial_ms)),
            )
        })
    }
}

impl LiquidatorConfig {
    /// Load configuration from a TOML file, expanding `${VAR}` placeholders.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&expand_env(&content))
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from file (if any) and the process environment, then validate.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("LIQUIDATOR_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("NODE_URL_PRIMARY") {
            set_or_push(&mut self.rpc.urls, 0, url);
        }
        if let Some(url) = lookup("NODE_URL_BACKUP") {
            set_or_push(&mut self.rpc.urls, 1, url);
        }
        if let Some(chain_id) = lookup("CHAIN_ID") {
            self.rpc.chain_id = chain_id
                .trim()
                .parse()
                .with_context(|| format!("invalid CHAIN_ID: {chain_id}"))?;
        }
        if let Some(url) = lookup("DB_URL") {
            self.database.url = url;
        }
        if let Some(cron) = lookup("LIQUIDATION_CRON_EXPRESSION") {
            self.scheduler.cron = cron;
        }
        if let Some(addr) = lookup("POOL_ADDRESSES_PROVIDER") {
            self.protocol.addresses_provider = parse_address("POOL_ADDRESSES_PROVIDER", &addr)?;
        }
        if let Some(addr) = lookup("LIQUIDATION_HELPER") {
            self.protocol.liquidation_helper = parse_address("LIQUIDATION_HELPER", &addr)?;
        }
        if let Some(addr) = lookup("IGUANA_V3_FACTORY") {
            self.dex.factory = Some(parse_address("IGUANA_V3_FACTORY", &addr)?);
        }
        if let Some(addr) = lookup("IGUANA_V3_QUOTER") {
            self.dex.quoter_v2 = Some(parse_address("IGUANA_V3_QUOTER", &addr)?);
        }
        Ok(())
    }

    /// Check that everything needed to run is present.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoint_urls().is_empty() {
            bail!("no RPC endpoints configured (set NODE_URL_PRIMARY or rpc.urls)");
        }
        if self.database.url.trim().is_empty() {
            bail!("no database configured (set DB_URL or database.url)");
        }
        if self.dex.factory.is_none() || self.dex.quoter_v2.is_none() {
            bail!("IguanaDEX V3 factory and quoter addresses are required (IGUANA_V3_FACTORY, IGUANA_V3_QUOTER)");
        }
        if self.liquidation.batch_size == 0 {
            bail!("liquidation.batch_size must be at least 1");
        }
        if !self.liquidation.flat_cost_usd.is_finite() || self.liquidation.flat_cost_usd < 0.0 {
            bail!("liquidation.flat_cost_usd must be a non-negative number");
        }
        self.schedule()?;
        Ok(())
    }

    /// Parsed cycle schedule.
    pub fn schedule(&self) -> Result<CycleSchedule> {
        CycleSchedule::parse(&self.scheduler.cron)
    }

    /// Log the resolved configuration. URLs are not printed; they may carry API keys.
    pub fn log_config(&self) {
        info!(
            chain_id = self.rpc.chain_id,
            endpoints = self.rpc.endpoint_urls().len(),
            "RPC configuration"
        );
        info!(
            max_connections = self.database.max_connections,
            acquire_timeout_secs = self.database.acquire_timeout_secs,
            "Database configuration"
        );
        info!(
            addresses_provider = %self.protocol.addresses_provider,
            liquidation_helper = %self.protocol.liquidation_helper,
            factory = ?self.dex.factory,
            quoter_v2 = ?self.dex.quoter_v2,
            "Contract addresses"
        );
        info!(
            cron = %self.scheduler.cron,
            batch_size = self.liquidation.batch_size,
            confirmations = self.liquidation.confirmations,
            flat_cost_usd = self.liquidation.flat_cost_usd,
            confirmation_timeout_secs = self.liquidation.confirmation_timeout_secs,
            backoff_initial_ms = self.failover.backoff_initial_ms,
            "Liquidation parameters"
        );
    }
}

fn set_or_push(urls: &mut Vec<String>, index: usize, url: String) {
    if let Some(slot) = urls.get_mut(index) {
        *slot = url;
    } else {
        urls.push(url);
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid address in {name}: {value}"))
}

/// Expand ${VAR_NAME} patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Fixed-interval cycle schedule derived from a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSchedule {
    pub interval: Duration,
}

impl CycleSchedule {
    /// Parse the cron forms used for this job:
    ///
    /// - `* * * * *` every minute
    /// - `*/N * * * *` every N minutes
    /// - `0 */N * * *` every N hours
    /// - `*/N * * * * *` every N seconds (6-field form)
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.split_whitespace().collect::<Vec<_>>().join(" ");

        let patterns: [(&str, u64); 4] = [
            (r"^\* \* \* \* \*$", 60),
            (r"^\*/(\d+) \* \* \* \*$", 60),
            (r"^0 \*/(\d+) \* \* \*$", 3600),
            (r"^\*/(\d+) \* \* \* \* \*$", 1),
        ];

        for (pattern, unit_secs) in patterns {
            let re = regex_lite::Regex::new(pattern).context("invalid schedule pattern")?;
            let Some(caps) = re.captures(&expr) else {
                continue;
            };
            let step = match caps.get(1) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .with_context(|| format!("invalid step in schedule '{expr}'"))?,
                None => 1,
            };
            if step == 0 {
                bail!("schedule step must be positive: '{expr}'");
            }
            return Ok(Self {
                interval: Duration::from_secs(step * unit_secs),
            });
        }

        bail!("unsupported schedule expression '{expr}' (expected '*/N * * * *', '0 */N * * *', '* * * * *' or '*/N * * * * *')")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LiquidatorConfig::default();
        assert_eq!(config.rpc.chain_id, 42793);
        assert_eq!(config.liquidation.batch_size, 10);
        assert_eq!(config.liquidation.confirmations, 2);
        assert_eq!(config.liquidation.flat_cost_usd, 0.0);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.scheduler.cron, "*/5 * * * *");
        assert_eq!(config.protocol.addresses_provider, POOL_ADDRESSES_PROVIDER);
        assert!(config.failover.backoff().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LiquidatorConfig = toml::from_str(
            r#"
            [rpc]
            urls = ["https://a.example", "https://b.example"]

            [liquidation]
            batch_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc.urls.len(), 2);
        assert_eq!(config.rpc.chain_id, 42793);
        assert_eq!(config.liquidation.batch_size, 4);
        assert_eq!(config.liquidation.confirmations, 2);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("NODE_URL_PRIMARY", "https://primary.example"),
            ("NODE_URL_BACKUP", "https://backup.example"),
            ("CHAIN_ID", "128123"),
            ("DB_URL", "postgres://localhost/liquidations"),
            ("LIQUIDATION_CRON_EXPRESSION", "*/1 * * * *"),
            ("IGUANA_V3_FACTORY", "0x0000000000000000000000000000000000000001"),
            ("IGUANA_V3_QUOTER", "0x0000000000000000000000000000000000000002"),
        ]
        .into_iter()
        .collect();

        let mut config = LiquidatorConfig::default();
        config.rpc.urls = vec!["https://from-file.example".to_string()];
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            config.rpc.urls,
            vec!["https://primary.example", "https://backup.example"]
        );
        assert_eq!(config.rpc.chain_id, 128123);
        assert_eq!(config.scheduler.cron, "*/1 * * * *");
        assert_eq!(config.dex.factory, Some(Address::with_last_byte(1)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = LiquidatorConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "CHAIN_ID").then(|| "etherlink".to_string()))
            .is_err());
        assert!(config
            .apply_overrides(|key| (key == "LIQUIDATION_HELPER").then(|| "0x1234".to_string()))
            .is_err());
    }

    #[test]
    fn test_validate_requires_endpoints_and_dex() {
        let mut config = LiquidatorConfig::default();
        assert!(config.validate().is_err());

        config.rpc.urls = vec!["https://node.mainnet.etherlink.com".to_string()];
        config.database.url = "postgres://localhost/db".to_string();
        assert!(config.validate().is_err());

        config.dex.factory = Some(Address::with_last_byte(1));
        config.dex.quoter_v2 = Some(Address::with_last_byte(2));
        assert!(config.validate().is_ok());

        config.liquidation.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unset_backup_url_is_skipped() {
        let content = r#"
            [rpc]
            urls = ["https://a.example", "${LIQUIDATOR_CONFIG_UNSET_BACKUP}", "  "]
        "#;
        let config: LiquidatorConfig = toml::from_str(&expand_env(content)).unwrap();

        assert_eq!(config.rpc.urls.len(), 3);
        assert_eq!(config.rpc.endpoint_urls(), vec!["https://a.example".to_string()]);
    }

    #[test]
    fn test_placeholder_only_urls_rejected() {
        let mut config = LiquidatorConfig::default();
        config.rpc.urls = vec!["${LIQUIDATOR_CONFIG_UNSET_PRIMARY}".to_string()];
        config.database.url = "postgres://localhost/db".to_string();
        config.dex.factory = Some(Address::with_last_byte(1));
        config.dex.quoter_v2 = Some(Address::with_last_byte(2));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no RPC endpoints"));
    }

    #[test]
    fn test_expand_env() {
        // Use unique var name to avoid conflicts with parallel tests
        std::env::set_var("LIQUIDATOR_CONFIG_TEST_VAR", "test_value");
        assert_eq!(expand_env("${LIQUIDATOR_CONFIG_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("prefix_${LIQUIDATOR_CONFIG_TEST_VAR}_suffix"),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("${LIQUIDATOR_CONFIG_UNSET_VAR}"), "${LIQUIDATOR_CONFIG_UNSET_VAR}");
        assert_eq!(expand_env("no_vars"), "no_vars");
        std::env::remove_var("LIQUIDATOR_CONFIG_TEST_VAR");
    }

    #[test]
    fn test_schedule_forms() {
        let every = |s| CycleSchedule::parse(s).unwrap().interval;
        assert_eq!(every("*/5 * * * *"), Duration::from_secs(300));
        assert_eq!(every("* * * * *"), Duration::from_secs(60));
        assert_eq!(every("0 */2 * * *"), Duration::from_secs(7200));
        assert_eq!(every("*/30 * * * * *"), Duration::from_secs(30));
        assert_eq!(every("  */5  * * * * "), Duration::from_secs(300));
    }

    #[test]
    fn test_schedule_rejects_unsupported() {
        assert!(CycleSchedule::parse("*/0 * * * *").is_err());
        assert!(CycleSchedule::parse("5 4 * * *").is_err());
        assert!(CycleSchedule::parse("every 5 minutes").is_err());
        assert!(CycleSchedule::parse("").is_err());
    }

    #[test]
    fn test_backoff_config() {
        let failover = FailoverConfig {
            backoff_initial_ms: 250,
            backoff_max_ms: 100,
        };
        assert_eq!(
            failover.backoff(),
            Some((Duration::from_millis(250), Duration::from_millis(250)))
        );
    }
}
