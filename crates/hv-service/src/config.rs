use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hv_ledger::builder::PoolContract;
use hv_types::{Address, FeePolicy, WAIT_ROUNDS, WITHDRAWAL_MIN_FEE};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where to reach the ledger node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeSource {
    Url { url: String, token: String },
    /// Node data directory holding `algod.net` and `algod.token`.
    Dir(PathBuf),
}

#[derive(Clone, Debug)]
pub struct PoolSettings {
    pub app_id: u64,
    pub app_address: Address,
    pub verifier_address: Address,
    pub verifier_program_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub node: NodeSource,
    pub db_path: PathBuf,
    pub listen_addr: String,
    pub vault_public_key_path: PathBuf,
    pub pool: PoolSettings,
    pub fee_policy: FeePolicy,
    pub wait_rounds: u64,
    pub cleanup_interval: Duration,
    pub session_sweep_interval: Duration,
    pub unconfirmed_retention: Duration,
    pub session_ttl: Duration,
    pub shutdown_grace: Duration,
    pub log_level: String,
    pub log_json: bool,
}

impl ServiceConfig {
    /// Defaults for everything but the pool itself.
    pub fn new(pool: PoolSettings) -> Self {
        Self {
            node: NodeSource::Url {
                url: "http://localhost:4001".into(),
                token: String::new(),
            },
            db_path: "hermesvault.db".into(),
            listen_addr: "0.0.0.0:5555".into(),
            vault_public_key_path: "public_key.bin".into(),
            pool,
            fee_policy: FeePolicy::new(0, WITHDRAWAL_MIN_FEE),
            wait_rounds: WAIT_ROUNDS,
            cleanup_interval: Duration::from_secs(600),
            session_sweep_interval: Duration::from_secs(60),
            unconfirmed_retention: Duration::from_secs(86_400),
            session_ttl: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(60),
            log_level: "info".into(),
            log_json: false,
        }
    }

    /// Load `.env` if present, then read `HV_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let pool = PoolSettings {
            app_id: parse_required("HV_APP_ID")?,
            app_address: parse_required("HV_APP_ADDRESS")?,
            verifier_address: parse_required("HV_VERIFIER_ADDRESS")?,
            verifier_program_path: env_or("HV_VERIFIER_PROGRAM_PATH", "verifier.bin").into(),
        };
        let d = Self::new(pool);

        let node = match std::env::var("HV_NODE_DIR") {
            Ok(dir) if !dir.is_empty() => NodeSource::Dir(dir.into()),
            _ => NodeSource::Url {
                url: env_or("HV_NODE_URL", "http://localhost:4001"),
                token: env_or("HV_NODE_TOKEN", ""),
            },
        };

        Ok(Self {
            node,
            db_path: parse_or("HV_DB_PATH", d.db_path)?,
            listen_addr: env_or("HV_LISTEN_ADDR", &d.listen_addr),
            vault_public_key_path: parse_or("HV_VAULT_PUBLIC_KEY_PATH", d.vault_public_key_path)?,
            fee_policy: FeePolicy::new(
                parse_or("HV_FEE_DIVISOR", d.fee_policy.divisor)?,
                parse_or("HV_FEE_MINIMUM", d.fee_policy.minimum)?,
            ),
            wait_rounds: parse_or("HV_WAIT_ROUNDS", d.wait_rounds)?,
            cleanup_interval: secs("HV_CLEANUP_INTERVAL_SECS", d.cleanup_interval)?,
            session_sweep_interval: secs("HV_SESSION_SWEEP_SECS", d.session_sweep_interval)?,
            unconfirmed_retention: secs("HV_UNCONFIRMED_RETENTION_SECS", d.unconfirmed_retention)?,
            session_ttl: secs("HV_SESSION_TTL_SECS", d.session_ttl)?,
            shutdown_grace: secs("HV_SHUTDOWN_GRACE_SECS", d.shutdown_grace)?,
            log_level: env_or("RUST_LOG", &d.log_level),
            log_json: parse_or("HV_LOG_JSON", d.log_json)?,
            pool: d.pool,
        })
    }

    /// Read the verifier program and assemble the pool description.
    pub fn pool_contract(&self) -> Result<PoolContract, ConfigError> {
        let path = &self.pool.verifier_program_path;
        let verifier_program = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(PoolContract {
            app_id: self.pool.app_id,
            app_address: self.pool.app_address.clone(),
            verifier_address: self.pool.verifier_address.clone(),
            verifier_program,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_value(key, value),
        _ => Ok(default),
    }
}

fn parse_required<T>(key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_value(key, value),
        _ => Err(ConfigError::Missing { key }),
    }
}

fn parse_value<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(key, default.as_secs()).map(Duration::from_secs)
}
