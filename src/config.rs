use anyhow::{Context, Result};
use crate::services::debounce::DEFAULT_QUIET_PERIOD;
use clap::Parser;
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub staging_dir: String,
    pub database_url: String,
    /// Base URL the fingerprint service uses to fetch staged audio.
    pub public_base_url: String,
    pub fingerprint: FingerprintConfig,
    pub registry_url: String,
    pub registry_timeout: Duration,
    pub code_quiet_period: Duration,
    pub min_file_bytes: u64,
    pub staging_ttl: Duration,
    /// Open attempts older than this are dropped by the sweeper.
    pub attempt_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Clone)]
pub struct FingerprintConfig {
    pub enabled: bool,
    pub url: String,
    pub access_key: String,
    pub access_secret: String,
    pub timeout: Duration,
    pub inline_limit_bytes: u64,
    pub max_payload_bytes: u64,
}

// Secrets stay out of the start-up log line.
impl std::fmt::Debug for FingerprintConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("access_key", &if self.access_key.is_empty() { "missing" } else { "present" })
            .field("timeout", &self.timeout)
            .field("inline_limit_bytes", &self.inline_limit_bytes)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("staging_dir", &self.staging_dir)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("fingerprint", &self.fingerprint)
            .field("registry_url", &self.registry_url)
            .field("code_quiet_period", &self.code_quiet_period)
            .field("min_file_bytes", &self.min_file_bytes)
            .field("staging_ttl", &self.staging_ttl)
            .field("attempt_ttl", &self.attempt_ttl)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Upload rights and copyright-risk verification service")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_VERIFIER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_VERIFIER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for staged fingerprint samples (overrides UPLOAD_VERIFIER_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Database URL (overrides UPLOAD_VERIFIER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL (overrides UPLOAD_VERIFIER_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Fingerprint service base URL (overrides UPLOAD_VERIFIER_FINGERPRINT_URL)
    #[arg(long)]
    pub fingerprint_url: Option<String>,

    /// Turn the fingerprint lookup off; every music upload then needs review
    #[arg(long)]
    pub disable_fingerprint: bool,

    /// Recording registry base URL (overrides UPLOAD_VERIFIER_REGISTRY_URL)
    #[arg(long)]
    pub registry_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

const MIB: u64 = 1024 * 1024;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed arguments over the environment.
    pub fn from_args(args: Args) -> Result<Self> {
        let env_host: String = env_or("UPLOAD_VERIFIER_HOST", "0.0.0.0".to_string())?;
        let env_port: u16 = env_or("UPLOAD_VERIFIER_PORT", 3000)?;
        let port = args.port.unwrap_or(env_port);

        let env_staging: String =
            env_or("UPLOAD_VERIFIER_STAGING_DIR", "./data/staging".to_string())?;
        let env_db: String = env_or(
            "UPLOAD_VERIFIER_DATABASE_URL",
            "sqlite://./data/meta/upload_verifier.db".to_string(),
        )?;
        let env_public: String = env_or(
            "UPLOAD_VERIFIER_PUBLIC_URL",
            format!("http://127.0.0.1:{}", port),
        )?;

        let fingerprint = FingerprintConfig {
            enabled: !args.disable_fingerprint
                && env_or("UPLOAD_VERIFIER_FINGERPRINT_ENABLED", true)?,
            url: match args.fingerprint_url {
                Some(url) => url,
                None => env_or(
                    "UPLOAD_VERIFIER_FINGERPRINT_URL",
                    "https://identify-us-west-2.acrcloud.com".to_string(),
                )?,
            },
            access_key: env_or("FINGERPRINT_ACCESS_KEY", String::new())?,
            access_secret: env_or("FINGERPRINT_ACCESS_SECRET", String::new())?,
            timeout: Duration::from_millis(env_or("UPLOAD_VERIFIER_FINGERPRINT_TIMEOUT_MS", 10_000)?),
            inline_limit_bytes: env_or("UPLOAD_VERIFIER_INLINE_LIMIT_BYTES", 10 * MIB)?,
            max_payload_bytes: env_or("UPLOAD_VERIFIER_MAX_PAYLOAD_BYTES", 500 * MIB)?,
        };

        let registry_url = match args.registry_url {
            Some(url) => url,
            None => env_or(
                "UPLOAD_VERIFIER_REGISTRY_URL",
                crate::services::registry_client::DEFAULT_REGISTRY_URL.to_string(),
            )?,
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_url.unwrap_or(env_public),
            fingerprint,
            registry_url,
            registry_timeout: Duration::from_millis(env_or(
                "UPLOAD_VERIFIER_REGISTRY_TIMEOUT_MS",
                10_000,
            )?),
            code_quiet_period: Duration::from_millis(env_or(
                "UPLOAD_VERIFIER_CODE_QUIET_MS",
                DEFAULT_QUIET_PERIOD.as_millis() as u64,
            )?),
            min_file_bytes: env_or("UPLOAD_VERIFIER_MIN_FILE_BYTES", MIB)?,
            staging_ttl: Duration::from_secs(env_or("UPLOAD_VERIFIER_STAGING_TTL_SECS", 24 * 60 * 60)?),
            attempt_ttl: Duration::from_secs(env_or("UPLOAD_VERIFIER_ATTEMPT_TTL_SECS", 60 * 60)?),
            sweep_interval: Duration::from_secs(env_or(
                "UPLOAD_VERIFIER_SWEEP_INTERVAL_SECS",
                60 * 60,
            )?),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
