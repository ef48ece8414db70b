use std::time::Duration;

use clap::Parser;
use pushgate_aggregate::AggregateOptions;
use pushgate_api::{ApiConfig, router::DEFAULT_MAX_BODY_BYTES};
use pushgate_common::{PushgateError, Result, parse_duration};

#[derive(Debug, Parser)]
#[command(name = "pushgate", about = "Aggregating push gateway for Prometheus metrics")]
pub struct Cli {
    /// Address of the push/scrape listener.
    #[arg(long, env = "PUSHGATE_API_LISTEN", default_value = "0.0.0.0:80")]
    pub api_listen: String,

    /// Address of the health and self-metrics listener.
    #[arg(long, env = "PUSHGATE_LIFECYCLE_LISTEN", default_value = "0.0.0.0:8888")]
    pub lifecycle_listen: String,

    /// Allowed CORS origin; repeat or comma-separate for several. Any origin
    /// is allowed when unset.
    #[arg(long = "cors-domain", env = "PUSHGATE_CORS_DOMAIN", value_delimiter = ',')]
    pub cors_domains: Vec<String>,

    /// Label names dropped from every pushed series, e.g. `job,instance`.
    #[arg(long, env = "PUSHGATE_IGNORED_LABELS", value_delimiter = ',')]
    pub ignored_labels: Vec<String>,

    /// Drop series not pushed for this long (`30s`, `5m`, `1h`). Zero or
    /// unset keeps series forever.
    #[arg(long, env = "PUSHGATE_METRIC_TTL")]
    pub metric_ttl: Option<String>,

    /// Period of the expiry sweep. Defaults to the TTL clamped to 1s..60s.
    #[arg(long, env = "PUSHGATE_SWEEP_INTERVAL")]
    pub sweep_interval: Option<String>,

    #[arg(long, env = "PUSHGATE_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PUSHGATE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_listen: String,
    pub lifecycle_listen: String,
    pub api: ApiConfig,
    pub aggregate: AggregateOptions,
}

impl GatewayConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let metric_ttl = cli
            .metric_ttl
            .as_deref()
            .map(parse_duration)
            .transpose()?
            .filter(|ttl| !ttl.is_zero());

        let mut aggregate = AggregateOptions::new(&cli.ignored_labels, metric_ttl);
        if let Some(raw) = cli.sweep_interval.as_deref() {
            let interval = parse_duration(raw)?;
            if interval.is_zero() {
                return Err(PushgateError::InvalidConfig(
                    "sweep interval must be greater than zero".to_string(),
                ));
            }
            aggregate = aggregate.with_sweep_interval(interval);
        }

        if cli.max_body_bytes == 0 {
            return Err(PushgateError::InvalidConfig(
                "max body bytes must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api_listen: listen_address(&cli.api_listen)?,
            lifecycle_listen: listen_address(&cli.lifecycle_listen)?,
            api: ApiConfig {
                cors_domains: cli
                    .cors_domains
                    .iter()
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect(),
                max_body_bytes: cli.max_body_bytes,
            },
            aggregate,
        })
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.aggregate.sweep_interval()
    }
}

/// Accepts `host:port` and the short `:port` form.
fn listen_address(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PushgateError::InvalidConfig(
            "listen address is empty".to_string(),
        ));
    }
    match raw.strip_prefix(':') {
        Some(port) => Ok(format!("0.0.0.0:{port}")),
        None => Ok(raw.to_string()),
    }
}
