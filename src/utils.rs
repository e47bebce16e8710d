use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global subscriber. `RUST_LOG` wins over the default directive.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "industry_screener=debug"
    } else {
        "industry_screener=info"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("setting default subscriber failed: {}", e))
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Market cap in crores (1 crore = 10^7) for display
pub fn format_market_cap(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= 1e7 => format!("₹{:.0} Cr", v / 1e7),
        Some(v) => format!("₹{:.0}", v),
        None => "N/A".to_string(),
    }
}

pub fn format_ratio(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "N/A".to_string())
}
