use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outlook_core::config::{AnalysisOptions, Settings};
use outlook_core::domain::outlook::Verdict;
use outlook_core::service::{AnalysisRequest, OutlookService};
use outlook_core::time::market::resolve_as_of_date;

#[derive(Debug, Parser)]
#[command(name = "outlook_cli", about = "Print a technical and news outlook for one equity")]
struct Args {
    /// Ticker symbol, e.g. AAPL.
    #[arg(long)]
    ticker: String,

    /// Company name for the news query. Defaults to the ticker.
    #[arg(long)]
    company_name: Option<String>,

    /// Market as-of date (YYYY-MM-DD). Defaults to the latest completed US session.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Classify news with keyword rules instead of the language model.
    #[arg(long)]
    offline: bool,

    /// Single-line JSON output.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref(), chrono::Utc::now())?;
    let options = AnalysisOptions::from_env();
    let service = OutlookService::from_settings(&settings, options, args.offline)
        .context("failed to configure outlook service")?;

    let request = AnalysisRequest {
        ticker: args.ticker,
        company_name: args.company_name,
        as_of_date: Some(as_of_date),
    };

    let report = match service.analyze(request).await {
        Ok(report) => report,
        Err(err) => {
            let err = anyhow::Error::new(err).context("outlook run failed");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, error = %err, "outlook run failed");
            return Err(err);
        }
    };

    if let Verdict::InsufficientData { drivers } = &report.verdict {
        tracing::warn!(ticker = %report.ticker, ?drivers, "insufficient data for an outlook");
    }

    let out = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{out}");
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "outlook_cli",
            "--ticker",
            "AAPL",
            "--as-of-date",
            "2026-01-05",
            "--offline",
            "--compact",
        ])
        .unwrap();
        assert_eq!(args.ticker, "AAPL");
        assert_eq!(args.as_of_date.as_deref(), Some("2026-01-05"));
        assert!(args.offline);
        assert!(args.compact);
        assert!(args.company_name.is_none());
    }

    #[test]
    fn ticker_is_required() {
        assert!(Args::try_parse_from(["outlook_cli"]).is_err());
    }
}
