use anyhow::{Context, Result};
use perch_analysis::{AnalysisError, Analyzer};
use perch_common::observability::{LogConfig, init_logging};
use perch_common::{Account, PerchError};
use perch_config::{ConfigError, PerchConfig, PerchConfigLoader};
use perch_harvest::{FetchOutcome, Fetcher, HarvestError, Pacer, TweetStore};
use perch_http::RetryPolicy;
use perch_social::twitter::TwitterApi;
use std::path::Path;

const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_STORAGE: i32 = 5;

/// Map a failure to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<HarvestError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<PerchError>().is_some() {
        return EXIT_CONFIG;
    }
    if err.downcast_ref::<AnalysisError>().is_some() {
        return EXIT_STORAGE;
    }
    EXIT_FAILURE
}

/// Load configuration and start logging. Nothing touches the network before this returns.
fn setup(config_path: &Path, raw_account: &str) -> Result<(PerchConfig, Account)> {
    let cfg = PerchConfigLoader::new()
        .with_dotenv()
        .with_optional_file(config_path)
        .load()?;
    let account = Account::parse(raw_account)?;

    init_logging(LogConfig {
        app_name: "perch",
        log_dir: cfg.log.dir.clone(),
        emit_stderr: cfg.log.stderr,
        format: cfg.log.format,
        default_filter: cfg.log.filter.clone(),
    })
    .context("failed to initialise logging")?;

    Ok((cfg, account))
}

fn build_api(cfg: &PerchConfig, key: &str) -> Result<TwitterApi> {
    let retry = RetryPolicy {
        max_retries: cfg.api.max_retries,
        max_rate_limit_waits: cfg.api.max_rate_limit_waits,
        ..RetryPolicy::default()
    };
    let api = TwitterApi::new(&cfg.api.base_url, key.to_string())
        .with_context(|| format!("invalid api.base_url {:?}", cfg.api.base_url))?
        .with_timeout(cfg.api.timeout())
        .with_retry_policy(retry)
        .with_include_replies(cfg.api.include_replies);
    Ok(api)
}

pub async fn fetch(config_path: &Path, raw_account: &str) -> Result<()> {
    let (cfg, account) = setup(config_path, raw_account)?;
    let key = cfg.credential()?;
    let api = build_api(&cfg, key)?;

    let store = TweetStore::new(&cfg.harvest.data_dir);
    let collection = store.collection_path(&account);
    let mut fetcher = Fetcher::new(api, store)
        .with_pacer(Pacer::every(cfg.harvest.page_delay()))
        .with_window_months(cfg.harvest.window_months)
        .with_max_pages(cfg.harvest.max_pages);

    match fetcher.fetch(&account).await? {
        FetchOutcome::AlreadyComplete {
            total_persisted,
            oldest,
            cutoff,
        } => {
            println!(
                "@{account}: already complete, {total_persisted} tweets back to {oldest} (cutoff {cutoff})"
            );
        }
        FetchOutcome::Completed(report) => {
            println!(
                "@{account}: {} new, {} total in {} ({} pages, stopped: {})",
                report.new,
                report.total_persisted,
                collection.display(),
                report.pages,
                report.stop,
            );
            if report.rejected > 0 || report.malformed_pages > 0 {
                println!(
                    "  skipped {} malformed tweets and {} malformed pages",
                    report.rejected, report.malformed_pages
                );
            }
            if !report.window_covered() {
                println!("  window start {} not reached", report.cutoff);
            }
        }
    }
    Ok(())
}

pub fn analyze(config_path: &Path, raw_account: &str) -> Result<()> {
    let (cfg, account) = setup(config_path, raw_account)?;

    if let Some(font) = &cfg.analysis.chart_font {
        perch_analysis::charts::use_font(font).map_err(AnalysisError::from)?;
    }
    let analyzer = Analyzer::new(TweetStore::new(&cfg.harvest.data_dir))?
        .with_top_keywords(cfg.analysis.top_keywords)
        .with_charts(cfg.analysis.charts);
    let summary = analyzer.run(&account)?;

    println!("@{account}: analyzed {} tweets", summary.tweets);
    println!("  average sentiment: {:.3} (0 negative, 1 positive)", summary.avg_sentiment);
    println!("  average per month: {:.0}", summary.posting.avg_per_month);
    if let Some(month) = &summary.posting.most_active {
        println!("  most active month: {} ({} tweets)", month.month, month.tweets);
    }
    let top: Vec<String> = summary
        .top_keywords
        .iter()
        .take(10)
        .map(|k| format!("{}({})", k.keyword, k.count))
        .collect();
    if !top.is_empty() {
        println!("  top keywords: {}", top.join(", "));
    }
    for path in &summary.written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let missing = anyhow::Error::from(ConfigError::MissingCredential);
        assert_eq!(exit_code(&missing), EXIT_CONFIG);

        let bad_account = anyhow::Error::from(PerchError::InvalidAccount("x y".into()));
        assert_eq!(exit_code(&bad_account), EXIT_CONFIG);

        let not_found = anyhow::Error::from(HarvestError::AccountNotFound("gone".into()))
            .context("fetch failed");
        assert_eq!(exit_code(&not_found), 3);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }
}
