//! cloudtally - estimate the scope of a multi-account cloud estate.
//!
//! Usage:
//!   cloudtally scan --estate FILE       Scan every account and region
//!   cloudtally accounts --estate FILE   List the accounts a scan would cover
//!   cloudtally regions --estate FILE    List the regions of one account
//!   cloudtally --help                   Show help

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cloudtally_core::ScanOptions;
use cloudtally_report::{ErrorAggregator, FileSink, ReportConfig, ResultSink, RunSummary, StatusReport};
use cloudtally_scan::{
    snapshot_collectors, CredentialBroker, EstateSnapshot, ScanOrchestrator, ScanProgress,
    ScopeDiscovery, SnapshotProvider,
};

const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Parser)]
#[command(
    name = "cloudtally",
    version,
    about = "Inventory a multi-account cloud estate for sizing estimates",
    long_about = "cloudtally discovers every account and enabled region of an estate, \
                  lists compute, storage and function resources in parallel, and \
                  reports a classified inventory together with the permissions \
                  the scanning identity was missing."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan every account and region and write the inventory
    Scan(ScanArgs),

    /// List the accounts a scan would cover
    Accounts {
        /// Estate snapshot (JSON)
        #[arg(long)]
        estate: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the regions that would be scanned for one account
    Regions {
        /// Estate snapshot (JSON)
        #[arg(long)]
        estate: PathBuf,

        /// Account to inspect (defaults to the caller's account)
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Estate snapshot (JSON)
    #[arg(long)]
    estate: PathBuf,

    /// Scan options file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only scan these accounts (comma separated)
    #[arg(long, value_delimiter = ',')]
    accounts: Vec<String>,

    /// Only scan these regions (comma separated)
    #[arg(long, value_delimiter = ',')]
    regions: Vec<String>,

    /// Count stopped instances
    #[arg(long)]
    include_stopped: bool,

    /// Count scaling-group members individually instead of one unit per group
    #[arg(long)]
    count_group_members: bool,

    /// Count capacity owned by managed container clusters
    #[arg(long)]
    include_cluster_groups: bool,

    /// Role assumed in member accounts
    #[arg(long)]
    role_name: Option<String>,

    /// Role tried when the primary role fails (repeatable)
    #[arg(long = "fallback-role")]
    fallback_roles: Vec<String>,

    /// Accounts scanned concurrently
    #[arg(long)]
    account_concurrency: Option<usize>,

    /// Regions scanned concurrently per account
    #[arg(long)]
    region_concurrency: Option<usize>,

    /// Directory for inventory and issue reports
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Largest account count whose status is printed inline
    #[arg(long, default_value = "10")]
    issue_threshold: usize,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl ScanArgs {
    /// Scan options from the config file (if any) with flags applied on top.
    fn scan_options(&self) -> Result<ScanOptions> {
        let mut options = match &self.config {
            Some(path) => load_options(path)?,
            None => ScanOptions::default(),
        };

        options.include_stopped |= self.include_stopped;
        options.count_group_members_individually |= self.count_group_members;
        options.include_cluster_managed_groups |= self.include_cluster_groups;
        if !self.accounts.is_empty() {
            options.target_accounts = Some(self.accounts.clone());
        }
        if !self.regions.is_empty() {
            options.target_regions = Some(self.regions.clone());
        }
        if let Some(role) = &self.role_name {
            options.assume_role_name = role.clone();
        }
        if !self.fallback_roles.is_empty() {
            options.fallback_role_names = self.fallback_roles.clone();
        }
        if let Some(n) = self.account_concurrency {
            options.account_concurrency = n;
        }
        if let Some(n) = self.region_concurrency {
            options.region_concurrency = n;
        }

        options.validate().map_err(|e| eyre!(e))?;
        Ok(options)
    }
}

fn load_options(path: &Path) -> Result<ScanOptions> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid options file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan(args) => run_scan(args).await,
        Command::Accounts { estate, json } => run_accounts(&estate, json),
        Command::Regions { estate, account } => run_regions(&estate, account),
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "cloudtally=info",
        1 => "cloudtally=debug",
        _ => "cloudtally=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_estate(path: &Path) -> Result<Arc<EstateSnapshot>> {
    let estate = EstateSnapshot::load(path).context("Failed to load estate snapshot")?;
    debug!(path = %path.display(), accounts = estate.accounts.len(), "loaded estate snapshot");
    Ok(Arc::new(estate))
}

/// Run a full scan and write reports.
async fn run_scan(args: ScanArgs) -> Result<()> {
    let options = args.scan_options().context("Invalid scan options")?;
    let report_config = ReportConfig::builder()
        .output_dir(args.output_dir.clone())
        .inline_issue_threshold(args.issue_threshold)
        .build()
        .context("Invalid report options")?;

    let estate = load_estate(&args.estate)?;
    let provider = Arc::new(SnapshotProvider::new(Arc::clone(&estate), options.retry));
    let orchestrator =
        ScanOrchestrator::new(provider, options).with_collectors(snapshot_collectors(&estate));

    let progress_rx = orchestrator.subscribe();
    let cancel = CancellationToken::new();
    let progress_task = tokio::spawn(show_progress(progress_rx, cancel.clone()));

    // The orchestrator blocks on its own rayon pools
    let result = tokio::task::spawn_blocking(move || orchestrator.run())
        .await
        .context("Scan task failed")?;

    cancel.cancel();
    let _ = progress_task.await;
    let result = result.context("Scan failed")?;

    let aggregator = ErrorAggregator::new(report_config.inline_issue_threshold);
    let summary = aggregator.summarize(&result);
    let sink = ResultSink::new(FileSink::new(report_config.clone())?);
    let written = sink
        .publish(&result, &summary)
        .context("Failed to write inventory")?;
    let status = aggregator
        .report(&result, &report_config.issues_path())
        .context("Failed to write issue report")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &status, &written);
    }

    info!(
        accounts = summary.accounts_attempted,
        partial = summary.partial,
        failed = summary.failed,
        "scan complete"
    );

    Ok(())
}

/// Draw a one-line progress indicator on stderr until cancelled.
async fn show_progress(mut rx: broadcast::Receiver<ScanProgress>, cancel: CancellationToken) {
    if !std::io::stderr().is_terminal() {
        cancel.cancelled().await;
        return;
    }

    let mut latest = ScanProgress::default();
    let mut frame = 0usize;
    let mut tick = tokio::time::interval(Duration::from_millis(120));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            update = rx.recv() => match update {
                Ok(progress) => latest = progress,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tick.tick() => {
                frame = frame.wrapping_add(1);
                eprint!(
                    "\r{} {}/{} accounts, {} regions, {} records, {} gaps  ",
                    SPINNER[frame % SPINNER.len()],
                    latest.accounts_done,
                    latest.accounts_total,
                    latest.regions_scanned,
                    latest.records,
                    latest.gaps,
                );
            }
        }
    }

    eprint!("\r{}\r", " ".repeat(72));
}

/// List the accounts a scan would cover.
fn run_accounts(estate_path: &Path, json: bool) -> Result<()> {
    let estate = load_estate(estate_path)?;
    let options = ScanOptions::default();
    let provider = SnapshotProvider::new(Arc::clone(&estate), options.retry);
    let accounts = ScopeDiscovery::new(&provider, &options)
        .discover_accounts()
        .context("Account discovery failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    println!();
    println!(" {:<14} {:<30} {}", "ACCOUNT", "NAME", "ACCESS");
    println!("{}", "─".repeat(60));
    for account in &accounts {
        let access = if account.is_local_scope { "caller" } else { "assume role" };
        println!(" {:<14} {:<30} {}", account.id, truncate(&account.display_name, 30), access);
    }
    println!();
    println!(" {} account(s)", accounts.len());

    Ok(())
}

/// List the regions of one account.
fn run_regions(estate_path: &Path, account_id: Option<String>) -> Result<()> {
    let estate = load_estate(estate_path)?;
    let options = ScanOptions::default();
    let provider = SnapshotProvider::new(Arc::clone(&estate), options.retry);
    let discovery = ScopeDiscovery::new(&provider, &options);

    let accounts = discovery.discover_accounts().context("Account discovery failed")?;
    let account = match &account_id {
        Some(id) => accounts
            .into_iter()
            .find(|a| &a.id == id)
            .ok_or_else(|| eyre!("Account {id} is not part of the estate"))?,
        None => accounts
            .into_iter()
            .find(|a| a.is_local_scope)
            .ok_or_else(|| eyre!("Caller account is not part of the estate"))?,
    };

    let scope = CredentialBroker::new(&provider)
        .acquire(&account, &options.role_candidates())
        .with_context(|| format!("No credentials for {account}"))?;
    let (regions, failure) = discovery.discover_regions(&scope);

    println!();
    println!(" Regions for {account}");
    println!("{}", "─".repeat(60));
    for region in &regions {
        println!("   {region}");
    }
    if let Some(failure) = failure {
        println!();
        println!(" Region discovery failed ({}); fallback list shown", failure.source);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, status: &StatusReport, written: &[PathBuf]) {
    let total = &summary.inventory.total;

    println!();
    println!("{}", "─".repeat(60));
    println!(
        " Estimated scope - {} account(s): {} full, {} partial, {} failed",
        summary.accounts_attempted, summary.fully_scanned, summary.partial, summary.failed
    );
    println!("{}", "─".repeat(60));
    println!(" Compute instances:   {}", total.instances);
    println!(" Scaling groups:      {} (one unit each)", total.groups);
    println!(" Compute units:       {}", total.compute_units);
    println!();
    println!(" Object buckets:      {} ({})", total.buckets, format_gb(total.bucket_gb));
    println!(" Block volumes:       {} ({})", total.volumes, format_gb(total.volume_gb as f64));
    println!(" Functions:           {}", total.functions);
    println!();
    println!(" Scanned in {:.2}s", summary.duration_secs);
    println!("{}", "─".repeat(60));

    match status {
        StatusReport::Inline(lines) => {
            println!();
            for line in lines {
                println!(" {line}");
            }
        }
        StatusReport::Written {
            path,
            accounts_with_problems,
        } => {
            println!();
            println!(
                " {} account(s) need attention, see {}",
                accounts_with_problems,
                path.display()
            );
        }
    }

    println!();
    for path in written {
        println!(" Wrote {}", path.display());
    }
}

fn format_gb(gb: f64) -> String {
    humansize::format_size((gb * GIB) as u64, humansize::BINARY)
}

/// Truncate a string to fit within max_len characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
