//! Two-level account/region fan-out.
//!
//! Accounts run on a bounded account pool. Each account task builds its own
//! bounded region pool, so the number of provider calls in flight never
//! exceeds `account_concurrency * region_concurrency`. Results are sent
//! back over a channel and merged on the submitting thread as they arrive;
//! workers never touch shared result state.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use cloudtally_classify::{ClassificationEngine, ClassificationStats};
use cloudtally_core::{
    Account, AccountOutcome, AccountStatus, CollectorError, CredentialScope, IssueKind,
    PermissionGap, ProviderError, ResourceRecord, ScanError, ScanIssue, ScanOptions, ScanResult,
    GLOBAL_REGION,
};

use crate::collector::{Collector, Coverage};
use crate::credentials::{CredentialBroker, RefreshableScope};
use crate::discovery::ScopeDiscovery;
use crate::guard::GlobalPassGuard;
use crate::progress::{ProgressTracker, ScanProgress};
use crate::provider::CloudProvider;

/// Drives a full inventory run across accounts and regions.
pub struct ScanOrchestrator {
    provider: Arc<dyn CloudProvider>,
    collectors: Vec<Arc<dyn Collector>>,
    options: ScanOptions,
    engine: ClassificationEngine,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl ScanOrchestrator {
    /// Create an orchestrator with no collectors registered.
    pub fn new(provider: Arc<dyn CloudProvider>, options: ScanOptions) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        let engine = ClassificationEngine::new(&options);
        Self {
            provider,
            collectors: Vec::new(),
            options,
            engine,
            progress_tx,
        }
    }

    /// Register a collector.
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Register several collectors.
    pub fn with_collectors<I>(mut self, collectors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Collector>>,
    {
        self.collectors.extend(collectors);
        self
    }

    /// Replace the classification engine (e.g. to use custom cluster markers).
    pub fn with_engine(mut self, engine: ClassificationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Discover accounts and scan every one of them.
    ///
    /// Fails only if the options are invalid, the caller identity cannot be
    /// resolved, or the account pool cannot be created. Every per-account
    /// problem is recorded in the returned result instead.
    pub fn run(&self) -> Result<ScanResult, ScanError> {
        self.options.validate().map_err(ScanError::invalid_config)?;
        let accounts = ScopeDiscovery::new(self.provider.as_ref(), &self.options).discover_accounts()?;
        info!(accounts = accounts.len(), "starting scan");
        self.scan_accounts(accounts)
    }

    /// Scan an explicit list of accounts.
    pub fn scan_accounts(&self, mut accounts: Vec<Account>) -> Result<ScanResult, ScanError> {
        self.options.validate().map_err(ScanError::invalid_config)?;

        let started_at = Utc::now();
        let clock = Instant::now();

        // Only claimed accounts are scanned, so each global pass runs once.
        let guard = GlobalPassGuard::new();
        accounts.retain(|a| {
            let first = guard.claim(&a.id);
            if !first {
                debug!(account = %a.id, "duplicate account dropped");
            }
            first
        });

        let tracker = ProgressTracker::new(self.progress_tx.clone(), accounts.len());
        let pool = build_pool(self.options.account_concurrency, accounts.len(), "cloudtally-account")
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;

        let mut result = ScanResult::empty(started_at);
        result.accounts_attempted = accounts.len();
        let mut stats = ClassificationStats::default();

        fan_out(
            Some(&pool),
            &accounts,
            |account| self.scan_account(account, &tracker),
            |scan| {
                stats.merge(&scan.batch.stats);
                result.records.extend(scan.batch.records);
                result.gaps.extend(scan.batch.gaps);
                result.issues.extend(scan.batch.issues);
                result.accounts.push(scan.outcome);
            },
        );

        result.accounts.sort_by(|a, b| a.account.id.cmp(&b.account.id));
        result.issues.sort_by(|a, b| {
            (&a.account_id, &a.region, &a.collector).cmp(&(&b.account_id, &b.region, &b.collector))
        });
        result.accounts_succeeded = result
            .accounts
            .iter()
            .filter(|o| o.status != AccountStatus::Failed)
            .count();
        result.duration = clock.elapsed();

        info!(
            attempted = result.accounts_attempted,
            succeeded = result.accounts_succeeded,
            records = result.records.len(),
            gaps = result.gaps.len(),
            skipped = stats.skipped(),
            duplicates = stats.duplicates,
            elapsed_ms = result.duration.as_millis() as u64,
            "scan finished"
        );
        Ok(result)
    }

    fn scan_account(
        &self,
        account: &Account,
        tracker: &ProgressTracker,
    ) -> AccountScan {
        tracker.account_started(&account.id);
        let mut lifecycle = Lifecycle::new(&account.id);

        let broker = CredentialBroker::new(self.provider.as_ref());
        let scope = match broker.acquire(account, &self.options.role_candidates()) {
            Ok(scope) => scope,
            Err(failure) => {
                lifecycle.advance(AccountStatus::Failed);
                tracker.account_finished(true);
                let message = failure.to_string();
                let mut batch = Batch::default();
                batch.issues.push(ScanIssue::account(
                    IssueKind::AssumeRoleFailure,
                    account.id.clone(),
                    message.clone(),
                ));
                return AccountScan {
                    outcome: AccountOutcome::failed(account.clone(), message),
                    batch,
                };
            }
        };
        lifecycle.advance(AccountStatus::CredentialsAcquired);

        let mut batch = Batch::default();
        let (regions, discovery_failure) =
            ScopeDiscovery::new(self.provider.as_ref(), &self.options).discover_regions(&scope);
        if let Some(failure) = discovery_failure {
            batch.issues.push(ScanIssue::account(
                IssueKind::RegionDiscoveryFailure,
                account.id.clone(),
                failure.to_string(),
            ));
        }
        lifecycle.advance(AccountStatus::RegionsDiscovered);
        lifecycle.advance(AccountStatus::Scanning);

        let has_global = self.collectors.iter().any(|c| c.coverage() == Coverage::Global);
        if has_global {
            batch.absorb(self.scan_pass(&broker, &scope, &account.id, GLOBAL_REGION, Coverage::Global));
        }

        let region_pool = match build_pool(self.options.region_concurrency, regions.len(), "cloudtally-region") {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(account = %account.id, error = %e, "could not build region pool, scanning regions sequentially");
                None
            }
        };

        fan_out(
            region_pool.as_ref(),
            &regions,
            |region| {
                let pass = self.scan_pass(&broker, &scope, &account.id, region, Coverage::Regional);
                tracker.region_finished(pass.records.len(), pass.gaps.len());
                pass
            },
            |pass| batch.absorb(pass),
        );

        let status = if batch.gaps.is_empty() && batch.issues.is_empty() {
            AccountStatus::Complete
        } else {
            AccountStatus::Partial
        };
        lifecycle.advance(status);
        tracker.account_finished(false);

        info!(
            account = %account.id,
            status = %status,
            regions = regions.len(),
            records = batch.records.len(),
            gaps = batch.gaps.len(),
            "account scan finished"
        );

        AccountScan {
            outcome: AccountOutcome {
                account: account.clone(),
                status,
                records: batch.records.len(),
                regions_scanned: regions.len(),
                failure: None,
            },
            batch,
        }
    }

    /// Run every collector of one coverage kind for one (account, region), then classify.
    fn scan_pass(
        &self,
        broker: &CredentialBroker<'_>,
        scope: &CredentialScope,
        account_id: &str,
        region: &str,
        coverage: Coverage,
    ) -> Batch {
        let mut session = RefreshableScope::new(broker, scope);
        let mut raw = Vec::new();
        let mut batch = Batch::default();

        for collector in self.collectors.iter().filter(|c| c.coverage() == coverage) {
            let call = self.invoke(collector.as_ref(), &mut session, account_id, region);
            raw.extend(call.records);
            batch.gaps.extend(call.gap);
            batch.issues.extend(call.issue);
        }

        let classified = self.engine.classify(raw);
        debug!(
            account = %account_id,
            region = %region,
            input = classified.stats.input,
            emitted = classified.stats.emitted,
            "region classified"
        );
        batch.records = classified.records;
        batch.stats = classified.stats;
        batch
    }

    /// Call one collector, absorbing every failure it can produce.
    fn invoke(
        &self,
        collector: &dyn Collector,
        session: &mut RefreshableScope<'_>,
        account_id: &str,
        region: &str,
    ) -> CollectorCall {
        let call = |scope: &CredentialScope| {
            panic::catch_unwind(AssertUnwindSafe(|| {
                collector.collect(scope, region, account_id, &self.options)
            }))
            .unwrap_or_else(|payload| Err(CollectorError::unexpected(panic_message(payload.as_ref()))))
        };

        let mut result = call(session.current());
        if matches!(&result, Err(e) if e.is_credentials_expired()) {
            match session.refresh_once() {
                Ok(fresh) => {
                    debug!(account = %account_id, region = %region, collector = collector.name(), "retrying with refreshed session");
                    result = call(fresh);
                }
                Err(e) => {
                    warn!(account = %account_id, region = %region, error = %e, "session refresh failed");
                }
            }
        }

        match result {
            Ok(mut output) => {
                stamp_header(&mut output.records, account_id, region);
                if let Some(gap) = &output.gap {
                    info!(account = %account_id, region = %region, action = %gap.required_action, "permission gap");
                }
                CollectorCall {
                    records: output.records,
                    gap: output.gap,
                    issue: None,
                }
            }
            Err(CollectorError::Provider(ProviderError::AccessDenied { action })) => {
                info!(account = %account_id, region = %region, action = %action, "permission gap");
                CollectorCall {
                    records: Vec::new(),
                    gap: Some(gap_for(account_id, region, action)),
                    issue: None,
                }
            }
            Err(e) => {
                error!(
                    account = %account_id,
                    region = %region,
                    collector = collector.name(),
                    error = %e,
                    "collector failed"
                );
                CollectorCall {
                    records: Vec::new(),
                    gap: Some(gap_for(account_id, region, collector.required_action())),
                    issue: Some(ScanIssue::collector(account_id, region, collector.name(), e.to_string())),
                }
            }
        }
    }
}

/// Records, gaps and issues produced by a region, an account or a run.
#[derive(Debug, Default)]
struct Batch {
    records: Vec<ResourceRecord>,
    gaps: BTreeSet<PermissionGap>,
    issues: Vec<ScanIssue>,
    stats: ClassificationStats,
}

impl Batch {
    fn absorb(&mut self, other: Batch) {
        self.records.extend(other.records);
        self.gaps.extend(other.gaps);
        self.issues.extend(other.issues);
        self.stats.merge(&other.stats);
    }
}

struct AccountScan {
    outcome: AccountOutcome,
    batch: Batch,
}

struct CollectorCall {
    records: Vec<ResourceRecord>,
    gap: Option<PermissionGap>,
    issue: Option<ScanIssue>,
}

/// Account status, advanced only along legal transitions.
struct Lifecycle<'a> {
    account_id: &'a str,
    status: AccountStatus,
}

impl<'a> Lifecycle<'a> {
    fn new(account_id: &'a str) -> Self {
        Self {
            account_id,
            status: AccountStatus::Pending,
        }
    }

    fn advance(&mut self, next: AccountStatus) {
        debug_assert!(
            self.status.can_advance_to(next),
            "illegal account transition {} -> {}",
            self.status,
            next
        );
        debug!(account = %self.account_id, from = %self.status, to = %next, "account status");
        self.status = next;
    }
}

fn build_pool(limit: usize, work: usize, name: &'static str) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(limit.min(work).max(1))
        .thread_name(move |i| format!("{name}-{i}"))
        .build()
}

/// Run `task` for every item on `pool` and feed results to `merge` in arrival order.
///
/// `merge` runs on the calling thread. Without a pool the items run
/// sequentially on the calling thread.
fn fan_out<T, R, F, M>(pool: Option<&ThreadPool>, items: &[T], task: F, mut merge: M)
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
    M: FnMut(R),
{
    let Some(pool) = pool else {
        items.iter().map(&task).for_each(merge);
        return;
    };

    let (tx, rx) = mpsc::channel();
    let task = &task;
    pool.in_place_scope(|s| {
        for item in items {
            let tx = tx.clone();
            s.spawn(move |_| {
                let _ = tx.send(task(item));
            });
        }
        drop(tx);
        for result in rx {
            merge(result);
        }
    });
}

/// Fill header fields a collector left empty from the call context.
fn stamp_header(records: &mut [ResourceRecord], account_id: &str, region: &str) {
    for record in records {
        if record.header.account_id.is_empty() {
            record.header.account_id = account_id.to_string();
        }
        if record.header.region.is_empty() {
            record.header.region = region.to_string();
        }
    }
}

fn gap_for(account_id: &str, region: &str, action: impl Into<String>) -> PermissionGap {
    if region == GLOBAL_REGION {
        PermissionGap::global(account_id, action)
    } else {
        PermissionGap::regional(account_id, region, action)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("collector panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("collector panicked: {s}")
    } else {
        "collector panicked".to_string()
    }
}
