//! Batch scheduling and per-job execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use seiva_adapters::{AdapterResolver, ProcessPager, VersionAdapter};
use seiva_core::{
    BatchResult, FailureReport, InstitutionConfig, JobOutcome, JobStatus, OutcomeKind,
    ScrapeError, ScrapeJob, ScrapeResult, ScrapeScope,
};
use seiva_session::SessionManager;

use crate::retry::RetryPolicy;

/// Concurrency and pagination limits.
#[derive(Debug, Clone)]
pub struct OrchestratorLimits {
    /// Jobs running at once across all institutions.
    pub max_concurrent_jobs: usize,
    /// Jobs running at once against one institution's portal.
    pub per_institution_cap: usize,
    /// Default pagination safety bound; a job's scope may override it.
    pub max_pages: u32,
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            per_institution_cap: 1,
            max_pages: 50,
        }
    }
}

/// Schedules scrape jobs and collects their outcomes.
///
/// Shared behind `Arc`; per-institution gates live on the orchestrator, so
/// the politeness cap holds across overlapping batches.
pub struct Orchestrator {
    resolver: Arc<dyn AdapterResolver>,
    sessions: Arc<SessionManager>,
    limits: OrchestratorLimits,
    retry: RetryPolicy,
    global: Arc<Semaphore>,
    /// One gate per institution id, kept for the orchestrator's lifetime
    /// (bounded by the configured institution set). Evicting a gate while a
    /// job holds its permit would mint a fresh gate and break the cap.
    institution_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    job_seq: AtomicU64,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn AdapterResolver>,
        sessions: Arc<SessionManager>,
        limits: OrchestratorLimits,
        retry: RetryPolicy,
    ) -> Self {
        let global = Arc::new(Semaphore::new(limits.max_concurrent_jobs));
        Self {
            resolver,
            sessions,
            limits,
            retry,
            global,
            institution_gates: Mutex::new(HashMap::new()),
            job_seq: AtomicU64::new(0),
        }
    }

    fn institution_gate(&self, id: &str) -> Arc<Semaphore> {
        let mut gates = self
            .institution_gates
            .lock()
            .expect("institution gate lock poisoned");
        gates
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limits.per_institution_cap)))
            .clone()
    }

    fn next_job_id(&self) -> String {
        format!("job-{}", self.job_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Run one job per institution and collect every outcome.
    ///
    /// Never fails as a whole: institutions whose version has no adapter are
    /// reported as failed at submission, everything else is attempted, and
    /// each institution lands in the map exactly once.
    pub async fn run_batch(
        self: &Arc<Self>,
        institutions: Vec<InstitutionConfig>,
        scope: ScrapeScope,
        cancel: CancellationToken,
    ) -> BatchResult {
        let mut batch = BatchResult::default();
        let mut tasks = JoinSet::new();

        for institution in institutions {
            let job = ScrapeJob::new(self.next_job_id(), &institution.id, scope.clone());
            let adapter = match self.resolver.resolve(&institution.version) {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!(
                        institution = %institution.id,
                        version = %institution.version,
                        "no adapter for configured version, failing at submission"
                    );
                    batch
                        .outcomes
                        .insert(institution.id.clone(), failed_outcome(&job, &err, 0));
                    continue;
                }
            };
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move { this.run_job(job, institution, adapter, cancel).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    batch
                        .outcomes
                        .insert(outcome.institution_id.clone(), outcome);
                }
                Err(err) => error!(error = %err, "scrape task panicked"),
            }
        }
        batch
    }

    async fn run_job(
        &self,
        mut job: ScrapeJob,
        institution: InstitutionConfig,
        adapter: Arc<dyn VersionAdapter>,
        cancel: CancellationToken,
    ) -> JobOutcome {
        let _global = tokio::select! {
            permit = self.global.clone().acquire_owned() => {
                permit.expect("global semaphore closed")
            }
            () = cancel.cancelled() => {
                return failed_outcome(&job, &ScrapeError::Cancelled, job.attempts);
            }
        };
        let gate = self.institution_gate(&institution.id);
        let _local = tokio::select! {
            permit = gate.acquire_owned() => permit.expect("institution gate closed"),
            () = cancel.cancelled() => {
                return failed_outcome(&job, &ScrapeError::Cancelled, job.attempts);
            }
        };

        let max_pages = job.scope.max_pages.unwrap_or(self.limits.max_pages);
        loop {
            job.attempts += 1;
            job.transition(JobStatus::Running)
                .expect("pending or retrying job can start running");

            let attempt = self.attempt(&job, &institution, adapter.clone(), max_pages);
            let result = tokio::select! {
                result = attempt => result,
                () = cancel.cancelled() => Err(ScrapeError::Cancelled),
            };

            match result {
                Ok(result) => {
                    job.transition(JobStatus::Succeeded)
                        .expect("running job can succeed");
                    info!(
                        institution = %institution.id,
                        job = %job.id,
                        processes = result.processes.len(),
                        pages = result.pages_fetched,
                        attempts = job.attempts,
                        "job succeeded"
                    );
                    return JobOutcome {
                        job_id: job.id.clone(),
                        institution_id: institution.id.clone(),
                        result: OutcomeKind::Succeeded { result },
                    };
                }
                Err(err) if err.is_retryable() && job.attempts < self.retry.max_attempts => {
                    let delay = self.retry.backoff_delay(job.attempts, &err);
                    warn!(
                        institution = %institution.id,
                        job = %job.id,
                        attempt = job.attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure, backing off"
                    );
                    job.transition(JobStatus::Retrying)
                        .expect("running job can retry");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            job.transition(JobStatus::Failed)
                                .expect("retrying job can fail");
                            return failed_outcome(&job, &ScrapeError::Cancelled, job.attempts);
                        }
                    }
                }
                Err(err) => {
                    job.transition(JobStatus::Failed)
                        .expect("running job can fail");
                    warn!(
                        institution = %institution.id,
                        job = %job.id,
                        attempts = job.attempts,
                        kind = err.kind(),
                        error = %err,
                        "job failed"
                    );
                    return failed_outcome(&job, &err, job.attempts);
                }
            }
        }
    }

    /// One attempt: page through the listing and fetch every detail. Runs
    /// under the session manager so one mid-attempt expiry restarts the
    /// attempt against a fresh session instead of failing the job.
    async fn attempt(
        &self,
        job: &ScrapeJob,
        institution: &InstitutionConfig,
        adapter: Arc<dyn VersionAdapter>,
        max_pages: u32,
    ) -> Result<ScrapeResult, ScrapeError> {
        let filter = job.scope.filter.clone();
        let institution_id = institution.id.clone();
        self.sessions
            .run_with_reauth(adapter, institution, move |adapter, session| {
                let filter = filter.clone();
                let institution_id = institution_id.clone();
                async move {
                    let mut pager =
                        ProcessPager::new(adapter.clone(), session.clone(), filter, max_pages);
                    let mut processes = Vec::new();
                    while let Some(summary) = pager.try_next().await? {
                        processes.push(adapter.fetch_process_detail(&session, &summary.id).await?);
                    }
                    Ok(ScrapeResult {
                        institution_id,
                        processes,
                        pages_fetched: pager.pages_fetched(),
                    })
                }
                .boxed()
            })
            .await
    }
}

fn failed_outcome(job: &ScrapeJob, error: &ScrapeError, attempts: u32) -> JobOutcome {
    JobOutcome {
        job_id: job.id.clone(),
        institution_id: job.institution_id.clone(),
        result: OutcomeKind::Failed {
            failure: FailureReport::from_error(error, attempts),
        },
    }
}
