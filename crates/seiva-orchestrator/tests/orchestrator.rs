//! Batch execution: outcome isolation, retry behavior, cancellation, and
//! the concurrency limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use seiva_adapters::{
    AdapterResolver, DocumentContent, PageCursor, ProcessPage, VersionAdapter,
};
use seiva_core::{
    CredentialRef, Credentials, InstitutionConfig, Process, ProcessFilter, ProcessSummary,
    ScrapeError, ScrapeScope, SeiVersion, Session, VersionFamily,
};
use seiva_orchestrator::{Orchestrator, OrchestratorLimits, RetryPolicy};
use seiva_session::{CredentialResolver, SessionManager, SessionOptions};

enum Behavior {
    Ok,
    /// First N listing fetches fail transiently, then succeed.
    FailFirst(u32),
    AlwaysTransient,
    /// Listing stalls long enough for cancellation to land first.
    Stall,
}

/// High-water mark of concurrent listing fetches; shareable across adapters
/// to gauge process-wide concurrency.
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(active, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockAdapter {
    version: SeiVersion,
    behavior: Behavior,
    fetches: AtomicU32,
    gauge: Arc<Gauge>,
    /// Time each listing fetch holds the portal, for concurrency gauging.
    hold: Duration,
}

impl MockAdapter {
    fn new(version: SeiVersion, behavior: Behavior) -> Arc<Self> {
        Self::with_gauge(version, behavior, Arc::new(Gauge::default()))
    }

    fn with_gauge(version: SeiVersion, behavior: Behavior, gauge: Arc<Gauge>) -> Arc<Self> {
        Arc::new(Self {
            version,
            behavior,
            fetches: AtomicU32::new(0),
            gauge,
            hold: Duration::from_millis(20),
        })
    }
}

#[async_trait]
impl VersionAdapter for MockAdapter {
    fn version(&self) -> SeiVersion {
        self.version
    }

    async fn authenticate(
        &self,
        institution: &InstitutionConfig,
        credentials: &Credentials,
    ) -> Result<Session, ScrapeError> {
        let now = Utc::now();
        Ok(Session {
            institution_id: institution.id.clone(),
            base_url: institution.base_url.clone(),
            account: credentials.username.clone(),
            cookies: Vec::new(),
            tokens: HashMap::new(),
            established_at: now,
            expires_at: now + chrono::Duration::minutes(25),
        })
    }

    async fn fetch_page(
        &self,
        session: &Session,
        _filter: &ProcessFilter,
        _cursor: Option<PageCursor>,
    ) -> Result<ProcessPage, ScrapeError> {
        let call = self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();
        tokio::time::sleep(self.hold).await;
        self.gauge.exit();

        match self.behavior {
            Behavior::AlwaysTransient => Err(ScrapeError::transient("portal timed out")),
            Behavior::FailFirst(n) if call < n => {
                Err(ScrapeError::transient("portal timed out"))
            }
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(ScrapeError::transient("unreachable"))
            }
            _ => Ok(ProcessPage {
                summaries: vec![ProcessSummary {
                    id: format!("{}-0001", session.institution_id),
                    unit: "SEDE".into(),
                    status: "open".into(),
                    updated_at: None,
                }],
                next: None,
            }),
        }
    }

    async fn fetch_process_detail(
        &self,
        _session: &Session,
        process_id: &str,
    ) -> Result<Process, ScrapeError> {
        Ok(Process {
            id: process_id.to_string(),
            unit: "SEDE".into(),
            status: "open".into(),
            created_at: None,
            movements: Vec::new(),
            documents: Vec::new(),
        })
    }

    async fn fetch_document_content(
        &self,
        _session: &Session,
        _content_ref: &str,
    ) -> Result<DocumentContent, ScrapeError> {
        unimplemented!("batch tests never fetch documents")
    }

    async fn logout(&self, _session: &Session) -> Result<(), ScrapeError> {
        Ok(())
    }
}

struct MapResolver(HashMap<SeiVersion, Arc<dyn VersionAdapter>>);

impl AdapterResolver for MapResolver {
    fn resolve(&self, version: &SeiVersion) -> Result<Arc<dyn VersionAdapter>, ScrapeError> {
        self.0
            .get(version)
            .cloned()
            .ok_or(ScrapeError::UnsupportedVersion {
                family: version.family,
                minor: version.minor,
            })
    }
}

struct StaticResolver;

impl CredentialResolver for StaticResolver {
    fn resolve(&self, reference: &CredentialRef) -> Result<Credentials, ScrapeError> {
        Ok(Credentials {
            username: reference.account.clone(),
            password: "hunter2".into(),
        })
    }
}

fn institution(id: &str, version: SeiVersion) -> InstitutionConfig {
    InstitutionConfig {
        id: id.to_string(),
        name: id.to_uppercase(),
        base_url: format!("https://sei.{id}.test"),
        version,
        credentials: CredentialRef {
            account: "scraper.svc".into(),
            secret_ref: format!("{}_PASSWORD", id.to_uppercase()),
        },
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    }
}

fn orchestrator(
    adapters: Vec<Arc<dyn VersionAdapter>>,
    limits: OrchestratorLimits,
    retry: RetryPolicy,
) -> Arc<Orchestrator> {
    let resolver = MapResolver(adapters.into_iter().map(|a| (a.version(), a)).collect());
    let sessions = Arc::new(SessionManager::new(
        Arc::new(StaticResolver),
        SessionOptions::default(),
    ));
    Arc::new(Orchestrator::new(
        Arc::new(resolver),
        sessions,
        limits,
        retry,
    ))
}

const V42: SeiVersion = SeiVersion::new(VersionFamily::V4, 2);
const V50: SeiVersion = SeiVersion::new(VersionFamily::V5, 0);
const V25: SeiVersion = SeiVersion::new(VersionFamily::V2, 5);

#[tokio::test]
async fn one_institutions_failure_never_discards_anothers_data() {
    let good = MockAdapter::new(V42, Behavior::Ok);
    let bad = MockAdapter::new(V50, Behavior::AlwaysTransient);
    let orch = orchestrator(
        vec![good, bad.clone()],
        OrchestratorLimits::default(),
        fast_retry(3),
    );

    let batch = orch
        .run_batch(
            vec![institution("trf1", V42), institution("ufmg", V50)],
            ScrapeScope::default(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(batch.outcomes.len(), 2);
    assert!(!batch.all_succeeded());

    let ok = batch.outcomes["trf1"].success().unwrap();
    assert_eq!(ok.processes.len(), 1);
    assert_eq!(ok.processes[0].id, "trf1-0001");
    assert_eq!(ok.pages_fetched, 1);

    let failure = batch.outcomes["ufmg"].failure().unwrap();
    assert_eq!(failure.kind, "transient_error");
    assert!(failure.retryable);
    assert_eq!(failure.attempts, 3);
    assert_eq!(bad.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transient_failure_is_retried_to_success() {
    let flaky = MockAdapter::new(V42, Behavior::FailFirst(1));
    let orch = orchestrator(
        vec![flaky.clone()],
        OrchestratorLimits::default(),
        fast_retry(4),
    );

    let batch = orch
        .run_batch(
            vec![institution("trf1", V42)],
            ScrapeScope::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(batch.all_succeeded());
    assert_eq!(flaky.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn terminal_errors_are_not_retried() {
    struct DriftedAdapter;

    #[async_trait]
    impl VersionAdapter for DriftedAdapter {
        fn version(&self) -> SeiVersion {
            V42
        }
        async fn authenticate(
            &self,
            institution: &InstitutionConfig,
            credentials: &Credentials,
        ) -> Result<Session, ScrapeError> {
            let now = Utc::now();
            Ok(Session {
                institution_id: institution.id.clone(),
                base_url: institution.base_url.clone(),
                account: credentials.username.clone(),
                cookies: Vec::new(),
                tokens: HashMap::new(),
                established_at: now,
                expires_at: now + chrono::Duration::minutes(25),
            })
        }
        async fn fetch_page(
            &self,
            _session: &Session,
            _filter: &ProcessFilter,
            _cursor: Option<PageCursor>,
        ) -> Result<ProcessPage, ScrapeError> {
            Err(ScrapeError::structure("trf1", "listing", "table missing"))
        }
        async fn fetch_process_detail(
            &self,
            _session: &Session,
            _process_id: &str,
        ) -> Result<Process, ScrapeError> {
            unimplemented!()
        }
        async fn fetch_document_content(
            &self,
            _session: &Session,
            _content_ref: &str,
        ) -> Result<DocumentContent, ScrapeError> {
            unimplemented!()
        }
        async fn logout(&self, _session: &Session) -> Result<(), ScrapeError> {
            Ok(())
        }
    }

    let orch = orchestrator(
        vec![Arc::new(DriftedAdapter)],
        OrchestratorLimits::default(),
        fast_retry(4),
    );
    let batch = orch
        .run_batch(
            vec![institution("trf1", V42)],
            ScrapeScope::default(),
            CancellationToken::new(),
        )
        .await;

    let failure = batch.outcomes["trf1"].failure().unwrap();
    assert_eq!(failure.kind, "structure_error");
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn unsupported_version_fails_at_submission_without_blocking_the_batch() {
    let good = MockAdapter::new(V42, Behavior::Ok);
    let orch = orchestrator(vec![good], OrchestratorLimits::default(), fast_retry(4));

    let batch = orch
        .run_batch(
            vec![institution("trf1", V42), institution("antigo", V25)],
            ScrapeScope::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(batch.outcomes["trf1"].is_success());
    let failure = batch.outcomes["antigo"].failure().unwrap();
    assert_eq!(failure.kind, "unsupported_version");
    assert_eq!(failure.attempts, 0);
}

#[tokio::test]
async fn cancellation_is_prompt_and_leaves_siblings_untouched() {
    let fast = MockAdapter::new(V42, Behavior::Ok);
    let stalled = MockAdapter::new(V50, Behavior::Stall);
    let orch = orchestrator(
        vec![fast, stalled],
        OrchestratorLimits::default(),
        fast_retry(4),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let batch = orch
        .run_batch(
            vec![institution("trf1", V42), institution("ufmg", V50)],
            ScrapeScope::default(),
            cancel,
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(batch.outcomes["trf1"].is_success());
    assert_eq!(batch.outcomes["ufmg"].failure().unwrap().kind, "cancelled");
}

#[tokio::test]
async fn scope_max_pages_overrides_the_configured_bound() {
    struct EndlessAdapter {
        fetches: AtomicU32,
    }

    #[async_trait]
    impl VersionAdapter for EndlessAdapter {
        fn version(&self) -> SeiVersion {
            V42
        }
        async fn authenticate(
            &self,
            institution: &InstitutionConfig,
            credentials: &Credentials,
        ) -> Result<Session, ScrapeError> {
            let now = Utc::now();
            Ok(Session {
                institution_id: institution.id.clone(),
                base_url: institution.base_url.clone(),
                account: credentials.username.clone(),
                cookies: Vec::new(),
                tokens: HashMap::new(),
                established_at: now,
                expires_at: now + chrono::Duration::minutes(25),
            })
        }
        async fn fetch_page(
            &self,
            _session: &Session,
            _filter: &ProcessFilter,
            _cursor: Option<PageCursor>,
        ) -> Result<ProcessPage, ScrapeError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessPage {
                summaries: vec![ProcessSummary {
                    id: format!("{n:04}"),
                    unit: "SEDE".into(),
                    status: "open".into(),
                    updated_at: None,
                }],
                next: Some(PageCursor::Token(format!("c{n}"))),
            })
        }
        async fn fetch_process_detail(
            &self,
            _session: &Session,
            process_id: &str,
        ) -> Result<Process, ScrapeError> {
            Ok(Process {
                id: process_id.to_string(),
                unit: "SEDE".into(),
                status: "open".into(),
                created_at: None,
                movements: Vec::new(),
                documents: Vec::new(),
            })
        }
        async fn fetch_document_content(
            &self,
            _session: &Session,
            _content_ref: &str,
        ) -> Result<DocumentContent, ScrapeError> {
            unimplemented!()
        }
        async fn logout(&self, _session: &Session) -> Result<(), ScrapeError> {
            Ok(())
        }
    }

    let endless = Arc::new(EndlessAdapter {
        fetches: AtomicU32::new(0),
    });
    let orch = orchestrator(
        vec![endless.clone()],
        OrchestratorLimits::default(),
        fast_retry(4),
    );

    let scope = ScrapeScope {
        filter: ProcessFilter::default(),
        max_pages: Some(2),
    };
    let batch = orch
        .run_batch(
            vec![institution("trf1", V42)],
            scope,
            CancellationToken::new(),
        )
        .await;

    let ok = batch.outcomes["trf1"].success().unwrap();
    assert_eq!(ok.pages_fetched, 2);
    assert_eq!(ok.processes.len(), 2);
    assert_eq!(endless.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn per_institution_cap_holds_across_overlapping_batches() {
    let adapter = MockAdapter::new(V42, Behavior::Ok);
    let orch = orchestrator(
        vec![adapter.clone()],
        OrchestratorLimits {
            max_concurrent_jobs: 8,
            per_institution_cap: 1,
            max_pages: 50,
        },
        fast_retry(4),
    );

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move {
            orch.run_batch(
                vec![institution("trf1", V42)],
                ScrapeScope::default(),
                CancellationToken::new(),
            )
            .await
        })
    };
    let second = {
        let orch = orch.clone();
        tokio::spawn(async move {
            orch.run_batch(
                vec![institution("trf1", V42)],
                ScrapeScope::default(),
                CancellationToken::new(),
            )
            .await
        })
    };
    assert!(first.await.unwrap().all_succeeded());
    assert!(second.await.unwrap().all_succeeded());
    assert_eq!(adapter.gauge.max.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn global_limit_bounds_concurrency_across_institutions() {
    let gauge = Arc::new(Gauge::default());
    let a = MockAdapter::with_gauge(V42, Behavior::Ok, gauge.clone());
    let b = MockAdapter::with_gauge(V50, Behavior::Ok, gauge.clone());
    let c = MockAdapter::with_gauge(V25, Behavior::Ok, gauge.clone());
    let orch = orchestrator(
        vec![a, b, c],
        OrchestratorLimits {
            max_concurrent_jobs: 1,
            per_institution_cap: 1,
            max_pages: 50,
        },
        fast_retry(4),
    );

    let batch = orch
        .run_batch(
            vec![
                institution("trf1", V42),
                institution("ufmg", V50),
                institution("antigo", V25),
            ],
            ScrapeScope::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(batch.all_succeeded());
    assert_eq!(gauge.max.load(Ordering::SeqCst), 1);
}
