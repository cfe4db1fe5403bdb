//! # seiva-adapters
//!
//! Version adapters for the incompatible SEI families, plus the registry
//! that maps a configured version to the right adapter.
//!
//! Each family module (v2, v4, v5) owns all knowledge of that family's
//! markup, login flow, and pagination quirks. The rest of the system never
//! branches on version: it sees the [`VersionAdapter`] contract and the
//! canonical types from `seiva-core`. Minor-version differences within a
//! family are narrow overrides on a family dialect trait, not new adapter
//! implementations.
//!
//! Pagination is exposed uniformly through [`ProcessPager`], which turns the
//! per-family cursor mechanics (page numbers in v2, cursor tokens in v4/v5)
//! into one lazy, finite, restartable sequence.

pub mod registry;
pub mod v2;
pub mod v4;
pub mod v5;

pub(crate) mod html;
pub mod http;

pub use registry::AdapterRegistry;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use seiva_core::{
    Credentials, InstitutionConfig, Process, ProcessFilter, ProcessSummary, ScrapeError,
    SeiVersion, Session,
};

// ── Pagination ─────────────────────────────────────────────────────

/// Uniform pagination position across families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// v2: 1-based listing page number.
    PageNumber(u32),
    /// v4/v5: opaque cursor token carried between pages.
    Token(String),
}

/// One page of a portal listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPage {
    pub summaries: Vec<ProcessSummary>,
    /// Cursor for the next page; `None` when the portal reports no more.
    pub next: Option<PageCursor>,
}

// ── Document content ───────────────────────────────────────────────

/// Streamed document bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ScrapeError>> + Send>>;

/// Lazily streamed content of one document. Large documents are never
/// buffered whole unless the caller asks for it via [`DocumentContent::collect`].
pub struct DocumentContent {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    stream: ByteStream,
}

impl DocumentContent {
    #[must_use]
    pub fn new(
        content_type: Option<String>,
        content_length: Option<u64>,
        stream: ByteStream,
    ) -> Self {
        Self {
            content_type,
            content_length,
            stream,
        }
    }

    /// Consume into the underlying byte stream.
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Buffer the whole body. Convenience for small documents and tests.
    ///
    /// # Errors
    ///
    /// Propagates the first stream error.
    pub async fn collect(self) -> Result<Bytes, ScrapeError> {
        use futures::TryStreamExt;
        let chunks: Vec<Bytes> = self.stream.try_collect().await?;
        Ok(chunks.concat().into())
    }
}

impl std::fmt::Debug for DocumentContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentContent")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

// ── Contract ───────────────────────────────────────────────────────

/// The capability set every SEI family implements.
///
/// Adapters are stateless and shared: all per-deployment state lives in the
/// [`Session`], which adapters treat as a read-only token for the duration
/// of one call. Authenticated fetches map the family-specific
/// session-expired marker (redirect to login, known expiry text) to
/// [`ScrapeError::SessionExpired`] so the session manager can intercept it.
#[async_trait]
pub trait VersionAdapter: Send + Sync {
    /// The (family, minor) pair this adapter speaks.
    fn version(&self) -> SeiVersion;

    /// Drive the family-specific login flow and return a live session.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Auth`] — the portal rejected the credentials
    /// - [`ScrapeError::Structure`] — the login page no longer matches the
    ///   expected markup (e.g. the hidden token field is absent)
    /// - [`ScrapeError::Transient`] — unreachable, timed out, rate limited
    async fn authenticate(
        &self,
        institution: &InstitutionConfig,
        credentials: &Credentials,
    ) -> Result<Session, ScrapeError>;

    /// Fetch one listing page at `cursor` (`None` = first page).
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Structure`] on markup drift, [`ScrapeError::SessionExpired`]
    /// when the portal bounced the request to login, transport errors as
    /// [`ScrapeError::Transient`].
    async fn fetch_page(
        &self,
        session: &Session,
        filter: &ProcessFilter,
        cursor: Option<PageCursor>,
    ) -> Result<ProcessPage, ScrapeError>;

    /// Fetch and parse the full movement/document listing for one process.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::NotFound`] when the process does not exist,
    /// [`ScrapeError::Structure`] on markup drift.
    async fn fetch_process_detail(
        &self,
        session: &Session,
        process_id: &str,
    ) -> Result<Process, ScrapeError>;

    /// Stream the bytes behind a document's `content_ref`.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Access`] when authenticated but forbidden.
    async fn fetch_document_content(
        &self,
        session: &Session,
        content_ref: &str,
    ) -> Result<DocumentContent, ScrapeError>;

    /// Best-effort logout. Callers log failures; a failed logout never
    /// fails a job.
    ///
    /// # Errors
    ///
    /// Transport failures as [`ScrapeError::Transient`].
    async fn logout(&self, session: &Session) -> Result<(), ScrapeError>;
}

impl std::fmt::Debug for dyn VersionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionAdapter")
            .field("version", &self.version())
            .finish()
    }
}

/// Resolve a configured version to an adapter. Implemented by
/// [`AdapterRegistry`]; test suites substitute fakes.
pub trait AdapterResolver: Send + Sync {
    /// # Errors
    ///
    /// [`ScrapeError::UnsupportedVersion`] for unknown (family, minor)
    /// pairs. Performs no I/O.
    fn resolve(&self, version: &SeiVersion) -> Result<Arc<dyn VersionAdapter>, ScrapeError>;
}

// ── Pager ──────────────────────────────────────────────────────────

/// Lazy iteration over a portal listing.
///
/// Each `ProcessPager` restarts pagination from the first page; against an
/// unchanged portal it yields the same ids in the same order on every run.
/// The sequence is finite: it ends when the portal reports no next page or
/// when `max_pages` is hit (a safety valve against drift-induced infinite
/// pagination, logged as a warning rather than an error).
pub struct ProcessPager {
    adapter: Arc<dyn VersionAdapter>,
    session: Session,
    filter: ProcessFilter,
    max_pages: u32,
    pages_fetched: u32,
    cursor: Option<PageCursor>,
    buffer: VecDeque<ProcessSummary>,
    exhausted: bool,
}

impl ProcessPager {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn VersionAdapter>,
        session: Session,
        filter: ProcessFilter,
        max_pages: u32,
    ) -> Self {
        Self {
            adapter,
            session,
            filter,
            max_pages,
            pages_fetched: 0,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next summary, fetching further pages on demand.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's page-fetch error; the pager is unusable
    /// afterwards and a fresh one must be created.
    pub async fn try_next(&mut self) -> Result<Option<ProcessSummary>, ScrapeError> {
        loop {
            if let Some(summary) = self.buffer.pop_front() {
                return Ok(Some(summary));
            }
            if self.exhausted {
                return Ok(None);
            }
            if self.pages_fetched >= self.max_pages {
                tracing::warn!(
                    institution = %self.session.institution_id,
                    max_pages = self.max_pages,
                    "pagination safety bound reached; terminating listing"
                );
                self.exhausted = true;
                return Ok(None);
            }

            let page = self
                .adapter
                .fetch_page(&self.session, &self.filter, self.cursor.take())
                .await?;
            self.pages_fetched += 1;
            self.cursor = page.next;
            if self.cursor.is_none() {
                self.exhausted = true;
            }
            self.buffer.extend(page.summaries);
        }
    }

    /// Drain the remainder of the sequence.
    ///
    /// # Errors
    ///
    /// Propagates the first page-fetch error.
    pub async fn collect_remaining(&mut self) -> Result<Vec<ProcessSummary>, ScrapeError> {
        let mut out = Vec::new();
        while let Some(summary) = self.try_next().await? {
            out.push(summary);
        }
        Ok(out)
    }

    /// Listing pages fetched so far.
    #[must_use]
    pub const fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}
