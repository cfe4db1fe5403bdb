//! Canonical process, document, and movement records.
//!
//! These are the values handed to the persistence collaborator: plain
//! structured data with no scraper-internal state attached. A later scrape
//! yields a new `Process` value, never a mutation of an old one.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One row of a portal listing page. Enough to decide whether the full
/// detail fetch is worth doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessSummary {
    /// Portal process number (e.g. `0001234-56.2024.4.01.8000`).
    pub id: String,
    /// Organizational unit currently holding the process.
    pub unit: String,
    /// Portal-reported status label.
    pub status: String,
    /// Last update as reported by the listing, when present.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A government administrative process with its full movement history and
/// document listing. Immutable once returned by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Process {
    pub id: String,
    /// Unit that opened the process.
    pub unit: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Chronological, portal-reported order. Never reordered after creation.
    pub movements: Vec<Movement>,
    pub documents: Vec<Document>,
}

/// A recorded transfer of a process between organizational units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Movement {
    /// Position within the process history, starting at 1.
    pub sequence: u32,
    pub moved_at: Option<DateTime<Utc>>,
    pub from_unit: String,
    pub to_unit: String,
    pub description: String,
}

/// A document attached to a process. Content is fetched lazily via
/// `content_ref`; this record never holds the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Document {
    /// Portal document number.
    pub id: String,
    /// Id of the owning process. Always a valid parent reference.
    pub process_id: String,
    /// Portal-reported document type label (e.g. `Despacho`, `Ofício`).
    pub doc_type: String,
    pub generated_at: Option<DateTime<Utc>>,
    /// Version-specific locator an adapter can turn into a byte stream.
    pub content_ref: String,
}
