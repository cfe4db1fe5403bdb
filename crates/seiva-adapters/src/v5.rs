//! SEI v5 next-generation family adapter (minor 5.0).
//!
//! v5 portals dropped the `controlador.php` action dispatch for clean
//! routes, put the CSRF token in a `<meta>` tag instead of a hidden input,
//! and annotate listing/detail markup with `data-*` attributes, which makes
//! extraction less positional than in v2/v4. Pagination is cursor-based via
//! `nav[data-next-cursor]`. Only one minor exists so far, so there is no
//! dialect trait yet.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use scraper::Html;

use seiva_core::{
    Credentials, DEFAULT_TTL_MINUTES, Document, InstitutionConfig, Movement, Process,
    ProcessFilter, ProcessSummary, ScrapeError, SeiVersion, Session, VersionFamily,
};

use crate::html;
use crate::http;
use crate::{DocumentContent, PageCursor, ProcessPage, VersionAdapter};

const LOGIN_PATH: &str = "/sei/login";
const LIST_PATH: &str = "/sei/processos";
const LOGOUT_PATH: &str = "/sei/logout";

const CSRF_META: &str = "meta[name=\"sei-csrf\"]";
const BAD_CREDENTIALS_MARKER: &str = "Credenciais inválidas";

/// Adapter for the v5 family.
pub struct V5Adapter {
    client: reqwest::Client,
}

impl V5Adapter {
    #[must_use]
    pub fn v5_0(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VersionAdapter for V5Adapter {
    fn version(&self) -> SeiVersion {
        SeiVersion::new(VersionFamily::V5, 0)
    }

    async fn authenticate(
        &self,
        institution: &InstitutionConfig,
        credentials: &Credentials,
    ) -> Result<Session, ScrapeError> {
        let login_url = format!("{}{LOGIN_PATH}", institution.base_url);

        let resp = self
            .client
            .get(&login_url)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        let resp = http::check_response(&institution.id, "login_page", resp)?;
        let mut cookies = http::collect_cookies(&resp);
        let body = resp.text().await.map_err(|e| http::classify_transport(&e))?;

        let csrf = parse_csrf_meta(&institution.id, &body)?;

        let form: Vec<(&str, String)> = vec![
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
            ("_csrf", csrf.clone()),
        ];
        let mut request = self.client.post(&login_url).form(&form);
        if !cookies.is_empty() {
            request = request.header(reqwest::header::COOKIE, http::cookie_header(&cookies));
        }
        let resp = request
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;

        http::merge_cookies(&mut cookies, http::collect_cookies(&resp));

        if resp.status().is_redirection() {
            let location = http::location_header(&resp).unwrap_or_default();
            if location.contains(LOGIN_PATH) {
                return Err(ScrapeError::auth(
                    "portal bounced the login back to the login page",
                ));
            }
            let now = Utc::now();
            return Ok(Session {
                institution_id: institution.id.clone(),
                base_url: institution.base_url.clone(),
                account: credentials.username.clone(),
                cookies,
                tokens: HashMap::from([("_csrf".to_string(), csrf)]),
                established_at: now,
                expires_at: now + chrono::Duration::minutes(DEFAULT_TTL_MINUTES),
            });
        }

        let resp = http::check_response(&institution.id, "login_submit", resp)?;
        let body = resp.text().await.map_err(|e| http::classify_transport(&e))?;
        if body.contains(BAD_CREDENTIALS_MARKER) {
            return Err(ScrapeError::auth("portal rejected the credentials"));
        }
        Err(ScrapeError::structure(
            &institution.id,
            "login_submit",
            "login response is neither a redirect nor a recognizable rejection",
        ))
    }

    async fn fetch_page(
        &self,
        session: &Session,
        filter: &ProcessFilter,
        cursor: Option<PageCursor>,
    ) -> Result<ProcessPage, ScrapeError> {
        let mut url = format!("{}{LIST_PATH}?", session.base_url);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = &filter.status {
            params.push(("status", status.clone()));
        }
        if let Some(unit) = &filter.unit {
            params.push(("unit", unit.clone()));
        }
        if let Some(since) = &filter.updated_since {
            params.push(("updated_since", since.format("%Y-%m-%d").to_string()));
        }
        match cursor {
            Some(PageCursor::Token(token)) => params.push(("cursor", token)),
            Some(PageCursor::PageNumber(_)) => {
                return Err(ScrapeError::structure(
                    &session.institution_id,
                    "listing",
                    "page-number cursor handed to a v5 adapter",
                ));
            }
            None => {}
        }
        url.push_str(
            &params
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&"),
        );

        let body = self.fetch_html(session, "listing", &url).await?;
        parse_listing(&session.institution_id, &body)
    }

    async fn fetch_process_detail(
        &self,
        session: &Session,
        process_id: &str,
    ) -> Result<Process, ScrapeError> {
        let url = format!(
            "{}{LIST_PATH}/{}",
            session.base_url,
            urlencoding::encode(process_id)
        );
        let body = self.fetch_html(session, "detail", &url).await?;
        parse_detail(&session.institution_id, process_id, &body)
    }

    async fn fetch_document_content(
        &self,
        session: &Session,
        content_ref: &str,
    ) -> Result<DocumentContent, ScrapeError> {
        let url = format!("{}{content_ref}", session.base_url);
        let resp = http::with_session(self.client.get(&url), session)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        if bounced_to_login(&resp) {
            return Err(ScrapeError::SessionExpired);
        }
        let resp = http::check_response(&session.institution_id, "document", resp)?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = resp.content_length();
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ScrapeError::transient(format!("document stream error: {e}"))))
            .boxed();
        Ok(DocumentContent::new(content_type, content_length, stream))
    }

    async fn logout(&self, session: &Session) -> Result<(), ScrapeError> {
        let url = format!("{}{LOGOUT_PATH}", session.base_url);
        let mut request = http::with_session(self.client.post(&url), session);
        if let Some(csrf) = session.token("_csrf") {
            request = request.form(&[("_csrf", csrf)]);
        }
        request
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        Ok(())
    }
}

impl V5Adapter {
    async fn fetch_html(
        &self,
        session: &Session,
        stage: &str,
        url: &str,
    ) -> Result<String, ScrapeError> {
        let resp = http::with_session(self.client.get(url), session)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        if bounced_to_login(&resp) {
            return Err(ScrapeError::SessionExpired);
        }
        let resp = http::check_response(&session.institution_id, stage, resp)?;
        let body = resp.text().await.map_err(|e| http::classify_transport(&e))?;
        if is_login_page(&body) {
            return Err(ScrapeError::SessionExpired);
        }
        Ok(body)
    }
}

fn bounced_to_login(resp: &reqwest::Response) -> bool {
    resp.status().is_redirection()
        && http::location_header(resp).is_some_and(|l| l.contains(LOGIN_PATH))
}

fn is_login_page(body: &str) -> bool {
    let doc = Html::parse_document(body);
    html::attr_of(&doc, "body", "data-page").as_deref() == Some("login")
}

fn parse_csrf_meta(institution: &str, body: &str) -> Result<String, ScrapeError> {
    let doc = Html::parse_document(body);
    html::attr_of(&doc, CSRF_META, "content").ok_or_else(|| {
        ScrapeError::structure(institution, "login_page", "sei-csrf meta tag missing")
    })
}

fn parse_listing(institution: &str, body: &str) -> Result<ProcessPage, ScrapeError> {
    let doc = Html::parse_document(body);
    if html::select_first(&doc, "ul[data-role=\"process-list\"]").is_none() {
        return Err(ScrapeError::structure(
            institution,
            "listing",
            "process list missing",
        ));
    }

    let mut summaries = Vec::new();
    for item in html::select_all(&doc, "ul[data-role=\"process-list\"] > li") {
        let value = item.value();
        let id = value.attr("data-process-id").ok_or_else(|| {
            ScrapeError::structure(institution, "listing", "list item without data-process-id")
        })?;
        let unit = value.attr("data-unit").ok_or_else(|| {
            ScrapeError::structure(institution, "listing", "list item without data-unit")
        })?;
        let status = value.attr("data-status").ok_or_else(|| {
            ScrapeError::structure(institution, "listing", "list item without data-status")
        })?;
        summaries.push(ProcessSummary {
            id: id.to_string(),
            unit: unit.to_string(),
            status: status.to_string(),
            updated_at: value
                .attr("data-updated")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
        });
    }

    let next = html::attr_of(&doc, "nav[data-next-cursor]", "data-next-cursor")
        .filter(|c| !c.is_empty())
        .map(PageCursor::Token);

    Ok(ProcessPage { summaries, next })
}

fn parse_detail(institution: &str, process_id: &str, body: &str) -> Result<Process, ScrapeError> {
    let doc = Html::parse_document(body);
    let article = html::select_first(&doc, "article[data-process]").ok_or_else(|| {
        if body.contains("data-error=\"not-found\"") {
            ScrapeError::not_found("process", process_id)
        } else {
            ScrapeError::structure(institution, "detail", "process article missing")
        }
    })?;

    let value = article.value();
    let unit = value
        .attr("data-unit")
        .ok_or_else(|| ScrapeError::structure(institution, "detail", "data-unit missing"))?
        .to_string();
    let status = value
        .attr("data-status")
        .ok_or_else(|| ScrapeError::structure(institution, "detail", "data-status missing"))?
        .to_string();
    let created_at = value
        .attr("data-created")
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));

    if html::select_first(&doc, "ol[data-role=\"history\"]").is_none() {
        return Err(ScrapeError::structure(
            institution,
            "detail",
            "movement history missing",
        ));
    }
    let mut movements = Vec::new();
    for (idx, item) in html::select_all(&doc, "ol[data-role=\"history\"] > li")
        .into_iter()
        .enumerate()
    {
        let value = item.value();
        let from_unit = value.attr("data-from").unwrap_or_default().to_string();
        let to_unit = value.attr("data-to").unwrap_or_default().to_string();
        if from_unit.is_empty() || to_unit.is_empty() {
            return Err(ScrapeError::structure(
                institution,
                "detail",
                "history entry without from/to units",
            ));
        }
        movements.push(Movement {
            sequence: u32::try_from(idx + 1).unwrap_or(u32::MAX),
            moved_at: value
                .attr("data-at")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            from_unit,
            to_unit,
            description: html::text_of(item),
        });
    }

    let mut documents = Vec::new();
    for item in html::select_all(&doc, "ul[data-role=\"documents\"] > li") {
        let value = item.value();
        let id = value.attr("data-document-id").ok_or_else(|| {
            ScrapeError::structure(institution, "detail", "document without data-document-id")
        })?;
        let content_ref = value.attr("data-href").ok_or_else(|| {
            ScrapeError::structure(institution, "detail", "document without data-href")
        })?;
        documents.push(Document {
            id: id.to_string(),
            process_id: process_id.to_string(),
            doc_type: value.attr("data-type").unwrap_or_default().to_string(),
            generated_at: value
                .attr("data-generated")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            content_ref: content_ref.to_string(),
        });
    }

    Ok(Process {
        id: process_id.to_string(),
        unit,
        status,
        created_at,
        movements,
        documents,
    })
}
