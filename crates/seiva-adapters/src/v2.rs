//! SEI v2 legacy family adapter (minors 2.5, 2.6).
//!
//! v2 portals authenticate through the separate SIP module
//! (`/sip/login.php`) and paginate listings by page number, advertising the
//! next page with a "Próxima" link rather than any cursor token. 2.6 renamed
//! the hidden login token field, which is the only difference from 2.5 —
//! a one-method dialect override.

use std::collections::HashMap;
use std::sync::Arc;

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

const LOGIN_PATH: &str = "/sip/login.php";
const LIST_PATH: &str = "/sei/controlador.php?acao=procedimento_listar";
const DETAIL_PATH: &str = "/sei/controlador.php?acao=procedimento_visualizar&protocolo=";
const LOGOUT_PATH: &str = "/sip/logout.php";

const BAD_CREDENTIALS_MARKER: &str = "Usuário ou senha inválidos";
const SESSION_EXPIRED_MARKER: &str = "Sua sessão expirou";
const NOT_FOUND_MARKER: &str = "Protocolo não localizado";

/// Markup quirks that vary between v2 minors.
pub(crate) trait V2Dialect: Send + Sync {
    fn minor(&self) -> u8;

    /// Name of the hidden token field on the SIP login form.
    fn login_token_field(&self) -> &'static str {
        "hdnToken"
    }
}

struct V25;
impl V2Dialect for V25 {
    fn minor(&self) -> u8 {
        5
    }
}

/// 2.6 renamed the login token field.
struct V26;
impl V2Dialect for V26 {
    fn minor(&self) -> u8 {
        6
    }

    fn login_token_field(&self) -> &'static str {
        "hdnInfraToken"
    }
}

/// Adapter for the v2 legacy family.
pub struct V2Adapter {
    client: reqwest::Client,
    dialect: Arc<dyn V2Dialect>,
}

impl V2Adapter {
    #[must_use]
    pub fn v2_5(client: reqwest::Client) -> Self {
        Self {
            client,
            dialect: Arc::new(V25),
        }
    }

    #[must_use]
    pub fn v2_6(client: reqwest::Client) -> Self {
        Self {
            client,
            dialect: Arc::new(V26),
        }
    }
}

#[async_trait]
impl VersionAdapter for V2Adapter {
    fn version(&self) -> SeiVersion {
        SeiVersion::new(VersionFamily::V2, self.dialect.minor())
    }

    async fn authenticate(
        &self,
        institution: &InstitutionConfig,
        credentials: &Credentials,
    ) -> Result<Session, ScrapeError> {
        let login_url = format!("{}{LOGIN_PATH}", institution.base_url);
        let token_field = self.dialect.login_token_field();

        let resp = self
            .client
            .get(&login_url)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        let resp = http::check_response(&institution.id, "login_page", resp)?;
        let mut cookies = http::collect_cookies(&resp);
        let body = resp.text().await.map_err(|e| http::classify_transport(&e))?;

        let token = parse_login_token(&institution.id, &body, token_field)?;

        let form: Vec<(&str, String)> = vec![
            ("txtUsuario", credentials.username.clone()),
            ("pwdSenha", credentials.password.clone()),
            (token_field, token.clone()),
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
            if location.contains("login.php") {
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
                tokens: HashMap::from([(token_field.to_string(), token)]),
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
        let page = match cursor {
            None => 1,
            Some(PageCursor::PageNumber(n)) => n,
            Some(PageCursor::Token(_)) => {
                return Err(ScrapeError::structure(
                    &session.institution_id,
                    "listing",
                    "cursor token handed to a v2 adapter",
                ));
            }
        };

        let mut url = format!("{}{LIST_PATH}&infra_pagina={page}", session.base_url);
        if let Some(status) = &filter.status {
            url.push_str(&format!("&situacao={}", urlencoding::encode(status)));
        }
        if let Some(unit) = &filter.unit {
            url.push_str(&format!("&unidade={}", urlencoding::encode(unit)));
        }
        if let Some(since) = &filter.updated_since {
            url.push_str(&format!("&dta_inicio={}", since.format("%d/%m/%Y")));
        }

        let body = self.fetch_html(session, "listing", &url).await?;
        parse_listing(&session.institution_id, &body, page)
    }

    async fn fetch_process_detail(
        &self,
        session: &Session,
        process_id: &str,
    ) -> Result<Process, ScrapeError> {
        let url = format!(
            "{}{DETAIL_PATH}{}",
            session.base_url,
            urlencoding::encode(process_id)
        );
        let body = self.fetch_html(session, "detail", &url).await?;
        if body.contains(NOT_FOUND_MARKER) {
            return Err(ScrapeError::not_found("process", process_id));
        }
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
        http::with_session(self.client.get(&url), session)
            .send()
            .await
            .map_err(|e| http::classify_transport(&e))?;
        Ok(())
    }
}

impl V2Adapter {
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
        if body.contains(SESSION_EXPIRED_MARKER) {
            return Err(ScrapeError::SessionExpired);
        }
        Ok(body)
    }
}

fn bounced_to_login(resp: &reqwest::Response) -> bool {
    resp.status().is_redirection()
        && http::location_header(resp).is_some_and(|l| l.contains("login.php"))
}

fn parse_login_token(
    institution: &str,
    body: &str,
    token_field: &str,
) -> Result<String, ScrapeError> {
    let doc = Html::parse_document(body);
    html::hidden_input(&doc, token_field).ok_or_else(|| {
        ScrapeError::structure(
            institution,
            "login_page",
            format!("hidden {token_field} field missing from login form"),
        )
    })
}

fn parse_listing(institution: &str, body: &str, page: u32) -> Result<ProcessPage, ScrapeError> {
    let doc = Html::parse_document(body);
    let table = html::select_first(&doc, "table#tblProcessosDetalhado").ok_or_else(|| {
        ScrapeError::structure(institution, "listing", "process table missing")
    })?;

    let row_sel = html::selector("tbody tr");
    let cell_sel = html::selector("td");
    let mut summaries = Vec::new();
    for row in table.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 4 {
            return Err(ScrapeError::structure(
                institution,
                "listing",
                format!("listing row has {} cells, expected 4", cells.len()),
            ));
        }
        summaries.push(ProcessSummary {
            id: html::text_of(cells[0]),
            unit: html::text_of(cells[1]),
            status: html::text_of(cells[2]),
            updated_at: html::parse_sei_datetime(&html::text_of(cells[3]))
                .or_else(|| html::parse_sei_date(&html::text_of(cells[3]))),
        });
    }

    // page-number pagination: a "Próxima" link advertises the next page
    let next = html::select_first(&doc, "a#lnkInfraProximaPagina")
        .map(|_| PageCursor::PageNumber(page + 1));

    Ok(ProcessPage { summaries, next })
}

fn parse_detail(institution: &str, process_id: &str, body: &str) -> Result<Process, ScrapeError> {
    let doc = Html::parse_document(body);

    let unit = html::first_text(&doc, "#lblUnidade").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "unit label missing")
    })?;
    let status = html::first_text(&doc, "#lblSituacao").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "status label missing")
    })?;
    let created_at = html::first_text(&doc, "#lblGeracao")
        .as_deref()
        .and_then(html::parse_sei_date);

    let andamentos = html::select_first(&doc, "table#tblAndamentos").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "movement table missing")
    })?;
    let row_sel = html::selector("tbody tr");
    let cell_sel = html::selector("td");

    let mut movements = Vec::new();
    for (idx, row) in andamentos.select(&row_sel).enumerate() {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 4 {
            return Err(ScrapeError::structure(
                institution,
                "detail",
                format!("movement row has {} cells, expected 4", cells.len()),
            ));
        }
        movements.push(Movement {
            sequence: u32::try_from(idx + 1).unwrap_or(u32::MAX),
            moved_at: html::parse_sei_datetime(&html::text_of(cells[0])),
            from_unit: html::text_of(cells[1]),
            to_unit: html::text_of(cells[2]),
            description: html::text_of(cells[3]),
        });
    }

    let mut documents = Vec::new();
    if let Some(doc_table) = html::select_first(&doc, "table#tblProtocolos") {
        let link_sel = html::selector("a");
        for row in doc_table.select(&row_sel) {
            let cells: Vec<_> = row.select(&cell_sel).collect();
            if cells.len() < 3 {
                return Err(ScrapeError::structure(
                    institution,
                    "detail",
                    format!("document row has {} cells, expected 3", cells.len()),
                ));
            }
            let link = cells[0].select(&link_sel).next().ok_or_else(|| {
                ScrapeError::structure(institution, "detail", "document row without a link")
            })?;
            let content_ref = link.value().attr("href").ok_or_else(|| {
                ScrapeError::structure(institution, "detail", "document link without href")
            })?;
            documents.push(Document {
                id: html::text_of(link),
                process_id: process_id.to_string(),
                doc_type: html::text_of(cells[1]),
                generated_at: html::parse_sei_date(&html::text_of(cells[2])),
                content_ref: content_ref.to_string(),
            });
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn listing_page(rows: &str, with_next: bool) -> String {
        let next = if with_next {
            r#"<a id="lnkInfraProximaPagina" href="?infra_pagina=2">Próxima</a>"#
        } else {
            ""
        };
        format!(
            r#"<html><body>
            <table id="tblProcessosDetalhado"><tbody>{rows}</tbody></table>
            {next}
            </body></html>"#
        )
    }

    const ROW: &str = "<tr><td>23069.001234/2024-11</td><td>PROGRAD</td>\
                       <td>Em tramitação</td><td>02/02/2024 11:15</td></tr>";

    #[test]
    fn dialects_disagree_on_token_field() {
        assert_eq!(V25.login_token_field(), "hdnToken");
        assert_eq!(V26.login_token_field(), "hdnInfraToken");
    }

    #[test]
    fn login_token_respects_dialect_field_name() {
        let page = r#"<form><input type="hidden" name="hdnInfraToken" value="t-26"/></form>"#;
        assert_eq!(parse_login_token("ufmg", page, "hdnInfraToken").unwrap(), "t-26");
        // the 2.5 field name is absent on 2.6 markup
        let err = parse_login_token("ufmg", page, "hdnToken").unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }

    #[test]
    fn next_link_advances_page_number() {
        let result = parse_listing("ufmg", &listing_page(ROW, true), 1).unwrap();
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.next, Some(PageCursor::PageNumber(2)));
    }

    #[test]
    fn listing_without_next_link_terminates() {
        let result = parse_listing("ufmg", &listing_page(ROW, false), 3).unwrap();
        assert_eq!(result.next, None);
    }

    #[test]
    fn short_row_fails_the_page() {
        let err = parse_listing("ufmg", &listing_page("<tr><td>x</td></tr>", false), 1)
            .unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }

    #[test]
    fn detail_parses_legacy_labels() {
        let page = r#"<html><body>
            <span id="lblUnidade">PROGRAD</span>
            <span id="lblSituacao">Em tramitação</span>
            <span id="lblGeracao">01/02/2024</span>
            <table id="tblAndamentos"><tbody>
              <tr><td>01/02/2024 09:00</td><td>PROGRAD</td><td>PROGRAD</td><td>Processo gerado</td></tr>
            </tbody></table>
            </body></html>"#;
        let process = parse_detail("ufmg", "23069.001234/2024-11", page).unwrap();
        assert_eq!(process.unit, "PROGRAD");
        assert_eq!(process.movements.len(), 1);
        assert!(process.documents.is_empty());
    }
}
