//! SEI v4 family adapter (minors 4.0, 4.1, 4.2).
//!
//! v4 portals run a two-step form login (GET the login page for the hidden
//! `hdnToken`, POST the form, success is a redirect into the working area)
//! and cursor-based listing pagination. 4.0 and 4.1 carry the cursor in a
//! `hdnInfraCursor` hidden field; 4.2 moved it to a `data-cursor` attribute
//! on the pager nav, which is the only markup difference — so 4.2 is a
//! one-method dialect override, not a new adapter.

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

const LOGIN_PATH: &str = "/sei/controlador.php?acao=login";
const LIST_PATH: &str = "/sei/controlador.php?acao=procedimento_listar";
const DETAIL_PATH: &str = "/sei/controlador.php?acao=procedimento_trabalhar&protocolo=";
const LOGOUT_PATH: &str = "/sei/controlador.php?acao=sair";

const TOKEN_FIELD: &str = "hdnToken";
const BAD_CREDENTIALS_MARKER: &str = "Usuário ou senha inválido";
const NOT_FOUND_MARKER: &str = "Processo não encontrado";

/// Markup quirks that vary between v4 minors. Defaults describe 4.0/4.1;
/// a minor overrides only what actually changed.
pub(crate) trait V4Dialect: Send + Sync {
    fn minor(&self) -> u8;

    /// Pull the next-page cursor out of a parsed listing page.
    fn listing_cursor(&self, doc: &Html) -> Option<PageCursor> {
        html::hidden_input(doc, "hdnInfraCursor")
            .filter(|c| !c.is_empty())
            .map(PageCursor::Token)
    }
}

struct V40;
impl V4Dialect for V40 {
    fn minor(&self) -> u8 {
        0
    }
}

struct V41;
impl V4Dialect for V41 {
    fn minor(&self) -> u8 {
        1
    }
}

/// 4.2 moved the pagination cursor to the pager nav.
struct V42;
impl V4Dialect for V42 {
    fn minor(&self) -> u8 {
        2
    }

    fn listing_cursor(&self, doc: &Html) -> Option<PageCursor> {
        html::attr_of(doc, "nav.infraPaginacao", "data-cursor")
            .filter(|c| !c.is_empty())
            .map(PageCursor::Token)
    }
}

/// Adapter for the v4 family.
pub struct V4Adapter {
    client: reqwest::Client,
    dialect: Arc<dyn V4Dialect>,
}

impl V4Adapter {
    #[must_use]
    pub fn v4_0(client: reqwest::Client) -> Self {
        Self {
            client,
            dialect: Arc::new(V40),
        }
    }

    #[must_use]
    pub fn v4_1(client: reqwest::Client) -> Self {
        Self {
            client,
            dialect: Arc::new(V41),
        }
    }

    #[must_use]
    pub fn v4_2(client: reqwest::Client) -> Self {
        Self {
            client,
            dialect: Arc::new(V42),
        }
    }
}

#[async_trait]
impl VersionAdapter for V4Adapter {
    fn version(&self) -> SeiVersion {
        SeiVersion::new(VersionFamily::V4, self.dialect.minor())
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

        let form_tokens = parse_login_form(&institution.id, &body)?;

        let mut form: Vec<(&str, String)> = vec![
            ("txtUsuario", credentials.username.clone()),
            ("pwdSenha", credentials.password.clone()),
            (TOKEN_FIELD, form_tokens.token.clone()),
            ("sbmLogin", "Acessar".to_string()),
        ];
        if let Some(flag) = &form_tokens.accessibility_flag {
            form.push(("hdnFlagAcessibilidade", flag.clone()));
        }

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
            if location.contains("acao=login") {
                return Err(ScrapeError::auth(
                    "portal bounced the login back to the login page",
                ));
            }

            // The portal sets part of its session state on the post-login
            // landing page, so follow the one redirect and merge its cookies.
            let landing_url = if location.starts_with("http") {
                location
            } else {
                format!("{}{location}", institution.base_url)
            };
            let mut request = self.client.get(&landing_url);
            if !cookies.is_empty() {
                request = request.header(reqwest::header::COOKIE, http::cookie_header(&cookies));
            }
            let landing = request
                .send()
                .await
                .map_err(|e| http::classify_transport(&e))?;
            let landing = http::check_response(&institution.id, "login_landing", landing)?;
            http::merge_cookies(&mut cookies, http::collect_cookies(&landing));

            let now = Utc::now();
            return Ok(Session {
                institution_id: institution.id.clone(),
                base_url: institution.base_url.clone(),
                account: credentials.username.clone(),
                cookies,
                tokens: HashMap::from([(TOKEN_FIELD.to_string(), form_tokens.token)]),
                established_at: now,
                expires_at: now + chrono::Duration::minutes(DEFAULT_TTL_MINUTES),
            });
        }

        let resp = http::check_response(&institution.id, "login_submit", resp)?;
        let body = resp.text().await.map_err(|e| http::classify_transport(&e))?;
        Err(classify_rejected_login(&institution.id, &body))
    }

    async fn fetch_page(
        &self,
        session: &Session,
        filter: &ProcessFilter,
        cursor: Option<PageCursor>,
    ) -> Result<ProcessPage, ScrapeError> {
        let mut url = format!("{}{LIST_PATH}", session.base_url);
        if let Some(status) = &filter.status {
            url.push_str(&format!("&sta_protocolo={}", urlencoding::encode(status)));
        }
        if let Some(unit) = &filter.unit {
            url.push_str(&format!("&sigla_unidade={}", urlencoding::encode(unit)));
        }
        if let Some(since) = &filter.updated_since {
            url.push_str(&format!("&dta_atualizacao={}", since.format("%d/%m/%Y")));
        }
        match cursor {
            Some(PageCursor::Token(token)) => {
                url.push_str(&format!("&hdnInfraCursor={}", urlencoding::encode(&token)));
            }
            Some(PageCursor::PageNumber(_)) => {
                return Err(ScrapeError::structure(
                    &session.institution_id,
                    "listing",
                    "page-number cursor handed to a v4 adapter",
                ));
            }
            None => {}
        }

        let body = self.fetch_html(session, "listing", &url).await?;
        parse_listing(&session.institution_id, &body, self.dialect.as_ref())
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

impl V4Adapter {
    /// Authenticated GET returning the body, with expired-session detection.
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

// ── Flow classification ────────────────────────────────────────────

fn bounced_to_login(resp: &reqwest::Response) -> bool {
    resp.status().is_redirection()
        && http::location_header(resp).is_some_and(|l| l.contains("acao=login"))
}

fn is_login_page(body: &str) -> bool {
    let doc = Html::parse_document(body);
    html::select_first(&doc, "form#frmLogin").is_some()
}

#[derive(Debug)]
struct LoginForm {
    token: String,
    accessibility_flag: Option<String>,
}

fn parse_login_form(institution: &str, body: &str) -> Result<LoginForm, ScrapeError> {
    let doc = Html::parse_document(body);
    let token = html::hidden_input(&doc, TOKEN_FIELD).ok_or_else(|| {
        ScrapeError::structure(
            institution,
            "login_page",
            format!("hidden {TOKEN_FIELD} field missing from login form"),
        )
    })?;
    Ok(LoginForm {
        token,
        accessibility_flag: html::hidden_input(&doc, "hdnFlagAcessibilidade"),
    })
}

/// A 200 response to the login POST means the portal re-rendered something
/// instead of redirecting into the working area. Tell bad credentials apart
/// from drift.
fn classify_rejected_login(institution: &str, body: &str) -> ScrapeError {
    if body.contains(BAD_CREDENTIALS_MARKER) {
        return ScrapeError::auth("portal rejected the credentials");
    }
    if is_login_page(body) {
        return ScrapeError::auth("portal re-rendered the login form");
    }
    ScrapeError::structure(
        institution,
        "login_submit",
        "login response is neither a redirect nor a recognizable login page",
    )
}

// ── Parsing ────────────────────────────────────────────────────────

fn parse_listing(
    institution: &str,
    body: &str,
    dialect: &dyn V4Dialect,
) -> Result<ProcessPage, ScrapeError> {
    let doc = Html::parse_document(body);
    let table = html::select_first(&doc, "table#tblProcessos").ok_or_else(|| {
        ScrapeError::structure(institution, "listing", "process table missing")
    })?;

    let row_sel = html::selector("tbody tr");
    let cell_sel = html::selector("td");
    let mut summaries = Vec::new();
    for row in table.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 4 {
            // strict drift policy: a malformed row fails the page
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

    Ok(ProcessPage {
        summaries,
        next: dialect.listing_cursor(&doc),
    })
}

fn parse_detail(institution: &str, process_id: &str, body: &str) -> Result<Process, ScrapeError> {
    let doc = Html::parse_document(body);

    let unit = html::first_text(&doc, "#spnUnidadeGeradora").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "generating unit span missing")
    })?;
    let status = html::first_text(&doc, "#spnSituacao").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "status span missing")
    })?;
    let created_at = html::first_text(&doc, "#spnDataGeracao")
        .as_deref()
        .and_then(html::parse_sei_date);

    let historico = html::select_first(&doc, "table#tblHistorico").ok_or_else(|| {
        ScrapeError::structure(institution, "detail", "movement history table missing")
    })?;
    let row_sel = html::selector("tbody tr");
    let cell_sel = html::selector("td");

    let mut movements = Vec::new();
    for (idx, row) in historico.select(&row_sel).enumerate() {
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
    if let Some(doc_table) = html::select_first(&doc, "table#tblDocumentos") {
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

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form id="frmLogin" action="controlador.php?acao=login" method="post">
          <input type="hidden" name="hdnToken" value="tok-9f2a"/>
          <input type="hidden" name="hdnFlagAcessibilidade" value="N"/>
          <input type="text" name="txtUsuario"/>
          <input type="password" name="pwdSenha"/>
        </form>
        </body></html>"#;

    fn listing_page(rows: &str, pager: &str) -> String {
        format!(
            r#"<html><body>
            <table id="tblProcessos"><tbody>{rows}</tbody></table>
            {pager}
            </body></html>"#
        )
    }

    const ROW_A: &str = "<tr><td>0001234-56.2024.4.01.8000</td><td>SEDE-DIR</td>\
                         <td>Em andamento</td><td>15/03/2024 14:32</td></tr>";
    const ROW_B: &str = "<tr><td>0009876-12.2024.4.01.8000</td><td>PROT-1</td>\
                         <td>Concluído</td><td>10/03/2024 09:01</td></tr>";

    #[test]
    fn login_form_yields_token_and_flag() {
        let form = parse_login_form("trf1", LOGIN_PAGE).unwrap();
        assert_eq!(form.token, "tok-9f2a");
        assert_eq!(form.accessibility_flag.as_deref(), Some("N"));
    }

    #[test]
    fn missing_token_field_is_structure_not_auth() {
        let page = LOGIN_PAGE.replace("hdnToken", "hdnSomethingElse");
        let err = parse_login_form("trf1", &page).unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }

    #[test]
    fn rejected_login_with_error_banner_is_auth() {
        let body = format!("<html><body><div id=\"divMensagem\">{BAD_CREDENTIALS_MARKER}</div></body></html>");
        assert_eq!(classify_rejected_login("trf1", &body).kind(), "auth_error");
    }

    #[test]
    fn unrecognizable_login_response_is_structure() {
        let err = classify_rejected_login("trf1", "<html><body><h1>Manutenção</h1></body></html>");
        assert_eq!(err.kind(), "structure_error");
    }

    #[test]
    fn default_dialect_reads_hidden_cursor() {
        let page = listing_page(
            ROW_A,
            r#"<input type="hidden" name="hdnInfraCursor" value="cur-2"/>"#,
        );
        let result = parse_listing("trf1", &page, &V40).unwrap();
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].id, "0001234-56.2024.4.01.8000");
        assert_eq!(result.next, Some(PageCursor::Token("cur-2".into())));
    }

    #[test]
    fn v4_2_reads_cursor_from_pager_nav() {
        let page = listing_page(
            &format!("{ROW_A}{ROW_B}"),
            r#"<nav class="infraPaginacao" data-cursor="cur-xyz"></nav>"#,
        );
        let result = parse_listing("trf1", &page, &V42).unwrap();
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.next, Some(PageCursor::Token("cur-xyz".into())));
        // the 4.0 dialect would see no cursor on this markup
        assert_eq!(parse_listing("trf1", &page, &V40).unwrap().next, None);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let page = listing_page(ROW_B, "");
        let result = parse_listing("trf1", &page, &V42).unwrap();
        assert_eq!(result.next, None);
    }

    #[test]
    fn short_listing_row_fails_the_page() {
        let page = listing_page("<tr><td>0001</td><td>SEDE</td></tr>", "");
        let err = parse_listing("trf1", &page, &V40).unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }

    #[test]
    fn missing_listing_table_is_structure() {
        let err = parse_listing("trf1", "<html><body></body></html>", &V40).unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <div id="divCabecalho">
          <span id="spnUnidadeGeradora">SEDE-DIR</span>
          <span id="spnSituacao">Em andamento</span>
          <span id="spnDataGeracao">10/01/2024</span>
        </div>
        <table id="tblHistorico"><tbody>
          <tr><td>10/01/2024 08:00</td><td>SEDE-DIR</td><td>SEDE-DIR</td><td>Processo gerado</td></tr>
          <tr><td>15/03/2024 14:32</td><td>SEDE-DIR</td><td>PROT-1</td><td>Processo remetido</td></tr>
        </tbody></table>
        <table id="tblDocumentos"><tbody>
          <tr><td><a href="/sei/controlador.php?acao=documento_download&amp;id=555">555</a></td><td>Despacho</td><td>12/01/2024</td></tr>
        </tbody></table>
        </body></html>"#;

    #[test]
    fn detail_parses_movements_in_portal_order() {
        let process = parse_detail("trf1", "0001234-56.2024.4.01.8000", DETAIL_PAGE).unwrap();
        assert_eq!(process.unit, "SEDE-DIR");
        assert_eq!(process.status, "Em andamento");
        assert_eq!(process.movements.len(), 2);
        assert_eq!(process.movements[0].sequence, 1);
        assert_eq!(process.movements[0].description, "Processo gerado");
        assert_eq!(process.movements[1].to_unit, "PROT-1");
        assert_eq!(process.documents.len(), 1);
        assert_eq!(process.documents[0].process_id, "0001234-56.2024.4.01.8000");
        assert_eq!(
            process.documents[0].content_ref,
            "/sei/controlador.php?acao=documento_download&id=555"
        );
    }

    #[test]
    fn detail_without_history_table_is_structure() {
        let page = DETAIL_PAGE.replace("tblHistorico", "tblOutro");
        let err = parse_detail("trf1", "0001", &page).unwrap_err();
        assert_eq!(err.kind(), "structure_error");
    }
}
