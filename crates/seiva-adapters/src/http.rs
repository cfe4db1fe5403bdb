//! Shared HTTP plumbing for the family adapters.
//!
//! Centralizes response classification (429 rate limiting with `Retry-After`
//! parsing, auth/access/not-found statuses, 5xx as transient) and cookie
//! collection so the family modules stay focused on markup and flow.
//!
//! The shared client never follows redirects: v2 and v4 login flows use the
//! redirect itself as the success signal, and a redirect back to the login
//! page is how every family reports an expired session.

use std::time::Duration;

use seiva_core::{ScrapeError, Session, SessionCookie};

/// Build the client shared by all adapters of one registry.
///
/// # Panics
///
/// Panics if the underlying `reqwest::Client` fails to build.
#[must_use]
pub fn build_client(timeout: Duration, user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("reqwest client should build")
}

/// Check an HTTP response for the status classes common to every family.
///
/// Returns the response unchanged on success or redirect (redirects are
/// protocol signals the caller interprets). Maps:
/// - **429** → [`ScrapeError::Transient`] with `Retry-After` parsing
///   (falls back to 60 s if absent or unparseable)
/// - **401** → [`ScrapeError::Auth`]
/// - **403** → [`ScrapeError::Access`]
/// - **404** → [`ScrapeError::NotFound`]
/// - **5xx** → [`ScrapeError::Transient`]
/// - any other non-success → [`ScrapeError::Structure`]
///
/// # Errors
///
/// As classified above.
pub fn check_response(
    institution: &str,
    stage: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ScrapeError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ScrapeError::Transient {
            message: format!("portal rate limited the request at stage {stage}"),
            retry_after_secs: Some(parse_retry_after(&resp)),
        });
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ScrapeError::auth(format!(
            "portal returned 401 at stage {stage}"
        )));
    }
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(ScrapeError::access(format!(
            "portal returned 403 at stage {stage}"
        )));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ScrapeError::not_found(stage, resp.url().path()));
    }
    if status.is_server_error() {
        return Err(ScrapeError::transient(format!(
            "portal returned {status} at stage {stage}"
        )));
    }
    if !status.is_success() && !status.is_redirection() {
        return Err(ScrapeError::structure(
            institution,
            stage,
            format!("unexpected status {status}"),
        ));
    }
    Ok(resp)
}

/// Parse the `Retry-After` header as seconds, falling back to 60 s.
fn parse_retry_after(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60)
}

/// Map a transport-level failure to the transient class.
#[must_use]
pub fn classify_transport(error: &reqwest::Error) -> ScrapeError {
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("portal unreachable: {error}")
    } else {
        format!("transport error: {error}")
    };
    ScrapeError::transient(message)
}

/// Collect cookies from every `Set-Cookie` header on a response.
///
/// Only the `name=value` pair is kept; attributes (`Path`, `HttpOnly`, …)
/// are irrelevant for replay against the same portal root.
#[must_use]
pub fn collect_cookies(resp: &reqwest::Response) -> Vec<SessionCookie> {
    resp.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some(SessionCookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Merge freshly collected cookies into an existing set, replacing by name.
pub fn merge_cookies(into: &mut Vec<SessionCookie>, fresh: Vec<SessionCookie>) {
    for cookie in fresh {
        if let Some(existing) = into.iter_mut().find(|c| c.name == cookie.name) {
            existing.value = cookie.value;
        } else {
            into.push(cookie);
        }
    }
}

/// Render a `Cookie` header from cookies collected before a session exists
/// (the pre-login leg of an authenticate flow).
#[must_use]
pub fn cookie_header(cookies: &[SessionCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The `Location` header of a redirect response, when present.
#[must_use]
pub fn location_header(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Attach a session's cookies to an outgoing request.
#[must_use]
pub fn with_session(builder: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
    if session.cookies.is_empty() {
        builder
    } else {
        builder.header(reqwest::header::COOKIE, session.cookie_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_response(status: u16) -> reqwest::Response {
        reqwest::Response::from(
            ::http::Response::builder()
                .status(status)
                .body("")
                .unwrap(),
        )
    }

    fn mock_response_with_header(status: u16, name: &str, value: &str) -> reqwest::Response {
        reqwest::Response::from(
            ::http::Response::builder()
                .status(status)
                .header(name, value)
                .body("")
                .unwrap(),
        )
    }

    #[test]
    fn rate_limit_maps_to_transient_with_retry_after() {
        let resp = mock_response_with_header(429, "Retry-After", "30");
        let err = check_response("trf1", "listing", resp).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Transient {
                retry_after_secs: Some(30),
                ..
            }
        ));
    }

    #[test]
    fn rate_limit_without_header_defaults_to_sixty() {
        let resp = mock_response(429);
        let err = check_response("trf1", "listing", resp).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Transient {
                retry_after_secs: Some(60),
                ..
            }
        ));
    }

    #[test]
    fn status_classes_map_to_taxonomy() {
        for (status, kind) in [
            (401, "auth_error"),
            (403, "access_error"),
            (404, "not_found"),
            (500, "transient_error"),
            (502, "transient_error"),
            (418, "structure_error"),
        ] {
            let err = check_response("trf1", "detail", mock_response(status)).unwrap_err();
            assert_eq!(err.kind(), kind, "status {status}");
        }
    }

    #[test]
    fn success_and_redirect_pass_through() {
        assert!(check_response("trf1", "login", mock_response(200)).is_ok());
        assert!(check_response("trf1", "login", mock_response(302)).is_ok());
    }

    #[test]
    fn collect_cookies_keeps_name_value_only() {
        let resp = reqwest::Response::from(
            ::http::Response::builder()
                .status(200)
                .header("set-cookie", "PHPSESSID=abc123; Path=/; HttpOnly")
                .header("set-cookie", "SEI_VERSAO=4")
                .body("")
                .unwrap(),
        );
        let cookies = collect_cookies(&resp);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "PHPSESSID");
        assert_eq!(cookies[0].value, "abc123");
        assert_eq!(cookies[1].name, "SEI_VERSAO");
    }

    #[test]
    fn merge_cookies_replaces_by_name() {
        let mut cookies = vec![SessionCookie {
            name: "PHPSESSID".into(),
            value: "old".into(),
        }];
        merge_cookies(
            &mut cookies,
            vec![
                SessionCookie {
                    name: "PHPSESSID".into(),
                    value: "new".into(),
                },
                SessionCookie {
                    name: "SEI_VERSAO".into(),
                    value: "4".into(),
                },
            ],
        );
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].value, "new");
    }
}
