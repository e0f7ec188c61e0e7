use thiserror::Error;
use tracing::debug;
use url::Url;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REDIRECT_PARAM: &str = "redirect_to";

const BASE: &str = "http://canvas.invalid/";

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid request path `{path}`: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Path plus query to send the browser to.
    Redirect(String),
}

fn is_public(path: &str) -> bool {
    path == "/" || path.starts_with("/login") || path.starts_with("/auth")
}

/// Decide what to do with a request for `path_and_query` given whether the session is signed in.
pub fn decide(path_and_query: &str, authenticated: bool) -> Result<GateDecision, GateError> {
    let url = parse(path_and_query)?;
    let path = url.path().to_string();

    if !authenticated && !is_public(&path) {
        let original = path_with_query(&url);
        let mut target = url.clone();
        target.set_path(LOGIN_PATH);
        set_params(&mut target, &[(REDIRECT_PARAM.to_string(), original)]);
        debug!(%path, "unauthenticated request sent to login");
        return Ok(GateDecision::Redirect(path_with_query(&target)));
    }

    if authenticated && path.starts_with(LOGIN_PATH) {
        let Some(stored) = url
            .query_pairs()
            .find(|(key, _)| key == REDIRECT_PARAM)
            .map(|(_, value)| value.into_owned())
        else {
            return Ok(GateDecision::Allow);
        };
        let (stored_path, stored_query) = match stored.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (stored.as_str(), None),
        };
        let mut target = url.clone();
        target.set_path(safe_local_path(stored_path));
        let mut params = query_params(&url, Some(REDIRECT_PARAM));
        if let Some(query) = stored_query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params.retain(|(existing, _)| existing.as_str() != key);
                params.push((key.into_owned(), value.into_owned()));
            }
        }
        target.set_query(None);
        set_params(&mut target, &params);
        debug!(%path, target = %target.path(), "authenticated request returned to stored path");
        return Ok(GateDecision::Redirect(path_with_query(&target)));
    }

    Ok(GateDecision::Allow)
}

fn parse(path_and_query: &str) -> Result<Url, GateError> {
    let base = Url::parse(BASE).map_err(|source| GateError::InvalidPath {
        path: BASE.to_string(),
        source,
    })?;
    let input = if path_and_query.starts_with('/') {
        path_and_query.to_string()
    } else {
        format!("/{path_and_query}")
    };
    base.join(&input).map_err(|source| GateError::InvalidPath {
        path: path_and_query.to_string(),
        source,
    })
}

/// Stored targets must stay on this site.
fn safe_local_path(path: &str) -> &str {
    if path.starts_with('/') && !path.starts_with("//") {
        path
    } else {
        "/"
    }
}

fn query_params(url: &Url, skip: Option<&str>) -> Vec<(String, String)> {
    url.query_pairs()
        .filter(|(key, _)| Some(key.as_ref()) != skip)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Set each param, replacing any existing value under the same key.
fn set_params(url: &mut Url, params: &[(String, String)]) {
    let mut merged = query_params(url, None);
    for (key, value) in params {
        merged.retain(|(existing, _)| existing != key);
        merged.push((key.clone(), value.clone()));
    }
    if merged.is_empty() {
        url.set_query(None);
        return;
    }
    url.query_pairs_mut().clear().extend_pairs(merged);
}

fn path_with_query(url: &Url) -> String {
    match url.query() {
        Some(query) if !query.is_empty() => format!("{}?{query}", url.path()),
        _ => url.path().to_string(),
    }
}

#[cfg(test)]
#[path = "../tests/unit/gate_tests.rs"]
mod tests;
