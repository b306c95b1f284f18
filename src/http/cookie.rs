//! Minimal cookie parsing and `Set-Cookie` rendering.

use axum::http::{header, HeaderMap, HeaderValue};
use std::fmt::Write;
use std::time::Duration;

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Read a cookie value from the request `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// A response cookie.
#[derive(Debug, Clone)]
pub struct SetCookie<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub max_age: Option<Duration>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SetCookie<'_> {
    pub fn render(&self) -> String {
        let mut out = format!("{}={}; Path=/", self.name, self.value);
        if let Some(max_age) = self.max_age {
            let _ = write!(out, "; Max-Age={}", max_age.as_secs());
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        let _ = write!(out, "; SameSite={}", self.same_site.as_str());
        out
    }

    /// Append as a `Set-Cookie` header, keeping cookies set by inner layers.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.render()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(err) => {
                tracing::error!(cookie = self.name, error = %err, "Refusing to emit malformed cookie");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; sid=abc123"));
        headers.append(header::COOKIE, HeaderValue::from_static("csrf-token=\"tok\""));

        assert_eq!(cookie_value(&headers, "sid").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "csrf-token").as_deref(), Some("tok"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_render_attributes() {
        let cookie = SetCookie {
            name: "csrf-token",
            value: "deadbeef",
            max_age: Some(Duration::from_secs(86_400)),
            http_only: false,
            secure: true,
            same_site: SameSite::Lax,
        };
        assert_eq!(
            cookie.render(),
            "csrf-token=deadbeef; Path=/; Max-Age=86400; Secure; SameSite=Lax"
        );

        let session = SetCookie {
            name: "sid",
            value: "x",
            max_age: None,
            http_only: true,
            secure: false,
            same_site: SameSite::Strict,
        };
        assert_eq!(session.render(), "sid=x; Path=/; HttpOnly; SameSite=Strict");
    }
}
