//! Cookie jars the session store reads from and writes to.
//!
//! `MemoryCookieJar` keeps cookies in process memory. `RequestCookies` is
//! scoped to a single HTTP request: it is seeded from the request's
//! `Cookie` header and records every write as a `Set-Cookie` header value
//! for the response.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};

use super::SessionError;

/// HTTP-date format used by the `Expires` attribute
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl std::fmt::Display for SameSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// A cookie together with the attributes it is set with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age_secs: i64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            max_age_secs: 0,
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    /// A cookie that tells the browser to drop `name` immediately.
    pub fn removal(name: impl Into<String>, secure: bool) -> Self {
        Self {
            secure,
            ..Self::new(name, "")
        }
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let expires = Utc::now() + Duration::seconds(self.max_age_secs);
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}; Expires={}",
            self.name,
            self.value,
            self.path,
            self.max_age_secs,
            expires.format(HTTP_DATE_FORMAT)
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header.push_str(&format!("; SameSite={}", self.same_site));
        header
    }
}

/// Storage for named cookies.
pub trait CookieJar: Send + Sync {
    /// Current value of a cookie, if set.
    fn get(&self, name: &str) -> Result<Option<String>, SessionError>;

    /// Store a cookie, replacing any previous cookie with the same name.
    fn set(&self, cookie: Cookie) -> Result<(), SessionError>;

    /// Delete a cookie. Deleting a missing cookie is not an error.
    fn remove(&self, name: &str, secure: bool) -> Result<(), SessionError>;
}

impl<T: CookieJar + ?Sized> CookieJar for &T {
    fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
        (**self).get(name)
    }

    fn set(&self, cookie: Cookie) -> Result<(), SessionError> {
        (**self).set(cookie)
    }

    fn remove(&self, name: &str, secure: bool) -> Result<(), SessionError> {
        (**self).remove(name, secure)
    }
}

impl<T: CookieJar + ?Sized> CookieJar for std::sync::Arc<T> {
    fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
        (**self).get(name)
    }

    fn set(&self, cookie: Cookie) -> Result<(), SessionError> {
        (**self).set(cookie)
    }

    fn remove(&self, name: &str, secure: bool) -> Result<(), SessionError> {
        (**self).remove(name, secure)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, SessionError> {
    mutex
        .lock()
        .map_err(|_| SessionError::Storage("cookie jar lock poisoned".to_string()))
}

/// Process-local cookie storage.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full cookie (with attributes) as last stored.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies.lock().ok()?.get(name).cloned()
    }

    /// Overwrite a cookie value without touching attributes.
    pub fn insert_raw(&self, name: &str, value: &str) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.insert(name.to_string(), Cookie::new(name, value));
        }
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
        Ok(lock(&self.cookies)?.get(name).map(|c| c.value.clone()))
    }

    fn set(&self, cookie: Cookie) -> Result<(), SessionError> {
        lock(&self.cookies)?.insert(cookie.name.clone(), cookie);
        Ok(())
    }

    fn remove(&self, name: &str, _secure: bool) -> Result<(), SessionError> {
        lock(&self.cookies)?.remove(name);
        Ok(())
    }
}

/// Extract a cookie value from a `Cookie` request header.
pub fn parse_cookie_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

#[derive(Debug, Default)]
struct RequestCookiesInner {
    values: HashMap<String, String>,
    set_cookies: Vec<String>,
}

/// Cookies of a single HTTP request/response exchange.
#[derive(Debug, Default)]
pub struct RequestCookies {
    inner: Mutex<RequestCookiesInner>,
}

impl RequestCookies {
    /// Seed from the request's `Cookie` header (if any).
    pub fn from_header(header: Option<&str>) -> Self {
        let mut values = HashMap::new();
        if let Some(header) = header {
            for part in header.split(';') {
                if let Some((key, value)) = part.trim().split_once('=') {
                    values.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }
        Self {
            inner: Mutex::new(RequestCookiesInner {
                values,
                set_cookies: Vec::new(),
            }),
        }
    }

    /// `Set-Cookie` header values to attach to the response, in write order.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.set_cookies.clone())
            .unwrap_or_default()
    }
}

impl CookieJar for RequestCookies {
    fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
        Ok(lock(&self.inner)?.values.get(name).cloned())
    }

    fn set(&self, cookie: Cookie) -> Result<(), SessionError> {
        let mut inner = lock(&self.inner)?;
        inner.set_cookies.push(cookie.to_header_value());
        inner.values.insert(cookie.name, cookie.value);
        Ok(())
    }

    fn remove(&self, name: &str, secure: bool) -> Result<(), SessionError> {
        let mut inner = lock(&self.inner)?;
        inner.values.remove(name);
        inner
            .set_cookies
            .push(Cookie::removal(name, secure).to_header_value());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_attributes() {
        let cookie = Cookie {
            max_age_secs: 604800,
            secure: true,
            ..Cookie::new("jp_session", "abc.def")
        };
        let header = cookie.to_header_value();
        assert!(header.starts_with("jp_session=abc.def; Path=/; Max-Age=604800; Expires="));
        assert!(header.ends_with("GMT; HttpOnly; Secure; SameSite=Lax"));
    }

    #[test]
    fn test_removal_cookie_expires_now() {
        let header = Cookie::removal("jp_session", false).to_header_value();
        assert!(header.starts_with("jp_session=; Path=/; Max-Age=0"));
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn test_parse_cookie_header() {
        let header = "foo=bar;  jp_session = abc.def ; x=y";
        assert_eq!(parse_cookie_header(header, "jp_session"), Some("abc.def"));
        assert_eq!(parse_cookie_header(header, "foo"), Some("bar"));
        assert_eq!(parse_cookie_header(header, "missing"), None);
    }

    #[test]
    fn test_memory_jar_replace_and_remove() {
        let jar = MemoryCookieJar::new();
        jar.set(Cookie::new("a", "1")).unwrap();
        jar.set(Cookie::new("a", "2")).unwrap();
        assert_eq!(jar.get("a").unwrap().as_deref(), Some("2"));

        jar.remove("a", false).unwrap();
        assert_eq!(jar.get("a").unwrap(), None);
        // Removing again is fine
        jar.remove("a", false).unwrap();
    }

    #[test]
    fn test_request_cookies_reads_own_writes() {
        let jar = RequestCookies::from_header(Some("jp_session=old; theme=dark"));
        assert_eq!(jar.get("jp_session").unwrap().as_deref(), Some("old"));

        jar.set(Cookie::new("jp_session", "new")).unwrap();
        assert_eq!(jar.get("jp_session").unwrap().as_deref(), Some("new"));

        jar.remove("jp_session", true).unwrap();
        assert_eq!(jar.get("jp_session").unwrap(), None);
        assert_eq!(jar.get("theme").unwrap().as_deref(), Some("dark"));

        let headers = jar.set_cookie_headers();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].starts_with("jp_session=new;"));
        assert!(headers[1].starts_with("jp_session=; Path=/; Max-Age=0"));
        assert!(headers[1].contains("; Secure"));
    }

    #[test]
    fn test_request_cookies_without_header() {
        let jar = RequestCookies::from_header(None);
        assert_eq!(jar.get("jp_session").unwrap(), None);
        assert!(jar.set_cookie_headers().is_empty());
    }
}
