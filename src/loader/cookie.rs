//! Cookie storage (spec §4.3 "Stubber cookie integration", §1 scopes out "cookie
//! storage implementation" as an external collaborator concern — this module
//! ships the one default implementation a usable library needs).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// Host-pluggable cookie jar contract.
#[async_trait]
pub trait CookieStorage: Send + Sync {
    async fn cookies_for(&self, host: &str) -> Vec<String>;
    async fn store(&self, host: &str, set_cookie_headers: &[String]);
}

/// A process-local, in-memory cookie jar keyed by host. No expiry, domain-matching
/// or `Secure`/`SameSite` policy enforcement — just enough to round-trip
/// `Set-Cookie` back into `Cookie` on the next request to the same host.
#[derive(Default)]
pub struct InMemoryCookieJar {
    by_host: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CookieStorage for InMemoryCookieJar {
    async fn cookies_for(&self, host: &str) -> Vec<String> {
        self.by_host
            .lock()
            .expect("cookie jar mutex poisoned")
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    async fn store(&self, host: &str, set_cookie_headers: &[String]) {
        let mut guard = self.by_host.lock().expect("cookie jar mutex poisoned");
        let entry = guard.entry(host.to_string()).or_default();
        for header in set_cookie_headers {
            let name_value = header.split(';').next().unwrap_or(header).trim().to_string();
            if let Some(existing) = entry.iter_mut().find(|c| {
                c.split('=').next() == name_value.split('=').next()
            }) {
                *existing = name_value;
            } else {
                entry.push(name_value);
            }
        }
    }
}
