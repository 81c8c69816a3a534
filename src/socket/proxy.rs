//! Proxy selection.

use super::matcher::ProxyMatcher;
use crate::base::neterror::NetError;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Picks the proxy, if any, for a destination.
///
/// Errors are tolerated by callers: a failing resolver means "go direct".
pub trait ProxyResolve: Send + Sync {
    fn proxy_for(&self, target: &Url) -> Result<Option<Url>, NetError>;
}

impl<P: ProxyResolve + ?Sized> ProxyResolve for Arc<P> {
    fn proxy_for(&self, target: &Url) -> Result<Option<Url>, NetError> {
        (**self).proxy_for(target)
    }
}

impl fmt::Debug for dyn ProxyResolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProxyResolve")
    }
}

/// Fixed proxies per scheme plus NO_PROXY bypass rules.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub http: Option<Url>,
    pub https: Option<Url>,
    bypass: ProxyMatcher,
}

impl ProxySettings {
    /// Uses one proxy for both schemes.
    pub fn new(proxy: &str) -> Result<Self, NetError> {
        let url = Url::parse(proxy).map_err(|_| NetError::InvalidUrl)?;
        Ok(Self { http: Some(url.clone()), https: Some(url), bypass: ProxyMatcher::default() })
    }

    /// Reads `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` (either case).
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let read = |upper: &str, lower: &str| {
            std::env::var(upper)
                .or_else(|_| std::env::var(lower))
                .ok()
                .filter(|v| !v.is_empty())
                .and_then(|v| Url::parse(&v).ok())
        };
        Self {
            http: read("HTTP_PROXY", "http_proxy"),
            https: read("HTTPS_PROXY", "https_proxy"),
            bypass: ProxyMatcher::from_env(),
        }
    }

    pub fn with_bypass(mut self, no_proxy: &str) -> Self {
        self.bypass = ProxyMatcher::parse(no_proxy);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.http.is_some() || self.https.is_some()
    }
}

impl ProxyResolve for ProxySettings {
    fn proxy_for(&self, target: &Url) -> Result<Option<Url>, NetError> {
        if self.bypass.bypasses_url(target) {
            return Ok(None);
        }
        Ok(match target.scheme() {
            "http" => self.http.clone(),
            "https" => self.https.clone(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_proxy_for_both_schemes() {
        let settings = ProxySettings::new("http://proxy.test:3128").unwrap();
        let http = Url::parse("http://origin.test/").unwrap();
        let https = Url::parse("https://origin.test/").unwrap();
        assert_eq!(settings.proxy_for(&http).unwrap().unwrap().as_str(), "http://proxy.test:3128/");
        assert!(settings.proxy_for(&https).unwrap().is_some());
    }

    #[test]
    fn bypass_list_goes_direct() {
        let settings = ProxySettings::new("http://proxy.test:3128")
            .unwrap()
            .with_bypass("localhost, .internal.test");
        let local = Url::parse("http://localhost:8080/").unwrap();
        let internal = Url::parse("http://svc.internal.test/").unwrap();
        let external = Url::parse("http://example.com/").unwrap();
        assert!(settings.proxy_for(&local).unwrap().is_none());
        assert!(settings.proxy_for(&internal).unwrap().is_none());
        assert!(settings.proxy_for(&external).unwrap().is_some());
    }

    #[test]
    fn bad_proxy_url() {
        assert!(matches!(ProxySettings::new("not a url"), Err(NetError::InvalidUrl)));
    }

    #[test]
    fn default_has_no_proxy() {
        let settings = ProxySettings::default();
        assert!(!settings.is_configured());
        let target = Url::parse("http://example.com/").unwrap();
        assert!(settings.proxy_for(&target).unwrap().is_none());
    }
}
