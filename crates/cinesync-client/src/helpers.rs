use cinesync_common::{Error, Result, SettingsStore};
use url::Url;

/// Validates and canonicalizes media locators before they reach the server.
pub trait UrlNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> Result<String>;
}

/// Accepts http(s) URLs with a host; bare hosts get `https://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpUrlNormalizer;

impl UrlNormalizer for HttpUrlNormalizer {
    fn normalize(&self, raw: &str) -> Result<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("media URL is empty"));
        }
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        let parsed = Url::parse(&candidate)
            .map_err(|e| Error::validation(format!("invalid media URL '{}': {}", trimmed, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::validation(format!(
                    "unsupported URL scheme '{}'",
                    other
                )))
            }
        }
        if !matches!(parsed.host_str(), Some(host) if !host.is_empty()) {
            return Err(Error::validation("media URL has no host"));
        }
        Ok(parsed.to_string())
    }
}

/// Durable record of the user's consent decisions.
pub trait ConsentStore: Send + Sync {
    fn record_consent(&self, url: &str) -> Result<()>;
}

impl ConsentStore for SettingsStore {
    fn record_consent(&self, url: &str) -> Result<()> {
        self.update(|s| {
            s.consent_granted = true;
            s.last_consented_url = Some(url.to_string());
        })
    }
}

/// Store that forgets everything; for embedders without persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryConsentStore;

impl ConsentStore for MemoryConsentStore {
    fn record_consent(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_http_urls() {
        let n = HttpUrlNormalizer;
        assert_eq!(
            n.normalize("  https://video.example/watch?v=1 ").unwrap(),
            "https://video.example/watch?v=1"
        );
        assert_eq!(
            n.normalize("video.example/clip").unwrap(),
            "https://video.example/clip"
        );
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        let n = HttpUrlNormalizer;
        assert!(matches!(n.normalize(""), Err(Error::Validation(_))));
        assert!(matches!(
            n.normalize("ftp://files.example/a.mp4"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(n.normalize("https://"), Err(Error::Validation(_))));
    }
}
