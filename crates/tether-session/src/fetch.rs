use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Source of remote credential blobs.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Download the raw blob named by `reference`.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP(S) download of a credential blob.
///
/// A reference is either a full `http(s)://` URL or a bare id appended to
/// the configured base URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            timeout,
        }
    }

    fn resolve_url(&self, reference: &str) -> Result<String> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(reference.to_string());
        }
        match self.base_url {
            Some(ref base) => Ok(format!("{}/{}", base, reference.trim_start_matches('/'))),
            None => Err(SessionError::FatalConfig(
                "remote session reference is not a URL and no remote_base_url is set".into(),
            )),
        }
    }
}

#[async_trait]
impl CredentialFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let url = self.resolve_url(reference)?;
        info!("downloading session credentials");
        debug!(%url, "credential download url");

        let download = async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SessionError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(SessionError::Network(format!("HTTP {status}")));
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SessionError::Network(e.to_string()))?;
            Ok(bytes.to_vec())
        };

        tokio::time::timeout(self.timeout, download)
            .await
            .map_err(|_| SessionError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_used_verbatim() {
        let f = HttpFetcher::new(Some("https://files.example".into()), Duration::from_secs(1));
        assert_eq!(
            f.resolve_url("https://other.example/creds.json").unwrap(),
            "https://other.example/creds.json"
        );
    }

    #[test]
    fn bare_id_joined_to_base() {
        let f = HttpFetcher::new(Some("https://files.example/s/".into()), Duration::from_secs(1));
        assert_eq!(f.resolve_url("abc123").unwrap(), "https://files.example/s/abc123");
    }

    #[test]
    fn bare_id_without_base_is_fatal() {
        let f = HttpFetcher::new(None, Duration::from_secs(1));
        assert!(matches!(
            f.resolve_url("abc123"),
            Err(SessionError::FatalConfig(_))
        ));
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the socket open without ever answering.
        let server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let f = HttpFetcher::new(None, Duration::from_millis(200));
        let err = f.fetch(&format!("http://{addr}/creds.json")).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let f = HttpFetcher::new(None, Duration::from_secs(5));
        let err = f.fetch(&format!("http://{addr}/creds.json")).await.unwrap_err();
        assert!(matches!(err, SessionError::Network(_)));
    }
}
