use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tether_core::config::SessionConfig;
use tether_core::Credentials;
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::fetch::{CredentialFetcher, HttpFetcher};

/// File name of the credential blob inside the session directory.
pub const CREDS_FILE: &str = "creds.json";

/// Local credential store with remote bootstrap.
pub struct SessionStore {
    dir: PathBuf,
    required_keys: Vec<String>,
    fetcher: Arc<dyn CredentialFetcher>,
    /// Serializes writers; credential updates arrive back to back on reconnect.
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        required_keys: Vec<String>,
        fetcher: Arc<dyn CredentialFetcher>,
    ) -> Self {
        Self {
            dir: dir.into(),
            required_keys,
            fetcher,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a store backed by [`HttpFetcher`] from the `[session]` config section.
    pub fn from_config(config: &SessionConfig) -> Self {
        let fetcher = HttpFetcher::new(
            config.remote_base_url.clone(),
            Duration::from_secs(config.download_timeout_secs),
        );
        Self::new(&config.dir, config.required_keys.clone(), Arc::new(fetcher))
    }

    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// `true` only when a credential file is present and passes validation.
    pub fn exists(&self) -> bool {
        self.load().is_ok()
    }

    /// Read and validate the local credential file. Blocking; async callers go
    /// through [`bootstrap`](Self::bootstrap).
    pub fn load(&self) -> Result<Credentials> {
        let bytes = std::fs::read(self.creds_path())?;
        self.validate(&bytes)
    }

    async fn load_async(&self) -> Result<Credentials> {
        let bytes = tokio::fs::read(self.creds_path()).await?;
        self.validate(&bytes)
    }

    /// Fetch a remote credential blob without validating or persisting it.
    pub async fn download_remote(&self, reference: &str) -> Result<Vec<u8>> {
        self.fetcher.fetch(reference).await
    }

    /// Produce usable credentials: local file first, then the remote reference.
    ///
    /// A downloaded blob is validated before anything touches the disk.
    pub async fn bootstrap(&self, reference: Option<&str>) -> Result<Credentials> {
        let path = self.creds_path();
        match self.load_async().await {
            Ok(creds) => {
                info!(path = %path.display(), registered = creds.is_registered(), "session file found");
                return Ok(creds);
            }
            Err(SessionError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "local session unusable, ignoring it");
            }
        }

        let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
            return Err(SessionError::FatalConfig(
                "no local session and no remote session reference configured".into(),
            ));
        };

        let bytes = self.download_remote(reference).await?;
        let creds = self.validate(&bytes)?;
        self.save(&creds).await?;
        info!(path = %path.display(), "session restored from remote reference");
        Ok(creds)
    }

    /// Write-through persistence of the latest credentials.
    ///
    /// A blob that [`load`](Self::load) would reject fails with `Integrity`
    /// and leaves the current file untouched.
    pub async fn save(&self, creds: &Credentials) -> Result<()> {
        let bytes = creds
            .to_vec()
            .map_err(|e| SessionError::Integrity(e.to_string()))?;
        self.validate(&bytes)?;

        let _guard = self.write_lock.lock().await;
        let dir = self.dir.clone();
        let path = self.creds_path();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes))
            .await
            .map_err(|e| SessionError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    /// Remove the local credential file after a terminal logout.
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.creds_path()).await {
            Ok(()) => {
                info!("session credentials invalidated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self, bytes: &[u8]) -> Result<Credentials> {
        Credentials::from_slice(bytes, &self.required_keys)
            .map_err(|e| SessionError::Integrity(e.to_string()))
    }
}

/// Write via a sibling temp file and rename so readers never see a partial blob.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
