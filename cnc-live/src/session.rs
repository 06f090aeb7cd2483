//! Session opérateur : token opaque persisté dans un fichier texte.
//!
//! Le logout efface le token et vide le registry, seule destruction possible
//! des enregistrements machine.

use crate::api::BackendClient;
use crate::error::{AuthError, SessionError};
use crate::models::User;
use crate::registry::SharedRegistry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<String, SessionError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                if token.is_empty() { Err(SessionError::NoToken) } else { Ok(token.to_string()) }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SessionError::NoToken),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, token).await?;
        debug!("[session] token saved to {}", self.path.display());
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct Session {
    store: TokenStore,
    registry: SharedRegistry,
}

impl Session {
    pub fn new(store: TokenStore, registry: SharedRegistry) -> Self {
        Self { store, registry }
    }

    pub async fn token(&self) -> Option<String> {
        self.store.load().await.ok()
    }

    pub async fn login(&self, client: &BackendClient, email: &str, password: &str) -> anyhow::Result<User> {
        let login = client.login(email, password).await?;
        self.store.save(&login.token).await?;
        Ok(login.user)
    }

    pub async fn whoami(&self, client: &BackendClient) -> Result<User, AuthError> {
        let token = self.token().await.ok_or(AuthError::Unauthorized)?;
        client.me(&token).await
    }

    /// Révocation serveur au mieux, puis effacement local et reset du registry
    pub async fn logout(&self, client: &BackendClient) -> Result<(), SessionError> {
        if let Some(token) = self.token().await {
            client.logout(&token).await;
        }
        self.store.clear().await?;
        self.registry.reset();
        info!("[session] logged out, registry cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MachineRecord, MachineStatus};
    use std::time::Duration;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_token_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token"));

        assert!(matches!(store.load().await, Err(SessionError::NoToken)));
        store.save("abc123\n").await.unwrap();
        assert_eq!(store.load().await.unwrap(), "abc123");

        store.clear().await.unwrap();
        assert!(matches!(store.load().await, Err(SessionError::NoToken)));
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_resets_registry_even_offline() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token"));
        store.save("tok").await.unwrap();

        let registry = SharedRegistry::default();
        registry.seed(vec![MachineRecord::baseline("M1", MachineStatus::Idle, OffsetDateTime::now_utc())]);

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = BackendClient::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(1));

        let session = Session::new(store.clone(), registry.clone());
        session.logout(&client).await.unwrap();
        assert!(registry.is_empty());
        assert!(session.token().await.is_none());
    }
}
