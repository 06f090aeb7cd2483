//! Taxonomie d'erreurs du coeur live.
//!
//! Aucune de ces erreurs n'est fatale au processus : `TransportError` déclenche
//! la reconnexion, `DecodeError` fait tomber un seul message, `LoadError` et
//! `AuthError` dégradent une seule vue.

/// Erreurs niveau transport du canal live
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport io error: {0}")]
    Io(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("connection closed by peer")]
    Closed,
}

/// Message entrant mal formé : rejeté, connexion intacte
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Chargements one-shot (catalogue, rapport, historique), sans retry intégré
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("machine catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("report unavailable: {0}")]
    ReportUnavailable(String),
    #[error("history unavailable: {0}")]
    HistoryUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("auth backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no stored token")]
    NoToken,
    #[error("token store io error: {0}")]
    Io(#[from] std::io::Error),
}
