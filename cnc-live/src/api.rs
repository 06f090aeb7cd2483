/**
 * BACKEND CLIENT - Chargements REST one-shot
 *
 * RÔLE : Catalogue des machines (seed du registry), rapport journalier,
 * authentification et historique. Aucun retry, aucun cache : chaque appel
 * remplace le résultat précédent côté appelant.
 *
 * FONCTIONNEMENT :
 * - le token de session (opaque) part en query param `token` quand il existe
 * - l'identifiant machine est encodé comme un seul segment de chemin
 * - catalogue -> enregistrements de base (statut seul, télémétrie à zéro)
 */

use crate::codec::{parse_timestamp, state_code};
use crate::error::{AuthError, LoadError};
use crate::models::{
    CatalogEntry, JobRun, LoginRequest, LoginResponse, MachineRecord, MachineStatus, ReportEntry, StateSpan,
    TelemetryPoint, User,
};
use crate::status::map_state_to_status;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cnc-live/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("[api] client builder failed ({e}), using defaults");
                reqwest::Client::new()
            });
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), token: None }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.query(&[("token", token.as_str())]),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, String> {
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("backend answered {status}"));
        }
        response.json::<T>().await.map_err(|e| format!("invalid payload: {e}"))
    }

    /// `GET /machines` -> enregistrements de base
    pub async fn load_catalog(&self) -> Result<Vec<MachineRecord>, LoadError> {
        let entries: Vec<CatalogEntry> = self
            .fetch(self.get("/machines"))
            .await
            .map_err(LoadError::CatalogUnavailable)?;
        info!("[api] catalog loaded: {} machines", entries.len());
        Ok(baseline_from_catalog(entries, OffsetDateTime::now_utc()))
    }

    /// `GET /reports/daily`, remplacé en bloc à chaque appel
    pub async fn load_daily_report(&self) -> Result<Vec<ReportEntry>, LoadError> {
        let entries: Vec<ReportEntry> = self
            .fetch(self.get("/reports/daily"))
            .await
            .map_err(LoadError::ReportUnavailable)?;
        debug!("[api] daily report: {} rows", entries.len());
        Ok(entries)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidCredentials),
            status if !status.is_success() => Err(AuthError::Backend(format!("login answered {status}"))),
            _ => {
                let login: LoginResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Backend(format!("invalid login payload: {e}")))?;
                info!("[api] logged in as {} ({:?})", login.user.email, login.user.role);
                Ok(login)
            }
        }
    }

    /// Révocation côté serveur, au mieux : une erreur est seulement journalisée
    pub async fn logout(&self, token: &str) {
        let result = self
            .http
            .post(format!("{}/auth/logout", self.base_url))
            .query(&[("token", token)])
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => debug!("[api] token revoked"),
            Ok(response) => warn!("[api] logout answered {}", response.status()),
            Err(e) => warn!("[api] logout failed: {e}"),
        }
    }

    pub async fn me(&self, token: &str) -> Result<User, AuthError> {
        let response = self
            .http
            .get(format!("{}/auth/me", self.base_url))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Unauthorized);
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("invalid profile payload: {e}")))
    }

    pub async fn telemetry_history(
        &self,
        machine_id: &str,
        metric: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<TelemetryPoint>, LoadError> {
        let request = self
            .get(&format!("/machines/{}/telemetry", urlencoding::encode(machine_id)))
            .query(&[("metric", metric), ("from", from), ("to", to)]);
        self.fetch(request).await.map_err(LoadError::HistoryUnavailable)
    }

    pub async fn state_timeline(&self, machine_id: &str, from: &str, to: &str) -> Result<Vec<StateSpan>, LoadError> {
        let request = self
            .get(&format!("/machines/{}/state-timeline", urlencoding::encode(machine_id)))
            .query(&[("from", from), ("to", to)]);
        self.fetch(request).await.map_err(LoadError::HistoryUnavailable)
    }

    pub async fn job_history(&self, machine_id: &str, from: &str, to: &str) -> Result<Vec<JobRun>, LoadError> {
        let request = self
            .get(&format!("/machines/{}/jobs", urlencoding::encode(machine_id)))
            .query(&[("from", from), ("to", to)]);
        self.fetch(request).await.map_err(LoadError::HistoryUnavailable)
    }
}

/// Catalogue -> enregistrements de base.
///
/// `last_seen` absent ou illisible : `now` pour l'affichage, aucune référence
/// d'ordre pour les messages live. Code d'état illisible : IDLE.
pub fn baseline_from_catalog(entries: Vec<CatalogEntry>, now: OffsetDateTime) -> Vec<MachineRecord> {
    entries
        .into_iter()
        .filter(|entry| !entry.machine_id.is_empty())
        .map(|entry| {
            let status = state_code(&entry.current_state)
                .map(map_state_to_status)
                .unwrap_or(MachineStatus::Idle);
            let last_seen = entry
                .last_seen
                .as_deref()
                .and_then(|raw| parse_timestamp(raw).ok());
            let mut record = MachineRecord::baseline(entry.machine_id, status, last_seen.unwrap_or(now));
            record.last_message_at = last_seen;
            record
        })
        .collect()
}

/// Statut affichable d'un segment de timeline
pub fn span_status(span: &StateSpan) -> MachineStatus {
    state_code(&span.state).map(map_state_to_status).unwrap_or(MachineStatus::Idle)
}
