/**
 * MODELS - Types du domaine machine CNC et formats d'échange backend
 *
 * RÔLE : MachineRecord (état local complet d'une machine), PartialUpdate
 * (delta décodé depuis le canal live), et les payloads REST
 * (catalogue, rapport, auth, historique).
 *
 * INVARIANT : un MachineRecord a toujours tous ses champs télémétrie définis
 * (zéro à la création) ; un PartialUpdate ne porte que ce qui a été reçu.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub const JOB_PLACEHOLDER: &str = "N/A";
pub const OPERATOR_PLACEHOLDER: &str = "Unknown";

/// Statut opérationnel grossier, toujours dérivé d'un code machine brut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Running,
    Idle,
    Fault,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Running => "RUNNING",
            MachineStatus::Idle => "IDLE",
            MachineStatus::Fault => "FAULT",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub spindle_speed: f64,
    pub feed_rate: f64,
    pub load: f64,
    pub temperature: f64,
    /// secondes écoulées
    pub runtime: f64,
    pub axis_position: AxisPosition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub part_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: String,
    pub name: String,
    pub status: MachineStatus,
    pub telemetry: Telemetry,
    pub business: Business,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    /// Horodatage backend du dernier message appliqué (ou `last_seen` du catalogue) ;
    /// seule référence pour détecter un delta hors d'ordre
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    pub job_no: String,
    pub operator: String,
}

impl MachineRecord {
    /// Enregistrement de base : statut seul, télémétrie à zéro
    pub fn baseline(id: impl Into<String>, status: MachineStatus, last_update: OffsetDateTime) -> Self {
        let id = id.into();
        Self {
            name: format!("CNC Machine {id}"),
            id,
            status,
            telemetry: Telemetry::default(),
            business: Business::default(),
            last_update,
            last_message_at: None,
            job_no: JOB_PLACEHOLDER.to_string(),
            operator: OPERATOR_PLACEHOLDER.to_string(),
        }
    }
}

/// Champs télémétrie optionnels d'un delta, chacun indépendant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryDelta {
    pub spindle_speed: Option<f64>,
    pub feed_rate: Option<f64>,
    pub load: Option<f64>,
    pub temperature: Option<f64>,
    pub runtime: Option<f64>,
    pub axis_x: Option<f64>,
    pub axis_y: Option<f64>,
    pub axis_z: Option<f64>,
}

impl TelemetryDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusinessDelta {
    pub part_count: Option<u64>,
}

/// Delta structurellement accepté, prêt pour la réconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    pub machine_id: String,
    pub state_code: Option<i64>,
    pub timestamp: OffsetDateTime,
    pub telemetry: TelemetryDelta,
    pub business: BusinessDelta,
    pub job_no: Option<String>,
}

impl PartialUpdate {
    /// Delta vide : ne touche que lastUpdate
    pub fn empty(machine_id: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            machine_id: machine_id.into(),
            state_code: None,
            timestamp,
            telemetry: TelemetryDelta::default(),
            business: BusinessDelta::default(),
            job_no: None,
        }
    }
}

// --- REST payloads ---------------------------------------------------------

/// Entrée du catalogue `GET /machines`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub machine_id: String,
    #[serde(default)]
    pub current_state: serde_json::Value,
    #[serde(default)]
    pub last_seen: Option<String>,
}

/// Ligne du rapport `GET /reports/daily`, lecture seule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub machine_id: String,
    pub runtime_sec: f64,
    pub part_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Owner,
    Manager,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub post: String,
    pub identity_number: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

// --- Historique ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub ts: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpan {
    pub state: serde_json::Value,
    pub start: String,
    pub end: String,
    pub duration_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: serde_json::Value,
    pub start: String,
    pub end: String,
    pub duration_sec: i64,
}
