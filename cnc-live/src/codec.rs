/**
 * CODEC LIVE - Frontière de décodage des messages WebSocket
 *
 * RÔLE : Transforme une trame JSON texte en PartialUpdate.
 *
 * FONCTIONNEMENT :
 * - machine_id et timestamp sont obligatoires, sinon DecodeError (message rejeté)
 * - current_state accepte un entier ou un flottant entier (la base time-series émet des floats)
 * - chaque champ télémétrie mal formé est exclu individuellement, le reste du message passe
 * - current_job : texte ou nombre, vide/null = non fourni
 */

use crate::error::DecodeError;
use crate::models::{BusinessDelta, PartialUpdate, TelemetryDelta};
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Format filaire tel qu'émis par le backend, tous champs tolérants
#[derive(Debug, Deserialize)]
struct LiveMessage {
    #[serde(default)]
    machine_id: Value,
    #[serde(default)]
    current_state: Value,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    telemetry: Value,
    #[serde(default)]
    business: Value,
    #[serde(default)]
    current_job: Value,
}

/// Décode une trame live complète
pub fn decode_live_message(raw: &str) -> Result<PartialUpdate, DecodeError> {
    let msg: LiveMessage = serde_json::from_str(raw)?;

    let machine_id = match msg.machine_id.as_str() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => return Err(DecodeError::MissingField("machine_id")),
    };
    let timestamp = match msg.timestamp.as_str() {
        Some(ts) => parse_timestamp(ts)?,
        None => return Err(DecodeError::MissingField("timestamp")),
    };

    Ok(PartialUpdate {
        machine_id,
        state_code: state_code(&msg.current_state),
        timestamp,
        telemetry: decode_telemetry(&msg.telemetry),
        business: BusinessDelta {
            part_count: msg.business.get("part_count").and_then(counter),
        },
        job_no: job_id(&msg.current_job),
    })
}

fn decode_telemetry(value: &Value) -> TelemetryDelta {
    let field = |name: &str| value.get(name).and_then(number);
    TelemetryDelta {
        spindle_speed: field("spindle_speed"),
        feed_rate: field("feed_rate"),
        load: field("load"),
        temperature: field("temperature"),
        runtime: field("runtime"),
        axis_x: field("axis_x"),
        axis_y: field("axis_y"),
        axis_z: field("axis_z"),
    }
}

/// Nombre fini, sinon exclu
pub fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Code d'état machine : entier ou flottant à partie fractionnaire nulle
pub fn state_code(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    let v = value.as_f64()?;
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Compteur non négatif
pub fn counter(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let v = value.as_f64()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

/// Identifiant de job lisible ; vide ou null = absent
pub fn job_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339 / ISO-8601 ; sans offset, l'heure est lue en UTC
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, DecodeError> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Ok(ts);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_string()))
}
