/*!
Helpers pour créer des messages de test au format du backend CNC

Trames live (`/ws/machines/{id}`), entrées de catalogue, lignes de rapport,
profils utilisateur et historique.
*/

use serde_json::{json, Map, Value};

/// Trame live construite champ par champ ; seuls les champs posés sont émis
#[derive(Debug, Clone)]
pub struct LiveMessageBuilder {
    machine_id: String,
    current_state: Option<Value>,
    timestamp: String,
    telemetry: Map<String, Value>,
    business: Map<String, Value>,
    current_job: Option<Value>,
}

impl LiveMessageBuilder {
    pub fn new<S: Into<String>>(machine_id: S) -> Self {
        Self {
            machine_id: machine_id.into(),
            current_state: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            telemetry: Map::new(),
            business: Map::new(),
            current_job: None,
        }
    }

    pub fn state(mut self, code: i64) -> Self {
        self.current_state = Some(json!(code));
        self
    }

    /// Code d'état brut, tel que l'émet la base time-series (ex: `1.0`)
    pub fn raw_state(mut self, value: Value) -> Self {
        self.current_state = Some(value);
        self
    }

    pub fn timestamp<S: Into<String>>(mut self, ts: S) -> Self {
        self.timestamp = ts.into();
        self
    }

    pub fn at(mut self, ts: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = ts.to_rfc3339();
        self
    }

    pub fn telemetry<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.telemetry.insert(field.to_string(), value.into());
        self
    }

    pub fn spindle_speed(self, rpm: f64) -> Self {
        self.telemetry("spindle_speed", rpm)
    }

    pub fn feed_rate(self, rate: f64) -> Self {
        self.telemetry("feed_rate", rate)
    }

    pub fn load(self, pct: f64) -> Self {
        self.telemetry("load", pct)
    }

    pub fn temperature(self, celsius: f64) -> Self {
        self.telemetry("temperature", celsius)
    }

    pub fn runtime(self, seconds: f64) -> Self {
        self.telemetry("runtime", seconds)
    }

    pub fn axis(self, x: f64, y: f64, z: f64) -> Self {
        self.telemetry("axis_x", x).telemetry("axis_y", y).telemetry("axis_z", z)
    }

    pub fn part_count(mut self, count: u64) -> Self {
        self.business.insert("part_count".into(), json!(count));
        self
    }

    pub fn job<V: Into<Value>>(mut self, job: V) -> Self {
        self.current_job = Some(job.into());
        self
    }

    pub fn build(self) -> Value {
        let mut msg = Map::new();
        msg.insert("machine_id".into(), json!(self.machine_id));
        if let Some(state) = self.current_state {
            msg.insert("current_state".into(), state);
        }
        msg.insert("timestamp".into(), json!(self.timestamp));
        if !self.telemetry.is_empty() {
            msg.insert("telemetry".into(), Value::Object(self.telemetry));
        }
        if !self.business.is_empty() {
            msg.insert("business".into(), Value::Object(self.business));
        }
        if let Some(job) = self.current_job {
            msg.insert("current_job".into(), job);
        }
        Value::Object(msg)
    }

    /// Trame texte prête à pousser sur un transport
    pub fn frame(self) -> String {
        self.build().to_string()
    }
}

/// Entrée `GET /machines`
pub fn catalog_entry<S: Into<String>>(machine_id: S, state: i64, last_seen: Option<&str>) -> Value {
    json!({
        "machine_id": machine_id.into(),
        "current_state": state,
        "last_seen": last_seen,
    })
}

/// Ligne `GET /reports/daily`
pub fn report_entry<S: Into<String>>(machine_id: S, runtime_sec: f64, part_count: u64) -> Value {
    json!({
        "machine_id": machine_id.into(),
        "runtime_sec": runtime_sec,
        "part_count": part_count,
    })
}

/// Profil `GET /auth/me`
pub fn user_profile(email: &str, role: &str) -> Value {
    json!({
        "id": format!("u-{}", email.split('@').next().unwrap_or(email)),
        "email": email,
        "name": "Test Operator",
        "role": role,
        "post": "Shift A",
        "identity_number": "ID-0001",
        "photo_url": null,
    })
}

pub fn telemetry_point(ts: &str, value: f64) -> Value {
    json!({ "ts": ts, "value": value })
}

pub fn state_span(state: i64, start: &str, end: &str, duration_sec: i64) -> Value {
    json!({ "state": state, "start": start, "end": end, "duration_sec": duration_sec })
}

pub fn job_run(job_id: i64, start: &str, end: &str, duration_sec: i64) -> Value {
    json!({ "job_id": job_id, "start": start, "end": end, "duration_sec": duration_sec })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnc_live::codec::decode_live_message;

    #[test]
    fn test_only_set_fields_are_emitted() {
        let msg = LiveMessageBuilder::new("M1")
            .state(2)
            .timestamp("2024-01-01T00:00:00Z")
            .temperature(61.0)
            .build();
        assert_eq!(msg["machine_id"], "M1");
        assert_eq!(msg["current_state"], 2);
        assert_eq!(msg["telemetry"]["temperature"], 61.0);
        assert!(msg["telemetry"].get("spindle_speed").is_none());
        assert!(msg.get("business").is_none());
        assert!(msg.get("current_job").is_none());
    }

    #[test]
    fn test_frames_decode() {
        let frame = LiveMessageBuilder::new("M7")
            .raw_state(json!(1.0))
            .axis(1.0, 2.0, 3.0)
            .part_count(12)
            .job(103)
            .frame();
        let update = decode_live_message(&frame).unwrap();
        assert_eq!(update.machine_id, "M7");
        assert_eq!(update.state_code, Some(1));
        assert_eq!(update.telemetry.axis_z, Some(3.0));
        assert_eq!(update.business.part_count, Some(12));
        assert_eq!(update.job_no.as_deref(), Some("103"));
    }

    #[test]
    fn test_fixtures_deserialize() {
        let user: cnc_live::models::User = serde_json::from_value(user_profile("ana@plant.io", "MANAGER")).unwrap();
        assert_eq!(user.role, cnc_live::models::UserRole::Manager);
        assert!(user.photo_url.is_none());

        let entry: cnc_live::models::CatalogEntry = serde_json::from_value(catalog_entry("M1", 1, None)).unwrap();
        assert!(entry.last_seen.is_none());

        let span: cnc_live::models::StateSpan = serde_json::from_value(state_span(2, "a", "b", 30)).unwrap();
        assert_eq!(span.duration_sec, 30);
    }
}
