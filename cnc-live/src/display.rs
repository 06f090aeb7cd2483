//! Formatage pour l'affichage, sans jamais muter les données sources.

use crate::models::{AxisPosition, MachineRecord, ReportEntry};
use serde::Serialize;

/// `"{h}h {m}m"` (vue détail machine)
pub fn format_runtime(seconds: f64) -> String {
    let total = whole_seconds(seconds);
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

/// `"{h}h {m}m"`, ou `"{m}m"` sous l'heure (vue rapport)
pub fn format_report_runtime(seconds: f64) -> String {
    let total = whole_seconds(seconds);
    let (h, m) = (total / 3600, (total % 3600) / 60);
    if h > 0 { format!("{h}h {m}m") } else { format!("{m}m") }
}

/// Minutes arrondies d'une durée en secondes (valeur de graphe, pas le libellé)
pub fn runtime_minutes(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 { (seconds / 60.0).round() as u64 } else { 0 }
}

fn whole_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 }
}

pub fn format_axis(axis: &AxisPosition) -> String {
    format!("X {:.3}  Y {:.3}  Z {:.3}", axis.x, axis.y, axis.z)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub machine_id: String,
    pub runtime_label: String,
    pub runtime_minutes: u64,
    pub part_count: u64,
}

impl From<&ReportEntry> for ReportRow {
    fn from(entry: &ReportEntry) -> Self {
        Self {
            machine_id: entry.machine_id.clone(),
            runtime_label: format_report_runtime(entry.runtime_sec),
            runtime_minutes: runtime_minutes(entry.runtime_sec),
            part_count: entry.part_count,
        }
    }
}

/// Ligne résumée d'une machine
pub fn machine_line(record: &MachineRecord) -> String {
    format!(
        "{:<8} {:<7} job {:<8} parts {:<6} spindle {:>7.0} rpm  feed {:>6.0}  load {:>5.1}%  temp {:>5.1}°C  runtime {}  [{}]",
        record.id,
        record.status.as_str(),
        record.job_no,
        record.business.part_count,
        record.telemetry.spindle_speed,
        record.telemetry.feed_rate,
        record.telemetry.load,
        record.telemetry.temperature,
        format_runtime(record.telemetry.runtime),
        format_axis(&record.telemetry.axis_position),
    )
}
