/*!
Test Harness pour le canal live CNC

Facilite l'écriture de tests avec:
- Registry + health + MockTransport + LiveController déjà câblés
- Attente de conditions sur le statut de connexion et le registry
- Injection de trames via le LiveMessageBuilder
*/

use crate::message_builder::LiveMessageBuilder;
use crate::mock_transport::MockTransport;
use anyhow::Result;
use cnc_live::health::LinkHealth;
use cnc_live::link::{LinkStatus, RECONNECT_DELAY};
use cnc_live::models::{MachineRecord, MachineStatus};
use cnc_live::{LiveController, SharedRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Délai max d'attente d'une condition (temps virtuel sous `start_paused`)
const WAIT_LIMIT: Duration = Duration::from_secs(60);

pub struct TestHarness {
    pub transport: MockTransport,
    pub registry: SharedRegistry,
    pub health: LinkHealth,
    pub controller: LiveController,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_delay(RECONNECT_DELAY)
    }

    pub fn with_delay(reconnect_delay: Duration) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let transport = MockTransport::new();
        let registry = SharedRegistry::default();
        let health = LinkHealth::new();
        let controller = LiveController::new(
            Arc::new(transport.clone()),
            registry.clone(),
            health.clone(),
            reconnect_delay,
        );
        Self { transport, registry, health, controller }
    }

    /// Seed le registry avec des machines de base, statut donné
    pub fn seed(&self, machines: &[(&str, MachineStatus)]) -> usize {
        let now = time::OffsetDateTime::now_utc();
        self.registry.seed(
            machines
                .iter()
                .map(|(id, status)| MachineRecord::baseline(*id, *status, now)),
        )
    }

    pub fn select(&mut self, machine_id: &str) -> String {
        self.controller.select(machine_id).id().to_string()
    }

    /// Attend un statut de connexion satisfaisant `pred`
    pub async fn wait_for_status(&self, pred: impl FnMut(&LinkStatus) -> bool) -> Result<LinkStatus> {
        let mut rx = self.controller.status();
        let status = timeout(WAIT_LIMIT, rx.wait_for(pred))
            .await
            .map_err(|_| anyhow::anyhow!("Timeout waiting for link status"))?
            .map_err(|e| anyhow::anyhow!("Status channel closed: {}", e))?
            .clone();
        Ok(status)
    }

    pub async fn wait_connected(&self, machine_id: &str) -> Result<LinkStatus> {
        self.wait_for_status(|s| s.connected && s.machine_id.as_deref() == Some(machine_id)).await
    }

    /// Pousse une trame puis attend qu'elle ait été ingérée (appliquée ou rejetée)
    pub async fn send(&self, machine_id: &str, message: LiveMessageBuilder) -> Result<()> {
        self.send_raw(machine_id, message.frame()).await
    }

    pub async fn send_raw<S: Into<String>>(&self, machine_id: &str, raw: S) -> Result<()> {
        let before = self.ingested();
        self.transport.push(machine_id, raw)?;
        self.wait_until(|h| h.ingested() > before).await
    }

    fn ingested(&self) -> u64 {
        let report = self.health.snapshot(&self.registry);
        report.messages_applied + report.messages_dropped + report.stale_updates
    }

    /// Attend une condition arbitraire sur le harness (sondage toutes les 10ms)
    pub async fn wait_until(&self, mut cond: impl FnMut(&Self) -> bool) -> Result<()> {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while !cond(self) {
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("Timeout waiting for condition");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    pub fn record(&self, machine_id: &str) -> Result<MachineRecord> {
        self.registry
            .snapshot(machine_id)
            .ok_or_else(|| anyhow::anyhow!("Machine not tracked: {}", machine_id))
    }

    pub fn stats(&self) -> TestStats {
        TestStats {
            machines: self.registry.len(),
            dials: self.transport.dials().len(),
            health: serde_json::to_value(self.health.snapshot(&self.registry)).unwrap_or_default(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub machines: usize,
    pub dials: usize,
    pub health: serde_json::Value,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Machines tracked: {}", self.machines);
        println!("  Dials: {}", self.dials);
        println!("  Health: {}", self.health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnc_live::api::baseline_from_catalog;
    use cnc_live::display::{format_runtime, ReportRow};
    use cnc_live::link::LinkState;
    use cnc_live::models::{CatalogEntry, ReportEntry};
    use crate::message_builder::{catalog_entry, report_entry};

    #[tokio::test(start_paused = true)]
    async fn test_catalog_then_live_message() {
        let mut harness = TestHarness::new();
        let entries: Vec<CatalogEntry> = serde_json::from_value(serde_json::json!([catalog_entry("M1", 1, None)])).unwrap();
        harness.registry.seed(baseline_from_catalog(entries, time::OffsetDateTime::now_utc()));
        assert_eq!(harness.record("M1").unwrap().status, MachineStatus::Running);

        harness.select("M1");
        harness.wait_connected("M1").await.unwrap();
        harness
            .send("M1", LiveMessageBuilder::new("M1").state(2).timestamp("2024-01-01T00:00:00Z").temperature(61.0))
            .await
            .unwrap();

        let record = harness.record("M1").unwrap();
        assert_eq!(record.status, MachineStatus::Fault);
        assert_eq!(record.telemetry.temperature, 61.0);
        assert_eq!(record.telemetry.spindle_speed, 0.0);
        assert_eq!(harness.health.snapshot(&harness.registry).stale_updates, 0);
        harness.stats().print();
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_updates_accumulate() {
        let mut harness = TestHarness::new();
        harness.seed(&[("M1", MachineStatus::Idle)]);
        harness.select("M1");
        harness.wait_connected("M1").await.unwrap();

        harness.send("M1", LiveMessageBuilder::new("M1").spindle_speed(4200.0).job("101")).await.unwrap();
        harness.send("M1", LiveMessageBuilder::new("M1").axis(1.0, 2.0, 3.0).part_count(7)).await.unwrap();
        harness.send("M1", LiveMessageBuilder::new("M1").job("")).await.unwrap();
        harness.send_raw("M1", "{not json").await.unwrap();

        let record = harness.record("M1").unwrap();
        assert_eq!(record.telemetry.spindle_speed, 4200.0);
        assert_eq!(record.telemetry.axis_position.z, 3.0);
        assert_eq!(record.business.part_count, 7);
        assert_eq!(record.job_no, "101");
        assert_eq!(harness.health.messages_dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_for_unknown_machine_creates_it() {
        let mut harness = TestHarness::new();
        harness.select("M5");
        harness.wait_connected("M5").await.unwrap();
        harness.send("M5", LiveMessageBuilder::new("M5").state(1).load(40.0)).await.unwrap();

        let record = harness.record("M5").unwrap();
        assert_eq!(record.name, "CNC Machine M5");
        assert_eq!(record.status, MachineStatus::Running);
        assert_eq!(record.operator, "Unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_fixed_delay() {
        let mut harness = TestHarness::new();
        harness.select("M1");
        harness.wait_connected("M1").await.unwrap();

        let closed_at = tokio::time::Instant::now();
        harness.transport.drop_connection("M1");
        let status = harness.wait_for_status(|s| s.state == LinkState::Closed).await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.label(), "Connecting...");

        // juste avant l'échéance : toujours un seul dial
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(harness.transport.dial_count("M1"), 1);

        harness.wait_connected("M1").await.unwrap();
        let waited = closed_at.elapsed();
        assert!(waited >= Duration::from_millis(3000) && waited < Duration::from_millis(3100), "waited {waited:?}");
        assert_eq!(harness.transport.dial_count("M1"), 2);
        assert_eq!(harness.health.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_is_final() {
        let mut harness = TestHarness::new();
        harness.select("M1");
        harness.wait_connected("M1").await.unwrap();

        harness.transport.drop_connection("M1");
        harness.wait_for_status(|s| s.state == LinkState::Closed).await.unwrap();
        harness.controller.deselect();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.transport.dial_count("M1"), 1);
        assert!(!harness.controller.current_status().connected);
        assert!(harness.controller.current_status().machine_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_machines_keeps_one_subscription() {
        let mut harness = TestHarness::new();
        harness.select("M1");
        harness.wait_connected("M1").await.unwrap();
        harness.select("M2");
        harness.wait_connected("M2").await.unwrap();

        harness.wait_until(|h| !h.transport.is_open("M1")).await.unwrap();
        assert!(harness.transport.is_open("M2"));
        assert_eq!(harness.transport.dials(), vec!["M1".to_string(), "M2".to_string()]);
    }

    #[test]
    fn test_report_rows() {
        let entry: ReportEntry = serde_json::from_value(report_entry("M1", 3661.0, 42)).unwrap();
        let row = ReportRow::from(&entry);
        assert_eq!(row.runtime_label, "1h 1m");
        assert_eq!(row.part_count, 42);
        assert_eq!(format_runtime(entry.runtime_sec), "1h 1m");
    }
}
