/**
 * MACHINE REGISTRY - Source de vérité unique de l'état des machines
 *
 * RÔLE : Map machine_id -> MachineRecord, alimentée par le catalogue puis par
 * le canal live. Un seul point d'écriture (apply = reconcile + insert),
 * lectures concurrentes par snapshot.
 *
 * FONCTIONNEMENT :
 * - seed : insère les enregistrements de base inconnus, ne touche jamais un record existant
 * - apply : crée le record au premier message d'un id inconnu, sinon réconcilie
 * - reset : seul moyen de détruire des records (logout)
 * - chaque mutation incrémente une révision publiée sur un watch (affichage réactif)
 */

use crate::models::{MachineRecord, MachineStatus, PartialUpdate};
use crate::reconcile::reconcile;
use crate::state::{new_state, Shared};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Résultat d'une application de delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Premier message pour cet id : record créé puis réconcilié
    Created,
    Applied,
    /// Appliqué alors que le timestamp est antérieur au dernier message appliqué
    Stale,
    /// Delta antérieur rejeté (mode reject_stale_updates)
    Rejected,
}

#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: HashMap<String, MachineRecord>,
    reject_stale: bool,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_rejection(mut self, reject: bool) -> Self {
        self.reject_stale = reject;
        self
    }

    /// Insère les records de base ; un id déjà suivi garde son état live
    pub fn seed(&mut self, records: impl IntoIterator<Item = MachineRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.machines.contains_key(&record.id) {
                debug!("[registry] {} already tracked, keeping live state", record.id);
                continue;
            }
            self.machines.insert(record.id.clone(), record);
            inserted += 1;
        }
        inserted
    }

    /// Unique chemin de mutation live : reconcile + remplacement atomique
    pub fn apply(&mut self, update: &PartialUpdate) -> ApplyOutcome {
        match self.machines.get_mut(&update.machine_id) {
            Some(current) => {
                let stale = current.last_message_at.is_some_and(|last| update.timestamp < last);
                if stale && self.reject_stale {
                    return ApplyOutcome::Rejected;
                }
                if let Some(count) = update.business.part_count {
                    if count < current.business.part_count {
                        debug!("[registry] {} part_count went backwards ({} -> {})",
                               update.machine_id, current.business.part_count, count);
                    }
                }
                let next = reconcile(current, update);
                *current = next;
                if stale { ApplyOutcome::Stale } else { ApplyOutcome::Applied }
            }
            None => {
                let base = MachineRecord::baseline(&update.machine_id, MachineStatus::Idle, update.timestamp);
                let record = reconcile(&base, update);
                self.machines.insert(record.id.clone(), record);
                ApplyOutcome::Created
            }
        }
    }

    pub fn get(&self, machine_id: &str) -> Option<&MachineRecord> {
        self.machines.get(machine_id)
    }

    /// Tous les records, triés par identifiant
    pub fn list(&self) -> Vec<MachineRecord> {
        let mut all: Vec<MachineRecord> = self.machines.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn clear(&mut self) {
        self.machines.clear();
    }
}

/// Store partagé : le registry + notification de révision pour les lecteurs
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Shared<MachineRegistry>,
    revision: watch::Sender<u64>,
}

impl SharedRegistry {
    pub fn new(registry: MachineRegistry) -> Self {
        let (revision, _) = watch::channel(0);
        Self { inner: new_state(registry), revision }
    }

    pub fn seed(&self, records: impl IntoIterator<Item = MachineRecord>) -> usize {
        let inserted = self.inner.write().seed(records);
        if inserted > 0 {
            self.bump();
        }
        inserted
    }

    pub fn apply(&self, update: &PartialUpdate) -> ApplyOutcome {
        let outcome = self.inner.write().apply(update);
        match outcome {
            ApplyOutcome::Rejected => {
                warn!("[registry] rejected out-of-order update for {} ({})",
                      update.machine_id, update.timestamp);
            }
            ApplyOutcome::Stale => {
                warn!("[registry] applied out-of-order update for {} ({})",
                      update.machine_id, update.timestamp);
                self.bump();
            }
            ApplyOutcome::Created | ApplyOutcome::Applied => self.bump(),
        }
        outcome
    }

    /// Vide le registry (logout) : seule destruction possible des records
    pub fn reset(&self) {
        self.inner.write().clear();
        self.bump();
    }

    pub fn snapshot(&self, machine_id: &str) -> Option<MachineRecord> {
        self.inner.read().get(machine_id).cloned()
    }

    pub fn list(&self) -> Vec<MachineRecord> {
        self.inner.read().list()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Récepteur notifié à chaque mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(MachineRegistry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::baseline_from_catalog;
    use crate::codec::decode_live_message;
    use crate::models::CatalogEntry;
    use serde_json::json;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn update(id: &str, ts: OffsetDateTime) -> PartialUpdate {
        PartialUpdate::empty(id, ts)
    }

    #[test]
    fn test_seed_does_not_duplicate_or_overwrite() {
        let mut registry = MachineRegistry::new();
        let now = OffsetDateTime::now_utc();
        assert_eq!(registry.seed(vec![MachineRecord::baseline("M1", MachineStatus::Running, now)]), 1);

        let mut u = update("M1", now);
        u.telemetry.load = Some(80.0);
        registry.apply(&u);

        let inserted = registry.seed(vec![
            MachineRecord::baseline("M1", MachineStatus::Idle, now),
            MachineRecord::baseline("M2", MachineStatus::Fault, now),
        ]);
        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 2);
        let m1 = registry.get("M1").unwrap();
        assert_eq!(m1.status, MachineStatus::Running);
        assert_eq!(m1.telemetry.load, 80.0);
    }

    #[test]
    fn test_first_message_creates_record() {
        let mut registry = MachineRegistry::new();
        let raw = r#"{"machine_id":"M9","current_state":1,"timestamp":"2024-01-01T00:00:00Z","telemetry":{"feed_rate":250}}"#;
        let outcome = registry.apply(&decode_live_message(raw).unwrap());
        assert_eq!(outcome, ApplyOutcome::Created);

        let record = registry.get("M9").unwrap();
        assert_eq!(record.status, MachineStatus::Running);
        assert_eq!(record.telemetry.feed_rate, 250.0);
        assert_eq!(record.telemetry.spindle_speed, 0.0);
        assert_eq!(record.job_no, "N/A");
        assert_eq!(record.operator, "Unknown");
    }

    #[test]
    fn test_stale_update_is_applied_and_flagged() {
        let mut registry = MachineRegistry::new();
        registry.apply(&update("M1", datetime!(2024-01-01 10:00 UTC)));

        let mut old = update("M1", datetime!(2024-01-01 9:59 UTC));
        old.state_code = Some(2);
        assert_eq!(registry.apply(&old), ApplyOutcome::Stale);
        let record = registry.get("M1").unwrap();
        assert_eq!(record.status, MachineStatus::Fault);
        assert_eq!(record.last_update, datetime!(2024-01-01 9:59 UTC));
    }

    #[test]
    fn test_stale_update_rejected_when_configured() {
        let mut registry = MachineRegistry::new().with_stale_rejection(true);
        registry.apply(&update("M1", datetime!(2024-01-01 10:00 UTC)));

        let mut old = update("M1", datetime!(2024-01-01 9:00 UTC));
        old.state_code = Some(2);
        assert_eq!(registry.apply(&old), ApplyOutcome::Rejected);
        let record = registry.get("M1").unwrap();
        assert_eq!(record.status, MachineStatus::Idle);
        assert_eq!(record.last_update, datetime!(2024-01-01 10:00 UTC));
    }

    #[test]
    fn test_catalog_seed_then_older_live_message_is_not_stale() {
        let raw = r#"{"machine_id":"M1","current_state":2,"timestamp":"2024-01-01T00:00:00Z","telemetry":{"temperature":61}}"#;
        let seeded = || {
            let catalog = vec![CatalogEntry { machine_id: "M1".into(), current_state: json!(1), last_seen: None }];
            baseline_from_catalog(catalog, OffsetDateTime::now_utc())
        };

        for strict in [false, true] {
            let mut registry = MachineRegistry::new().with_stale_rejection(strict);
            registry.seed(seeded());
            assert_eq!(registry.apply(&decode_live_message(raw).unwrap()), ApplyOutcome::Applied);

            let record = registry.get("M1").unwrap();
            assert_eq!(record.status, MachineStatus::Fault);
            assert_eq!(record.telemetry.temperature, 61.0);
            assert_eq!(record.last_message_at, Some(datetime!(2024-01-01 0:00 UTC)));
        }
    }

    #[test]
    fn test_catalog_last_seen_orders_live_messages() {
        let catalog = vec![CatalogEntry {
            machine_id: "M1".into(),
            current_state: json!(1),
            last_seen: Some("2024-01-01T12:00:00Z".into()),
        }];
        let mut registry = MachineRegistry::new().with_stale_rejection(true);
        registry.seed(baseline_from_catalog(catalog, OffsetDateTime::now_utc()));

        assert_eq!(registry.apply(&update("M1", datetime!(2024-01-01 11:00 UTC))), ApplyOutcome::Rejected);
        assert_eq!(registry.apply(&update("M1", datetime!(2024-01-01 12:30 UTC))), ApplyOutcome::Applied);
    }

    #[test]
    fn test_shared_registry_revisions_and_reset() {
        let store = SharedRegistry::default();
        let mut rx = store.subscribe();
        let now = OffsetDateTime::now_utc();

        store.seed(vec![MachineRecord::baseline("M1", MachineStatus::Idle, now)]);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.apply(&update("M1", now));
        assert_eq!(store.revision(), 2);

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.revision(), 3);
        assert!(store.snapshot("M1").is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let store = SharedRegistry::default();
        let now = OffsetDateTime::now_utc();
        store.seed(["M3", "M1", "M2"].map(|id| MachineRecord::baseline(id, MachineStatus::Idle, now)));
        let ids: Vec<String> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
    }
}
