use parking_lot::RwLock;
use std::sync::Arc;

/// Etat partagé : lectures concurrentes, écritures sérialisées.
pub type Shared<T> = Arc<RwLock<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
