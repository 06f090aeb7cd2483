/*!
Mock Transport pour développement sans backend

Remplace le client WebSocket : enregistre chaque dial, permet de refuser les
connexions, d'injecter des trames dans la connexion ouverte d'une machine et
de la couper pour simuler une perte réseau.
*/

use cnc_live::error::TransportError;
use cnc_live::transport::{FrameStream, Transport};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Result;

type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;

#[derive(Clone, Default)]
pub struct MockTransport {
    refuse: Arc<AtomicBool>,
    dials: Arc<Mutex<Vec<String>>>,
    open: Arc<Mutex<HashMap<String, FrameSender>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les prochains dials échouent (connexion refusée) tant que `refuse` est vrai
    pub fn refuse_dials(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Injecte une trame brute dans la connexion ouverte de la machine
    pub fn push<S: Into<String>>(&self, machine_id: &str, raw: S) -> Result<()> {
        let open = self.open.lock();
        let sender = open
            .get(machine_id)
            .ok_or_else(|| anyhow::anyhow!("No open connection for {}", machine_id))?;
        sender
            .unbounded_send(Ok(raw.into()))
            .map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        log::info!("📨 [MOCK] Frame pushed to {}", machine_id);
        Ok(())
    }

    pub fn push_json(&self, machine_id: &str, payload: &Value) -> Result<()> {
        self.push(machine_id, serde_json::to_string(payload)?)
    }

    /// Fermeture propre côté serveur (fin de flux)
    pub fn drop_connection(&self, machine_id: &str) -> bool {
        let dropped = self.open.lock().remove(machine_id).is_some();
        if dropped {
            log::info!("🔌 [MOCK] Connection to {} dropped", machine_id);
        }
        dropped
    }

    /// Coupure sur erreur transport
    pub fn fail_connection(&self, machine_id: &str, error: TransportError) -> bool {
        match self.open.lock().remove(machine_id) {
            Some(sender) => sender.unbounded_send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Vrai tant que le consommateur garde le flux de la machine
    pub fn is_open(&self, machine_id: &str) -> bool {
        self.open
            .lock()
            .get(machine_id)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    pub fn dial_count(&self, machine_id: &str) -> usize {
        self.dials.lock().iter().filter(|id| *id == machine_id).count()
    }

    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().clone()
    }

    pub fn clear(&self) {
        self.dials.lock().clear();
        self.open.lock().clear();
    }
}

impl Transport for MockTransport {
    fn connect(&self, machine_id: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        self.dials.lock().push(machine_id.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            log::info!("🚫 [MOCK] Dial to {} refused", machine_id);
            return futures::future::ready(Err(TransportError::Connect("connection refused".into()))).boxed();
        }
        let (sender, receiver) = mpsc::unbounded();
        self.open.lock().insert(machine_id.to_string(), sender);
        log::info!("📥 [MOCK] Dial to {} accepted", machine_id);
        futures::future::ready(Ok(receiver.boxed())).boxed()
    }
}
