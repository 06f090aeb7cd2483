/**
 * LIVE CHANNEL - Driver async de l'abonnement temps réel d'une machine
 *
 * RÔLE : Exécute les actions du LinkMachine sur un Transport, décode chaque
 * trame et l'applique au registry, publie la connectivité sur un watch.
 *
 * FONCTIONNEMENT :
 * - un abonnement = une tâche tokio + un flag d'annulation (watch<bool>)
 * - le flag est relu avant chaque dial, chaque apply et chaque publication,
 *   sous son verrou de lecture : après cancel(), plus aucun effet
 * - les points d'attente (handshake, trame suivante, délai) se réveillent
 *   dès l'annulation
 * - LiveController garde au plus un abonnement actif
 */

use crate::codec::decode_live_message;
use crate::health::LinkHealth;
use crate::link::{LinkAction, LinkEvent, LinkMachine, LinkStatus};
use crate::registry::SharedRegistry;
use crate::transport::{FrameStream, Transport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Abonnement live actif ; annulé au drop
pub struct LiveSubscription {
    id: String,
    machine_id: String,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn spawn(
        machine_id: &str,
        transport: Arc<dyn Transport>,
        registry: SharedRegistry,
        health: LinkHealth,
        status: watch::Sender<LinkStatus>,
        reconnect_delay: Duration,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let (cancel, cancel_rx) = watch::channel(false);

        let driver = Driver {
            subscription: id.clone(),
            link: LinkMachine::new(machine_id, reconnect_delay),
            transport,
            registry,
            health,
            status,
        };
        let task = tokio::spawn(driver.run(cancel_rx));
        info!("[live] subscription {} opened for {}", id, machine_id);

        Self { id, machine_id: machine_id.to_string(), cancel, task: Some(task) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Annulation synchrone : au retour, le driver ne dial, n'applique et ne publie plus rien
    pub fn cancel(&self) {
        let was_cancelled = self.cancel.send_replace(true);
        if !was_cancelled {
            info!("[live] subscription {} cancelled ({})", self.id, self.machine_id);
        }
    }

    /// Annule puis attend la fin de la tâche (transport fermé)
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("[live] driver task for {} ended abnormally: {}", self.machine_id, e);
            }
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Driver {
    subscription: String,
    link: LinkMachine,
    transport: Arc<dyn Transport>,
    registry: SharedRegistry,
    health: LinkHealth,
    status: watch::Sender<LinkStatus>,
}

enum Wake<T> {
    Cancelled,
    Ready(T),
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // sender lâché = abonnement abandonné
    let _ = cancel.wait_for(|flag| *flag).await;
}

impl Driver {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let mut action = self.link.handle(LinkEvent::Open);
        let mut frames: Option<FrameStream> = None;

        loop {
            action = match action {
                Some(LinkAction::Dial) => {
                    if !self.publish(&cancel) {
                        break;
                    }
                    if self.link.attempts() > 1 {
                        self.health.increment_reconnects();
                    }
                    let dial = self.transport.connect(self.link.machine_id());
                    let result = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => Wake::Cancelled,
                        result = dial => Wake::Ready(result),
                    };
                    match result {
                        Wake::Cancelled => break,
                        Wake::Ready(Ok(stream)) => {
                            frames = Some(stream);
                            self.link.handle(LinkEvent::HandshakeOk)
                        }
                        Wake::Ready(Err(e)) => {
                            warn!("[live] {} connect failed: {}", self.link.machine_id(), e);
                            self.link.handle(LinkEvent::TransportClosed)
                        }
                    }
                }
                Some(LinkAction::Listen) => {
                    if !self.publish(&cancel) {
                        break;
                    }
                    if let Some(mut stream) = frames.take() {
                        if self.listen(&mut stream, &mut cancel).await {
                            break;
                        }
                    }
                    self.link.handle(LinkEvent::TransportClosed)
                }
                Some(LinkAction::Backoff(delay)) => {
                    if !self.publish(&cancel) {
                        break;
                    }
                    debug!("[live] {} reconnecting in {:?}", self.link.machine_id(), delay);
                    let woke = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => Wake::Cancelled,
                        _ = tokio::time::sleep(delay) => Wake::Ready(()),
                    };
                    match woke {
                        Wake::Cancelled => break,
                        Wake::Ready(()) => self.link.handle(LinkEvent::ReconnectDue),
                    }
                }
                Some(LinkAction::Shutdown) | None => break,
            };
        }

        drop(frames);
        self.link.handle(LinkEvent::Cancel);
        debug!("[live] driver {} stopped ({})", self.subscription, self.link.machine_id());
    }

    /// Lit les trames jusqu'à fermeture ; `true` si l'abonnement a été annulé
    async fn listen(&self, stream: &mut FrameStream, cancel: &mut watch::Receiver<bool>) -> bool {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => Wake::Cancelled,
                frame = stream.next() => Wake::Ready(frame),
            };
            match next {
                Wake::Cancelled => return true,
                Wake::Ready(Some(Ok(raw))) => {
                    if !self.ingest(&raw, cancel) {
                        return true;
                    }
                }
                Wake::Ready(Some(Err(e))) => {
                    warn!("[live] {} transport closed: {}", self.link.machine_id(), e);
                    return false;
                }
                Wake::Ready(None) => {
                    info!("[live] {} stream ended", self.link.machine_id());
                    return false;
                }
            }
        }
    }

    /// Décode et applique une trame ; `false` si annulé entre-temps
    fn ingest(&self, raw: &str, cancel: &watch::Receiver<bool>) -> bool {
        let flag = cancel.borrow();
        if *flag {
            return false;
        }
        match decode_live_message(raw) {
            Ok(update) => {
                if update.machine_id != self.link.machine_id() {
                    debug!("[live] frame for {} on {} channel", update.machine_id, self.link.machine_id());
                }
                let outcome = self.registry.apply(&update);
                self.health.record_outcome(outcome);
            }
            Err(e) => {
                warn!("[live] dropped malformed message on {}: {}", self.link.machine_id(), e);
                self.health.record_dropped();
            }
        }
        true
    }

    /// Publie l'état courant ; `false` si l'abonnement est annulé
    fn publish(&self, cancel: &watch::Receiver<bool>) -> bool {
        let flag = cancel.borrow();
        if *flag {
            return false;
        }
        let next = LinkStatus::from_machine(&self.subscription, &self.link);
        self.health.mark_state(self.link.state());
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        true
    }
}

/// Détient l'unique abonnement live ; changer de machine ferme l'ancien
pub struct LiveController {
    transport: Arc<dyn Transport>,
    registry: SharedRegistry,
    health: LinkHealth,
    reconnect_delay: Duration,
    status: watch::Sender<LinkStatus>,
    active: Option<LiveSubscription>,
}

impl LiveController {
    pub fn new(transport: Arc<dyn Transport>, registry: SharedRegistry, health: LinkHealth, reconnect_delay: Duration) -> Self {
        let (status, _) = watch::channel(LinkStatus::idle());
        Self { transport, registry, health, reconnect_delay, status, active: None }
    }

    /// Abonne à `machine_id` ; no-op si c'est déjà la machine suivie
    pub fn select(&mut self, machine_id: &str) -> &LiveSubscription {
        let keep = self
            .active
            .as_ref()
            .is_some_and(|sub| sub.machine_id() == machine_id && !sub.is_cancelled());
        if !keep {
            self.deselect();
        }
        self.active.get_or_insert_with(|| {
            LiveSubscription::spawn(
                machine_id,
                self.transport.clone(),
                self.registry.clone(),
                self.health.clone(),
                self.status.clone(),
                self.reconnect_delay,
            )
        })
    }

    pub fn deselect(&mut self) {
        if let Some(sub) = self.active.take() {
            sub.cancel();
            let idle = LinkStatus::idle();
            self.health.mark_state(idle.state);
            self.status.send_replace(idle);
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.active.as_ref().map(|sub| sub.machine_id())
    }

    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.deselect();
    }
}
