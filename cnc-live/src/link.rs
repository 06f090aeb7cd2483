/**
 * LINK STATE MACHINE - Cycle de vie d'un abonnement live
 *
 * RÔLE : Automate fini pur (sans tokio) du canal live d'une machine :
 *   DISCONNECTED -> CONNECTING -> CONNECTED -> (CLOSED -> CONNECTING)*
 * plus l'état terminal CANCELLED après désabonnement.
 *
 * FONCTIONNEMENT :
 * - chaque événement retourne la prochaine action à exécuter par le driver
 * - reconnexion à délai fixe, sans plafond de tentatives ni jitter
 * - après Cancel, plus aucune transition
 * - seul CONNECTING -> CONNECTED met le flag "live" à vrai
 */

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Délai fixe entre la fermeture et la tentative suivante
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Cancelled,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Closed => "closed",
            LinkState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Montage initial ou changement de machine
    Open,
    HandshakeOk,
    /// Fermeture pair, erreur réseau, violation protocole, ou handshake raté
    TransportClosed,
    /// Le délai de reconnexion est écoulé
    ReconnectDue,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Ouvrir le transport vers la machine
    Dial,
    /// Lire les trames jusqu'à fermeture
    Listen,
    /// Attendre ce délai puis émettre ReconnectDue
    Backoff(Duration),
    /// Fermer le transport ouvert et annuler le timer en attente
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct LinkMachine {
    machine_id: String,
    state: LinkState,
    reconnect_delay: Duration,
    /// Nombre de connexions tentées (initiale comprise)
    attempts: u32,
    /// Incrémenté à chaque handshake réussi
    epoch: u64,
}

impl LinkMachine {
    pub fn new(machine_id: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            machine_id: machine_id.into(),
            state: LinkState::Disconnected,
            reconnect_delay,
            attempts: 0,
            epoch: 0,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Applique un événement ; `None` = événement ignoré dans cet état
    pub fn handle(&mut self, event: LinkEvent) -> Option<LinkAction> {
        use LinkEvent::*;
        use LinkState::*;

        let action = match (self.state, &event) {
            (Cancelled, _) => None,
            (_, Cancel) => {
                self.state = Cancelled;
                Some(LinkAction::Shutdown)
            }
            (Disconnected, Open) | (Closed, Open) | (Closed, ReconnectDue) => {
                self.state = Connecting;
                self.attempts = self.attempts.saturating_add(1);
                Some(LinkAction::Dial)
            }
            (Connecting, HandshakeOk) => {
                self.state = Connected;
                self.epoch += 1;
                Some(LinkAction::Listen)
            }
            (Connecting, TransportClosed) | (Connected, TransportClosed) => {
                self.state = Closed;
                Some(LinkAction::Backoff(self.reconnect_delay))
            }
            _ => None,
        };

        match action {
            Some(a) => debug!("[link] {} {:?} -> {} ({:?})", self.machine_id, event, self.state.as_str(), a),
            None if self.state != Cancelled => {
                warn!("[link] {} ignored {:?} while {}", self.machine_id, event, self.state.as_str())
            }
            None => {}
        }
        action
    }
}

/// Etat de connectivité observable par l'affichage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    /// Identifiant de l'abonnement qui a publié ce statut
    pub subscription: Option<String>,
    pub machine_id: Option<String>,
    pub state: LinkState,
    pub connected: bool,
    pub attempts: u32,
}

impl LinkStatus {
    pub fn idle() -> Self {
        Self {
            subscription: None,
            machine_id: None,
            state: LinkState::Disconnected,
            connected: false,
            attempts: 0,
        }
    }

    pub fn from_machine(subscription: &str, link: &LinkMachine) -> Self {
        Self {
            subscription: Some(subscription.to_string()),
            machine_id: Some(link.machine_id().to_string()),
            state: link.state(),
            connected: link.is_live(),
            attempts: link.attempts(),
        }
    }

    /// Libellé de l'indicateur live
    pub fn label(&self) -> &'static str {
        if self.connected { "Live" } else { "Connecting..." }
    }
}
