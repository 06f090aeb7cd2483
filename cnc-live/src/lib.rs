//! Synchronisation de l'état live d'une flotte de machines CNC.
//!
//! Le catalogue seed le [`registry::SharedRegistry`], le canal live
//! ([`live::LiveController`]) y réconcilie chaque delta reçu, l'affichage lit
//! des snapshots.

pub mod api;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod health;
pub mod link;
pub mod live;
pub mod models;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod state;
pub mod status;
pub mod transport;

pub use error::{AuthError, DecodeError, LoadError, SessionError, TransportError};
pub use live::{LiveController, LiveSubscription};
pub use models::{MachineRecord, MachineStatus, PartialUpdate};
pub use registry::{ApplyOutcome, MachineRegistry, SharedRegistry};
