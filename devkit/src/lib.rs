/*!
# CNC DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test du canal live avec:
- Transport mock pour tests sans backend
- Builders de trames live et fixtures REST
- Faux backend HTTP + WebSocket (Axum)
- Harness de test câblé
*/

pub mod fake_backend;
pub mod message_builder;
pub mod mock_transport;
pub mod test_utils;

pub use fake_backend::FakeBackend;
pub use message_builder::LiveMessageBuilder;
pub use mock_transport::MockTransport;
pub use test_utils::TestHarness;
