/*!
Fake backend HTTP + WebSocket pour tests de bout en bout

Serveur Axum sur un port éphémère qui sert les fixtures du catalogue, du
rapport, de l'auth et de l'historique, plus le canal `/ws/machines/{id}`.
Les trames live sont diffusées via `push_frame`, `kick_all` coupe toutes les
connexions WebSocket ouvertes.
*/

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use anyhow::Result;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub const TEST_PASSWORD: &str = "secret";

#[derive(Default)]
struct Fixtures {
    catalog: Vec<Value>,
    report: Vec<Value>,
    users: HashMap<String, Value>,
    telemetry: Vec<Value>,
    states: Vec<Value>,
    jobs: Vec<Value>,
}

#[derive(Clone)]
struct FakeState {
    fixtures: Arc<Mutex<Fixtures>>,
    sessions: Arc<Mutex<HashMap<String, String>>>,
    seen_tokens: Arc<Mutex<Vec<Option<String>>>>,
    history_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    fail_catalog: Arc<AtomicBool>,
    fail_report: Arc<AtomicBool>,
    ws_connections: Arc<AtomicUsize>,
    live: broadcast::Sender<(String, String)>,
    kick: watch::Sender<u64>,
}

pub struct FakeBackend {
    addr: SocketAddr,
    state: FakeState,
    server: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Result<Self> {
        let (live, _) = broadcast::channel(256);
        let (kick, _) = watch::channel(0);
        let state = FakeState {
            fixtures: Arc::new(Mutex::new(Fixtures::default())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            seen_tokens: Arc::new(Mutex::new(Vec::new())),
            history_queries: Arc::new(Mutex::new(Vec::new())),
            fail_catalog: Arc::new(AtomicBool::new(false)),
            fail_report: Arc::new(AtomicBool::new(false)),
            ws_connections: Arc::new(AtomicUsize::new(0)),
            live,
            kick,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("Fake backend stopped: {}", e);
            }
        });
        log::info!("🧪 Fake backend listening on {}", addr);

        Ok(Self { addr, state, server })
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn set_catalog(&self, entries: Vec<Value>) {
        self.state.fixtures.lock().catalog = entries;
    }

    pub fn set_report(&self, rows: Vec<Value>) {
        self.state.fixtures.lock().report = rows;
    }

    pub fn set_history(&self, telemetry: Vec<Value>, states: Vec<Value>, jobs: Vec<Value>) {
        let mut fixtures = self.state.fixtures.lock();
        fixtures.telemetry = telemetry;
        fixtures.states = states;
        fixtures.jobs = jobs;
    }

    /// Compte acceptant `TEST_PASSWORD`
    pub fn add_user(&self, profile: Value) {
        if let Some(email) = profile["email"].as_str() {
            self.state.fixtures.lock().users.insert(email.to_string(), profile.clone());
        }
    }

    pub fn fail_catalog(&self, fail: bool) {
        self.state.fail_catalog.store(fail, Ordering::SeqCst);
    }

    pub fn fail_report(&self, fail: bool) {
        self.state.fail_report.store(fail, Ordering::SeqCst);
    }

    /// Tokens reçus sur `/machines` et `/reports/daily`, dans l'ordre
    pub fn seen_tokens(&self) -> Vec<Option<String>> {
        self.state.seen_tokens.lock().clone()
    }

    pub fn history_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.history_queries.lock().clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.state.sessions.lock().len()
    }

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    /// Diffuse une trame aux connexions ouvertes de la machine ; retourne le nombre d'abonnés
    pub fn push_frame<S: Into<String>>(&self, machine_id: &str, frame: S) -> usize {
        self.state.live.send((machine_id.to_string(), frame.into())).unwrap_or(0)
    }

    /// Ferme toutes les connexions WebSocket en cours
    pub fn kick_all(&self) {
        self.state.kick.send_modify(|generation| *generation += 1);
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn build_router(state: FakeState) -> Router {
    Router::new()
        .route("/machines", get(get_catalog))
        .route("/reports/daily", get(get_report))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/machines/{id}/telemetry", get(get_telemetry))
        .route("/machines/{id}/state-timeline", get(get_states))
        .route("/machines/{id}/jobs", get(get_jobs))
        .route("/ws/machines/{id}", get(ws_machine))
        .with_state(state)
}

type Params = Query<HashMap<String, String>>;

// GET /machines
async fn get_catalog(State(app): State<FakeState>, Query(params): Params) -> Result<Json<Vec<Value>>, StatusCode> {
    app.seen_tokens.lock().push(params.get("token").cloned());
    if app.fail_catalog.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(app.fixtures.lock().catalog.clone()))
}

// GET /reports/daily
async fn get_report(State(app): State<FakeState>, Query(params): Params) -> Result<Json<Vec<Value>>, StatusCode> {
    app.seen_tokens.lock().push(params.get("token").cloned());
    if app.fail_report.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(app.fixtures.lock().report.clone()))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

// POST /auth/login
async fn login(State(app): State<FakeState>, Json(creds): Json<Credentials>) -> Result<Json<Value>, StatusCode> {
    let user = app.fixtures.lock().users.get(&creds.email).cloned();
    match user {
        Some(user) if creds.password == TEST_PASSWORD => {
            let token = format!("tok-{}", app.sessions.lock().len() + 1);
            app.sessions.lock().insert(token.clone(), creds.email);
            Ok(Json(json!({ "token": token, "user": user })))
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

// POST /auth/logout?token=
async fn logout(State(app): State<FakeState>, Query(params): Params) -> StatusCode {
    if let Some(token) = params.get("token") {
        app.sessions.lock().remove(token);
    }
    StatusCode::OK
}

// GET /auth/me?token=
async fn me(State(app): State<FakeState>, Query(params): Params) -> Result<Json<Value>, StatusCode> {
    let email = params
        .get("token")
        .and_then(|token| app.sessions.lock().get(token).cloned())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let user = app.fixtures.lock().users.get(&email).cloned().ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(user))
}

fn record_history(app: &FakeState, id: String, kind: &str, mut params: HashMap<String, String>) {
    params.insert("machine_id".into(), id);
    params.insert("kind".into(), kind.into());
    app.history_queries.lock().push(params);
}

// GET /machines/{id}/telemetry?metric=&from=&to=
async fn get_telemetry(State(app): State<FakeState>, Path(id): Path<String>, Query(params): Params) -> Json<Vec<Value>> {
    record_history(&app, id, "telemetry", params);
    Json(app.fixtures.lock().telemetry.clone())
}

// GET /machines/{id}/state-timeline?from=&to=
async fn get_states(State(app): State<FakeState>, Path(id): Path<String>, Query(params): Params) -> Json<Vec<Value>> {
    record_history(&app, id, "states", params);
    Json(app.fixtures.lock().states.clone())
}

// GET /machines/{id}/jobs?from=&to=
async fn get_jobs(State(app): State<FakeState>, Path(id): Path<String>, Query(params): Params) -> Json<Vec<Value>> {
    record_history(&app, id, "jobs", params);
    Json(app.fixtures.lock().jobs.clone())
}

// GET /ws/machines/{id}
async fn ws_machine(ws: WebSocketUpgrade, State(app): State<FakeState>, Path(id): Path<String>) -> Response {
    // abonnement avant la réponse de handshake : aucune trame poussée après "connecté" n'est perdue
    let live = app.live.subscribe();
    let kick = app.kick.subscribe();
    app.ws_connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| stream_machine(socket, id, live, kick))
}

async fn stream_machine(
    mut socket: WebSocket,
    machine_id: String,
    mut live: broadcast::Receiver<(String, String)>,
    mut kick: watch::Receiver<u64>,
) {
    loop {
        tokio::select! {
            _ = kick.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            frame = live.recv() => match frame {
                Ok((target, raw)) if target == machine_id => {
                    if socket.send(Message::Text(raw.into())).await.is_err() {
                        return;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_builder::{catalog_entry, job_run, report_entry, state_span, telemetry_point, user_profile};
    use crate::message_builder::LiveMessageBuilder;
    use cnc_live::api::{span_status, BackendClient};
    use cnc_live::error::{AuthError, LoadError};
    use cnc_live::transport::{Transport, WsTransport};
    use cnc_live::MachineStatus;
    use futures::StreamExt;
    use std::time::Duration;

    fn client(backend: &FakeBackend) -> BackendClient {
        BackendClient::new(backend.http_url(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_catalog_and_report_carry_session_token() {
        let backend = FakeBackend::start().await.unwrap();
        backend.set_catalog(vec![catalog_entry("M1", 1, None), catalog_entry("M2", 2, Some("2024-01-01T08:00:00Z"))]);
        backend.set_report(vec![report_entry("M1", 3661.0, 42)]);

        let anonymous = client(&backend);
        let records = anonymous.load_catalog().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, MachineStatus::Running);
        assert_eq!(records[1].status, MachineStatus::Fault);

        let authed = client(&backend).with_token(Some("tok-9".into()));
        let report = authed.load_daily_report().await.unwrap();
        assert_eq!(report[0].part_count, 42);

        assert_eq!(backend.seen_tokens(), vec![None, Some("tok-9".to_string())]);
    }

    #[tokio::test]
    async fn test_load_failures_are_typed() {
        let backend = FakeBackend::start().await.unwrap();
        backend.fail_catalog(true);
        backend.fail_report(true);
        let api = client(&backend);
        assert!(matches!(api.load_catalog().await, Err(LoadError::CatalogUnavailable(_))));
        assert!(matches!(api.load_daily_report().await, Err(LoadError::ReportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_login_me_logout() {
        let backend = FakeBackend::start().await.unwrap();
        backend.add_user(user_profile("ana@plant.io", "WORKER"));
        let api = client(&backend);

        assert!(matches!(api.login("ana@plant.io", "wrong").await, Err(AuthError::InvalidCredentials)));

        let login = api.login("ana@plant.io", TEST_PASSWORD).await.unwrap();
        assert_eq!(login.user.email, "ana@plant.io");
        assert_eq!(api.me(&login.token).await.unwrap().email, "ana@plant.io");

        api.logout(&login.token).await;
        assert_eq!(backend.active_sessions(), 0);
        assert!(matches!(api.me(&login.token).await, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_history_routes() {
        let backend = FakeBackend::start().await.unwrap();
        backend.set_history(
            vec![telemetry_point("2024-01-01T00:00:00Z", 61.5)],
            vec![state_span(1, "2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z", 3600)],
            vec![job_run(101, "2024-01-01T00:00:00Z", "2024-01-01T00:30:00Z", 1800)],
        );
        let api = client(&backend);

        let points = api.telemetry_history("M1", "temperature", "2024-01-01", "2024-01-02").await.unwrap();
        assert_eq!(points[0].value, Some(61.5));
        let spans = api.state_timeline("M1", "2024-01-01", "2024-01-02").await.unwrap();
        assert_eq!(span_status(&spans[0]), MachineStatus::Running);
        let jobs = api.job_history("M1", "2024-01-01", "2024-01-02").await.unwrap();
        assert_eq!(jobs[0].duration_sec, 1800);

        let queries = backend.history_queries();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0]["metric"], "temperature");
        assert_eq!(queries[0]["machine_id"], "M1");
        assert_eq!(queries[2]["kind"], "jobs");
    }

    #[tokio::test]
    async fn test_machine_id_stays_one_path_segment() {
        let backend = FakeBackend::start().await.unwrap();
        backend.set_history(vec![], vec![], vec![job_run(7, "2024-01-01T00:00:00Z", "2024-01-01T00:10:00Z", 600)]);
        let api = client(&backend);

        let jobs = api.job_history("Line 2/M7", "2024-01-01", "2024-01-02").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(backend.history_queries()[0]["machine_id"], "Line 2/M7");

        let transport = WsTransport::new(backend.ws_url());
        let mut frames = transport.connect("Line 2/M7").await.unwrap();
        let frame = LiveMessageBuilder::new("Line 2/M7").state(1).frame();
        backend.push_frame("Line 2/M7", frame.clone());
        assert_eq!(frames.next().await, Some(Ok(frame)));
    }

    #[tokio::test]
    async fn test_ws_transport_receives_frames_until_kick() {
        let backend = FakeBackend::start().await.unwrap();
        let transport = WsTransport::new(backend.ws_url());

        let mut frames = transport.connect("M1").await.unwrap();
        assert_eq!(backend.ws_connections(), 1);

        let frame = LiveMessageBuilder::new("M1").state(1).frame();
        backend.push_frame("M2", "other machine");
        backend.push_frame("M1", frame.clone());
        assert_eq!(frames.next().await, Some(Ok(frame)));

        backend.kick_all();
        let closing = tokio::time::timeout(Duration::from_secs(5), frames.next()).await.unwrap();
        assert!(!matches!(closing, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_live_controller_over_websocket_reconnects() {
        use cnc_live::health::LinkHealth;
        use cnc_live::{LiveController, SharedRegistry};
        use std::sync::Arc;

        let backend = FakeBackend::start().await.unwrap();
        let registry = SharedRegistry::default();
        let health = LinkHealth::new();
        let mut controller = LiveController::new(
            Arc::new(WsTransport::new(backend.ws_url())),
            registry.clone(),
            health.clone(),
            Duration::from_millis(100),
        );
        let mut status = controller.status();
        let wait = Duration::from_secs(5);

        controller.select("M1");
        tokio::time::timeout(wait, status.wait_for(|s| s.connected)).await.unwrap().unwrap();

        let mut revisions = registry.subscribe();
        backend.push_frame("M1", LiveMessageBuilder::new("M1").state(1).spindle_speed(3000.0).frame());
        tokio::time::timeout(wait, revisions.wait_for(|rev| *rev >= 1)).await.unwrap().unwrap();
        assert_eq!(registry.snapshot("M1").unwrap().telemetry.spindle_speed, 3000.0);

        backend.kick_all();
        tokio::time::timeout(wait, status.wait_for(|s| !s.connected)).await.unwrap().unwrap();
        tokio::time::timeout(wait, status.wait_for(|s| s.connected && s.attempts == 2)).await.unwrap().unwrap();
        assert_eq!(backend.ws_connections(), 2);
        assert_eq!(health.reconnects(), 1);

        controller.deselect();
        assert!(!controller.current_status().connected);
    }
}
