use anyhow::{Context, Result};
use cnc_live::api::{span_status, BackendClient};
use cnc_live::config::LiveConfig;
use cnc_live::display::{machine_line, ReportRow};
use cnc_live::health::LinkHealth;
use cnc_live::session::{Session, TokenStore};
use cnc_live::transport::WsTransport;
use cnc_live::{LiveController, MachineRegistry, SharedRegistry};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Console {
    config: LiveConfig,
    client: BackendClient,
    registry: SharedRegistry,
    session: Session,
}

impl Console {
    pub async fn new(config: LiveConfig) -> Self {
        let registry = SharedRegistry::new(
            MachineRegistry::new().with_stale_rejection(config.live.reject_stale_updates),
        );
        let session = Session::new(TokenStore::new(config.token_path()), registry.clone());
        let client = BackendClient::new(config.api.base_url.clone(), config.api_timeout())
            .with_token(session.token().await);
        Self { config, client, registry, session }
    }

    /// Catalogue -> registry ; un échec est terminal pour la commande
    async fn seed_registry(&self) -> Result<usize> {
        let records = self.client.load_catalog().await?;
        Ok(self.registry.seed(records))
    }

    pub async fn machines(&self) -> Result<()> {
        self.seed_registry().await?;
        for record in self.registry.list() {
            println!("{}  {}", machine_line(&record), record.name);
        }
        Ok(())
    }

    pub async fn watch(&self, machine: Option<String>) -> Result<()> {
        let seeded = self.seed_registry().await?;
        info!("[console] {} machines seeded", seeded);

        let machine_id = match machine {
            Some(id) => id,
            None => self
                .registry
                .list()
                .first()
                .map(|record| record.id.clone())
                .context("Catalog is empty, pass --machine")?,
        };

        let health = LinkHealth::new();
        let mut controller = LiveController::new(
            Arc::new(WsTransport::new(self.config.live.ws_base_url.clone())),
            self.registry.clone(),
            health.clone(),
            self.config.reconnect_delay(),
        );
        let mut status = controller.status();
        let mut revisions = self.registry.subscribe();
        controller.select(&machine_id);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    println!("[{}] {} ({})", current.label(), machine_id, current.state.as_str());
                }
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    revisions.borrow_and_update();
                    if let Some(record) = self.registry.snapshot(&machine_id) {
                        println!("{}", machine_line(&record));
                    }
                }
            }
        }

        controller.deselect();
        let report = health.snapshot(&self.registry);
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    pub async fn report(&self) -> Result<()> {
        let entries = self.client.load_daily_report().await?;
        if entries.is_empty() {
            println!("No production recorded today");
        }
        for entry in &entries {
            let row = ReportRow::from(entry);
            println!("{:<10} runtime {:>8}  parts {}", row.machine_id, row.runtime_label, row.part_count);
        }
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let user = self.session.login(&self.client, email, password).await?;
        println!("Logged in as {} ({:?}, {})", user.name, user.role, user.post);
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout(&self.client).await?;
        println!("Logged out");
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        let user = self.session.whoami(&self.client).await?;
        println!("{}", serde_json::to_string_pretty(&user)?);
        Ok(())
    }

    pub async fn telemetry_history(&self, machine_id: &str, metric: &str, from: &str, to: &str) -> Result<()> {
        let points = self.client.telemetry_history(machine_id, metric, from, to).await?;
        for point in points {
            match point.value {
                Some(value) => println!("{}  {:.3}", point.ts, value),
                None => println!("{}  -", point.ts),
            }
        }
        Ok(())
    }

    pub async fn state_timeline(&self, machine_id: &str, from: &str, to: &str) -> Result<()> {
        let spans = self.client.state_timeline(machine_id, from, to).await?;
        for span in spans {
            println!("{} -> {}  {:<7} {}s", span.start, span.end, span_status(&span).as_str(), span.duration_sec);
        }
        Ok(())
    }

    pub async fn job_history(&self, machine_id: &str, from: &str, to: &str) -> Result<()> {
        let jobs = self.client.job_history(machine_id, from, to).await?;
        if jobs.is_empty() {
            warn!("[console] no jobs for {} between {} and {}", machine_id, from, to);
        }
        for job in jobs {
            let id = cnc_live::codec::job_id(&job.job_id).unwrap_or_else(|| "?".into());
            println!("job {:<8} {} -> {}  {}s", id, job.start, job.end, job.duration_sec);
        }
        Ok(())
    }
}
