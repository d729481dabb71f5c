use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::access::{
    FolderAccess, FolderGate, ManagerAccess, ManagerGate, SessionResolver, StaticSessions,
};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::identity::IdentityContext;
use crate::scheduler::{JobQueue, TenantQueue};
use crate::server::{build_router, run_server, AccessLayers, ServerState};
use crate::storage::NamespaceResolver;
use crate::users::{InMemoryUserStore, UserStore};
use crate::worker::{run_worker, JobRunner, NoopRunner, SandboxRunner};

/// Wires identity, namespaces, the queue overlay, the worker and the HTTP
/// server together.
pub struct Node {
    pub config: NodeConfig,
    pub identity: IdentityContext,
    pub queue: Arc<TenantQueue>,
    pub namespaces: Arc<NamespaceResolver>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionResolver>,
    pub runner: Arc<dyn JobRunner>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionResolver>,
    ) -> Self {
        let runner: Arc<dyn JobRunner> = match &config.sandbox {
            Some(sandbox) => Arc::new(SandboxRunner::new(sandbox.clone())),
            None => Arc::new(NoopRunner),
        };

        Self {
            identity: IdentityContext::new(config.tenancy.enabled),
            queue: TenantQueue::shared(config.tenancy.max_history_size),
            namespaces: Arc::new(NamespaceResolver::new(config.storage.clone())),
            users,
            sessions,
            runner,
            config,
        }
    }

    /// Build a node from config alone, loading users and their pre-issued
    /// tokens from `config.users_file` when set.
    pub fn from_config(config: NodeConfig) -> Result<Self> {
        let store = match &config.users_file {
            Some(path) => InMemoryUserStore::from_json_file(path)?,
            None => InMemoryUserStore::new(),
        };
        if !store.has_users() {
            tracing::warn!("No users registered; every request runs as the public owner");
        }
        let sessions = Arc::new(StaticSessions::from_store(&store));
        Ok(Self::new(config, Arc::new(store), sessions))
    }

    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// The host-facing queue interface.
    pub fn job_queue(&self) -> Arc<dyn JobQueue> {
        self.queue.clone()
    }

    /// Router with the access gates the config enables.
    pub fn router(&self) -> Router {
        let state = ServerState::new(
            self.identity.clone(),
            self.job_queue(),
            self.namespaces.clone(),
        );

        let folders = (self.config.tenancy.enabled && self.config.folders.enabled).then(|| {
            FolderAccess {
                gate: Arc::new(FolderGate::new(self.config.folders.namespaced_roots.clone())),
                users: self.users.clone(),
            }
        });
        let manager = self.config.manager.enabled.then(|| ManagerAccess {
            gate: Arc::new(ManagerGate::new(&self.config.manager)),
            users: self.users.clone(),
        });

        build_router(
            state,
            AccessLayers {
                sessions: self.sessions.clone(),
                folders,
                manager,
            },
        )
    }

    /// Run the worker and the HTTP server until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails to bind or serve. The
    /// worker runs as a spawned task and logs its own errors.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            listen_addr = %self.config.listen_addr,
            multi_tenant = self.config.tenancy.enabled,
            max_history = self.config.tenancy.max_history_size,
            folder_gate = self.config.folders.enabled,
            manager_gate = self.config.manager.enabled,
            "Starting sentinel-lite node"
        );

        let worker = tokio::spawn(run_worker(
            self.job_queue(),
            self.runner.clone(),
            Duration::from_millis(self.config.worker_poll_ms),
            shutdown.clone(),
        ));

        let app = self.router();
        let served = run_server(self.config.listen_addr, app, shutdown.clone()).await;

        shutdown.cancel();
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
        served?;
        Ok(())
    }
}
