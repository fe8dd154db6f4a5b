//! Towber game server.
//!
//! Players connect over TCP, log in, walk around shared areas, manage their
//! pets and fight each other in turn-based battle rooms. Every connection is
//! a session actor; battle rooms, the hub broadcaster, the invite sweepers and
//! the periodic saver are independent tasks talking through channels.

pub mod area;
pub mod battle;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod mail;
pub mod player;
pub mod saver;
pub mod session;
pub mod store;
pub mod transport;

use crate::area::AreaManager;
use crate::battle::{BattleManager, BattleSettings};
use crate::catalog::Catalog;
use crate::hub::Hub;
use crate::session::lifecycle::LifecycleLog;
use crate::store::Stores;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use builder::ServerBuilder;
pub use config::ServerConfig;
pub use error::ServerError;

/// Everything sessions share.
pub struct ServerContext {
    pub config: ServerConfig,
    pub catalog: Arc<Catalog>,
    pub stores: Stores,
    pub hub: Arc<Hub>,
    pub areas: AreaManager,
    pub battles: BattleManager,
    /// Records state hooks when set. Used by tests.
    pub lifecycle: Option<Arc<LifecycleLog>>,
}

impl ServerContext {
    /// Build the context and spawn its background tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: ServerConfig,
        catalog: Arc<Catalog>,
        stores: Stores,
        lifecycle: Option<Arc<LifecycleLog>>,
    ) -> Arc<Self> {
        let (hub, worker) = Hub::new(config.broadcast_capacity);
        let hub = Arc::new(hub);
        tokio::spawn(worker.run());

        let areas = AreaManager::standard(&config);
        for board in areas.invite_boards() {
            tokio::spawn(board.run_sweeper(config.invite_sweep_interval));
        }
        tokio::spawn(saver::run(Arc::clone(&hub), config.save_interval));

        let battles = BattleManager::new(BattleSettings::from_config(&config), Arc::clone(&catalog));
        Arc::new(Self {
            config,
            catalog,
            stores,
            hub,
            areas,
            battles,
            lifecycle,
        })
    }
}

/// The game server.
pub struct Server {
    config: ServerConfig,
    catalog: Arc<Catalog>,
    stores: Stores,
    lifecycle: Option<Arc<LifecycleLog>>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let ctx = ServerContext::start(self.config, self.catalog, self.stores, self.lifecycle);
        transport::serve(listener, ctx).await
    }
}
