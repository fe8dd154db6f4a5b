use crate::catalog::Catalog;
use crate::session::lifecycle::LifecycleLog;
use crate::store::Stores;
use crate::{Server, ServerConfig};
use std::sync::Arc;

/// Builder for constructing a Server instance.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    catalog: Option<Arc<Catalog>>,
    stores: Option<Stores>,
    lifecycle: Option<Arc<LifecycleLog>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the TCP address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Content tables. Defaults to [`Catalog::standard`].
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    /// Persistence backends. Required.
    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Record session state hooks into `log`.
    pub fn lifecycle_log(mut self, log: Arc<LifecycleLog>) -> Self {
        self.lifecycle = Some(log);
        self
    }

    /// Build the server.
    pub fn build(self) -> Result<Server, &'static str> {
        let stores = self.stores.ok_or("stores are required")?;
        self.config.validate().map_err(|_| "invalid configuration")?;
        Ok(Server {
            config: self.config,
            catalog: self.catalog.unwrap_or_else(|| Arc::new(Catalog::standard())),
            stores,
            lifecycle: self.lifecycle,
        })
    }
}
