//! Engine
//!
//! The composition root: wires configuration, register store, persistence
//! and the connection multiplexer together, and owns startup and shutdown.
//!
//! ## Startup
//! 1. Validate the configuration (fatal on error)
//! 2. Bind the listening socket (fatal on error)
//! 3. Open the backing table (NOT fatal - the server runs with a
//!    zero-defaulted map and retries persistence per write)
//! 4. Hydrate the map from the table
//! 5. Ready to serve
//!
//! Shutdown is an explicit operation: [`EngineHandle::stop`] ends the loop
//! and every socket and resource is released on the way out, whatever the
//! exit path. Hosts decide what triggers it (the server binary wires ctrl-c).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::server::{ConnectionMultiplexer, Counters};
use crate::store::{RegisterMap, RegisterStore, SqliteTable};

/// A running register server.
pub struct Engine {
    multiplexer: ConnectionMultiplexer<SqliteTable>,
    counters: Arc<Counters>,
    stop: Arc<watch::Sender<bool>>,
}

/// Cloneable stop handle for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl EngineHandle {
    /// Ask the engine to shut down. Idempotent; safe after the engine has
    /// already stopped.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl Engine {
    /// Validate, bind, hydrate and assemble an engine ready to run.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
        info!("listening on {}", config.listen_addr);

        let table = SqliteTable::open(&config.db_path);
        if !table.is_connected() {
            warn!("serving zero-defaulted registers until the backing store comes back");
        }

        let map = RegisterMap::new(
            config.coils,
            config.discrete_inputs,
            config.input_registers,
            config.holding_registers,
        );
        let mut store = RegisterStore::new(map, table);
        store.hydrate()?;

        let counters = Arc::new(Counters::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let multiplexer = ConnectionMultiplexer::new(
            listener,
            store,
            Arc::clone(&counters),
            config.unit_id,
            config.max_connections,
            config.report_interval,
            stop_rx,
        );

        Ok(Self {
            multiplexer,
            counters,
            stop: Arc::new(stop_tx),
        })
    }

    /// The bound listen address (useful when the config asked for port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.multiplexer.local_addr()
    }

    /// A handle that stops this engine.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// The engine's operational counters.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Serve until stopped.
    pub async fn run(mut self) -> Result<()> {
        self.multiplexer.run().await
    }
}
