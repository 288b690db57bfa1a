use std::sync::{Mutex, MutexGuard};

use log::{debug, error, info, warn};

use crate::{
    cli::ServerOptions,
    config::{self, ServerConfig},
    error::{ConfigLoadError, Result, StartError, StopError},
    server::Instance,
};

/// What the OS service manager drives.
pub trait Program: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

/// The server runtime managed by a [`Lifecycle`].
pub trait Runtime: Send + Sync {
    type Config;
    type Instance: ManagedInstance;

    fn load_config(&self, server_type: &str) -> Result<Self::Config, ConfigLoadError>;
    fn start(&self, config: Self::Config) -> Result<Self::Instance, StartError>;
}

pub trait ManagedInstance: Send {
    fn run_shutdown_callbacks(&mut self);
    fn stop(self) -> Result<(), StopError>;
}

/// Runs the HTTP server from the process flags.
pub struct HttpRuntime {
    options: ServerOptions,
}

impl HttpRuntime {
    pub fn new(options: ServerOptions) -> Self {
        Self { options }
    }
}

impl Runtime for HttpRuntime {
    type Config = ServerConfig;
    type Instance = Instance;

    fn load_config(&self, server_type: &str) -> Result<ServerConfig, ConfigLoadError> {
        config::load(server_type, &self.options)
    }

    fn start(&self, config: ServerConfig) -> Result<Instance, StartError> {
        Instance::start(config)
    }
}

impl ManagedInstance for Instance {
    fn run_shutdown_callbacks(&mut self) {
        Instance::run_shutdown_callbacks(self)
    }

    fn stop(self) -> Result<(), StopError> {
        Instance::stop(self)
    }
}

/// Owns the single running instance. `start` and `stop` are serialized by
/// the slot's mutex; `stop` on a stopped lifecycle does nothing.
pub struct Lifecycle<R: Runtime> {
    runtime: R,
    server_type: String,
    instance: Mutex<Option<R::Instance>>,
}

impl<R: Runtime> Lifecycle<R> {
    pub fn new(runtime: R, server_type: &str) -> Self {
        Self {
            runtime,
            server_type: server_type.to_string(),
            instance: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<R::Instance>> {
        // A panic while holding the lock leaves the slot itself consistent.
        self.instance.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<R: Runtime> Program for Lifecycle<R> {
    fn start(&self) -> Result<()> {
        let mut slot = self.slot();
        if slot.is_some() {
            warn!("Start requested but the server is already running");
            return Ok(());
        }

        let config = self.runtime.load_config(&self.server_type)?;
        let instance = self.runtime.start(config)?;
        *slot = Some(instance);
        info!("Service started");

        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut slot = self.slot();
        let Some(mut instance) = slot.take() else {
            debug!("Stop requested but the server is not running");
            return Ok(());
        };

        instance.run_shutdown_callbacks();
        match instance.stop() {
            Ok(()) => {
                info!("Service stopped");
                Ok(())
            }
            Err(e) => {
                error!("Stopping server: {}", e);
                Err(e.into())
            }
        }
    }
}
