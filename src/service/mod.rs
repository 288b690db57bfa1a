pub mod control;
pub mod descriptor;
pub mod lifecycle;
mod signal;
#[cfg(unix)]
pub mod systemd;
#[cfg(windows)]
pub mod windows;

use std::{io, sync::Arc};

use log::{debug, error, info};

use crate::{
    cli::Cli,
    error::{Error, Result},
};

pub use control::{ServiceManager, ServiceStatus};
pub use descriptor::ServiceDescriptor;
pub use lifecycle::{HttpRuntime, Lifecycle, Program};

/// The service manager of the platform we run on.
pub fn native_manager(descriptor: ServiceDescriptor) -> Box<dyn ServiceManager> {
    #[cfg(windows)]
    let manager = windows::WindowsManager::new(descriptor);
    #[cfg(unix)]
    let manager = systemd::SystemdManager::new(descriptor);

    Box::new(manager)
}

/// Handle the `-service` action, or run the server under the service
/// manager until it is stopped.
pub fn run(cli: Cli) -> Result<()> {
    let descriptor = ServiceDescriptor::new(&cli.name, cli.arguments);
    debug!("Service descriptor: {:?}", descriptor);

    let manager = native_manager(descriptor);

    match cli.service {
        Some(action) => control::dispatch(manager.as_ref(), action, &mut io::stdout()),
        None => {
            let lifecycle = Lifecycle::new(HttpRuntime::new(cli.server.clone()), &cli.server.server_type);
            manager.run(Arc::new(lifecycle))
        }
    }
}

/// Start `program`, block until a shutdown signal, then stop it.
pub fn run_foreground(program: &dyn Program) -> Result<()> {
    program.start()?;
    info!("Running in foreground, press Ctrl+C to stop");

    if let Err(e) = signal::wait_for_shutdown() {
        error!("Waiting for shutdown signal: {}", e);
        program.stop()?;
        return Err(Error::Signal(e));
    }

    program.stop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StartError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FailingProgram {
        stops: Mutex<usize>,
    }

    impl Program for FailingProgram {
        fn start(&self) -> Result<()> {
            Err(StartError::Aborted.into())
        }

        fn stop(&self) -> Result<()> {
            *self.stops.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn it_does_not_wait_when_start_fails() {
        let program = FailingProgram::default();
        assert!(matches!(run_foreground(&program), Err(Error::Start(_))));
        assert_eq!(*program.stops.lock().unwrap(), 0);
    }

    #[test]
    fn it_fails_to_run_with_a_bad_config() {
        let cli = Cli::try_parse_from_args(["caddy-service", "-root=/nonexistent/site"]).unwrap();
        let lifecycle = Lifecycle::new(HttpRuntime::new(cli.server.clone()), &cli.server.server_type);

        assert!(matches!(run_foreground(&lifecycle), Err(Error::ConfigLoad(_))));
        assert!(!lifecycle.is_running());
    }
}
