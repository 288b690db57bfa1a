use std::{fmt::Display, io::Write, sync::Arc};

use log::debug;

use super::lifecycle::Program;
use crate::{
    cli::Action,
    error::{ControlError, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not installed.
    Unknown,
    Stopped,
    Running,
    /// Any other state the OS reports, e.g. a pending transition.
    Other(String),
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Unknown => write!(f, "Caddy service is not installed."),
            ServiceStatus::Stopped => write!(f, "Caddy service is not running."),
            ServiceStatus::Running => write!(f, "Caddy service is running."),
            ServiceStatus::Other(code) => write!(f, "Error: {}", code),
        }
    }
}

/// An OS service manager holding one registered service.
pub trait ServiceManager {
    fn install(&self) -> Result<(), ControlError>;
    fn uninstall(&self) -> Result<(), ControlError>;
    fn start(&self) -> Result<(), ControlError>;
    fn stop(&self) -> Result<(), ControlError>;

    fn restart(&self) -> Result<(), ControlError> {
        self.stop()?;
        self.start()
    }

    fn status(&self) -> Result<ServiceStatus, ControlError>;

    /// Block running `program` under the manager until it is told to stop.
    fn run(&self, program: Arc<dyn Program>) -> Result<()>;
}

/// Apply a control action to the service.
pub fn control<M: ServiceManager + ?Sized>(manager: &M, action: Action) -> Result<(), ControlError> {
    debug!("Service control: {}", action);
    match action {
        Action::Install => manager.install(),
        Action::Uninstall => manager.uninstall(),
        Action::Start => manager.start(),
        Action::Stop => manager.stop(),
        Action::Restart => manager.restart(),
        Action::Status => Err(ControlError::UnsupportedAction(action)),
    }
}

/// Handle a `-service` action. Status is written to `out` and never fails
/// because of the status query itself.
pub fn dispatch<M: ServiceManager + ?Sized>(manager: &M, action: Action, out: &mut dyn Write) -> Result<()> {
    if action != Action::Status {
        return Ok(control(manager, action)?);
    }

    let status = manager.status().unwrap_or_else(|e| {
        debug!("Querying service status: {}", e);
        ServiceStatus::Unknown
    });

    if let Err(e) = writeln!(out, "{}", status) {
        debug!("Writing service status: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeManager {
        calls: Mutex<Vec<&'static str>>,
        fail: bool,
        status: Option<ServiceStatus>,
    }

    impl FakeManager {
        fn record(&self, call: &'static str) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(ControlError::NotInstalled("caddy".to_string()))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ServiceManager for FakeManager {
        fn install(&self) -> Result<(), ControlError> { self.record("install") }
        fn uninstall(&self) -> Result<(), ControlError> { self.record("uninstall") }
        fn start(&self) -> Result<(), ControlError> { self.record("start") }
        fn stop(&self) -> Result<(), ControlError> { self.record("stop") }

        fn status(&self) -> Result<ServiceStatus, ControlError> {
            self.calls.lock().unwrap().push("status");
            self.status.clone().ok_or(ControlError::NotInstalled("caddy".to_string()))
        }

        fn run(&self, _program: Arc<dyn Program>) -> Result<()> {
            Ok(())
        }
    }

    fn status_output(status: Option<ServiceStatus>) -> String {
        let manager = FakeManager { status, ..Default::default() };
        let mut out = Vec::new();
        dispatch(&manager, Action::Status, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn it_passes_control_actions_through() {
        let manager = FakeManager::default();
        for action in [Action::Install, Action::Uninstall, Action::Start, Action::Stop] {
            dispatch(&manager, action, &mut Vec::new()).unwrap();
        }
        assert_eq!(manager.calls(), vec!["install", "uninstall", "start", "stop"]);
    }

    #[test]
    fn it_restarts_by_stopping_then_starting() {
        let manager = FakeManager::default();
        dispatch(&manager, Action::Restart, &mut Vec::new()).unwrap();
        assert_eq!(manager.calls(), vec!["stop", "start"]);
    }

    #[test]
    fn it_propagates_control_errors() {
        let manager = FakeManager { fail: true, ..Default::default() };
        let err = dispatch(&manager, Action::Install, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Control(ControlError::NotInstalled(_))));
    }

    #[test]
    fn it_rejects_status_as_a_control_action() {
        let manager = FakeManager::default();
        assert!(matches!(control(&manager, Action::Status), Err(ControlError::UnsupportedAction(Action::Status))));
        assert!(manager.calls().is_empty());
    }

    #[test]
    fn it_prints_status_messages() {
        assert_eq!(status_output(Some(ServiceStatus::Unknown)), "Caddy service is not installed.\n");
        assert_eq!(status_output(Some(ServiceStatus::Stopped)), "Caddy service is not running.\n");
        assert_eq!(status_output(Some(ServiceStatus::Running)), "Caddy service is running.\n");
        assert!(status_output(Some(ServiceStatus::Other("StartPending".to_string()))).contains("StartPending"));
    }

    #[test]
    fn it_treats_status_errors_as_not_installed() {
        assert_eq!(status_output(None), "Caddy service is not installed.\n");
    }
}
