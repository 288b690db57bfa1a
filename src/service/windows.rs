use std::{
    ffi::{OsStr, OsString},
    sync::{mpsc, Arc, OnceLock},
    thread::sleep,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use windows::Win32::{
    Foundation::ERROR_SERVICE_DOES_NOT_EXIST,
    System::Console::{GetStdHandle, STD_ERROR_HANDLE},
};
use windows_service::{
    define_windows_service,
    service::{
        Service, ServiceAccess, ServiceControl, ServiceControlAccept, ServiceErrorControl, ServiceExitCode,
        ServiceInfo, ServiceStartType, ServiceState, ServiceStatus as ScmStatus, ServiceType,
    },
    service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle},
    service_dispatcher,
    service_manager::{ServiceManager as ScManager, ServiceManagerAccess},
};

use super::{
    control::{ServiceManager, ServiceStatus},
    descriptor::ServiceDescriptor,
    lifecycle::Program,
};
use crate::error::{ControlError, Result};

const RESTART_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What `service_main` drives. The SCM calls back through a plain function,
/// so the program is handed over once before entering the dispatcher.
struct Registration {
    name: String,
    program: Arc<dyn Program>,
}

static REGISTRATION: OnceLock<Registration> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

/// Manages the service through the Windows Service Control Manager.
pub struct WindowsManager {
    descriptor: ServiceDescriptor,
}

impl WindowsManager {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self { descriptor }
    }

    fn open(&self, access: ServiceAccess) -> Result<Service, ControlError> {
        let manager = ScManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)?;
        Ok(manager.open_service(&self.descriptor.name, access)?)
    }

    fn wait_for_stopped(&self, service: &Service) -> Result<(), ControlError> {
        let deadline = Instant::now() + RESTART_TIMEOUT;
        while service.query_status()?.current_state != ServiceState::Stopped {
            if Instant::now() >= deadline {
                return Err(ControlError::Timeout { name: self.descriptor.name.clone(), timeout: RESTART_TIMEOUT });
            }
            sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

impl ServiceManager for WindowsManager {
    fn install(&self) -> Result<(), ControlError> {
        let manager = ScManager::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )?;

        let service_info = ServiceInfo {
            name: OsString::from(&self.descriptor.name),
            display_name: OsString::from(&self.descriptor.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: std::env::current_exe()?,
            launch_arguments: self.descriptor.arguments.iter().map(OsString::from).collect(),
            dependencies: vec![],
            account_name: None, // run as LocalSystem
            account_password: None,
        };

        let service = manager.create_service(&service_info, ServiceAccess::CHANGE_CONFIG)?;
        service.set_description(&self.descriptor.description)?;
        info!("Service {} installed", self.descriptor.name);
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ControlError> {
        let service = self.open(ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::DELETE)?;
        if service.query_status()?.current_state != ServiceState::Stopped {
            service.stop()?;
        }
        service.delete()?;
        info!("Service {} uninstalled", self.descriptor.name);
        Ok(())
    }

    fn start(&self) -> Result<(), ControlError> {
        self.open(ServiceAccess::START)?.start::<&OsStr>(&[])?;
        info!("Service {} started", self.descriptor.name);
        Ok(())
    }

    fn stop(&self) -> Result<(), ControlError> {
        self.open(ServiceAccess::STOP)?.stop()?;
        info!("Service {} stopped", self.descriptor.name);
        Ok(())
    }

    fn restart(&self) -> Result<(), ControlError> {
        let service = self.open(ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::START)?;
        if service.query_status()?.current_state != ServiceState::Stopped {
            service.stop()?;
            self.wait_for_stopped(&service)?;
        }
        service.start::<&OsStr>(&[])?;
        info!("Service {} restarted", self.descriptor.name);
        Ok(())
    }

    fn status(&self) -> Result<ServiceStatus, ControlError> {
        let service = match self.open(ServiceAccess::QUERY_STATUS) {
            Ok(service) => service,
            Err(ControlError::Windows(windows_service::Error::Winapi(e)))
                if e.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST.0 as i32) =>
            {
                return Ok(ServiceStatus::Unknown)
            }
            Err(e) => return Err(e),
        };

        Ok(match service.query_status()?.current_state {
            ServiceState::Stopped => ServiceStatus::Stopped,
            ServiceState::Running => ServiceStatus::Running,
            other => ServiceStatus::Other(format!("{:?}", other)),
        })
    }

    fn run(&self, program: Arc<dyn Program>) -> Result<()> {
        if !running_as_service() {
            return super::run_foreground(program.as_ref());
        }

        let registration = Registration { name: self.descriptor.name.clone(), program };
        if REGISTRATION.set(registration).is_err() {
            warn!("Service dispatcher was already registered");
        }

        service_dispatcher::start(&self.descriptor.name, ffi_service_main).map_err(ControlError::from)?;
        Ok(())
    }
}

fn service_main(arguments: Vec<OsString>) {
    debug!("Started service_main: {:?}", arguments);

    let Some(registration) = REGISTRATION.get() else {
        error!("service_main called without a registered program");
        return;
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let event_handler = move |control_event| -> ServiceControlHandlerResult {
        info!("Received ServiceControl Event: {:?}", control_event);
        match control_event {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                let _ = shutdown_tx.send(());
                ServiceControlHandlerResult::NoError
            }
            // All services must accept Interrogate even if it's a no-op.
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    };

    let status_handle = match service_control_handler::register(&registration.name, event_handler) {
        Ok(status_handle) => status_handle,
        Err(e) => {
            error!("Register service event handler failed: {:?}", e);
            return;
        }
    };

    if set_service_status(&status_handle, ServiceState::StartPending, 0).is_err() {
        return;
    }

    if let Err(e) = registration.program.start() {
        error!("Starting service: {}", e);
        let _ = set_service_status(&status_handle, ServiceState::Stopped, 1);
        return;
    }

    if set_service_status(&status_handle, ServiceState::Running, 0).is_ok() {
        let _ = shutdown_rx.recv();
        let _ = set_service_status(&status_handle, ServiceState::StopPending, 0);
    }

    let exit_code = match registration.program.stop() {
        Ok(()) => 0,
        Err(e) => {
            error!("Stopping service: {}", e);
            1
        }
    };

    let _ = set_service_status(&status_handle, ServiceState::Stopped, exit_code);
}

fn set_service_status(
    status_handle: &ServiceStatusHandle,
    current_state: ServiceState,
    exit_code: u32,
) -> Result<(), windows_service::Error> {
    let controls_accepted = match current_state {
        ServiceState::Running => ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        _ => ServiceControlAccept::empty(),
    };
    let exit_code = match exit_code {
        0 => ServiceExitCode::Win32(0),
        code => ServiceExitCode::ServiceSpecific(code),
    };

    let status = ScmStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state,
        controls_accepted,
        exit_code,
        checkpoint: 0,
        wait_hint: Duration::from_secs(10),
        process_id: None,
    };
    match status_handle.set_service_status(status) {
        Ok(_) => {
            debug!("Switched service to {:?}", current_state);
            Ok(())
        }
        Err(e) => {
            error!("Updating service status to {:?} failed: {:?}", current_state, e);
            Err(e)
        }
    }
}

/// Services run without a console attached.
pub fn running_as_service() -> bool {
    match unsafe { GetStdHandle(STD_ERROR_HANDLE) } {
        Ok(handle) => handle.is_invalid(),
        Err(_) => true,
    }
}
