use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use log::{debug, info};

use super::{
    control::{ServiceManager, ServiceStatus},
    descriptor::ServiceDescriptor,
    lifecycle::Program,
};
use crate::error::{ControlError, Result};

const UNIT_DIR: &str = "/etc/systemd/system";

/// Manages the service as a systemd unit through `systemctl`.
pub struct SystemdManager {
    descriptor: ServiceDescriptor,
    unit_dir: PathBuf,
}

impl SystemdManager {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self::with_unit_dir(descriptor, UNIT_DIR)
    }

    pub fn with_unit_dir(descriptor: ServiceDescriptor, unit_dir: impl Into<PathBuf>) -> Self {
        Self { descriptor, unit_dir: unit_dir.into() }
    }

    fn unit_name(&self) -> String {
        format!("{}.service", self.descriptor.name)
    }

    fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit_name())
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), ControlError> {
        debug!("Run systemctl {}", args.join(" "));
        let output = Command::new("systemctl").args(args).output()?;

        if !output.status.success() {
            return Err(ControlError::Command {
                command: format!("systemctl {}", args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn unit_verb(&self, verb: &str) -> Result<(), ControlError> {
        if !self.unit_path().is_file() {
            return Err(ControlError::NotInstalled(self.descriptor.name.clone()));
        }
        self.systemctl(&[verb, &self.unit_name()])?;
        info!("Service {}: {}", self.descriptor.name, verb);
        Ok(())
    }
}

impl ServiceManager for SystemdManager {
    fn install(&self) -> Result<(), ControlError> {
        let path = self.unit_path();
        if path.exists() {
            return Err(ControlError::AlreadyInstalled(self.descriptor.name.clone()));
        }

        let executable = std::env::current_exe()?;
        fs::write(&path, unit_file(&self.descriptor, &executable))?;
        debug!("Wrote unit file {}", path.display());

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.unit_name()])?;
        info!("Service {} installed", self.descriptor.name);
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ControlError> {
        self.unit_verb("disable")?;
        fs::remove_file(self.unit_path())?;
        self.systemctl(&["daemon-reload"])?;
        info!("Service {} uninstalled", self.descriptor.name);
        Ok(())
    }

    fn start(&self) -> Result<(), ControlError> {
        self.unit_verb("start")
    }

    fn stop(&self) -> Result<(), ControlError> {
        self.unit_verb("stop")
    }

    fn restart(&self) -> Result<(), ControlError> {
        self.unit_verb("restart")
    }

    fn status(&self) -> Result<ServiceStatus, ControlError> {
        if !self.unit_path().is_file() {
            return Ok(ServiceStatus::Unknown);
        }

        // is-active exits non-zero for anything but "active", so read stdout directly.
        let output = Command::new("systemctl").args(["is-active", &self.unit_name()]).output()?;
        Ok(parse_active_state(String::from_utf8_lossy(&output.stdout).trim()))
    }

    fn run(&self, program: Arc<dyn Program>) -> Result<()> {
        super::run_foreground(program.as_ref())
    }
}

fn parse_active_state(state: &str) -> ServiceStatus {
    match state {
        "active" => ServiceStatus::Running,
        "inactive" | "failed" => ServiceStatus::Stopped,
        other => ServiceStatus::Other(other.to_string()),
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

fn unit_file(descriptor: &ServiceDescriptor, executable: &Path) -> String {
    let exec_start = std::iter::once(executable.to_string_lossy().into_owned())
        .chain(descriptor.arguments.iter().cloned())
        .map(|arg| quote(&arg))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "[Unit]
Description={description}
ConditionFileIsExecutable={executable}
After=network-online.target
Wants=network-online.target

[Service]
StartLimitInterval=5
StartLimitBurst=10
ExecStart={exec_start}
Restart=always
RestartSec=120

[Install]
WantedBy=multi-user.target
",
        description = descriptor.description,
        executable = executable.display(),
    )
}
