use clap::{ArgMatches, Command};

/// Flags that configure the service wrapper itself. These are never passed
/// on to the service launch command.
const SERVICE_FLAGS: &[&str] = &["name", "service"];

pub const DESCRIPTION: &str = "Caddy's service";

/// How the service is registered with the OS service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub arguments: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, arguments: Vec<String>) -> Self {
        Self {
            name: name.to_lowercase(),
            display_name: name.to_string(),
            description: DESCRIPTION.to_string(),
            arguments,
        }
    }
}

/// Reconstruct `-flag=value` arguments for every flag that was set to
/// something other than its default, in registration order.
pub fn collect_arguments(command: &Command, matches: &ArgMatches) -> Vec<String> {
    command
        .get_arguments()
        .filter_map(|arg| {
            let long = arg.get_long()?;
            if SERVICE_FLAGS.contains(&long) {
                return None;
            }

            let value = matches
                .get_raw(arg.get_id().as_str())?
                .map(|v| v.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(",");
            let default = arg
                .get_default_values()
                .iter()
                .map(|v| v.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(",");

            if value == default {
                return None;
            }

            Some(format!("-{}={}", long, value))
        })
        .collect()
}
