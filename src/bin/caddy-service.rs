use std::process::ExitCode;

use caddy_service::{service, Cli};

fn main() -> ExitCode {
    let cli = Cli::init();

    let _log_handle = match cli.log_config().setup(&cli.name) {
        Ok(handle) => Some(handle),
        Err(e) => {
            println!("Error setting up logging: {}", e);
            None
        }
    };

    match service::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", e);
            ExitCode::FAILURE
        }
    }
}
