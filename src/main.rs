use std::env;
use std::process::ExitCode;

use log::{error, info};

use rustyserv::config::Config;
use rustyserv::net::server::Server;
use rustyserv::net::shutdown::{ShutdownToken, install_sigint_handler};

const DEFAULT_CONFIG_PATH: &str = "./config/default.config";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [path to config file]", args[0]);
        return ExitCode::FAILURE;
    }
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownToken::new();
    install_sigint_handler(&shutdown);

    let mut server = match Server::new(config, shutdown) {
        Ok(server) => server,
        Err(e) => {
            error!("cannot create poller: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = server.bind() {
        error!("startup failed: {e}");
        return ExitCode::FAILURE;
    }

    server.run();
    info!("shutdown complete");
    ExitCode::SUCCESS
}
