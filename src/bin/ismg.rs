// ABOUTME: Command-line entry point for the simulated CMPP gateway
// ABOUTME: Loads YAML configuration, serves until Ctrl-C and then shuts down gracefully

use argh::FromArgs;
use ismg::config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const CONFIG_ENV: &str = "ISMG_CONF_PATH";

/// Simulated CMPP short message gateway
#[derive(FromArgs)]
struct CliArgs {
    /// port to listen on (default: 7890)
    #[argh(option, short = 'p', default = "7890")]
    port: u16,

    /// run on a multi-threaded runtime instead of a single thread
    #[argh(switch)]
    multicore: bool,

    /// path to a YAML configuration file (default: $ISMG_CONF_PATH, then built-in defaults)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// log at debug level
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn load_config(path: Option<PathBuf>) -> Result<Config, ismg::config::ConfigError> {
    match path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Config::from_yaml_file(path)
        }
        None => {
            info!("no configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

fn main() -> ExitCode {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    let config = match load_config(cli_args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = if cli_args.multicore {
        tokio::runtime::Builder::new_multi_thread()
    } else {
        tokio::runtime::Builder::new_current_thread()
    }
    .enable_all()
    .build();
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match runtime.block_on(ismg::server::run(config, cli_args.port, shutdown)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("gateway failed: {e}");
            ExitCode::FAILURE
        }
    }
}
