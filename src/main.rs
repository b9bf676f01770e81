use std::{process::ExitCode, sync::Arc};

use blipnote::{
    App, Cli, Clock, Config, FileKeyValueStore, LocalNotifier, MemoSession, Result, SystemClock,
};
use clap::Parser;
use log::{error, info};

pub fn initialize_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kv = FileKeyValueStore::open(&config.data_dir, config.storage_capacity_bytes)?;
    let notifier = LocalNotifier::new(Arc::clone(&clock));
    let session = MemoSession::open(&config, Arc::new(kv), Arc::new(notifier), Arc::clone(&clock))?;

    App::new(session, clock, config, cli.config, cli.verbose)
        .run(cli.command)
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
