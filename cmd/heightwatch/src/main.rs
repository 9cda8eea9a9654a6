use std::process::ExitCode;

use clap::Parser;
use heightwatch_monitor::{
    engine::RunContext,
    storage::{JsonFileStore, ResultStore},
    timefmt::unix_now,
};
use tracing::{error, info};

mod cli;
mod initializers;

use crate::{
    cli::Options,
    initializers::{init_alerter, init_engine, init_tracing},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let opts = Options::parse();
    init_tracing(&opts);

    match run(&opts).await {
        Ok(true) => {
            info!("Job finished successfully");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!("Job failed");
            ExitCode::FAILURE
        }
        Err(error) => {
            error!(error = %error, "heightwatch run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(opts: &Options) -> Result<bool, String> {
    let config = opts.to_config().map_err(|error| error.to_string())?;
    let engine = init_engine(&config).map_err(|error| error.to_string())?;
    let alerter = init_alerter(&config).map_err(|error| error.to_string())?;

    let store = JsonFileStore::new(config.results_path.clone());
    let previous = store.load_all().map_err(|error| error.to_string())?;

    let ctx = RunContext {
        now: unix_now(),
        notifier: &alerter,
    };
    let run = engine.run_all(&ctx, &previous).await;

    store
        .save_all(&run.results)
        .map_err(|error| error.to_string())?;
    info!(path = %store.path().display(), "results saved");

    Ok(run.ok)
}
