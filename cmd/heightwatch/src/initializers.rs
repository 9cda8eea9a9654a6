use heightwatch_monitor::{
    alerter::{AlertError, Alerter},
    collector::{
        CliHeightSource, HeightSource, HttpExplorerSource, RpcHeightSource, SourceError,
    },
    config::{HeightTransport, MonitorConfig},
    engine::StepEngine,
    explorer::{ExplorerStallDetector, ExplorerStep},
    heights::{HeightStallDetector, HeightsStep},
};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, filter::Directive};

use crate::cli::Options;

pub fn init_tracing(opts: &Options) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();

    let include_target = matches!(opts.log_level, Level::DEBUG | Level::TRACE);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_target(include_target)
        .init();
}

/// Registers the checks in the order they must run: heights first, since the
/// explorer check means nothing while the network itself is down.
pub fn init_engine(config: &MonitorConfig) -> Result<StepEngine, SourceError> {
    let height_source: Box<dyn HeightSource> = match &config.heights {
        HeightTransport::Cli { binary, address } => Box::new(CliHeightSource::new(
            binary.clone(),
            address.clone(),
            config.request_timeout,
        )),
        HeightTransport::Rpc { url } => {
            Box::new(RpcHeightSource::new(url.clone(), config.request_timeout)?)
        }
    };

    let mut engine = StepEngine::default().with_step(Box::new(HeightsStep::new(
        height_source,
        HeightStallDetector::new(config.min_interval),
    )));

    if let Some(url) = &config.explorer_url {
        let source = HttpExplorerSource::new(url.clone(), config.request_timeout)?;
        engine = engine.with_step(Box::new(ExplorerStep::new(
            Box::new(source),
            ExplorerStallDetector::new(config.min_interval),
        )));
    }

    info!(steps = ?engine.step_names(), "checks registered");
    Ok(engine)
}

pub fn init_alerter(config: &MonitorConfig) -> Result<Alerter, AlertError> {
    Alerter::from_config(
        config.chat.as_ref(),
        config.pager.as_ref(),
        config.request_timeout,
    )
}
