use lsh_store::cli::Cli;
use lsh_store::error::AppError;
use lsh_store::telemetry::{self, TelemetryConfig};
use lsh_store::{Config, StorageFactory};
use tracing::{debug, error};

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    telemetry::init_logging(cli.log_level())?;
    let telemetry = telemetry::init_telemetry_with_config(TelemetryConfig {
        enable_metrics: cli.print_metrics,
    })?;

    let config = Config::from_sources(&cli)?;
    debug!(index = config.index, backends = ?config.storage.backend_names(), "configuration resolved");

    let storage = StorageFactory::new().create(&config.storage, config.index)?;
    let outcome = cli.command.execute(storage.as_ref());
    storage.close()?;

    let output = outcome.map_err(|e| {
        error!("{}", e);
        e
    })?;
    if let Some(value) = output {
        println!("{}", serde_json::to_string(&value)?);
    }

    if telemetry.metrics_enabled() {
        eprint!("{}", telemetry.render()?);
    }
    telemetry.shutdown()?;
    Ok(())
}
