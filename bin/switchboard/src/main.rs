use switchboard::run_services;
use switchboard_config::load_config;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let config_file_path = std::env::args()
    .nth(1)
    .unwrap_or("./config.json".to_string());

  // The logger is configured from the file, so errors before that go to stderr.
  let config = match load_config(&config_file_path, |key| std::env::var(key).ok()) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("failed to load configuration from {}: {}", config_file_path, e);
      std::process::exit(1);
    }
  };

  let logger_config = config.logger.clone().unwrap_or_default();
  let global_logger = switchboard_logger::logger_layer::build_logger(
    &logger_config.format,
    &logger_config.filter,
    logger_config.print_performance_info,
  )?;
  set_global_default(tracing_subscriber::registry().with(global_logger))?;

  run_services(config).await?;

  Ok(())
}
