use sensor_gather::config::GatherConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    log::info!("Logging initialized");

    sensor_gather::run(GatherConfig::default()).await
}
