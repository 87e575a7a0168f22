use anyhow::Result;
use data_ingestion::config::ProviderConfig;
use data_ingestion::logger::init_logger;
use ensemble_server::config::PipelineConfig;
use ensemble_server::server::Server;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logger();

    let provider = ProviderConfig::from_env()?;
    let pipeline = PipelineConfig::from_env()?;
    info!(
        "Starting with period {}, horizon {}, fill policy {:?}",
        provider.period, pipeline.horizon, pipeline.fill_policy
    );

    let server = Server::init(provider, pipeline)?;
    server.run().await?;

    info!("Server has been shut down gracefully");
    Ok(())
}
