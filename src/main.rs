use anyhow::Result;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;

use mottobot::prelude::*;
use mottobot::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting mottobot v{}", VERSION);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config = match BotConfig::load(Path::new(&config_path)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            // Nothing is connected yet; a broken configuration is fatal.
            error!("Config file invalid: {:#}", e);
            std::process::exit(1);
        }
    };

    let storage = Arc::new(AirtableStorage::new(
        &config.authentication.airtable_base,
        &config.authentication.airtable_key,
        config.bot_id.clone(),
        config.random_source_view.clone(),
    )?);

    let mut transport =
        DiscordTransport::new(&config.authentication.discord_token, &config.watching_status);
    transport.connect().await?;
    let transport: Arc<dyn ChatTransport> = Arc::new(transport);

    let bot = Arc::new(MottoBot::new(config, storage, transport)?);
    bot.run().await
}
