use std::sync::Arc;

use tracing::info;

use artbot_core::{config::Config, store::JsonFileStore};
use artbot_pixiv::PixivClient;

#[tokio::main]
async fn main() -> Result<(), artbot_core::Error> {
    artbot_core::logging::init("artbot")?;

    let cfg = Arc::new(Config::load()?);

    let store =
        Arc::new(JsonFileStore::open(cfg.settings_file.clone(), cfg.guild_defaults).await?);
    let provider = Arc::new(PixivClient::new(cfg.pixiv_base_url.clone())?);
    info!(base_url = %cfg.pixiv_base_url, "pixiv provider ready");

    artbot_telegram::router::run_polling(cfg, store, provider)
        .await
        .map_err(|e| artbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
