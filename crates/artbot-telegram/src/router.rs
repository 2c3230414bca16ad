use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use artbot_core::{
    artwork::ArtworkProvider,
    config::Config,
    crosspost::CrosspostGroups,
    domain::UserId,
    interaction::{broker::ReactionBroker, Interactions},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    post_cache::PostCache,
    repost::RepostOrchestrator,
    store::SettingsStore,
};

use crate::handlers;
use crate::TelegramMessenger;

/// Long-lived services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub interactions: Interactions,
    pub orchestrator: Arc<RepostOrchestrator>,
    pub groups: Arc<CrosspostGroups>,
    pub store: Arc<dyn SettingsStore>,
    pub cache: Arc<PostCache>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn SettingsStore>,
        provider: Arc<dyn ArtworkProvider>,
    ) -> Self {
        let interactions = Interactions::new(messenger.clone(), ReactionBroker::new());
        let cache = PostCache::new(cfg.post_cache_ttl);
        let orchestrator = Arc::new(RepostOrchestrator::new(
            interactions.clone(),
            provider,
            cache.clone(),
            cfg.prompt_timeouts,
        ));
        Self {
            groups: Arc::new(CrosspostGroups::new(store.clone())),
            cfg,
            messenger,
            interactions,
            orchestrator,
            store,
            cache,
        }
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn SettingsStore>,
    provider: Arc<dyn ArtworkProvider>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    info!(username = %me.username(), "artbot started");
    info!(
        settings = %cfg.settings_file.display(),
        nsfw_default = cfg.guild_defaults.nsfw,
        provider = provider.name(),
        "configuration loaded"
    );

    // Prompts and widgets attach several buttons in a row; space them out to stay under
    // Telegram's flood limits. The adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        UserId(me.id.0 as i64),
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState::new(cfg, messenger, store, provider));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
