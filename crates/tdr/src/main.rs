use std::sync::Arc;

use teloxide::Bot;

use tdr_core::{
    audit::AuditLogger,
    config::Config,
    dispatch::Dispatcher,
    onboarding::Onboarding,
    ports::SourceTransport,
    record::{JsonFileUserStore, UserStore},
    staging::StagingArea,
    transfer::TransferPipeline,
};
use tdr_gdrive::GoogleDrive;
use tdr_telegram::TelegramSource;

#[tokio::main]
async fn main() -> Result<(), tdr_core::Error> {
    tdr_core::logging::init("tdr")?;

    let cfg = Arc::new(Config::load()?);

    // Both the Bot API and Drive calls share one transport timeout.
    let http = teloxide::net::default_reqwest_settings()
        .timeout(cfg.http_timeout)
        .build()
        .map_err(|e| tdr_core::Error::Config(format!("http client build failed: {e}")))?;
    let bot = Bot::with_client(cfg.telegram_bot_token.clone(), http.clone());

    let store: Arc<dyn UserStore> = Arc::new(JsonFileUserStore::open(&cfg.user_store_path).await?);
    let staging = Arc::new(StagingArea::new(&cfg.staging_dir));
    let source: Arc<dyn SourceTransport> = Arc::new(TelegramSource::new(bot.clone()));
    let drive = Arc::new(GoogleDrive::new(http, cfg.drive_upload_base.clone()));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Onboarding::new(store.clone(), cfg.min_folder_id_len),
        TransferPipeline::new(
            store,
            source.clone(),
            drive,
            staging.clone(),
            cfg.share_base.clone(),
        ),
        source,
        audit,
        cfg.max_credential_bytes,
    ));

    tracing::info!(
        store = %cfg.user_store_path.display(),
        upload_base = %cfg.drive_upload_base,
        "relay configured"
    );

    tdr_telegram::router::run_polling(bot, cfg, staging, dispatcher)
        .await
        .map_err(|e| tdr_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
