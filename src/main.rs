use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use remindflow::config::Config;
use remindflow::gateway::{LineClient, MessagingGateway};
use remindflow::reminders::{Dispatcher, PgReminderStore, ReminderService, ReminderStore};
use remindflow::{db, webhook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = Config::from_env()?;
    info!(
        "remindflow starting... tz={} max_retry={} batch={} interval={}s bind={}",
        cfg.default_timezone.name(),
        cfg.max_retry,
        cfg.dispatch_batch_size,
        cfg.dispatch_interval_secs,
        cfg.bind_addr
    );

    let pool = db::make_pool(&cfg).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store: Arc<dyn ReminderStore> = Arc::new(PgReminderStore::new(pool));
    let gateway: Arc<dyn MessagingGateway> =
        Arc::new(LineClient::new(cfg.line_channel_access_token.clone()));
    let service = Arc::new(ReminderService::new(store.clone()));
    let dispatcher = Dispatcher::new(
        store,
        gateway.clone(),
        cfg.max_retry,
        cfg.dispatch_batch_size,
        cfg.stale_sending_secs,
    );

    let state = webhook::AppState {
        service,
        gateway,
        channel_secret: cfg.line_channel_secret.clone(),
        default_timezone: cfg.default_timezone,
        allowed_groups: cfg.allowed_groups.clone(),
    };
    let app = webhook::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!("webhook listening on {}", cfg.bind_addr);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("webhook server exited: {err}");
        }
    });

    let mut tick = tokio::time::interval(Duration::from_secs(cfg.dispatch_interval_secs));
    loop {
        tick.tick().await;
        match dispatcher.run_once().await {
            Ok(stats) => {
                if stats.claimed > 0 || stats.released > 0 || stats.skipped > 0 {
                    info!(
                        "dispatch tick: released={} claimed={} sent={} retried={} failed={} skipped={}",
                        stats.released,
                        stats.claimed,
                        stats.sent,
                        stats.retried,
                        stats.failed,
                        stats.skipped
                    );
                }
            }
            Err(err) => error!("dispatch tick failed: {err:#}"),
        }
    }
}
