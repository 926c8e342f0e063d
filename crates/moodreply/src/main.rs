use anyhow::{Context, Result};
use tracing::{error, info};

use moodreply::app::App;
use moodreply::config::{Config, InstallPaths};
use moodreply::frontend::{self, HELP};
use moodreply::notify::notifier_for;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodreply=info".into()),
        )
        .init();

    let paths = InstallPaths::for_current_user()?;
    let config = Config::load(&paths.config)
        .await
        .with_context(|| format!("failed to load {}", paths.config.display()))?;
    info!(
        root = %paths.root.display(),
        worker = config.worker.enabled,
        notifications = config.notifications.enabled,
        "Loaded configuration"
    );

    let app = App::new(&paths, &config, notifier_for(config.notifications.backend));
    let console = frontend::spawn_stdin_reader(app.event_sender());
    println!("{HELP}");

    app.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await;

    console.abort();
    // The blocking stdin read would otherwise hold the runtime open.
    std::process::exit(0)
}
