use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banking_api::config::Config;
use banking_api::domain::{
    AccountService, AdminService, Notifier, TransactionService, UserService,
};
use banking_api::email::{EmailSink, Mailer};
use banking_api::rest::{create_router, AppState};
use banking_api::storage::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banking_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    info!("Setting up database");
    let db = Db::connect(&config.database_url).await?;

    let mailer = Mailer::from_config(&config)?;
    let notifier = Notifier::spawn(Arc::new(EmailSink::new(mailer.clone())));

    let state = AppState {
        config: config.clone(),
        user_service: UserService::new(db.clone(), mailer, config.clone()),
        account_service: AccountService::new(db.clone()),
        transaction_service: TransactionService::new(db.clone(), notifier),
        admin_service: AdminService::new(db),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
