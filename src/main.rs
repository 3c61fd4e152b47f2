use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    response::IntoResponse,
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use credit_ledger::{
    catalog::DODO_PRODUCTS,
    config::Config,
    db::{
        account_repository::AccountRepository,
        postgres_account_repository::PostgresAccountRepository,
        postgres_transaction_repository::PostgresTransactionRepository,
        transaction_repository::TransactionRepository,
    },
    responses::JsonResponse,
    services::{dodo::LiveDodoService, identity::IdentityVerifier, ledger::CreditLedger},
    utils::jwt::JwtKeys,
    worker, AppState,
};

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(sentry_tracing::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    // Errors reach Sentry only when a DSN is configured; the guard flushes on exit.
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let jwt_keys = JwtKeys::from_secret(std::env::var("JWT_SECRET").unwrap_or_default())
        .context("invalid JWT_SECRET")?;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit.per_millisecond)
            .burst_size(config.rate_limit.burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .ok_or_else(|| anyhow!("invalid rate limiter settings"))?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let pg_pool = establish_connection(&config.database_url).await?;
    let accounts = Arc::new(PostgresAccountRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn AccountRepository>;
    let transactions = Arc::new(PostgresTransactionRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn TransactionRepository>;

    let payments = LiveDodoService::from_settings(&config.dodo, &config.app_url)
        .context("failed to build Dodo Payments client")?;
    if config.dodo.webhook_secret.is_none() {
        tracing::warn!("DODO_PAYMENTS_WEBHOOK_SECRET is not set; every webhook will be refused");
    }

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("webhook-id"),
            HeaderName::from_static("webhook-timestamp"),
            HeaderName::from_static("webhook-signature"),
        ])
        .allow_credentials(true);

    let state = AppState {
        ledger: Arc::new(CreditLedger::new(
            accounts.clone(),
            transactions.clone(),
            DODO_PRODUCTS.clone(),
        )),
        accounts,
        transactions,
        payments: Arc::new(payments),
        identity: Arc::new(IdentityVerifier::new(config.supabase_jwt_secret.as_deref())),
        jwt_keys: Arc::new(jwt_keys),
        config: Arc::new(config),
    };
    let addr = state.config.bind_addr;

    let _reconciler = worker::start_background_workers(state.clone()).await;

    let app = credit_ledger::app(state)
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);
    let make_service = app.into_make_service_with_connect_info::<std::net::SocketAddr>();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
