use std::{net::SocketAddr, process, sync::Arc};

use storefront::{
    application::{
        catalog::CatalogServices, error::AppError, health::HealthService,
    },
    cache::{CacheAside, CacheClient, CacheConfig},
    config::{self, CacheCommand},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, RateLimitState},
        telemetry,
    },
};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "storefront::main";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Cache(args) => run_cache_command(settings, args.command).await,
    }
}

async fn connect_database(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(PostgresRepositories::new(pool))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    connect_database(&settings).await?;
    info!(target = SOURCE, "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = Arc::new(connect_database(&settings).await?);

    let cache_config = CacheConfig::from(&settings.cache);
    let cache_client = CacheClient::from_config(&cache_config).await;
    if !cache_client.is_available() {
        warn!(
            target = SOURCE,
            backend = cache_config.backend.as_str(),
            "cache unavailable; serving straight from the database"
        );
    }

    let aside = CacheAside::new(cache_client.clone(), &cache_config);
    let state = HttpState {
        catalog: CatalogServices::new(repositories.catalog_stores(), aside),
        health: HealthService::new(repositories.clone(), cache_client.clone()),
        rate_limit: RateLimitState::new(
            settings.server.rate_limit_requests,
            settings.server.rate_limit_period,
        ),
    };

    let served = serve_http(&settings, state).await;
    cache_client.shutdown().await;
    repositories.pool().close().await;
    served
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = SOURCE, addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    // Give in-flight requests `grace` to finish once the signal fires.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(target = SOURCE, grace_secs = grace.as_secs(), "graceful shutdown timed out");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = SOURCE, error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target = SOURCE, "shutdown signal received");
}

async fn run_cache_command(
    settings: config::Settings,
    command: CacheCommand,
) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    if !cache_config.is_enabled() {
        return Err(InfraError::cache("cache is disabled or has no endpoint configured").into());
    }

    let client = CacheClient::from_config(&cache_config).await;
    let outcome = match command {
        CacheCommand::Ping => {
            if client.ping().await {
                println!("{}: PONG", client.backend_name());
                Ok(())
            } else {
                Err(InfraError::cache(format!(
                    "{} substrate did not answer",
                    cache_config.backend.as_str()
                ))
                .into())
            }
        }
        CacheCommand::Invalidate { prefix } => {
            if !client.is_available() {
                Err(InfraError::cache("cache substrate is unreachable").into())
            } else {
                let aside = CacheAside::new(client.clone(), &cache_config);
                let removed = aside.invalidate_prefix(&prefix).await;
                println!("removed {removed} entries under `{prefix}`");
                Ok(())
            }
        }
    };

    client.shutdown().await;
    outcome
}
