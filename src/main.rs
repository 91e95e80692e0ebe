use std::{future::IntoFuture, process, sync::Arc};

use pipecache::{
    application::error::AppError,
    cache::{CacheConfig, SystemClock, build_cache},
    config,
    infra::{
        error::InfraError,
        files::ContentRoot,
        http::{self, HttpState},
        telemetry,
    },
    pipeline::{CachingPipeline, PipelineSettings},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(_) => run_purge(settings),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = build_cache(&cache_config).map_err(InfraError::from)?;
    let pipeline = CachingPipeline::new(
        cache,
        Arc::new(SystemClock),
        PipelineSettings::from(&cache_config),
    );

    if !settings.content.root.is_dir() {
        warn!(
            root = %settings.content.root.display(),
            "content root does not exist; every request will be answered with 404"
        );
    }

    let state = HttpState {
        pipeline: Arc::new(pipeline),
        content: Arc::new(ContentRoot::new(settings.content.root.clone())),
    };

    serve_http(&settings, state).await
}

fn run_purge(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = build_cache(&cache_config)?;
    let removed = cache.len();
    cache.clear()?;
    info!(removed, backend = ?cache_config.backend, "cache purged");
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(timeout_secs = grace.as_secs(), "graceful shutdown timed out");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
