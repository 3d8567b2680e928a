use std::{process, sync::Arc, time::Duration};

use strato::{
    cache::{CacheConfig, CacheManager, ComputeError, RedisBackend, RemoteCache},
    config,
    infra::{
        error::InfraError,
        http::{self, OpsState},
        telemetry,
    },
    monitor::PerformanceMonitor,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_startup_error(&error);
        process::exit(1);
    }
}

fn report_startup_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "startup error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "startup error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), InfraError> {
    // Construction order: monitor first so the cache layers can report into
    // it from their very first operation.
    let monitor = Arc::new(PerformanceMonitor::new(settings.monitor.clone()));

    let cache_config = CacheConfig::from(&settings);
    let backend = RedisBackend::open(&settings.redis.url, cache_config.op_timeout)?;
    let remote = Arc::new(RemoteCache::new(
        Arc::new(backend),
        monitor.clone(),
        &cache_config,
    ));
    let manager = Arc::new(CacheManager::new(
        remote.clone(),
        monitor.clone(),
        cache_config,
    ));

    register_warmup_sources(&manager, &remote, &settings);
    if manager.hot_key_count() > 0 {
        manager.warm_up().await;
    }

    serve_http(
        &settings,
        OpsState {
            manager,
            remote,
            monitor,
        },
    )
    .await
}

/// Configured hot keys are warmed by refreshing them from the distributed
/// tier; a key with no upstream value is reported as a warmup failure.
fn register_warmup_sources(
    manager: &Arc<CacheManager>,
    remote: &Arc<RemoteCache>,
    settings: &config::Settings,
) {
    for key_settings in &settings.warmup.keys {
        let ttl = key_settings.ttl.unwrap_or(settings.cache.default_ttl);
        let key = key_settings.key.clone();
        let remote = remote.clone();
        manager.register_hot_key(
            key.clone(),
            ttl,
            Arc::new(move || {
                let remote = remote.clone();
                let key = key.clone();
                Box::pin(async move {
                    match remote.get(&key).await {
                        Ok(Some(value)) => Ok(value),
                        Ok(None) => Err(ComputeError::new(format!(
                            "`{key}` has no upstream value to warm from"
                        ))),
                        Err(err) => Err(ComputeError::new(err.to_string())),
                    }
                })
            }),
        );
    }
}

async fn serve_http(settings: &config::Settings, state: OpsState) -> Result<(), InfraError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    info!(
        target: "strato::startup",
        addr = %settings.server.addr,
        "operator endpoints listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(InfraError::from)
}

async fn shutdown_signal(drain_budget: Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(
        drain_budget_secs = drain_budget.as_secs(),
        "shutdown signal received, draining connections"
    );
    // hard stop if draining outlives the budget
    tokio::spawn(async move {
        tokio::time::sleep(drain_budget).await;
        warn!("graceful shutdown budget elapsed, exiting");
        process::exit(0);
    });
}
