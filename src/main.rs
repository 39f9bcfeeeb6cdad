use std::{future::IntoFuture, process, sync::Arc};

use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt;
use tripwire::{
    application::error::AppError,
    cache::{
        CacheConfig, EntityCache, InvalidationCoordinator, InvalidationQueue, InvalidationTrigger,
        MemoryStorage, PageCache, SystemClock,
    },
    config::{self, ChainArgs, Command, Settings},
    domain::entities::EntityType,
    graph::{
        EXCLUDED_RELATIONS, ExcludedRelation, Relation, RelationEdge, RelationGraph,
        TRAVEL_RELATIONS,
    },
    infra::{
        db::PostgresStore,
        error::InfraError,
        http::{self, AdminState},
        origin::HttpOrigin,
        telemetry,
    },
    tracker::{ChangeTracker, TrackerOptions},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        report_application_error(&err);
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(AppError::from)?;
    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Serve(Box::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Chain(args) => run_chain(settings, args).await,
        Command::Relations => print_relations(),
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let store = init_store(&settings).await?;
    let graph = Arc::new(RelationGraph::introspect(store.as_ref(), TRAVEL_RELATIONS).await?);
    let tracker = Arc::new(ChangeTracker::new(
        graph,
        store.clone(),
        tracker_options(&settings),
    ));

    let cache_config = CacheConfig::from(&settings);
    let origin = Arc::new(
        HttpOrigin::new(&settings.origin.base_url, settings.origin.timeout)
            .map_err(AppError::from)?,
    );
    let entities = Arc::new(
        EntityCache::new(
            Arc::new(MemoryStorage::new(&cache_config)),
            origin,
            Arc::new(SystemClock),
        )
        .with_default_ttl(settings.cache.default_ttl_seconds),
    );
    let pages = Arc::new(PageCache::new(&cache_config));
    let queue = Arc::new(InvalidationQueue::new());
    let coordinator = Arc::new(InvalidationCoordinator::new(
        cache_config.clone(),
        tracker,
        entities,
        pages,
        queue.clone(),
    ));
    let trigger = Arc::new(InvalidationTrigger::new(
        cache_config,
        queue,
        coordinator.clone(),
    ));

    let consume_handle = coordinator.spawn_auto_consume();

    let admin_state = AdminState {
        db: store,
        invalidation: trigger,
    };
    let result = serve_admin(&settings, admin_state).await;

    if let Some(handle) = consume_handle {
        handle.abort();
        let _ = handle.await;
    }

    let flushed: usize = coordinator
        .consume_all()
        .await
        .iter()
        .map(|report| report.requests)
        .sum();
    if flushed > 0 {
        info!(requests = flushed, "Flushed pending invalidations before exit");
    }

    result
}

async fn run_chain(settings: Settings, args: ChainArgs) -> Result<(), AppError> {
    let store = init_store(&settings).await?;
    let graph = Arc::new(RelationGraph::introspect(store.as_ref(), TRAVEL_RELATIONS).await?);
    let tracker = ChangeTracker::new(graph, store, tracker_options(&settings));

    let closure = tracker
        .changed_entity_chain(&args.triggers, settings.tracker.include_deleted)
        .await?;

    info!(
        triggers = args.triggers.len(),
        closure = closure.len(),
        "Resolved dependency closure"
    );
    print_json(&closure)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationsReport {
    relations: &'static [Relation],
    excluded: &'static [ExcludedRelation],
    edges: Vec<TypeEdges>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TypeEdges {
    entity_type: EntityType,
    edges: Vec<RelationEdge>,
}

fn print_relations() -> Result<(), AppError> {
    let graph = RelationGraph::from_relations(TRAVEL_RELATIONS);
    let edges = EntityType::ALL
        .iter()
        .map(|entity_type| TypeEdges {
            entity_type: *entity_type,
            edges: graph.edges_from(*entity_type).to_vec(),
        })
        .filter(|entry| !entry.edges.is_empty())
        .collect();

    print_json(&RelationsReport {
        relations: TRAVEL_RELATIONS,
        excluded: EXCLUDED_RELATIONS,
        edges,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn tracker_options(settings: &Settings) -> TrackerOptions {
    TrackerOptions {
        layer_concurrency: settings.tracker.layer_concurrency.get(),
        deadline: settings.tracker.deadline,
    }
}

async fn init_store(settings: &Settings) -> Result<Arc<PostgresStore>, AppError> {
    let database_url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::from(InfraError::configuration(
            "database.url is required (set TRIPWIRE__DATABASE__URL or pass --database-url)",
        ))
    })?;

    let pool = PostgresStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresStore::new(
        pool,
        settings.database.soft_delete_column.as_str(),
    )))
}

async fn serve_admin(settings: &Settings, state: AdminState) -> Result<(), AppError> {
    let addr = settings.server.admin_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(addr, err)))?;
    info!(%addr, "Admin server listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let router = http::build_admin_router(state);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        },
    );
    let mut handle: JoinHandle<std::io::Result<()>> = tokio::spawn(server.into_future());

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = signalled_rx => {
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        grace = ?settings.server.graceful_shutdown,
                        "Graceful shutdown timed out; dropping open connections"
                    );
                    handle.abort();
                    return Ok(());
                }
            }
        }
    };

    joined
        .map_err(|err| AppError::unexpected(format!("admin server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}

fn report_application_error(err: &AppError) {
    let transient = err.is_transient();
    if dispatcher::has_been_set() {
        error!(error = %err, transient, "Application error");
        return;
    }

    let subscriber = fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    dispatcher::with_default(&dispatcher::Dispatch::new(subscriber), || {
        error!(error = %err, transient, "Application error");
    });
}
