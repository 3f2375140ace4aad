use clap::Parser;
use flowcount::config::{BackendKind, CliArgs, Settings};
use flowcount::{
    open_store, shutdown, sink, telemetry, CallbackClient, CountingBackend, FlowError, IngestServer,
    MemoryBackend, Result, StoreBackend, WindowScheduler, WindowedCounter,
};
use flowstore_core::RetentionSweeper;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    run(CliArgs::parse()).await?;
    Ok(())
}

async fn run(cli: CliArgs) -> Result<()> {
    let settings = Settings::new(cli)?;
    telemetry::init_tracing(&settings.log.level, settings.log.show_target)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let backend: Arc<dyn CountingBackend> = match settings.backend.kind {
        BackendKind::Memory => Arc::new(MemoryBackend::new(Arc::new(WindowedCounter::new()))),
        BackendKind::Persistent => {
            let store = open_store(&settings.store).await?;
            info!(
                connection = %settings.store.connection,
                pool_max = settings.store.pool_max,
                "Persistent key store ready"
            );
            let sweeper = RetentionSweeper::new(
                store.clone(),
                settings.store.retention(),
                settings.store.cleanup_interval(),
            );
            tasks.push(tokio::spawn(sweeper.run(shutdown::wait_for(stop_rx.clone()))));
            Arc::new(StoreBackend::new(store))
        }
    };
    info!(backend = ?settings.backend.kind, "Counting backend selected");

    let sink = sink::from_config(&settings.sink, CallbackClient::new(settings.sink.timeout())?)?;
    info!(sink = ?settings.sink.kind, "Result sink configured");

    let scheduler = WindowScheduler::new(
        backend.clone(),
        sink,
        settings.window.interval(),
        settings.sink.timeout(),
    );
    let scheduler_stop = stop_rx.clone();
    tasks.push(tokio::spawn(async move {
        scheduler.run(shutdown::wait_for(scheduler_stop)).await
    }));

    let echo = if settings.echo.enabled {
        Some(CallbackClient::new(settings.echo.timeout())?)
    } else {
        None
    };
    let server = Arc::new(IngestServer::new(backend, echo, &settings.server.ingest_path));
    let listener = TcpListener::bind((settings.server.host.as_str(), settings.server.port)).await?;
    let server_task = tokio::spawn(server.serve(listener, shutdown::wait_for(stop_rx)));

    if let Err(e) = shutdown::signal().await {
        error!(error = %e, "Failed to listen for shutdown signals");
    }
    stop_tx.send_replace(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }
    server_task
        .await
        .map_err(|e| FlowError::Http(format!("ingest server task failed: {e}")))??;

    info!("flowcount stopped");
    Ok(())
}
