use quill_api::{
    config::{Env, InitError, get_env, install_tracing},
    server::{self, AuthSettings, ServerState, cache::PageCache, media::MediaStore},
};
use quill_db::{Database, client::DbClient, memory::MemoryDb};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

async fn connect_database(env: &Env) -> Result<Arc<dyn Database>, InitError> {
    let Some(database_url) = &env.database_url else {
        warn!("DATABASE_URL not set, keeping all data in memory");
        return Ok(Arc::new(MemoryDb::new(env.worker_id, env.process_id)));
    };

    let client = DbClient::connect(database_url, env.worker_id, env.process_id).await?;
    client.migrate().await?;

    Ok(Arc::new(client))
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(%err, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = cancellation_token.cancelled() => {},
    }

    info!("Shutting down");
    cancellation_token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db = connect_database(&env).await?;
    let page_cache = Arc::new(PageCache::new(
        env.page_cache_ttl()?,
        env.page_cache_max_entries.max(1),
    ));
    let state = ServerState {
        db,
        page_cache: Arc::clone(&page_cache),
        media: Arc::new(MediaStore::new(env.media_root.clone())),
        auth_settings: AuthSettings {
            token_lifetime: env.auth_token_lifetime()?,
        },
    };

    let cancellation_token = CancellationToken::new();
    let pruner = tokio::spawn(page_cache.prune_periodically(cancellation_token.clone()));

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, server::app(state))
        .with_graceful_shutdown(shutdown_signal(cancellation_token.clone()))
        .await
        .map_err(InitError::TcpServe)?;

    cancellation_token.cancel();
    if let Err(err) = pruner.await {
        warn!(%err, "Page cache pruning task failed");
    }

    Ok(())
}
