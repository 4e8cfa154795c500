//! Server setup and the serve loop

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use pgo_store::ProfileStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::routes;
use crate::state::AppState;

/// Build the application router over `store`.
pub fn create_app(store: Arc<dyn ProfileStore>) -> Router {
    routes::create_router()
        .with_state(AppState::new(store))
        .layer(TraceLayer::new_for_http())
}

/// Serve `store` on `listener` until `shutdown` resolves.
///
/// After the signal, in-flight requests get `grace` to finish; whatever is
/// still running then is dropped. The store is not closed here.
///
/// # Errors
///
/// Returns `ServerError::Io` if the listener fails.
pub async fn run_server<F>(
    listener: TcpListener,
    store: Arc<dyn ProfileStore>,
    shutdown: F,
    grace: Duration,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("pgo server listening on {}", addr);

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown.await;
        info!("Shutdown signal received, draining requests");
        let _ = signalled_tx.send(());
    };

    let app = create_app(store).into_make_service_with_connect_info::<SocketAddr>();
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();

    let deadline = async move {
        if signalled_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        biased;
        result = serve => result?,
        () = deadline => {
            warn!(grace_secs = grace.as_secs_f64(), "Grace period elapsed, dropping in-flight requests");
        }
    }

    info!("pgo server stopped");
    Ok(())
}
