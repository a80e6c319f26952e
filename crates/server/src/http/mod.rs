//! HTTP front end
//!
//! Thin warp layer over [`PeripheralService`]. Every peripheral call runs on
//! the blocking pool under the request deadline; a request that misses it is
//! answered with a timeout and its worker is told to stop at the next copy or
//! command boundary.

pub mod models;
mod response;
mod routes;

pub use response::{ApiError, handle_rejection};
pub use routes::routes;

use crate::error::PeripheralError;
use crate::service::PeripheralService;
use crate::usb::{CancelToken, UsbBus};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared state handed to every route
pub struct AppState<B: UsbBus> {
    service: Arc<PeripheralService<B>>,
    request_timeout: Duration,
}

// Manual impl: `B` itself need not be Clone
impl<B: UsbBus> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<B: UsbBus> AppState<B> {
    pub fn new(service: Arc<PeripheralService<B>>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    pub fn service(&self) -> &PeripheralService<B> {
        &self.service
    }

    /// Run a blocking peripheral operation under the request deadline
    pub async fn run_blocking<T, F>(&self, op: F) -> Result<T, PeripheralError>
    where
        T: Send + 'static,
        F: FnOnce(&PeripheralService<B>, &CancelToken) -> Result<T, PeripheralError>
            + Send
            + 'static,
    {
        let service = self.service.clone();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let worker = tokio::task::spawn_blocking(move || op(&service, &worker_cancel));

        match tokio::time::timeout(self.request_timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PeripheralError::Worker(e.to_string())),
            Err(_) => {
                warn!(
                    "Peripheral request exceeded {:?}, cancelling",
                    self.request_timeout
                );
                cancel.cancel();
                Err(PeripheralError::Timeout(self.request_timeout))
            }
        }
    }
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn serve<B, S>(state: AppState<B>, addr: SocketAddr, shutdown: S) -> Result<()>
where
    B: UsbBus,
    S: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    info!("Listening on http://{}", bound);
    server.await;

    info!("HTTP server stopped");
    Ok(())
}
