//! Flextable Server
//!
//! warp routes over [`flex_core::FlexTables`], a TOML configuration file and
//! a graceful-shutdown runner.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api_error;
pub mod config;
pub mod routes;

use flex_core::FlexTables;
use std::future::Future;
use std::net::SocketAddr;

/// Serve `engine` on `addr` until `shutdown` resolves
///
/// # Errors
/// Fails only if the address cannot be bound.
pub async fn run_server(
    engine: FlexTables,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes::filters(engine)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!("Listening on http://{}", bound);
    server.await;
    Ok(())
}
