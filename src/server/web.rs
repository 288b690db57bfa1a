use std::{future::Future, net::SocketAddr};

use tokio::sync::broadcast;
use warp::Filter;

use super::shared::Message;
use crate::config::ServerConfig;

/// Bind the site listener. Must be called from within a tokio runtime.
pub fn bind(
    config: &ServerConfig,
    addr: SocketAddr,
    mut message_rx: broadcast::Receiver<Message>,
) -> Result<(SocketAddr, impl Future<Output = ()> + 'static), warp::Error> {
    let site_route = warp::get().and(warp::fs::dir(config.root.clone()));

    let route = warp::any().and(site_route).map(|reply| {
        warp::reply::with_header(reply, "server", format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }).with(warp::log(module_path!()));

    warp::serve(route).try_bind_with_graceful_shutdown(addr, async move {
        while let Ok(msg) = message_rx.recv().await {
            if msg == Message::Shutdown {
                break;
            }
        }
    })
}
