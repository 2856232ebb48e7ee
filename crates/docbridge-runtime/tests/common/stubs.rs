//! In-process stand-ins for the conversion server's HTTP contract.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use docbridge_core::ServiceEndpoint;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> ServiceEndpoint {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind stub server");
    let addr: SocketAddr = listener.local_addr().expect("stub address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });

    ServiceEndpoint::loopback(addr.port())
}

/// A loopback endpoint nothing is listening on.
pub fn closed_endpoint() -> ServiceEndpoint {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();
    ServiceEndpoint::loopback(port)
}
