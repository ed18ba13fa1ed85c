//! Spins up a 3-node cluster on loopback TCP, joins two nodes onto a seed,
//! waits for both view changes to land, then lets the seed leave and shows
//! the remaining two nodes converge.

use rapid::{join, start, Endpoint, Metadata, RapidSettings, TcpMessagingClient, TcpMessagingServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn node(port: u16) -> (Endpoint, Arc<TcpMessagingClient>, TcpListener) {
    let endpoint = Endpoint::new("127.0.0.1".to_string(), port);
    let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("bind");
    let settings = RapidSettings::default();
    let client = Arc::new(TcpMessagingClient::new(settings.messaging_client_join_request_timeout()));
    (endpoint, client, listener)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = RapidSettings::default();

    let (seed_endpoint, seed_client, seed_listener) = node(7000).await;
    let seed = start(seed_endpoint.clone(), Metadata::new(), settings.clone(), seed_client)?;
    tokio::spawn(TcpMessagingServer::serve(seed_listener, Arc::new(seed.clone())));

    let (ep_a, client_a, listener_a) = node(7001).await;
    let node_a = join(ep_a.clone(), seed_endpoint.clone(), Metadata::new(), settings.clone(), client_a).await?;
    tokio::spawn(TcpMessagingServer::serve(listener_a, Arc::new(node_a.clone())));

    let (ep_b, client_b, listener_b) = node(7002).await;
    let node_b = join(ep_b.clone(), seed_endpoint.clone(), Metadata::new(), settings.clone(), client_b).await?;
    tokio::spawn(TcpMessagingServer::serve(listener_b, Arc::new(node_b.clone())));

    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("seed sees {} members", seed.get_member_list().await.len());
    println!("node_a sees {} members", node_a.get_member_list().await.len());
    println!("node_b sees {} members", node_b.get_member_list().await.len());

    seed.shutdown().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("after the seed leaves, node_a sees {} members", node_a.get_member_list().await.len());

    node_a.shutdown().await;
    node_b.shutdown().await;
    Ok(())
}
