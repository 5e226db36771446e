//! Block watcher example
//!
//! Connects to a node, prints its version and head, then follows new
//! heads until Ctrl-C.
//!
//! Run with: cargo run --example block_watcher -- ws://localhost:8546

use async_web3::core::quantity::decode_quantity;
use async_web3::{ClientBuilder, SubscriptionKind};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
    hash: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,async_web3_client=debug".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8546".to_string());

    let client = ClientBuilder::new()
        .websocket(url.as_str())
        .request_timeout(Duration::from_secs(10))
        .with_default_connect_retry()
        .connect()
        .await?;

    println!("Connected to {}", client.client_version().await?);

    let head: String = client.request("eth_blockNumber", ()).await?;
    println!("Current head: {}", decode_quantity(&serde_json::Value::String(head))?);

    let mut heads = client.subscribe(SubscriptionKind::NewHeads, vec![]).await?;
    tracing::info!(subscription = heads.id(), "Following new heads");

    loop {
        tokio::select! {
            item = heads.next() => match item {
                Some(Ok(value)) => {
                    let header: Header = serde_json::from_value(value)?;
                    println!("Block {} {}", header.number, header.hash);
                }
                Some(Err(e)) => {
                    eprintln!("Subscription ended: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down");
                break;
            }
        }
    }

    if heads.is_open() {
        client.unsubscribe(&heads).await?;
    }
    client.close().await?;
    Ok(())
}
