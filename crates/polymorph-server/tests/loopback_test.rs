//! End-to-end tests over real TCP sockets on localhost.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;

use polymorph_core::{CloseReason, SessionConfig, SessionState};
use polymorph_server::{ClientConfig, Received, Server, ServerError, ServerRuntimeConfig, connect};
use tokio::task::JoinHandle;

async fn start_server(table_size: u32) -> (SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        session: SessionConfig { table_size },
        ..Default::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();

    (addr, tokio::spawn(server.run()))
}

fn client_config(addr: SocketAddr, table_size: u32) -> ClientConfig {
    ClientConfig {
        server_address: addr.to_string(),
        session: SessionConfig { table_size },
        ..Default::default()
    }
}

#[tokio::test]
async fn server_echoes_messages() {
    let (addr, server) = start_server(4).await;
    let mut client = connect(&client_config(addr, 4)).await.unwrap();

    for line in ["hello world", "second message", "a third, longer message to echo"] {
        client.send(line.as_bytes()).await.unwrap();
        let reply = client.recv().await.unwrap();
        assert_eq!(reply, Some(Received::Message(format!("echo: {line}").into_bytes())));
    }

    // Three messages each way: six keys used out of four.
    assert_eq!(client.session().message_count(), 6);
    assert_eq!(client.session().regeneration_count(), 1);

    assert_eq!(client.close().await.unwrap(), CloseReason::Local);
    assert_eq!(client.state(), SessionState::Closed);

    server.abort();
}

#[tokio::test]
async fn concurrent_clients_are_independent() {
    let (addr, server) = start_server(4).await;

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let config = client_config(addr, 4);
            tokio::spawn(async move {
                let mut client = connect(&config).await.unwrap();
                for n in 0..5 {
                    let message = format!("client {i} message {n}");
                    client.send(message.as_bytes()).await.unwrap();
                    let reply = client.recv().await.unwrap();
                    assert_eq!(
                        reply,
                        Some(Received::Message(format!("echo: {message}").into_bytes()))
                    );
                }
                client.close().await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), CloseReason::Local);
    }

    server.abort();
}

#[tokio::test]
async fn mismatched_table_size_fails_closed() {
    let (addr, server) = start_server(4).await;
    let mut client = connect(&client_config(addr, 1)).await.unwrap();

    // Both tables start with the same key, so the server accepts the first
    // message. Its reply is sealed under key 1, which the client never
    // reaches with a one-key table.
    client.send(b"first message").await.unwrap();

    let err = client.recv().await.unwrap_err();
    assert!(err.is_fatal());

    server.abort();
}

#[tokio::test]
async fn invalid_config_rejected() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        session: SessionConfig { table_size: 0 },
        ..Default::default()
    };

    assert!(matches!(Server::bind(config).await, Err(ServerError::Config(_))));
}
