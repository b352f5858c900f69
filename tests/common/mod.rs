//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wirehttp::{Handler, Server, ServerConfig, ServerHandle};

/// Start a server on an ephemeral local port.
pub async fn start_server<H: Handler>(handler: H) -> ServerHandle {
    start_server_with(ServerConfig::default(), handler).await
}

/// Start a server with `config`, forcing an ephemeral local port.
pub async fn start_server_with<H: Handler>(mut config: ServerConfig, handler: H) -> ServerHandle {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    Server::serve(config, handler).await.unwrap()
}

/// Send `request` verbatim and read until the server closes.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_to_close(&mut stream).await
}

/// Read until EOF, failing the test if the server hangs.
#[allow(dead_code)]
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    response
}

/// Split a raw response into head (without the blank line) and body.
#[allow(dead_code)]
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    (
        String::from_utf8(raw[..end].to_vec()).unwrap(),
        raw[end + 4..].to_vec(),
    )
}
