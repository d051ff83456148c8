//! Full-stack test: a real listener, a raw HTTP/1.1 exchange, and a graceful
//! shutdown.

mod common;

use common::echo_api;
use common::test_logger;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use turnstile::ConfigTurnstile;
use turnstile::HttpServerStarter;

#[tokio::test]
async fn test_server_round_trip() {
    let config = ConfigTurnstile::default();
    let log = test_logger();
    let starter = HttpServerStarter::new(&config, echo_api(), &log).unwrap();
    let server = starter.start();
    let addr = server.local_addr();
    assert_ne!(addr.port(), 0);

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"PUT /hello HTTP/1.1\r\n\
              host: localhost\r\n\
              connection: close\r\n\
              content-length: 0\r\n\r\n",
        )
        .await
        .unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", text);
    assert!(text.ends_with("hello"), "got: {}", text);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_server_shutdown_stops_accepting() {
    let config = ConfigTurnstile::default();
    let log = test_logger();
    let starter = HttpServerStarter::new(&config, echo_api(), &log).unwrap();
    let addr = starter.local_addr();
    let server = starter.start();
    server.close().await.unwrap();

    // The listener is gone once close() returns.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
