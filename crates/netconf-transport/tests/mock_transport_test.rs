//! Integration test for MockTransport

use netconf_transport::{Credentials, MockTransport, Target, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_mock_transport_bidirectional() {
    let (transport, mut device) = MockTransport::create_pair();
    let target = Target::new("192.0.2.1", 830).with_credentials(Credentials::Password {
        username: "admin".to_string(),
        password: "admin".to_string(),
    });

    let mut channel = transport.open(&target).await.unwrap();
    assert_eq!(transport.name(), "mock");

    // Client writes, device reads
    channel.write(b"<hello/>]]>]]>").await.unwrap();
    let mut buf = [0u8; 14];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"<hello/>]]>]]>");

    // Device writes, client reads
    device.write_all(b"<rpc-reply/>").await.unwrap();
    let received = channel.read().await.unwrap();
    assert_eq!(&received[..], b"<rpc-reply/>");

    // Device hangs up
    drop(device);
    assert!(matches!(channel.read().await, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_split_halves_and_close() {
    let (transport, mut device) = MockTransport::create_pair();
    let channel = transport.open(&Target::new("localhost", 830)).await.unwrap();

    let (mut reader, mut writer, mut handle) = channel.into_parts();
    assert_eq!(handle.peer(), "mock-device");

    writer.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    device.write_all(b"pong").await.unwrap();
    reader.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    handle.close().await.unwrap();
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_failing_transport_keeps_error_kind() {
    let transport = MockTransport::failing(TransportError::Auth {
        username: "admin".to_string(),
        reason: "credentials rejected".to_string(),
    });

    let result = transport.open(&Target::new("localhost", 830)).await;
    assert!(matches!(result, Err(TransportError::Auth { .. })));
}
