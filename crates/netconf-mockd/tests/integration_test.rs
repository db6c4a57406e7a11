//! Integration tests for full client-device sessions

use netconf_client::{DeviceProfile, ErrorKind, Session, SessionOptions, SessionState};
use netconf_mockd::{Server, ServerConfig};
use netconf_proto::capability::{BASE_1_0, BASE_1_1};
use netconf_proto::{unchecked_subtree_filter, Datastore, Element, Filter, Framing};
use netconf_transport::{Target, TcpTransport};
use std::collections::BTreeMap;
use std::time::Duration;

const NOTIFICATION_CAPABILITY: &str =
    "urn:ietf:params:netconf:capability:notification:1.0?module=ietf-notifications";

const RUNNING: &str = r#"<interfaces xmlns="urn:ietf:params:xml:ns:yang:ietf-interfaces"><interface><name>eth0</name><enabled>true</enabled></interface><interface><name>eth1</name><enabled>false</enabled></interface></interfaces>"#;

fn device_config() -> ServerConfig {
    let mut schemas = BTreeMap::new();
    schemas.insert(
        "ietf-interfaces".to_string(),
        "module ietf-interfaces { namespace \"urn:ietf:params:xml:ns:yang:ietf-interfaces\"; }"
            .to_string(),
    );

    ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        session_id_start: 100,
        capabilities: vec![
            BASE_1_0.to_string(),
            BASE_1_1.to_string(),
            NOTIFICATION_CAPABILITY.to_string(),
            "urn:ietf:params:xml:ns:yang:ietf-interfaces?module=ietf-interfaces&revision=2018-02-20"
                .to_string(),
            "urn:example:acme?module=acme-widgets".to_string(),
        ],
        running: RUNNING.to_string(),
        schemas,
        ..Default::default()
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        rpc_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn target() -> Target {
    Target::new("mockd", 830)
}

#[tokio::test]
async fn test_end_to_end_config_and_notification() {
    let server = Server::new(device_config()).unwrap();
    let handle = server.handle();
    let transport = server.mock_transport();

    let session = Session::connect(&transport, &target(), options()).await.unwrap();
    assert_eq!(session.state().await, SessionState::Established);
    assert_eq!(session.session_id(), 100);
    assert_eq!(session.framing(), Framing::Chunked);
    assert!(session
        .raw_capabilities()
        .iter()
        .any(|c| c == NOTIFICATION_CAPABILITY));

    // Running datastore comes back as configured
    let data = session.get_config(Datastore::Running, None).await.unwrap();
    let expected = Element::parse(&format!("<data>{}</data>", RUNNING)).unwrap();
    assert_eq!(data.children, expected.children);

    // Subscribe, then inject one event
    session.create_subscription().await.unwrap();
    let event = Element::new("link-down")
        .with_namespace("urn:example:events")
        .with_child(Element::new("if-name").with_text("eth1"))
        .with_child(Element::new("reason").with_text("carrier lost"));
    assert_eq!(handle.inject(event.clone()), 1);

    let notification = session
        .take_notification(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(notification.event(), Some(&event));
    assert_eq!(notification.event_type, "link-down");
    assert!(notification.event_time.is_some());
    assert!(notification.raw.contains("<reason>carrier lost</reason>"));

    session.close().await.unwrap();
    session.close().await.unwrap();
    assert_eq!(session.state().await, SessionState::Closed);
    assert_eq!(
        session
            .take_notification(Duration::from_secs(5))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::ChannelClosed
    );
}

#[tokio::test]
async fn test_session_over_tcp() {
    let server = Server::new(device_config()).unwrap();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_task = tokio::spawn(async move { server.serve(listener).await });

    let target = Target::new(addr.ip().to_string(), addr.port());
    let session = Session::connect(&TcpTransport::new(), &target, options())
        .await
        .unwrap();

    assert_eq!(
        session.schema_modules(),
        vec!["acme-widgets", "ietf-interfaces", "ietf-notifications"]
    );
    let schema = session.get_schema("ietf-interfaces").await.unwrap();
    assert!(schema.starts_with("module ietf-interfaces"));

    let err = session.get_schema("acme-widgets").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Unchecked path filter narrows the reply to one interface
    let filter = Filter::Subtree(
        unchecked_subtree_filter(
            "interfaces@urn:ietf:params:xml:ns:yang:ietf-interfaces interface name=eth1",
        )
        .unwrap(),
    );
    let data = session.get(Some(&filter)).await.unwrap();
    let interfaces = data.child("interfaces").unwrap();
    assert_eq!(interfaces.children.len(), 1);
    assert_eq!(interfaces.children[0].child_text("enabled"), Some("false"));

    session.close().await.unwrap();
    server_task.abort();
}

#[tokio::test]
async fn test_device_errors_reach_the_caller() {
    let server = Server::new(device_config()).unwrap();
    let session = Session::connect(&server.mock_transport(), &target(), options())
        .await
        .unwrap();

    let err = session.dispatch(Element::new("commit")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RpcError);
    let netconf_client::NetconfError::Rpc(reply) = err else {
        panic!("expected rpc error");
    };
    assert!(reply.has_tag("operation-not-supported"));

    // No candidate datastore configured
    let err = session
        .get_config(Datastore::Candidate, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RpcError);

    // RPC failures leave the session usable
    assert_eq!(session.state().await, SessionState::Established);
    assert!(session.get(None).await.is_ok());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_replayed_notifications_in_order() {
    let config = ServerConfig {
        notifications: vec![
            "<event-a xmlns='urn:example'/>".to_string(),
            "<event-b xmlns='urn:example'/>".to_string(),
        ],
        ..device_config()
    };
    let server = Server::new(config).unwrap();
    let session = Session::connect(&server.mock_transport(), &target(), options())
        .await
        .unwrap();

    session.create_subscription().await.unwrap();
    let first = session.take_notification(Duration::from_secs(5)).await.unwrap();
    let second = session.take_notification(Duration::from_secs(5)).await.unwrap();
    assert_eq!(first.event_type, "event-a");
    assert_eq!(second.event_type, "event-b");

    let err = session.create_subscription().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RpcError);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_base_1_0_device() {
    let config = ServerConfig {
        force_base_1_0: true,
        ..device_config()
    };
    let server = Server::new(config).unwrap();
    let session = Session::connect(&server.mock_transport(), &target(), options())
        .await
        .unwrap();

    assert_eq!(session.framing(), Framing::EndOfMessage);
    assert!(session.get_config(Datastore::Running, None).await.is_ok());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_profile_forcing_base_1_0() {
    let server = Server::new(device_config()).unwrap();
    let options = SessionOptions {
        profile: DeviceProfile::Alu,
        ..options()
    };
    let session = Session::connect(&server.mock_transport(), &target(), options)
        .await
        .unwrap();

    assert_eq!(session.framing(), Framing::EndOfMessage);
    assert!(session.get(None).await.is_ok());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_no_common_capability() {
    let config = ServerConfig {
        capabilities: vec!["urn:example:proprietary:2.0".to_string()],
        ..device_config()
    };
    let server = Server::new(config).unwrap();

    let err = Session::connect(&server.mock_transport(), &target(), options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleCapabilities);
}
