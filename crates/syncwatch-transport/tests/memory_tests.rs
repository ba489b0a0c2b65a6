//! Memory network tests
//!
//! The in-process network stands in for the peer-to-peer service in every
//! engine test, so its lifecycle semantics are pinned here:
//! - identity collisions and unknown peers
//! - Connected before Data, FIFO per channel
//! - close and destroy notify both ends

use bytes::Bytes;
use std::time::Duration;
use syncwatch_transport::{
    EndpointEvent, MemoryNetwork, PeerNetwork, TransportError, TransportEvent, TransportReceiver,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn next(receiver: &mut Box<dyn TransportReceiver>) -> TransportEvent {
    timeout(WAIT, receiver.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("channel ended")
}

#[tokio::test]
async fn test_open_generates_unique_identities() {
    let network = MemoryNetwork::new();
    let a = network.open(None).await.unwrap();
    let b = network.open(None).await.unwrap();

    assert_ne!(a.local_addr(), b.local_addr());
    assert_eq!(network.peer_count(), 2);
}

#[tokio::test]
async fn test_open_rejects_taken_identity() {
    let network = MemoryNetwork::new();
    let _host = network.open(Some("H1")).await.unwrap();

    let result = network.open(Some("H1")).await;
    match result {
        Err(err) => {
            assert!(matches!(err, TransportError::AddressInUse(ref id) if id == "H1"));
            assert!(err.is_identity_error());
        }
        Ok(_) => panic!("Expected AddressInUse"),
    }
}

#[tokio::test]
async fn test_connect_to_unknown_peer_fails() {
    let network = MemoryNetwork::new();
    let guest = network.open(None).await.unwrap();

    let err = guest.connect("nobody").await.unwrap_err();
    assert!(matches!(err, TransportError::PeerUnavailable(_)));
    assert!(!err.is_identity_error());
}

#[tokio::test]
async fn test_channel_carries_data_both_ways() {
    let network = MemoryNetwork::new();
    let host = network.open(Some("H1")).await.unwrap();
    let guest = network.open(Some("G1")).await.unwrap();

    let mut outbound = guest.connect("H1").await.unwrap();
    assert_eq!(outbound.peer, "H1");
    assert!(matches!(next(&mut outbound.receiver).await, TransportEvent::Connected));

    let mut inbound = match timeout(WAIT, host.next_event()).await.unwrap() {
        Some(EndpointEvent::Incoming(conn)) => conn,
        other => panic!("Expected Incoming, got {:?}", other),
    };
    assert_eq!(inbound.peer, "G1");

    outbound.sender.send(Bytes::from_static(b"one")).await.unwrap();
    outbound.sender.send(Bytes::from_static(b"two")).await.unwrap();

    assert!(matches!(next(&mut inbound.receiver).await, TransportEvent::Connected));
    match next(&mut inbound.receiver).await {
        TransportEvent::Data(d) => assert_eq!(&d[..], b"one"),
        other => panic!("Expected Data, got {:?}", other),
    }
    match next(&mut inbound.receiver).await {
        TransportEvent::Data(d) => assert_eq!(&d[..], b"two"),
        other => panic!("Expected Data, got {:?}", other),
    }

    inbound.sender.send(Bytes::from_static(b"back")).await.unwrap();
    match next(&mut outbound.receiver).await {
        TransportEvent::Data(d) => assert_eq!(&d[..], b"back"),
        other => panic!("Expected Data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_notifies_both_ends() {
    let network = MemoryNetwork::new();
    let host = network.open(Some("H1")).await.unwrap();
    let guest = network.open(None).await.unwrap();

    let mut outbound = guest.connect("H1").await.unwrap();
    let mut inbound = match host.next_event().await {
        Some(EndpointEvent::Incoming(conn)) => conn,
        other => panic!("Expected Incoming, got {:?}", other),
    };
    assert!(matches!(next(&mut outbound.receiver).await, TransportEvent::Connected));
    assert!(matches!(next(&mut inbound.receiver).await, TransportEvent::Connected));

    outbound.sender.close().await.unwrap();

    assert!(!outbound.sender.is_connected());
    assert!(!inbound.sender.is_connected());
    assert!(matches!(
        next(&mut inbound.receiver).await,
        TransportEvent::Disconnected { reason: Some(_) }
    ));
    assert!(matches!(
        next(&mut outbound.receiver).await,
        TransportEvent::Disconnected { reason: None }
    ));

    let err = outbound
        .sender
        .send(Bytes::from_static(b"late"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn test_destroy_releases_identity_and_channels() {
    let network = MemoryNetwork::new();
    let host = network.open(Some("H1")).await.unwrap();
    let guest = network.open(None).await.unwrap();

    let mut outbound = guest.connect("H1").await.unwrap();
    assert!(matches!(next(&mut outbound.receiver).await, TransportEvent::Connected));

    host.destroy().await.unwrap();

    assert!(!network.is_registered("H1"));
    assert!(matches!(
        next(&mut outbound.receiver).await,
        TransportEvent::Disconnected { .. }
    ));
    assert!(host.next_event().await.is_none());

    // Identity can be registered again
    let again = network.open(Some("H1")).await.unwrap();
    assert_eq!(again.local_addr(), "H1");
}

#[tokio::test]
async fn test_dropping_endpoint_unregisters() {
    let network = MemoryNetwork::new();
    {
        let _host = network.open(Some("H1")).await.unwrap();
        assert!(network.is_registered("H1"));
    }
    assert!(!network.is_registered("H1"));
}

#[tokio::test]
async fn test_signaling_events_reach_endpoint() {
    let network = MemoryNetwork::new();
    let host = network.open(Some("H1")).await.unwrap();

    assert!(network.interrupt_signaling("H1"));
    assert!(network.restore_signaling("H1"));
    assert!(network.fail_endpoint("H1", "server gone"));
    assert!(!network.interrupt_signaling("missing"));

    assert!(matches!(host.next_event().await, Some(EndpointEvent::SignalingLost)));
    assert!(matches!(host.next_event().await, Some(EndpointEvent::SignalingRestored)));
    match host.next_event().await {
        Some(EndpointEvent::Error(reason)) => assert_eq!(reason, "server gone"),
        other => panic!("Expected Error, got {:?}", other),
    }
}
