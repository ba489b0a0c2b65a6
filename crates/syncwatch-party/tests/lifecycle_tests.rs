//! Session lifecycle tests: hosting, joining, leaving and failures

use std::sync::Arc;
use std::time::Duration;
use syncwatch_party::{
    PartyConfig, PartyEvent, PartyHandle, PartyRole, PartyRuntime, PartyStatus,
    NOTICE_CONNECT_FAILED, NOTICE_HOST_LEFT,
};
use syncwatch_test_utils::{wait_for, EventCollector, ManualClock, RawPeer, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
use syncwatch_transport::{MemoryNetwork, PeerNetwork};

fn spawn_party(network: &MemoryNetwork, clock: &ManualClock) -> (PartyHandle, EventCollector) {
    let (handle, _task) = PartyRuntime::spawn(
        PartyConfig::default(),
        Arc::new(network.clone()),
        Some(clock.boxed()),
    );
    let events = EventCollector::new();
    handle.on_event(events.callback());
    (handle, events)
}

async fn wait_for_state<F>(handle: &PartyHandle, check: F) -> bool
where
    F: Fn(&syncwatch_party::PartyState) -> bool,
{
    let check = &check;
    wait_for(
        move || async move { handle.state().await.map(|s| check(&s)).unwrap_or(false) },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await
}

#[tokio::test]
async fn test_host_starts_with_requested_identity() {
    let network = MemoryNetwork::new();
    let (host, events) = spawn_party(&network, &ManualClock::new(0.0, false));

    let state = host.start_party(Some("movie-night")).await.unwrap();

    assert_eq!(state.status, PartyStatus::Hosting);
    assert_eq!(state.role, PartyRole::Host);
    assert_eq!(state.peer_id.as_deref(), Some("movie-night"));
    assert!(state.is_active);
    assert_eq!(state.guest_count, 0);
    assert_eq!(
        state.share_link.as_deref(),
        Some("http://localhost:5173/?party=movie-night")
    );
    assert_eq!(events.statuses(), vec![PartyStatus::Hosting]);
    assert!(!host.can_change_speed().await.unwrap());
}

#[tokio::test]
async fn test_identity_collision_ends_in_error() {
    let network = MemoryNetwork::new();
    let _squatter = network.open(Some("H")).await.unwrap();
    let (host, events) = spawn_party(&network, &ManualClock::new(0.0, false));

    let state = host.start_party(Some("H")).await.unwrap();

    assert_eq!(state.status, PartyStatus::Error);
    assert_eq!(state.role, PartyRole::Unaffiliated);
    assert_eq!(state.peer_id, None);
    assert_eq!(events.notices(), vec![NOTICE_CONNECT_FAILED.to_string()]);
    // Only the squatter is left on the network
    assert_eq!(network.peer_count(), 1);
}

#[tokio::test]
async fn test_join_unknown_host_ends_in_error() {
    let network = MemoryNetwork::new();
    let (guest, events) = spawn_party(&network, &ManualClock::new(0.0, false));

    let state = guest.join_party("nobody-home").await.unwrap();
    assert_eq!(state.role, PartyRole::Guest);

    assert!(events.wait_for_status(PartyStatus::Error, DEFAULT_TIMEOUT).await);
    assert_eq!(
        events.statuses(),
        vec![PartyStatus::Connecting, PartyStatus::Error]
    );
    assert_eq!(events.notices(), vec![NOTICE_CONNECT_FAILED.to_string()]);
    assert!(wait_for_state(&guest, |s| s.role == PartyRole::Unaffiliated).await);
    assert_eq!(network.peer_count(), 0);
}

#[tokio::test]
async fn test_join_through_share_link() {
    let network = MemoryNetwork::new();
    let (host, _) = spawn_party(&network, &ManualClock::new(0.0, false));
    let (guest, guest_events) = spawn_party(&network, &ManualClock::new(0.0, false));

    let link = host.start_party(Some("H")).await.unwrap().share_link.unwrap();
    guest.join_party(&link).await.unwrap();

    assert!(guest_events.wait_for_status(PartyStatus::Connected, DEFAULT_TIMEOUT).await);
    assert!(wait_for_state(&host, |s| s.guest_count == 1).await);
    let state = guest.state().await.unwrap();
    assert!(state.is_active);
    assert_eq!(state.share_link, None);
}

#[tokio::test]
async fn test_role_change_tears_down_previous_session() {
    let network = MemoryNetwork::new();
    let (other_host, _) = spawn_party(&network, &ManualClock::new(0.0, false));
    other_host.start_party(Some("H2")).await.unwrap();

    let (node, events) = spawn_party(&network, &ManualClock::new(0.0, false));
    node.start_party(Some("H1")).await.unwrap();
    let guest = RawPeer::connect(&network, "G", "H1").await.unwrap();
    assert!(wait_for_state(&node, |s| s.guest_count == 1).await);

    node.join_party("H2").await.unwrap();

    assert!(events.wait_for_status(PartyStatus::Connected, DEFAULT_TIMEOUT).await);
    let state = node.state().await.unwrap();
    assert_eq!(state.role, PartyRole::Guest);
    assert_eq!(state.guest_count, 0);
    assert!(!network.is_registered("H1"));
    assert!(guest.wait_closed(DEFAULT_TIMEOUT).await);
}

#[tokio::test]
async fn test_end_party_closes_every_channel() {
    let network = MemoryNetwork::new();
    let (host, events) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();

    let a = RawPeer::connect(&network, "A", "H").await.unwrap();
    let b = RawPeer::connect(&network, "B", "H").await.unwrap();
    assert!(wait_for_state(&host, |s| s.guest_count == 2).await);

    let state = host.end_party().await.unwrap();

    assert_eq!(state.status, PartyStatus::Disconnected);
    assert_eq!(state.role, PartyRole::Unaffiliated);
    assert_eq!(state.guest_count, 0);
    assert!(!state.is_active);
    assert!(!network.is_registered("H"));
    assert!(a.wait_closed(DEFAULT_TIMEOUT).await);
    assert!(b.wait_closed(DEFAULT_TIMEOUT).await);
    assert_eq!(events.last_status(), Some(PartyStatus::Disconnected));
}

#[tokio::test]
async fn test_guest_leaving_keeps_host_hosting() {
    let network = MemoryNetwork::new();
    let (host, host_events) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();

    let (guest, guest_events) = spawn_party(&network, &ManualClock::new(0.0, false));
    guest.join_party("H").await.unwrap();
    assert!(guest_events.wait_for_status(PartyStatus::Connected, DEFAULT_TIMEOUT).await);
    assert!(wait_for_state(&host, |s| s.guest_count == 1).await);

    guest.end_party().await.unwrap();

    assert!(wait_for_state(&host, |s| s.guest_count == 0).await);
    let state = host.state().await.unwrap();
    assert_eq!(state.status, PartyStatus::Hosting);
    assert!(state.is_active);
    assert!(host_events
        .events()
        .iter()
        .any(|e| matches!(e, PartyEvent::PeerLeft(_))));
    assert!(guest_events.notices().is_empty());
}

#[tokio::test]
async fn test_host_leaving_disconnects_guest() {
    let network = MemoryNetwork::new();
    let (host, _) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();

    let (guest, guest_events) = spawn_party(&network, &ManualClock::new(0.0, false));
    guest.join_party("H").await.unwrap();
    assert!(guest_events.wait_for_status(PartyStatus::Connected, DEFAULT_TIMEOUT).await);

    host.end_party().await.unwrap();

    assert!(guest_events.wait_for_notice(DEFAULT_TIMEOUT).await);
    assert_eq!(guest_events.notices(), vec![NOTICE_HOST_LEFT.to_string()]);
    assert!(wait_for_state(&guest, |s| s.role == PartyRole::Unaffiliated).await);
    let state = guest.state().await.unwrap();
    assert_eq!(state.status, PartyStatus::Disconnected);
    assert!(!state.is_active);
    assert_eq!(network.peer_count(), 0);
}

#[tokio::test]
async fn test_signaling_loss_shows_connecting() {
    let network = MemoryNetwork::new();
    let (host, events) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();
    let _guest = RawPeer::connect(&network, "G", "H").await.unwrap();
    assert!(wait_for_state(&host, |s| s.guest_count == 1).await);

    network.interrupt_signaling("H");
    assert!(events.wait_for_status(PartyStatus::Connecting, DEFAULT_TIMEOUT).await);
    assert_eq!(host.state().await.unwrap().guest_count, 1);

    network.restore_signaling("H");
    assert!(wait_for_state(&host, |s| s.status == PartyStatus::Hosting).await);
    assert_eq!(
        events.statuses(),
        vec![PartyStatus::Hosting, PartyStatus::Connecting, PartyStatus::Hosting]
    );
}

#[tokio::test]
async fn test_endpoint_error_is_fatal() {
    let network = MemoryNetwork::new();
    let (host, events) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();

    network.fail_endpoint("H", "signaling server gone");

    assert!(events.wait_for_status(PartyStatus::Error, DEFAULT_TIMEOUT).await);
    assert_eq!(events.notices(), vec![NOTICE_CONNECT_FAILED.to_string()]);
    assert!(!network.is_registered("H"));
}

#[tokio::test]
async fn test_casting_locks_speed_and_unlocks_after() {
    let network = MemoryNetwork::new();
    let (node, _) = spawn_party(&network, &ManualClock::new(0.0, false));

    assert!(node.can_change_speed().await.unwrap());
    node.set_casting(true).await.unwrap();
    assert!(!node.can_change_speed().await.unwrap());
    node.set_casting(false).await.unwrap();
    assert!(node.can_change_speed().await.unwrap());
}

#[tokio::test]
async fn test_replaced_observer_receives_later_events() {
    let network = MemoryNetwork::new();
    let (host, first) = spawn_party(&network, &ManualClock::new(0.0, false));
    host.start_party(Some("H")).await.unwrap();

    let second = EventCollector::new();
    host.on_event(second.callback());
    host.end_party().await.unwrap();

    assert_eq!(first.statuses(), vec![PartyStatus::Hosting]);
    assert_eq!(second.statuses(), vec![PartyStatus::Disconnected]);
}

#[tokio::test]
async fn test_subscribers_see_status_changes() {
    let network = MemoryNetwork::new();
    let (host, _) = spawn_party(&network, &ManualClock::new(0.0, false));
    let mut rx = host.subscribe();

    host.start_party(Some("H")).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert_eq!(
        event.ok().and_then(|r| r.ok()),
        Some(PartyEvent::StatusChanged(PartyStatus::Hosting))
    );
}
