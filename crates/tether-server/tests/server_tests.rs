//! Stream server tests driven by real client connections

use tether_client::Connection;
use tether_core::{id_for_host, Packet, PeerId};
use tether_server::{ServerError, StreamServer};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

struct Harness {
    server: StreamServer,
    joins: mpsc::UnboundedReceiver<PeerId>,
    packets: mpsc::UnboundedReceiver<Packet>,
}

async fn start_server() -> Harness {
    let (join_tx, joins) = mpsc::unbounded_channel();
    let (packet_tx, packets) = mpsc::unbounded_channel();

    let server = StreamServer::builder()
        .on_join(move |id| {
            let _ = join_tx.send(id);
        })
        .on_packet(move |packet| {
            let _ = packet_tx.send(packet);
        })
        .bind("127.0.0.1:0")
        .await
        .expect("bind failed");

    Harness {
        server,
        joins,
        packets,
    }
}

fn packet_collector() -> (
    impl Fn(Packet) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Packet>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |packet| {
            let _ = tx.send(packet);
        },
        rx,
    )
}

#[tokio::test]
async fn test_join_hook_fires_with_address_digest() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let _conn = Connection::builder(&addr).connect_stream().await.unwrap();

    let id = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .expect("no join observed")
        .unwrap();
    assert_eq!(id, id_for_host("127.0.0.1"));
    assert_eq!(h.server.peer_count(), 1);
}

#[tokio::test]
async fn test_packets_tagged_with_registry_id() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let conn = Connection::builder(&addr).connect_stream().await.unwrap();
    let joined = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    conn.send("inbound").await.unwrap();

    let packet = timeout(Duration::from_secs(2), h.packets.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.payload, "inbound");
    assert_eq!(packet.sender, joined);
}

#[tokio::test]
async fn test_send_to_reaches_exactly_that_peer() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let (cb, mut received) = packet_collector();
    let _conn = Connection::builder(&addr)
        .on_packet(cb)
        .connect_stream()
        .await
        .unwrap();
    let id = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    h.server.send_to(&id, "addressed").await.unwrap();

    let packet = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.payload, "addressed");
    assert_eq!(packet.sender, "server");
}

#[tokio::test]
async fn test_send_to_unknown_peer_errors() {
    let h = start_server().await;
    let result = h.server.send_to("no-such-peer", "hello?").await;
    assert!(matches!(result, Err(ServerError::UnknownPeer(_))));
}

#[tokio::test]
async fn test_broadcast_delivers_exactly_once_per_peer() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let (cb, mut received) = packet_collector();
    let _conn = Connection::builder(&addr)
        .on_packet(cb)
        .connect_stream()
        .await
        .unwrap();
    timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    h.server.broadcast("hello").await.unwrap();

    let packet = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.payload, "hello");

    // exactly once
    sleep(Duration::from_millis(100)).await;
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnect_from_same_address_replaces_entry() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let first = Connection::builder(&addr).connect_stream().await.unwrap();
    let id1 = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    let _second = Connection::builder(&addr).connect_stream().await.unwrap();
    let id2 = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    // loopback reconnect: same source address, same identifier, one slot
    assert_eq!(id1, id2);
    assert_eq!(h.server.peer_count(), 1);

    // the displaced connection was closed by the server
    let mut open = true;
    for _ in 0..50 {
        sleep(Duration::from_millis(10)).await;
        open = first.is_open();
        if !open {
            break;
        }
    }
    assert!(!open, "displaced connection never closed");
}

#[tokio::test]
async fn test_server_side_ping_measures_rtt() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    // the client's framed loop answers probes without application help
    let _conn = Connection::builder(&addr).connect_stream().await.unwrap();
    let id = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.server.rtt(&id), None);
    h.server.ping(&id).await.unwrap();

    let mut rtt = None;
    for _ in 0..50 {
        sleep(Duration::from_millis(10)).await;
        rtt = h.server.rtt(&id);
        if rtt.is_some() {
            break;
        }
    }
    assert!(rtt.is_some(), "no round trip measured");
}

#[tokio::test]
async fn test_close_empties_registry_and_is_idempotent() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let conn = Connection::builder(&addr).connect_stream().await.unwrap();
    let id = timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    h.server.close().await;
    h.server.close().await;
    assert!(!h.server.is_running());
    assert_eq!(h.server.peer_count(), 0);

    assert!(matches!(
        h.server.send_to(&id, "late").await,
        Err(ServerError::Closed)
    ));

    // the client observes the teardown
    let mut open = true;
    for _ in 0..50 {
        sleep(Duration::from_millis(10)).await;
        open = conn.is_open();
        if !open {
            break;
        }
    }
    assert!(!open, "client never observed server close");
}

#[tokio::test]
async fn test_bind_conflict_is_synchronous() {
    let h = start_server().await;
    let addr = h.server.local_addr().to_string();

    let result = StreamServer::builder().bind(&addr).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_peer_failure_does_not_affect_others() {
    let mut h = start_server().await;
    let addr = h.server.local_addr().to_string();

    // one peer comes and goes; the server keeps serving
    let first = Connection::builder(&addr).connect_stream().await.unwrap();
    timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();
    first.close().await;
    sleep(Duration::from_millis(50)).await;

    let (cb, mut received) = packet_collector();
    let second = Connection::builder(&addr)
        .on_packet(cb)
        .connect_stream()
        .await
        .unwrap();
    timeout(Duration::from_secs(2), h.joins.recv())
        .await
        .unwrap()
        .unwrap();

    second.send("still here").await.unwrap();
    let packet = timeout(Duration::from_secs(2), h.packets.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.payload, "still here");

    h.server.broadcast("to the living").await.unwrap();
    let packet = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet.payload, "to the living");
}
