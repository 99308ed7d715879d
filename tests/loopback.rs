//! Integration tests for the stop-and-wait layer over a clean channel.
//!
//! Each test spins up two in-process L4 endpoints talking over the loopback
//! interface.  Both sides are spawned as separate tokio tasks so they can
//! make progress concurrently without blocking each other.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use abp_over_udp::l4::{L4Sap, SapError};
use abp_over_udp::segment::L4_PAYLOAD_SIZE;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn v4(addr: SocketAddr) -> SocketAddrV4 {
    match addr {
        SocketAddr::V4(v4) => v4,
        other => panic!("expected an IPv4 address, got {other}"),
    }
}

/// Two L4 SAPs wired directly at each other on OS-assigned loopback ports.
async fn sap_pair() -> (L4Sap, L4Sap) {
    let a = UdpSocket::bind("127.0.0.1:0").await.expect("bind a");
    let b = UdpSocket::bind("127.0.0.1:0").await.expect("bind b");
    let a_addr = v4(a.local_addr().unwrap());
    let b_addr = v4(b.local_addr().unwrap());
    (
        L4Sap::from_socket(a, b_addr).expect("sap a"),
        L4Sap::from_socket(b, a_addr).expect("sap b"),
    )
}

// ---------------------------------------------------------------------------
// Test 1: clean exchange in both directions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_exchange_both_directions() {
    let (mut a, mut b) = sap_pair().await;

    let side_b = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let n = b.recv(&mut buf).await.expect("b recv");
        assert_eq!(&buf[..n], b"hello");

        let sent = b.send(b"world").await.expect("b send");
        assert_eq!(sent, 5);
    });

    let side_a = tokio::spawn(async move {
        let sent = a.send(b"hello").await.expect("a send");
        assert_eq!(sent, 5);

        let mut buf = [0u8; 64];
        let n = a.recv(&mut buf).await.expect("a recv");
        assert_eq!(&buf[..n], b"world");
    });

    let (ra, rb) = tokio::join!(side_a, side_b);
    ra.unwrap();
    rb.unwrap();
}

// ---------------------------------------------------------------------------
// Test 2: simultaneous sends resolved through the pending slot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simultaneous_sends_park_each_others_data() {
    let (mut a, mut b) = sap_pair().await;

    // Both sides send before either receives.  Each send absorbs the peer's
    // DATA into the pending slot while waiting for its own ACK; the
    // follow-up recv must then deliver from the slot.
    let side_a = tokio::spawn(async move {
        let sent = a.send(b"ping").await.expect("a send");
        assert_eq!(sent, 4);
        let mut buf = [0u8; 64];
        let n = a.recv(&mut buf).await.expect("a recv");
        assert_eq!(&buf[..n], b"pong");
    });

    let side_b = tokio::spawn(async move {
        let sent = b.send(b"pong").await.expect("b send");
        assert_eq!(sent, 4);
        let mut buf = [0u8; 64];
        let n = b.recv(&mut buf).await.expect("b recv");
        assert_eq!(&buf[..n], b"ping");
    });

    let joined = timeout(Duration::from_secs(10), async {
        let (ra, rb) = tokio::join!(side_a, side_b);
        ra.unwrap();
        rb.unwrap();
    });
    joined.await.expect("simultaneous exchange timed out");
}

// ---------------------------------------------------------------------------
// Test 3: several messages exercise both sequence numbers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn messages_arrive_in_order() {
    const MSG_COUNT: usize = 4;
    let (mut a, mut b) = sap_pair().await;

    let receiver = tokio::spawn(async move {
        let mut got = Vec::new();
        let mut buf = [0u8; 64];
        for _ in 0..MSG_COUNT {
            let n = b.recv(&mut buf).await.expect("recv");
            got.push(buf[..n].to_vec());
        }
        got
    });

    for i in 0..MSG_COUNT {
        let msg = format!("msg-{i:02}");
        let sent = a.send(msg.as_bytes()).await.expect("send");
        assert_eq!(sent, msg.len());
    }

    let got = timeout(Duration::from_secs(10), receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(got.len(), MSG_COUNT);
    for (i, chunk) in got.iter().enumerate() {
        assert_eq!(chunk, format!("msg-{i:02}").as_bytes(), "message {i} corrupted");
    }
}

// ---------------------------------------------------------------------------
// Test 4: payload boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_payload_rejected() {
    let (mut a, _b) = sap_pair().await;
    let err = a.send(&[]).await.unwrap_err();
    assert!(matches!(err, SapError::EmptyBuffer));
}

#[tokio::test]
async fn recv_into_empty_buffer_rejected() {
    let (mut a, _b) = sap_pair().await;
    let err = a.recv(&mut []).await.unwrap_err();
    assert!(matches!(err, SapError::EmptyBuffer));
}

#[tokio::test]
async fn max_payload_accepted_exactly() {
    let (mut a, mut b) = sap_pair().await;
    let payload: Vec<u8> = (0..L4_PAYLOAD_SIZE).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let receiver = tokio::spawn(async move {
        let mut buf = vec![0u8; L4_PAYLOAD_SIZE];
        let n = b.recv(&mut buf).await.expect("recv");
        (n, buf)
    });

    let sent = a.send(&payload).await.expect("send");
    assert_eq!(sent, L4_PAYLOAD_SIZE);

    let (n, buf) = timeout(Duration::from_secs(10), receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(n, L4_PAYLOAD_SIZE);
    assert_eq!(buf, expected);
}

#[tokio::test]
async fn oversize_payload_truncated() {
    let (mut a, mut b) = sap_pair().await;
    let payload = vec![0xabu8; L4_PAYLOAD_SIZE + 1];

    let receiver = tokio::spawn(async move {
        let mut buf = vec![0u8; L4_PAYLOAD_SIZE + 1];
        b.recv(&mut buf).await.expect("recv")
    });

    // The extra byte is silently dropped; the accepted length says so.
    let sent = a.send(&payload).await.expect("send");
    assert_eq!(sent, L4_PAYLOAD_SIZE);

    let n = timeout(Duration::from_secs(10), receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(n, L4_PAYLOAD_SIZE);
}

#[tokio::test]
async fn recv_copies_at_most_caller_buffer() {
    let (mut a, mut b) = sap_pair().await;

    let receiver = tokio::spawn(async move {
        let mut buf = [0u8; 5];
        let n = b.recv(&mut buf).await.expect("recv");
        (n, buf)
    });

    a.send(b"hello world").await.expect("send");

    let (n, buf) = timeout(Duration::from_secs(10), receiver)
        .await
        .expect("receiver timed out")
        .unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");
}

// ---------------------------------------------------------------------------
// Test 5: entities are self-contained
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_independent_pairs_do_not_interfere() {
    let (mut a1, mut b1) = sap_pair().await;
    let (mut a2, mut b2) = sap_pair().await;

    let pair1 = tokio::spawn(async move {
        let recv1 = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = b1.recv(&mut buf).await.expect("b1 recv");
            buf[..n].to_vec()
        });
        a1.send(b"first pair").await.expect("a1 send");
        recv1.await.unwrap()
    });

    let pair2 = tokio::spawn(async move {
        let recv2 = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = b2.recv(&mut buf).await.expect("b2 recv");
            buf[..n].to_vec()
        });
        a2.send(b"second pair").await.expect("a2 send");
        recv2.await.unwrap()
    });

    let (r1, r2) = tokio::join!(pair1, pair2);
    assert_eq!(r1.unwrap(), b"first pair");
    assert_eq!(r2.unwrap(), b"second pair");
}

// ---------------------------------------------------------------------------
// Test 6: creation-time validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reserved_peer_port_rejected() {
    let err = L4Sap::create("127.0.0.1", 80).await.unwrap_err();
    assert!(matches!(err, SapError::PortOutOfRange(80)));

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer = "127.0.0.1:1023".parse().unwrap();
    let err = L4Sap::from_socket(socket, peer).unwrap_err();
    assert!(matches!(err, SapError::PortOutOfRange(1023)));
}

#[tokio::test]
async fn create_with_valid_peer_succeeds() {
    let sap = L4Sap::create("127.0.0.1", 5701).await.expect("create");
    assert!(sap.local_addr().is_ok());
}
