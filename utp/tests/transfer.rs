//! End-to-end message transfer between two full protocol peers.

use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use utp::{
    ChaosLink, Closed, Endpoint, Input, Link, MemoryLink, Negotiated, Opened, Protocol,
};

struct Peer {
    input: UnboundedSender<Input>,
    delivered: UnboundedReceiver<Vec<u8>>,
    done: JoinHandle<utp::Result<Closed>>,
}

fn launch<L: Link>(endpoint: Endpoint<L>, opened: Opened) -> Peer {
    let (protocol, io) = Protocol::new(endpoint, opened);
    Peer {
        input: io.input,
        delivered: io.delivered,
        done: tokio::spawn(protocol.run()),
    }
}

/// Session anchors equivalent to a completed handshake: each side's
/// receive window starts exactly where the peer will start sending.
fn openings(negotiated: Negotiated) -> (Opened, Opened) {
    (
        Opened { negotiated, seq_send: 1000, seq_recv: 4999 },
        Opened { negotiated, seq_send: 5000, seq_recv: 999 },
    )
}

async fn expect_delivery(peer: &mut Peer, wait: Duration) -> Vec<u8> {
    timeout(wait, peer.delivered.recv())
        .await
        .expect("no delivery within the time limit")
        .expect("delivery channel closed early")
}

#[tokio::test]
async fn test_clean_echo_both_directions() {
    let negotiated = Negotiated { wsize: 16, psize: 32, timeout_us: 60_000 };
    let (link_a, link_b) = MemoryLink::pair();
    let (open_a, open_b) = openings(negotiated);

    let mut a = launch(Endpoint::new(link_a), open_a);
    let mut b = launch(Endpoint::new(link_b), open_b);

    a.input.send(Input::Message(b"hello".to_vec())).unwrap();
    assert_eq!(expect_delivery(&mut b, Duration::from_secs(5)).await, b"hello");

    b.input.send(Input::Message(b"hi yourself".to_vec())).unwrap();
    assert_eq!(expect_delivery(&mut a, Duration::from_secs(5)).await, b"hi yourself");

    a.input.send(Input::Quit).unwrap();
    let closed_a = timeout(Duration::from_secs(10), a.done).await.unwrap().unwrap().unwrap();
    let closed_b = timeout(Duration::from_secs(10), b.done).await.unwrap().unwrap().unwrap();

    assert!(closed_a.clean, "initiator teardown should be acknowledged");
    assert!(closed_b.clean, "responder teardown should be acknowledged");
}

#[tokio::test]
async fn test_messages_arrive_in_submission_order() {
    let negotiated = Negotiated { wsize: 4, psize: 16, timeout_us: 60_000 };
    let (link_a, link_b) = MemoryLink::pair();
    let (open_a, open_b) = openings(negotiated);

    let a = launch(Endpoint::new(link_a), open_a);
    let mut b = launch(Endpoint::new(link_b), open_b);

    let messages: Vec<&[u8]> = vec![b"one", b"two", b"three", b"four", b"five"];
    for message in &messages {
        a.input.send(Input::Message(message.to_vec())).unwrap();
    }

    for expected in &messages {
        let got = expect_delivery(&mut b, Duration::from_secs(5)).await;
        assert_eq!(&got, expected);
    }
}

#[tokio::test]
async fn test_long_message_is_segmented_and_reassembled() {
    // Payload of 4 forces "abcdefg" across two frames; the receiver
    // must flush only on the END frame.
    let negotiated = Negotiated { wsize: 8, psize: 4, timeout_us: 60_000 };
    let (link_a, link_b) = MemoryLink::pair();
    let (open_a, open_b) = openings(negotiated);

    let a = launch(Endpoint::new(link_a), open_a);
    let mut b = launch(Endpoint::new(link_b), open_b);

    a.input.send(Input::Message(b"abcdefg".to_vec())).unwrap();
    assert_eq!(expect_delivery(&mut b, Duration::from_secs(5)).await, b"abcdefg");

    // Far longer than the window: segmentation must respect the
    // window bound and still deliver one whole message.
    let long: Vec<u8> = (0..200u8).collect();
    a.input.send(Input::Message(long.clone())).unwrap();
    assert_eq!(expect_delivery(&mut b, Duration::from_secs(10)).await, long);
}

#[tokio::test]
async fn test_lossy_channel_still_delivers_in_order() {
    let negotiated = Negotiated { wsize: 8, psize: 16, timeout_us: 30_000 };
    let (link_a, link_b) = MemoryLink::pair();
    let (open_a, open_b) = openings(negotiated);

    // A quarter of all datagrams corrupted or swallowed, both ways.
    let mut a = launch(Endpoint::new(ChaosLink::new(link_a, 25)), open_a);
    let mut b = launch(Endpoint::new(ChaosLink::new(link_b, 25)), open_b);

    let messages: Vec<&[u8]> = vec![b"one", b"two", b"three"];
    for message in &messages {
        a.input.send(Input::Message(message.to_vec())).unwrap();
    }
    for expected in &messages {
        let got = expect_delivery(&mut b, Duration::from_secs(30)).await;
        assert_eq!(&got, expected);
    }

    // Give the reverse direction a turn under the same conditions.
    b.input.send(Input::Message(b"echo".to_vec())).unwrap();
    assert_eq!(expect_delivery(&mut a, Duration::from_secs(30)).await, b"echo");

    // Close both ends; under loss the handshake may time out, which
    // is a legitimate outcome, but both engines must wind down.
    a.input.send(Input::Quit).unwrap();
    let _ = timeout(Duration::from_secs(30), a.done).await.unwrap().unwrap().unwrap();
    b.input.send(Input::Quit).ok();
    let _ = timeout(Duration::from_secs(30), b.done).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_full_stack_over_udp_loopback() {
    use utp::{handshake, Config, UdpLink};

    let listener_link = UdpLink::bind(0).await.unwrap();
    let port = listener_link.local_addr().unwrap().port();

    let listener = tokio::spawn(async move {
        let endpoint = Endpoint::new(listener_link);
        let config = Config { wsize: 16, psize: 32, timeout_us: 60_000 };
        let opened = handshake::listen(&endpoint, &config).await.unwrap();
        (Protocol::new(endpoint, opened), opened)
    });

    let initiator = tokio::spawn(async move {
        let link = UdpLink::connect(([127, 0, 0, 1], port).into()).await.unwrap();
        let endpoint = Endpoint::new(link);
        let config = Config { wsize: 8, psize: 64, timeout_us: 60_000 };
        let opened = handshake::connect(&endpoint, &config).await.unwrap();
        (Protocol::new(endpoint, opened), opened)
    });

    let ((protocol_l, io_l), opened_l) = listener.await.unwrap();
    let ((protocol_i, io_i), opened_i) = initiator.await.unwrap();

    assert_eq!(opened_l.negotiated.wsize, 8);
    assert_eq!(opened_l.negotiated.psize, 32);
    assert_eq!(opened_l.negotiated, opened_i.negotiated);

    let mut l = Peer { input: io_l.input, delivered: io_l.delivered, done: tokio::spawn(protocol_l.run()) };
    let i = Peer { input: io_i.input, delivered: io_i.delivered, done: tokio::spawn(protocol_i.run()) };

    i.input.send(Input::Message(b"over real sockets".to_vec())).unwrap();
    assert_eq!(
        expect_delivery(&mut l, Duration::from_secs(5)).await,
        b"over real sockets"
    );

    i.input.send(Input::Quit).unwrap();
    let closed_i = timeout(Duration::from_secs(10), i.done).await.unwrap().unwrap().unwrap();
    let closed_l = timeout(Duration::from_secs(10), l.done).await.unwrap().unwrap().unwrap();
    assert!(closed_i.clean);
    assert!(closed_l.clean);
}
