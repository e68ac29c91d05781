//! Router Integration Tests
//!
//! Real OSC datagrams over loopback UDP, through the server and router, out
//! to subscribers.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clock_core::{Color, Message};
use clock_router::{ClockRouter, OscHandler, OscServer};
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Counts messages under a prefix and claims them
struct PrefixCounter {
    prefix: &'static str,
    seen: AtomicUsize,
}

impl OscHandler for PrefixCounter {
    fn name(&self) -> &str {
        "prefix"
    }

    fn handle(&self, msg: &OscMessage, _from: SocketAddr) -> bool {
        if msg.addr.starts_with(self.prefix) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

fn encode(addr: &str, args: Vec<OscType>) -> Vec<u8> {
    encoder::encode(&OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    }))
    .unwrap()
}

async fn start(router: Arc<ClockRouter>, extra: Option<Arc<dyn OscHandler>>) -> (SocketAddr, CancellationToken) {
    let mut server = OscServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    server.add_handler(router);
    if let Some(extra) = extra {
        server.add_handler(extra);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(server.run(cancel.clone()));
    (addr, cancel)
}

async fn next(rx: &mut tokio::sync::broadcast::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .unwrap()
}

#[tokio::test]
async fn test_datagram_to_subscriber() {
    let router = Arc::new(ClockRouter::new("unit-a").unwrap());
    let mut rx = router.subscribe();
    let (addr, cancel) = start(router, None).await;

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .send_to(&encode("/clock/timer/4/countdown", vec![OscType::Int(300)]), addr)
        .unwrap();

    assert_eq!(
        next(&mut rx).await,
        Message::TimerStart {
            counter: 4,
            countdown: true,
            seconds: 300
        }
    );
    cancel.cancel();
}

#[tokio::test]
async fn test_bad_arguments_are_dropped() {
    let router = Arc::new(ClockRouter::new("unit-a").unwrap());
    let mut rx = router.subscribe();
    let (addr, cancel) = start(router, None).await;

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .send_to(&encode("/clock/timer/0/countdown", vec![OscType::String("x".into())]), addr)
        .unwrap();
    client.send_to(&encode("/clock/no/such/thing", vec![]), addr).unwrap();
    client.send_to(b"garbage", addr).unwrap();
    client.send_to(&encode("/clock/kill", vec![]), addr).unwrap();

    // Only the valid command comes through, in order
    assert_eq!(next(&mut rx).await, Message::Kill);
    cancel.cancel();
}

#[tokio::test]
async fn test_bundles_are_flattened() {
    let router = Arc::new(ClockRouter::new("unit-a").unwrap());
    let mut rx = router.subscribe();
    let (addr, cancel) = start(router, None).await;

    let bundle = OscPacket::Bundle(OscBundle {
        timetag: OscTime::from((0, 1)),
        content: vec![
            OscPacket::Message(OscMessage {
                addr: "/clock/display".into(),
                args: vec![
                    OscType::Float(0.0),
                    OscType::Float(255.0),
                    OscType::Float(0.0),
                    OscType::String("LIVE".into()),
                ],
            }),
            OscPacket::Message(OscMessage {
                addr: "/clock/source/2/title".into(),
                args: vec![OscType::String("Stage".into())],
            }),
        ],
    });

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&encoder::encode(&bundle).unwrap(), addr).unwrap();

    assert_eq!(
        next(&mut rx).await,
        Message::Display {
            color: Color::rgb(0, 255, 0),
            text: "LIVE".into()
        }
    );
    assert_eq!(
        next(&mut rx).await,
        Message::SourceTitle {
            source: 1,
            title: "Stage".into()
        }
    );
    cancel.cancel();
}

#[tokio::test]
async fn test_unclaimed_messages_reach_later_handlers() {
    let router = Arc::new(ClockRouter::new("unit-a").unwrap());
    let counter = Arc::new(PrefixCounter {
        prefix: "/mitti/",
        seen: AtomicUsize::new(0),
    });
    let mut rx = router.subscribe();
    let (addr, cancel) = start(router, Some(counter.clone() as Arc<dyn OscHandler>)).await;

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.send_to(&encode("/mitti/togglePlay", vec![OscType::Int(1)]), addr).unwrap();
    client.send_to(&encode("/clock/normal", vec![]), addr).unwrap();

    assert_eq!(next(&mut rx).await, Message::Normal);
    assert_eq!(counter.seen.load(Ordering::SeqCst), 1);
    cancel.cancel();
}

#[tokio::test]
async fn test_slow_subscriber_drops_oldest() {
    let router = ClockRouter::with_capacity("unit-a", 2).unwrap();
    let mut slow = router.subscribe();

    for seconds in 0..5 {
        router.publish(Message::TimerModify { counter: 0, seconds });
    }

    assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
    assert_eq!(
        slow.recv().await.unwrap(),
        Message::TimerModify { counter: 0, seconds: 3 }
    );
    assert_eq!(
        slow.recv().await.unwrap(),
        Message::TimerModify { counter: 0, seconds: 4 }
    );
}

#[tokio::test]
async fn test_publish_without_subscribers() {
    let router = ClockRouter::new("unit-a").unwrap();
    assert_eq!(router.publish(Message::Pause), 0);
}
