//! Exercises Socket Ingress end-to-end over a real loopback UDP socket,
//! feeding a Streaming Source backed by a real buffer pool.

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use pixelpilot_mini_rk::datagram::{StreamingBufferPool, DATAGRAM_MAX};
use pixelpilot_mini_rk::ingress::{IngestStats, SocketIngress};
use pixelpilot_mini_rk::source::StreamingSource;

fn init_gst() {
    let _ = gstreamer::init();
}

fn free_udp_port() -> u16 {
    let probe = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    probe.local_addr().unwrap().port()
}

#[test]
fn matching_datagrams_are_pushed_and_counted() {
    init_gst();
    let port = free_udp_port();
    let source = Arc::new(StreamingSource::new(97).unwrap());
    let pool = Arc::new(StreamingBufferPool::new(DATAGRAM_MAX).unwrap());
    let stats = Arc::new(IngestStats::default());

    let mut ingress =
        SocketIngress::start(port, 97, source.clone(), pool.clone(), stats.clone()).unwrap();

    let sender = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    // byte[1] = 0x61 -> PT 97, marker clear.
    let mut datagram = vec![0x80u8, 0x61];
    datagram.extend(std::iter::repeat(0u8).take(198));
    sender.send_to(&datagram, ("127.0.0.1", port)).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while stats.datagrams_pushed.load(std::sync::atomic::Ordering::SeqCst) == 0
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(stats.datagrams_received.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(stats.datagrams_pushed.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(stats.datagrams_dropped_filter.load(std::sync::atomic::Ordering::SeqCst), 0);

    ingress.stop();
}

#[test]
fn mismatched_payload_type_is_dropped_not_pushed() {
    init_gst();
    let port = free_udp_port();
    let source = Arc::new(StreamingSource::new(97).unwrap());
    let pool = Arc::new(StreamingBufferPool::new(DATAGRAM_MAX).unwrap());
    let stats = Arc::new(IngestStats::default());

    let mut ingress =
        SocketIngress::start(port, 97, source, pool, stats.clone()).unwrap();

    let sender = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
    // byte[1] = 0x60 -> PT 96, mismatched.
    let datagram = vec![0x80u8, 0x60, 0, 0];
    sender.send_to(&datagram, ("127.0.0.1", port)).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while stats.datagrams_received.load(std::sync::atomic::Ordering::SeqCst) == 0
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(stats.datagrams_dropped_filter.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(stats.datagrams_pushed.load(std::sync::atomic::Ordering::SeqCst), 0);

    ingress.stop();
}
