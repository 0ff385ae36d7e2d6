//! End-to-end pipeline tests over an in-memory capture handle
//!
//! Frames are crafted with the crate's own codec, pushed through the
//! ingress/egress handlers and the emitted frames are parsed back and
//! checked field by field.

use caprelay::capture::{Capture, RxInfo};
use caprelay::protocol::ipv4::Ipv4Packet;
use caprelay::protocol::tcp::{build_data_ack, TcpSegment};
use caprelay::protocol::udp::UdpDatagram;
use caprelay::protocol::{
    ethernet, parse_encapped, parse_frame, serialize_frame, serialize_packet, LinkKind, LinkRepr,
    MacAddr, NetworkRepr, PacketIndicator, TransportKind, TransportRepr,
};
use caprelay::relay::{Device, HandleId, Quintuple, Server, EPHEMERAL_BASE};
use caprelay::Result;
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

const LISTEN_PORT: u16 = 8080;
const CLIENT: &str = "10.0.0.2:40000";
const SERVER_LISTEN_IP: &str = "192.0.2.1";
const UPSTREAM_IP: &str = "198.51.100.1";

#[derive(Default)]
struct MockInner {
    rx: Mutex<VecDeque<Vec<u8>>>,
    tx: Mutex<Vec<Vec<u8>>>,
}

/// In-memory capture handle; clones share the same queues
#[derive(Clone, Default)]
struct MockHandle(Arc<MockInner>);

impl MockHandle {
    fn push_rx(&self, frame: Vec<u8>) {
        self.0.rx.lock().unwrap().push_back(frame);
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.0.tx.lock().unwrap().clone()
    }
}

impl Capture for MockHandle {
    async fn recv(&self, buf: &mut [u8]) -> Result<RxInfo> {
        let frame = self.0.rx.lock().unwrap().pop_front();
        match frame {
            Some(f) => {
                buf[..f.len()].copy_from_slice(&f);
                Ok(RxInfo { len: f.len() })
            }
            // Block forever, like a quiet device
            None => std::future::pending().await,
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<usize> {
        self.0.tx.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }
}

fn listen_device() -> Device {
    Device {
        name: "eth0".into(),
        friendly_name: "eth0".into(),
        hardware_addr: Some(MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 1])),
        ip_addrs: vec![SERVER_LISTEN_IP.parse().unwrap()],
        is_loopback: false,
    }
}

fn upstream_device() -> Device {
    Device {
        name: "eth1".into(),
        friendly_name: "eth1".into(),
        hardware_addr: Some(MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 2])),
        ip_addrs: vec![
            UPSTREAM_IP.parse().unwrap(),
            "2001:db8:cafe::1".parse().unwrap(),
        ],
        is_loopback: false,
    }
}

fn gateway_device() -> Device {
    Device {
        name: "gateway".into(),
        friendly_name: "gateway".into(),
        hardware_addr: Some(MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 0xff])),
        ip_addrs: vec!["198.51.100.254".parse().unwrap()],
        is_loopback: false,
    }
}

struct Fixture {
    server: Server<MockHandle>,
    listen: MockHandle,
    upstream: MockHandle,
}

fn setup() -> Fixture {
    let listen = MockHandle::default();
    let upstream = MockHandle::default();

    let server = Server::with_handles(
        LISTEN_PORT,
        vec![listen_device()],
        upstream_device(),
        gateway_device(),
        vec![listen.clone()],
        upstream.clone(),
    )
    .unwrap();

    Fixture {
        server,
        listen,
        upstream,
    }
}

fn client_link() -> LinkRepr {
    LinkRepr::Ethernet {
        src: MacAddr([0x02, 0, 0, 0, 0, 1]),
        dst: MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 1]),
    }
}

/// Carrier frame from the client: TCP to the listen port
fn carrier_frame(seg: TcpSegment) -> Vec<u8> {
    let mut net = NetworkRepr::V4(Ipv4Packet::build(
        "10.0.0.2".parse().unwrap(),
        SERVER_LISTEN_IP.parse().unwrap(),
        1,
        64,
        TransportKind::Tcp,
    ));
    let mut tp = TransportRepr::Tcp(seg);
    serialize_frame(&client_link(), &mut net, &mut tp)
}

fn client_syn_frame(seq: u32) -> Vec<u8> {
    let seg = TcpSegment::build(
        40000,
        LISTEN_PORT,
        seq,
        0,
        caprelay::protocol::tcp::TcpFlags {
            syn: true,
            ..Default::default()
        },
    );
    carrier_frame(seg)
}

/// Inner IPv4+UDP packet as the client would encapsulate it
fn inner_udp_packet(src_port: u16, dst: &str, id: u16, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let dst: SocketAddr = dst.parse().unwrap();
    let IpAddr::V4(dst_ip) = dst.ip() else {
        panic!("expected IPv4 destination");
    };

    let length = (8 + payload.len()) as u16;
    let mut udp = Vec::with_capacity(length as usize);
    udp.extend_from_slice(&src_port.to_be_bytes());
    udp.extend_from_slice(&dst.port().to_be_bytes());
    udp.extend_from_slice(&length.to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);

    let mut net = NetworkRepr::V4(Ipv4Packet::build(
        "10.0.0.2".parse().unwrap(),
        dst_ip,
        id,
        ttl,
        TransportKind::Udp,
    ));
    let mut tp = TransportRepr::Udp(UdpDatagram::parse(&udp).unwrap());
    serialize_packet(&mut net, &mut tp)
}

fn carrier_data_frame(seq: u32, inner: &[u8]) -> Vec<u8> {
    let mut seg = build_data_ack(40000, LISTEN_PORT, seq, 1);
    seg.set_payload(inner);
    carrier_frame(seg)
}

fn parse_emitted(frame: &[u8]) -> PacketIndicator {
    parse_frame(frame, LinkKind::Ethernet).unwrap()
}

async fn do_handshake(fixture: &Fixture) {
    let ind = parse_emitted(&client_syn_frame(42));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;
}

#[tokio::test]
async fn test_syn_gets_syn_ack() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let sent = fixture.upstream.sent();
    assert_eq!(sent.len(), 1);

    // Emitted towards the gateway with the upstream device's MAC
    let eth = ethernet::Frame::parse(&sent[0]).unwrap();
    assert_eq!(eth.src_mac(), MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 2]));
    assert_eq!(eth.dst_mac(), MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 0xff]));

    let reply = parse_emitted(&sent[0]);
    assert_eq!(reply.src_addr().to_string(), format!("{}:{}", SERVER_LISTEN_IP, LISTEN_PORT));
    assert_eq!(reply.dst_addr().to_string(), CLIENT);
    assert_eq!(reply.seq(), 0);

    let flags = reply.tcp_flags().unwrap();
    assert!(flags.is_syn_ack());

    if let TransportRepr::Tcp(seg) = reply.transport() {
        assert_eq!(seg.ack_num(), 43);
        assert!(seg.payload().is_empty());
    } else {
        panic!("expected TCP");
    }

    let client: SocketAddr = CLIENT.parse().unwrap();
    let state = fixture.server.engine().sessions().snapshot(&client).await.unwrap();
    assert_eq!(state.seq, 0);
    assert_eq!(state.ack, 43);
    assert_eq!(fixture.server.engine().stats().handshakes.get(), 1);
}

#[tokio::test]
async fn test_inbound_redirect_rewrites_source() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let inner = inner_udp_packet(55555, "8.8.8.8:53", 7, 64, b"dns question");
    let frame = carrier_data_frame(43, &inner);
    let ind = parse_emitted(&frame);
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let sent = fixture.upstream.sent();
    assert_eq!(sent.len(), 2); // SYN+ACK, then the redirected packet

    let out = parse_emitted(&sent[1]);
    assert_eq!(out.transport_kind(), TransportKind::Udp);
    assert_eq!(
        out.src_addr().to_string(),
        format!("{}:{}", UPSTREAM_IP, EPHEMERAL_BASE)
    );
    assert_eq!(out.dst_addr().to_string(), "8.8.8.8:53");
    assert_eq!(out.ttl(), 63);
    assert_eq!(out.ipv4_id(), Some(7));
    assert_eq!(out.payload(), b"dns question");

    // Ack advanced by the encapsulated packet length
    let client: SocketAddr = CLIENT.parse().unwrap();
    let state = fixture.server.engine().sessions().snapshot(&client).await.unwrap();
    assert_eq!(state.ack, 43 + inner.len() as u32);

    // Both NAT tables hold the flow
    let forward = Quintuple {
        src_ip: "10.0.0.2".parse().unwrap(),
        src_port: 55555,
        dst_ip: "10.0.0.2".parse().unwrap(),
        dst_port: 40000,
        protocol: TransportKind::Udp,
    };
    assert_eq!(
        fixture.server.engine().nat().forward_port(&forward),
        Some(EPHEMERAL_BASE)
    );

    let reverse = Quintuple {
        src_ip: UPSTREAM_IP.parse().unwrap(),
        src_port: EPHEMERAL_BASE,
        dst_ip: "8.8.8.8".parse().unwrap(),
        dst_port: 53,
        protocol: TransportKind::Udp,
    };
    let entry = fixture.server.engine().nat().reverse_lookup(&reverse).unwrap();
    assert_eq!(entry.carrier_port, 40000);
    assert_eq!(entry.inner_src_port, 55555);
    assert_eq!(entry.handle, HandleId(0));
}

/// Upstream reply frame addressed to the relay's rewritten identity
fn upstream_reply_frame(src: &str, dst_port: u16, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let src: SocketAddr = src.parse().unwrap();
    let (IpAddr::V4(src_ip), IpAddr::V4(up_ip)) =
        (src.ip(), UPSTREAM_IP.parse::<IpAddr>().unwrap())
    else {
        panic!("expected IPv4");
    };

    let length = (8 + payload.len()) as u16;
    let mut udp = Vec::with_capacity(length as usize);
    udp.extend_from_slice(&src.port().to_be_bytes());
    udp.extend_from_slice(&dst_port.to_be_bytes());
    udp.extend_from_slice(&length.to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);

    let mut net = NetworkRepr::V4(Ipv4Packet::build(
        src_ip,
        up_ip,
        99,
        ttl,
        TransportKind::Udp,
    ));
    let mut tp = TransportRepr::Udp(UdpDatagram::parse(&udp).unwrap());
    serialize_frame(
        &LinkRepr::Ethernet {
            src: MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 0xff]),
            dst: MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 2]),
        },
        &mut net,
        &mut tp,
    )
}

#[tokio::test]
async fn test_outbound_redirect_restores_identity() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let inner = inner_udp_packet(55555, "8.8.8.8:53", 7, 64, b"dns question");
    let ind = parse_emitted(&carrier_data_frame(43, &inner));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let reply = upstream_reply_frame("8.8.8.8:53", EPHEMERAL_BASE, 57, b"dns answer, thirty bytes long!");
    let ind = parse_emitted(&reply);
    fixture.server.engine().handle_upstream(ind).await;

    let sent = fixture.listen.sent();
    assert_eq!(sent.len(), 1);

    let carrier = parse_emitted(&sent[0]);
    assert_eq!(carrier.transport_kind(), TransportKind::Tcp);
    assert_eq!(
        carrier.src_addr().to_string(),
        format!("{}:{}", UPSTREAM_IP, LISTEN_PORT)
    );
    assert_eq!(carrier.dst_addr().to_string(), CLIENT);
    assert_eq!(carrier.seq(), 0);
    assert_eq!(carrier.ttl(), 56); // inner TTL minus one

    let flags = carrier.tcp_flags().unwrap();
    assert!(flags.ack);
    assert!(!flags.syn);

    let client: SocketAddr = CLIENT.parse().unwrap();
    let expected_ack = 43 + inner.len() as u32;
    if let TransportRepr::Tcp(seg) = carrier.transport() {
        assert_eq!(seg.ack_num(), expected_ack);
    } else {
        panic!("expected TCP");
    }

    // The carrier payload is the reply with its source restored to the
    // original inner source; the destination keeps the upstream identity
    let restored = parse_encapped(carrier.payload()).unwrap();
    assert_eq!(restored.src_addr().to_string(), "10.0.0.2:55555");
    assert_eq!(
        restored.dst_addr().to_string(),
        format!("{}:{}", UPSTREAM_IP, EPHEMERAL_BASE)
    );
    assert_eq!(restored.payload(), b"dns answer, thirty bytes long!");

    // Seq advanced by the carrier payload length
    let state = fixture.server.engine().sessions().snapshot(&client).await.unwrap();
    assert_eq!(state.seq, carrier.payload().len() as u32);
}

#[tokio::test]
async fn test_second_flow_gets_next_port() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let first = inner_udp_packet(55555, "8.8.8.8:53", 7, 64, b"one");
    let ind = parse_emitted(&carrier_data_frame(43, &first));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let second = inner_udp_packet(55556, "1.1.1.1:53", 8, 64, b"two");
    let ind = parse_emitted(&carrier_data_frame(43 + first.len() as u32, &second));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let sent = fixture.upstream.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(parse_emitted(&sent[1]).src_port(), EPHEMERAL_BASE);
    assert_eq!(parse_emitted(&sent[2]).src_port(), EPHEMERAL_BASE + 1);

    // Replaying the first flow keeps its original port
    let again = inner_udp_packet(55555, "8.8.8.8:53", 9, 64, b"three");
    let ind = parse_emitted(&carrier_data_frame(0, &again));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let sent = fixture.upstream.sent();
    assert_eq!(parse_emitted(&sent[3]).src_port(), EPHEMERAL_BASE);
    assert_eq!(fixture.server.engine().nat().len(), 2);
}

#[tokio::test]
async fn test_unknown_return_traffic_dropped_silently() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let stray = upstream_reply_frame("203.0.113.9:443", 50000, 57, b"unsolicited");
    let ind = parse_emitted(&stray);
    fixture.server.engine().handle_upstream(ind).await;

    assert!(fixture.listen.sent().is_empty());
    assert_eq!(fixture.server.engine().nat().len(), 0);
    assert_eq!(fixture.server.engine().stats().nat_misses.get(), 1);
    assert_eq!(fixture.server.engine().stats().outbound_redirects.get(), 0);
}

#[tokio::test]
async fn test_pure_ack_does_nothing() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let ack_only = carrier_frame(build_data_ack(40000, LISTEN_PORT, 43, 1));
    let ind = parse_emitted(&ack_only);
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    // Only the SYN+ACK was ever emitted and the ack counter is untouched
    assert_eq!(fixture.upstream.sent().len(), 1);
    let client: SocketAddr = CLIENT.parse().unwrap();
    let state = fixture.server.engine().sessions().snapshot(&client).await.unwrap();
    assert_eq!(state.ack, 43);
}

#[tokio::test]
async fn test_inner_ttl_underflow_drops_packet() {
    let fixture = setup();
    do_handshake(&fixture).await;

    let inner = inner_udp_packet(55555, "8.8.8.8:53", 7, 0, b"dead");
    let ind = parse_emitted(&carrier_data_frame(43, &inner));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    assert_eq!(fixture.upstream.sent().len(), 1); // SYN+ACK only
    assert_eq!(fixture.server.engine().stats().ttl_drops.get(), 1);

    // The ack still advanced: the carrier bytes were consumed
    let client: SocketAddr = CLIENT.parse().unwrap();
    let state = fixture.server.engine().sessions().snapshot(&client).await.unwrap();
    assert_eq!(state.ack, 43 + inner.len() as u32);
}

#[tokio::test]
async fn test_reader_loop_filters_unrelated_frames() {
    let mut fixture = setup();

    // An ARP frame, a TCP segment to another port, then a real SYN
    let mut arp = vec![0u8; 42];
    arp[12] = 0x08;
    arp[13] = 0x06;
    fixture.listen.push_rx(arp);

    let mut net = NetworkRepr::V4(Ipv4Packet::build(
        "10.0.0.2".parse().unwrap(),
        SERVER_LISTEN_IP.parse().unwrap(),
        1,
        64,
        TransportKind::Tcp,
    ));
    let mut tp = TransportRepr::Tcp(build_data_ack(40000, 9999, 0, 0));
    fixture
        .listen
        .push_rx(serialize_frame(&client_link(), &mut net, &mut tp));

    fixture.listen.push_rx(client_syn_frame(42));

    let engine = fixture.server.engine().clone();
    let run = tokio::spawn(async move { fixture.server.run().await });

    // The readers drain their queues; wait for the handshake to land
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(2);
    while engine.stats().handshakes.get() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "handshake never seen");
        tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
    }

    // Only the SYN made it through the filter
    assert_eq!(engine.stats().handshakes.get(), 1);
    assert_eq!(engine.nat().len(), 0);
    run.abort();
}

#[tokio::test]
async fn test_forward_then_reverse_is_symmetric() {
    let fixture = setup();
    do_handshake(&fixture).await;

    // Forward: decapsulate and NAT out
    let inner = inner_udp_packet(55555, "8.8.8.8:53", 7, 64, b"ping");
    let ind = parse_emitted(&carrier_data_frame(43, &inner));
    fixture.server.engine().handle_listen(ind, HandleId(0)).await;

    let out = parse_emitted(&fixture.upstream.sent()[1]);

    // Synthesize the reply the remote host would send
    let reply = upstream_reply_frame("8.8.8.8:53", out.src_port(), 57, b"pong");
    let ind = parse_emitted(&reply);
    fixture.server.engine().handle_upstream(ind).await;

    let carrier = parse_emitted(&fixture.listen.sent()[0]);
    let restored = parse_encapped(carrier.payload()).unwrap();

    // Inner source equals the original inner source; carrier destination
    // equals the original carrier source
    assert_eq!(restored.src_addr().to_string(), "10.0.0.2:55555");
    assert_eq!(carrier.dst_addr().to_string(), CLIENT);
}
