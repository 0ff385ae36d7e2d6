//! Listen-side handler
//!
//! Consumes carrier frames admitted by the listen filter: answers SYNs
//! with a hand-built SYN+ACK, decapsulates data segments, source-NATs the
//! inner packet onto the upstream identity and emits it on the upstream
//! handle.

use super::engine::Engine;
use super::nat::{EncappedPacketSrc, HandleId, Quintuple};
use crate::capture::Capture;
use crate::protocol::ipv4::Ipv4Packet;
use crate::protocol::ipv6::Ipv6Packet;
use crate::protocol::tcp::build_syn_ack;
use crate::protocol::{
    parse_encapped, serialize_frame, NetworkKind, NetworkRepr, PacketIndicator, TransportKind,
    TransportRepr,
};
use crate::{Error, Result};
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// TTL on the handshake reply
const SYN_ACK_TTL: u8 = 128;

impl<H: Capture> Engine<H> {
    /// Entry point for one frame from a listen handle
    pub async fn handle_listen(&self, indicator: PacketIndicator, handle: HandleId) {
        if indicator.is_syn() {
            let client = indicator.src_addr();
            match self.handshake(&indicator).await {
                Ok(()) => info!("connect from client {}", client),
                Err(e) => {
                    self.record_drop(&e);
                    warn!("handle listen: handshake: {}", e);
                }
            }
            return;
        }

        // Pure carrier ACK, nothing to decapsulate
        if indicator.payload().is_empty() {
            return;
        }

        if let Err(e) = self.redirect_inbound(indicator, handle).await {
            self.record_drop(&e);
            warn!("handle listen: {}", e);
        }
    }

    /// Answer a carrier SYN with SYN+ACK and initialize the session
    async fn handshake(&self, indicator: &PacketIndicator) -> Result<()> {
        let client = indicator.src_addr();
        let session = self.sessions.session(client);
        let mut state = session.lock().await;

        state.seq = 0;
        state.ack = indicator.seq().wrapping_add(1);

        let mut transport = TransportRepr::Tcp(build_syn_ack(
            self.listen_port,
            client.port(),
            state.seq,
            state.ack,
        ));

        // The reply claims the server's own address on the listen device:
        // the destination of the frame that just arrived.
        let mut network = match (indicator.dst_ip(), indicator.src_ip()) {
            (IpAddr::V4(server), IpAddr::V4(client_ip)) => NetworkRepr::V4(Ipv4Packet::build(
                server,
                client_ip,
                self.next_ipv4_id(),
                SYN_ACK_TTL,
                TransportKind::Tcp,
            )),
            (IpAddr::V6(server), IpAddr::V6(client_ip)) => {
                NetworkRepr::V6(Ipv6Packet::build(server, client_ip, TransportKind::Tcp))
            }
            _ => return Err(Error::Parse("mixed address families in frame".into())),
        };

        let link = self.link_repr()?;
        let frame = serialize_frame(&link, &mut network, &mut transport);
        self.up_handle.send(&frame).await?;

        self.stats.handshakes.inc();
        Ok(())
    }

    /// Decapsulate a data segment and push the inner packet upstream
    async fn redirect_inbound(&self, indicator: PacketIndicator, handle: HandleId) -> Result<()> {
        let client = indicator.src_addr();
        let payload_len = indicator.payload().len();

        // The session lock is held through the emission so segments of one
        // carrier leave in order.
        let session = self.sessions.session(client);
        let mut state = session.lock().await;
        state.ack = state.ack.wrapping_add(payload_len as u32);

        let encapped = parse_encapped(indicator.payload())?;

        let inner_src = encapped.src_addr();
        let inner_dst = encapped.dst_addr();
        let protocol = encapped.transport_kind();
        let inner_ttl = encapped.ttl();
        let inner_id = encapped.ipv4_id();
        let network_kind = encapped.network_kind();

        let upstream_ip: IpAddr = match network_kind {
            NetworkKind::Ipv4 => self
                .updev
                .ipv4_addr()
                .map(IpAddr::V4)
                .ok_or(Error::IpVersionTransition { family: "IPv4" })?,
            NetworkKind::Ipv6 => self
                .updev
                .ipv6_addr()
                .map(IpAddr::V6)
                .ok_or(Error::IpVersionTransition { family: "IPv6" })?,
        };

        let forward = Quintuple {
            src_ip: inner_src.ip(),
            src_port: inner_src.port(),
            dst_ip: client.ip(),
            dst_port: client.port(),
            protocol,
        };

        let port = self.nat.lookup_or_allocate(forward, |port| {
            let reverse = Quintuple {
                src_ip: upstream_ip,
                src_port: port,
                dst_ip: inner_dst.ip(),
                dst_port: inner_dst.port(),
                protocol,
            };
            let entry = EncappedPacketSrc {
                carrier_ip: client.ip(),
                carrier_port: client.port(),
                inner_src_ip: inner_src.ip(),
                inner_src_port: inner_src.port(),
                handle,
            };
            (reverse, entry)
        });

        let (_, _, mut transport) = encapped.into_parts();
        transport.set_src_port(port);

        let mut network = match (upstream_ip, inner_dst.ip()) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let Some(ttl) = inner_ttl.checked_sub(1) else {
                    self.stats.ttl_drops.inc();
                    debug!("handle listen: TTL exceeded for {} -> {}", inner_src, inner_dst);
                    return Ok(());
                };
                NetworkRepr::V4(Ipv4Packet::build(
                    src,
                    dst,
                    inner_id.unwrap_or_default(),
                    ttl,
                    protocol,
                ))
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                NetworkRepr::V6(Ipv6Packet::build(src, dst, protocol))
            }
            _ => return Err(Error::Parse("mixed address families in packet".into())),
        };

        let link = self.link_repr()?;
        let frame = serialize_frame(&link, &mut network, &mut transport);
        self.up_handle.send(&frame).await?;

        self.stats.inbound_redirects.inc();
        self.stats.inbound_bytes.add(payload_len as u64);
        info!(
            "redirect an inbound {} packet: {}:{} -> {} ({} bytes)",
            protocol,
            inner_src.ip(),
            port,
            inner_dst,
            payload_len
        );

        Ok(())
    }
}
