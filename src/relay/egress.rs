//! Upstream-side handler
//!
//! Consumes return frames admitted by the upstream filter, matches them
//! against the reverse NAT table, restores the original inner source
//! identity and sends the packet back to its carrier as the payload of a
//! synthesized carrier TCP segment.
//!
//! Note the asymmetry with ingress: emissions here go to the specific
//! listen handle the carrier session arrived on, preserving return
//! affinity across multi-homed listen setups.

use super::engine::Engine;
use super::nat::Quintuple;
use crate::capture::Capture;
use crate::protocol::ipv4::Ipv4Packet;
use crate::protocol::ipv6::Ipv6Packet;
use crate::protocol::tcp::build_data_ack;
use crate::protocol::{
    serialize_frame, serialize_packet, NetworkRepr, PacketIndicator, TransportKind, TransportRepr,
};
use crate::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, trace, warn};

impl<H: Capture> Engine<H> {
    /// Entry point for one frame from the upstream handle
    pub async fn handle_upstream(&self, indicator: PacketIndicator) {
        if let Err(e) = self.redirect_outbound(indicator).await {
            self.record_drop(&e);
            warn!("handle upstream: {}", e);
        }
    }

    async fn redirect_outbound(&self, mut indicator: PacketIndicator) -> Result<()> {
        // From the upstream-inbound point of view the packet is addressed
        // to the identity we handed out, so the reverse key swaps the
        // observed directions.
        let reverse = Quintuple {
            src_ip: indicator.dst_ip(),
            src_port: indicator.dst_port(),
            dst_ip: indicator.src_ip(),
            dst_port: indicator.src_port(),
            protocol: indicator.transport_kind(),
        };

        let Some(entry) = self.nat.reverse_lookup(&reverse) else {
            // Unrelated upstream traffic; not an error
            self.stats.nat_misses.inc();
            trace!(
                "no reverse entry for {}:{}",
                indicator.dst_ip(),
                indicator.dst_port()
            );
            return Ok(());
        };

        let protocol = indicator.transport_kind();
        let inner_ttl = indicator.ttl();

        // Restore the original inner identity in place
        indicator.transport_mut().set_src_port(entry.inner_src_port);
        indicator.network_mut().set_src_addr(entry.inner_src_ip)?;

        let (_, mut inner_network, mut inner_transport) = indicator.into_parts();
        let payload = serialize_packet(&mut inner_network, &mut inner_transport);

        let carrier = SocketAddr::new(entry.carrier_ip, entry.carrier_port);
        let session = self.sessions.session(carrier);
        // Held through the write and the seq advance: carrier segments for
        // one client leave in seq order.
        let mut state = session.lock().await;

        let mut carrier_tcp =
            build_data_ack(self.listen_port, entry.carrier_port, state.seq, state.ack);
        carrier_tcp.set_payload(&payload);
        let mut transport = TransportRepr::Tcp(carrier_tcp);

        // Carrier IP version follows the gateway's address family
        let gateway_ip = self
            .gateway
            .ip_addr()
            .ok_or_else(|| Error::Config("gateway has no address".into()))?;

        let mut network = match gateway_ip {
            IpAddr::V4(_) => {
                let src = self
                    .updev
                    .ipv4_addr()
                    .ok_or(Error::IpVersionTransition { family: "IPv4" })?;
                let IpAddr::V4(dst) = entry.carrier_ip else {
                    return Err(Error::IpVersionTransition { family: "IPv4" });
                };
                let Some(ttl) = inner_ttl.checked_sub(1) else {
                    self.stats.ttl_drops.inc();
                    debug!("handle upstream: TTL exceeded towards {}", carrier);
                    return Ok(());
                };
                NetworkRepr::V4(Ipv4Packet::build(
                    src,
                    dst,
                    self.next_ipv4_id(),
                    ttl,
                    TransportKind::Tcp,
                ))
            }
            IpAddr::V6(_) => {
                let src = self
                    .updev
                    .ipv6_addr()
                    .ok_or(Error::IpVersionTransition { family: "IPv6" })?;
                let IpAddr::V6(dst) = entry.carrier_ip else {
                    return Err(Error::IpVersionTransition { family: "IPv6" });
                };
                NetworkRepr::V6(Ipv6Packet::build(src, dst, TransportKind::Tcp))
            }
        };

        let link = self.link_repr()?;
        let frame = serialize_frame(&link, &mut network, &mut transport);

        let Some(listen_handle) = self.listen_handles.get(entry.handle.0) else {
            return Err(Error::Config("stale listen handle in NAT entry".into()));
        };
        listen_handle.send(&frame).await?;

        state.seq = state.seq.wrapping_add(payload.len() as u32);

        self.stats.outbound_redirects.inc();
        self.stats.outbound_bytes.add(payload.len() as u64);
        info!(
            "redirect an outbound {} packet: {}:{} -> {} ({} bytes)",
            protocol,
            entry.inner_src_ip,
            entry.inner_src_port,
            carrier,
            payload.len()
        );

        Ok(())
    }
}
