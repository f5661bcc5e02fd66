//! Kernel event source: raw routing netlink socket
//!
//! Opens a non-blocking `NETLINK_ROUTE` socket subscribed to the link,
//! address, route and neighbor multicast groups, performs the initial state
//! dumps, and feeds decoded events into the registry channel in kernel order.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Kernel interface for network state
//! - SI-4: System Monitoring - Real-time link state monitoring
//! - CM-8: System Component Inventory - Initial interface inventory dump

use crate::decode;
use crate::error::{NetconfdError, Result};
use crate::types::NetworkEvent;
use netlink_packet_core::{NLM_F_DUMP, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_packet_route::address::AddressMessage;
use netlink_packet_route::link::LinkMessage;
use netlink_packet_route::neighbour::NeighbourMessage;
use netlink_packet_route::route::RouteMessage;
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Routing netlink multicast groups (RTNLGRP_* from linux/rtnetlink.h)
const RTNLGRP_LINK: u32 = 1;
const RTNLGRP_NEIGH: u32 = 3;
const RTNLGRP_IPV4_IFADDR: u32 = 5;
const RTNLGRP_IPV4_ROUTE: u32 = 7;
const RTNLGRP_IPV6_IFADDR: u32 = 9;
const RTNLGRP_IPV6_ROUTE: u32 = 11;

const RECV_BUFFER_SIZE: usize = 65536;

fn group_bit(group: u32) -> u32 {
    1 << (group - 1)
}

/// The four initial dumps, in the order the kernel state is reconstructed
#[derive(Debug, Clone, Copy)]
enum DumpKind {
    Links,
    Addresses,
    Routes,
    Neighbors,
}

const DUMP_ORDER: [DumpKind; 4] = [
    DumpKind::Links,
    DumpKind::Addresses,
    DumpKind::Routes,
    DumpKind::Neighbors,
];

enum Recv {
    Data(usize),
    /// The kernel dropped messages (ENOBUFS); registry state must be re-dumped
    Overrun,
}

#[derive(Default)]
struct ParseOutcome {
    events: Vec<NetworkEvent>,
    done: bool,
    overrun: bool,
}

/// Kernel event source (C1)
///
/// # NIST Controls
/// - AC-3: Access Enforcement - Kernel netlink requires CAP_NET_ADMIN
pub struct KernelEventSource {
    socket: AsyncFd<Socket>,
    buffer: Vec<u8>,
    sequence: u32,
}

impl KernelEventSource {
    /// Create and bind the multicast-subscribed netlink socket.
    /// Socket-level failures here are fatal for the daemon.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| NetconfdError::Netlink(format!("Failed to create socket: {e}")))?;
        socket
            .set_non_blocking(true)
            .map_err(|e| NetconfdError::Netlink(format!("Failed to set non-blocking: {e}")))?;

        let groups = group_bit(RTNLGRP_LINK)
            | group_bit(RTNLGRP_IPV4_IFADDR)
            | group_bit(RTNLGRP_IPV6_IFADDR)
            | group_bit(RTNLGRP_IPV4_ROUTE)
            | group_bit(RTNLGRP_IPV6_ROUTE)
            | group_bit(RTNLGRP_NEIGH);
        let addr = SocketAddr::new(0, groups);
        socket
            .bind(&addr)
            .map_err(|e| NetconfdError::Netlink(format!("Failed to bind socket: {e}")))?;

        debug!("Netlink socket bound to link/address/route/neighbor groups");

        Ok(Self {
            socket: AsyncFd::new(socket)
                .map_err(|e| NetconfdError::Netlink(format!("Failed to register socket: {e}")))?,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
            sequence: 0,
        })
    }

    /// Run the source until the channel closes or the socket fails.
    ///
    /// Performs the initial dumps, then drains multicast messages as readiness
    /// arrives. All messages from one socket drain are delivered before the
    /// loop returns to readiness polling.
    #[instrument(skip_all)]
    pub async fn run(mut self, tx: mpsc::Sender<NetworkEvent>) -> Result<()> {
        self.dump_all(&tx).await?;
        info!("Listening for kernel network events");

        loop {
            match self.recv().await? {
                Recv::Overrun => {
                    warn!("Netlink receive overrun, re-dumping kernel state");
                    self.dump_all(&tx).await?;
                }
                Recv::Data(len) => {
                    let outcome = parse_buffer(&self.buffer[..len]);
                    for event in outcome.events {
                        send(&tx, event).await?;
                    }
                    if outcome.overrun {
                        warn!("Netlink overrun message, re-dumping kernel state");
                        self.dump_all(&tx).await?;
                    }
                }
            }
        }
    }

    /// Dump links, addresses, routes and neighbors, in that order.
    /// Each dump is drained through its DONE marker before the next starts;
    /// the kernel rejects overlapping dumps on one socket.
    async fn dump_all(&mut self, tx: &mpsc::Sender<NetworkEvent>) -> Result<()> {
        for kind in DUMP_ORDER {
            self.dump(kind, tx).await?;
        }
        debug!("Kernel state dump complete");
        Ok(())
    }

    async fn dump(&mut self, kind: DumpKind, tx: &mpsc::Sender<NetworkEvent>) -> Result<()> {
        'restart: loop {
            let request = self.dump_request(kind);
            self.send_message(&request)?;

            loop {
                match self.recv().await? {
                    Recv::Overrun => {
                        warn!(kind = ?kind, "Receive overrun during dump, restarting dump");
                        continue 'restart;
                    }
                    Recv::Data(len) => {
                        let outcome = parse_buffer(&self.buffer[..len]);
                        for event in outcome.events {
                            send(tx, event).await?;
                        }
                        if outcome.overrun {
                            warn!(kind = ?kind, "Overrun message during dump, restarting dump");
                            continue 'restart;
                        }
                        if outcome.done {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn dump_request(&mut self, kind: DumpKind) -> NetlinkMessage<RouteNetlinkMessage> {
        let payload = match kind {
            DumpKind::Links => RouteNetlinkMessage::GetLink(LinkMessage::default()),
            DumpKind::Addresses => RouteNetlinkMessage::GetAddress(AddressMessage::default()),
            DumpKind::Routes => RouteNetlinkMessage::GetRoute(RouteMessage::default()),
            DumpKind::Neighbors => RouteNetlinkMessage::GetNeighbour(NeighbourMessage::default()),
        };

        self.sequence = self.sequence.wrapping_add(1);
        let mut message = NetlinkMessage::from(payload);
        message.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        message.header.sequence_number = self.sequence;
        message.finalize();
        message
    }

    fn send_message(&self, message: &NetlinkMessage<RouteNetlinkMessage>) -> Result<()> {
        let mut buf = vec![0u8; message.buffer_len()];
        message.serialize(&mut buf);
        self.socket
            .get_ref()
            .send(&buf, 0)
            .map_err(|e| NetconfdError::Netlink(format!("Failed to send request: {e}")))?;
        Ok(())
    }

    /// Await readiness and read one datagram.
    ///
    /// `try_io` only clears readiness on EWOULDBLOCK, so calling this in a
    /// loop drains the socket completely before suspending again.
    async fn recv(&mut self) -> Result<Recv> {
        loop {
            let mut guard = self
                .socket
                .readable()
                .await
                .map_err(|e| NetconfdError::Netlink(format!("Socket wait failed: {e}")))?;

            match guard.try_io(|fd| fd.get_ref().recv(&mut &mut self.buffer[..], 0)) {
                Ok(Ok(len)) => return Ok(Recv::Data(len)),
                Ok(Err(e)) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    return Ok(Recv::Overrun);
                }
                Ok(Err(e)) => {
                    return Err(NetconfdError::Netlink(format!("Failed to receive: {e}")));
                }
                Err(_would_block) => continue,
            }
        }
    }
}

async fn send(tx: &mpsc::Sender<NetworkEvent>, event: NetworkEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| NetconfdError::Netlink("Event channel closed".to_string()))
}

/// Walk a receive buffer that may hold many netlink messages.
///
/// An undecodable message aborts the rest of the buffer (framing is lost) and
/// surfaces a decode-failure event carrying the interface index recovered from
/// the raw fixed header, so the registry can suppress it for ignored links.
fn parse_buffer(buf: &[u8]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut offset = 0;

    while offset < buf.len() {
        let bytes = &buf[offset..];
        let message = match NetlinkMessage::<RouteNetlinkMessage>::deserialize(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Undecodable netlink message, dropping rest of buffer");
                outcome.events.push(NetworkEvent::DecodeFailure {
                    what: "netlink",
                    index: fallback_ifindex(bytes),
                });
                break;
            }
        };

        let length = message.header.length as usize;
        if length == 0 {
            break;
        }

        match message.payload {
            NetlinkPayload::Done(_) => outcome.done = true,
            NetlinkPayload::Overrun(_) => outcome.overrun = true,
            NetlinkPayload::Error(err) => {
                warn!(error = ?err, "Netlink error message");
            }
            NetlinkPayload::InnerMessage(inner) => {
                if let Some(event) = decode::decode(&inner) {
                    outcome.events.push(event);
                }
            }
            _ => {}
        }

        // messages are 4-byte aligned within the datagram
        offset += (length + 3) & !3;
    }

    outcome
}

/// Best-effort interface index extraction from a raw message.
///
/// Link, address and neighbor messages all carry the index as a 32-bit field
/// at offset 4 of their fixed header, right behind the 16-byte netlink header.
fn fallback_ifindex(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 24 {
        return None;
    }
    let message_type = u16::from_ne_bytes([bytes[4], bytes[5]]);
    match message_type {
        t if t == libc::RTM_NEWLINK
            || t == libc::RTM_DELLINK
            || t == libc::RTM_NEWADDR
            || t == libc::RTM_DELADDR
            || t == libc::RTM_NEWNEIGH
            || t == libc::RTM_DELNEIGH =>
        {
            let index = i32::from_ne_bytes(bytes[20..24].try_into().ok()?);
            u32::try_from(index).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlink_packet_route::link::LinkAttribute;

    fn serialize(message: &NetlinkMessage<RouteNetlinkMessage>) -> Vec<u8> {
        let mut buf = vec![0u8; message.buffer_len()];
        message.serialize(&mut buf);
        buf
    }

    fn new_link_message(index: u32, name: &str) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut link = LinkMessage::default();
        link.header.index = index;
        link.attributes.push(LinkAttribute::IfName(name.to_string()));
        let mut message = NetlinkMessage::from(RouteNetlinkMessage::NewLink(link));
        message.finalize();
        message
    }

    #[test]
    fn test_parse_buffer_multiple_messages() {
        let mut buf = serialize(&new_link_message(2, "eth0"));
        buf.extend(serialize(&new_link_message(3, "eth1")));

        let outcome = parse_buffer(&buf);
        assert_eq!(outcome.events.len(), 2);
        assert!(!outcome.done);

        let NetworkEvent::NewLink(first) = &outcome.events[0] else {
            panic!("expected a link event");
        };
        assert_eq!(first.index, 2);
        let NetworkEvent::NewLink(second) = &outcome.events[1] else {
            panic!("expected a link event");
        };
        assert_eq!(second.index, 3);
    }

    #[test]
    fn test_parse_buffer_empty() {
        let outcome = parse_buffer(&[]);
        assert!(outcome.events.is_empty());
        assert!(!outcome.done);
    }

    #[test]
    fn test_fallback_ifindex_from_raw_link_header() {
        // nlmsghdr: len=32, type=RTM_NEWLINK, flags=0, seq=0, pid=0
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&32u32.to_ne_bytes());
        bytes.extend_from_slice(&libc::RTM_NEWLINK.to_ne_bytes());
        bytes.extend_from_slice(&0u16.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        // ifinfomsg: family, pad, type, index=9, flags, change
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&0u16.to_ne_bytes());
        bytes.extend_from_slice(&9i32.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());

        assert_eq!(fallback_ifindex(&bytes), Some(9));
    }

    #[test]
    fn test_fallback_ifindex_rejects_short_and_route_messages() {
        assert_eq!(fallback_ifindex(&[0u8; 8]), None);

        let mut bytes = vec![0u8; 28];
        bytes[4..6].copy_from_slice(&libc::RTM_NEWROUTE.to_ne_bytes());
        assert_eq!(fallback_ifindex(&bytes), None);
    }

    #[test]
    fn test_group_bitmask() {
        assert_eq!(group_bit(RTNLGRP_LINK), 0x1);
        assert_eq!(group_bit(RTNLGRP_NEIGH), 0x4);
        assert_eq!(group_bit(RTNLGRP_IPV4_IFADDR), 0x10);
    }
}
