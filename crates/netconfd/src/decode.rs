//! Typed decoding of routing netlink messages
//!
//! Converts parsed `RouteNetlinkMessage` payloads into the registry's event
//! vocabulary. Route messages only produce an event when they describe a
//! default route (destination prefix length zero with a gateway attribute);
//! everything else the kernel reports on the route groups is silently dropped.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Validate kernel messages
//! - SI-4: System Monitoring - Translate kernel events for monitoring

use crate::types::{
    AddressInfo, DefaultGateway, InterfaceInfo, MacAddress, NeighborInfo, NetworkEvent,
};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{InfoData, InfoKind, InfoVlan, LinkAttribute, LinkInfo, LinkMessage};
use netlink_packet_route::neighbour::{NeighbourAddress, NeighbourAttribute, NeighbourMessage};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use std::net::IpAddr;

/// Decode one routing message into a registry event.
///
/// Returns `None` for message types the registry has no interest in and for
/// route messages that do not describe a default route.
pub fn decode(message: &RouteNetlinkMessage) -> Option<NetworkEvent> {
    match message {
        RouteNetlinkMessage::NewLink(m) => Some(NetworkEvent::NewLink(link_info(m))),
        RouteNetlinkMessage::DelLink(m) => Some(NetworkEvent::DelLink(link_info(m))),
        RouteNetlinkMessage::NewAddress(m) => Some(address_event(m, true)),
        RouteNetlinkMessage::DelAddress(m) => Some(address_event(m, false)),
        RouteNetlinkMessage::NewNeighbour(m) => Some(NetworkEvent::NewNeigh(neighbor_info(m))),
        RouteNetlinkMessage::DelNeighbour(m) => Some(NetworkEvent::DelNeigh(neighbor_info(m))),
        RouteNetlinkMessage::NewRoute(m) => default_gateway(m).map(NetworkEvent::NewDefGw),
        RouteNetlinkMessage::DelRoute(m) => default_gateway(m).map(NetworkEvent::DelDefGw),
        _ => None,
    }
}

/// Extract link attributes, including VLAN kind and id from nested link-info
fn link_info(msg: &LinkMessage) -> InterfaceInfo {
    let mut info = InterfaceInfo {
        index: msg.header.index,
        arp_type: u16::from(msg.header.link_layer_type),
        flags: msg.header.flags.bits(),
        ..Default::default()
    };

    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(name) => info.name = Some(name.clone()),
            LinkAttribute::Address(bytes) => info.mac = MacAddress::from_bytes(bytes),
            LinkAttribute::Mtu(mtu) => info.mtu = Some(*mtu),
            LinkAttribute::Link(parent) => info.parent_index = Some(*parent),
            LinkAttribute::LinkInfo(nested) => {
                for link_info in nested {
                    match link_info {
                        LinkInfo::Kind(kind) => info.kind = Some(kind_name(kind)),
                        LinkInfo::Data(InfoData::Vlan(vlan)) => {
                            for entry in vlan {
                                if let InfoVlan::Id(id) = entry {
                                    info.vlan_id = Some(*id);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    info
}

fn kind_name(kind: &InfoKind) -> String {
    match kind {
        InfoKind::Vlan => "vlan".to_string(),
        InfoKind::Bridge => "bridge".to_string(),
        InfoKind::Bond => "bond".to_string(),
        InfoKind::Veth => "veth".to_string(),
        InfoKind::Dummy => "dummy".to_string(),
        InfoKind::Other(name) => name.clone(),
        other => format!("{other:?}").to_ascii_lowercase(),
    }
}

/// Decode an address message; a message without an address attribute is
/// reported as a decode failure with the offending interface index.
fn address_event(msg: &AddressMessage, new: bool) -> NetworkEvent {
    let index = msg.header.index;
    let mut local: Option<IpAddr> = None;
    let mut address: Option<IpAddr> = None;
    let mut ext_flags: Option<u32> = None;

    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(addr) => local = Some(*addr),
            AddressAttribute::Address(addr) => address = Some(*addr),
            AddressAttribute::Flags(flags) => ext_flags = Some(flags.bits()),
            _ => {}
        }
    }

    // IFA_LOCAL is the interface's own address on point-to-point links;
    // everywhere else the two attributes coincide.
    let Some(addr) = local.or(address) else {
        return NetworkEvent::DecodeFailure {
            what: "address",
            index: Some(index),
        };
    };

    let info = AddressInfo {
        index,
        prefix: crate::types::IpPrefix {
            addr,
            prefix_len: msg.header.prefix_len,
        },
        scope: u8::from(msg.header.scope),
        // extended flags supersede the truncated header flags when present
        flags: ext_flags.unwrap_or_else(|| u32::from(msg.header.flags.bits())),
    };

    if new {
        NetworkEvent::NewAddr(info)
    } else {
        NetworkEvent::DelAddr(info)
    }
}

fn neighbor_info(msg: &NeighbourMessage) -> NeighborInfo {
    let mut info = NeighborInfo {
        index: msg.header.ifindex,
        addr: None,
        lladdr: None,
        state: u16::from(msg.header.state),
    };

    for attr in &msg.attributes {
        match attr {
            NeighbourAttribute::Destination(dest) => {
                info.addr = match dest {
                    NeighbourAddress::Inet(addr) => Some(IpAddr::V4(*addr)),
                    NeighbourAddress::Inet6(addr) => Some(IpAddr::V6(*addr)),
                    _ => None,
                };
            }
            NeighbourAttribute::LinkLocalAddress(bytes) => {
                info.lladdr = MacAddress::from_bytes(bytes);
            }
            _ => {}
        }
    }

    info
}

/// A route message qualifies only when the destination prefix length is zero,
/// a gateway is present, and the route names its output interface.
fn default_gateway(msg: &RouteMessage) -> Option<DefaultGateway> {
    if msg.header.destination_prefix_length != 0 {
        return None;
    }

    let mut gateway: Option<IpAddr> = None;
    let mut oif: Option<u32> = None;

    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Gateway(RouteAddress::Inet(addr)) => {
                gateway = Some(IpAddr::V4(*addr));
            }
            RouteAttribute::Gateway(RouteAddress::Inet6(addr)) => {
                gateway = Some(IpAddr::V6(*addr));
            }
            RouteAttribute::Oif(index) => oif = Some(*index),
            _ => {}
        }
    }

    Some(DefaultGateway {
        index: oif?,
        addr: gateway?,
    })
}
