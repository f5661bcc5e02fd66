//! Core types for the interface registry
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Interfaces, addresses and neighbors as components
//! - SI-4: System Monitoring - Kernel-reported link state tracking
//! - SC-7: Boundary Protection - Network boundary awareness

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// ARP hardware type for Ethernet (ARPHRD_ETHER from linux/if_arp.h).
/// Links reporting any other hardware type are permanently ignored.
pub const ARPHRD_ETHER: u16 = 1;

/// Deprecated-address flag (IFA_F_DEPRECATED from linux/if_addr.h)
pub const IFA_F_DEPRECATED: u32 = 0x20;

/// Permanent neighbor state bit (NUD_PERMANENT from linux/neighbour.h)
pub const NUD_PERMANENT: u16 = 0x80;

/// MAC address representation
///
/// # NIST Controls
/// - IA-3: Device Identification - MAC addresses for device identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Zero MAC address
    pub const ZERO: Self = Self([0, 0, 0, 0, 0, 0]);

    /// Check if this is a zero MAC
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO.0
    }

    /// Build a MAC from a raw attribute payload; only 6-byte payloads qualify
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(());
        }
        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        Ok(Self(bytes))
    }
}

/// An IP address together with its prefix length
///
/// This is the equality key for per-interface address maps: two reports of
/// the same address with different prefix lengths are distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s.split_once('/').ok_or(())?;
        Ok(Self {
            addr: addr.parse().map_err(|_| ())?,
            prefix_len: len.parse().map_err(|_| ())?,
        })
    }
}

/// Kernel-reported link attributes for one interface
///
/// # NIST Controls
/// - CM-8: System Component Inventory - Link inventory entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Kernel link index; stable for the lifetime of the kernel link
    pub index: u32,
    pub name: Option<String>,
    /// ARP hardware type; only `ARPHRD_ETHER` links are admitted
    pub arp_type: u16,
    pub mac: Option<MacAddress>,
    pub mtu: Option<u32>,
    pub flags: u32,
    /// Link kind from nested link-info (e.g. "vlan")
    pub kind: Option<String>,
    /// Parent link index for stacked links
    pub parent_index: Option<u32>,
    pub vlan_id: Option<u16>,
}

impl InterfaceInfo {
    /// Whether this link reports as Ethernet-class hardware
    #[inline]
    pub fn is_ethernet(&self) -> bool {
        self.arp_type == ARPHRD_ETHER
    }
}

/// Kernel-reported address on one interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressInfo {
    pub index: u32,
    pub prefix: IpPrefix,
    pub scope: u8,
    pub flags: u32,
}

impl AddressInfo {
    /// Deprecated addresses are dropped at ingestion
    #[inline]
    pub fn is_deprecated(&self) -> bool {
        self.flags & IFA_F_DEPRECATED != 0
    }
}

/// Kernel-reported neighbor table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborInfo {
    pub index: u32,
    pub addr: Option<IpAddr>,
    pub lladdr: Option<MacAddress>,
    pub state: u16,
}

impl NeighborInfo {
    /// Only permanent entries with an address are retained by the registry
    #[inline]
    pub fn is_static(&self) -> bool {
        self.state & NUD_PERMANENT != 0 && self.addr.is_some()
    }
}

/// A default route: destination prefix length zero with a gateway present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultGateway {
    pub index: u32,
    pub addr: IpAddr,
}

/// Per-interface aggregate of everything the kernel has reported
///
/// # NIST Controls
/// - CM-8: System Component Inventory - Aggregate interface record
#[derive(Debug, Clone, Default)]
pub struct AllIntfInfo {
    pub intf: InterfaceInfo,
    /// At most one IPv4 default gateway; re-adding replaces
    pub defgw4: Option<Ipv4Addr>,
    /// At most one IPv6 default gateway; re-adding replaces
    pub defgw6: Option<Ipv6Addr>,
    pub addrs: HashMap<IpPrefix, AddressInfo>,
    pub static_neighbors: HashMap<IpAddr, NeighborInfo>,
}

impl AllIntfInfo {
    pub fn new(intf: InterfaceInfo) -> Self {
        Self {
            intf,
            ..Default::default()
        }
    }
}

/// The link supervisor's categorical opinion of a link
///
/// Any state string other than the three named ones means the supervisor
/// manages the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdministrativeState {
    Initialized,
    Linger,
    Unmanaged,
    Managed,
}

impl AdministrativeState {
    pub fn parse(s: &str) -> Self {
        match s {
            "initialized" => Self::Initialized,
            "linger" => Self::Linger,
            "unmanaged" => Self::Unmanaged,
            _ => Self::Managed,
        }
    }
}

/// Typed events delivered to the registry
///
/// Kernel events arrive from the netlink source in kernel order; supervisor
/// state updates arrive from the bus watcher. All registry mutations flow
/// through this enum so the registry is never re-entered.
///
/// # NIST Controls
/// - SI-4: System Monitoring - Event-driven state tracking
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    NewLink(InterfaceInfo),
    DelLink(InterfaceInfo),
    NewAddr(AddressInfo),
    DelAddr(AddressInfo),
    NewDefGw(DefaultGateway),
    DelDefGw(DefaultGateway),
    NewNeigh(NeighborInfo),
    DelNeigh(NeighborInfo),
    /// Administrative state reported by the link supervisor
    AdminState { index: u32, state: AdministrativeState },
    /// A message that could not be decoded; logged unless the index is ignored
    DecodeFailure { what: &'static str, index: Option<u32> },
}
