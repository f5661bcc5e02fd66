//! Per-interface runtime object
//!
//! An `EthernetInterface` holds the runtime properties of one managed link,
//! owns its addresses and static neighbors, and emits the persisted
//! configuration file the link supervisor consumes.

use crate::config::NetworkFileConfig;
use crate::error::Result;
use crate::types::{AddressInfo, AllIntfInfo, InterfaceInfo, IpPrefix, MacAddress, NeighborInfo};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use tracing::{debug, info};

/// Universe scope (RT_SCOPE_UNIVERSE); only globally scoped addresses are
/// written back into configuration files.
const SCOPE_UNIVERSE: u8 = 0;

/// Build the bus object path for an interface name under the export root
pub fn object_path_for(root: &str, name: &str) -> String {
    let escaped: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{root}/{escaped}")
}

/// Runtime state of one managed Ethernet interface
pub struct EthernetInterface {
    name: String,
    index: u32,
    mac: Option<MacAddress>,
    mtu: Option<u32>,
    flags: u32,
    kind: Option<String>,
    parent_index: Option<u32>,
    vlan_id: Option<u16>,
    /// Whether the supervisor reports this link as managed
    managed: bool,
    dhcp_enabled: bool,
    addresses: HashMap<IpPrefix, AddressInfo>,
    static_neighbors: HashMap<IpAddr, NeighborInfo>,
    gateway4: Option<Ipv4Addr>,
    gateway6: Option<Ipv6Addr>,
    dns_servers: Vec<String>,
    ntp_servers: Vec<String>,
    object_path: String,
}

impl EthernetInterface {
    /// Construct from the kernel aggregate and the persisted configuration.
    ///
    /// The caller guarantees the aggregate carries a name; an unnamed link
    /// cannot be keyed and is never materialized.
    pub fn new(
        all: &AllIntfInfo,
        config: &NetworkFileConfig,
        managed: bool,
        object_root: &str,
    ) -> Self {
        let name = all.intf.name.clone().unwrap_or_default();
        let object_path = object_path_for(object_root, &name);
        Self {
            name,
            index: all.intf.index,
            mac: all.intf.mac,
            mtu: all.intf.mtu,
            flags: all.intf.flags,
            kind: all.intf.kind.clone(),
            parent_index: all.intf.parent_index,
            vlan_id: all.intf.vlan_id,
            managed,
            dhcp_enabled: config.dhcp_enabled(),
            addresses: all.addrs.clone(),
            static_neighbors: all.static_neighbors.clone(),
            gateway4: all.defgw4,
            gateway6: all.defgw6,
            dns_servers: config.dns_servers(),
            ntp_servers: config.ntp_servers(),
            object_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn dhcp_enabled(&self) -> bool {
        self.dhcp_enabled
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn addresses(&self) -> &HashMap<IpPrefix, AddressInfo> {
        &self.addresses
    }

    pub fn static_neighbors(&self) -> &HashMap<IpAddr, NeighborInfo> {
        &self.static_neighbors
    }

    pub fn gateway4(&self) -> Option<Ipv4Addr> {
        self.gateway4
    }

    pub fn gateway6(&self) -> Option<Ipv6Addr> {
        self.gateway6
    }

    pub fn dns_servers(&self) -> &[String] {
        &self.dns_servers
    }

    pub fn ntp_servers(&self) -> &[String] {
        &self.ntp_servers
    }

    /// Replace kernel-reported fields in place.
    ///
    /// Returns whether anything changed, so replayed kernel dumps stay
    /// observably idempotent.
    pub fn update_info(&mut self, info: &InterfaceInfo) -> bool {
        let changed = self.index != info.index
            || self.mac != info.mac
            || self.mtu != info.mtu
            || self.flags != info.flags
            || self.kind != info.kind
            || self.parent_index != info.parent_index
            || self.vlan_id != info.vlan_id;
        self.index = info.index;
        self.mac = info.mac;
        self.mtu = info.mtu;
        self.flags = info.flags;
        self.kind = info.kind.clone();
        self.parent_index = info.parent_index;
        self.vlan_id = info.vlan_id;
        if changed {
            debug!(interface = %self.name, "Updated link properties");
        }
        changed
    }

    /// Update the managed flag; returns whether it changed
    pub fn set_managed(&mut self, managed: bool) -> bool {
        let changed = self.managed != managed;
        self.managed = managed;
        changed
    }

    pub fn add_address(&mut self, info: AddressInfo) {
        self.addresses.insert(info.prefix, info);
    }

    pub fn remove_address(&mut self, prefix: &IpPrefix) {
        self.addresses.remove(prefix);
    }

    pub fn add_neighbor(&mut self, info: NeighborInfo) {
        if let Some(addr) = info.addr {
            self.static_neighbors.insert(addr, info);
        }
    }

    pub fn remove_neighbor(&mut self, addr: &IpAddr) {
        self.static_neighbors.remove(addr);
    }

    pub fn set_default_gateway(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(v4) => self.gateway4 = Some(v4),
            IpAddr::V6(v6) => self.gateway6 = Some(v6),
        }
    }

    /// Clear the default gateway only if it still equals `addr`; a newer
    /// value may already have replaced the one being withdrawn.
    pub fn clear_default_gateway_if(&mut self, addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) if self.gateway4 == Some(*v4) => {
                self.gateway4 = None;
                true
            }
            IpAddr::V6(v6) if self.gateway6 == Some(*v6) => {
                self.gateway6 = None;
                true
            }
            _ => false,
        }
    }

    /// Render the persisted configuration file contents.
    ///
    /// Sections are emitted in a fixed order and collections are sorted, so
    /// repeated writes of unchanged state produce identical bytes.
    pub fn render_configuration(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Match]");
        let _ = writeln!(out, "Name={}", self.name);
        let _ = writeln!(out);
        let _ = writeln!(out, "[Network]");
        let _ = writeln!(out, "DHCP={}", if self.dhcp_enabled { "yes" } else { "no" });
        for server in &self.dns_servers {
            let _ = writeln!(out, "DNS={server}");
        }
        for server in &self.ntp_servers {
            let _ = writeln!(out, "NTP={server}");
        }

        if !self.dhcp_enabled {
            let mut prefixes: Vec<String> = self
                .addresses
                .values()
                .filter(|a| a.scope == SCOPE_UNIVERSE)
                .map(|a| a.prefix.to_string())
                .collect();
            prefixes.sort();
            for prefix in prefixes {
                let _ = writeln!(out);
                let _ = writeln!(out, "[Address]");
                let _ = writeln!(out, "Address={prefix}");
            }
        }

        let mut neighbors: Vec<&NeighborInfo> = self.static_neighbors.values().collect();
        neighbors.sort_by_key(|n| n.addr.map(|a| a.to_string()));
        for neighbor in neighbors {
            let Some(addr) = neighbor.addr else { continue };
            let _ = writeln!(out);
            let _ = writeln!(out, "[Neighbor]");
            let _ = writeln!(out, "Address={addr}");
            if let Some(lladdr) = neighbor.lladdr {
                let _ = writeln!(out, "LinkLayerAddress={lladdr}");
            }
        }

        for gateway in self
            .gateway4
            .map(IpAddr::V4)
            .into_iter()
            .chain(self.gateway6.map(IpAddr::V6))
        {
            let _ = writeln!(out);
            let _ = writeln!(out, "[Route]");
            let _ = writeln!(out, "Gateway={gateway}");
        }

        out
    }

    /// Emit `<name>.network` into the configuration directory. Idempotent.
    pub fn write_configuration_file(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.network", self.name));
        fs::write(&path, self.render_configuration())?;
        debug!(interface = %self.name, path = %path.display(), "Wrote interface configuration");
        Ok(())
    }

    /// Create the device file for a VLAN child on this interface and return
    /// the child's interface name. The child materializes as a registry
    /// object through the normal kernel link event path once the supervisor
    /// creates the device.
    pub fn create_vlan(&self, id: u16, dir: &Path) -> Result<String> {
        let vlan_name = format!("{}.{}", self.name, id);
        let mut out = String::new();
        let _ = writeln!(out, "[NetDev]");
        let _ = writeln!(out, "Name={vlan_name}");
        let _ = writeln!(out, "Kind=vlan");
        let _ = writeln!(out);
        let _ = writeln!(out, "[VLAN]");
        let _ = writeln!(out, "Id={id}");

        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{vlan_name}.netdev"));
        fs::write(&path, out)?;
        info!(parent = %self.name, vlan = %vlan_name, "Wrote VLAN device configuration");
        Ok(vlan_name)
    }
}
