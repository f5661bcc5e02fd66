//! Interface registry
//!
//! The `Manager` owns the authoritative model of every observed interface and
//! every materialized interface object. All kernel and supervisor events are
//! routed through it as message-style calls, so mutations never interleave.
//!
//! The managed-object pool is a function of the supervisor state map
//! intersected with the kernel-reported interface map: an object exists only
//! once both sides have spoken for an index.

use crate::bus::ObjectBus;
use crate::config::{NetworkFileConfig, Settings};
use crate::error::{NetconfdError, Result};
use crate::interface::{EthernetInterface, object_path_for};
use crate::lldp::LldpEmitter;
use crate::reload::ReloadCoordinator;
use crate::supervisor::LinkSupervisor;
use crate::types::{
    AddressInfo, AdministrativeState, AllIntfInfo, DefaultGateway, InterfaceInfo, NeighborInfo,
    NetworkEvent,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::IpAddr;
use tracing::{debug, error, info, instrument, warn};

/// Maximum valid VLAN identifier (4095 is reserved)
const VLAN_ID_MAX: u16 = 4094;

/// Interface registry and object pool owner (C4)
pub struct Manager {
    settings: Settings,
    /// Every observed non-ignored interface, keyed by kernel index
    intf_info: HashMap<u32, AllIntfInfo>,
    /// Materialized objects, keyed by interface name; this map owns them
    interfaces: HashMap<String, EthernetInterface>,
    /// Index into `interfaces`: kernel index to owning name.
    /// Valid only while the named entry remains.
    interfaces_by_idx: HashMap<u32, String>,
    /// Interfaces the registry permanently refuses to manage
    ignored_intf: HashSet<u32>,
    /// true = managed, false = unmanaged, absent = supervisor has not spoken
    supervisor_state: HashMap<u32, bool>,
    bus: Box<dyn ObjectBus>,
    supervisor: Box<dyn LinkSupervisor>,
    reload: ReloadCoordinator,
    lldp: Option<LldpEmitter>,
}

impl Manager {
    pub fn new(
        settings: Settings,
        bus: Box<dyn ObjectBus>,
        supervisor: Box<dyn LinkSupervisor>,
    ) -> Self {
        Self {
            settings,
            intf_info: HashMap::new(),
            interfaces: HashMap::new(),
            interfaces_by_idx: HashMap::new(),
            ignored_intf: HashSet::new(),
            supervisor_state: HashMap::new(),
            bus,
            supervisor,
            reload: ReloadCoordinator::new(),
            lldp: None,
        }
    }

    pub fn with_lldp(mut self, lldp: LldpEmitter) -> Self {
        self.lldp = Some(lldp);
        self
    }

    /// Apply one event. Errors are logged here; this is the event-loop
    /// boundary and nothing escapes the daemon.
    pub fn handle_event(&mut self, event: NetworkEvent) {
        let result = match event {
            NetworkEvent::NewLink(info) => self.add_interface(info),
            NetworkEvent::DelLink(info) => self.remove_interface(&info),
            NetworkEvent::NewAddr(info) => self.add_address(info),
            NetworkEvent::DelAddr(info) => self.remove_address(&info),
            NetworkEvent::NewDefGw(gw) => self.add_default_gateway(gw),
            NetworkEvent::DelDefGw(gw) => self.remove_default_gateway(&gw),
            NetworkEvent::NewNeigh(info) => self.add_neighbor(info),
            NetworkEvent::DelNeigh(info) => self.remove_neighbor(&info),
            NetworkEvent::AdminState { index, state } => self.handle_admin_state(index, state),
            NetworkEvent::DecodeFailure { what, index } => {
                self.log_decode_failure(what, index);
                Ok(())
            }
        };

        if let Err(e) = result {
            match e {
                NetconfdError::UnknownInterface(_) => {
                    warn!(error = %e, "Dropped event for untracked interface");
                }
                _ => error!(error = %e, "Failed to apply network event"),
            }
        }
    }

    /// Admit a kernel link report into the registry
    #[instrument(skip_all, fields(index = info.index, name = info.name.as_deref()))]
    pub fn add_interface(&mut self, info: InterfaceInfo) -> Result<()> {
        // ignore membership is decided at first sight and never revisited
        if self.ignored_intf.contains(&info.index) {
            return Ok(());
        }
        if !info.is_ethernet() {
            debug!(arp_type = info.arp_type, "Ignoring non-Ethernet link");
            self.ignored_intf.insert(info.index);
            return Ok(());
        }
        if let Some(name) = &info.name {
            if self.settings.is_ignored(name) {
                info!(name = %name, "Interface matches the ignore list");
                self.ignored_intf.insert(info.index);
                return Ok(());
            }
        }

        let index = info.index;
        match self.intf_info.entry(index) {
            Entry::Occupied(mut entry) => entry.get_mut().intf = info,
            Entry::Vacant(entry) => {
                entry.insert(AllIntfInfo::new(info));
            }
        }

        if let Some(&managed) = self.supervisor_state.get(&index) {
            self.create_interface(index, managed)?;
        }
        Ok(())
    }

    /// Materialize or refresh the object for an index whose supervisor state
    /// is known
    pub fn create_interface(&mut self, index: u32, managed: bool) -> Result<()> {
        if self.ignored_intf.contains(&index) {
            return Ok(());
        }
        let Some(all) = self.intf_info.get(&index).cloned() else {
            return Ok(());
        };

        if let Some(bound_name) = self.interfaces_by_idx.get(&index).cloned() {
            let renamed = matches!(&all.intf.name, Some(name) if *name != bound_name);
            if !renamed {
                self.update_in_place(&bound_name, index, &all.intf, managed);
                return Ok(());
            }
            // the kernel renamed the link: the old object is destroyed and a
            // fresh one is created under the new name
            info!(index, old = %bound_name, "Interface renamed, re-creating object");
            self.interfaces_by_idx.remove(&index);
            if let Some(old) = self.interfaces.remove(&bound_name) {
                self.bus.emit_removed(old.object_path());
            }
        } else if let Some(name) = &all.intf.name {
            if self.interfaces.contains_key(name) {
                // a new kernel index claimed an existing name: the object is
                // reused across the index change
                self.interfaces_by_idx
                    .retain(|_, bound| bound.as_str() != name.as_str());
                self.interfaces_by_idx.insert(index, name.clone());
                let name = name.clone();
                self.update_in_place(&name, index, &all.intf, managed);
                return Ok(());
            }
        }

        let Some(name) = all.intf.name.clone() else {
            warn!(index, "Cannot create an interface object without a name");
            return Ok(());
        };

        let config = NetworkFileConfig::load(&self.settings.config_dir, &name)?;
        let interface = EthernetInterface::new(&all, &config, managed, &self.settings.object_root);
        let path = interface.object_path().to_string();
        if managed {
            // an unmanaged link must not gain a persisted file: the
            // supervisor would start managing it on the next reload
            interface.write_configuration_file(&self.settings.config_dir)?;
        }
        self.interfaces.insert(name.clone(), interface);
        self.interfaces_by_idx.insert(index, name.clone());
        self.bus.emit_added(&path);
        info!(index, name = %name, managed, "Materialized interface object");
        if managed {
            self.materialization_changed();
        }
        Ok(())
    }

    fn update_in_place(&mut self, name: &str, index: u32, info: &InterfaceInfo, managed: bool) {
        if !self.interfaces.contains_key(name) {
            self.abort_corrupt(index, name);
        }
        let mut path = String::new();
        let mut info_changed = false;
        let mut managed_changed = false;
        if let Some(interface) = self.interfaces.get_mut(name) {
            info_changed = interface.update_info(info);
            managed_changed = interface.set_managed(managed);
            path = interface.object_path().to_string();
        }
        if info_changed {
            self.bus.emit_property_changed(&path, "InterfaceInfo");
        }
        if managed_changed {
            self.bus.emit_property_changed(&path, "Managed");
        }
    }

    /// Tear down all state for a removed kernel link
    #[instrument(skip_all, fields(index = info.index, name = info.name.as_deref()))]
    pub fn remove_interface(&mut self, info: &InterfaceInfo) -> Result<()> {
        let index = info.index;
        let bound_name = self.interfaces_by_idx.get(&index).cloned();

        // idx-lookup and name-lookup resolving to different live objects
        // means the maps have diverged
        if let (Some(idx_name), Some(name)) = (&bound_name, &info.name) {
            if idx_name != name && self.interfaces.contains_key(name) {
                self.abort_corrupt(index, idx_name);
            }
        }

        // removal order: index binding first, then the owning entry
        self.interfaces_by_idx.remove(&index);
        if let Some(key) = bound_name.or_else(|| info.name.clone()) {
            if let Some(interface) = self.interfaces.remove(&key) {
                info!(index, name = %key, "Destroyed interface object");
                self.bus.emit_removed(interface.object_path());
            }
        }
        self.intf_info.remove(&index);
        self.ignored_intf.remove(&index);
        Ok(())
    }

    #[instrument(skip_all, fields(index = info.index, prefix = %info.prefix))]
    pub fn add_address(&mut self, info: AddressInfo) -> Result<()> {
        if self.ignored_intf.contains(&info.index) {
            return Ok(());
        }
        if info.is_deprecated() {
            debug!("Dropping deprecated address");
            return Ok(());
        }
        let Some(entry) = self.intf_info.get_mut(&info.index) else {
            return Err(NetconfdError::UnknownInterface(info.index));
        };
        entry.addrs.insert(info.prefix, info);
        if let Some(interface) = self.object_by_index_mut(info.index) {
            interface.add_address(info);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = info.index, prefix = %info.prefix))]
    pub fn remove_address(&mut self, info: &AddressInfo) -> Result<()> {
        if self.ignored_intf.contains(&info.index) {
            return Ok(());
        }
        let Some(entry) = self.intf_info.get_mut(&info.index) else {
            return Err(NetconfdError::UnknownInterface(info.index));
        };
        entry.addrs.remove(&info.prefix);
        let prefix = info.prefix;
        if let Some(interface) = self.object_by_index_mut(info.index) {
            interface.remove_address(&prefix);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = info.index))]
    pub fn add_neighbor(&mut self, info: NeighborInfo) -> Result<()> {
        if self.ignored_intf.contains(&info.index) {
            return Ok(());
        }
        // only permanent entries with an address are retained
        if !info.is_static() {
            return Ok(());
        }
        let Some(addr) = info.addr else {
            return Ok(());
        };
        let Some(entry) = self.intf_info.get_mut(&info.index) else {
            return Err(NetconfdError::UnknownInterface(info.index));
        };
        entry.static_neighbors.insert(addr, info);
        if let Some(interface) = self.object_by_index_mut(info.index) {
            interface.add_neighbor(info);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = info.index))]
    pub fn remove_neighbor(&mut self, info: &NeighborInfo) -> Result<()> {
        if self.ignored_intf.contains(&info.index) {
            return Ok(());
        }
        // removal tolerates entries the registry never admitted
        let Some(addr) = info.addr else {
            return Ok(());
        };
        let Some(entry) = self.intf_info.get_mut(&info.index) else {
            return Err(NetconfdError::UnknownInterface(info.index));
        };
        entry.static_neighbors.remove(&addr);
        if let Some(interface) = self.object_by_index_mut(info.index) {
            interface.remove_neighbor(&addr);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = gw.index, addr = %gw.addr))]
    pub fn add_default_gateway(&mut self, gw: DefaultGateway) -> Result<()> {
        if self.ignored_intf.contains(&gw.index) {
            return Ok(());
        }
        let Some(entry) = self.intf_info.get_mut(&gw.index) else {
            return Err(NetconfdError::UnknownInterface(gw.index));
        };
        // exactly one default gateway per family; re-adding replaces
        match gw.addr {
            IpAddr::V4(addr) => entry.defgw4 = Some(addr),
            IpAddr::V6(addr) => entry.defgw6 = Some(addr),
        }
        let mut path = None;
        if let Some(interface) = self.object_by_index_mut(gw.index) {
            interface.set_default_gateway(gw.addr);
            path = Some(interface.object_path().to_string());
        }
        if let Some(path) = path {
            self.bus.emit_property_changed(&path, "DefaultGateway");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(index = gw.index, addr = %gw.addr))]
    pub fn remove_default_gateway(&mut self, gw: &DefaultGateway) -> Result<()> {
        if self.ignored_intf.contains(&gw.index) {
            return Ok(());
        }
        let Some(entry) = self.intf_info.get_mut(&gw.index) else {
            return Err(NetconfdError::UnknownInterface(gw.index));
        };
        // only reset if the recorded gateway still equals the one being
        // withdrawn; a newer value may have arrived first
        match gw.addr {
            IpAddr::V4(addr) => {
                if entry.defgw4 == Some(addr) {
                    entry.defgw4 = None;
                }
            }
            IpAddr::V6(addr) => {
                if entry.defgw6 == Some(addr) {
                    entry.defgw6 = None;
                }
            }
        }
        let addr = gw.addr;
        let mut path = None;
        if let Some(interface) = self.object_by_index_mut(gw.index) {
            if interface.clear_default_gateway_if(&addr) {
                path = Some(interface.object_path().to_string());
            }
        }
        if let Some(path) = path {
            self.bus.emit_property_changed(&path, "DefaultGateway");
        }
        Ok(())
    }

    /// Apply an administrative state reported by the link supervisor
    #[instrument(skip(self))]
    pub fn handle_admin_state(&mut self, index: u32, state: AdministrativeState) -> Result<()> {
        match state {
            // neither counts as an answer: forget what we knew
            AdministrativeState::Initialized | AdministrativeState::Linger => {
                self.supervisor_state.remove(&index);
                Ok(())
            }
            AdministrativeState::Unmanaged => {
                self.supervisor_state.insert(index, false);
                if self.intf_info.contains_key(&index) {
                    self.create_interface(index, false)?;
                }
                Ok(())
            }
            AdministrativeState::Managed => {
                self.supervisor_state.insert(index, true);
                if self.intf_info.contains_key(&index) {
                    self.create_interface(index, true)?;
                }
                Ok(())
            }
        }
    }

    /// Create a VLAN on a managed parent interface; returns the object path
    /// of the child
    #[instrument(skip(self))]
    pub fn vlan(&mut self, name: &str, id: u16) -> Result<String> {
        if id == 0 || id > VLAN_ID_MAX {
            return Err(NetconfdError::InvalidArgument(format!(
                "VLAN id {id} out of range"
            )));
        }
        let Some(parent) = self.interfaces.get(name) else {
            return Err(NetconfdError::NotFound(format!("interface {name}")));
        };
        let vlan_name = parent.create_vlan(id, &self.settings.config_dir)?;
        self.reload.schedule();
        Ok(object_path_for(&self.settings.object_root, &vlan_name))
    }

    /// Delete every file in the configuration directory, ignoring per-file
    /// errors. In-memory objects survive; the next reload re-materializes
    /// their configuration.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<()> {
        let entries = match fs::read_dir(&self.settings.config_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cannot enumerate configuration directory");
                return Ok(());
            }
        };
        for entry in entries.flatten() {
            if let Err(e) = fs::remove_file(entry.path()) {
                debug!(path = %entry.path().display(), error = %e, "Failed to delete");
            }
        }
        info!("Cleared network configuration directory");
        Ok(())
    }

    /// Emit the configuration file of every managed interface. Idempotent.
    pub fn write_configuration_files(&self) -> Result<()> {
        for interface in self.interfaces.values() {
            if !interface.is_managed() {
                continue;
            }
            if let Err(e) = interface.write_configuration_file(&self.settings.config_dir) {
                warn!(interface = interface.name(), error = %e, "Failed to write configuration");
            }
        }
        Ok(())
    }

    /// Access the reload coordinator to register hooks or schedule a reload
    pub fn reload(&mut self) -> &mut ReloadCoordinator {
        &mut self.reload
    }

    /// Pending reload deadline, if the debounce timer is armed
    pub fn reload_deadline(&self) -> Option<tokio::time::Instant> {
        self.reload.deadline()
    }

    /// Run the debounced reload sequence
    pub async fn fire_reload(&mut self) {
        let Self {
            reload, supervisor, ..
        } = self;
        reload.fire(supervisor.as_ref()).await;
    }

    // -- inspection ---------------------------------------------------------

    pub fn interface(&self, name: &str) -> Option<&EthernetInterface> {
        self.interfaces.get(name)
    }

    pub fn interface_names(&self) -> Vec<&str> {
        self.interfaces.keys().map(String::as_str).collect()
    }

    pub fn name_for_index(&self, index: u32) -> Option<&str> {
        self.interfaces_by_idx.get(&index).map(String::as_str)
    }

    pub fn tracked(&self, index: u32) -> Option<&AllIntfInfo> {
        self.intf_info.get(&index)
    }

    pub fn tracked_indices(&self) -> Vec<u32> {
        self.intf_info.keys().copied().collect()
    }

    pub fn is_index_ignored(&self, index: u32) -> bool {
        self.ignored_intf.contains(&index)
    }

    pub fn supervisor_state_for(&self, index: u32) -> Option<bool> {
        self.supervisor_state.get(&index).copied()
    }

    // -- internals ----------------------------------------------------------

    fn object_by_index_mut(&mut self, index: u32) -> Option<&mut EthernetInterface> {
        let name = self.interfaces_by_idx.get(&index)?.clone();
        self.interfaces.get_mut(&name)
    }

    fn materialization_changed(&mut self) {
        if let Some(lldp) = &self.lldp {
            let managed: Vec<String> = self
                .interfaces
                .values()
                .filter(|i| i.is_managed())
                .map(|i| i.name().to_string())
                .collect();
            self.reload.add_post_hook(lldp.refresh_hook(managed));
        }
        self.reload.schedule();
    }

    fn log_decode_failure(&self, what: &'static str, index: Option<u32>) {
        // suppressed entirely for interfaces the registry refuses to manage
        if let Some(index) = index {
            if self.ignored_intf.contains(&index) {
                return;
            }
            error!(what, index, "Failed to decode kernel message");
        } else {
            error!(what, "Failed to decode kernel message");
        }
    }

    fn abort_corrupt(&self, index: u32, name: &str) -> ! {
        error!(
            index,
            name, "Interface registry corrupted: index and name lookups disagree"
        );
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, RecordingBus};
    use crate::supervisor::RecordingSupervisor;
    use crate::types::{ARPHRD_ETHER, IFA_F_DEPRECATED, NUD_PERMANENT};
    use tempfile::TempDir;

    fn make_manager() -> (Manager, RecordingBus, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.config_dir = dir.path().to_path_buf();
        settings.ignored_interfaces = vec!["usb*".to_string(), "lo".to_string()];
        let bus = RecordingBus::default();
        let manager = Manager::new(
            settings,
            Box::new(bus.clone()),
            Box::new(RecordingSupervisor::default()),
        );
        (manager, bus, dir)
    }

    fn ether_link(index: u32, name: &str) -> InterfaceInfo {
        InterfaceInfo {
            index,
            name: Some(name.to_string()),
            arp_type: ARPHRD_ETHER,
            ..Default::default()
        }
    }

    fn address(index: u32, prefix: &str) -> AddressInfo {
        AddressInfo {
            index,
            prefix: prefix.parse().unwrap(),
            scope: 0,
            flags: 0,
        }
    }

    #[test]
    fn test_link_without_supervisor_state_stays_latent() {
        let (mut manager, bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();

        assert!(manager.tracked(2).is_some());
        assert!(manager.interface("eth0").is_none());
        assert!(bus.events().is_empty());
    }

    #[test]
    fn test_supervisor_state_materializes_object() {
        let (mut manager, bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();

        let interface = manager.interface("eth0").expect("object created");
        assert!(interface.is_managed());
        assert_eq!(manager.name_for_index(2), Some("eth0"));
        assert!(bus
            .events()
            .contains(&BusEvent::Added("/xyz/openbmc_project/network/eth0".to_string())));
    }

    #[test]
    fn test_admin_state_before_link_materializes_on_link() {
        let (mut manager, _bus, _dir) = make_manager();
        manager
            .handle_admin_state(2, AdministrativeState::parse("unmanaged"))
            .unwrap();
        assert!(manager.interface("eth0").is_none());

        manager.add_interface(ether_link(2, "eth0")).unwrap();
        let interface = manager.interface("eth0").expect("object created");
        assert!(!interface.is_managed());
    }

    #[test]
    fn test_initialized_and_linger_forget_supervisor_state() {
        let (mut manager, _bus, _dir) = make_manager();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();
        assert_eq!(manager.supervisor_state_for(2), Some(true));

        manager
            .handle_admin_state(2, AdministrativeState::parse("initialized"))
            .unwrap();
        assert_eq!(manager.supervisor_state_for(2), None);

        manager
            .handle_admin_state(2, AdministrativeState::parse("linger"))
            .unwrap();
        assert_eq!(manager.supervisor_state_for(2), None);
    }

    #[test]
    fn test_non_ethernet_link_is_ignored() {
        let (mut manager, _bus, _dir) = make_manager();
        let mut info = ether_link(9, "can0");
        info.arp_type = 280; // ARPHRD_CAN
        manager.add_interface(info).unwrap();

        assert!(manager.is_index_ignored(9));
        assert!(manager.tracked(9).is_none());
    }

    #[test]
    fn test_ignore_list_interface_drops_followup_events() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(9, "usb0")).unwrap();
        assert!(manager.is_index_ignored(9));
        assert!(manager.tracked(9).is_none());

        // the address event is silently dropped, not an error
        assert!(manager.add_address(address(9, "10.0.0.1/24")).is_ok());
        assert!(manager.tracked(9).is_none());
    }

    #[test]
    fn test_ignored_and_tracked_sets_are_disjoint() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager.add_interface(ether_link(9, "usb0")).unwrap();

        for index in manager.tracked_indices() {
            assert!(!manager.is_index_ignored(index));
        }
    }

    #[test]
    fn test_address_for_unknown_interface_is_an_error() {
        let (mut manager, _bus, _dir) = make_manager();
        let result = manager.add_address(address(5, "10.0.0.1/24"));
        assert!(matches!(result, Err(NetconfdError::UnknownInterface(5))));
    }

    #[test]
    fn test_deprecated_address_is_dropped() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        let mut info = address(2, "10.0.0.1/24");
        info.flags = IFA_F_DEPRECATED;
        manager.add_address(info).unwrap();

        assert!(manager.tracked(2).unwrap().addrs.is_empty());
    }

    #[test]
    fn test_address_replay_is_idempotent() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager.add_address(address(2, "10.0.0.1/24")).unwrap();
        manager.add_address(address(2, "10.0.0.1/24")).unwrap();

        assert_eq!(manager.tracked(2).unwrap().addrs.len(), 1);
    }

    #[test]
    fn test_non_permanent_neighbor_is_dropped() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .add_neighbor(NeighborInfo {
                index: 2,
                addr: Some("10.0.0.7".parse().unwrap()),
                lladdr: None,
                state: 0x02, // reachable
            })
            .unwrap();
        assert!(manager.tracked(2).unwrap().static_neighbors.is_empty());

        manager
            .add_neighbor(NeighborInfo {
                index: 2,
                addr: Some("10.0.0.7".parse().unwrap()),
                lladdr: None,
                state: NUD_PERMANENT,
            })
            .unwrap();
        assert_eq!(manager.tracked(2).unwrap().static_neighbors.len(), 1);
    }

    #[test]
    fn test_default_gateway_replace_and_guarded_remove() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();

        let gw = |addr: &str| DefaultGateway {
            index: 2,
            addr: addr.parse().unwrap(),
        };

        manager.add_default_gateway(gw("10.0.0.254")).unwrap();
        manager.add_default_gateway(gw("10.0.0.1")).unwrap();
        assert_eq!(
            manager.tracked(2).unwrap().defgw4,
            Some("10.0.0.1".parse().unwrap())
        );

        // withdrawing the superseded gateway leaves the newer one in place
        manager.remove_default_gateway(&gw("10.0.0.254")).unwrap();
        assert_eq!(
            manager.tracked(2).unwrap().defgw4,
            Some("10.0.0.1".parse().unwrap())
        );

        manager.remove_default_gateway(&gw("10.0.0.1")).unwrap();
        assert_eq!(manager.tracked(2).unwrap().defgw4, None);
    }

    #[test]
    fn test_gateway_add_remove_roundtrip_leaves_empty() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        let gw = DefaultGateway {
            index: 2,
            addr: "2001:db8::1".parse().unwrap(),
        };
        manager.add_default_gateway(gw).unwrap();
        manager.remove_default_gateway(&gw).unwrap();
        let tracked = manager.tracked(2).unwrap();
        assert_eq!(tracked.defgw4, None);
        assert_eq!(tracked.defgw6, None);
    }

    #[test]
    fn test_name_change_recreates_object_under_new_name() {
        let (mut manager, bus, _dir) = make_manager();
        manager.add_interface(ether_link(7, "eth0")).unwrap();
        manager
            .handle_admin_state(7, AdministrativeState::parse("routable"))
            .unwrap();
        assert!(manager.interface("eth0").is_some());

        manager.add_interface(ether_link(7, "lan0")).unwrap();
        assert!(manager.interface("eth0").is_none());
        let interface = manager.interface("lan0").expect("renamed object");
        assert_eq!(interface.index(), 7);
        assert_eq!(manager.name_for_index(7), Some("lan0"));
        assert!(bus
            .events()
            .contains(&BusEvent::Removed("/xyz/openbmc_project/network/eth0".to_string())));
    }

    #[test]
    fn test_index_change_reuses_object_for_same_name() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();

        // the same name comes back under a new kernel index
        manager.add_interface(ether_link(12, "eth0")).unwrap();
        manager
            .handle_admin_state(12, AdministrativeState::parse("configured"))
            .unwrap();

        let interface = manager.interface("eth0").expect("object survives");
        assert_eq!(interface.index(), 12);
        assert_eq!(manager.name_for_index(12), Some("eth0"));
        assert_eq!(manager.name_for_index(2), None);
    }

    #[test]
    fn test_remove_interface_clears_all_maps() {
        let (mut manager, bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();

        manager.remove_interface(&ether_link(2, "eth0")).unwrap();
        assert!(manager.interface("eth0").is_none());
        assert!(manager.tracked(2).is_none());
        assert_eq!(manager.name_for_index(2), None);
        assert!(!manager.is_index_ignored(2));
        assert!(bus
            .events()
            .contains(&BusEvent::Removed("/xyz/openbmc_project/network/eth0".to_string())));
    }

    #[test]
    fn test_vlan_id_validation() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();

        assert!(matches!(
            manager.vlan("eth0", 0),
            Err(NetconfdError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.vlan("eth0", 4095),
            Err(NetconfdError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.vlan("eth9", 100),
            Err(NetconfdError::NotFound(_))
        ));
    }

    #[test]
    fn test_vlan_creation_returns_child_path() {
        let (mut manager, _bus, dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();

        let path = manager.vlan("eth0", 100).unwrap();
        assert_eq!(path, "/xyz/openbmc_project/network/eth0_100");
        assert!(dir.path().join("eth0.100.netdev").exists());
        assert!(manager.reload_deadline().is_some());
    }

    #[test]
    fn test_reset_clears_configuration_directory() {
        let (mut manager, _bus, dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();
        assert!(dir.path().join("eth0.network").exists());

        manager.reset().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        // in-memory objects survive a reset
        assert!(manager.interface("eth0").is_some());

        // the next write-out re-materializes the configuration
        manager.write_configuration_files().unwrap();
        assert!(dir.path().join("eth0.network").exists());
    }

    #[test]
    fn test_registry_invariants_after_mixed_traffic() {
        let (mut manager, _bus, _dir) = make_manager();
        manager.add_interface(ether_link(2, "eth0")).unwrap();
        manager.add_interface(ether_link(3, "eth1")).unwrap();
        manager.add_interface(ether_link(9, "usb0")).unwrap();
        manager
            .handle_admin_state(2, AdministrativeState::parse("configured"))
            .unwrap();
        manager.add_address(address(2, "10.0.0.1/24")).unwrap();

        // every materialized object is reachable through both maps and its
        // tracked entry carries the same name
        for name in manager.interface_names() {
            let interface = manager.interface(name).unwrap();
            let index = interface.index();
            assert_eq!(manager.name_for_index(index), Some(name));
            assert_eq!(
                manager.tracked(index).unwrap().intf.name.as_deref(),
                Some(name)
            );
            assert!(!manager.is_index_ignored(index));
        }
    }
}
