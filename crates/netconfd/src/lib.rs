//! BMC Network Configuration Daemon
//!
//! This crate implements the core of the BMC network configuration daemon:
//! it maintains a queryable model of every Ethernet-class interface on the
//! host, reacts to kernel topology changes in real time, reconciles the
//! model with the link supervisor's per-link administrative state, and emits
//! the persisted configuration files that drive the supervisor.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! This crate implements the following security controls:
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AC-3 | Access Enforcement | Kernel netlink requires CAP_NET_ADMIN |
//! | AU-3 | Content of Audit Records | Structured logging with link details |
//! | AU-12 | Audit Record Generation | All registry mutations logged |
//! | CM-6 | Configuration Settings | Settings file with safe defaults |
//! | CM-8 | System Component Inventory | Interface/address/neighbor registry |
//! | SC-7 | Boundary Protection | Network boundary awareness |
//! | SI-4 | System Monitoring | Real-time kernel event processing |
//! | SI-10 | Input Validation | Netlink and bus message validation |
//! | SI-11 | Error Handling | Structured error types |
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────┐     ┌─────────────────┐
//! │  Linux Kernel   │     │       netconfd       │     │ Link Supervisor │
//! │                 │     │                      │     │ (networkd)      │
//! │  RTM_NEWLINK    │────▶│  KernelEventSource   │     │                 │
//! │  RTM_NEWADDR    │     │          │           │     │ Administrative- │
//! │  RTM_NEWROUTE   │     │          ▼           │◀────│ State signals   │
//! │  RTM_NEWNEIGH   │     │       Manager        │     │                 │
//! │                 │     │    (registry, C4)    │────▶│ Reload() RPC    │
//! └─────────────────┘     │          │           │     └─────────────────┘
//!                         │          ▼           │              ▲
//!                         │  EthernetInterface   │   ┌──────────┴──────┐
//!                         │  *.network emission  │──▶│ ReloadCoordinator│
//!                         └──────────────────────┘   │ (3s debounce)   │
//!                                                    └─────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod decode;
pub mod error;
pub mod interface;
pub mod lldp;
pub mod netlink;
pub mod registry;
pub mod reload;
pub mod supervisor;
pub mod types;

pub use bus::{BusEvent, LoggingBus, ObjectBus, RecordingBus};
pub use config::{NetworkFileConfig, Settings};
pub use error::{NetconfdError, Result};
pub use interface::EthernetInterface;
pub use lldp::LldpEmitter;
pub use netlink::KernelEventSource;
pub use registry::Manager;
pub use reload::{QUIET_PERIOD, ReloadCoordinator};
pub use supervisor::{LinkSupervisor, NetworkdSupervisor, RecordingSupervisor};
pub use types::{
    AddressInfo, AdministrativeState, AllIntfInfo, DefaultGateway, InterfaceInfo, IpPrefix,
    MacAddress, NeighborInfo, NetworkEvent,
};
