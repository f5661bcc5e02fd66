//! Error types for netconfd
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information
//! - AU-3: Content of Audit Records - Errors include sufficient detail for audit

use thiserror::Error;

/// Errors that can occur in netconfd
///
/// # NIST Controls
/// - SI-11(a): Generate error messages providing information necessary for corrective actions
/// - SI-11(b): Reveal only information necessary for error handling (no sensitive data exposure)
#[derive(Debug, Error)]
pub enum NetconfdError {
    /// Netlink socket error
    /// NIST: SC-7 (Boundary Protection) - Kernel interface errors
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// Address or neighbor referenced an interface the registry does not track
    /// NIST: CM-8 (System Component Inventory) - Interface tracking
    #[error("Interface index {0} is not tracked")]
    UnknownInterface(u32),

    /// Invalid user request (e.g. VLAN id out of range)
    /// NIST: SI-10 (Information Input Validation) - Request validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced object does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// IPC bus error (link supervisor or service manager unreachable)
    /// NIST: SC-8 (Transmission Confidentiality) - Bus communication errors
    #[error("Bus error: {0}")]
    Bus(#[from] zbus::Error),

    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    /// NIST: SI-11 (Error Handling) - System-level errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for netconfd operations
pub type Result<T> = std::result::Result<T, NetconfdError>;
