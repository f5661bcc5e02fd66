//! Link supervisor integration
//!
//! The link supervisor owns kernel link configuration and is reached
//! exclusively over the system bus. This module carries the proxies for its
//! manager and per-link objects, the administrative-state watcher feeding the
//! registry, and the `LinkSupervisor` seam the reload coordinator fires
//! through.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-4: System Monitoring - Track supervisor link state
//! - SC-8: Transmission Confidentiality - State exchanged over the system bus

use crate::error::Result;
use crate::types::{AdministrativeState, NetworkEvent};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::zvariant::OwnedValue;
use zbus::{Connection, MatchRule, MessageStream};

/// Bus interface of the supervisor's per-link objects
pub const SUPERVISOR_LINK_INTERFACE: &str = "org.freedesktop.network1.Link";

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

#[zbus::proxy(
    interface = "org.freedesktop.network1.Manager",
    default_service = "org.freedesktop.network1",
    default_path = "/org/freedesktop/network1"
)]
pub trait Network1Manager {
    fn list_links(&self) -> zbus::Result<Vec<(i32, String, zbus::zvariant::OwnedObjectPath)>>;

    fn reload(&self) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.network1.Link",
    default_service = "org.freedesktop.network1"
)]
pub trait Network1Link {
    #[zbus(property)]
    fn administrative_state(&self) -> zbus::Result<String>;
}

/// Reload RPC seam between the reload coordinator and the supervisor
#[async_trait]
pub trait LinkSupervisor: Send + Sync {
    /// Ask the supervisor to re-read its configuration files and apply them
    async fn reload(&self) -> Result<()>;
}

/// The real supervisor, reached through its manager object
pub struct NetworkdSupervisor {
    proxy: Network1ManagerProxy<'static>,
}

impl NetworkdSupervisor {
    pub async fn new(conn: &Connection) -> Result<Self> {
        Ok(Self {
            proxy: Network1ManagerProxy::new(conn).await?,
        })
    }
}

#[async_trait]
impl LinkSupervisor for NetworkdSupervisor {
    async fn reload(&self) -> Result<()> {
        self.proxy.reload().await?;
        Ok(())
    }
}

/// Test double counting reload requests; can be armed to fail.
/// Clones share the counters.
#[derive(Clone, Default)]
pub struct RecordingSupervisor {
    reloads: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl RecordingSupervisor {
    pub fn reload_count(&self) -> usize {
        self.reloads.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkSupervisor for RecordingSupervisor {
    async fn reload(&self) -> Result<()> {
        self.reloads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::NetconfdError::Config(
                "injected reload failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Extract the interface index from a supervisor link object path.
///
/// The final segment encodes the decimal index behind a `_3` escape: the bus
/// escapes a leading digit as an underscore plus its hex byte, and the hex
/// byte of an ASCII digit is `3` followed by that digit. `.../link/_32` is
/// index 2, `.../link/_310` is index 10.
pub fn link_index_from_path(path: &str) -> Option<u32> {
    let segment = path.rsplit('/').next()?;
    let digits = segment.strip_prefix("_3")?;
    digits.parse().ok()
}

/// Watch the supervisor for administrative-state changes.
///
/// Subscribes to property-change signals under the link namespace, then
/// enumerates existing links so startup state flows through the same sink.
/// A supervisor that is down at startup is not an error; the later signals
/// fill the gap. Malformed notifications are logged and skipped; nothing
/// escapes this task.
pub async fn watch(
    conn: Connection,
    link_namespace: String,
    tx: mpsc::Sender<NetworkEvent>,
) -> Result<()> {
    let rule = MatchRule::builder()
        .msg_type(zbus::message::Type::Signal)
        .interface(PROPERTIES_INTERFACE)?
        .member("PropertiesChanged")?
        .path_namespace(link_namespace.as_str())?
        .build();
    let mut stream = MessageStream::for_match_rule(rule, &conn, Some(64)).await?;
    info!("Subscribed to supervisor administrative state changes");

    enumerate_links(&conn, &tx).await;

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Bus stream error");
                continue;
            }
        };
        handle_properties_changed(&message, &tx).await;
    }

    Ok(())
}

/// Query every existing link's administrative state through the same sink
/// the signal path uses
async fn enumerate_links(conn: &Connection, tx: &mpsc::Sender<NetworkEvent>) {
    let proxy = match Network1ManagerProxy::new(conn).await {
        Ok(proxy) => proxy,
        Err(e) => {
            debug!(error = %e, "Link supervisor proxy unavailable");
            return;
        }
    };
    let links = match proxy.list_links().await {
        Ok(links) => links,
        Err(e) => {
            debug!(error = %e, "Link supervisor unavailable at startup");
            return;
        }
    };

    for (index, name, path) in links {
        let Ok(index) = u32::try_from(index) else {
            continue;
        };
        let builder = match Network1LinkProxy::builder(conn).path(path) {
            Ok(builder) => builder,
            Err(e) => {
                debug!(name = %name, error = %e, "Invalid link object path");
                continue;
            }
        };
        let link = match builder.build().await {
            Ok(link) => link,
            Err(e) => {
                debug!(name = %name, error = %e, "Failed to build link proxy");
                continue;
            }
        };
        match link.administrative_state().await {
            Ok(state) => {
                debug!(index, name = %name, state = %state, "Enumerated supervisor link");
                let _ = tx
                    .send(NetworkEvent::AdminState {
                        index,
                        state: AdministrativeState::parse(&state),
                    })
                    .await;
            }
            Err(e) => {
                debug!(name = %name, error = %e, "Failed to query administrative state");
            }
        }
    }
}

async fn handle_properties_changed(message: &zbus::Message, tx: &mpsc::Sender<NetworkEvent>) {
    let header = message.header();
    let Some(path) = header.path() else {
        return;
    };
    let Some(index) = link_index_from_path(path.as_str()) else {
        warn!(path = %path, "Unparseable link object path in property change");
        return;
    };

    let body = message.body();
    let Ok((interface, changed, _invalidated)) =
        body.deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()
    else {
        warn!(index, "Malformed PropertiesChanged payload");
        return;
    };
    if interface != SUPERVISOR_LINK_INTERFACE {
        return;
    }
    let Some(value) = changed.get("AdministrativeState") else {
        return;
    };
    let Ok(state) = String::try_from(value.clone()) else {
        warn!(index, "AdministrativeState is not a string");
        return;
    };

    debug!(index, state = %state, "Supervisor administrative state change");
    let _ = tx
        .send(NetworkEvent::AdminState {
            index,
            state: AdministrativeState::parse(&state),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_index_from_path() {
        assert_eq!(
            link_index_from_path("/org/freedesktop/network1/link/_32"),
            Some(2)
        );
        assert_eq!(
            link_index_from_path("/org/freedesktop/network1/link/_310"),
            Some(10)
        );
        assert_eq!(
            link_index_from_path("/org/freedesktop/network1/link/_3128"),
            Some(128)
        );
    }

    #[test]
    fn test_link_index_from_malformed_path() {
        assert_eq!(link_index_from_path("/org/freedesktop/network1/link/x2"), None);
        assert_eq!(link_index_from_path("/org/freedesktop/network1/link/_3"), None);
        assert_eq!(
            link_index_from_path("/org/freedesktop/network1/link/_3abc"),
            None
        );
        assert_eq!(link_index_from_path(""), None);
    }

    #[tokio::test]
    async fn test_recording_supervisor_failure_injection() {
        let supervisor = RecordingSupervisor::default();
        assert!(supervisor.reload().await.is_ok());
        supervisor.fail_next(true);
        assert!(supervisor.reload().await.is_err());
        assert_eq!(supervisor.reload_count(), 2);
    }
}
