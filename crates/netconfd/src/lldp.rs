//! LLDP daemon configuration emission
//!
//! Whenever the managed interface set changes, the daemon rewrites the LLDP
//! daemon's configuration and asks the service manager to restart it. Both
//! steps are best-effort: failures are logged and never disturb the reload
//! sequence they ride on.

use crate::error::Result;
use crate::reload::Hook;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};
use zbus::Connection;

#[zbus::proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait Systemd1Manager {
    fn restart_unit(
        &self,
        name: &str,
        mode: &str,
    ) -> zbus::Result<zbus::zvariant::OwnedObjectPath>;
}

/// Restart the LLDP daemon so it picks up a rewritten configuration
pub async fn restart_lldpd(conn: &Connection) -> Result<()> {
    let proxy = Systemd1ManagerProxy::new(conn).await?;
    proxy.restart_unit("lldpd.service", "replace").await?;
    Ok(())
}

/// LLDP configuration emitter
#[derive(Clone)]
pub struct LldpEmitter {
    conf_path: PathBuf,
    conn: Option<Connection>,
}

impl LldpEmitter {
    /// `conn` is optional so the emitter degrades to file-only operation
    /// when no service manager is reachable
    pub fn new(conf_path: PathBuf, conn: Option<Connection>) -> Self {
        Self { conf_path, conn }
    }

    /// Render the LLDP daemon configuration for the managed interface set
    pub fn render(interfaces: &[String]) -> String {
        let mut names: Vec<&String> = interfaces.iter().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            out.push_str(&format!("configure ports {name} lldp status rx-and-tx\n"));
        }
        out
    }

    /// Write the configuration file for the given interface set
    pub fn write(&self, interfaces: &[String]) -> Result<()> {
        if let Some(parent) = self.conf_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.conf_path, Self::render(interfaces))?;
        debug!(path = %self.conf_path.display(), "Wrote LLDP configuration");
        Ok(())
    }

    /// Build a post-reload hook that refreshes the LLDP daemon for the
    /// interface set captured at registration time
    pub fn refresh_hook(&self, interfaces: Vec<String>) -> Hook {
        let emitter = self.clone();
        Box::new(move || {
            emitter.write(&interfaces)?;
            if let Some(conn) = emitter.conn {
                tokio::spawn(async move {
                    if let Err(e) = restart_lldpd(&conn).await {
                        warn!(error = %e, "Failed to restart lldpd");
                    }
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_render_sorted_one_line_per_interface() {
        let rendered =
            LldpEmitter::render(&["eth1".to_string(), "eth0".to_string()]);
        assert_eq!(
            rendered,
            "configure ports eth0 lldp status rx-and-tx\n\
             configure ports eth1 lldp status rx-and-tx\n"
        );
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lldpd.conf");
        let emitter = LldpEmitter::new(path.clone(), None);
        emitter.write(&["eth0".to_string()]).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("configure ports eth0"));
    }

    #[tokio::test]
    async fn test_refresh_hook_writes_without_connection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lldpd.conf");
        let emitter = LldpEmitter::new(path.clone(), None);
        let hook = emitter.refresh_hook(vec!["eth0".to_string()]);
        hook().unwrap();
        assert!(path.exists());
    }
}
