//! Daemon settings and persisted interface configuration
//!
//! Settings load from a TOML file (default `/etc/netconfd.conf`); every field
//! has a default so a missing file yields a fully usable configuration.
//! The per-interface files the link supervisor consumes are read back only at
//! interface creation, through a deliberately small section/key reader.

use crate::error::{NetconfdError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default settings file location
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/netconfd.conf";

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory the supervisor reads persisted interface config from
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Interface name patterns never managed by the daemon.
    /// A trailing `*` makes the pattern a prefix match.
    #[serde(default = "default_ignored_interfaces")]
    pub ignored_interfaces: Vec<String>,

    /// Well-known bus name requested at startup
    #[serde(default = "default_bus_name")]
    pub bus_name: String,

    /// Root object path for exported interface objects
    #[serde(default = "default_object_root")]
    pub object_root: String,

    /// Bus namespace of the link supervisor's per-link objects
    #[serde(default = "default_supervisor_link_namespace")]
    pub supervisor_link_namespace: String,

    /// Where the LLDP daemon configuration is emitted
    #[serde(default = "default_lldp_conf_path")]
    pub lldp_conf_path: PathBuf,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/network")
}

fn default_ignored_interfaces() -> Vec<String> {
    vec!["lo".to_string(), "sit0".to_string()]
}

fn default_bus_name() -> String {
    "xyz.openbmc_project.Network".to_string()
}

fn default_object_root() -> String {
    "/xyz/openbmc_project/network".to_string()
}

fn default_supervisor_link_namespace() -> String {
    "/org/freedesktop/network1/link".to_string()
}

fn default_lldp_conf_path() -> PathBuf {
    PathBuf::from("/etc/lldpd.conf")
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str("").expect("empty settings must deserialize from defaults")
    }
}

impl Settings {
    /// Load settings from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| NetconfdError::Config(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether an interface name matches the ignore list.
    /// Membership is decided at first sight and never revisited.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_interfaces.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => name == pattern,
            }
        })
    }
}

/// Parsed view of a persisted `<name>.network` file.
///
/// The supervisor owns this format; the daemon only reads back the handful of
/// keys it loads into a freshly created interface object.
#[derive(Debug, Clone, Default)]
pub struct NetworkFileConfig {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl NetworkFileConfig {
    /// Load `<dir>/<name>.network`; a missing file yields an empty config
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{name}.network"));
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse section headers and key=value lines; comments and blanks skipped
    pub fn parse(contents: &str) -> Self {
        let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push((header.to_string(), Vec::new()));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if let Some((_, entries)) = sections.last_mut() {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { sections }
    }

    /// All values for `key` across every instance of `section`
    pub fn values(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(section))
            .flat_map(|(_, entries)| entries.iter())
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for `key` in `section`
    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.values(section, key).into_iter().next()
    }

    /// Whether DHCP is enabled in the `[Network]` section
    pub fn dhcp_enabled(&self) -> bool {
        matches!(
            self.value("Network", "DHCP"),
            Some("yes") | Some("true") | Some("ipv4") | Some("ipv6")
        )
    }

    /// DNS servers listed in the `[Network]` section
    pub fn dns_servers(&self) -> Vec<String> {
        self.list_values("Network", "DNS")
    }

    /// NTP servers listed in the `[Network]` section
    pub fn ntp_servers(&self) -> Vec<String> {
        self.list_values("Network", "NTP")
    }

    fn list_values(&self, section: &str, key: &str) -> Vec<String> {
        self.values(section, key)
            .iter()
            .flat_map(|v| v.split_ascii_whitespace())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.config_dir, PathBuf::from("/etc/systemd/network"));
        assert_eq!(settings.bus_name, "xyz.openbmc_project.Network");
        assert_eq!(settings.object_root, "/xyz/openbmc_project/network");
        assert!(settings.is_ignored("lo"));
        assert!(!settings.is_ignored("eth0"));
    }

    #[test]
    fn test_settings_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.conf")).unwrap();
        assert_eq!(settings.config_dir, PathBuf::from("/etc/systemd/network"));
    }

    #[test]
    fn test_settings_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("netconfd.conf");
        fs::write(&path, "ignored_interfaces = [\"usb*\", \"lo\"]\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert!(settings.is_ignored("usb0"));
        assert!(settings.is_ignored("usb1"));
        assert!(settings.is_ignored("lo"));
        assert!(!settings.is_ignored("eth0"));
        // untouched fields keep their defaults
        assert_eq!(settings.bus_name, "xyz.openbmc_project.Network");
    }

    #[test]
    fn test_network_file_parsing() {
        let config = NetworkFileConfig::parse(
            "# generated\n\
             [Match]\n\
             Name=eth0\n\
             \n\
             [Network]\n\
             DHCP=true\n\
             DNS=192.168.1.1 192.168.1.2\n\
             DNS=2001:db8::53\n\
             NTP=pool.ntp.org\n",
        );
        assert_eq!(config.value("Match", "Name"), Some("eth0"));
        assert!(config.dhcp_enabled());
        assert_eq!(
            config.dns_servers(),
            vec!["192.168.1.1", "192.168.1.2", "2001:db8::53"]
        );
        assert_eq!(config.ntp_servers(), vec!["pool.ntp.org"]);
    }

    #[test]
    fn test_network_file_missing_is_empty() {
        let dir = tempdir().unwrap();
        let config = NetworkFileConfig::load(dir.path(), "eth9").unwrap();
        assert!(!config.dhcp_enabled());
        assert!(config.dns_servers().is_empty());
    }
}
