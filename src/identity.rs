//! Node identity.

use std::fmt;

use crate::config::NodeConfig;

/// Stable identity of the local node.
///
/// Supplied from configuration and never changed while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    id: String,
    display_name: String,
}

impl NodeIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Generate a fresh identity of the form `<hostname>-<8 hex chars>`.
    pub fn generate() -> Self {
        let host = hostname();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}", host, &suffix[..8]),
            display_name: host,
        }
    }

    /// Identity from a loaded config. An empty display name falls back to the id.
    pub fn from_config(config: &NodeConfig) -> Self {
        let display_name = if config.node.display_name.is_empty() {
            config.node.id.clone()
        } else {
            config.node.display_name.clone()
        };
        Self::new(config.node.id.clone(), display_name)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

fn hostname() -> String {
    let from_env = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok();
    let from_file = || {
        std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
    };

    from_env
        .or_else(from_file)
        .map(|h| h.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect::<String>())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localp2p".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_clean() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        assert_ne!(a.id(), b.id());
        assert!(!a.id().chars().any(char::is_whitespace));
        assert!(a.id().starts_with(a.display_name()));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut config = NodeConfig::default();
        config.node.id = "alpha".to_string();
        let identity = NodeIdentity::from_config(&config);
        assert_eq!(identity.display_name(), "alpha");
    }
}
