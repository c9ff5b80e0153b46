use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Represents the final configuration after merging the config file and CLI args.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub port: u16,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub allow_missing_env: bool,
    pub log_level: String,
    pub context: Option<String>,
    pub fallback: Option<String>,
    pub enable_health: bool,
    pub https_promote: bool,
    pub check_only: bool,
    pub render: Option<String>,
}

impl RuntimeConfig {
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            port: self.port,
            context: self.context.clone(),
            enable_health: self.enable_health,
            https_promote: self.https_promote,
        }
    }
}

/// The transport-level part of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub port: u16,
    /// Path prefix without slashes, e.g. `doc` for `/doc/`.
    pub context: Option<String>,
    pub enable_health: bool,
    pub https_promote: bool,
}

/// Variable names referenced without a default and unset at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingVars(BTreeSet<String>);

impl MissingVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str) {
        if !self.0.contains(name) {
            self.0.insert(name.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for MissingVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{}", names.join(", "))
    }
}
