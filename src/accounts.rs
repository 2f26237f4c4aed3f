use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use tracing::{debug, warn};

/// An alias value may be written as a JSON string or number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AccountRef {
    Id(String),
    Number(u64),
}

impl AccountRef {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) => id,
            // Numbers lose leading zeros in JSON
            Self::Number(n) => format!("{n:012}"),
        }
    }
}

/// Read-only alias → account id map, e.g. `{ "prod": "123456789012" }`
#[derive(Debug, Clone, Default)]
pub struct AccountAliases {
    aliases: HashMap<String, String>,
}

impl AccountAliases {
    /// Load the alias file. A missing or malformed file yields an empty map
    /// so every name falls back to being used as a literal id.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No account aliases at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(aliases) => {
                debug!(
                    "Loaded {} account aliases from {}",
                    aliases.aliases.len(),
                    path.display()
                );
                aliases
            }
            Err(e) => {
                warn!("Ignoring malformed account file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> serde_json::Result<Self> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)?;

        // Entries that are neither strings nor numbers are skipped
        let aliases = raw
            .into_iter()
            .filter_map(|(alias, value)| {
                serde_json::from_value::<AccountRef>(value)
                    .ok()
                    .map(|account| (alias, account.into_id()))
            })
            .collect();

        Ok(Self { aliases })
    }

    /// The mapped id for `name`, or `name` itself when there is no alias
    pub fn resolve(&self, name: &str) -> String {
        match self.aliases.get(name) {
            Some(id) => {
                debug!("Account alias {} -> {}", name, id);
                id.clone()
            }
            None => name.to_string(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
