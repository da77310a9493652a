//! The static catalogue of capabilities the broker may launch.

use std::collections::BTreeMap;

use akf_config::{AkfConfig, CapabilityEntry};

/// Name of the built-in artifact collection capability.
pub const ARTIFACT_SERVICE: &str = "ArtifactService";

/// How a capability worker is brought up.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityKind {
    /// Served by this binary (`akf capability <Name>`) or, in tests, in-process.
    Builtin,
    /// Served by an external command from config.
    Command(CapabilityEntry),
}

/// Identifies a capability type by name. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityDescriptor {
    name: String,
    description: String,
    kind: CapabilityKind,
}

impl CapabilityDescriptor {
    /// A capability served by this binary.
    pub fn builtin(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: CapabilityKind::Builtin,
        }
    }

    /// A capability served by an external command.
    pub fn command(name: impl Into<String>, entry: CapabilityEntry) -> Self {
        let name = name.into();
        let description = entry
            .description
            .clone()
            .unwrap_or_else(|| format!("external command `{}`", entry.command));
        Self {
            name,
            description,
            kind: CapabilityKind::Command(entry),
        }
    }

    /// Capability name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Launch kind.
    pub fn kind(&self) -> &CapabilityKind {
        &self.kind
    }
}

/// Name-keyed set of known capabilities, fixed once the broker is built.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    descriptors: BTreeMap<String, CapabilityDescriptor>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The capabilities compiled into this binary.
    pub fn builtin() -> Self {
        Self::new().with(CapabilityDescriptor::builtin(
            ARTIFACT_SERVICE,
            "Collects Windows prefetch metadata from the guest",
        ))
    }

    /// Built-ins plus every `[capabilities.<Name>]` entry in `config`.
    ///
    /// A configured entry replaces a built-in of the same name.
    pub fn from_config(config: &AkfConfig) -> Self {
        let mut registry = Self::builtin();
        for (name, entry) in &config.capabilities {
            registry = registry.with(CapabilityDescriptor::command(name, entry.clone()));
        }
        registry
    }

    /// Add a descriptor.
    pub fn with(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptors
            .insert(descriptor.name().to_string(), descriptor);
        self
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.descriptors.get(name)
    }

    /// Whether `name` is known.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Sorted capability names.
    pub fn names(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }

    /// All descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.descriptors.values()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_artifact_service() {
        let registry = CapabilityRegistry::builtin();
        assert!(registry.contains(ARTIFACT_SERVICE));
        assert_eq!(
            registry.get(ARTIFACT_SERVICE).map(|d| d.kind()),
            Some(&CapabilityKind::Builtin)
        );
    }

    #[test]
    fn test_config_entries_are_added_sorted() {
        let config = AkfConfig::from_toml(
            r#"
[capabilities.Chromium]
command = "akf-chromium-driver"
description = "Drives a Chromium browser"
"#,
        )
        .unwrap();

        let registry = CapabilityRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["ArtifactService", "Chromium"]);

        let chromium = registry.get("Chromium").unwrap();
        assert_eq!(chromium.description(), "Drives a Chromium browser");
        assert!(matches!(chromium.kind(), CapabilityKind::Command(e) if e.command == "akf-chromium-driver"));
    }

    #[test]
    fn test_default_description_names_command() {
        let d = CapabilityDescriptor::command("X", CapabilityEntry::new("x-driver"));
        assert_eq!(d.description(), "external command `x-driver`");
    }
}
