//! The brain descriptor: identity, export permissions, access rules (parsed
//! but not enforced by the core), and update-policy bag.

use std::path::Path;

use crate::error::ConfigError;

use super::ini::{self, IniDocument, IniSection};

/// Export permission for a path pattern in a brain's `[EXPORT]` table.
/// An empty right-hand side in the descriptor means [`ExportPermission::ReadOnly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPermission {
    ReadOnly,
    ReadWrite,
}

impl ExportPermission {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "" => Ok(Self::ReadOnly),
            "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            other => Err(format!(
                "expected `readonly`, `readwrite`, or empty, got '{other}'"
            )),
        }
    }

    fn render(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

/// `[UPDATE_POLICY]` is specified as a bag: some keys carry recognized
/// boolean tokens, `PROTECTED_PATHS` is a reserved comma-separated list,
/// and everything else round-trips as opaque strings. Modeling it as a
/// generic ordered bag (rather than a fixed struct, unlike `BrainEntry` or
/// `Mapping`) matches the spec's own "bag" wording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub entries: Vec<(String, String)>,
}

impl UpdatePolicy {
    /// Parse a recognized boolean token (`true`/`yes`/`1` or `false`/`no`/`0`).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let raw = self.entries.iter().find(|(k, _)| k == key)?.1.as_str();
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    /// Parsed `PROTECTED_PATHS`, or empty if absent.
    pub fn protected_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .find(|(k, _)| k == "PROTECTED_PATHS")
            .map(|(_, v)| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The descriptor a brain repository publishes at its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrainDescriptor {
    pub id: String,
    pub description: Option<String>,
    pub export: Vec<(String, ExportPermission)>,
    pub access: Vec<(String, Vec<String>)>,
    pub update_policy: UpdatePolicy,
}

impl BrainDescriptor {
    /// Load and parse a brain descriptor from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|err| match err {
            ConfigError::ParseFailed { reason, .. } => ConfigError::ParseFailed {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse brain descriptor text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let doc = ini::parse(text).map_err(|e| ConfigError::ParseFailed {
            path: std::path::PathBuf::new(),
            reason: e.to_string(),
        })?;

        let brain_section = doc.section("BRAIN").ok_or_else(|| ConfigError::MissingSection {
            section: "BRAIN".to_string(),
        })?;
        let id = brain_section
            .get("ID")
            .ok_or_else(|| ConfigError::MissingKey {
                section: "BRAIN".to_string(),
                key: "ID".to_string(),
            })?;
        if id.is_empty() {
            return Err(ConfigError::EmptyValue {
                section: "BRAIN".to_string(),
                key: "ID".to_string(),
            });
        }
        let id = id.to_string();
        let description = brain_section.get("DESCRIPTION").map(str::to_string);

        let mut export = Vec::new();
        if let Some(section) = doc.section("EXPORT") {
            for (path, raw) in &section.entries {
                let permission = ExportPermission::parse(raw).map_err(|reason| {
                    ConfigError::InvalidValue {
                        section: "EXPORT".to_string(),
                        key: path.clone(),
                        value: raw.clone(),
                        reason,
                    }
                })?;
                export.push((path.clone(), permission));
            }
        }

        let mut access = Vec::new();
        if let Some(section) = doc.section("ACCESS") {
            for (entity, raw) in &section.entries {
                let patterns = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                access.push((entity.clone(), patterns));
            }
        }

        let update_policy = doc
            .section("UPDATE_POLICY")
            .map(|section: &IniSection| UpdatePolicy {
                entries: section.entries.clone(),
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            description,
            export,
            access,
            update_policy,
        })
    }

    /// Serialize back to descriptor text.
    pub fn to_text(&self) -> String {
        ini::serialize(&self.to_ini())
    }

    fn to_ini(&self) -> IniDocument {
        let mut sections = Vec::new();

        let mut brain_entries = vec![("ID".to_string(), self.id.clone())];
        if let Some(description) = &self.description {
            brain_entries.push(("DESCRIPTION".to_string(), description.clone()));
        }
        sections.push(IniSection {
            name: "BRAIN".to_string(),
            entries: brain_entries,
        });

        if !self.export.is_empty() {
            sections.push(IniSection {
                name: "EXPORT".to_string(),
                entries: self
                    .export
                    .iter()
                    .map(|(path, perm)| (path.clone(), perm.render().to_string()))
                    .collect(),
            });
        }

        if !self.access.is_empty() {
            sections.push(IniSection {
                name: "ACCESS".to_string(),
                entries: self
                    .access
                    .iter()
                    .map(|(entity, patterns)| (entity.clone(), patterns.join(",")))
                    .collect(),
            });
        }

        if !self.update_policy.entries.is_empty() {
            sections.push(IniSection {
                name: "UPDATE_POLICY".to_string(),
                entries: self.update_policy.entries.clone(),
            });
        }

        IniDocument { sections }
    }

    /// Save the descriptor to `path`.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_text())
    }
}
