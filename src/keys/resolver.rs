//! Identity resolver with rename detection
//!
//! Persisted instances refer to their descriptor by key string. When a
//! connector implementation is moved or renamed, the stored string no longer
//! matches a registered key. The resolver then tries, in order:
//!
//! 1. package move: a unique implementation key with the same simple name
//! 2. simple rename: a unique closest simple name within edit distance 2
//! 3. explicit rename: an operator entry in the [`RenameTable`]
//!
//! If none converges on exactly one key, resolution fails with
//! `UnresolvableKey` and the candidates are logged.

use std::sync::Arc;

use log::{error, info, warn};

use super::distance::levenshtein;
use super::key::{DescriptorKey, KeyNamespace, simple_name};
use super::registry::KeyRegistry;
use super::renames::RenameTable;
use crate::error::{Result, SourcedError};

/// Maximum edit distance between simple names for rename detection
pub const SIMPLE_RENAME_MAX_DISTANCE: usize = 2;

/// Outcome of one detection strategy
#[derive(Debug, Clone)]
pub enum Detection {
    Found(DescriptorKey),
    NoCandidates,
    Ambiguous(Vec<String>),
}

/// A resolved key and, if rename detection kicked in, the raw key it replaced
#[derive(Debug, Clone)]
pub struct Resolution {
    pub key: DescriptorKey,
    pub renamed_from: Option<String>,
}

impl Resolution {
    pub fn is_renamed(&self) -> bool {
        self.renamed_from.is_some()
    }
}

/// Find an implementation key that only changed its package.
pub fn detect_package_move(keys: &[DescriptorKey], type_name: &str) -> Detection {
    let wanted = simple_name(type_name);
    let candidates: Vec<&DescriptorKey> = keys
        .iter()
        .filter(|k| k.is_implementation() && k.simple_name() == wanted)
        .collect();

    match candidates.as_slice() {
        [] => Detection::NoCandidates,
        [only] => Detection::Found((*only).clone()),
        many => Detection::Ambiguous(many.iter().map(|k| k.key().to_string()).collect()),
    }
}

/// Find an implementation key whose simple name is a near miss.
pub fn detect_simple_rename(keys: &[DescriptorKey], type_name: &str) -> Detection {
    let wanted = simple_name(type_name);
    let mut candidates: Vec<(usize, &DescriptorKey)> = keys
        .iter()
        .filter(|k| k.is_implementation())
        .map(|k| (levenshtein(wanted, k.simple_name()), k))
        .filter(|(distance, _)| *distance <= SIMPLE_RENAME_MAX_DISTANCE)
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let Some(&(best, best_key)) = candidates.first() else {
        return Detection::NoCandidates;
    };
    let closest = candidates.iter().filter(|(d, _)| *d == best).count();
    if closest == 1 {
        Detection::Found(best_key.clone())
    } else {
        Detection::Ambiguous(candidates.iter().map(|(_, k)| k.key().to_string()).collect())
    }
}

/// Follow an operator-recorded rename, if its target is registered.
pub fn detect_explicit_rename(
    registry: &KeyRegistry,
    renames: &dyn RenameTable,
    type_name: &str,
) -> Detection {
    let Some(new_name) = renames.lookup(type_name) else {
        return Detection::NoCandidates;
    };

    match registry.get(&KeyNamespace::Implementation.qualify(&new_name)) {
        Some(key) if key.is_implementation() => {
            info!("Class {} replaced by {}", type_name, new_name);
            Detection::Found(key)
        }
        _ => {
            error!(
                "Unable to load class {} in order to replace class {}",
                new_name, type_name
            );
            Detection::NoCandidates
        }
    }
}

/// Resolves persisted key strings to interned descriptor keys
pub struct IdentityResolver {
    registry: Arc<KeyRegistry>,
    renames: Arc<dyn RenameTable>,
}

impl IdentityResolver {
    pub fn new(registry: Arc<KeyRegistry>, renames: Arc<dyn RenameTable>) -> Self {
        Self { registry, renames }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// Intern a definitely-new canonical key.
    pub fn create_key(&self, raw: &str, display_name: &str) -> Result<DescriptorKey> {
        self.registry.create_key(raw, display_name)
    }

    /// Resolve a raw key string to its canonical key.
    pub fn resolve(&self, raw: &str) -> Result<DescriptorKey> {
        self.resolve_detailed(raw).map(|r| r.key)
    }

    /// Resolve from the separately persisted implementation type and view.
    ///
    /// The implementation type wins when present; otherwise the view-only key
    /// is used.
    pub fn resolve_parts(&self, implementation: Option<&str>, view: &str) -> Result<Resolution> {
        let raw = match implementation {
            Some(type_name) => KeyNamespace::Implementation.qualify(type_name),
            None => KeyNamespace::View.qualify(view),
        };
        self.resolve_detailed(&raw)
    }

    /// Resolve a raw key string and report whether rename detection was used.
    pub fn resolve_detailed(&self, raw: &str) -> Result<Resolution> {
        if let Some(key) = self.registry.get(raw) {
            return Ok(Resolution {
                key,
                renamed_from: None,
            });
        }

        let (namespace, sub_key) = KeyNamespace::split(raw)?;
        if namespace == KeyNamespace::View {
            warn!("Unknown view id: {}", sub_key);
            return Err(SourcedError::UnresolvableKey {
                key: raw.to_string(),
                reason: "unknown view id".to_string(),
            });
        }

        let keys = self.registry.keys_in(KeyNamespace::Implementation);
        let mut diagnostics = Vec::new();

        match detect_package_move(&keys, sub_key) {
            Detection::Found(key) => return Ok(self.renamed(raw, key, "moved")),
            Detection::NoCandidates => warn!("No moved class found for name: {}", sub_key),
            Detection::Ambiguous(candidates) => {
                warn!(
                    "Multiple moved candidates found for class [{}]: {}",
                    sub_key,
                    candidates.join(", ")
                );
                diagnostics.push(format!("package move candidates [{}]", candidates.join(", ")));
            }
        }

        match detect_simple_rename(&keys, sub_key) {
            Detection::Found(key) => return Ok(self.renamed(raw, key, "renamed")),
            Detection::NoCandidates => warn!("No renamed class found for name: {}", sub_key),
            Detection::Ambiguous(candidates) => {
                warn!(
                    "Multiple renamed candidates found for class [{}]: {}",
                    sub_key,
                    candidates.join(", ")
                );
                diagnostics.push(format!("rename candidates [{}]", candidates.join(", ")));
            }
        }

        if let Detection::Found(key) = detect_explicit_rename(&self.registry, self.renames.as_ref(), sub_key) {
            return Ok(self.renamed(raw, key, "explicitly renamed"));
        }

        let reason = if diagnostics.is_empty() {
            "no matching class found".to_string()
        } else {
            diagnostics.join("; ")
        };
        error!("Unable to find matching class for {}: {}", raw, reason);
        Err(SourcedError::UnresolvableKey {
            key: raw.to_string(),
            reason,
        })
    }

    fn renamed(&self, raw: &str, key: DescriptorKey, how: &str) -> Resolution {
        info!("Resolved {} as {} to {}", raw, how, key);
        Resolution {
            key,
            renamed_from: Some(raw.to_string()),
        }
    }
}
