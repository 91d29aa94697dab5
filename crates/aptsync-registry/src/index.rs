use indexmap::IndexMap;
use tracing::warn;

use crate::{
    error::{RegistryError, Result},
    package::{Package, PackageKey, PackageType},
};

/// Packages of one distribution, keyed by type and identity key.
///
/// Insertion order is kept so iteration follows the index documents.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    entries: IndexMap<(PackageType, PackageKey), Package>,
    /// Index document each entry was first read from.
    origins: IndexMap<(PackageType, PackageKey), String>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package read from the index document `resource`.
    ///
    /// A repeat of an already indexed package with the same file list is
    /// merged silently and `Ok(false)` is returned; `Architecture: all`
    /// packages appear once in every per-architecture index. A repeat with
    /// different files from another document (the same version built for
    /// another architecture) is dropped in favour of the first entry.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::DuplicatePackage`] if the key appears twice in one
    ///   document with different files.
    pub fn insert(&mut self, package: Package, resource: &str) -> Result<bool> {
        let slot = (package.package_type, package.identity_key());

        if let Some(existing) = self.entries.get(&slot) {
            if existing.files.iter().map(|f| &f.path).eq(package.files.iter().map(|f| &f.path)) {
                return Ok(false);
            }
            let origin = self.origins.get(&slot).map(String::as_str);
            if origin == Some(resource) {
                return Err(RegistryError::DuplicatePackage {
                    kind: slot.0.type_id(),
                    key: slot.1.to_string(),
                    resource: resource.to_string(),
                });
            }
            warn!(
                key = %slot.1,
                resource,
                kept = origin.unwrap_or_default(),
                "package already indexed from another document, skipping"
            );
            return Ok(false);
        }

        self.origins.insert(slot.clone(), resource.to_string());
        self.entries.insert(slot, package);
        Ok(true)
    }

    pub fn get(&self, package_type: PackageType, key: &PackageKey) -> Option<&Package> {
        self.entries.get(&(package_type, key.clone()))
    }

    /// Identity keys of every package of `package_type`.
    pub fn keys(&self, package_type: PackageType) -> impl Iterator<Item = &PackageKey> {
        self.entries
            .keys()
            .filter(move |(t, _)| *t == package_type)
            .map(|(_, key)| key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.entries.values()
    }

    pub fn count(&self, package_type: PackageType) -> usize {
        self.keys(package_type).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.origins.clear();
    }
}
