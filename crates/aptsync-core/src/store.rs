//! Content store for imported packages.
//!
//! A store holds *units*: one unit per stored file, plus a file-less parent unit
//! for each source package that groups its files through [`UnitStore::link_unit`].

use std::{
    collections::HashSet,
    fs,
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use aptsync_registry::{PackageKey, PackageType, UnitKey};
use aptsync_utils::{
    fs::{ensure_dir_exists, safe_remove},
    hash::calculate_checksum,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ErrorContext, StoreError};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored (or about to be stored) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Assigned by [`UnitStore::save_unit`].
    pub id: Option<u64>,
    pub package_type: PackageType,
    pub unit_key: UnitKey,
    pub metadata: IndexMap<String, String>,
    /// Repository-relative path; empty for parent units.
    pub relative_path: String,
    /// Absolute path of the content file; `None` for parent units.
    pub storage_path: Option<PathBuf>,
    /// blake3 digest of the content file.
    pub checksum: Option<String>,
    /// Parent unit id for files of a source package.
    pub parent: Option<u64>,
}

impl Unit {
    pub fn key(&self) -> PackageKey {
        self.unit_key.key()
    }

    pub fn type_id(&self) -> &'static str {
        self.package_type.type_id()
    }
}

/// Storage conduit used by the sync engine.
///
/// Implementations must be safe to call from several import workers at once;
/// writes for distinct units must not interfere.
pub trait UnitStore: Send + Sync {
    /// Top-level units of one type currently in the store.
    ///
    /// # Errors
    ///
    /// * [`StoreError::DuplicateUnit`] if two top-level units share a key.
    fn existing_units(&self, package_type: PackageType) -> StoreResult<Vec<Unit>>;

    /// Prepares a unit without persisting it.
    ///
    /// The returned unit's `storage_path` is where the caller must place the
    /// content file before calling [`UnitStore::save_unit`]. An empty
    /// `relative_path` creates a parent unit with no content.
    fn init_unit(
        &self,
        package_type: PackageType,
        unit_key: UnitKey,
        metadata: IndexMap<String, String>,
        relative_path: &str,
    ) -> StoreResult<Unit>;

    /// Persists a unit, returning it with its id assigned.
    fn save_unit(&self, unit: Unit) -> StoreResult<Unit>;

    /// Records `child` as a file of `parent`.
    fn link_unit(&self, parent: &Unit, child: &Unit) -> StoreResult<()>;

    /// Removes a unit and its linked children.
    ///
    /// Content files are deleted once no remaining unit refers to them.
    fn remove_unit(&self, unit: &Unit) -> StoreResult<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Inventory {
    next_id: u64,
    units: Vec<Unit>,
}

/// Filesystem-backed [`UnitStore`].
///
/// Content lives under `<root>/content/<relative path>`; the inventory is a
/// JSON document at `<root>/units.json`, rewritten atomically on each change.
pub struct FsStore {
    root: PathBuf,
    inventory: Mutex<Inventory>,
}

impl FsStore {
    pub const INVENTORY_FILE: &'static str = "units.json";
    pub const CONTENT_DIR: &'static str = "content";

    /// Opens the store at `root`, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_dir_exists(root.join(Self::CONTENT_DIR))?;

        let inventory_path = root.join(Self::INVENTORY_FILE);
        let inventory = if inventory_path.exists() {
            let bytes = fs::read(&inventory_path)
                .with_context(|| format!("reading {}", inventory_path.display()))?;
            serde_json::from_slice(&bytes)?
        } else {
            Inventory::default()
        };

        debug!(
            root = %root.display(),
            units = inventory.units.len(),
            "opened unit store"
        );

        Ok(Self {
            root,
            inventory: Mutex::new(inventory),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(Self::CONTENT_DIR)
    }

    /// Every unit in the store, children included.
    pub fn all_units(&self) -> Vec<Unit> {
        self.lock().units.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, inventory: &Inventory) -> StoreResult<()> {
        let path = self.root.join(Self::INVENTORY_FILE);
        let tmp = self.root.join(format!("{}.tmp", Self::INVENTORY_FILE));
        let bytes = serde_json::to_vec_pretty(inventory)?;

        fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    fn resolve_storage_path(&self, relative_path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(relative_path);
        let valid = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidPath(relative_path.to_string()));
        }
        Ok(self.content_dir().join(relative))
    }
}

impl UnitStore for FsStore {
    fn existing_units(&self, package_type: PackageType) -> StoreResult<Vec<Unit>> {
        let inventory = self.lock();
        let mut seen = HashSet::new();
        let mut units = Vec::new();

        for unit in inventory
            .units
            .iter()
            .filter(|u| u.package_type == package_type && u.parent.is_none())
        {
            if !seen.insert(unit.key()) {
                return Err(StoreError::DuplicateUnit {
                    type_id: package_type.type_id(),
                    key: unit.key().to_string(),
                });
            }
            units.push(unit.clone());
        }

        Ok(units)
    }

    fn init_unit(
        &self,
        package_type: PackageType,
        unit_key: UnitKey,
        metadata: IndexMap<String, String>,
        relative_path: &str,
    ) -> StoreResult<Unit> {
        let storage_path = if relative_path.is_empty() {
            None
        } else {
            Some(self.resolve_storage_path(relative_path)?)
        };

        Ok(Unit {
            id: None,
            package_type,
            unit_key,
            metadata,
            relative_path: relative_path.to_string(),
            storage_path,
            checksum: None,
            parent: None,
        })
    }

    fn save_unit(&self, mut unit: Unit) -> StoreResult<Unit> {
        if let Some(path) = &unit.storage_path {
            if !path.is_file() {
                return Err(StoreError::MissingContent {
                    path: path.display().to_string(),
                });
            }
            unit.checksum = Some(calculate_checksum(path)?);
        }

        let mut inventory = self.lock();
        match unit.id {
            Some(id) => {
                let slot = inventory
                    .units
                    .iter_mut()
                    .find(|u| u.id == Some(id))
                    .ok_or(StoreError::UnitNotFound(id))?;
                *slot = unit.clone();
            }
            None => {
                inventory.next_id += 1;
                unit.id = Some(inventory.next_id);
                inventory.units.push(unit.clone());
            }
        }
        self.persist(&inventory)?;

        trace!(key = %unit.key(), path = %unit.relative_path, "saved unit");
        Ok(unit)
    }

    fn link_unit(&self, parent: &Unit, child: &Unit) -> StoreResult<()> {
        let parent_id = parent
            .id
            .ok_or_else(|| StoreError::UnitNotSaved(parent.key().to_string()))?;
        let child_id = child
            .id
            .ok_or_else(|| StoreError::UnitNotSaved(child.relative_path.clone()))?;

        let mut inventory = self.lock();
        if !inventory.units.iter().any(|u| u.id == Some(parent_id)) {
            return Err(StoreError::UnitNotFound(parent_id));
        }
        let slot = inventory
            .units
            .iter_mut()
            .find(|u| u.id == Some(child_id))
            .ok_or(StoreError::UnitNotFound(child_id))?;
        slot.parent = Some(parent_id);

        self.persist(&inventory)
    }

    fn remove_unit(&self, unit: &Unit) -> StoreResult<()> {
        let id = unit
            .id
            .ok_or_else(|| StoreError::UnitNotSaved(unit.key().to_string()))?;

        let mut inventory = self.lock();
        if !inventory.units.iter().any(|u| u.id == Some(id)) {
            return Err(StoreError::UnitNotFound(id));
        }

        let doomed: Vec<Unit> = inventory
            .units
            .iter()
            .filter(|u| u.id == Some(id) || u.parent == Some(id))
            .cloned()
            .collect();

        inventory
            .units
            .retain(|u| u.id != Some(id) && u.parent != Some(id));
        self.persist(&inventory)?;

        let shared: HashSet<&PathBuf> = inventory
            .units
            .iter()
            .filter_map(|u| u.storage_path.as_ref())
            .collect();
        for path in doomed.iter().filter_map(|u| u.storage_path.as_ref()) {
            if shared.contains(path) {
                trace!(path = %path.display(), "content still referenced, keeping");
                continue;
            }
            safe_remove(path)?;
        }

        debug!(key = %unit.key(), removed = doomed.len(), "removed unit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn key(name: &str, version: &str, maintainer: &str) -> UnitKey {
        UnitKey {
            package: name.into(),
            version: version.into(),
            maintainer: maintainer.into(),
        }
    }

    fn place_content(unit: &Unit, data: &[u8]) {
        let path = unit.storage_path.as_ref().unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_save_and_list_binary_unit() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        let unit = store
            .init_unit(
                PackageType::Binary,
                key("A", "1.0", "alice"),
                IndexMap::new(),
                "pool/main/a/A_1.0_all.deb",
            )
            .unwrap();
        assert_eq!(
            unit.storage_path.as_deref(),
            Some(dir.path().join("content/pool/main/a/A_1.0_all.deb").as_path())
        );
        place_content(&unit, b"A");
        let saved = store.save_unit(unit).unwrap();

        assert_eq!(saved.id, Some(1));
        assert!(saved.checksum.is_some());

        let units = store.existing_units(PackageType::Binary).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].key().as_str(), "A-1.0-alice");
        assert!(store.existing_units(PackageType::Source).unwrap().is_empty());
    }

    #[test]
    fn test_inventory_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FsStore::open(dir.path()).unwrap();
            let unit = store
                .init_unit(PackageType::Binary, key("A", "1", "a"), IndexMap::new(), "a.deb")
                .unwrap();
            place_content(&unit, b"A");
            store.save_unit(unit).unwrap();
        }

        let store = FsStore::open(dir.path()).unwrap();
        assert_eq!(store.existing_units(PackageType::Binary).unwrap().len(), 1);
        let unit = store
            .init_unit(PackageType::Binary, key("B", "1", "b"), IndexMap::new(), "b.deb")
            .unwrap();
        place_content(&unit, b"B");
        assert_eq!(store.save_unit(unit).unwrap().id, Some(2));
    }

    #[test]
    fn test_save_requires_content() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let unit = store
            .init_unit(PackageType::Binary, key("A", "1", "a"), IndexMap::new(), "a.deb")
            .unwrap();
        assert!(matches!(
            store.save_unit(unit),
            Err(StoreError::MissingContent { .. })
        ));
        assert!(store.all_units().is_empty());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        for path in ["../etc/passwd", "/etc/passwd", "pool/../../x"] {
            assert!(matches!(
                store.init_unit(PackageType::Binary, key("A", "1", "a"), IndexMap::new(), path),
                Err(StoreError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn test_source_parent_and_children() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let unit_key = key("A", "1.0", "alice");

        let parent = store
            .init_unit(PackageType::Source, unit_key.clone(), IndexMap::new(), "")
            .unwrap();
        assert!(parent.storage_path.is_none());
        let parent = store.save_unit(parent).unwrap();

        for file in ["pool/a/A_1.0.dsc", "pool/a/A_1.0.tar.xz"] {
            let child = store
                .init_unit(PackageType::Source, unit_key.clone(), IndexMap::new(), file)
                .unwrap();
            place_content(&child, file.as_bytes());
            let child = store.save_unit(child).unwrap();
            store.link_unit(&parent, &child).unwrap();
        }

        let units = store.existing_units(PackageType::Source).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, parent.id);
        assert_eq!(store.all_units().len(), 3);

        store.remove_unit(&units[0]).unwrap();
        assert!(store.all_units().is_empty());
        assert!(!dir.path().join("content/pool/a/A_1.0.dsc").exists());
    }

    #[test]
    fn test_shared_content_survives_removal() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let orig = "pool/a/A_1.0.orig.tar.gz";

        let mut parents = Vec::new();
        for (version, dsc) in [("1.0-1", "pool/a/A_1.0-1.dsc"), ("1.0-2", "pool/a/A_1.0-2.dsc")] {
            let unit_key = key("A", version, "alice");
            let parent = store
                .init_unit(PackageType::Source, unit_key.clone(), IndexMap::new(), "")
                .unwrap();
            let parent = store.save_unit(parent).unwrap();
            for file in [dsc, orig] {
                let child = store
                    .init_unit(PackageType::Source, unit_key.clone(), IndexMap::new(), file)
                    .unwrap();
                place_content(&child, file.as_bytes());
                let child = store.save_unit(child).unwrap();
                store.link_unit(&parent, &child).unwrap();
            }
            parents.push(parent);
        }

        store.remove_unit(&parents[0]).unwrap();
        assert!(!dir.path().join("content/pool/a/A_1.0-1.dsc").exists());
        assert!(dir.path().join("content").join(orig).exists());
        assert_eq!(store.all_units().len(), 3);

        store.remove_unit(&parents[1]).unwrap();
        assert!(!dir.path().join("content").join(orig).exists());
        assert!(store.all_units().is_empty());
    }

    #[test]
    fn test_duplicate_top_level_units() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        for path in ["a1.deb", "a2.deb"] {
            let unit = store
                .init_unit(PackageType::Binary, key("A", "1", "a"), IndexMap::new(), path)
                .unwrap();
            place_content(&unit, b"x");
            store.save_unit(unit).unwrap();
        }
        assert!(matches!(
            store.existing_units(PackageType::Binary),
            Err(StoreError::DuplicateUnit { type_id: "deb", .. })
        ));
    }

    #[test]
    fn test_remove_unknown_unit() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let mut unit = store
            .init_unit(PackageType::Binary, key("A", "1", "a"), IndexMap::new(), "a.deb")
            .unwrap();
        assert!(matches!(
            store.remove_unit(&unit),
            Err(StoreError::UnitNotSaved(_))
        ));
        unit.id = Some(42);
        assert!(matches!(
            store.remove_unit(&unit),
            Err(StoreError::UnitNotFound(42))
        ));
    }

    #[test]
    fn test_corrupt_inventory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FsStore::INVENTORY_FILE), b"{not json").unwrap();
        assert!(matches!(
            FsStore::open(dir.path()),
            Err(StoreError::Inventory(_))
        ));
    }
}
