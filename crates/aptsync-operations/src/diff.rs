use aptsync_core::{
    error::StoreError,
    store::{StoreResult, Unit, UnitStore},
};
use aptsync_registry::{PackageIndex, PackageKey, PackageType};
use indexmap::IndexMap;

/// Units already in the store, keyed by type and identity key.
#[derive(Debug, Default)]
pub struct ExistingUnits {
    units: IndexMap<(PackageType, PackageKey), Unit>,
}

impl ExistingUnits {
    /// Loads the top-level units of every package type.
    pub fn load(store: &dyn UnitStore) -> StoreResult<Self> {
        let mut units = Vec::new();
        for package_type in PackageType::ALL {
            units.extend(store.existing_units(package_type)?);
        }
        Self::from_units(units)
    }

    /// # Errors
    ///
    /// * [`StoreError::DuplicateUnit`] if two units share a type and key.
    pub fn from_units(units: impl IntoIterator<Item = Unit>) -> StoreResult<Self> {
        let mut map = IndexMap::new();
        for unit in units {
            let slot = (unit.package_type, unit.key());
            if map.contains_key(&slot) {
                return Err(StoreError::DuplicateUnit {
                    type_id: slot.0.type_id(),
                    key: slot.1.to_string(),
                });
            }
            map.insert(slot, unit);
        }
        Ok(Self {
            units: map,
        })
    }

    pub fn contains(&self, package_type: PackageType, key: &PackageKey) -> bool {
        self.units.contains_key(&(package_type, key.clone()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// What a run has to do to bring the store in line with the remote index.
///
/// `new` and `missing` are disjoint and sorted by type then key.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Advertised but not stored.
    pub new: Vec<(PackageType, PackageKey)>,
    /// Stored but no longer advertised.
    pub missing: Vec<Unit>,
}

impl SyncPlan {
    pub fn compute(remote: &PackageIndex, existing: &ExistingUnits) -> Self {
        let mut new: Vec<_> = PackageType::ALL
            .into_iter()
            .flat_map(|package_type| {
                remote
                    .keys(package_type)
                    .filter(move |key| !existing.contains(package_type, key))
                    .map(move |key| (package_type, key.clone()))
            })
            .collect();
        new.sort();

        let mut missing: Vec<Unit> = existing
            .units
            .iter()
            .filter(|((package_type, key), _)| remote.get(*package_type, key).is_none())
            .map(|(_, unit)| unit.clone())
            .collect();
        missing.sort_by(|a, b| (a.package_type, a.key()).cmp(&(b.package_type, b.key())));

        Self {
            new,
            missing,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.missing.is_empty()
    }
}
