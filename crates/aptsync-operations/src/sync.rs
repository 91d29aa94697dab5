use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use aptsync_config::{config::Config, error::ConfigError, repository::Repository};
use aptsync_core::{
    error::{StoreError, SyncError},
    report::{SyncProgressReport, SyncReport},
    store::{FsStore, Unit, UnitStore},
    SyncResult,
};
use aptsync_dl::{
    cancel::CancellationToken,
    error::DownloadError,
    fetcher::{fetcher_for_url, Fetcher},
    types::{Progress, Resource},
};
use aptsync_events::{EventSinkHandle, NullSink, PhaseState, ProgressSnapshot};
use aptsync_registry::{Distribution, Package, PackageType, RegistryError};
use aptsync_utils::{
    fs::{copy_into_place, safe_remove},
    hash::{sha256_file, verify_sha256},
};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, error, info, warn};

use crate::{
    diff::{ExistingUnits, SyncPlan},
    progress::create_progress_bridge,
};

const INDEX_DOWNLOAD_FAILED: &str = "Error downloading resources";
const INDEX_PARSE_FAILED: &str = "Error parsing repository packages resources document";
const IMPORT_FAILED: &str = "Error retrieving packages";

/// Run-level knobs that do not belong to a single repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Packages imported at once; 1 keeps the import serial.
    pub parallel_limit: usize,
    /// Check fetched files against the index's SHA-256 before storing them.
    pub verify_checksums: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallel_limit: 1,
            verify_checksums: true,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel_limit: config.parallel_limit(),
            verify_checksums: config.verify_checksums(),
        }
    }
}

type ProgressBridge = Arc<dyn Fn(&Resource, Progress) + Send + Sync>;

/// One lock per fetched file, so packages sharing a pool file (such as the
/// `.orig.tar.gz` of two source revisions) are imported one at a time.
#[derive(Default)]
struct FileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLocks {
    /// Lock handles for `paths`, deduplicated and in a fixed order.
    fn handles(&self, paths: &[PathBuf]) -> Vec<Arc<Mutex<()>>> {
        let mut sorted: Vec<&PathBuf> = paths.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        sorted
            .into_iter()
            .map(|path| locks.entry(path.clone()).or_default().clone())
            .collect()
    }
}

/// A single sync of one Debian repository into a unit store.
///
/// Holds the state of exactly one run and is not meant to be reused.
/// [`PackageSyncRun::perform_sync`] drives the index phase and, if it
/// succeeds, the import phase, pushing progress snapshots to the event sink
/// throughout.
pub struct PackageSyncRun {
    repo: Repository,
    store: Arc<dyn UnitStore>,
    working_dir: PathBuf,
    options: SyncOptions,
    fetcher: Box<dyn Fetcher>,
    progress: ProgressBridge,
    report: Mutex<SyncProgressReport>,
    file_locks: FileLocks,
}

impl PackageSyncRun {
    /// Prepares a run, picking the fetcher from the repository URL scheme.
    ///
    /// `working_dir` receives fetched index and package files before they are
    /// copied into the store.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Config`] if the repository configuration is invalid or
    ///   its URL scheme has no fetcher. No phase has started at that point.
    pub fn new(
        repo: Repository,
        store: Arc<dyn UnitStore>,
        working_dir: impl Into<PathBuf>,
        options: SyncOptions,
        events: Option<EventSinkHandle>,
    ) -> SyncResult<Self> {
        repo.validate()?;

        let fetcher = fetcher_for_url(&repo.url, CancellationToken::new()).map_err(|err| {
            match err {
                DownloadError::UnsupportedScheme {
                    scheme, ..
                } => {
                    SyncError::Config(ConfigError::UnsupportedScheme {
                        repo: repo.id.clone(),
                        scheme,
                    })
                }
                other => SyncError::Fetch(other),
            }
        })?;

        Ok(Self::with_fetcher(
            repo,
            store,
            working_dir,
            options,
            events,
            fetcher,
        ))
    }

    /// Prepares a run with an explicit fetcher.
    pub fn with_fetcher(
        repo: Repository,
        store: Arc<dyn UnitStore>,
        working_dir: impl Into<PathBuf>,
        options: SyncOptions,
        events: Option<EventSinkHandle>,
        fetcher: Box<dyn Fetcher>,
    ) -> Self {
        let events = events.unwrap_or_else(|| Arc::new(NullSink));
        let report = SyncProgressReport::new(repo.id.clone(), Some(events.clone()));

        Self {
            repo,
            store,
            working_dir: working_dir.into(),
            options,
            fetcher,
            progress: create_progress_bridge(events),
            report: Mutex::new(report),
            file_locks: FileLocks::default(),
        }
    }

    /// Token that cancels this run between resources.
    pub fn cancel_token(&self) -> CancellationToken {
        self.fetcher.cancel_token().clone()
    }

    /// Current progress, as last pushed or about to be pushed.
    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.lock_report().build_progress_report()
    }

    /// Runs the sync to completion and returns the final report.
    ///
    /// Phase failures are recorded in the report rather than returned; a
    /// final progress snapshot is always pushed before returning.
    pub fn perform_sync(&self) -> SyncReport {
        info!(repo = %self.repo.id, url = %self.repo.url, "beginning sync");

        let mut dist = Distribution::new(&self.repo, self.working_dir.clone());
        if self.update_dist(&mut dist) {
            if dist.packages().is_empty() {
                info!(repo = %self.repo.id, "no packages advertised");
            } else {
                self.import_packages(&dist);
            }
        }

        let report = self.lock_report();
        report.update_progress();
        let final_report = report.build_final_report();

        info!(
            repo = %self.repo.id,
            success = final_report.success,
            seconds = final_report.summary.total_execution_time,
            "sync finished"
        );
        final_report
    }

    /// Index phase: fetches and parses the index files into `dist`.
    ///
    /// Returns false if the phase failed.
    fn update_dist(&self, dist: &mut Distribution) -> bool {
        info!(repo = %self.repo.id, "retrieving index files");

        {
            let mut report = self.lock_report();
            report.index.state = PhaseState::Running;
            report.update_progress();
        }
        let started = Instant::now();

        let outcome = match self
            .fetcher
            .download_resources(dist.get_indexes(), &*self.progress)
        {
            Ok(fetched) => {
                dist.update_from_resources(&fetched)
                    .map_err(|err| (INDEX_PARSE_FAILED, SyncError::from(err)))
            }
            Err(err) => Err((INDEX_DOWNLOAD_FAILED, SyncError::from(err))),
        };

        let elapsed = started.elapsed().as_secs();
        let mut report = self.lock_report();
        match outcome {
            Ok(()) => {
                report.index.state = PhaseState::Success;
                report.index.execution_time = Some(elapsed);
                report.update_progress();
                true
            }
            Err((message, err)) => {
                error!(repo = %self.repo.id, error = %err, "{message}");
                report.fail_index(message, &err, elapsed);
                report.update_progress();
                false
            }
        }
    }

    /// Import phase: diffs the index against the store, imports new packages
    /// and removes missing ones when configured to.
    fn import_packages(&self, dist: &Distribution) {
        info!(repo = %self.repo.id, "importing packages");

        // Running is only pushed together with the counts.
        self.lock_report().packages.state = PhaseState::Running;
        let started = Instant::now();

        let plan = match ExistingUnits::load(self.store.as_ref()) {
            Ok(existing) => SyncPlan::compute(dist.packages(), &existing),
            Err(err) => {
                self.fail_import(SyncError::from(err), started);
                return;
            }
        };

        info!(
            repo = %self.repo.id,
            new = plan.new.len(),
            missing = plan.missing.len(),
            "computed sync plan"
        );

        {
            let mut report = self.lock_report();
            report.set_package_counts(plan.new.len() as u64);
            report.update_progress();
        }

        let packages: Vec<&Package> = plan
            .new
            .iter()
            .filter_map(|(package_type, key)| dist.packages().get(*package_type, key))
            .collect();
        self.import_new_packages(dist, &packages);

        if !self.is_cancelled() && self.repo.remove_missing() {
            self.remove_missing_units(&plan.missing);
        }

        if self.is_cancelled() {
            self.fail_import(SyncError::Cancelled, started);
            return;
        }

        let mut report = self.lock_report();
        report.packages.state = PhaseState::Success;
        report.packages.execution_time = Some(started.elapsed().as_secs());
        report.update_progress();
    }

    fn import_new_packages(&self, dist: &Distribution, packages: &[&Package]) {
        let limit = self.options.parallel_limit;
        if limit <= 1 || packages.len() <= 1 {
            for package in packages {
                self.import_package(dist, package);
            }
            return;
        }

        match rayon::ThreadPoolBuilder::new().num_threads(limit).build() {
            Ok(pool) => {
                pool.install(|| {
                    packages
                        .par_iter()
                        .for_each(|package| self.import_package(dist, package));
                });
            }
            Err(err) => {
                warn!(error = %err, "could not start import pool, importing serially");
                for package in packages {
                    self.import_package(dist, package);
                }
            }
        }
    }

    /// Imports one package, recording the outcome without propagating it.
    fn import_package(&self, dist: &Distribution, package: &Package) {
        if self.is_cancelled() {
            return;
        }

        let key = package.identity_key();
        let result = self.add_new_package(dist, package);

        let mut report = self.lock_report();
        match result {
            Ok(()) => {
                debug!(repo = %self.repo.id, key = %key, "imported package");
                report.add_finished_package(&key);
            }
            Err(err) if err.is_cancelled() => {
                debug!(repo = %self.repo.id, key = %key, "import cancelled");
            }
            Err(err) => {
                warn!(repo = %self.repo.id, key = %key, error = %err, "failed to import package");
                report.add_failed_package(&key, &err);
            }
        }
        report.update_progress();
    }

    fn add_new_package(&self, dist: &Distribution, package: &Package) -> SyncResult<()> {
        let resources = package.get_resources(&dist.url, dist.download_dir());
        let cached: Vec<PathBuf> = resources.iter().map(|r| r.destination.clone()).collect();

        let handles = self.file_locks.handles(&cached);
        let _guards: Vec<MutexGuard<'_, ()>> = handles
            .iter()
            .map(|lock| lock.lock().unwrap_or_else(|e| e.into_inner()))
            .collect();

        let result = self.fetch_and_store(package, resources);
        for path in &cached {
            if let Err(err) = safe_remove(path) {
                warn!(path = %path.display(), error = %err, "failed to clear fetched file");
            }
        }
        result
    }

    fn fetch_and_store(&self, package: &Package, resources: Vec<Resource>) -> SyncResult<()> {
        let fetched = self
            .fetcher
            .download_resources(resources, &*self.progress)?;

        if self.options.verify_checksums {
            for resource in &fetched {
                verify_checksum(resource)?;
            }
        }

        let mut placed = Vec::with_capacity(fetched.len());
        let mut saved = Vec::with_capacity(fetched.len() + 1);
        let result = self.store_package(package, &fetched, &mut placed, &mut saved);
        if result.is_err() {
            self.rollback(&saved, &placed);
        }
        result
    }

    /// Copies the fetched files into the store and saves their units.
    ///
    /// Source packages get a file-less parent unit that every file is linked to.
    /// Only files this call created end up in `placed`; a file already in the
    /// store belongs to another unit and must survive a rollback.
    fn store_package(
        &self,
        package: &Package,
        fetched: &[Resource],
        placed: &mut Vec<PathBuf>,
        saved: &mut Vec<Unit>,
    ) -> SyncResult<()> {
        let mut units = Vec::with_capacity(fetched.len());
        for resource in fetched {
            let (unit, created) = self.content_unit(package, resource)?;
            if created {
                placed.extend(unit.storage_path.clone());
            }
            units.push(unit);
        }

        let parent = match package.package_type {
            PackageType::Source => {
                let parent = self.store.init_unit(
                    package.package_type,
                    package.unit_key(),
                    package.unit_metadata(),
                    "",
                )?;
                let parent = self.store.save_unit(parent)?;
                saved.push(parent.clone());
                Some(parent)
            }
            PackageType::Binary => None,
        };

        for unit in units {
            let unit = self.store.save_unit(unit)?;
            saved.push(unit.clone());
            if let Some(parent) = &parent {
                self.store.link_unit(parent, &unit)?;
            }
        }

        Ok(())
    }

    /// Initializes the unit for one fetched file and copies the file into place.
    ///
    /// Returns whether the storage file was newly created.
    fn content_unit(&self, package: &Package, resource: &Resource) -> SyncResult<(Unit, bool)> {
        let relative = resource
            .storage_path
            .as_deref()
            .ok_or_else(|| SyncError::NoStoragePath(resource.name.clone()))?;
        let source = resource
            .path
            .as_deref()
            .ok_or_else(|| RegistryError::NotFetched(resource.name.clone()))?;

        let unit = self.store.init_unit(
            package.package_type,
            package.unit_key(),
            package.unit_metadata(),
            relative,
        )?;
        let mut created = false;
        if let Some(destination) = &unit.storage_path {
            created = !destination.exists();
            copy_into_place(source, destination)?;
        }

        Ok((unit, created))
    }

    /// Best-effort undo of a partially stored package.
    fn rollback(&self, saved: &[Unit], placed: &[PathBuf]) {
        for unit in saved.iter().rev() {
            match self.store.remove_unit(unit) {
                Ok(()) | Err(StoreError::UnitNotFound(_)) => {}
                Err(err) => {
                    warn!(key = %unit.key(), error = %err, "failed to roll back unit");
                }
            }
        }
        for path in placed {
            if let Err(err) = safe_remove(path) {
                warn!(path = %path.display(), error = %err, "failed to roll back file");
            }
        }
    }

    /// Removes units the remote no longer advertises.
    ///
    /// A failed removal is recorded and the remaining removals still run.
    fn remove_missing_units(&self, missing: &[Unit]) {
        for unit in missing {
            if self.is_cancelled() {
                return;
            }

            let key = unit.key();
            let result = self.store.remove_unit(unit);

            let mut report = self.lock_report();
            match result {
                Ok(()) => {
                    info!(repo = %self.repo.id, key = %key, "removed package");
                    report.add_removed_package(&key);
                }
                Err(err) => {
                    warn!(repo = %self.repo.id, key = %key, error = %err, "failed to remove package");
                    report.add_failed_removal(&key, &err);
                }
            }
        }
    }

    fn fail_import(&self, err: SyncError, started: Instant) {
        error!(repo = %self.repo.id, error = %err, "{IMPORT_FAILED}");
        let mut report = self.lock_report();
        report.fail_packages(IMPORT_FAILED, &err, started.elapsed().as_secs());
        report.update_progress();
    }

    fn is_cancelled(&self) -> bool {
        self.fetcher.cancel_token().is_cancelled()
    }

    fn lock_report(&self) -> MutexGuard<'_, SyncProgressReport> {
        self.report.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn verify_checksum(resource: &Resource) -> SyncResult<()> {
    let (Some(expected), Some(path)) = (resource.sha256.as_deref(), resource.path.as_deref())
    else {
        return Ok(());
    };

    if verify_sha256(path, expected)? {
        return Ok(());
    }

    Err(SyncError::ChecksumMismatch {
        file: resource.name.clone(),
        expected: expected.to_string(),
        actual: sha256_file(path)?,
    })
}

/// Syncs one configured repository into its store under the configured
/// store root, using `<cache>/<repo id>` as the working directory.
pub fn sync_repository(
    config: &Config,
    repo: &Repository,
    events: Option<EventSinkHandle>,
) -> SyncResult<SyncReport> {
    let store = FsStore::open(repository_store_path(config, repo)?)?;
    let working_dir = config.get_cache_path()?.join(&repo.id);

    let run = PackageSyncRun::new(
        repo.clone(),
        Arc::new(store),
        working_dir,
        SyncOptions::from_config(config),
        events,
    )?;
    Ok(run.perform_sync())
}

/// Store root of one repository: `<store>/<repo id>`.
pub fn repository_store_path(config: &Config, repo: &Repository) -> SyncResult<PathBuf> {
    Ok(config.get_store_path()?.join(&repo.id))
}

/// Index files this repository would fetch, in order.
pub fn index_urls(repo: &Repository) -> Vec<String> {
    Distribution::new(repo, Path::new(""))
        .get_indexes()
        .into_iter()
        .map(|resource| resource.url)
        .collect()
}
