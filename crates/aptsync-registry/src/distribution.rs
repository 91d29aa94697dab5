use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use aptsync_config::repository::Repository;
use aptsync_dl::types::Resource;
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::{
    control::parse_stanzas,
    error::{ErrorContext, RegistryError, Result},
    index::PackageIndex,
    package::{Package, PackageType},
};

pub const PACKAGES_FILENAME: &str = "Packages.gz";
pub const SOURCES_FILENAME: &str = "Sources.gz";

/// `<url>/dists/<dist>/<component>/binary-<arch>/Packages.gz`
pub fn packages_index_url(url: &str, dist: &str, component: &str, arch: &str) -> String {
    format!("{url}/dists/{dist}/{component}/binary-{arch}/{PACKAGES_FILENAME}")
}

/// `<url>/dists/<dist>/<component>/source/Sources.gz`
pub fn sources_index_url(url: &str, dist: &str, component: &str) -> String {
    format!("{url}/dists/{dist}/{component}/source/{SOURCES_FILENAME}")
}

/// A remote distribution as seen by one sync run.
///
/// Created from the repository configuration, filled in by
/// [`Distribution::update_from_resources`] once the index files are fetched.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub url: String,
    pub dist: String,
    pub component: String,
    pub arch: Vec<String>,
    pub sources: bool,
    download_dir: PathBuf,
    packages: PackageIndex,
}

impl Distribution {
    /// `download_dir` is the directory index files are fetched into.
    pub fn new(repo: &Repository, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: repo.base_url().to_string(),
            dist: repo.dist.clone(),
            component: repo.component.clone(),
            arch: repo.arch.clone(),
            sources: repo.sources(),
            download_dir: download_dir.into(),
            packages: PackageIndex::new(),
        }
    }

    /// Index files to fetch: one `Packages.gz` per architecture, then
    /// `Sources.gz` when sources are enabled.
    ///
    /// Pure function of the configuration; calling it again yields the same list.
    pub fn get_indexes(&self) -> Vec<Resource> {
        let component_dir = format!("dists/{}/{}", self.dist, self.component);

        let mut indexes: Vec<Resource> = self
            .arch
            .iter()
            .map(|arch| {
                let relative = format!("{component_dir}/binary-{arch}/{PACKAGES_FILENAME}");
                Resource::new(
                    relative.clone(),
                    packages_index_url(&self.url, &self.dist, &self.component, arch),
                    self.download_dir.join(&relative),
                )
            })
            .collect();

        if self.sources {
            let relative = format!("{component_dir}/source/{SOURCES_FILENAME}");
            indexes.push(Resource::new(
                relative.clone(),
                sources_index_url(&self.url, &self.dist, &self.component),
                self.download_dir.join(&relative),
            ));
        }

        indexes
    }

    /// Parses fetched index resources and replaces the package list.
    ///
    /// On error the previous package list is left untouched.
    ///
    /// # Errors
    ///
    /// Any [`RegistryError`]: unfetched resource, corrupt gzip stream, invalid
    /// UTF-8, stanza syntax, missing required fields, or duplicate keys.
    pub fn update_from_resources(&mut self, resources: &[Resource]) -> Result<()> {
        let mut packages = PackageIndex::new();

        for resource in resources {
            let path = resource
                .path
                .as_deref()
                .ok_or_else(|| RegistryError::NotFetched(resource.name.clone()))?;
            let text = read_index(path, &resource.name)?;
            let package_type = if resource.name.ends_with(SOURCES_FILENAME) {
                PackageType::Source
            } else {
                PackageType::Binary
            };

            let stanzas = parse_stanzas(&text, &resource.name)?;
            debug!(
                resource = %resource.name,
                stanzas = stanzas.len(),
                "parsed index"
            );

            for (index, stanza) in stanzas.into_iter().enumerate() {
                let package = match package_type {
                    PackageType::Binary => {
                        Package::from_binary_stanza(stanza, &resource.name, index)?
                    }
                    PackageType::Source => {
                        Package::from_source_stanza(stanza, &resource.name, index)?
                    }
                };
                packages.insert(package, &resource.name)?;
            }
        }

        info!(
            binary = packages.count(PackageType::Binary),
            source = packages.count(PackageType::Source),
            "{}/{}: {} packages advertised",
            self.dist,
            self.component,
            packages.len()
        );
        self.packages = packages;
        Ok(())
    }

    pub fn packages(&self) -> &PackageIndex {
        &self.packages
    }

    /// Directory package files are fetched into before they reach the store.
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

/// Reads an index file, gunzipping it when its name ends in `.gz`.
fn read_index(path: &Path, name: &str) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let mut bytes = Vec::new();
    if name.ends_with(".gz") {
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|err| {
                RegistryError::Decompress {
                    resource: name.to_string(),
                    source: err,
                }
            })?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)
            .with_context(|| format!("reading {}", path.display()))?;
    }

    String::from_utf8(bytes).map_err(|_| {
        RegistryError::InvalidEncoding {
            resource: name.to_string(),
        }
    })
}
