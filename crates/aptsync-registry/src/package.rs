use std::{
    fmt,
    path::{Component, Path},
};

use aptsync_dl::{types::Resource, utils::join_url};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    control::Stanza,
    error::{RegistryError, Result},
};

/// Store type id of binary packages.
pub const TYPE_DEB: &str = "deb";
/// Store type id of source packages.
pub const TYPE_DEB_SRC: &str = "deb_src";

/// Binary and source packages are diffed and stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Binary,
    Source,
}

impl PackageType {
    pub const ALL: [PackageType; 2] = [PackageType::Binary, PackageType::Source];

    pub fn type_id(&self) -> &'static str {
        match self {
            PackageType::Binary => TYPE_DEB,
            PackageType::Source => TYPE_DEB_SRC,
        }
    }

    pub fn from_type_id(type_id: &str) -> Option<Self> {
        match type_id {
            TYPE_DEB => Some(PackageType::Binary),
            TYPE_DEB_SRC => Some(PackageType::Source),
            _ => None,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_id())
    }
}

/// Identity of a package: `<package>-<version>-<maintainer>`.
///
/// Two packages are the same package exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageKey(String);

impl PackageKey {
    pub fn new(name: &str, version: &str, maintainer: &str) -> Self {
        Self(format!("{name}-{version}-{maintainer}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The fields that make up a [`PackageKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub package: String,
    pub version: String,
    pub maintainer: String,
}

impl UnitKey {
    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.package, &self.version, &self.maintainer)
    }
}

/// One downloadable file belonging to a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    /// Path relative to the repository base URL.
    pub path: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

impl PackageFile {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A package advertised by a `Packages` or `Sources` index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub package_type: PackageType,
    pub name: String,
    pub version: String,
    pub maintainer: String,
    pub architecture: Option<String>,
    pub files: Vec<PackageFile>,
    /// Every field of the stanza, in document order.
    pub fields: Stanza,
}

impl Package {
    /// Builds a binary package from a `Packages` stanza.
    ///
    /// `Package`, `Version`, `Maintainer` and `Filename` are required.
    pub fn from_binary_stanza(stanza: Stanza, resource: &str, index: usize) -> Result<Self> {
        let required = |field: &'static str| required_field(&stanza, field, resource, index);

        let name = required("Package")?;
        let version = required("Version")?;
        let maintainer = required("Maintainer")?;
        let filename = required("Filename")?;
        let size = optional_size(&stanza, "Size", resource)?;

        let file = PackageFile {
            path: relative_path(&filename, "Filename", resource)?,
            size,
            sha256: stanza.get("SHA256").map(|s| s.to_lowercase()),
        };

        Ok(Self {
            package_type: PackageType::Binary,
            architecture: stanza.get("Architecture").cloned(),
            name,
            version,
            maintainer,
            files: vec![file],
            fields: stanza,
        })
    }

    /// Builds a source package from a `Sources` stanza.
    ///
    /// The file list comes from `Files`, or from `Checksums-Sha256` when
    /// `Files` is absent; paths are rooted at `Directory`.
    pub fn from_source_stanza(stanza: Stanza, resource: &str, index: usize) -> Result<Self> {
        let required = |field: &'static str| required_field(&stanza, field, resource, index);

        let name = required("Package")?;
        let version = required("Version")?;
        let maintainer = required("Maintainer")?;
        let directory = required("Directory")?;

        let sha256_sums = match stanza.get("Checksums-Sha256") {
            Some(value) => parse_file_list(value, "Checksums-Sha256", resource)?,
            None => Vec::new(),
        };
        let listed = match stanza.get("Files") {
            Some(value) => parse_file_list(value, "Files", resource)?,
            None if !sha256_sums.is_empty() => sha256_sums.clone(),
            None => {
                return Err(RegistryError::MissingField {
                    resource: resource.to_string(),
                    stanza: index,
                    field: "Files",
                })
            }
        };

        let directory = relative_path(&directory, "Directory", resource)?;
        let files = listed
            .into_iter()
            .map(|(_, size, file_name)| {
                if file_name.contains('/') || relative_path(&file_name, "Files", resource)? != file_name {
                    return Err(RegistryError::InvalidField {
                        resource: resource.to_string(),
                        field: "Files",
                        value: file_name,
                    });
                }
                let sha256 = sha256_sums
                    .iter()
                    .find(|(_, _, name)| *name == file_name)
                    .map(|(sum, _, _)| sum.to_lowercase());
                Ok(PackageFile {
                    path: format!("{directory}/{file_name}"),
                    size: Some(size),
                    sha256,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            package_type: PackageType::Source,
            architecture: stanza.get("Architecture").cloned(),
            name,
            version,
            maintainer,
            files,
            fields: stanza,
        })
    }

    pub fn identity_key(&self) -> PackageKey {
        PackageKey::new(&self.name, &self.version, &self.maintainer)
    }

    pub fn unit_key(&self) -> UnitKey {
        UnitKey {
            package: self.name.clone(),
            version: self.version.clone(),
            maintainer: self.maintainer.clone(),
        }
    }

    /// Metadata recorded alongside the stored unit.
    pub fn unit_metadata(&self) -> IndexMap<String, String> {
        self.fields.clone()
    }

    /// Resources needed to import this package, one per file.
    ///
    /// Each is fetched from `base_url` into `download_dir` under its
    /// repository-relative path.
    pub fn get_resources(&self, base_url: &str, download_dir: &Path) -> Vec<Resource> {
        self.files
            .iter()
            .map(|file| {
                Resource::new(
                    file.file_name(),
                    join_url(base_url, &file.path),
                    download_dir.join(&file.path),
                )
                .with_storage_path(file.path.clone())
                .with_sha256(file.sha256.clone())
                .with_size(file.size)
            })
            .collect()
    }
}

fn required_field(
    stanza: &Stanza,
    field: &'static str,
    resource: &str,
    index: usize,
) -> Result<String> {
    stanza
        .get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            RegistryError::MissingField {
                resource: resource.to_string(),
                stanza: index,
                field,
            }
        })
}

/// Normalizes a repository-relative path from an index field.
///
/// Leading and trailing slashes are dropped; every remaining component
/// must be a plain name, so the path cannot leave the directory it is
/// joined onto.
fn relative_path(value: &str, field: &'static str, resource: &str) -> Result<String> {
    let trimmed = value.trim().trim_matches('/');
    let is_plain = !trimmed.is_empty()
        && trimmed.split('/').all(|segment| {
            let mut components = Path::new(segment).components();
            !segment.contains('\\')
                && matches!(
                    (components.next(), components.next()),
                    (Some(Component::Normal(_)), None)
                )
        });

    if !is_plain {
        return Err(RegistryError::InvalidField {
            resource: resource.to_string(),
            field,
            value: value.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn optional_size(stanza: &Stanza, field: &'static str, resource: &str) -> Result<Option<u64>> {
    stanza
        .get(field)
        .map(|value| {
            value.trim().parse::<u64>().map_err(|_| {
                RegistryError::InvalidField {
                    resource: resource.to_string(),
                    field,
                    value: value.clone(),
                }
            })
        })
        .transpose()
}

/// Parses `<checksum> <size> <name>` lines.
fn parse_file_list(
    value: &str,
    field: &'static str,
    resource: &str,
) -> Result<Vec<(String, u64, String)>> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let invalid = || {
                RegistryError::InvalidField {
                    resource: resource.to_string(),
                    field,
                    value: line.to_string(),
                }
            };
            let mut parts = line.split_whitespace();
            let (Some(sum), Some(size), Some(name), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid());
            };
            let size = size.parse::<u64>().map_err(|_| invalid())?;
            Ok((sum.to_string(), size, name.to_string()))
        })
        .collect()
}
