//! Debian repository metadata for aptsync.
//!
//! This crate turns the index files of a remote Debian repository into typed
//! package records.
//!
//! # Overview
//!
//! - [`Distribution`] knows which index files a repository publishes
//!   ([`Distribution::get_indexes`]) and parses them once fetched
//!   ([`Distribution::update_from_resources`]).
//! - [`Package`] is one binary or source package, identified by its
//!   [`PackageKey`] (`<package>-<version>-<maintainer>`).
//! - [`PackageIndex`] holds the parsed packages keyed by type and identity key.
//!
//! # Example
//!
//! ```no_run
//! use aptsync_config::repository::Repository;
//! use aptsync_dl::{cancel::CancellationToken, fetcher::fetcher_for_url};
//! use aptsync_registry::Distribution;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::new("debian", "http://deb.debian.org/debian", "stable", "main", "amd64");
//! let mut dist = Distribution::new(&repo, "/var/cache/aptsync/debian");
//!
//! let fetcher = fetcher_for_url(&repo.url, CancellationToken::new())?;
//! let fetched = fetcher.download_resources(dist.get_indexes(), &|_, _| {})?;
//! dist.update_from_resources(&fetched)?;
//!
//! for package in dist.packages().iter() {
//!     println!("{}", package.identity_key());
//! }
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod distribution;
pub mod error;
pub mod index;
pub mod package;

pub use distribution::{
    packages_index_url, sources_index_url, Distribution, PACKAGES_FILENAME, SOURCES_FILENAME,
};
pub use error::{ErrorContext, RegistryError, Result};
pub use index::PackageIndex;
pub use package::{Package, PackageFile, PackageKey, PackageType, UnitKey, TYPE_DEB, TYPE_DEB_SRC};
