use std::{
    fs::{self, File},
    io,
    path::Path,
};

use tempfile::NamedTempFile;

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// If the directory already exists, this function does nothing. If the path exists but is
/// not a directory, this function returns an error.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Removes the specified file or directory safely.
///
/// A path that does not exist is not an error. Directories are removed recursively.
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
/// the path not existing.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        }
    })
}

/// Copies `from` to `to`, creating the parent directories of `to` first.
///
/// The content is written to a temporary sibling of `to` and renamed over it, so
/// readers of `to` never see a partial copy.
///
/// Returns the number of bytes copied.
pub fn copy_into_place<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> FileSystemResult<u64> {
    let from = from.as_ref();
    let to = to.as_ref();
    let parent = match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir_exists(parent)?;

    let copy_error = |err: io::Error| {
        FileSystemError::File {
            path: from.to_path_buf(),
            action: "copy",
            source: err,
        }
    };

    let mut source = File::open(from).map_err(copy_error)?;
    let mut staged = NamedTempFile::new_in(parent).map_err(|err| {
        FileSystemError::File {
            path: parent.to_path_buf(),
            action: "stage",
            source: err,
        }
    })?;
    let copied = io::copy(&mut source, staged.as_file_mut()).map_err(copy_error)?;

    staged.persist(to).map_err(|err| {
        FileSystemError::File {
            path: to.to_path_buf(),
            action: "rename",
            source: err.error,
        }
    })?;

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_safe_remove_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_file.txt");
        fs::write(&file_path, "hello").unwrap();
        safe_remove(&file_path).unwrap();
        assert!(!file_path.exists());
    }

    #[test]
    fn test_safe_remove_dir() {
        let dir = tempdir().unwrap();
        let sub_dir = dir.path().join("sub");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("inner"), "x").unwrap();
        safe_remove(&sub_dir).unwrap();
        assert!(!sub_dir.exists());
    }

    #[test]
    fn test_safe_remove_non_existent() {
        let dir = tempdir().unwrap();
        safe_remove(dir.path().join("non_existent.txt")).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let new_dir = dir.path().join("a/b/c");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
        ensure_dir_exists(&new_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(matches!(
            ensure_dir_exists(&file_path),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_copy_into_place_creates_parents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.deb");
        fs::write(&src, b"payload").unwrap();

        let dest = dir.path().join("pool/main/h/hello/hello.deb");
        let copied = copy_into_place(&src, &dest).unwrap();

        assert_eq!(copied, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_copy_into_place_replaces_without_leftovers() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.deb");
        fs::write(&src, b"new").unwrap();

        let dest_dir = dir.path().join("pool");
        fs::create_dir(&dest_dir).unwrap();
        let dest = dest_dir.join("hello.deb");
        fs::write(&dest, b"old content").unwrap();

        copy_into_place(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        let entries = fs::read_dir(&dest_dir).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_copy_into_place_missing_source() {
        let dir = tempdir().unwrap();
        let result = copy_into_place(dir.path().join("missing"), dir.path().join("out"));
        assert!(matches!(
            result,
            Err(FileSystemError::File {
                action: "copy",
                ..
            })
        ));
    }
}
