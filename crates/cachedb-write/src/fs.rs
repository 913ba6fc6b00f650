//! The filesystem seam used by the write chain.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Filesystem primitives the write chain is built from.
pub trait FsOps: Send + Sync {
    /// Create or truncate `path` and write `bytes`, optionally fsyncing.
    fn write_file(&self, path: &Path, bytes: &[u8], sync: bool) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Strip extended attributes that block writes (quarantine, provenance).
    fn clear_attributes(&self, path: &Path) -> io::Result<()>;

    /// Write with the most permissive file mode the platform allows.
    fn write_unrestricted(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// [`FsOps`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFs;

impl FsOps for StdFs {
    fn write_file(&self, path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[cfg(target_os = "macos")]
    fn clear_attributes(&self, path: &Path) -> io::Result<()> {
        let status = std::process::Command::new("xattr")
            .arg("-c")
            .arg(path)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("xattr -c exited with {status}")))
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn clear_attributes(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn write_unrestricted(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o666);
            if path.exists() {
                fs::set_permissions(path, fs::Permissions::from_mode(0o666))?;
            }
        }

        let mut file = options.open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

#[cfg(unix)]
const PERMISSION_CLASS_CODES: &[i32] = &[
    1,  // EPERM
    13, // EACCES
    16, // EBUSY
    18, // EXDEV
    26, // ETXTBSY
    30, // EROFS
];

#[cfg(windows)]
const PERMISSION_CLASS_CODES: &[i32] = &[
    5,  // ERROR_ACCESS_DENIED
    17, // ERROR_NOT_SAME_DEVICE
    32, // ERROR_SHARING_VIOLATION
    33, // ERROR_LOCK_VIOLATION
];

#[cfg(not(any(unix, windows)))]
const PERMISSION_CLASS_CODES: &[i32] = &[];

/// Whether `err` is one the write chain routes around.
///
/// Covers permission denials, read-only or busy targets, and cross-device
/// renames. Everything else (missing directories, full disks) is fatal.
pub fn is_permission_class(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    err.raw_os_error()
        .map(|code| PERMISSION_CLASS_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_permission_class() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(is_permission_class(&err));
    }

    #[cfg(unix)]
    #[test]
    fn cross_device_and_read_only_are_permission_class() {
        assert!(is_permission_class(&io::Error::from_raw_os_error(18)));
        assert!(is_permission_class(&io::Error::from_raw_os_error(30)));
    }

    #[test]
    fn other_errors_are_not() {
        assert!(!is_permission_class(&io::Error::new(io::ErrorKind::NotFound, "gone")));
        assert!(!is_permission_class(&io::Error::other("disk full")));
    }

    #[test]
    fn std_fs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");

        StdFs.write_file(&a, b"{}", true).unwrap();
        StdFs.copy(&a, &b).unwrap();
        assert_eq!(fs::read(&b).unwrap(), b"{}");

        StdFs.remove_file(&a).unwrap();
        assert!(!StdFs.exists(&a));
        StdFs.rename(&b, &a).unwrap();
        assert!(StdFs.exists(&a));
    }

    #[test]
    fn unrestricted_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        StdFs.write_file(&path, b"old", false).unwrap();
        StdFs.write_unrestricted(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }
}
