use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StepFailure, WriteError, WriteResult};
use crate::fs::{is_permission_class, FsOps, StdFs};
use crate::profile::WriteProfile;

/// One strategy in the write chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteMethod {
    /// Write `<path>.tmp`, then rename it over the target.
    AtomicRename,
    /// Copy `<path>.tmp` onto the target, then delete the temp file.
    CopyThenDelete,
    /// Write the target in place.
    Direct,
    /// Delete the target, then write it again.
    Recreate,
    /// Clear extended attributes, then write in place.
    ClearAttributes,
    /// Write with a fully permissive file mode.
    Unrestricted,
    /// Only `<path>.tmp` was written; the target is stale.
    TempOnly,
}

impl fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AtomicRename => "atomic-rename",
            Self::CopyThenDelete => "copy-then-delete",
            Self::Direct => "direct",
            Self::Recreate => "recreate",
            Self::ClearAttributes => "clear-attributes",
            Self::Unrestricted => "unrestricted",
            Self::TempOnly => "temp-only",
        };
        f.write_str(name)
    }
}

/// What a successful write did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub method: WriteMethod,
    /// Set when the canonical file was not updated.
    pub warning: Option<String>,
}

impl WriteOutcome {
    /// Whether the target path now holds the written bytes.
    pub fn is_canonical(&self) -> bool {
        self.method != WriteMethod::TempOnly
    }
}

/// A durable file writer.
///
/// Implementations must never leave a previously valid target truncated or
/// holding partial content.
pub trait WriteStrategy: Send + Sync {
    fn write(&self, path: &Path, bytes: &[u8]) -> WriteResult<WriteOutcome>;
}

/// Serialize `value` as pretty JSON and write it through `writer`.
pub fn write_json<W, T>(writer: &W, path: &Path, value: &T) -> WriteResult<WriteOutcome>
where
    W: WriteStrategy + ?Sized,
    T: Serialize + ?Sized,
{
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| WriteError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    writer.write(path, &bytes)
}

/// Sibling temp path: `<path>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// [`WriteStrategy`] that walks the chain chosen by a [`WriteProfile`].
pub struct FallbackWriter {
    profile: WriteProfile,
    chain: Vec<WriteMethod>,
    fs: Arc<dyn FsOps>,
}

impl FallbackWriter {
    /// Writer over the real filesystem.
    pub fn new(profile: WriteProfile) -> Self {
        Self::with_fs(profile, Arc::new(StdFs))
    }

    /// Writer over a caller-supplied filesystem.
    pub fn with_fs(profile: WriteProfile, fs: Arc<dyn FsOps>) -> Self {
        Self {
            chain: profile.chain(),
            profile,
            fs,
        }
    }

    pub fn profile(&self) -> WriteProfile {
        self.profile
    }

    fn attempt(
        &self,
        method: WriteMethod,
        path: &Path,
        tmp: &Path,
        bytes: &[u8],
        temp_written: &mut bool,
    ) -> io::Result<()> {
        match method {
            WriteMethod::AtomicRename => {
                self.fs.write_file(tmp, bytes, true)?;
                *temp_written = true;
                self.fs.rename(tmp, path)?;
                *temp_written = false;
                Ok(())
            }
            WriteMethod::CopyThenDelete => {
                if !*temp_written {
                    self.fs.write_file(tmp, bytes, true)?;
                    *temp_written = true;
                }
                self.fs.copy(tmp, path)
            }
            WriteMethod::Direct => self.fs.write_file(path, bytes, self.profile.bundled),
            WriteMethod::Recreate => {
                // Keep a recoverable copy before the target disappears.
                if !*temp_written && self.fs.write_file(tmp, bytes, true).is_ok() {
                    *temp_written = true;
                }
                match self.fs.remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
                self.fs.write_file(path, bytes, true)
            }
            WriteMethod::ClearAttributes => {
                self.fs.clear_attributes(path)?;
                self.fs.write_file(path, bytes, true)
            }
            WriteMethod::Unrestricted => self.fs.write_unrestricted(path, bytes),
            WriteMethod::TempOnly => {
                self.fs.write_file(tmp, bytes, true)?;
                *temp_written = true;
                Ok(())
            }
        }
    }

    fn discard_temp(&self, tmp: &Path) {
        if !self.fs.exists(tmp) {
            return;
        }
        if let Err(e) = self.fs.remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
        }
    }
}

impl WriteStrategy for FallbackWriter {
    fn write(&self, path: &Path, bytes: &[u8]) -> WriteResult<WriteOutcome> {
        let tmp = temp_path(path);
        let mut temp_written = false;
        let mut attempts = Vec::new();

        for &method in &self.chain {
            match self.attempt(method, path, &tmp, bytes, &mut temp_written) {
                Ok(()) => {
                    let warning = if method == WriteMethod::TempOnly {
                        let msg = format!(
                            "{} was not updated; pending data left in {}",
                            path.display(),
                            tmp.display()
                        );
                        warn!(path = %path.display(), failed_steps = attempts.len(), "{msg}");
                        Some(msg)
                    } else {
                        self.discard_temp(&tmp);
                        debug!(path = %path.display(), %method, len = bytes.len(), "file written");
                        None
                    };
                    return Ok(WriteOutcome {
                        path: path.to_path_buf(),
                        method,
                        warning,
                    });
                }
                Err(e) if is_permission_class(&e) => {
                    debug!(path = %path.display(), %method, error = %e, "write step refused; falling back");
                    attempts.push(StepFailure {
                        method,
                        error: e.to_string(),
                    });
                }
                Err(source) => {
                    return Err(WriteError::Io {
                        path: path.to_path_buf(),
                        method,
                        source,
                    });
                }
            }
        }

        Err(WriteError::Exhausted {
            path: path.to_path_buf(),
            platform: self.profile.platform(),
            attempts,
        })
    }
}

impl fmt::Debug for FallbackWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackWriter")
            .field("profile", &self.profile)
            .field("chain", &self.chain)
            .finish()
    }
}
