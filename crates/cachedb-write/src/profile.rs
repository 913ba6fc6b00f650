use serde::{Deserialize, Serialize};

use crate::writer::WriteMethod;

/// Environment variable marking a bundled, restricted-filesystem build.
pub const BUNDLED_ENV: &str = "CACHEDB_BUNDLED";

/// Capabilities of the environment the writer runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteProfile {
    /// Running from a packaged executable where rename is unreliable.
    pub bundled: bool,
    /// Running on a platform that attaches restrictive extended attributes.
    pub signing_restricted: bool,
}

impl WriteProfile {
    /// Probe the current process.
    pub fn detect() -> Self {
        let bundled = std::env::var(BUNDLED_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            bundled,
            signing_restricted: cfg!(target_os = "macos"),
        }
    }

    /// The ordered strategies this profile tries.
    pub fn chain(&self) -> Vec<WriteMethod> {
        let mut chain = Vec::with_capacity(7);
        if self.bundled {
            chain.push(WriteMethod::Direct);
            chain.push(WriteMethod::Recreate);
            if self.signing_restricted {
                chain.push(WriteMethod::ClearAttributes);
                chain.push(WriteMethod::Unrestricted);
            }
        } else {
            chain.push(WriteMethod::AtomicRename);
            chain.push(WriteMethod::CopyThenDelete);
            chain.push(WriteMethod::Direct);
            chain.push(WriteMethod::Recreate);
            if self.signing_restricted {
                chain.push(WriteMethod::ClearAttributes);
            }
        }
        chain.push(WriteMethod::TempOnly);
        chain
    }

    /// Short label used in diagnostics.
    pub fn platform(&self) -> &'static str {
        std::env::consts::OS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WriteMethod::*;

    #[test]
    fn standard_chain() {
        let profile = WriteProfile::default();
        assert_eq!(
            profile.chain(),
            vec![AtomicRename, CopyThenDelete, Direct, Recreate, TempOnly]
        );
    }

    #[test]
    fn standard_chain_on_signing_restricted_platform() {
        let profile = WriteProfile {
            bundled: false,
            signing_restricted: true,
        };
        assert_eq!(
            profile.chain(),
            vec![AtomicRename, CopyThenDelete, Direct, Recreate, ClearAttributes, TempOnly]
        );
    }

    #[test]
    fn bundled_chain_skips_rename() {
        let profile = WriteProfile {
            bundled: true,
            signing_restricted: false,
        };
        assert_eq!(profile.chain(), vec![Direct, Recreate, TempOnly]);

        let restricted = WriteProfile {
            bundled: true,
            signing_restricted: true,
        };
        assert_eq!(
            restricted.chain(),
            vec![Direct, Recreate, ClearAttributes, Unrestricted, TempOnly]
        );
    }

    #[test]
    fn every_chain_ends_with_temp_only() {
        for bundled in [false, true] {
            for signing_restricted in [false, true] {
                let chain = WriteProfile {
                    bundled,
                    signing_restricted,
                }
                .chain();
                assert_eq!(chain.last(), Some(&TempOnly));
            }
        }
    }
}
