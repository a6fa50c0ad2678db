// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Administrative database lock.

At most one transaction may mutate the admin database and target
filesystem at a time. Mutual exclusion uses an exclusive advisory lock
on `<admin>/lock`; a second concurrent transaction fails fast instead
of blocking.
*/

use {
    crate::error::{Result, WpkgError},
    fs2::FileExt,
    std::{
        fs::File,
        path::{Path, PathBuf},
    },
};

/// Name of the lock file inside the admin directory.
pub const LOCK_FILE: &str = "lock";

/// An exclusive lock over the administrative database.
///
/// Released when dropped.
pub struct DatabaseLock {
    // Held open to maintain the advisory lock.
    _file: File,
    path: PathBuf,
}

impl DatabaseLock {
    /// Acquire the lock, failing fast if another process holds it.
    pub fn acquire(admin_dir: &Path) -> Result<Self> {
        let path = admin_dir.join(LOCK_FILE);
        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::debug!("acquired database lock at {}", path.display());

                Ok(Self { _file: file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(WpkgError::LockHeld(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        log::debug!("released database lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn acquire_and_release() -> Result<()> {
        let dir = TempDir::new()?;

        let lock = DatabaseLock::acquire(dir.path())?;
        assert!(lock.path().exists());
        drop(lock);

        // Re-acquirable after release.
        let _lock = DatabaseLock::acquire(dir.path())?;

        Ok(())
    }

    #[test]
    fn second_acquire_fails_fast() -> Result<()> {
        let dir = TempDir::new()?;

        let _held = DatabaseLock::acquire(dir.path())?;

        match DatabaseLock::acquire(dir.path()) {
            Err(WpkgError::LockHeld(path)) => {
                assert_eq!(path, dir.path().join(LOCK_FILE));
            }
            other => panic!("expected LockHeld, got {:?}", other.map(|l| l.path().to_path_buf())),
        }

        Ok(())
    }
}
