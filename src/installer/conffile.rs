// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Conffile protocol.

A conffile is a path listed in the `conffiles` control member. On
install its on-disk digest is compared against the old packaged digest
and the new packaged digest; user modifications always win by default,
with the incoming version parked alongside as `<path>.wpkg-new`.

The sibling extensions `.wpkg-old` and `.wpkg-user` are reserved; purge
removes all three.
*/

/// Reserved sibling extensions next to a conffile.
pub const CONFFILE_SIBLINGS: &[&str] = &[".wpkg-new", ".wpkg-old", ".wpkg-user"];

/// What to do with an incoming conffile.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConffileAction {
    /// Write the new version over the current file.
    Install,
    /// Leave the current file untouched.
    NoChange,
    /// The user's file already equals the new version; keep it and
    /// record the new digest.
    Adopt,
    /// Keep the user's file; park the new version at `<path>.wpkg-new`.
    KeepUser,
}

/// Decide the fate of one conffile.
///
/// `on_disk` is the digest of the current file (None when the user
/// removed it), `old_packaged` the digest recorded at the previous
/// install (None on first install), `new_packaged` the digest of the
/// incoming version.
pub fn decide(
    on_disk: Option<&str>,
    old_packaged: Option<&str>,
    new_packaged: &str,
) -> ConffileAction {
    let on_disk = match on_disk {
        // The user removed the file; respect invariant I2 by treating
        // the install as fresh.
        None => return ConffileAction::Install,
        Some(digest) => digest,
    };

    if on_disk == new_packaged {
        // Whatever its history, the on-disk file already is the new
        // version.
        return if old_packaged == Some(on_disk) {
            ConffileAction::NoChange
        } else {
            ConffileAction::Adopt
        };
    }

    match old_packaged {
        // Untouched since the last install; the package may replace its
        // own file silently.
        Some(old) if old == on_disk => ConffileAction::Install,
        // User edits diverge from both versions; the user wins.
        Some(_) => ConffileAction::KeepUser,
        // First install over a pre-existing user file.
        None => ConffileAction::KeepUser,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = "1111";
    const NEW: &str = "2222";
    const USER: &str = "ffff";

    #[test]
    fn untouched_file_replaced_silently() {
        assert_eq!(decide(Some(OLD), Some(OLD), NEW), ConffileAction::Install);
    }

    #[test]
    fn identical_upgrade_is_noop() {
        assert_eq!(decide(Some(OLD), Some(OLD), OLD), ConffileAction::NoChange);
    }

    #[test]
    fn user_file_matching_new_is_adopted() {
        assert_eq!(decide(Some(NEW), Some(OLD), NEW), ConffileAction::Adopt);
    }

    #[test]
    fn diverged_user_file_kept() {
        assert_eq!(decide(Some(USER), Some(OLD), NEW), ConffileAction::KeepUser);
    }

    #[test]
    fn deleted_file_reinstalled() {
        assert_eq!(decide(None, Some(OLD), NEW), ConffileAction::Install);
    }

    #[test]
    fn fresh_install_over_foreign_file() {
        assert_eq!(decide(Some(USER), None, NEW), ConffileAction::KeepUser);
        assert_eq!(decide(Some(NEW), None, NEW), ConffileAction::Adopt);
        assert_eq!(decide(None, None, NEW), ConffileAction::Install);
    }
}
