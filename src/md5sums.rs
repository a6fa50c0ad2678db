// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! md5sums documents.

The `md5sums` control member records one `<hex digest>  <path>` line per
installed regular file. These helpers generate such a document from a
directory tree (the `md5sums` verb) and verify an installed package's
files against its recorded digests (the `md5sums-check` verb).
*/

use {
    crate::{
        admin_db::AdminDb,
        error::{Result, WpkgError},
    },
    md5::{Digest, Md5},
    std::{
        fs,
        io::Read,
        path::{Path, PathBuf},
    },
};

/// Compute the MD5 digest of a file as lowercase hex.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 32768];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        hasher.update(&buffer[0..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the MD5 digest of a byte slice as lowercase hex.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Generate an md5sums document for every regular file under `root`.
///
/// Paths are recorded relative to `root` and the output is sorted, so
/// the document is deterministic.
pub fn generate(root: &Path) -> Result<String> {
    let mut lines = vec![];
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();

                lines.push(format!("{}  {}\n", digest_file(&path)?, relative));
            }
        }
    }

    lines.sort_by(|a, b| {
        // Order by path, which follows the double space.
        a.split_once("  ").map(|x| x.1).cmp(&b.split_once("  ").map(|x| x.1))
    });

    Ok(lines.concat())
}

/// Parse an md5sums document into (digest, path) pairs.
pub fn parse(doc: &str) -> Result<Vec<(String, String)>> {
    doc.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once("  ")
                .map(|(digest, path)| (digest.to_string(), path.to_string()))
                .ok_or_else(|| WpkgError::StatusParse(format!("malformed md5sums line: {}", line)))
        })
        .collect()
}

/// A single md5sums verification failure.
#[derive(Clone, Debug)]
pub enum Md5Failure {
    /// The file is gone from the target root.
    Missing(PathBuf),
    /// The on-disk digest differs from the recorded one.
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

/// Verify an installed package's files against its recorded digests
/// (`md5sums-check`).
///
/// Conffiles are skipped; the user may legitimately have edited them.
/// Returns all failures rather than stopping at the first.
pub fn check_package(db: &AdminDb, package: &str, root: &Path) -> Result<Vec<Md5Failure>> {
    let doc = db
        .read_info_file(package, "md5sums")?
        .map(|data| String::from_utf8_lossy(&data).to_string())
        .unwrap_or_default();

    let conffiles = db.read_conffile_digests(package)?;

    let mut failures = vec![];

    for (expected, relative) in parse(&doc)? {
        if conffiles.contains_key(&relative) {
            continue;
        }

        let path = root.join(&relative);

        if !path.is_file() {
            failures.push(Md5Failure::Missing(path));
            continue;
        }

        let found = digest_file(&path)?;
        if found != expected {
            failures.push(Md5Failure::Mismatch {
                path,
                expected,
                found,
            });
        }
    }

    Ok(failures)
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn digest_known_value() {
        // MD5 of the empty input.
        assert_eq!(digest_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn generate_and_parse() -> Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("usr/bin"))?;
        fs::write(dir.path().join("usr/bin/t1"), b"payload")?;
        fs::write(dir.path().join("top"), b"")?;

        let doc = generate(dir.path())?;
        let entries = parse(&doc)?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "top");
        assert_eq!(entries[0].0, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(entries[1].1, "usr/bin/t1");

        Ok(())
    }

    #[test]
    fn check_reports_all_failures() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("usr/bin"))?;
        fs::write(root.join("usr/bin/ok"), b"good")?;
        fs::write(root.join("usr/bin/bad"), b"tampered")?;

        let db = AdminDb::create(dir.path().join("admin"))?;

        let doc = format!(
            "{}  usr/bin/ok\n{}  usr/bin/bad\n{}  usr/bin/gone\n",
            digest_bytes(b"good"),
            digest_bytes(b"original"),
            digest_bytes(b"x"),
        );
        db.write_info_file("t1", "md5sums", doc.as_bytes())?;

        let failures = check_package(&db, "t1", &root)?;
        assert_eq!(failures.len(), 2);

        assert!(failures.iter().any(|f| matches!(
            f,
            Md5Failure::Mismatch { path, .. } if path.ends_with("usr/bin/bad")
        )));
        assert!(failures.iter().any(|f| matches!(
            f,
            Md5Failure::Missing(path) if path.ends_with("usr/bin/gone")
        )));

        Ok(())
    }

    #[test]
    fn check_skips_conffiles() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("etc"))?;
        fs::write(root.join("etc/t1.conf"), b"user edited")?;

        let db = AdminDb::create(dir.path().join("admin"))?;

        let doc = format!("{}  etc/t1.conf\n", digest_bytes(b"packaged"));
        db.write_info_file("t1", "md5sums", doc.as_bytes())?;

        let mut digests = std::collections::BTreeMap::new();
        digests.insert("etc/t1.conf".to_string(), digest_bytes(b"packaged"));
        db.write_conffile_digests("t1", &digests)?;

        assert!(check_package(&db, "t1", &root)?.is_empty());

        Ok(())
    }
}
