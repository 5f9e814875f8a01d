use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// One way in which the installed tree differs from the candidate tree.
/// Paths are relative to the tree roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    /// Present in the candidate, missing from the installation.
    Missing(PathBuf),
    /// Present in the installation only.
    Extra(PathBuf),
    /// Same name, different entry kind (file / directory / symlink).
    Kind(PathBuf),
    Content(PathBuf),
    LinkTarget(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
    Symlink,
    Other,
}

fn kind_of(ft: fs::FileType) -> Kind {
    if ft.is_symlink() {
        Kind::Symlink
    } else if ft.is_dir() {
        Kind::Dir
    } else if ft.is_file() {
        Kind::File
    } else {
        Kind::Other
    }
}

/// Does `installed` need to change to match `candidate`?
///
/// True when `installed` is absent or not a directory; otherwise a deep
/// comparison of names, entry kinds and file bytes that stops at the first
/// difference.
pub fn differs(candidate: &Path, installed: &Path) -> io::Result<bool> {
    if !installed_is_dir(installed)? {
        return Ok(true);
    }
    let mut found = Vec::new();
    walk(candidate, installed, Path::new(""), &mut found, true)?;
    Ok(!found.is_empty())
}

/// Every difference between the two trees, in directory-walk order.
pub fn differences(candidate: &Path, installed: &Path) -> io::Result<Vec<Difference>> {
    if !installed_is_dir(installed)? {
        return Ok(vec![Difference::Missing(PathBuf::new())]);
    }
    let mut found = Vec::new();
    walk(candidate, installed, Path::new(""), &mut found, false)?;
    Ok(found)
}

fn installed_is_dir(p: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(p) {
        Ok(m) => Ok(m.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn list(dir: &Path) -> io::Result<BTreeMap<OsString, Kind>> {
    let mut out = BTreeMap::new();
    for ent in fs::read_dir(dir)? {
        let ent = ent?;
        out.insert(ent.file_name(), kind_of(ent.file_type()?));
    }
    Ok(out)
}

/// Returns early once `found` is non-empty when `first_only` is set.
fn walk(
    a_root: &Path,
    b_root: &Path,
    rel: &Path,
    found: &mut Vec<Difference>,
    first_only: bool,
) -> io::Result<()> {
    let a = list(&a_root.join(rel))?;
    let b = list(&b_root.join(rel))?;

    for (name, kind) in &a {
        if first_only && !found.is_empty() {
            return Ok(());
        }
        let path = rel.join(name);
        let Some(other) = b.get(name) else {
            found.push(Difference::Missing(path));
            continue;
        };
        if kind != other {
            found.push(Difference::Kind(path));
            continue;
        }
        match kind {
            Kind::Dir => walk(a_root, b_root, &path, found, first_only)?,
            Kind::File => {
                if !same_content(&a_root.join(&path), &b_root.join(&path))? {
                    found.push(Difference::Content(path));
                }
            }
            Kind::Symlink => {
                if fs::read_link(a_root.join(&path))? != fs::read_link(b_root.join(&path))? {
                    found.push(Difference::LinkTarget(path));
                }
            }
            Kind::Other => {}
        }
    }

    for name in b.keys() {
        if first_only && !found.is_empty() {
            return Ok(());
        }
        if !a.contains_key(name) {
            found.push(Difference::Extra(rel.join(name)));
        }
    }
    Ok(())
}

fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut f = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
