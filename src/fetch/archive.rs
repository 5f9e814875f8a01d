use std::fs;
use std::io;
use std::path::{Component, Path};

use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub fn make_executable(p: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = fs::metadata(p)?.permissions();
    perm.set_mode(perm.mode() | 0o755);
    fs::set_permissions(p, perm)
}

/// Unpack a zip archive into `dest`, returning the number of entries written.
///
/// Entries whose names would escape `dest` (absolute paths, `..`) are skipped.
/// Unix permission bits stored in the archive are restored.
pub fn extract_zip(archive: &Path, dest: &Path) -> io::Result<usize> {
    let f = fs::File::open(archive)?;
    let mut zip = ZipArchive::new(f).map_err(io::Error::other)?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(io::Error::other)?;
        let Some(rel) = entry.enclosed_name().map(Path::to_path_buf) else {
            log::warn!("skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let out = dest.join(&rel);
        let mode = entry.unix_mode();

        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            io::Read::read_to_string(&mut entry, &mut target)?;
            if !stays_inside(&rel, Path::new(&target)) {
                log::warn!("skipping link leaving the archive: {} -> {target}", entry.name());
                continue;
            }
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(&target, &out)?;
            written += 1;
            continue;
        }

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut of = fs::File::create(&out)?;
            io::copy(&mut entry, &mut of)?;
            written += 1;
        }

        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            // Keep directories traversable even if the archive says otherwise.
            let mode = if entry.is_dir() { mode | 0o700 } else { mode };
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    Ok(written)
}

/// Does a link stored at `entry` with raw `target` resolve inside the archive root?
fn stays_inside(entry: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }
    let mut depth = entry.components().count().saturating_sub(1);
    for c in target.components() {
        match c {
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    true
}

/// Collapse a lone top-level directory into `root`.
///
/// If `root` holds exactly one entry and that entry is a directory, its
/// children are moved up one level and the wrapper is removed. Returns whether
/// anything was flattened; zero or several entries leave `root` as-is.
pub fn flatten_single_wrapper(root: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(root)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(false);
    }
    let only = entries.remove(0);
    if !only.file_type()?.is_dir() {
        return Ok(false);
    }

    // Renamed first so a child sharing the wrapper's name can move up freely.
    // The parking name must not clash with the wrapper or any of its children.
    let wrapper = only.path();
    let parked = (0..)
        .map(|n| format!(".wrapper.flatten.{n}"))
        .find(|name| {
            only.file_name() != name.as_str() && fs::symlink_metadata(wrapper.join(name)).is_err()
        })
        .map(|name| root.join(name))
        .ok_or_else(|| io::Error::other("no free name to flatten archive wrapper"))?;
    fs::rename(&wrapper, &parked)?;
    for child in fs::read_dir(&parked)? {
        let child = child?;
        fs::rename(child.path(), root.join(child.file_name()))?;
    }
    fs::remove_dir(&parked)?;
    Ok(true)
}


#[cfg(test)]
mod tests {
    use super::testutil::{zip_bytes, zip_with_links};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extract_restores_tree() {
        let td = tempdir().unwrap();
        let zip = td.path().join("a.zip");
        fs::write(
            &zip,
            zip_bytes(&[
                ("Grayjay", "#!/bin/sh\n"),
                ("wwwroot/", ""),
                ("wwwroot/index.html", "<html/>"),
            ]),
        )
        .unwrap();

        let out = td.path().join("out");
        let n = extract_zip(&zip, &out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(fs::read(out.join("Grayjay")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(
            fs::read_to_string(out.join("wwwroot/index.html")).unwrap(),
            "<html/>"
        );
    }

    #[test]
    fn extract_recreates_symlinks() {
        let td = tempdir().unwrap();
        let zip = td.path().join("a.zip");
        fs::write(
            &zip,
            zip_with_links(
                &[("lib/libx.so.1", "so")],
                &[("lib/libx.so", "libx.so.1"), ("lib/escape", "../../etc/passwd")],
            ),
        )
        .unwrap();

        let out = td.path().join("out");
        assert_eq!(extract_zip(&zip, &out).unwrap(), 2);
        let link = out.join("lib/libx.so");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("libx.so.1"));
        assert_eq!(fs::read_to_string(&link).unwrap(), "so");
        assert!(fs::symlink_metadata(out.join("lib/escape")).is_err());
    }

    #[test]
    fn link_targets_must_stay_inside_archive() {
        assert!(stays_inside(Path::new("lib/libx.so"), Path::new("libx.so.1")));
        assert!(stays_inside(Path::new("lib/libx.so"), Path::new("../Grayjay")));
        assert!(!stays_inside(Path::new("libx.so"), Path::new("../libx.so.1")));
        assert!(!stays_inside(Path::new("libx.so"), Path::new("/usr/lib/libx.so")));
    }

    #[test]
    fn extract_fails_on_garbage() {
        let td = tempdir().unwrap();
        let zip = td.path().join("bad.zip");
        fs::write(&zip, b"definitely not a zip").unwrap();
        assert!(extract_zip(&zip, &td.path().join("out")).is_err());
    }

    #[test]
    fn flatten_moves_wrapper_contents_up() {
        let td = tempdir().unwrap();
        let root = td.path();
        let wrapper = root.join("Grayjay.Desktop-linux-x64");
        fs::create_dir_all(wrapper.join("lib")).unwrap();
        fs::write(wrapper.join("Grayjay"), "bin").unwrap();

        assert!(flatten_single_wrapper(root).unwrap());
        assert!(root.join("Grayjay").is_file());
        assert!(root.join("lib").is_dir());
        assert!(!wrapper.exists());
    }

    #[test]
    fn flatten_handles_child_named_like_wrapper() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::create_dir_all(root.join("Grayjay")).unwrap();
        fs::write(root.join("Grayjay").join("Grayjay"), "bin").unwrap();

        assert!(flatten_single_wrapper(root).unwrap());
        assert_eq!(fs::read_to_string(root.join("Grayjay")).unwrap(), "bin");
    }

    #[test]
    fn flatten_handles_child_named_like_parking_spot() {
        let td = tempdir().unwrap();
        let root = td.path();
        let wrapper = root.join("Grayjay.Desktop-linux-x64");
        fs::create_dir_all(wrapper.join(".wrapper.flatten.0")).unwrap();
        fs::write(wrapper.join("Grayjay"), "bin").unwrap();

        assert!(flatten_single_wrapper(root).unwrap());
        assert!(root.join(".wrapper.flatten.0").is_dir());
        assert!(root.join("Grayjay").is_file());
        assert_eq!(fs::read_dir(root).unwrap().count(), 2);
    }

    #[test]
    fn flatten_leaves_multiple_or_file_roots_alone() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::write(root.join("Grayjay"), "bin").unwrap();
        assert!(!flatten_single_wrapper(root).unwrap());

        fs::create_dir(root.join("lib")).unwrap();
        assert!(!flatten_single_wrapper(root).unwrap());
        assert!(root.join("lib").is_dir());
    }

    #[test]
    fn make_executable_sets_exec_bits() {
        use std::os::unix::fs::PermissionsExt;
        let td = tempdir().unwrap();
        let f = td.path().join("Grayjay");
        fs::write(&f, "bin").unwrap();
        fs::set_permissions(&f, fs::Permissions::from_mode(0o600)).unwrap();

        make_executable(&f).unwrap();
        let mode = fs::metadata(&f).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
