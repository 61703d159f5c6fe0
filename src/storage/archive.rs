//! gzip-compressed tar archives of a directory tree.
//!
//! Entries are rooted at the directory's basename, so `index_db/a.bin`
//! unpacks to `<dest>/a.bin`. Both functions block; call them from
//! `spawn_blocking`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::core::errors::RagError;

/// Archives `dir` with every entry under `root_name/`.
pub fn pack_dir(dir: &Path, root_name: &str) -> Result<Vec<u8>, RagError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(root_name, dir)
        .map_err(|e| RagError::StorageSync(format!("failed to archive {}: {}", dir.display(), e)))?;

    let encoder = builder.into_inner().map_err(RagError::storage_sync)?;
    encoder.finish().map_err(RagError::storage_sync)
}

/// Extracts an archive made by [`pack_dir`] into `dest`, dropping the
/// `root_name/` prefix. Links and paths escaping `dest` are rejected.
pub fn unpack_into(data: &[u8], root_name: &str, dest: &Path) -> Result<usize, RagError> {
    fs::create_dir_all(dest).map_err(RagError::storage_sync)?;

    let mut archive = Archive::new(GzDecoder::new(data));
    let mut files = 0;

    for item in archive.entries().map_err(corrupt)? {
        let mut entry = item.map_err(corrupt)?;
        let raw_path = entry.path().map_err(corrupt)?.into_owned();

        let Some(relative) = strip_root(&raw_path, root_name) else {
            return Err(RagError::StorageSync(format!(
                "unsafe archive entry: {}",
                raw_path.to_string_lossy()
            )));
        };

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(RagError::StorageSync(format!(
                "unsupported link entry: {}",
                raw_path.to_string_lossy()
            )));
        }

        let target = dest.join(&relative);
        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(RagError::storage_sync)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(RagError::storage_sync)?;
        }
        entry.unpack(&target).map_err(corrupt)?;
        files += 1;
    }

    Ok(files)
}

fn corrupt(err: std::io::Error) -> RagError {
    RagError::StorageSync(format!("archive is corrupt: {}", err))
}

/// Path below `root_name/`, or `None` if the entry is outside it or
/// contains `..`. The root directory itself maps to an empty path.
fn strip_root(raw: &Path, root_name: &str) -> Option<PathBuf> {
    let mut components = raw.components().filter(|c| !matches!(c, Component::CurDir));
    match components.next() {
        Some(Component::Normal(first)) if first == root_name => {}
        _ => return None,
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::File::create(path).unwrap().write_all(contents).unwrap();
    }

    #[test]
    fn pack_then_unpack_reproduces_tree() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("index.sqlite3"), &[0u8, 1, 2, 255]);
        write(&src.path().join("nested/deep/notes.txt"), b"hello");
        fs::create_dir_all(src.path().join("empty")).unwrap();

        let data = pack_dir(src.path(), "index_db").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let files = unpack_into(&data, "index_db", dest.path()).unwrap();

        assert_eq!(files, 2);
        assert_eq!(fs::read(dest.path().join("index.sqlite3")).unwrap(), vec![0u8, 1, 2, 255]);
        assert_eq!(fs::read(dest.path().join("nested/deep/notes.txt")).unwrap(), b"hello");
        assert!(dest.path().join("empty").is_dir());
    }

    #[test]
    fn wrong_root_is_rejected() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("a.txt"), b"a");
        let data = pack_dir(src.path(), "other_db").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let err = unpack_into(&data, "index_db", dest.path()).unwrap_err();
        assert!(err.to_string().contains("unsafe archive entry"));
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let dest = tempfile::tempdir().unwrap();
        let err = unpack_into(b"definitely not gzip", "index_db", dest.path()).unwrap_err();
        assert_eq!(err.kind(), "storage_sync_error");
    }

    #[test]
    fn strip_root_rejects_escapes() {
        assert_eq!(
            strip_root(Path::new("index_db/a/b.bin"), "index_db"),
            Some(PathBuf::from("a/b.bin"))
        );
        assert_eq!(strip_root(Path::new("./index_db/"), "index_db"), Some(PathBuf::new()));
        assert_eq!(strip_root(Path::new("index_db/../etc/passwd"), "index_db"), None);
        assert_eq!(strip_root(Path::new("/index_db/a"), "index_db"), None);
        assert_eq!(strip_root(Path::new("a.bin"), "index_db"), None);
    }
}
