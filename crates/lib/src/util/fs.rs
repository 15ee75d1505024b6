//! Filesystem helpers for build directories.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Recursively copy `src` into `dst`, skipping entries whose name is in `exclude`.
///
/// Symlinks are recreated rather than followed. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<u64> {
  fs::create_dir_all(dst)?;
  let mut copied = 0;

  let walker = WalkDir::new(src)
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    if entry.depth() == 0 {
      continue;
    }

    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      symlink(&link, &target)?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target)?;
      copied += 1;
    }
  }

  Ok(copied)
}

/// Total size in bytes of the regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, target)
}

#[cfg(windows)]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(link, target)
}
