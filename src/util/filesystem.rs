//
//  Copyright (C) 2022-2024  Chase Ruskin
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.
//


use crate::util::anyerror::{AnyError, Fault};
use ignore::overrides::OverrideBuilder;
use std::path::{Path, PathBuf};

/// Patterns that are never copied when moving a package directory.
pub const FILE_FILTER_EXCLUDE: [&str; 6] = [
    "*.pyc",
    "*.pyo",
    "__pycache__/",
    ".git/",
    ".idea/",
    ".vscode/",
];

pub enum Unit {
    MegaBytes,
    Bytes,
}

impl Unit {
    /// Returns the divisor number to convert to the `self` unit.
    fn value(&self) -> usize {
        match self {
            Self::MegaBytes => 1000000,
            Self::Bytes => 1,
        }
    }
}

/// Calculates the size of the given path.
pub fn compute_size<P>(path: &P, unit: Unit) -> Result<f32, Fault>
where
    P: AsRef<Path>,
{
    Ok(fs_extra::dir::get_size(&path)? as f32 / unit.value() as f32)
}

/// Recursively copies the contents of `src` into `dest`.
///
/// Any path matching a glob in `ignores` is skipped, along with everything
/// below it. The destination directory is created when missing.
pub fn copy(src: &Path, dest: &Path, ignores: &[&str]) -> Result<(), Fault> {
    if src.is_dir() == false {
        return Err(AnyError(format!(
            "source directory \"{}\" does not exist",
            src.display()
        )))?;
    }
    let mut overrides = OverrideBuilder::new(src);
    for rule in ignores {
        overrides.add(&format!("!{}", rule))?;
    }
    let walker = ignore::WalkBuilder::new(src)
        .overrides(overrides.build()?)
        .standard_filters(false)
        .hidden(false)
        .build();

    std::fs::create_dir_all(dest)?;
    for entry in walker {
        let entry = entry?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(p) => p,
            Err(_) => continue,
        };
        // skip the root itself
        if rel.as_os_str().is_empty() == true {
            continue;
        }
        let to = dest.join(rel);
        if entry.path().is_dir() == true {
            std::fs::create_dir_all(&to)?;
        } else {
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}

/// Removes the directory `path` and all of its contents.
///
/// Does nothing if the directory does not exist.
pub fn remove_dir(path: &Path) -> Result<(), Fault> {
    if path.exists() == true {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Removes the directory `path` only when it holds no entries.
///
/// Returns `true` if the directory was removed.
pub fn remove_if_empty(path: &Path) -> Result<bool, Fault> {
    if path.is_dir() == false {
        return Ok(false);
    }
    match std::fs::read_dir(path)?.next() {
        Some(_) => Ok(false),
        None => {
            std::fs::remove_dir(path)?;
            Ok(true)
        }
    }
}

/// Replaces a leading `~` with the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") || path.starts_with("~\\") {
        if let Some(home) = home::home_dir() {
            return match path.len() > 2 {
                true => home.join(&path[2..]),
                false => home,
            };
        }
    }
    PathBuf::from(path)
}

/// Resolves a relative path into a full path if given relative to some `root` path.
///
/// This function is helpful for resolving `include` entries of configuration
/// files and package paths listed in the environment file.
pub fn resolve_rel_path(root: &Path, s: &str) -> PathBuf {
    let expanded = expand_home(s);
    match expanded.is_relative() {
        true => root.join(expanded),
        false => expanded,
    }
}

/// Checks if `inner` is located at or below `outer`.
///
/// Both paths are compared after canonicalizing whatever part exists on disk.
pub fn is_subpath(outer: &Path, inner: &Path) -> bool {
    let outer = normalize(outer);
    let inner = normalize(inner);
    inner.starts_with(&outer)
}

/// Canonicalizes the path if it exists, otherwise canonicalizes its nearest
/// existing ancestor and re-appends the remaining components.
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(p) = std::fs::canonicalize(path) {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.as_os_str().is_empty() == false => {
            normalize(parent).join(name)
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_path_simple() {
        let root = PathBuf::from("/opt/trellis");
        assert_eq!(
            resolve_rel_path(&root, "config/env"),
            PathBuf::from("/opt/trellis/config/env")
        );
        // not relative
        assert_eq!(resolve_rel_path(&root, "/src"), PathBuf::from("/src"));
    }

    #[test]
    fn copy_skips_ignored_paths() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("pkg/__pycache__")).unwrap();
        std::fs::create_dir_all(src.path().join(".git")).unwrap();
        std::fs::write(src.path().join("pkg/__init__.py"), "").unwrap();
        std::fs::write(src.path().join("pkg/__pycache__/a.pyc"), "").unwrap();
        std::fs::write(src.path().join("pkg/b.pyc"), "").unwrap();
        std::fs::write(src.path().join(".git/HEAD"), "").unwrap();

        copy(src.path(), &dest.path().join("out"), &FILE_FILTER_EXCLUDE).unwrap();

        let out = dest.path().join("out");
        assert_eq!(out.join("pkg/__init__.py").exists(), true);
        assert_eq!(out.join("pkg/b.pyc").exists(), false);
        assert_eq!(out.join("pkg/__pycache__").exists(), false);
        assert_eq!(out.join(".git").exists(), false);
    }

    #[test]
    fn subpaths() {
        let dir = tempdir().unwrap();
        assert_eq!(is_subpath(dir.path(), &dir.path().join("a/b")), true);
        assert_eq!(is_subpath(&dir.path().join("a"), dir.path()), false);
    }

    #[test]
    fn remove_only_empty_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("full")).unwrap();
        std::fs::write(dir.path().join("full/x"), "").unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        assert_eq!(remove_if_empty(&dir.path().join("full")).unwrap(), false);
        assert_eq!(remove_if_empty(&dir.path().join("empty")).unwrap(), true);
        assert_eq!(dir.path().join("empty").exists(), false);
    }
}
