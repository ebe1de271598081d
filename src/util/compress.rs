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


//! Writes a package directory into a zip archive.

use ignore::overrides::OverrideBuilder;
use ignore::{DirEntry, WalkBuilder};
use std::fs::File;
use std::io::prelude::*;
use std::io::{Seek, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::util::anyerror::Fault;

const COMPRESSION_METHOD: CompressionMethod = CompressionMethod::Deflated;

fn zip_dir<T>(
    it: &mut dyn Iterator<Item = DirEntry>,
    prefix: &Path,
    writer: T,
    method: CompressionMethod,
) -> zip::result::ZipResult<()>
where
    T: Write + Seek,
{
    let mut zip = zip::ZipWriter::new(writer);
    let options = FileOptions::default()
        .compression_method(method)
        .unix_permissions(0o755);

    let mut buffer = Vec::new();
    for entry in it {
        let path = entry.path();
        let name = match path.strip_prefix(prefix) {
            Ok(n) => n,
            Err(_) => continue,
        };
        // directories are written explicitly since some unzip tools need them
        if path.is_file() {
            #[allow(deprecated)]
            zip.start_file_from_path(name, options)?;
            let mut f = File::open(path)?;
            f.read_to_end(&mut buffer)?;
            zip.write_all(&buffer)?;
            buffer.clear();
        } else if name.as_os_str().is_empty() == false {
            #[allow(deprecated)]
            zip.add_directory_from_path(name, options)?;
        }
    }
    zip.finish()?;
    Ok(())
}

/// Compresses `src_dir` into the archive `dst_file`, skipping paths that match
/// any glob in `ignores`.
pub fn write_zip_dir(src_dir: &Path, dst_file: &Path, ignores: &[&str]) -> Result<(), Fault> {
    if src_dir.is_dir() == false {
        return Err(ZipError::FileNotFound)?;
    }
    let file = File::create(dst_file)?;

    let mut overrides = OverrideBuilder::new(src_dir);
    for rule in ignores {
        overrides.add(&format!("!{}", rule))?;
    }
    let walker = WalkBuilder::new(src_dir)
        .overrides(overrides.build()?)
        .standard_filters(false)
        .hidden(false)
        .build();

    zip_dir(
        &mut walker.filter_map(|e| e.ok()),
        src_dir,
        file,
        COMPRESSION_METHOD,
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn zip_package_dir() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("package.yaml"), "name: a\n").unwrap();
        std::fs::write(src.path().join("cache.pyc"), "").unwrap();
        let dest = tempdir().unwrap();
        let archive = dest.path().join("a.zip");
        write_zip_dir(src.path(), &archive, &["*.pyc"]).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.by_index(0).unwrap().name(), "package.yaml");
    }

    #[test]
    fn missing_source_dir() {
        let dest = tempdir().unwrap();
        let result = write_zip_dir(
            &dest.path().join("nothing"),
            &dest.path().join("a.zip"),
            &[],
        );
        assert_eq!(result.is_err(), true);
    }
}
