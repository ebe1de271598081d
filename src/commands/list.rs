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


use crate::commands::helps::list;
use crate::core::context::Context;
use crate::core::descriptor::Descriptor;
use crate::core::manager::PackagesManager;
use crate::util::anyerror::Fault;
use crate::util::filesystem::{self, Unit};

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct List {
    versions: bool,
    size: bool,
}

impl Subcommand<Context> for List {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(list::HELP))?;
        Ok(List {
            versions: cli.check(Arg::flag("versions"))?,
            size: cli.check(Arg::flag("size"))?,
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let manager = c.manager()?;
        println!("{}", self.run(&manager)?);
        Ok(())
    }
}

/// A row of the environment listing.
#[derive(Debug, PartialEq)]
struct Entry {
    name: String,
    version: String,
    kind: String,
    enabled: bool,
    installed: Vec<String>,
    size: Option<f32>,
}

impl List {
    pub fn new() -> Self {
        Self {
            versions: false,
            size: false,
        }
    }

    pub fn versions(mut self, flag: bool) -> Self {
        self.versions = flag;
        self
    }

    pub fn size(mut self, flag: bool) -> Self {
        self.size = flag;
        self
    }

    /// Builds the table of packages listed in the environment file.
    pub fn run(&self, manager: &PackagesManager) -> Result<String, Fault> {
        let mut entries = Vec::new();
        for info in manager.resolver().load_environment_file()? {
            let mut descriptor = Descriptor::from_info(info)?;
            entries.push(self.entry(manager, &mut descriptor)?);
        }
        Ok(self.fmt_table(&entries))
    }

    fn entry(&self, manager: &PackagesManager, descriptor: &mut Descriptor) -> Result<Entry, Fault> {
        let installed = match self.versions {
            true => manager.resolver().installed_versions(descriptor.name()),
            false => Vec::new(),
        };
        let size = match self.size {
            true => match descriptor.resolve(manager.resolver()) {
                Ok(_) => match descriptor.package() {
                    Some(pkg) => Some(filesystem::compute_size(&pkg.root(), Unit::MegaBytes)?),
                    None => None,
                },
                Err(e) => {
                    tracing::debug!("no size for {}: {}", descriptor.name(), e);
                    None
                }
            },
            false => None,
        };
        Ok(Entry {
            name: descriptor.name().to_string(),
            version: descriptor.version().to_string(),
            kind: descriptor.kind().to_string(),
            enabled: descriptor.is_enabled(),
            installed: installed,
            size: size,
        })
    }

    fn fmt_table(&self, entries: &[Entry]) -> String {
        let mut header = format!("{:<28}{:<14}{:<12}{:<9}", "Name", "Version", "Type", "Enabled");
        let mut rule = format!("{:-<27} {:-<13} {:-<11} {:-<8} ", "", "", "", "");
        if self.size == true {
            header.push_str(&format!("{:<11}", "Size (MB)"));
            rule.push_str(&format!("{:-<10} ", ""));
        }
        if self.versions == true {
            header.push_str("Installed");
            rule.push_str(&format!("{:-<9}", ""));
        }
        let mut table = format!("{}\n{}\n", header.trim_end(), rule.trim_end());
        for e in entries {
            let mut row = format!(
                "{:<28}{:<14}{:<12}{:<9}",
                e.name,
                e.version,
                e.kind,
                match e.enabled {
                    true => "yes",
                    false => "no",
                }
            );
            if self.size == true {
                let size = match e.size {
                    Some(s) => format!("{:.3}", s),
                    None => String::from("-"),
                };
                row.push_str(&format!("{:<11}", size));
            }
            if self.versions == true {
                row.push_str(&e.installed.join(", "));
            }
            table.push_str(row.trim_end());
            table.push('\n');
        }
        table
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::descriptor::{DescriptorInfo, DescriptorKind};
    use crate::core::package::testing::write_package;
    use tempfile::tempdir;

    #[test]
    fn fmt_table_empty() {
        let t = List::new().fmt_table(&[]);
        let table = "\
Name                        Version       Type        Enabled
--------------------------- ------------- ----------- --------
";
        assert_eq!(t, table);
    }

    #[test]
    fn lists_environment() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        write_package(manager.packages_path(), "core", Some("1.0.0"));
        write_package(manager.packages_path(), "core", Some("1.2.0"));
        manager
            .resolver()
            .create_environment_file(&[
                DescriptorInfo::new()
                    .name("core")
                    .version("1.2.0")
                    .kind(DescriptorKind::Installed),
                DescriptorInfo::new()
                    .name("extra")
                    .version("0.1.0")
                    .kind(DescriptorKind::Installed)
                    .enable(false),
            ])
            .unwrap();

        let text = List::new().versions(true).run(&manager).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("Installed"));
        assert!(lines[2].starts_with("core"));
        assert!(lines[2].ends_with("1.0.0, 1.2.0"));
        assert!(lines[3].starts_with("extra"));
        assert!(lines[3].contains(" no"));
    }

    #[test]
    fn size_of_missing_package() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        write_package(manager.packages_path(), "core", Some("1.0.0"));
        manager
            .resolver()
            .create_environment_file(&[
                DescriptorInfo::new()
                    .name("core")
                    .version("1.0.0")
                    .kind(DescriptorKind::Installed),
                DescriptorInfo::new()
                    .name("gone")
                    .version("1.0.0")
                    .kind(DescriptorKind::Installed),
            ])
            .unwrap();

        let text = List::new().size(true).run(&manager).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].starts_with("core") && lines[2].ends_with("-") == false);
        assert!(lines[3].ends_with("-"));
    }
}
