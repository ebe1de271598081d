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


use crate::commands::helps::uninstall;
use crate::core::context::Context;
use crate::core::manager::PackagesManager;
use crate::error::{Error, Hint};
use crate::util::anyerror::Fault;

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct Uninstall {
    name: String,
    remove: bool,
}

impl Subcommand<Context> for Uninstall {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(uninstall::HELP))?;
        Ok(Uninstall {
            remove: cli.check(Arg::flag("remove"))?,
            name: cli.require(Arg::positional("name"))?,
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let mut manager = c.manager()?;
        match self.run(&mut manager)? {
            true => println!("info: uninstalled package {}", self.name),
            false => println!("info: removed unresolved package {} from the environment", self.name),
        }
        Ok(())
    }
}

impl Uninstall {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            remove: false,
        }
    }

    pub fn remove(mut self, flag: bool) -> Self {
        self.remove = flag;
        self
    }

    /// Takes the package out of the environment file.
    ///
    /// Returns `false` when the entry pointed to nothing that could be
    /// resolved, in which case only the entry is dropped.
    pub fn run(&self, manager: &mut PackagesManager) -> Result<bool, Fault> {
        let mut descriptor = match manager.descriptor_from_package_name(&self.name)? {
            Some(d) => d,
            None => return Err(Error::MissingPackage(self.name.clone(), Hint::ListPackages))?,
        };
        let resolved = match descriptor.resolve(manager.resolver()) {
            Ok(r) => r.is_resolved(),
            Err(e) => {
                tracing::warn!("failed to resolve package {}: {}", self.name, e);
                false
            }
        };
        if resolved == false {
            manager
                .resolver()
                .remove_descriptor_from_environment(&self.name)?;
            return Ok(false);
        }
        descriptor.uninstall(manager.resolver_mut(), self.remove)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::descriptor::{DescriptorInfo, DescriptorKind};
    use crate::core::package::testing::write_package;
    use crate::core::resolver::Resolver;
    use crate::util::anyerror::is_error;
    use tempfile::tempdir;

    fn manager(root: &std::path::Path, infos: &[DescriptorInfo]) -> PackagesManager {
        std::fs::create_dir_all(root.join("packages")).unwrap();
        let manager = PackagesManager::new(root, false).unwrap();
        manager.resolver().create_environment_file(infos).unwrap();
        manager
    }

    fn names(manager: &PackagesManager) -> Vec<String> {
        Resolver::read_environment_file(&manager.resolver().environment_path().unwrap())
            .unwrap()
            .into_iter()
            .filter_map(|i| i.get_name().map(|n| n.to_string()))
            .collect()
    }

    #[test]
    fn unknown_package() {
        let dir = tempdir().unwrap();
        let mut manager = manager(dir.path(), &[]);
        let err = Uninstall::new("ghost").run(&mut manager).unwrap_err();
        assert!(is_error(
            &err,
            &Error::MissingPackage(String::from("ghost"), Hint::ListPackages)
        ));
    }

    #[test]
    fn uninstall_and_remove() {
        let dir = tempdir().unwrap();
        let installed = DescriptorInfo::new()
            .name("core")
            .version("1.0.0")
            .kind(DescriptorKind::Installed);
        let other = DescriptorInfo::new()
            .name("extra")
            .version("2.0.0")
            .kind(DescriptorKind::Installed);
        let mut manager = manager(dir.path(), &[installed, other]);
        let pkg = write_package(manager.packages_path(), "core", Some("1.0.0"));
        write_package(manager.packages_path(), "extra", Some("2.0.0"));

        assert_eq!(Uninstall::new("core").remove(true).run(&mut manager).unwrap(), true);
        assert_eq!(names(&manager), vec!["extra"]);
        assert!(pkg.exists() == false);
        assert!(manager.packages_path().join("core").exists() == false);
    }

    #[test]
    fn uninstall_keeps_files() {
        let dir = tempdir().unwrap();
        let installed = DescriptorInfo::new()
            .name("core")
            .version("1.0.0")
            .kind(DescriptorKind::Installed);
        let mut manager = manager(dir.path(), &[installed]);
        let pkg = write_package(manager.packages_path(), "core", Some("1.0.0"));

        assert_eq!(Uninstall::new("core").run(&mut manager).unwrap(), true);
        assert!(names(&manager).is_empty());
        assert!(pkg.exists() == true);
    }

    #[test]
    fn unresolved_entry_is_dropped() {
        let dir = tempdir().unwrap();
        let missing = DescriptorInfo::new()
            .name("gone")
            .version("3.0.0")
            .kind(DescriptorKind::Installed);
        let mut manager = manager(dir.path(), &[missing]);

        assert_eq!(Uninstall::new("gone").run(&mut manager).unwrap(), false);
        assert!(names(&manager).is_empty());
    }
}
