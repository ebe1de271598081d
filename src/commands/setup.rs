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


use crate::commands::helps::setup;
use crate::core::context::Context;
use crate::core::manager::{PackagesManager, CONFIG_FOLDER, PACKAGES_FOLDER};
use crate::core::package::PACKAGE_FILE;
use crate::core::resolver::{Resolver, ENVIRONMENT_FILE, ENV_FOLDER};
use crate::error::{Error, Hint};
use crate::util::anyerror::{AnyError, Fault};
use crate::util::filesystem::{self, FILE_FILTER_EXCLUDE};
use std::path::{Path, PathBuf};

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct Setup {
    destination: PathBuf,
    force: bool,
    include_git: bool,
}

impl Subcommand<Context> for Setup {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(setup::HELP))?;
        Ok(Setup {
            // Flags
            force: cli.check(Arg::flag("force"))?,
            include_git: cli.check(Arg::flag("include_git"))?,
            // Options
            destination: cli.require(Arg::option("destination").value("path"))?,
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let manager = c.manager()?;
        let dest = self.run(&manager)?;
        println!("info: framework copied to {}", dest.display());
        Ok(())
    }
}

impl Setup {
    pub fn new(destination: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            force: false,
            include_git: false,
        }
    }

    pub fn force(mut self, flag: bool) -> Self {
        self.force = flag;
        self
    }

    pub fn include_git(mut self, flag: bool) -> Self {
        self.include_git = flag;
        self
    }

    fn ignores(&self) -> Vec<&'static str> {
        FILE_FILTER_EXCLUDE
            .iter()
            .filter(|p| self.include_git == false || **p != ".git/")
            .map(|p| *p)
            .collect()
    }

    /// Copies the framework managed by `manager` into the destination.
    ///
    /// Returns the destination directory.
    pub fn run(&self, manager: &PackagesManager) -> Result<PathBuf, Fault> {
        let dest = filesystem::normalize(&self.destination);
        if filesystem::is_subpath(manager.root_path(), &dest) == true {
            return Err(AnyError(format!(
                "destination {:?} cannot be inside the framework root {:?}",
                dest,
                manager.root_path()
            )))?;
        }
        // covers the root itself and any of its ancestors, which --force would wipe
        if filesystem::is_subpath(&dest, manager.root_path()) == true {
            return Err(AnyError(format!(
                "destination {:?} cannot contain the framework root {:?}",
                dest,
                manager.root_path()
            )))?;
        }
        if dest.exists() == true {
            match self.force {
                true => {
                    tracing::info!("removing existing destination {:?}", dest);
                    filesystem::remove_dir(&dest)?;
                }
                false => return Err(Error::DestinationExists(dest, Hint::SetupForce))?,
            }
        }
        let ignores = self.ignores();

        tracing::debug!("copying framework from {:?} to {:?}", manager.root_path(), dest);
        let config = dest.join(CONFIG_FOLDER);
        match manager.config_path().is_dir() {
            true => filesystem::copy(manager.config_path(), &config, &ignores)?,
            false => std::fs::create_dir_all(&config)?,
        }
        match manager.packages_path().is_dir() {
            true => filesystem::copy(manager.packages_path(), &dest.join(PACKAGES_FOLDER), &ignores)?,
            false => std::fs::create_dir_all(dest.join(PACKAGES_FOLDER))?,
        }
        let manifest = manager.root_path().join(PACKAGE_FILE);
        if manifest.is_file() == true {
            std::fs::copy(&manifest, dest.join(PACKAGE_FILE))?;
        }

        let env_file = config.join(ENV_FOLDER).join(ENVIRONMENT_FILE);
        if env_file.exists() == false {
            Resolver::write_environment_file(&env_file, &[])?;
        }
        Ok(dest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::package::testing::write_package;
    use crate::util::anyerror::is_error;
    use tempfile::tempdir;

    fn framework(root: &Path) -> PackagesManager {
        write_package(&root.join(PACKAGES_FOLDER), "core", Some("1.0.0"));
        let git = root.join(PACKAGES_FOLDER).join("core").join("1.0.0").join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main").unwrap();
        std::fs::create_dir_all(root.join(CONFIG_FOLDER)).unwrap();
        std::fs::write(root.join(CONFIG_FOLDER).join("trellis.toml"), "[general]\n").unwrap();
        PackagesManager::new(root, false).unwrap()
    }

    #[test]
    fn copies_framework() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let manager = framework(src.path());
        let dest = out.path().join("copy");

        let result = Setup::new(&dest).run(&manager).unwrap();
        assert!(result.join(CONFIG_FOLDER).join("trellis.toml").is_file());
        let pkg = result.join(PACKAGES_FOLDER).join("core").join("1.0.0");
        assert!(pkg.join(PACKAGE_FILE).is_file());
        assert!(pkg.join(".git").exists() == false);
        let env_file = result.join(CONFIG_FOLDER).join(ENV_FOLDER).join(ENVIRONMENT_FILE);
        assert_eq!(std::fs::read_to_string(env_file).unwrap(), "");
    }

    #[test]
    fn include_git_folders() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let manager = framework(src.path());
        let dest = out.path().join("copy");

        Setup::new(&dest).include_git(true).run(&manager).unwrap();
        let git = dest.join(PACKAGES_FOLDER).join("core").join("1.0.0").join(".git");
        assert!(git.join("HEAD").is_file());
    }

    #[test]
    fn existing_destination_needs_force() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let manager = framework(src.path());
        std::fs::write(out.path().join("stale.txt"), "old").unwrap();

        let err = Setup::new(out.path()).run(&manager).unwrap_err();
        assert!(is_error(
            &err,
            &Error::DestinationExists(filesystem::normalize(out.path()), Hint::SetupForce)
        ));

        Setup::new(out.path()).force(true).run(&manager).unwrap();
        assert!(out.path().join("stale.txt").exists() == false);
        assert!(out.path().join(PACKAGES_FOLDER).is_dir());
    }

    #[test]
    fn destination_inside_root() {
        let src = tempdir().unwrap();
        let manager = framework(src.path());
        assert!(Setup::new(&src.path().join("nested")).run(&manager).is_err());
    }

    #[test]
    fn destination_containing_root() {
        let out = tempdir().unwrap();
        let root = out.path().join("framework");
        let manager = framework(&root);
        let pkg = root.join(PACKAGES_FOLDER).join("core").join("1.0.0").join(PACKAGE_FILE);

        assert!(Setup::new(out.path()).force(true).run(&manager).is_err());
        assert!(Setup::new(&root).force(true).run(&manager).is_err());
        assert!(Setup::new(&root.join("..").join("framework")).force(true).run(&manager).is_err());
        assert!(pkg.is_file());
        assert!(root.join(CONFIG_FOLDER).join("trellis.toml").is_file());
    }
}
