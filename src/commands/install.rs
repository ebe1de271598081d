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


use crate::commands::helps::install;
use crate::core::context::Context;
use crate::core::descriptor::{DescriptorInfo, InstallOptions, Resolution};
use crate::core::manager::PackagesManager;
use crate::error::{Error, Hint};
use crate::util::anyerror::{AnyError, Fault};
use crate::util::profile;
use std::path::PathBuf;

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct InstallPackage {
    path: Option<String>,
    name: Option<String>,
    tag: Option<String>,
    in_place: bool,
}

/// The outcome of an install that did not fail outright.
#[derive(Debug, PartialEq)]
pub enum InstallStatus {
    Installed(PathBuf),
    /// The package could not be resolved; nothing was installed.
    Unresolved {
        descriptor: DescriptorInfo,
        reason: String,
    },
}

impl Subcommand<Context> for InstallPackage {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(install::HELP))?;
        Ok(InstallPackage {
            // Flags
            in_place: cli.check(Arg::flag("in_place"))?,
            // Options
            path: cli.get(Arg::option("path").value("path"))?,
            name: cli.get(Arg::option("name").value("name"))?,
            tag: cli.get(Arg::option("tag").value("tag"))?,
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let mut manager = c.manager()?;
        let status = profile::timed(c.get_profiler(), "install", || self.run(&mut manager))?;
        match status {
            InstallStatus::Installed(root) => {
                println!("info: installed package at {}", root.display());
                Ok(())
            }
            InstallStatus::Unresolved { descriptor, reason } => Err(AnyError(format!(
                "failed to resolve package {}: {}",
                descriptor, reason
            )))?,
        }
    }
}

impl InstallPackage {
    pub fn new(path: Option<&str>) -> Self {
        Self {
            path: path.map(|p| p.to_string()),
            name: None,
            tag: None,
            in_place: false,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn in_place(mut self, flag: bool) -> Self {
        self.in_place = flag;
        self
    }

    /// Checks the arguments and builds the descriptor record they describe.
    ///
    /// A `.git` path needs a tag and a name, checked in that order. Any other
    /// path is recorded on its own.
    pub fn descriptor_info(&self) -> Result<DescriptorInfo, Error> {
        let path = match &self.path {
            Some(p) => p,
            None => {
                return Err(Error::MissingCommandArgument(
                    String::from("path"),
                    Hint::CommandHelp("install"),
                ))
            }
        };
        if path.ends_with(".git") == false {
            return Ok(DescriptorInfo::new().path(path));
        }
        if self.in_place == true {
            return Err(Error::UnsupportedCommandArgument(
                String::from("in_place"),
                Hint::InPlaceLocal,
            ));
        }
        let tag = match &self.tag {
            Some(t) => t,
            None => {
                return Err(Error::MissingCommandArgument(
                    String::from("tag"),
                    Hint::GitInstallArgs,
                ))
            }
        };
        let name = match &self.name {
            Some(n) => n,
            None => {
                return Err(Error::MissingCommandArgument(
                    String::from("name"),
                    Hint::GitInstallArgs,
                ))
            }
        };
        Ok(DescriptorInfo::new().path(path).version(tag).name(name))
    }

    /// Installs the package into `manager`'s environment.
    ///
    /// Argument and installation failures are errors. A package that cannot be
    /// resolved is logged and reported through [InstallStatus::Unresolved].
    pub fn run(&self, manager: &mut PackagesManager) -> Result<InstallStatus, Fault> {
        let info = self.descriptor_info()?;
        let path = info.get_path().unwrap_or("").to_string();
        let mut descriptor = manager.descriptor_from_path(&path, info.clone())?;

        let unresolved = |reason: String| -> Result<InstallStatus, Fault> {
            tracing::error!(descriptor = %info, "failed to resolve package: {}", reason);
            Ok(InstallStatus::Unresolved {
                descriptor: info.clone(),
                reason,
            })
        };
        match descriptor.resolve(manager.resolver()) {
            Ok(Resolution::Resolved(_)) | Ok(Resolution::Remote) => (),
            Ok(Resolution::Unresolved(reason)) => return unresolved(reason),
            Err(e) => return unresolved(e.to_string()),
        }
        let opts = InstallOptions {
            in_place: self.in_place,
        };
        let root = descriptor.install(manager.resolver_mut(), opts)?;
        Ok(InstallStatus::Installed(root))
    }
}
