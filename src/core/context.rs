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


use crate::core::host::Host;
use crate::core::manager::PackagesManager;
use crate::util::anyerror::Fault;
use crate::util::environment::{self, Environment};
use crate::util::environment::{TPDCC_PROJECT, TP_DCC_PIPELINE_ROOT_DIRECTORY};
use crate::util::filesystem;
use crate::util::profile::Profiler;
use std::path::{Path, PathBuf};

/// The runtime settings shared by every command.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    root: PathBuf,
    dev: bool,
    host: Host,
    host_version: Option<String>,
    project: Option<String>,
    profiler: Option<Profiler>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            root: PathBuf::new(),
            dev: false,
            host: Host::Standalone,
            host_version: None,
            project: None,
            profiler: None,
        }
    }

    /// Sets the framework root.
    ///
    /// Without an explicit `root`, the root is read from `key` and then
    /// defaults to the current working directory.
    pub fn root(mut self, root: Option<PathBuf>, key: &str) -> Result<Self, Fault> {
        self.root = match root {
            Some(r) => r,
            None => match Environment::read(key) {
                Some(r) if r.is_empty() == false => filesystem::expand_home(&r),
                _ => std::env::current_dir()?,
            },
        };
        Ok(self)
    }

    pub fn dev(mut self, flag: bool, key: &str) -> Self {
        self.dev = flag || environment::is_truthy(key);
        self
    }

    pub fn host(mut self) -> Self {
        self.host = Host::from_env();
        self.host_version = Host::version_from_env();
        self
    }

    pub fn project(mut self, key: &str) -> Self {
        self.project = Environment::read(key).filter(|p| p.is_empty() == false);
        self
    }

    pub fn profiler(mut self) -> Self {
        self.profiler = Profiler::from_env();
        self
    }

    /// Builds the context from the process environment.
    pub fn from_env(root: Option<PathBuf>, dev: bool) -> Result<Self, Fault> {
        Ok(Self::new()
            .root(root, TP_DCC_PIPELINE_ROOT_DIRECTORY)?
            .dev(dev, environment::TPDCC_DEV)
            .host()
            .project(TPDCC_PROJECT)
            .profiler())
    }

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn get_host(&self) -> Host {
        self.host
    }

    pub fn get_profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    /// Opens the packages manager for the context's root.
    pub fn manager(&self) -> Result<PackagesManager, Fault> {
        Ok(PackagesManager::new(&self.root, self.dev)?
            .with_host(self.host, self.host_version.clone())
            .with_project(self.project.clone())
            .with_profiler(self.profiler.clone()))
    }
}
