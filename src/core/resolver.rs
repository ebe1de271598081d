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


//! Reads the environment file, finds installed packages and applies their
//! environments to the running process.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::descriptor::{Descriptor, DescriptorInfo, DescriptorKind, Resolution};
use crate::core::host::Host;
use crate::core::manager::Layout;
use crate::core::package::{self, event, Package, PACKAGE_FILE};
use crate::core::requirement::RequirementsList;
use crate::core::token::TokenTable;
use crate::core::version::{self, AnyVersion, LooseVersion};
use crate::error::{Error, Hint, LastError};
use crate::util::environment::{self, Environment};
use crate::util::environment::{
    TPDCC_PACKAGE_OVERRIDE_VERSION_FILE, TPDCC_PACKAGE_OVERRIDE_VERSION_PATH,
    TPDCC_PACKAGE_VERSION_FILE, TPDCC_PACKAGE_VERSION_PATH,
};
use crate::util::filesystem;
use crate::util::profile::{self, Profiler};

pub const ENV_FOLDER: &str = "env";
pub const ENVIRONMENT_FILE: &str = "package_version.config";
pub const OVERRIDE_FILE: &str = "package_version.override";

const OVERRIDE_REQUIREMENTS_KEY: &str = "requirements";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOptions {
    /// Write the solved variables into the process environment.
    pub apply: bool,
    /// Run the packages' startup command scripts.
    pub run_commands: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            apply: true,
            run_commands: true,
        }
    }
}

#[derive(Debug)]
pub struct Resolver {
    layout: Layout,
    dev: bool,
    host: Host,
    host_version: Option<String>,
    project: Option<String>,
    site_packages: Option<PathBuf>,
    profiler: Option<Profiler>,
    /// Loaded packages in the order they were first seen.
    cache: Vec<Package>,
}

impl Resolver {
    pub fn new(layout: Layout, dev: bool) -> Self {
        Self {
            layout,
            dev,
            host: Host::Standalone,
            host_version: None,
            project: None,
            site_packages: None,
            profiler: None,
            cache: Vec::new(),
        }
    }

    pub fn host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }

    pub fn host_version(mut self, version: Option<String>) -> Self {
        self.host_version = version;
        self
    }

    pub fn project(mut self, project: Option<String>) -> Self {
        self.project = project.filter(|p| p.is_empty() == false);
        self
    }

    pub fn site_packages(mut self, path: Option<PathBuf>) -> Self {
        self.site_packages = path;
        self
    }

    pub fn profiler(mut self, profiler: Option<Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn root_path(&self) -> &Path {
        self.layout.root()
    }

    pub fn config_path(&self) -> &Path {
        self.layout.config()
    }

    pub fn packages_path(&self) -> &Path {
        self.layout.packages()
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn get_host(&self) -> Host {
        self.host
    }

    pub fn get_host_version(&self) -> Option<&str> {
        self.host_version.as_deref()
    }

    pub fn get_project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn get_profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    /// The location a new environment file is written to.
    pub fn default_environment_path(&self) -> PathBuf {
        let file = Environment::read(TPDCC_PACKAGE_VERSION_FILE)
            .unwrap_or(String::from(ENVIRONMENT_FILE));
        self.layout.config().join(ENV_FOLDER).join(file)
    }

    fn discover_environment_path(&self) -> PathBuf {
        if let Some(p) = Environment::read(TPDCC_PACKAGE_VERSION_PATH) {
            let defined = filesystem::expand_home(&p);
            if defined.is_file() == true {
                tracing::debug!("loading package environment configuration from {:?}", defined);
                return defined;
            }
        }
        self.default_environment_path()
    }

    /// Returns the environment file.
    ///
    /// Errors if the file does not exist.
    pub fn environment_path(&self) -> Result<PathBuf, Error> {
        let path = self.discover_environment_path();
        match path.is_file() {
            true => Ok(path),
            false => Err(Error::MissingEnvironmentPath(path)),
        }
    }

    /// Returns the override file location, whether or not it exists.
    pub fn override_environment_path(&self) -> PathBuf {
        if let Some(p) = Environment::read(TPDCC_PACKAGE_OVERRIDE_VERSION_PATH) {
            let defined = filesystem::expand_home(&p);
            if defined.is_file() == true {
                return defined;
            }
        }
        let file = Environment::read(TPDCC_PACKAGE_OVERRIDE_VERSION_FILE)
            .unwrap_or(String::from(OVERRIDE_FILE));
        self.layout.config().join(ENV_FOLDER).join(file)
    }

    /// Reads the descriptors listed in an environment file, in file order.
    pub fn read_environment_file(path: &Path) -> Result<Vec<DescriptorInfo>, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_access(path, e))?;
        if text.trim().is_empty() == true {
            return Ok(Vec::new());
        }
        let bad_syntax = |e: serde_yaml::Error| Error::BadFileSyntax(path.to_path_buf(), LastError(e.to_string()));
        let map: Option<serde_yaml::Mapping> = serde_yaml::from_str(&text).map_err(bad_syntax)?;
        let mut infos = Vec::new();
        for (key, value) in map.unwrap_or_default() {
            let name = match key {
                serde_yaml::Value::String(s) => s,
                other => serde_yaml::to_string(&other).map_err(bad_syntax)?.trim().to_string(),
            };
            let mut info: DescriptorInfo = match value {
                serde_yaml::Value::Null => DescriptorInfo::new(),
                v => serde_yaml::from_value(v).map_err(bad_syntax)?,
            };
            info.set_name(&name);
            infos.push(info);
        }
        Ok(infos)
    }

    /// Writes descriptors to an environment file, keyed by name.
    pub fn write_environment_file(path: &Path, infos: &[DescriptorInfo]) -> Result<(), Error> {
        let bad_syntax = |e: serde_yaml::Error| Error::BadFileSyntax(path.to_path_buf(), LastError(e.to_string()));
        let mut map = serde_yaml::Mapping::new();
        for info in infos {
            let value = serde_yaml::to_value(info).map_err(bad_syntax)?;
            map.insert(
                serde_yaml::Value::String(info.get_name().unwrap_or("").to_string()),
                value,
            );
        }
        let text = match map.is_empty() {
            true => String::new(),
            false => serde_yaml::to_string(&map).map_err(bad_syntax)?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::file_access(parent, e))?;
        }
        std::fs::write(path, text).map_err(|e| Error::file_access(path, e))
    }

    /// Reads the override entries as `(name, version)` pairs.
    ///
    /// Entries are written either as a list of `"<url>: <version>"` strings or
    /// as a map of url to version. The name is the file stem of the url.
    pub fn read_override_file(path: &Path) -> Result<Vec<(String, String)>, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_access(path, e))?;
        let data: Option<serde_yaml::Value> = serde_yaml::from_str(&text)
            .map_err(|e| Error::BadFileSyntax(path.to_path_buf(), LastError(e.to_string())))?;
        let reqs = match data.as_ref().and_then(|d| d.get(OVERRIDE_REQUIREMENTS_KEY)) {
            Some(r) => r.clone(),
            None => return Ok(Vec::new()),
        };
        let pairs: Vec<(String, String)> = match reqs {
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .filter_map(|item| match item {
                    serde_yaml::Value::String(s) => s
                        .split_once(": ")
                        .map(|(u, v)| (u.trim().to_string(), v.trim().to_string())),
                    serde_yaml::Value::Mapping(m) => m.iter().next().map(|(u, v)| {
                        (scalar(u), scalar(v))
                    }),
                    _ => None,
                })
                .collect(),
            serde_yaml::Value::Mapping(m) => m.iter().map(|(u, v)| (scalar(u), scalar(v))).collect(),
            _ => Vec::new(),
        };
        Ok(pairs
            .into_iter()
            .map(|(url, v)| (override_id(&url), v))
            .collect())
    }

    /// Merges override entries into `infos`: each named package is enabled and
    /// pinned to the override version. Unknown names are appended.
    pub fn apply_overrides(infos: &mut Vec<DescriptorInfo>, overrides: Vec<(String, String)>) {
        for (name, version) in overrides {
            match infos.iter_mut().find(|i| i.get_name() == Some(name.as_str())) {
                Some(info) => {
                    info.set_enable(true);
                    info.set_version(&version);
                }
                None => infos.push(DescriptorInfo::new().name(&name).version(&version)),
            }
        }
    }

    /// Loads the environment file with the override file merged on top.
    pub fn load_environment_file(&self) -> Result<Vec<DescriptorInfo>, Error> {
        let env_path = self.environment_path()?;
        tracing::debug!("loading environment: {:?}", env_path);
        let mut infos = Self::read_environment_file(&env_path)?;
        let override_path = self.override_environment_path();
        if override_path.is_file() == true {
            tracing::debug!("loading override environment: {:?}", override_path);
            Self::apply_overrides(&mut infos, Self::read_override_file(&override_path)?);
        }
        Ok(infos)
    }

    /// Creates the environment file holding `infos` unless it already exists.
    ///
    /// Returns `true` if a file was written.
    pub fn create_environment_file(&self, infos: &[DescriptorInfo]) -> Result<bool, Error> {
        let path = self.default_environment_path();
        match path.exists() {
            true => Ok(false),
            false => {
                tracing::debug!("creating new environment file: {:?}", path);
                Self::write_environment_file(&path, infos)?;
                Ok(true)
            }
        }
    }

    /// Adds or replaces the entry for `info` in the environment file.
    pub fn update_environment_descriptor(&self, info: &DescriptorInfo) -> Result<(), Error> {
        let path = match self.environment_path() {
            Ok(p) => p,
            Err(Error::MissingEnvironmentPath(_)) => {
                self.create_environment_file(&[info.clone()])?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let mut infos = Self::read_environment_file(&path)?;
        match infos.iter_mut().find(|i| i.get_name() == info.get_name()) {
            Some(existing) => *existing = info.clone(),
            None => infos.push(info.clone()),
        }
        tracing::debug!("updating environment {:?} with {}", path, info);
        Self::write_environment_file(&path, &infos)
    }

    /// Removes the entry `name` from the environment file.
    pub fn remove_descriptor_from_environment(&self, name: &str) -> Result<(), Error> {
        let path = self.environment_path()?;
        let mut infos = Self::read_environment_file(&path)?;
        let before = infos.len();
        infos.retain(|i| i.get_name() != Some(name));
        if infos.len() == before {
            tracing::error!("descriptor {} does not exist in current environment", name);
            return Err(Error::MissingPackage(name.to_string(), Hint::ListPackages));
        }
        Self::write_environment_file(&path, &infos)
    }

    fn glob_paths(pattern: &Path) -> Vec<PathBuf> {
        match glob::glob(&pattern.display().to_string()) {
            Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
            Err(e) => {
                tracing::warn!("invalid package search pattern {:?}: {}", pattern, e);
                Vec::new()
            }
        }
    }

    /// Finds manifest files for `name` at `version` in the packages folder.
    ///
    /// In dev mode, and as a fallback when the version is not installed, the
    /// unversioned checkout `<packages>/<name>/package.yaml` is used. The
    /// version `latest` selects the highest installed version.
    pub fn search_for_package(&self, name: &str, version: &str) -> Vec<PathBuf> {
        let base = self.layout.packages().join(glob::Pattern::escape(name));
        let dev_path = base.join(PACKAGE_FILE);
        tracing::debug!(
            "searching package ({} | {}) in {:?}, dev: {}",
            name,
            version,
            self.layout.packages(),
            self.dev
        );
        if self.dev == true {
            return Self::glob_paths(&dev_path);
        }
        let target = version.parse::<AnyVersion>().unwrap_or(AnyVersion::Latest);
        let found = match target.is_latest() {
            true => {
                let installed = self.installed_versions(name);
                let space: Vec<&str> = installed.iter().map(|v| v.as_str()).collect();
                match version::get_target_version(&target, &space) {
                    Some(v) => Self::glob_paths(&base.join(glob::Pattern::escape(v)).join(PACKAGE_FILE)),
                    None => Vec::new(),
                }
            }
            false => Self::glob_paths(&base.join(glob::Pattern::escape(version)).join(PACKAGE_FILE)),
        };
        if found.is_empty() == false {
            return found;
        }
        tracing::debug!("no package found, trying to find package {} in development environment", name);
        Self::glob_paths(&dev_path)
    }

    /// Orders a `<version>/package.yaml` path by its version directory.
    fn version_dir(manifest: &Path) -> LooseVersion {
        LooseVersion::new(
            &manifest
                .parent()
                .and_then(|p| p.file_name())
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
    }

    /// Lists the versions installed for `name`.
    pub fn installed_versions(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<String> = Self::glob_paths(
            &self
                .layout
                .packages()
                .join(glob::Pattern::escape(name))
                .join("*")
                .join(PACKAGE_FILE),
        )
        .iter()
        .map(|p| Self::version_dir(p).to_string())
        .collect();
        versions.sort_by(|a, b| LooseVersion::new(a).cmp(&LooseVersion::new(b)));
        versions
    }

    /// Loads the package at `path`, which may be the manifest or its folder.
    pub fn package_from_path(&self, path: &Path) -> Result<Package, Error> {
        Package::load(path)
    }

    /// Walks up from `file` looking for the package that contains it.
    pub fn package_for_file(&self, file: &Path, max_iterations: usize) -> Option<Package> {
        let mut search = file.parent();
        for _ in 0..max_iterations {
            let dir = search?;
            if dir.join(PACKAGE_FILE).is_file() == true {
                return self.package_from_path(&dir.join(PACKAGE_FILE)).ok();
            }
            search = dir.parent();
        }
        None
    }

    /// Finds the package a descriptor points to, preferring the cached copy.
    pub fn package_for_descriptor(&self, descriptor: &Descriptor) -> Option<Package> {
        let pkg = match descriptor.kind() {
            DescriptorKind::Path => {
                let path = descriptor.path(self.root_path())?;
                self.package_from_path(&path).ok()?
            }
            _ => {
                let paths = self.search_for_package(descriptor.name(), descriptor.version());
                self.package_from_path(paths.first()?).ok()?
            }
        };
        match self.cached(&pkg.search_str()) {
            Some(c) => Some(c.clone()),
            None => Some(pkg),
        }
    }

    /// Finds the installed copy of `pkg` in the packages folder.
    pub fn existing_package(&mut self, pkg: &Package) -> Option<Package> {
        if let Some(c) = self.cached(&pkg.search_str()) {
            return Some(c.clone());
        }
        let paths = self.search_for_package(pkg.name(), pkg.version());
        let found = self.package_from_path(paths.first()?).ok()?;
        self.cache_insert(found.clone());
        Some(found)
    }

    fn cached(&self, id: &str) -> Option<&Package> {
        self.cache.iter().find(|p| p.search_str() == id)
    }

    pub fn package_by_name(&self, name: &str) -> Option<&Package> {
        self.cache.iter().find(|p| p.name() == name)
    }

    pub fn cache(&self) -> &[Package] {
        &self.cache
    }

    /// Stores `pkg` in the cache, replacing a package with the same name and version.
    pub fn cache_insert(&mut self, pkg: Package) {
        match self.cache.iter_mut().find(|p| p.search_str() == pkg.search_str()) {
            Some(existing) => *existing = pkg,
            None => self.cache.push(pkg),
        }
    }

    /// Marks each requirement as valid only when a matching package is installed.
    pub fn validate_requirements(&self, reqs: &mut RequirementsList) {
        for req in reqs.iter_mut() {
            let version = match req.version().is_empty() {
                true => version::LATEST,
                false => req.version(),
            };
            let found = self.search_for_package(req.name(), version).is_empty() == false;
            req.set_valid(found);
        }
    }

    /// Resolves the environment file, with overrides applied.
    pub fn resolve_environment(&mut self, opts: ResolveOptions) -> Result<Vec<Package>, Error> {
        let requests = self.load_environment_file()?;
        self.resolve(requests, opts)
    }

    /// Resolves the environment described by the file at `path`.
    pub fn resolve_from_path(
        &mut self,
        path: &Path,
        apply_override: bool,
        opts: ResolveOptions,
    ) -> Result<Vec<Package>, Error> {
        tracing::debug!("reading environment configuration file: {:?}", path);
        let mut requests = Self::read_environment_file(path)?;
        if apply_override == true {
            let override_path = self.override_environment_path();
            if override_path.is_file() == true {
                Self::apply_overrides(&mut requests, Self::read_override_file(&override_path)?);
            }
        }
        self.resolve(requests, opts)
    }

    /// Finds the package for every enabled request and solves their environments.
    ///
    /// Every resolved package can reference the others through `{dep.<name>}`
    /// tokens. With `apply`, startup commands then run with each package's
    /// requirements started before the package itself.
    pub fn resolve(
        &mut self,
        requests: Vec<DescriptorInfo>,
        opts: ResolveOptions,
    ) -> Result<Vec<Package>, Error> {
        if requests.is_empty() == true {
            tracing::warn!("no packages to resolve");
            return Ok(Vec::new());
        }
        let profiler = self.profiler.clone();
        let resolved = profile::timed(profiler.as_ref(), "resolve", || {
            self.resolve_packages(requests, opts.apply)
        })?;
        if opts.apply == false {
            return Ok(resolved);
        }
        if let Some(site) = &self.site_packages {
            if site.is_dir() == true {
                environment::add_to_env("PYTHONPATH", &[site.display().to_string()]);
            }
        }
        if opts.run_commands == true {
            profile::timed(profiler.as_ref(), "startup", || self.run_startup(&resolved))?;
        }
        Ok(resolved)
    }

    fn resolve_packages(&mut self, requests: Vec<DescriptorInfo>, apply: bool) -> Result<Vec<Package>, Error> {
        let mut found: Vec<Package> = Vec::new();
        for info in requests {
            let mut descriptor = Descriptor::from_info(info)?;
            tracing::debug!("descriptor for package {} found: {}", descriptor.name(), descriptor.info());
            if descriptor.is_enabled() == false {
                tracing::info!("package {} is not enabled", descriptor.name());
                continue;
            }
            if descriptor.kind() != DescriptorKind::Path {
                let id = Package::name_from_package_name_and_version(descriptor.name(), descriptor.version());
                if let Some(existing) = self.cached(&id) {
                    found.push(existing.clone());
                    continue;
                }
            }
            match descriptor.resolve(self)? {
                Resolution::Resolved(pkg) => found.push(pkg),
                Resolution::Remote => {
                    tracing::warn!(descriptor = %descriptor.info(), "package {} is not installed", descriptor.name())
                }
                Resolution::Unresolved(reason) => {
                    tracing::warn!(descriptor = %descriptor.info(), "failed to resolve package {}: {}", descriptor.name(), reason)
                }
            }
        }

        let host_version = self.host_version.clone();
        found.retain(|pkg| match pkg.is_compatible(self.host, host_version.as_deref()) {
            true => true,
            false => {
                tracing::debug!("skipping package {} since it is not compatible with {}", pkg.name(), self.host);
                false
            }
        });

        let mut tokens = package::context_tokens(self.host, host_version.as_deref(), self.project.as_deref());
        found.iter().for_each(|pkg| {
            tokens.add(&format!("dep.{}", pkg.name()), &pkg.root().display().to_string());
        });

        let mut resolved = Vec::with_capacity(found.len());
        for mut pkg in found {
            match self.cached(&pkg.search_str()) {
                Some(c) if c.is_resolved() == true => resolved.push(c.clone()),
                _ => {
                    Self::resolve_package(&mut pkg, &tokens, apply);
                    self.cache_insert(pkg.clone());
                    resolved.push(pkg);
                }
            }
        }
        Ok(resolved)
    }

    fn resolve_package(pkg: &mut Package, tokens: &TokenTable, apply: bool) {
        pkg.resolve(tokens, apply);
    }

    /// Runs startup commands, each package's requirements first.
    fn run_startup(&self, packages: &[Package]) -> Result<(), Error> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        for pkg in packages {
            for req in pkg.requirements().iter() {
                if let Some(dep) = self.package_by_name(req.name()) {
                    if visited.insert(dep.search_str()) == true {
                        self.start_package(dep)?;
                    }
                }
            }
            if visited.insert(pkg.search_str()) == true {
                self.start_package(pkg)?;
            }
        }
        Ok(())
    }

    fn start_package(&self, pkg: &Package) -> Result<(), Error> {
        if pkg.requires_project() == true && self.project.is_none() {
            return Err(Error::ProjectNotDefined(pkg.name().to_string(), Hint::DefineProject));
        }
        match pkg.run_command(event::STARTUP) {
            Ok(_) => Ok(()),
            Err(e) => match pkg.is_required() {
                true => {
                    tracing::error!("was not possible to resolve required package {}", pkg.name());
                    Err(e)
                }
                false => {
                    tracing::error!("exception while loading package {}: {}", pkg.name(), e);
                    Ok(())
                }
            },
        }
    }

    /// Runs the shutdown commands of every resolved package.
    ///
    /// Failures are logged and do not stop the remaining packages.
    pub fn shutdown(&self) {
        tracing::debug!("shutting down packages resolver");
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let stop = |pkg: &Package| {
            if let Err(e) = pkg.run_command(event::SHUTDOWN) {
                tracing::error!("exception while unloading package {}: {}", pkg.name(), e);
            }
        };
        for pkg in self.cache.iter().filter(|p| p.is_resolved() == true) {
            for req in pkg.requirements().iter() {
                if let Some(dep) = self.package_by_name(req.name()) {
                    if dep.is_resolved() == true && visited.insert(dep.search_str()) == true {
                        stop(dep);
                    }
                }
            }
            if visited.insert(pkg.search_str()) == true {
                stop(pkg);
            }
        }
    }
}

fn scalar(value: &serde_yaml::Value) -> String {
    package::scalar_to_string(value).trim().to_string()
}

/// Derives a package name from an override url (`.../tp-core.git` -> `tp-core`).
fn override_id(url: &str) -> String {
    let base = url
        .trim_end_matches(|c| c == '/' || c == '\\')
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(url);
    match base.rsplit_once('.') {
        Some((stem, _)) if stem.is_empty() == false => stem.to_string(),
        _ => base.to_string(),
    }
}
