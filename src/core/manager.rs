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


//! The entry point to a framework installation: locates its folders, reads its
//! configuration and owns the resolver.

use std::path::{Path, PathBuf};

use crate::core::config::{Config, Configs};
use crate::core::descriptor::{Descriptor, DescriptorInfo};
use crate::core::host::Host;
use crate::core::package::{self, Package, PACKAGE_FILE};
use crate::core::resolver::{ResolveOptions, Resolver, ENV_FOLDER};
use crate::core::token::{self, TokenTable};
use crate::core::version::DEV_VERSION;
use crate::error::{Error, LastError};
use crate::util::anyerror::Fault;
use crate::util::environment::{self, Environment};
use crate::util::environment::{
    TPDCC_ADMIN, TPDCC_CACHE_FOLDER, TPDCC_ENV_DEV, TPDCC_PACKAGES_PATH, TPDCC_PROJECT,
    TP_DCC_PIPELINE_SITE_PACKAGES,
};
use crate::util::filesystem;
use crate::util::profile::Profiler;

pub const CONFIG_FOLDER: &str = "config";
pub const PACKAGES_FOLDER: &str = "packages";
pub const INSTALL_FOLDER: &str = "install";

pub const PREFERENCE_ROOTS_FILE: &str = "preference_roots.config";
const USER_PREFERENCES_KEY: &str = "user_preferences";

/// Walk-up limit when searching for the package that owns a file.
const MAX_PACKAGE_DEPTH: usize = 20;

/// The folders of a framework installation.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    root: PathBuf,
    config: PathBuf,
    packages: PathBuf,
}

impl Layout {
    pub fn new(root: PathBuf, config: PathBuf, packages: PathBuf) -> Self {
        Self {
            root,
            config,
            packages,
        }
    }

    /// Finds the config and packages folders for the installation at `root`.
    ///
    /// Packages live under `<root>/install/packages` when an `install` folder
    /// exists (ignored in dev mode), otherwise under `<root>/packages`. When
    /// neither exists the installation is assumed to sit two levels above.
    pub fn discover(root: &Path, dev: bool) -> Self {
        let install = root.join(INSTALL_FOLDER);
        let install = match install.is_dir() == false || dev == true {
            true => root.to_path_buf(),
            false => install,
        };
        let packages = install.join(PACKAGES_FOLDER);
        if packages.is_dir() == true {
            return Self::new(root.to_path_buf(), root.join(CONFIG_FOLDER), packages);
        }
        if let Some(parent) = install.parent().and_then(|p| p.parent()) {
            let packages = parent.join(PACKAGES_FOLDER);
            if packages.is_dir() == true {
                return Self::new(parent.to_path_buf(), parent.join(CONFIG_FOLDER), packages);
            }
        }
        tracing::warn!("could not find a valid packages folder for root {:?}", root);
        Self::new(root.to_path_buf(), PathBuf::new(), PathBuf::new())
    }

    pub fn packages(&self) -> &Path {
        &self.packages
    }

    pub fn config(&self) -> &Path {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn set_packages(mut self, packages: PathBuf) -> Self {
        self.packages = packages;
        self
    }
}

#[derive(Debug)]
pub struct PackagesManager {
    dev: bool,
    config: Config,
    resolver: Resolver,
}

impl PackagesManager {
    /// Opens the framework installation at `root`.
    ///
    /// Variables from the `[env]` table of the configuration are written into
    /// the process environment.
    pub fn new(root: &Path, dev: bool) -> Result<Self, Fault> {
        if root.exists() == false {
            return Err(Error::MissingRootPath(root.to_path_buf()))?;
        }
        let mut dev = dev || environment::is_truthy(TPDCC_ENV_DEV);
        tracing::debug!("initializing framework from path {:?}, dev: {}", root, dev);
        let mut layout = Layout::discover(root, dev);

        let config = Config::from(Configs::discover(layout.config())?);
        if let Some(general) = config.get_general() {
            if general.is_dev() == Some(true) && dev == false {
                dev = true;
                layout = Layout::discover(root, dev);
            }
        }
        Environment::new().from_config(&config)?.initialize();

        let packages_dir = config
            .get_general()
            .and_then(|g| g.get_packages_dir())
            .map(|p| {
                let table = TokenTable::new().with("root", &layout.root().display().to_string());
                filesystem::resolve_rel_path(layout.root(), &token::substitute(p, &table))
            });
        if let Some(p) = Environment::read(TPDCC_PACKAGES_PATH).filter(|p| p.is_empty() == false) {
            layout = layout.set_packages(filesystem::expand_home(&p));
        } else if let Some(p) = packages_dir {
            layout = layout.set_packages(p);
        }
        tracing::debug!("framework paths: root {:?}, config {:?}, packages {:?}", layout.root(), layout.config(), layout.packages());

        let mut manager = Self {
            dev,
            config,
            resolver: Resolver::new(layout.clone(), dev),
        };
        let site_packages = manager.site_packages_path();
        manager.resolver = Resolver::new(layout, dev)
            .host(Host::from_env())
            .host_version(Host::version_from_env())
            .project(Environment::read(TPDCC_PROJECT))
            .site_packages(site_packages);
        Ok(manager)
    }

    pub fn with_host(self, host: Host, version: Option<String>) -> Self {
        Self {
            resolver: self.resolver.host(host).host_version(version),
            ..self
        }
    }

    pub fn with_project(self, project: Option<String>) -> Self {
        Self {
            resolver: self.resolver.project(project),
            ..self
        }
    }

    pub fn with_profiler(self, profiler: Option<Profiler>) -> Self {
        Self {
            resolver: self.resolver.profiler(profiler),
            ..self
        }
    }

    pub fn root_path(&self) -> &Path {
        self.resolver.root_path()
    }

    pub fn config_path(&self) -> &Path {
        self.resolver.config_path()
    }

    pub fn packages_path(&self) -> &Path {
        self.resolver.packages_path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn is_admin(&self) -> bool {
        environment::is_truthy(TPDCC_ADMIN)
    }

    pub fn set_admin(&mut self, flag: bool) {
        tracing::info!("admin mode set to: {}", flag);
        std::env::set_var(TPDCC_ADMIN, (flag as u8).to_string());
    }

    /// The manifest describing the installation itself.
    pub fn build_package_path(&self) -> PathBuf {
        self.root_path().join(PACKAGE_FILE)
    }

    /// Reads the installation's version, `DEV` when it has no build manifest.
    pub fn build_version(&self) -> String {
        let path = self.build_package_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => return String::from(DEV_VERSION),
        };
        match serde_yaml::from_str::<serde_yaml::Value>(&text) {
            Ok(data) => data
                .get("version")
                .map(package::scalar_to_string)
                .filter(|v| v.is_empty() == false)
                .unwrap_or(String::from(DEV_VERSION)),
            Err(e) => {
                tracing::warn!("failed to read build version from {:?}: {}", path, e);
                String::from(DEV_VERSION)
            }
        }
    }

    pub fn descriptor_from_dict(&self, info: DescriptorInfo) -> Result<Descriptor, Error> {
        Descriptor::from_info(info)
    }

    pub fn descriptor_from_path(&self, location: &str, info: DescriptorInfo) -> Result<Descriptor, Error> {
        Descriptor::from_path(&self.resolver, location, info)
    }

    /// Finds the descriptor named `name` in the environment file.
    pub fn descriptor_from_package_name(&self, name: &str) -> Result<Option<Descriptor>, Error> {
        match self
            .resolver
            .load_environment_file()?
            .into_iter()
            .find(|i| i.get_name() == Some(name))
        {
            Some(info) => Ok(Some(Descriptor::from_info(info)?)),
            None => Ok(None),
        }
    }

    /// Finds the package containing `file`.
    pub fn package_from_path(&self, file: &Path) -> Option<Package> {
        self.resolver.package_for_file(file, MAX_PACKAGE_DEPTH)
    }

    pub fn preference_roots_path(&self) -> PathBuf {
        self.config_path().join(ENV_FOLDER).join(PREFERENCE_ROOTS_FILE)
    }

    pub fn preference_roots_config(&self) -> Result<serde_json::Value, Error> {
        let path = self.preference_roots_path();
        let text = std::fs::read_to_string(&path).map_err(|e| Error::file_access(&path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::BadFileSyntax(path, LastError(e.to_string())))
    }

    /// The folder holding temporary data such as logs and installed libraries.
    ///
    /// `TPDCC_CACHE_FOLDER` takes precedence over the `user_preferences` root
    /// of the preference roots file.
    pub fn cache_folder_path(&self) -> Result<PathBuf, Error> {
        if let Some(p) = Environment::read(TPDCC_CACHE_FOLDER) {
            return Ok(filesystem::expand_home(&p));
        }
        let roots = self.preference_roots_config()?;
        match roots.get(USER_PREFERENCES_KEY).and_then(|v| v.as_str()) {
            Some(prefs) => Ok(filesystem::expand_home(prefs).join("cache")),
            None => Err(Error::BadFileSyntax(
                self.preference_roots_path(),
                LastError(format!("missing key \"{}\"", USER_PREFERENCES_KEY)),
            )),
        }
    }

    /// The folder added to `PYTHONPATH` after a resolve, if one can be determined.
    pub fn site_packages_path(&self) -> Option<PathBuf> {
        if let Some(p) = Environment::read(TP_DCC_PIPELINE_SITE_PACKAGES) {
            return Some(filesystem::expand_home(&p));
        }
        match self.cache_folder_path() {
            Ok(cache) => Some(cache.join("site-packages")),
            Err(e) => {
                tracing::debug!("no site-packages folder available: {}", e);
                None
            }
        }
    }

    /// Shuts the current packages down and opens a fresh manager on the same
    /// root with the environment resolved again.
    pub fn reload(self) -> Result<Self, Fault> {
        self.shutdown();
        let root = self.root_path().to_path_buf();
        let mut manager = Self::new(&root, self.dev)?
            .with_host(self.resolver.get_host(), self.resolver.get_host_version().map(|s| s.to_string()))
            .with_project(self.resolver.get_project().map(|s| s.to_string()))
            .with_profiler(self.resolver.get_profiler().cloned());
        manager.resolver_mut().resolve_environment(ResolveOptions::default())?;
        Ok(manager)
    }

    pub fn shutdown(&self) {
        self.resolver.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::package::testing::write_package;
    use tempfile::tempdir;

    #[test]
    fn discover_plain_layout() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let layout = Layout::discover(dir.path(), false);
        assert_eq!(layout.packages(), dir.path().join(PACKAGES_FOLDER));
        assert_eq!(layout.config(), dir.path().join(CONFIG_FOLDER));
        assert_eq!(layout.root(), dir.path());
    }

    #[test]
    fn discover_install_layout() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(INSTALL_FOLDER).join(PACKAGES_FOLDER)).unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let layout = Layout::discover(dir.path(), false);
        assert_eq!(
            layout.packages(),
            dir.path().join(INSTALL_FOLDER).join(PACKAGES_FOLDER)
        );
        // dev mode ignores the install folder
        let layout = Layout::discover(dir.path(), true);
        assert_eq!(layout.packages(), dir.path().join(PACKAGES_FOLDER));
    }

    #[test]
    fn discover_nested_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let nested = dir.path().join("bootstrap").join("python");
        std::fs::create_dir_all(&nested).unwrap();
        let layout = Layout::discover(&nested, false);
        assert_eq!(layout.root(), dir.path());
        assert_eq!(layout.packages(), dir.path().join(PACKAGES_FOLDER));
    }

    #[test]
    fn discover_nothing() {
        let dir = tempdir().unwrap();
        let layout = Layout::discover(dir.path(), false);
        assert_eq!(layout.packages(), Path::new(""));
    }

    #[test]
    fn missing_root() {
        let dir = tempdir().unwrap();
        let err = PackagesManager::new(&dir.path().join("nope"), false).unwrap_err();
        assert!(crate::util::anyerror::is_error(
            &err,
            &Error::MissingRootPath(dir.path().join("nope"))
        ));
    }

    #[test]
    fn config_packages_dir() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_FOLDER)).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FOLDER).join("trellis.toml"),
            "[general]\npackages-dir = \"{root}/vendor\"\n",
        )
        .unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        assert_eq!(manager.packages_path(), dir.path().join("vendor"));
    }

    #[test]
    fn build_version() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        assert_eq!(manager.build_version(), "DEV");
        std::fs::write(dir.path().join(PACKAGE_FILE), "name: framework\nversion: 2.1\n").unwrap();
        assert_eq!(manager.build_version(), "2.1");
    }

    #[test]
    fn preference_roots() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        let path = manager.preference_roots_path();
        assert!(manager.preference_roots_config().is_err());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let prefs = dir.path().join("prefs");
        std::fs::write(
            &path,
            serde_json::json!({ "user_preferences": prefs.display().to_string() }).to_string(),
        )
        .unwrap();
        if Environment::read(TPDCC_CACHE_FOLDER).is_none() {
            assert_eq!(manager.cache_folder_path().unwrap(), prefs.join("cache"));
        }
    }

    #[test]
    fn admin_mode_round_trip() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PACKAGES_FOLDER)).unwrap();
        let mut manager = PackagesManager::new(dir.path(), false).unwrap();
        manager.set_admin(true);
        assert_eq!(manager.is_admin(), true);
        assert_eq!(Environment::read(TPDCC_ADMIN).as_deref(), Some("1"));
        manager.set_admin(false);
        assert_eq!(manager.is_admin(), false);
        assert_eq!(Environment::read(TPDCC_ADMIN).as_deref(), Some("0"));
        std::env::remove_var(TPDCC_ADMIN);
    }

    #[test]
    fn descriptor_lookup() {
        let dir = tempdir().unwrap();
        let packages = dir.path().join(PACKAGES_FOLDER);
        write_package(&packages, "tp-core", Some("1.0.0"));
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        manager
            .resolver()
            .create_environment_file(&[DescriptorInfo::new()
                .name("tp-core")
                .version("1.0.0")])
            .unwrap();
        let found = manager.descriptor_from_package_name("tp-core").unwrap().unwrap();
        assert_eq!(found.version(), "1.0.0");
        assert!(manager.descriptor_from_package_name("other").unwrap().is_none());
    }

    #[test]
    fn package_owning_file() {
        let dir = tempdir().unwrap();
        let packages = dir.path().join(PACKAGES_FOLDER);
        let pkg_dir = write_package(&packages, "tp-core", Some("1.0.0"));
        let file = pkg_dir.join("src").join("tp").join("core.py");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "").unwrap();
        let manager = PackagesManager::new(dir.path(), false).unwrap();
        assert_eq!(manager.package_from_path(&file).unwrap().name(), "tp-core");
    }
}
