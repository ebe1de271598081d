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


//! Descriptors say where a package version comes from: the local packages
//! tree, a directory on disk, or a remote git repository.

use serde_derive::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::git::{has_git, ExtGit, GitBackend, RepoChecker};
use crate::core::package::Package;
use crate::core::resolver::Resolver;
use crate::core::token::{self, TokenTable};
use crate::core::version::DEV_VERSION;
use crate::error::{Error, LastError};
use crate::util::anyerror::{AnyError, Fault};
use crate::util::filesystem;

/// Token in a descriptor path that expands to the framework root.
pub const INSTALL_FOLDER_TOKEN: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Installed,
    Path,
    Git,
}

impl DescriptorKind {
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Installed => &["name", "version", "type"],
            Self::Path => &["name", "path", "type"],
            Self::Git => &["version", "path", "type"],
        }
    }
}

impl Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Installed => "tpdcctools",
                Self::Path => "path",
                Self::Git => "git",
            }
        )
    }
}

impl FromStr for DescriptorKind {
    type Err = AnyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tpdcctools" | "installed" => Ok(Self::Installed),
            "path" => Ok(Self::Path),
            "git" => Ok(Self::Git),
            _ => Err(AnyError(format!("unknown descriptor type \"{}\"", s))),
        }
    }
}

fn default_enable() -> bool {
    true
}

fn is_enabled(b: &bool) -> bool {
    *b == true
}

fn lenient_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = serde::Deserialize::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// The raw record of a descriptor as written in the environment file.
///
/// In the file the name is the key of the entry, so it is never serialized
/// with the rest of the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    #[serde(default, skip_serializing)]
    name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_version",
        skip_serializing_if = "Option::is_none"
    )]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default = "default_enable", skip_serializing_if = "is_enabled")]
    enable: bool,
}

impl Default for DescriptorInfo {
    fn default() -> Self {
        Self {
            name: None,
            version: None,
            path: None,
            kind: None,
            enable: true,
        }
    }
}

impl DescriptorInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, s: &str) -> Self {
        self.name = Some(s.to_string());
        self
    }

    pub fn version(mut self, s: &str) -> Self {
        self.version = Some(s.to_string());
        self
    }

    pub fn path(mut self, s: &str) -> Self {
        self.path = Some(s.to_string());
        self
    }

    pub fn kind(mut self, k: DescriptorKind) -> Self {
        self.kind = Some(k.to_string());
        self
    }

    pub fn enable(mut self, flag: bool) -> Self {
        self.enable = flag;
        self
    }

    pub fn set_name(&mut self, s: &str) {
        self.name = Some(s.to_string());
    }

    pub fn set_version(&mut self, s: &str) {
        self.version = Some(s.to_string());
    }

    pub fn set_enable(&mut self, flag: bool) {
        self.enable = flag;
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn get_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn get_kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    /// Lists the keys that hold a value.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.name.is_some() {
            keys.push("name");
        }
        if self.version.is_some() {
            keys.push("version");
        }
        if self.path.is_some() {
            keys.push("path");
        }
        if self.kind.is_some() {
            keys.push("type");
        }
        keys.push("enable");
        keys
    }
}

impl Display for DescriptorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields = Vec::new();
        if let Some(p) = &self.path {
            fields.push(format!("path: {}", p));
        }
        if let Some(v) = &self.version {
            fields.push(format!("version: {}", v));
        }
        if let Some(n) = &self.name {
            fields.push(format!("name: {}", n));
        }
        if let Some(k) = &self.kind {
            fields.push(format!("type: {}", k));
        }
        write!(f, "{{{}}}", fields.join(", "))
    }
}

/// The outcome of checking a descriptor against what exists.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// The package exists locally.
    Resolved(Package),
    /// The package is valid but only exists remotely; installing fetches it.
    Remote,
    /// The package could not be found for the given reason.
    Unresolved(String),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Resolved(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InstallOptions {
    /// Register a path package where it is instead of copying it.
    pub in_place: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    kind: DescriptorKind,
    info: DescriptorInfo,
    package: Option<Package>,
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> name: {}", self.kind, self.name())
    }
}

impl Descriptor {
    /// Builds a descriptor from its raw record.
    ///
    /// The type defaults to an installed package. Errors if the type is unknown
    /// or a key required by the type is missing.
    pub fn from_info(mut info: DescriptorInfo) -> Result<Self, Error> {
        let kind = match info.kind.as_deref() {
            None | Some("") => DescriptorKind::Installed,
            Some(k) => DescriptorKind::from_str(k)
                .map_err(|_| Error::UnsupportedDescriptorType(info.to_string()))?,
        };
        info.kind = Some(kind.to_string());

        let keys = info.keys();
        let missing: Vec<&str> = kind
            .required_keys()
            .iter()
            .filter(|k| keys.contains(k) == false)
            .copied()
            .collect();
        if missing.is_empty() == false {
            return Err(Error::DescriptorMissingKeys(
                kind.to_string(),
                info.get_name().unwrap_or("").to_string(),
                missing.join(", "),
            ));
        }
        Ok(Self {
            kind,
            info,
            package: None,
        })
    }

    /// Builds the descriptor matching a user supplied `location`.
    ///
    /// A `.git` location that is not on disk is a git descriptor. An existing
    /// path must hold a package, whose name and version fill in `info`.
    pub fn from_path(
        resolver: &Resolver,
        location: &str,
        mut info: DescriptorInfo,
    ) -> Result<Self, Error> {
        let on_disk = Path::new(location).exists();
        if location.ends_with(".git") == true && on_disk == false {
            if info.path.is_none() {
                info.path = Some(location.to_string());
            }
            info.kind = Some(DescriptorKind::Git.to_string());
            Self::from_info(info)
        } else if on_disk == true {
            let pkg = resolver.package_from_path(Path::new(location))?;
            info.name = Some(pkg.name().to_string());
            info.version = Some(pkg.version().to_string());
            info.path = Some(location.to_string());
            info.kind = Some(DescriptorKind::Path.to_string());
            Self::from_info(info)
        } else {
            Err(Error::UnsupportedDescriptorType(location.to_string()))
        }
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn info(&self) -> &DescriptorInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.get_name().unwrap_or("")
    }

    pub fn version(&self) -> &str {
        self.info.get_version().unwrap_or("")
    }

    pub fn is_enabled(&self) -> bool {
        self.info.is_enabled()
    }

    pub fn package(&self) -> Option<&Package> {
        self.package.as_ref()
    }

    /// The location of the package with the root token and `~` expanded.
    pub fn path(&self, root: &Path) -> Option<PathBuf> {
        self.info.get_path().map(|p| match self.kind {
            DescriptorKind::Git => PathBuf::from(p),
            _ => {
                let table = TokenTable::new().with(INSTALL_FOLDER_TOKEN, &root.display().to_string());
                filesystem::expand_home(&token::substitute(p, &table))
            }
        })
    }

    /// Checks whether the package this descriptor points to is available.
    pub fn resolve(&mut self, resolver: &Resolver) -> Result<Resolution, Error> {
        match self.kind {
            DescriptorKind::Installed => {
                tracing::debug!("resolving installed descriptor: {} - {}", self.name(), self.version());
                match resolver.package_for_descriptor(self) {
                    Some(pkg) => {
                        self.package = Some(pkg.clone());
                        Ok(Resolution::Resolved(pkg))
                    }
                    None => Err(Error::MissingPackageVersion(
                        self.name().to_string(),
                        self.version().to_string(),
                    )),
                }
            }
            DescriptorKind::Path => {
                let path = self.path(resolver.root_path()).unwrap_or_default();
                match resolver.package_from_path(&path) {
                    Ok(pkg) => {
                        self.info.set_version(pkg.version());
                        self.package = Some(pkg.clone());
                        Ok(Resolution::Resolved(pkg))
                    }
                    Err(Error::InvalidPackagePath(p)) => {
                        tracing::warn!(
                            "the specified package does not exist, please check your configuration: {:?}",
                            p
                        );
                        Ok(Resolution::Unresolved(format!(
                            "no package found at {:?}",
                            p
                        )))
                    }
                    Err(e) => Err(e),
                }
            }
            DescriptorKind::Git => {
                let path = self.info.get_path().unwrap_or("");
                if path.ends_with(".git") == false {
                    return Ok(Resolution::Unresolved(format!(
                        "supplied git path \"{}\" does not end with \".git\"",
                        path
                    )));
                }
                if self.info.get_name().is_some() {
                    if let Some(pkg) = resolver.package_for_descriptor(self) {
                        tracing::warn!("package already exists: {} - {}", self.name(), self.version());
                        let id = pkg.search_str();
                        self.package = Some(pkg);
                        return Err(Error::PackageAlreadyExists(id));
                    }
                }
                Ok(Resolution::Remote)
            }
        }
    }

    /// Installs the package into the packages tree and records it in the
    /// environment file. Returns the directory of the installed package.
    pub fn install(
        &mut self,
        resolver: &mut Resolver,
        opts: InstallOptions,
    ) -> Result<PathBuf, Fault> {
        self.install_with(resolver, opts, ExtGit::new())
    }

    /// Same as [Descriptor::install] with an explicit git backend for fetching
    /// remote packages.
    pub fn install_with<B: GitBackend>(
        &mut self,
        resolver: &mut Resolver,
        opts: InstallOptions,
        git: B,
    ) -> Result<PathBuf, Fault> {
        match self.kind {
            DescriptorKind::Installed => match &self.package {
                Some(pkg) => {
                    tracing::debug!("package {} already exists, skipping install", self.name());
                    Ok(pkg.root().to_path_buf())
                }
                None => Err(AnyError(format!(
                    "package {} is not installed and downloading packages is not supported",
                    self.name()
                )))?,
            },
            DescriptorKind::Path => self.install_path(resolver, opts),
            DescriptorKind::Git => self.install_git(resolver, git),
        }
    }

    fn install_path(&mut self, resolver: &mut Resolver, opts: InstallOptions) -> Result<PathBuf, Fault> {
        let pkg = match &self.package {
            Some(p) => p.clone(),
            None => {
                return Err(Error::InvalidPackagePath(
                    self.path(resolver.root_path()).unwrap_or_default(),
                ))?
            }
        };
        if resolver.existing_package(&pkg).is_some() {
            return Err(Error::PackageAlreadyExists(pkg.search_str()))?;
        }
        tracing::debug!("installing path descriptor {} (in place: {})", self.name(), opts.in_place);
        let installed = match opts.in_place {
            true => pkg,
            false => {
                let dest = resolver
                    .packages_path()
                    .join(self.name())
                    .join(pkg.version());
                let installed = match pkg.copy_to(&dest) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!("failed to copy package {} to {:?}: {}", pkg.name(), dest, e);
                        return Err(e);
                    }
                };
                tracing::debug!("finished copying {} --> {:?}", pkg, dest);
                self.info.path = None;
                self.info.kind = Some(DescriptorKind::Installed.to_string());
                self.info.version = Some(pkg.version().to_string());
                self.kind = DescriptorKind::Installed;
                installed
            }
        };
        let root = installed.root().to_path_buf();
        self.package = Some(installed.clone());
        resolver.cache_insert(installed);
        resolver.update_environment_descriptor(&self.info)?;
        Ok(root)
    }

    fn install_git<B: GitBackend>(&mut self, resolver: &mut Resolver, git: B) -> Result<PathBuf, Fault> {
        if let Some(pkg) = &self.package {
            return Ok(pkg.root().to_path_buf());
        }
        if has_git(&git) == false {
            return Err(Error::GitCommand(LastError(String::from(
                "git is not available on this system",
            ))))?;
        }
        let url = self.info.get_path().unwrap_or("").to_string();
        let local = tempfile::Builder::new().suffix("trellis_git").tempdir()?;

        tracing::debug!("cloning {} into {:?}", url, local.path());
        let repo = RepoChecker::clone_with(git, &url, local.path())?;
        if self.version() != DEV_VERSION {
            repo.checkout(self.version())?;
        }
        let found = resolver.package_from_path(repo.repo_path())?;
        if let Some(existing) = resolver.existing_package(&found) {
            let id = existing.search_str();
            self.package = Some(existing);
            return Err(Error::PackageAlreadyExists(id))?;
        }
        self.info.name = Some(found.name().to_string());
        let version = match self.version().is_empty() {
            true => found.version().to_string(),
            false => self.version().to_string(),
        };
        let dest = resolver.packages_path().join(found.name()).join(&version);
        let installed = found.copy_to(&dest)?;
        let root = installed.root().to_path_buf();

        self.info.path = None;
        self.info.version = Some(version);
        self.info.kind = Some(DescriptorKind::Installed.to_string());
        self.kind = DescriptorKind::Installed;
        self.package = Some(installed.clone());
        resolver.cache_insert(installed);
        resolver.update_environment_descriptor(&self.info)?;
        Ok(root)
    }

    /// Removes the descriptor from the environment file.
    ///
    /// With `remove`, the installed package directory is deleted as well, along
    /// with its version folder's parent once it is empty. Packages that live
    /// outside the packages tree are never deleted.
    pub fn uninstall(&mut self, resolver: &mut Resolver, remove: bool) -> Result<bool, Fault> {
        tracing::debug!("uninstalling descriptor: {}", self);
        let pkg = match &self.package {
            Some(p) => p.clone(),
            None => {
                tracing::debug!("descriptor {} has no resolved package", self.name());
                return Ok(false);
            }
        };
        resolver.remove_descriptor_from_environment(self.name())?;
        if remove == true {
            if filesystem::is_subpath(resolver.packages_path(), pkg.root()) == true {
                pkg.delete()?;
                if let Some(parent) = pkg.root().parent() {
                    filesystem::remove_if_empty(parent)?;
                }
            } else {
                tracing::warn!(
                    "keeping package files at {:?} since they are outside the packages folder",
                    pkg.root()
                );
            }
        }
        Ok(true)
    }
}
