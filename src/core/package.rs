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


//! A framework package: a directory holding a `package.yaml` manifest.

use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::host::Host;
use crate::core::requirement::{Requirement, RequirementsList};
use crate::core::token::TokenTable;
use crate::core::variable::Variable;
use crate::error::{Error, LastError};
use crate::util::anyerror::Fault;
use crate::util::compress;
use crate::util::environment::{self, Environment, TPDCC_PYTHON};
use crate::util::filesystem::{self, FILE_FILTER_EXCLUDE};

pub const PACKAGE_FILE: &str = "package.yaml";

const DEFAULT_NAME: &str = "NO_NAME";
const DEFAULT_INTERPRETER: &str = "python";

/// Events a package's command scripts are invoked with.
pub mod event {
    pub const STARTUP: &str = "startup";
    pub const SHUTDOWN: &str = "shutdown";
}

/// A manifest value that may be written as a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Accepts strings, numbers and booleans where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: serde_yaml::Value = serde::Deserialize::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

pub fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn lenient_dccs<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<serde_yaml::Value>>> =
        serde::Deserialize::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(host, versions)| {
            let versions = match versions {
                Some(serde_yaml::Value::Sequence(seq)) => {
                    seq.iter().map(|v| scalar_to_string(v)).collect()
                }
                Some(v) => vec![scalar_to_string(&v)],
                None => Vec::new(),
            };
            (host.to_ascii_lowercase(), versions)
        })
        .collect())
}

fn default_name() -> String {
    String::from(DEFAULT_NAME)
}

/// The contents of a `package.yaml` file.
///
/// Unknown keys are kept so that saving a manifest never drops data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author_email: Option<String>,
    #[serde(default)]
    requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, OneOrMany>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tests: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    documentation: BTreeMap<String, String>,
    #[serde(
        default,
        deserialize_with = "lenient_dccs",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    dccs: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "is_false")]
    required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    requires_project: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

fn is_false(b: &bool) -> bool {
    *b == false
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: String::new(),
            display_name: None,
            description: None,
            author: None,
            author_email: None,
            requirements: Vec::new(),
            environment: BTreeMap::new(),
            commands: Vec::new(),
            tests: Vec::new(),
            documentation: BTreeMap::new(),
            dccs: BTreeMap::new(),
            required: false,
            requires_project: false,
            extra: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    /// Adds an environment variable declaration.
    pub fn environment(mut self, key: &str, values: &[&str]) -> Self {
        self.environment.insert(
            key.to_string(),
            OneOrMany::Many(values.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    pub fn requirement(mut self, line: &str) -> Self {
        self.requirements.push(Requirement::from_line(line));
        self
    }

    pub fn command(mut self, path: &str) -> Self {
        self.commands.push(path.to_string());
        self
    }

    pub fn dcc(mut self, host: &str, versions: &[&str]) -> Self {
        self.dccs.insert(
            host.to_ascii_lowercase(),
            versions.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn required(mut self, flag: bool) -> Self {
        self.required = flag;
        self
    }

    pub fn requires_project(mut self, flag: bool) -> Self {
        self.requires_project = flag;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("No description")
    }

    pub fn author(&self) -> &str {
        self.author.as_deref().unwrap_or("")
    }

    pub fn author_email(&self) -> &str {
        self.author_email.as_deref().unwrap_or("")
    }

    pub fn documentation(&self) -> &BTreeMap<String, String> {
        &self.documentation
    }
}

/// Returns the operating system name as reported by `platform.system` tokens.
fn platform_system() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

/// Builds the tokens that describe the running process rather than a package.
pub fn context_tokens(host: Host, host_version: Option<&str>, project: Option<&str>) -> TokenTable {
    TokenTable::new()
        .with("dcc", &host.to_string())
        .with("dcc.version", host_version.unwrap_or(""))
        .with("project", project.filter(|p| p.is_empty() == false).unwrap_or("undefined"))
}

#[derive(Debug, Clone)]
pub struct Package {
    manifest: Manifest,
    path: PathBuf,
    root: PathBuf,
    tokens: TokenTable,
    command_paths: Vec<String>,
    resolved: bool,
    resolved_env: BTreeMap<String, Variable>,
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.version() == other.version()
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.search_str())
    }
}

impl Package {
    /// Loads the package whose manifest is at `path`, or inside `path` when it
    /// is a directory.
    ///
    /// A manifest with invalid YAML is logged and treated as empty.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = match path.is_dir() {
            true => path.join(PACKAGE_FILE),
            false => path.to_path_buf(),
        };
        if file.is_file() == false {
            return Err(Error::InvalidPackagePath(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(&file).map_err(|e| Error::file_access(&file, e))?;
        let manifest = match text.trim().is_empty() {
            true => Manifest::default(),
            false => match serde_yaml::from_str::<Manifest>(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(
                        "failed to load package due to possible syntax error {:?}: {}",
                        file,
                        e
                    );
                    Manifest::default()
                }
            },
        };
        Ok(Self::from_manifest(manifest, &file))
    }

    /// Creates a package from an in-memory manifest located at `path`.
    pub fn from_manifest(manifest: Manifest, path: &Path) -> Self {
        let root = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let mut pkg = Self {
            tokens: TokenTable::new(),
            command_paths: Vec::new(),
            manifest,
            path: path.to_path_buf(),
            root,
            resolved: false,
            resolved_env: BTreeMap::new(),
        };
        pkg.refresh_tokens();
        pkg.command_paths = Variable::detached("commands", pkg.manifest.commands.clone())
            .solve(&pkg.tokens)
            .to_vec();
        pkg
    }

    fn refresh_tokens(&mut self) {
        let root = self.root.display().to_string();
        self.tokens = TokenTable::new()
            .with("self", &root)
            .with("self.name", &self.manifest.name)
            .with("self.path", &root)
            .with("self.version", &self.manifest.version)
            .with("platform.system", platform_system())
            .with("platform.arch", std::env::consts::ARCH);
    }

    /// Checks if `dir` contains a package manifest.
    pub fn is_package_directory(dir: &Path) -> bool {
        dir.is_dir() && dir.join(PACKAGE_FILE).is_file()
    }

    pub fn name_from_package_name_and_version(name: &str, version: &str) -> String {
        format!("{}-{}", name, version)
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory holding the manifest.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn search_str(&self) -> String {
        Self::name_from_package_name_and_version(self.name(), self.version())
    }

    pub fn requirements(&self) -> RequirementsList {
        RequirementsList::from_vec(self.manifest.requirements.clone())
    }

    pub fn is_required(&self) -> bool {
        self.manifest.required
    }

    pub fn requires_project(&self) -> bool {
        self.manifest.requires_project
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn command_paths(&self) -> &[String] {
        &self.command_paths
    }

    pub fn tests(&self) -> Vec<String> {
        Variable::detached("tests", self.manifest.tests.clone())
            .solve(&self.tokens)
            .to_vec()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn resolved_environment(&self) -> &BTreeMap<String, Variable> {
        &self.resolved_env
    }

    /// Names of all packages this package's environment refers to with
    /// `{dep.<name>}` tokens.
    pub fn environment_dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = self
            .manifest
            .environment
            .iter()
            .flat_map(|(k, v)| Variable::detached(k, v.to_vec()).dependencies())
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    /// Checks if the package may be loaded inside `host`.
    ///
    /// Packages that list no hosts are compatible with all of them. A host
    /// listed without versions accepts any version.
    pub fn is_compatible(&self, host: Host, host_version: Option<&str>) -> bool {
        if self.manifest.dccs.is_empty() == true {
            return true;
        }
        match self.manifest.dccs.get(&host.to_string()) {
            Some(versions) => {
                versions.is_empty() == true
                    || host_version.map_or(false, |v| versions.iter().any(|s| s == v))
            }
            None => false,
        }
    }

    /// Solves the package's environment with its own tokens plus `extra`.
    ///
    /// When `apply_environment` is set the values are appended to the process
    /// environment. Returns `false` for a package that declares no environment.
    pub fn resolve(&mut self, extra: &TokenTable, apply_environment: bool) -> bool {
        if self.manifest.environment.is_empty() == true {
            tracing::warn!(
                "unable to resolve package environment due to invalid package: {:?}",
                self.path
            );
            self.resolved = false;
            return false;
        }
        let mut tokens = self.tokens.clone();
        tokens.extend(extra);

        self.command_paths = Variable::detached("commands", self.manifest.commands.clone())
            .solve(&tokens)
            .to_vec();

        let mut variables = BTreeMap::new();
        for (key, values) in &self.manifest.environment {
            let mut var = Variable::new(key, values.to_vec());
            var.solve(&tokens);
            if apply_environment == true {
                environment::add_to_env(key, var.values());
            }
            variables.insert(key.clone(), var);
        }
        self.resolved_env = variables;
        self.resolved = true;
        tracing::debug!("resolved {}: {:?}", self.name(), self.root);
        true
    }

    /// Adds `values` to the resolved variable `key`, creating it if needed.
    pub fn resolve_env_path(&mut self, key: &str, values: &[String], apply_environment: bool) {
        let mut var = match self.resolved_env.remove(key) {
            Some(existing) => {
                let mut all = existing.values().to_vec();
                all.extend(values.iter().cloned());
                Variable::detached(key, all)
            }
            None => Variable::new(key, values.to_vec()),
        };
        var.solve(&self.tokens);
        if apply_environment == true {
            environment::add_to_env(key, var.values());
        }
        self.resolved_env.insert(key.to_string(), var);
    }

    /// Copies the package directory into `dest` and loads the copy.
    ///
    /// Errors if `dest` already exists.
    pub fn copy_to(&self, dest: &Path) -> Result<Package, Fault> {
        if dest.exists() == true {
            return Err(Error::PathAlreadyExists(dest.to_path_buf()))?;
        }
        filesystem::copy(&self.root, dest, &FILE_FILTER_EXCLUDE)?;
        Ok(Package::load(dest)?)
    }

    /// Writes the manifest back to its file.
    pub fn save(&self) -> Result<(), Error> {
        let text = serde_yaml::to_string(&self.manifest)
            .map_err(|e| Error::BadFileSyntax(self.path.clone(), LastError(e.to_string())))?;
        std::fs::write(&self.path, text).map_err(|e| Error::file_access(&self.path, e))
    }

    pub fn set_version(&mut self, version: &str) {
        self.manifest.version = version.to_string();
        self.refresh_tokens();
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), Error> {
        self.manifest.name = name.to_string();
        self.refresh_tokens();
        self.save()
    }

    /// Changes the version and rewrites the manifest.
    pub fn update_and_write_version(&mut self, version: &str) -> Result<(), Error> {
        self.set_version(version);
        self.save()
    }

    /// Removes the package directory from disk.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn delete(&self) -> Result<bool, Fault> {
        if self.root.exists() == false {
            return Ok(false);
        }
        filesystem::remove_dir(&self.root)?;
        Ok(true)
    }

    /// Compresses the package directory into `<dir>/<name>-<version>.zip`.
    ///
    /// Without a `dir` the archive is written into the temporary directory.
    /// Returns the archive path and the directory it lives in.
    pub fn create_zip(&self, dir: Option<&Path>) -> Result<(PathBuf, PathBuf), Fault> {
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => std::env::temp_dir().join("trellis"),
        };
        std::fs::create_dir_all(&dir)?;
        let archive = dir.join(format!("{}.zip", self.search_str()));
        if let Err(e) = compress::write_zip_dir(&self.root, &archive, &FILE_FILTER_EXCLUDE) {
            tracing::error!("failed to write zip to {:?}: {}", archive, e);
            return Err(e);
        }
        Ok((archive, dir))
    }

    /// Runs the package's first existing command script for `event`.
    ///
    /// Scripts are executed from the package root with the resolved
    /// environment and receive the event name as their only argument. Returns
    /// `false` if the package has no command script on disk.
    pub fn run_command(&self, event: &str) -> Result<bool, Error> {
        let script = match self.command_paths.iter().find(|p| Path::new(p).exists()) {
            Some(s) => PathBuf::from(s),
            None => return Ok(false),
        };
        tracing::debug!("running package {} {} command: {:?}", self.name(), event, script);

        let mut cmd = match script.extension().and_then(|e| e.to_str()) {
            Some("py") => {
                let mut c = Command::new(
                    Environment::read(TPDCC_PYTHON).unwrap_or(String::from(DEFAULT_INTERPRETER)),
                );
                c.arg(&script);
                c
            }
            _ => Command::new(&script),
        };
        cmd.arg(event)
            .current_dir(&self.root)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        for (key, var) in &self.resolved_env {
            cmd.env(key, var.to_string());
        }
        let output = cmd
            .output()
            .map_err(|e| Error::PackageCommandFailed(self.name().to_string(), LastError(e.to_string())))?;
        match output.status.success() {
            true => Ok(true),
            false => Err(Error::PackageCommandFailed(
                self.name().to_string(),
                LastError(match output.status.code() {
                    Some(code) => format!(
                        "exited with error code {}: {}",
                        code,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                    None => String::from("terminated by signal"),
                }),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    const P_1: &str = r#"
name: tp-dcc-core
version: 1.2.0
displayName: Core
author: Tomas
requirements:
  - tp-bootstrap==0.3.1
environment:
  PYTHONPATH:
    - "{self}/python"
    - "{dep.tp-bootstrap}/lib"
  TPDCC_CORE_ICONS: "{self}/icons"
commands:
  - "{self}/startup.py"
dccs:
  maya: [2022, "2023"]
  houdini:
customKey: kept
"#;

    fn write_package(dir: &Path, text: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let file = dir.join(PACKAGE_FILE);
        std::fs::write(&file, text).unwrap();
        file
    }

    #[test]
    fn load_manifest() {
        let dir = tempdir().unwrap();
        let file = write_package(dir.path(), P_1);
        let pkg = Package::load(dir.path()).unwrap();
        assert_eq!(pkg.name(), "tp-dcc-core");
        assert_eq!(pkg.version(), "1.2.0");
        assert_eq!(pkg.path(), file);
        assert_eq!(pkg.root(), dir.path());
        assert_eq!(pkg.search_str(), "tp-dcc-core-1.2.0");
        assert_eq!(pkg.manifest().display_name(), "Core");
        assert_eq!(pkg.manifest().description(), "No description");
        assert_eq!(pkg.requirements().get("tp-bootstrap").unwrap().version(), "0.3.1");
        assert_eq!(
            pkg.command_paths(),
            &[format!("{}/startup.py", dir.path().display())]
        );
        assert_eq!(pkg.environment_dependencies(), vec![String::from("tp-bootstrap")]);
        assert_eq!(Package::is_package_directory(dir.path()), true);
    }

    #[test]
    fn load_missing_and_broken() {
        let dir = tempdir().unwrap();
        assert_eq!(
            Package::load(dir.path()).unwrap_err(),
            Error::InvalidPackagePath(dir.path().to_path_buf())
        );
        write_package(dir.path(), "name: [unclosed\n");
        let pkg = Package::load(dir.path()).unwrap();
        assert_eq!(pkg.name(), "NO_NAME");
        assert_eq!(pkg.version(), "");
    }

    #[test]
    fn numeric_versions_are_text() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), "name: a\nversion: 2\n");
        assert_eq!(Package::load(dir.path()).unwrap().version(), "2");
    }

    #[test]
    fn compatibility() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), P_1);
        let pkg = Package::load(dir.path()).unwrap();
        assert_eq!(pkg.is_compatible(Host::Maya, Some("2022")), true);
        assert_eq!(pkg.is_compatible(Host::Maya, Some("2020")), false);
        assert_eq!(pkg.is_compatible(Host::Maya, None), false);
        assert_eq!(pkg.is_compatible(Host::Houdini, Some("20.0")), true);
        assert_eq!(pkg.is_compatible(Host::Standalone, None), false);

        let any = Package::from_manifest(Manifest::new("b", "1"), &dir.path().join(PACKAGE_FILE));
        assert_eq!(any.is_compatible(Host::Unreal, None), true);
    }

    #[test]
    fn resolve_solves_tokens() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), P_1);
        let mut pkg = Package::load(dir.path()).unwrap();
        let extra = TokenTable::new().with("dep.tp-bootstrap", "/pkgs/tp-bootstrap/0.3.1");
        assert_eq!(pkg.resolve(&extra, false), true);
        assert_eq!(pkg.is_resolved(), true);

        let icons = pkg.resolved_environment().get("TPDCC_CORE_ICONS").unwrap();
        assert_eq!(icons.values()[0], format!("{}/icons", dir.path().display()));
        let py = pkg.resolved_environment().get("PYTHONPATH").unwrap();
        assert_eq!(py.values()[1], "/pkgs/tp-bootstrap/0.3.1/lib");
    }

    #[test]
    fn resolve_without_environment() {
        let dir = tempdir().unwrap();
        let mut pkg = Package::from_manifest(Manifest::new("a", "1"), &dir.path().join(PACKAGE_FILE));
        assert_eq!(pkg.resolve(&TokenTable::new(), false), false);
        assert_eq!(pkg.is_resolved(), false);
    }

    #[test]
    fn resolve_applies_environment() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::new("a", "1").environment("TRELLIS_TEST_PKG_APPLY", &["{self}/bin"]);
        let mut pkg = Package::from_manifest(manifest, &dir.path().join(PACKAGE_FILE));
        pkg.resolve(&TokenTable::new(), true);
        assert_eq!(
            std::env::var("TRELLIS_TEST_PKG_APPLY").unwrap(),
            format!("{}/bin", dir.path().display())
        );
        std::env::remove_var("TRELLIS_TEST_PKG_APPLY");
    }

    #[test]
    fn resolve_env_path_merges_values() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::new("a", "1").environment("TRELLIS_TEST_ENV_PATH", &["{self}/bin"]);
        let mut pkg = Package::from_manifest(manifest, &dir.path().join(PACKAGE_FILE));
        pkg.resolve(&TokenTable::new(), false);

        let root = dir.path().display().to_string();
        pkg.resolve_env_path(
            "TRELLIS_TEST_ENV_PATH",
            &[String::from("{self}/lib"), String::from("/shared")],
            false,
        );
        let var = pkg.resolved_environment().get("TRELLIS_TEST_ENV_PATH").unwrap();
        assert_eq!(
            var.values(),
            &[format!("{}/bin", root), format!("{}/lib", root), String::from("/shared")][..]
        );
        assert!(std::env::var("TRELLIS_TEST_ENV_PATH").is_err());

        // a new key is created and applied to the process environment
        pkg.resolve_env_path("TRELLIS_TEST_ENV_NEW", &[String::from("{self}/docs")], true);
        assert_eq!(
            pkg.resolved_environment().get("TRELLIS_TEST_ENV_NEW").unwrap().values(),
            &[format!("{}/docs", root)][..]
        );
        assert_eq!(
            std::env::var("TRELLIS_TEST_ENV_NEW").unwrap(),
            format!("{}/docs", root)
        );
        std::env::remove_var("TRELLIS_TEST_ENV_NEW");
    }

    #[test]
    fn copy_and_save() {
        let src = tempdir().unwrap();
        write_package(src.path(), P_1);
        std::fs::write(src.path().join("module.pyc"), "").unwrap();
        let pkg = Package::load(src.path()).unwrap();

        let dest = tempdir().unwrap();
        let target = dest.path().join("tp-dcc-core/1.2.0");
        let mut copy = pkg.copy_to(&target).unwrap();
        assert_eq!(copy.root(), target);
        assert_eq!(target.join("module.pyc").exists(), false);
        // copying onto an existing path is refused
        assert_eq!(
            crate::util::anyerror::is_error(
                &pkg.copy_to(&target).unwrap_err(),
                &Error::PathAlreadyExists(target.clone())
            ),
            true
        );

        copy.update_and_write_version("1.3.0").unwrap();
        let reloaded = Package::load(&target).unwrap();
        assert_eq!(reloaded.version(), "1.3.0");
        assert_eq!(reloaded.manifest().display_name(), "Core");
        // unknown keys survive a save
        let text = std::fs::read_to_string(target.join(PACKAGE_FILE)).unwrap();
        assert_eq!(text.contains("customKey: kept"), true);

        assert_eq!(reloaded.delete().unwrap(), true);
        assert_eq!(target.exists(), false);
        assert_eq!(reloaded.delete().unwrap(), false);
    }

    #[test]
    fn zip_package() {
        let src = tempdir().unwrap();
        write_package(src.path(), P_1);
        let pkg = Package::load(src.path()).unwrap();
        let out = tempdir().unwrap();
        let (archive, dir) = pkg.create_zip(Some(out.path())).unwrap();
        assert_eq!(archive, out.path().join("tp-dcc-core-1.2.0.zip"));
        assert_eq!(dir, out.path());
        assert_eq!(archive.is_file(), true);
    }

    #[test]
    fn run_command_without_scripts() {
        let dir = tempdir().unwrap();
        let pkg = Package::from_manifest(
            Manifest::new("a", "1").command("{self}/missing.py"),
            &dir.path().join(PACKAGE_FILE),
        );
        assert_eq!(pkg.run_command(event::STARTUP).unwrap(), false);
    }

    #[cfg(unix)]
    #[test]
    fn run_command_reports_failure() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let script = dir.path().join("cmd.sh");
        std::fs::write(&script, "#!/bin/sh\n[ \"$1\" = \"startup\" ] && exit 0\necho bad >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let pkg = Package::from_manifest(
            Manifest::new("a", "1").command("{self}/cmd.sh"),
            &dir.path().join(PACKAGE_FILE),
        );
        assert_eq!(pkg.run_command(event::STARTUP).unwrap(), true);
        match pkg.run_command(event::SHUTDOWN).unwrap_err() {
            Error::PackageCommandFailed(name, LastError(msg)) => {
                assert_eq!(name, "a");
                assert_eq!(msg.contains("exited with error code 3"), true);
                assert_eq!(msg.contains("bad"), true);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn fixture_package() {
        let pkg = Package::load(Path::new("./tests/data/packages/studio-core/1.2.0")).unwrap();
        assert_eq!(pkg.search_str(), "studio-core-1.2.0");
        assert_eq!(pkg.manifest().display_name(), "Studio Core");
        assert_eq!(pkg.is_required(), true);
        assert_eq!(pkg.requirements().len(), 2);
        assert_eq!(pkg.is_compatible(Host::Maya, Some("2024")), true);
        assert_eq!(pkg.is_compatible(Host::Maya, Some("2022")), false);
        assert_eq!(pkg.is_compatible(Host::Standalone, None), true);
        assert_eq!(pkg.environment_dependencies(), vec![String::from("studio-tools")]);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Writes a minimal package into `<packages>/<name>/<version>`, or into
    /// `<packages>/<name>` for a development checkout.
    pub fn write_package(packages: &Path, name: &str, version: Option<&str>) -> PathBuf {
        let dir = match version {
            Some(v) => packages.join(name).join(v),
            None => packages.join(name),
        };
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = Manifest::new(name, version.unwrap_or("DEV"));
        std::fs::write(
            dir.join(PACKAGE_FILE),
            serde_yaml::to_string(&manifest).unwrap(),
        )
        .unwrap();
        dir
    }
}
