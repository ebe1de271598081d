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


use crate::util::anyerror::AnyError;
use crate::util::anyerror::Fault;
use crate::util::filesystem;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE: &str = "trellis.toml";

/// Folder under the user's home holding the per-user configuration.
pub const USER_CONFIG_DIR: &str = ".trellis";

pub trait FromFile: Sized {
    fn from_file(path: &Path) -> Result<Self, Fault>;
}

#[derive(Debug, PartialEq, Clone)]
pub enum Locality {
    Global,
    Local,
    Other,
}

#[derive(Debug, PartialEq)]
pub struct Configs {
    inner: Vec<(PathBuf, Config, Locality)>,
}

impl Configs {
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Loads `file` and every file reachable through its `include` entries.
    ///
    /// Each file is read at most once.
    pub fn load(self, file: PathBuf, lvl: Locality) -> Result<Self, Fault> {
        let mut set = HashSet::new();
        let mut configs = self.inner;

        let mut to_process = vec![(filesystem::normalize(&file), lvl)];
        let mut i = 0;
        while let Some((path, local)) = to_process.get(i).cloned() {
            i += 1;
            if set.insert(path.clone()) == false {
                continue;
            }
            let cfg = Config::from_file(&path)?;
            let base = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            for next in cfg.get_includes() {
                let std_next = filesystem::normalize(&filesystem::resolve_rel_path(
                    &base,
                    &next.to_string_lossy(),
                ));
                if set.contains(&std_next) == false {
                    to_process.push((std_next, Locality::Other));
                }
            }
            configs.push((path, cfg, local));
        }
        Ok(Self { inner: configs })
    }

    /// Loads the root configuration file and the user's configuration file
    /// when they exist.
    pub fn discover(config_dir: &Path) -> Result<Self, Fault> {
        let mut configs = Self::new();
        let local = config_dir.join(CONFIG_FILE);
        if local.is_file() == true {
            configs = configs.load(local, Locality::Local)?;
        }
        if let Some(home) = home::home_dir() {
            let global = home.join(USER_CONFIG_DIR).join(CONFIG_FILE);
            if global.is_file() == true {
                configs = configs.load(global, Locality::Global)?;
            }
        }
        Ok(configs)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn paths(&self) -> Vec<&PathBuf> {
        self.inner.iter().map(|(p, _, _)| p).collect()
    }
}

impl From<Configs> for Config {
    /// Flattens the layered configurations into a single level.
    ///
    /// Files are processed in this order: local, global, then includes in the
    /// order they were read. A value that is already set is never overridden by
    /// a file later in the order.
    fn from(value: Configs) -> Self {
        let mut single = Config::new();
        let mut value = value;
        let local = value.inner.iter().position(|p| p.2 == Locality::Local);
        if let Some(i) = local {
            single.append(value.inner.remove(i).1);
        }
        let global = value.inner.iter().position(|p| p.2 == Locality::Global);
        if let Some(i) = global {
            single.append(value.inner.remove(i).1);
        }
        value.inner.into_iter().for_each(|p| {
            single.append(p.1);
        });
        single
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    #[serde(rename = "packages-dir")]
    packages_dir: Option<String>,
    dev: Option<bool>,
}

impl General {
    pub fn new() -> Self {
        Self {
            packages_dir: None,
            dev: None,
        }
    }

    pub fn get_packages_dir(&self) -> Option<&str> {
        self.packages_dir.as_deref()
    }

    pub fn is_dev(&self) -> Option<bool> {
        self.dev
    }

    /// Merges any populated data from `rhs` into attributes that do not already
    /// have data defined in `self`.
    pub fn merge(&mut self, rhs: Option<Self>) {
        if let Some(rhs) = rhs {
            if self.packages_dir.is_none() {
                self.packages_dir = rhs.packages_dir
            }
            if self.dev.is_none() {
                self.dev = rhs.dev
            }
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    include: Option<Vec<PathBuf>>,
    env: Option<BTreeMap<String, String>>,
    general: Option<General>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            include: None,
            env: None,
            general: None,
        }
    }

    /// Adds the new information to the existing configuration to combine data.
    ///
    /// Existing data in `self` has precedence over any incoming data from `rhs`.
    pub fn append(&mut self, rhs: Self) {
        match &mut self.include {
            Some(v) => v.append(&mut rhs.include.unwrap_or(Vec::new())),
            None => self.include = rhs.include,
        }
        match &mut self.general {
            Some(v) => v.merge(rhs.general),
            None => self.general = rhs.general,
        }
        match &mut self.env {
            Some(v) => {
                for (key, val) in rhs.env.unwrap_or_default() {
                    v.entry(key).or_insert(val);
                }
            }
            None => self.env = rhs.env,
        }
    }

    pub fn get_includes(&self) -> Vec<&PathBuf> {
        match &self.include {
            Some(i) => i.iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn get_env(&self) -> Option<&BTreeMap<String, String>> {
        self.env.as_ref()
    }

    pub fn get_general(&self) -> Option<&General> {
        self.general.as_ref()
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

impl FromFile for Config {
    fn from_file(path: &Path) -> Result<Self, Fault> {
        if path.is_file() == false {
            return Err(AnyError(format!(
                "failed to locate configuration file \"{}\"",
                path.display()
            )))?;
        }
        let contents = std::fs::read_to_string(&path)?;
        match Self::from_str(&contents) {
            Ok(r) => Ok(r),
            Err(e) => {
                return Err(AnyError(format!(
                    "failed to parse \"{}\" file: {}",
                    path.display(),
                    e
                )))?
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const C_0: &str = r#"
# This is a blank configuration file.
"#;

    const C_1: &str = r#"
include = [
    "studio.toml",
]

[general]
packages-dir = "{root}/packages"
dev = false

[env]
STUDIO_NAME = "north"
"#;

    #[test]
    fn parse_empty_config() {
        assert_eq!(Config::from_str(C_0).unwrap(), Config::new());
    }

    #[test]
    fn parse_basic_config() {
        let cfg = Config::from_str(C_1).unwrap();
        assert_eq!(cfg.get_includes(), vec![&PathBuf::from("studio.toml")]);
        assert_eq!(
            cfg.get_general().unwrap().get_packages_dir(),
            Some("{root}/packages")
        );
        assert_eq!(cfg.get_env().unwrap().get("STUDIO_NAME").unwrap(), "north");
    }

    #[test]
    fn reject_unknown_keys() {
        assert!(Config::from_str("[general]\nbuild-dir = \"x\"\n").is_err());
    }

    #[test]
    fn append_keeps_existing_values() {
        let mut base = Config::from_str("[env]\nA = \"1\"\n[general]\ndev = true\n").unwrap();
        let rhs = Config::from_str(
            "[env]\nA = \"2\"\nB = \"3\"\n[general]\ndev = false\npackages-dir = \"pkgs\"\n",
        )
        .unwrap();
        base.append(rhs);
        let env = base.get_env().unwrap();
        assert_eq!(env.get("A").unwrap(), "1");
        assert_eq!(env.get("B").unwrap(), "3");
        assert_eq!(base.get_general().unwrap().is_dev(), Some(true));
        assert_eq!(base.get_general().unwrap().get_packages_dir(), Some("pkgs"));
    }

    #[test]
    fn linked_configs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "include = [\"other.toml\"]\n[env]\nA = \"local\"\n",
        )
        .unwrap();
        // includes pointing back at the first file must not loop
        std::fs::write(
            dir.path().join("other.toml"),
            "include = [\"trellis.toml\"]\n[env]\nA = \"other\"\nB = \"other\"\n",
        )
        .unwrap();
        let configs = Configs::new()
            .load(dir.path().join(CONFIG_FILE), Locality::Local)
            .unwrap();
        assert_eq!(configs.len(), 2);
        let single = Config::from(configs);
        assert_eq!(single.get_env().unwrap().get("A").unwrap(), "local");
        assert_eq!(single.get_env().unwrap().get("B").unwrap(), "other");
    }

    #[test]
    fn fixture_config() {
        let configs = Configs::new()
            .load(PathBuf::from("./tests/data/config/trellis.toml"), Locality::Local)
            .unwrap();
        assert_eq!(configs.len(), 2);
        let single = Config::from(configs);
        let env = single.get_env().unwrap();
        assert_eq!(env.get("STUDIO_NAME").unwrap(), "trellis-test");
        assert_eq!(env.get("STUDIO_SHARE").unwrap(), "/mnt/share");
        assert_eq!(
            single.get_general().unwrap().get_packages_dir(),
            Some("{root}/packages")
        );
    }
}
