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


use crate::core::config::Config;
use crate::core::package::Package;
use crate::util::anyerror::Fault;
use std::collections::btree_set::BTreeSet;
use std::collections::btree_set::IntoIter;
use std::collections::btree_set::Iter;
use std::collections::HashMap;
use std::hash::Hash;

/// Separator used by the platform to join multiple paths in one variable.
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

#[derive(Eq)]
pub struct EnvVar {
    key: String,
    value: String,
}

impl PartialEq for EnvVar {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Ord for EnvVar {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for EnvVar {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for EnvVar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // only hash by the key name
        self.key.hash(state);
    }
}

impl EnvVar {
    pub fn with(key: &str, value: &str) -> Self {
        Self::new().key(key).value(value)
    }

    pub fn new() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
        }
    }

    /// Sets the environment key.
    pub fn key(mut self, s: &str) -> Self {
        // normalize the key name upon entry
        self.key = s.to_ascii_uppercase().replace('-', "_");
        self
    }

    /// Sets the environment value.
    pub fn value(mut self, s: &str) -> Self {
        self.value = s.to_owned();
        self
    }

    pub fn get_key(&self) -> &str {
        &self.key
    }

    pub fn get_value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=\"{}\"", self.key, self.value)
    }
}

impl std::fmt::Display for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

pub struct Environment(BTreeSet<EnvVar>);

impl Environment {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, var: EnvVar) -> bool {
        self.0.insert(var)
    }

    pub fn add(mut self, var: EnvVar) -> Self {
        self.0.insert(var);
        self
    }

    pub fn overwrite(mut self, var: EnvVar) -> Self {
        self.0.replace(var);
        self
    }

    pub fn iter(&self) -> Iter<'_, EnvVar> {
        self.0.iter()
    }

    pub fn into_iter(self) -> IntoIter<EnvVar> {
        self.0.into_iter()
    }

    pub fn get(&self, key: &str) -> Option<&EnvVar> {
        self.0.get(&EnvVar::new().key(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_map(&self) -> HashMap<&String, &String> {
        self.0.iter().map(|v| (&v.key, &v.value)).collect()
    }

    /// Loads an `Environment` struct from a `Config` document.
    ///
    /// It searches the `[env]` table and collects all env variables.
    pub fn from_config(mut self, config: &Config) -> Result<Self, Fault> {
        if let Some(map) = config.get_env() {
            map.iter().for_each(|(key, val)| {
                self.insert(EnvVar::new().key(key).value(val));
            });
        }
        Ok(self)
    }

    /// Collects the solved variables of every resolved package.
    ///
    /// Values for the same key across packages are merged in package order with
    /// duplicates removed.
    pub fn from_packages<'a, I>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = &'a Package>,
    {
        let mut merged: Vec<(String, Vec<String>)> = Vec::new();
        for pkg in packages {
            for (key, var) in pkg.resolved_environment() {
                let index = match merged.iter().position(|(k, _)| k == key) {
                    Some(i) => i,
                    None => {
                        merged.push((key.clone(), Vec::new()));
                        merged.len() - 1
                    }
                };
                let slot = &mut merged[index].1;
                var.values().iter().for_each(|v| {
                    if slot.contains(v) == false {
                        slot.push(v.clone());
                    }
                });
            }
        }
        merged.into_iter().for_each(|(key, values)| {
            self.insert(
                EnvVar::new()
                    .key(&key)
                    .value(&join_paths(values.iter().map(|v| v.as_str()))),
            );
        });
        self
    }

    /// Sets a set of environment variables, consuming the list.
    pub fn initialize(self) -> () {
        self.into_iter()
            .for_each(|e| std::env::set_var(e.key, e.value));
    }

    pub fn read(key: &str) -> Option<String> {
        match std::env::var(key) {
            Ok(v) => Some(v),
            Err(_) => None,
        }
    }
}

/// Splits a variable's value on the platform path separator.
pub fn split_paths(value: &str) -> Vec<String> {
    value.split(PATH_SEPARATOR).map(|s| s.to_string()).collect()
}

/// Joins values with the platform path separator.
pub fn join_paths<'a, I: Iterator<Item = &'a str>>(values: I) -> String {
    values.collect::<Vec<&str>>().join(&PATH_SEPARATOR.to_string())
}

/// Appends `new_paths` to the process environment variable `key`, skipping
/// paths that are already present.
pub fn add_to_env(key: &str, new_paths: &[String]) -> () {
    let mut paths: Vec<String> = Environment::read(key)
        .map(|v| split_paths(&v))
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.is_empty() == false)
        .collect();
    for p in new_paths {
        if paths.contains(p) == false {
            paths.push(p.clone());
        }
    }
    std::env::set_var(key, join_paths(paths.iter().map(|p| p.as_str())));
}

/// Interprets the variable `key` as a boolean flag.
///
/// Accepts the same spellings as a typical `strtobool`: `1`, `true`, `yes`,
/// `on`, `y`, `t` (case-insensitive). Anything else, or an unset variable, is
/// `false`.
pub fn is_truthy(key: &str) -> bool {
    match Environment::read(key) {
        Some(v) => str_to_bool(&v),
        None => false,
    }
}

pub fn str_to_bool(s: &str) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "y" | "t" => true,
        _ => false,
    }
}

pub const TPDCC_LOG_LEVEL: &str = "TPDCC_LOG_LEVEL";
pub const TPDCC_DEV: &str = "TPDCC_DEV";
pub const TPDCC_PROFILE: &str = "TPDCC_PROFILE";
pub const TPCC_PROFILE_PATH: &str = "TPCC_PROFILE_PATH";

pub const TP_DCC_PIPELINE_ROOT_DIRECTORY: &str = "TP_DCC_PIPELINE_ROOT_DIRECTORY";
pub const TP_DCC_PIPELINE_SITE_PACKAGES: &str = "TP_DCC_PIPELINE_SITE_PACKAGES";

pub const TPDCC_ENV_DEV: &str = "TPDCC_ENV_DEV";
pub const TPDCC_ADMIN: &str = "TPDCC_ADMIN";
pub const TPDCC_PROJECT: &str = "TPDCC_PROJECT";
pub const TPDCC_HOST: &str = "TPDCC_HOST";
pub const TPDCC_HOST_VERSION: &str = "TPDCC_HOST_VERSION";
pub const TPDCC_PYTHON: &str = "TPDCC_PYTHON";
pub const TPDCC_CACHE_FOLDER: &str = "TPDCC_CACHE_FOLDER";
pub const TPDCC_PACKAGES_PATH: &str = "TPDCC_PACKAGES_PATH";

pub const TPDCC_PACKAGE_VERSION_PATH: &str = "TPDCC_PACKAGE_VERSION_PATH";
pub const TPDCC_PACKAGE_VERSION_FILE: &str = "TPDCC_PACKAGE_VERSION_FILE";
pub const TPDCC_PACKAGE_OVERRIDE_VERSION_PATH: &str = "TPDCC_PACKAGE_OVERRIDE_VERSION_PATH";
pub const TPDCC_PACKAGE_OVERRIDE_VERSION_FILE: &str = "TPDCC_PACKAGE_OVERRIDE_VERSION_FILE";
