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


use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::core::token::{self, TokenTable};
use crate::util::environment::{self, Environment};

fn dependency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{dep\.([\w\-]+)\}").unwrap())
}

/// An environment variable declared by a package.
///
/// Values may contain `{token}` placeholders until the variable is solved.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    key: String,
    values: Vec<String>,
    original_values: Vec<String>,
}

impl Variable {
    /// Creates a variable, appending whatever the process environment already
    /// holds for `key`.
    pub fn new(key: &str, values: Vec<String>) -> Self {
        Self::with_external(key, values, Environment::read(key).as_deref())
    }

    /// Creates a variable, appending the path-separated `external` value.
    ///
    /// Empty external values are ignored. The snapshot used by [Variable::reset]
    /// is taken after the external values are appended.
    pub fn with_external(key: &str, mut values: Vec<String>, external: Option<&str>) -> Self {
        if let Some(ext) = external {
            if ext.is_empty() == false {
                values.extend(environment::split_paths(ext));
            }
        }
        Self {
            key: key.to_string(),
            original_values: values.clone(),
            values,
        }
    }

    /// Creates a variable that ignores the process environment.
    pub fn detached(key: &str, values: Vec<String>) -> Self {
        Self::with_external(key, values, None)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn original_values(&self) -> &[String] {
        &self.original_values
    }

    /// Splits the joined representation on `sep`.
    pub fn split(&self, sep: &str) -> Vec<String> {
        self.to_string().split(sep).map(|s| s.to_string()).collect()
    }

    /// Collects the names of every package referenced as `{dep.<name>}`.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.values
            .iter()
            .flat_map(|v| {
                dependency_pattern()
                    .captures_iter(v)
                    .map(|c| c[1].to_string())
                    .collect::<Vec<String>>()
            })
            .collect()
    }

    /// Replaces the tokens of every value in place and returns the new values.
    pub fn solve(&mut self, tokens: &TokenTable) -> &[String] {
        self.values = self
            .values
            .iter()
            .map(|v| token::substitute(v, tokens))
            .collect();
        &self.values
    }

    /// Restores the values captured at construction.
    pub fn reset(&mut self) {
        self.values = self.original_values.clone();
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            environment::join_paths(self.values.iter().map(|v| v.as_str()))
        )
    }
}
