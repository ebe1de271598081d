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


//! Package requirement lines of the form `name==version`.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::Hash;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::Error;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([^=\s]+)==([^=\s]+)$").unwrap())
}

/// A single dependency on another package.
///
/// Two requirements are equal when their names and versions are equal, no
/// matter how the original line was written.
#[derive(Debug, Clone)]
pub struct Requirement {
    raw: String,
    name: String,
    version: String,
    valid: bool,
}

impl Requirement {
    /// Parses a requirement line.
    ///
    /// The line is trimmed first. A line without a `==` separator is treated as
    /// a bare name with an empty version. Parsing never fails.
    pub fn from_line(line: &str) -> Self {
        let trimmed = line.trim();
        let (name, version) = match pattern().captures(trimmed) {
            Some(caps) => (caps[1].to_string(), caps[2].to_string()),
            None => (trimmed.to_string(), String::new()),
        };
        Self {
            raw: line.to_string(),
            name,
            version,
            valid: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version.is_empty() {
            true => write!(f, "{}", self.name),
            false => write!(f, "{}=={}", self.name, self.version),
        }
    }
}

impl FromStr for Requirement {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_line(s))
    }
}

impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_line(&s))
    }
}

/// An ordered collection of requirements without duplicates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequirementsList(Vec<Requirement>);

impl RequirementsList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list keeping the first occurrence of every requirement.
    pub fn from_vec(reqs: Vec<Requirement>) -> Self {
        let mut list = Self::new();
        list.extend(reqs);
        list
    }

    /// Parses one requirement per non-blank line of `text`.
    pub fn from_text(text: &str) -> Self {
        Self::from_vec(
            text.lines()
                .filter(|l| l.trim().is_empty() == false)
                .map(Requirement::from_line)
                .collect(),
        )
    }

    /// Reads a requirements file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_access(path, e))?;
        Ok(Self::from_text(&text))
    }

    /// Adds `req` to the end of the list.
    ///
    /// Returns `false` and leaves the list unchanged when an equal requirement
    /// is already present.
    pub fn append(&mut self, req: Requirement) -> bool {
        match self.contains(&req) {
            true => false,
            false => {
                self.0.push(req);
                true
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = Requirement>>(&mut self, reqs: I) {
        reqs.into_iter().for_each(|r| {
            self.append(r);
        });
    }

    pub fn contains(&self, req: &Requirement) -> bool {
        self.0.contains(req)
    }

    /// Finds the first requirement with the given package name.
    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.0.iter().find(|r| r.name() == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Requirement> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Requirement> {
        self.0.iter_mut()
    }
}

impl std::fmt::Display for RequirementsList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for req in &self.0 {
            writeln!(f, "{}", req)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RequirementsList {
    type Item = &'a Requirement;
    type IntoIter = std::slice::Iter<'a, Requirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_pinned() {
        let req = Requirement::from_line("  tp-dcc-core==1.2.0 \n");
        assert_eq!(req.name(), "tp-dcc-core");
        assert_eq!(req.version(), "1.2.0");
        assert_eq!(req.is_valid(), true);
        assert_eq!(req.to_string(), "tp-dcc-core==1.2.0");
    }

    #[test]
    fn parse_bare_and_malformed() {
        let req = Requirement::from_line("tp-dcc-core");
        assert_eq!(req.name(), "tp-dcc-core");
        assert_eq!(req.version(), "");
        assert_eq!(req.to_string(), "tp-dcc-core");

        // whitespace around the separator does not match the pinned form
        let req = Requirement::from_line("a == 1.0");
        assert_eq!(req.name(), "a == 1.0");
        assert_eq!(req.version(), "");

        let req = Requirement::from_line("a==1==2");
        assert_eq!(req.name(), "a==1==2");
        assert_eq!(req.version(), "");
        assert_eq!(req.is_valid(), true);
    }

    #[test]
    fn equality_ignores_raw_text() {
        let a = Requirement::from_line("a==1.0");
        let b = Requirement::from_line("   a==1.0");
        assert_eq!(a, b);
        assert_ne!(a, Requirement::from_line("a==1.1"));

        let mut set = HashSet::new();
        set.insert(a);
        assert_eq!(set.insert(b), false);
    }

    #[test]
    fn list_dedups_in_order() {
        let mut list = RequirementsList::from_text("b==2\n\na==1\n  b==2\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list.append(Requirement::from_line("a==1")), false);
        assert_eq!(list.append(Requirement::from_line("c")), true);
        assert_eq!(list.to_string(), "b==2\na==1\nc\n");
        assert_eq!(list.get("a").unwrap().version(), "1");
        assert_eq!(list.is_empty(), false);
        assert_eq!(RequirementsList::new().is_empty(), true);
    }

    #[test]
    fn serde_as_string() {
        let reqs: Vec<Requirement> = serde_yaml::from_str("- a==1\n- b\n").unwrap();
        assert_eq!(reqs[0].version(), "1");
        assert_eq!(reqs[1].name(), "b");
        let text = serde_yaml::to_string(&reqs).unwrap();
        assert_eq!(text, "- a==1\n- b\n");
    }
}
