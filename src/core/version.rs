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


//! Loose version strings such as `1.2.0`, `2.0-beta1` or `DEV`.
//!
//! Versions are split into numeric and alphabetic components and compared
//! component by component. At the same position a number sorts before text.

use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

/// Version label used by packages that live in a development checkout.
pub const DEV_VERSION: &str = "DEV";

/// Keyword accepted in place of a version to mean the newest installed one.
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
    Num(u64),
    Alpha(String),
}

#[derive(Debug, Clone)]
pub struct LooseVersion {
    text: String,
    parts: Vec<Component>,
}

impl LooseVersion {
    pub fn new(s: &str) -> Self {
        Self {
            text: s.to_string(),
            parts: Self::components(s),
        }
    }

    fn components(s: &str) -> Vec<Component> {
        let mut parts = Vec::new();
        let mut word = String::new();
        let mut numeric = false;

        let flush = |word: &mut String, numeric: bool, parts: &mut Vec<Component>| {
            if word.is_empty() == false {
                parts.push(match numeric {
                    true => match word.parse::<u64>() {
                        Ok(n) => Component::Num(n),
                        Err(_) => Component::Alpha(word.clone()),
                    },
                    false => Component::Alpha(word.clone()),
                });
                word.clear();
            }
        };

        for c in s.trim().chars() {
            if c == '.' || c == '-' || c == '_' || c == '+' {
                flush(&mut word, numeric, &mut parts);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if word.is_empty() == false && is_digit != numeric {
                flush(&mut word, numeric, &mut parts);
            }
            numeric = is_digit;
            word.push(c);
        }
        flush(&mut word, numeric, &mut parts);
        parts
    }

    pub fn is_dev(&self) -> bool {
        self.text == DEV_VERSION
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for LooseVersion {}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl Display for LooseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl FromStr for LooseVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnyVersion {
    Specific(LooseVersion),
    Latest,
}

impl AnyVersion {
    pub fn is_latest(&self) -> bool {
        self == &Self::Latest
    }
}

impl Display for AnyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "{}", LATEST),
            Self::Specific(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for AnyVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(LATEST) == true || s.trim().is_empty() == true {
            Ok(Self::Latest)
        } else {
            Ok(Self::Specific(LooseVersion::new(s)))
        }
    }
}

/// Finds the version in `space` that satisfies `ver`.
///
/// A specific version must match exactly; `latest` picks the greatest one.
pub fn get_target_version<'a>(ver: &AnyVersion, space: &[&'a str]) -> Option<&'a str> {
    match ver {
        AnyVersion::Specific(v) => space
            .iter()
            .find(|s| s.trim() == v.as_str().trim())
            .copied(),
        AnyVersion::Latest => space
            .iter()
            .max_by(|a, b| LooseVersion::new(a).cmp(&LooseVersion::new(b)))
            .copied(),
    }
}
