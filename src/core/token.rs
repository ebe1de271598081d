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


use std::collections::btree_map::Iter;
use std::collections::BTreeMap;

/// Lookup table of `{key}` tokens and the text that replaces them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenTable(BTreeMap<String, String>);

impl TokenTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn add(&mut self, key: &str, value: &str) -> Option<String> {
        self.0.insert(key.to_string(), value.to_string())
    }

    /// Builder form of [TokenTable::add].
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.add(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    /// Copies every entry of `rhs` into `self`, overwriting existing keys.
    pub fn extend(&mut self, rhs: &TokenTable) {
        rhs.iter().for_each(|(k, v)| {
            self.0.insert(k.clone(), v.clone());
        });
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

const L_VAR_DELIMITER: char = '{';
const R_VAR_DELIMITER: char = '}';

/// Performs token replacement on the given `text`, looking up keys in `table`.
///
/// Text is scanned once from left to right. A `{key}` whose key is in the table
/// is replaced by its value; the inserted value is never scanned again. Unknown
/// keys and unclosed braces are left as written.
pub fn substitute(text: &str, table: &TokenTable) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(L_VAR_DELIMITER) {
        result.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        // the key ends at the next closing brace, unless another opening brace comes first
        let end = tail
            .find(R_VAR_DELIMITER)
            .filter(|end| tail[..*end].contains(L_VAR_DELIMITER) == false);
        match end.and_then(|end| table.get(&tail[..end]).map(|v| (end, v))) {
            Some((end, value)) => {
                result.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                result.push(L_VAR_DELIMITER);
                rest = tail;
            }
        }
    }
    result.push_str(rest);
    result
}
