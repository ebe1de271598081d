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

use colored::Colorize;
use std::{fmt::Display, path::PathBuf};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("missing required argument {0:?}{1}")]
    MissingCommandArgument(String, Hint),
    #[error("argument {0:?} cannot be used here{1}")]
    UnsupportedCommandArgument(String, Hint),
    #[error("environment config file does not exist at {0:?}")]
    MissingEnvironmentPath(PathBuf),
    #[error("package {0} already exists")]
    PackageAlreadyExists(String),
    #[error("path {0:?} does not contain a valid package")]
    InvalidPackagePath(PathBuf),
    #[error("package {0:?} does not exist in the current environment{1}")]
    MissingPackage(String, Hint),
    #[error("package {0:?} has no installed version {1:?}")]
    MissingPackageVersion(String, String),
    #[error("{0} descriptor {1:?} is missing required keys: {2}")]
    DescriptorMissingKeys(String, String, String),
    #[error("descriptor not supported: {0}")]
    UnsupportedDescriptorType(String),
    #[error("tag {0:?} already exists in the repository")]
    GitTagAlreadyExists(String),
    #[error("path {0:?} is not a valid git repository: {1}")]
    InvalidGitRepository(PathBuf, String),
    #[error("repository {0:?} has uncommitted changes")]
    DirtyGitRepo(PathBuf),
    #[error("current branch {0:?} must be \"master\" or \"main\"")]
    IncorrectCurrentBranch(String),
    #[error("git command failed: {0}")]
    GitCommand(LastError),
    #[error("package {0:?} requires a project but none is defined{1}")]
    ProjectNotDefined(String, Hint),
    #[error("no tag was created in the current session{0}")]
    GitTagNotCreated(Hint),
    #[error("path {0:?} already exists")]
    PathAlreadyExists(PathBuf),
    #[error("destination {0:?} already exists{1}")]
    DestinationExists(PathBuf, Hint),
    #[error("root path {0:?} does not exist")]
    MissingRootPath(PathBuf),
    #[error("failed to access {0:?}: {1}")]
    FileAccess(PathBuf, LastError),
    #[error("failed to parse {0:?}: {1}")]
    BadFileSyntax(PathBuf, LastError),
    #[error("command for package {0:?} failed: {1}")]
    PackageCommandFailed(String, LastError),
}

#[derive(Debug, PartialEq)]
pub struct LastError(pub String);

impl Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Error::lowerize(self.0.to_string()))
    }
}

impl Error {
    pub fn lowerize(s: String) -> String {
        // get the first word
        let first_word = match s.split_whitespace().next() {
            Some(w) => w,
            None => return s,
        };
        // retain punctuation if the first word is all-caps and longer than 1 character
        if first_word.len() > 1
            && first_word
                .chars()
                .find(|c| c.is_ascii_lowercase() == true)
                .is_none()
        {
            s.to_string()
        } else {
            s.char_indices()
                .map(|(i, c)| if i == 0 { c.to_ascii_lowercase() } else { c })
                .collect()
        }
    }

    /// Wraps an i/o failure on `path` into a typed error.
    pub fn file_access(path: &std::path::Path, e: std::io::Error) -> Self {
        Self::FileAccess(path.to_path_buf(), LastError(e.to_string()))
    }
}

#[derive(Debug, PartialEq)]
pub enum Hint {
    GitInstallArgs,
    InPlaceLocal,
    ListPackages,
    SetupForce,
    CreateTag,
    DefineProject,
    CommandHelp(&'static str),
}

impl Display for Hint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let usage;
        let message = match self {
            Self::GitInstallArgs => {
                "installing from a \".git\" path requires both \"--tag\" and \"--name\""
            }
            Self::InPlaceLocal => {
                "\"--in_place\" only applies to local paths; a \".git\" path is always cloned"
            }
            Self::CommandHelp(cmd) => {
                usage = format!("use `trellis help {}` to read more about the command", cmd);
                usage.as_str()
            }
            Self::ListPackages => "use `trellis list` to see the packages in the environment",
            Self::SetupForce => "use \"--force\" to replace the existing destination",
            Self::CreateTag => "use `trellis release --tag <tag>` to create a tag before pushing",
            Self::DefineProject => "set the TPDCC_PROJECT environment variable to a project name",
        };
        write!(
            f,
            "\n\n{}: {}",
            "hint".green(),
            Error::lowerize(message.to_string())
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lowerize_keeps_acronyms() {
        assert_eq!(
            Error::lowerize(String::from("Failed to copy")),
            String::from("failed to copy")
        );
        assert_eq!(
            Error::lowerize(String::from("YAML is broken")),
            String::from("YAML is broken")
        );
        assert_eq!(Error::lowerize(String::new()), String::new());
    }

    #[test]
    fn hint_is_appended() {
        let e = Error::MissingCommandArgument(String::from("tag"), Hint::GitInstallArgs);
        let text = e.to_string();
        assert_eq!(text.starts_with("missing required argument \"tag\""), true);
        assert_eq!(text.contains("--name"), true);
    }
}
