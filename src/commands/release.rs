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


use crate::commands::helps::release;
use crate::core::context::Context;
use crate::core::git::{ExtGit, GitBackend, RepoChecker};
use crate::core::package::Package;
use crate::util::anyerror::Fault;
use crate::util::profile;
use std::path::PathBuf;

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct Release {
    path: Option<PathBuf>,
    tag: Option<String>,
    message: Option<String>,
    push: bool,
    latest: bool,
    zip: Option<PathBuf>,
}

/// What a release run did to the repository.
#[derive(Debug, PartialEq, Default)]
pub struct ReleaseReport {
    /// The created tag, or the latest one when only asked for it.
    pub tag: Option<String>,
    pub pushed: bool,
    pub archive: Option<PathBuf>,
}

impl Subcommand<Context> for Release {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(release::HELP))?;
        Ok(Release {
            // Flags
            push: cli.check(Arg::flag("push"))?,
            latest: cli.check(Arg::flag("latest"))?,
            // Options
            path: cli.get(Arg::option("path").value("path"))?,
            tag: cli.get(Arg::option("tag").value("tag"))?,
            message: cli.get(Arg::option("message").value("msg"))?,
            zip: cli.get(Arg::option("zip").value("dir"))?,
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let report = profile::timed(c.get_profiler(), "release", || self.run_with(ExtGit::new()))?;
        if self.latest == true {
            match &report.tag {
                Some(t) => println!("{}", t),
                None => println!("info: no tags found"),
            }
            return Ok(());
        }
        if let Some(t) = &report.tag {
            println!("info: created tag {}", t);
        }
        if report.pushed == true {
            println!("info: pushed tag to remote");
        }
        if let Some(a) = &report.archive {
            println!("info: wrote archive {}", a.display());
        }
        Ok(())
    }
}

impl Release {
    pub fn new() -> Self {
        Self {
            path: None,
            tag: None,
            message: None,
            push: false,
            latest: false,
            zip: None,
        }
    }

    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn message(mut self, msg: &str) -> Self {
        self.message = Some(msg.to_string());
        self
    }

    pub fn push(mut self, flag: bool) -> Self {
        self.push = flag;
        self
    }

    pub fn latest(mut self, flag: bool) -> Self {
        self.latest = flag;
        self
    }

    pub fn zip(mut self, dir: PathBuf) -> Self {
        self.zip = Some(dir);
        self
    }

    /// Tags, pushes and archives the repository using `backend` for git.
    ///
    /// With `--latest` the repository is only queried for its newest tag.
    pub fn run_with<B: GitBackend>(&self, backend: B) -> Result<ReleaseReport, Fault> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => std::env::current_dir()?,
        };
        let mut repo = RepoChecker::with_backend(&path, backend)?;
        if self.latest == true {
            return Ok(ReleaseReport {
                tag: repo.latest_tag()?,
                ..ReleaseReport::default()
            });
        }
        repo.assert_repo()?;

        let mut report = ReleaseReport::default();
        if let Some(tag) = &self.tag {
            let message = match &self.message {
                Some(m) => m.clone(),
                None => format!("release {}", tag),
            };
            repo.create_tag(tag, &message)?;
            report.tag = Some(tag.clone());
        }
        if self.push == true {
            repo.push_tag()?;
            report.pushed = true;
        }
        if let Some(dir) = &self.zip {
            let pkg = Package::load(repo.repo_path())?;
            let (archive, _) = pkg.create_zip(Some(dir))?;
            report.archive = Some(archive);
        }
        Ok(report)
    }
}
