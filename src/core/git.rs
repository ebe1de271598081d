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


//! Git access for release tagging and for installing packages from remotes.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Hint, LastError};

/// Branches a release may be tagged from.
const RELEASE_BRANCHES: [&str; 2] = ["master", "main"];

/// The git operations needed by [RepoChecker].
pub trait GitBackend {
    fn is_repo(&self, path: &Path) -> bool;

    fn is_bare(&self, path: &Path) -> Result<bool, Error>;

    /// Checks for uncommitted changes to tracked files.
    fn is_dirty(&self, path: &Path) -> Result<bool, Error>;

    fn active_branch(&self, path: &Path) -> Result<String, Error>;

    /// Lists the tags ordered from the oldest to the newest date of the commit
    /// each tag points to.
    fn tags_by_date(&self, path: &Path) -> Result<Vec<String>, Error>;

    fn create_tag(&self, path: &Path, name: &str, message: &str) -> Result<(), Error>;

    fn push_tag(&self, path: &Path, name: &str) -> Result<(), Error>;

    fn checkout(&self, path: &Path, reference: &str) -> Result<(), Error>;

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error>;

    fn version(&self) -> Result<String, Error>;
}

/// A series of git commands run through subprocesses rather than library bindings.
#[derive(Debug, Clone)]
pub struct ExtGit {
    command: String,
}

impl ExtGit {
    pub fn new() -> Self {
        Self {
            command: String::from("git"),
        }
    }

    /// Sets the command for calling git through processes.
    ///
    /// When `s` is `None`, the command assumes git is on path and is simply `git`.
    pub fn command(mut self, s: Option<String>) -> Self {
        self.command = s.unwrap_or(String::from("git"));
        self
    }

    /// Runs git with `args` from `dir` and returns its trimmed stdout.
    fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, Error> {
        let mut proc = Command::new(&self.command);
        proc.args(args);
        if let Some(d) = dir {
            proc.current_dir(d);
        }
        let output = proc
            .output()
            .map_err(|e| Error::GitCommand(LastError(e.to_string())))?;
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            Some(num) => Err(Error::GitCommand(LastError(format!(
                "git {} exited with error code {}: {}",
                args.join(" "),
                num,
                String::from_utf8_lossy(&output.stderr).trim()
            )))),
            None => Err(Error::GitCommand(LastError(format!(
                "git {} terminated by signal",
                args.join(" ")
            )))),
        }
    }
}

impl GitBackend for ExtGit {
    fn is_repo(&self, path: &Path) -> bool {
        path.is_dir() && self.run(Some(path), &["rev-parse", "--git-dir"]).is_ok()
    }

    fn is_bare(&self, path: &Path) -> Result<bool, Error> {
        Ok(self.run(Some(path), &["rev-parse", "--is-bare-repository"])? == "true")
    }

    fn is_dirty(&self, path: &Path) -> Result<bool, Error> {
        let status = self.run(
            Some(path),
            &["status", "--porcelain", "--untracked-files=no"],
        )?;
        Ok(status.is_empty() == false)
    }

    fn active_branch(&self, path: &Path) -> Result<String, Error> {
        self.run(Some(path), &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn tags_by_date(&self, path: &Path) -> Result<Vec<String>, Error> {
        // annotated tags carry their commit date in the peeled `*committerdate`,
        // lightweight tags point at the commit directly
        let out = self.run(
            Some(path),
            &[
                "for-each-ref",
                "--sort=refname",
                "--format=%(refname:short)|%(*committerdate:raw)|%(committerdate:raw)",
                "refs/tags",
            ],
        )?;
        let mut tags: Vec<(i64, String)> = out
            .lines()
            .filter_map(|l| parse_tag_line(l.trim()))
            .collect();
        // stable sort keeps name order for commits sharing a timestamp
        tags.sort_by_key(|(stamp, _)| *stamp);
        Ok(tags.into_iter().map(|(_, name)| name).collect())
    }

    fn create_tag(&self, path: &Path, name: &str, message: &str) -> Result<(), Error> {
        self.run(Some(path), &["tag", "-a", name, "-m", message])?;
        Ok(())
    }

    fn push_tag(&self, path: &Path, name: &str) -> Result<(), Error> {
        self.run(Some(path), &["push", "origin", name])?;
        Ok(())
    }

    fn checkout(&self, path: &Path, reference: &str) -> Result<(), Error> {
        self.run(Some(path), &["checkout", reference])?;
        Ok(())
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let dest = dest.display().to_string();
        self.run(None, &["clone", url, &dest])?;
        Ok(())
    }

    fn version(&self) -> Result<String, Error> {
        self.run(None, &["--version"])
    }
}

/// Reads a `name|peeled date|date` line into the tag's commit timestamp and name.
///
/// Dates are in git's raw `<seconds> <offset>` form; a tag with no commit date
/// sorts first.
fn parse_tag_line(line: &str) -> Option<(i64, String)> {
    let mut fields = line.split('|');
    let name = fields.next().filter(|n| n.is_empty() == false)?;
    let stamp = fields
        .filter_map(|f| f.split_whitespace().next())
        .find_map(|f| f.parse::<i64>().ok())
        .unwrap_or(0);
    Some((stamp, name.to_string()))
}

/// Checks whether git is callable on this system.
pub fn has_git<B: GitBackend>(backend: &B) -> bool {
    backend.version().is_ok()
}

/// Derives the checkout folder name from a remote url (`.../pkg.git` -> `pkg`).
pub fn repo_name_from_url(url: &str) -> String {
    let base = url
        .trim_end_matches('/')
        .rsplit(|c| c == '/' || c == '\\' || c == ':')
        .next()
        .unwrap_or(url);
    base.strip_suffix(".git").unwrap_or(base).to_string()
}

/// Guards a local repository before tagging and pushing a release.
#[derive(Debug)]
pub struct RepoChecker<B: GitBackend = ExtGit> {
    backend: B,
    repo_path: PathBuf,
    tag: Option<String>,
}

impl RepoChecker<ExtGit> {
    /// Wraps the repository at `path` using the git executable.
    pub fn open(path: &Path) -> Result<Self, Error> {
        Self::with_backend(path, ExtGit::new())
    }

    /// Clones `url` into a folder named after the repository inside `dest`.
    pub fn clone(url: &str, dest: &Path) -> Result<Self, Error> {
        Self::clone_with(ExtGit::new(), url, dest)
    }
}

impl<B: GitBackend> RepoChecker<B> {
    /// Wraps the repository at `path` using `backend` for git operations.
    ///
    /// Errors if `path` is not a repository or is a bare repository.
    pub fn with_backend(path: &Path, backend: B) -> Result<Self, Error> {
        if backend.is_repo(path) == false {
            return Err(Error::InvalidGitRepository(
                path.to_path_buf(),
                String::from("not a git repository"),
            ));
        }
        if backend.is_bare(path)? == true {
            return Err(Error::InvalidGitRepository(
                path.to_path_buf(),
                String::from("repository is bare"),
            ));
        }
        Ok(Self {
            backend,
            repo_path: path.to_path_buf(),
            tag: None,
        })
    }

    pub fn clone_with(backend: B, url: &str, dest: &Path) -> Result<Self, Error> {
        let target = dest.join(repo_name_from_url(url));
        tracing::debug!("cloning {} into {:?}", url, target);
        backend.clone_repo(url, &target)?;
        Self::with_backend(&target, backend)
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// The tag created during this session, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verifies the repository is clean and on a release branch.
    pub fn assert_repo(&self) -> Result<(), Error> {
        if self.backend.is_dirty(&self.repo_path)? == true {
            return Err(Error::DirtyGitRepo(self.repo_path.clone()));
        }
        let branch = self.backend.active_branch(&self.repo_path)?;
        if RELEASE_BRANCHES.contains(&branch.as_str()) == false {
            return Err(Error::IncorrectCurrentBranch(branch));
        }
        Ok(())
    }

    /// Lists tags from the oldest to the newest commit date.
    pub fn tags(&self) -> Result<Vec<String>, Error> {
        self.backend.tags_by_date(&self.repo_path)
    }

    pub fn has_tag(&self, name: &str) -> Result<bool, Error> {
        Ok(self.tags()?.iter().any(|t| t == name))
    }

    /// Returns the most recently dated tag, or `None` when there are no tags.
    pub fn latest_tag(&self) -> Result<Option<String>, Error> {
        let tags = self.tags()?;
        if tags.is_empty() == true {
            tracing::warn!("no tags found in repository {:?}", self.repo_path);
        }
        Ok(tags.last().cloned())
    }

    /// Creates an annotated tag after checking the repository is releasable.
    pub fn create_tag(&mut self, name: &str, message: &str) -> Result<(), Error> {
        self.assert_repo()?;
        if self.has_tag(name)? == true {
            return Err(Error::GitTagAlreadyExists(name.to_string()));
        }
        self.backend.create_tag(&self.repo_path, name, message)?;
        self.tag = Some(name.to_string());
        Ok(())
    }

    /// Pushes the tag created during this session to the remote.
    pub fn push_tag(&self) -> Result<(), Error> {
        match &self.tag {
            Some(t) => self.backend.push_tag(&self.repo_path, t),
            None => Err(Error::GitTagNotCreated(Hint::CreateTag)),
        }
    }

    pub fn checkout(&self, reference: &str) -> Result<(), Error> {
        self.backend.checkout(&self.repo_path, reference)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::cell::RefCell;

    /// In-memory stand-in for a git repository.
    #[derive(Debug, Default)]
    pub struct MockGit {
        pub repo: bool,
        pub bare: bool,
        pub dirty: RefCell<bool>,
        pub branch: RefCell<String>,
        pub tags: RefCell<Vec<String>>,
        pub pushed: RefCell<Vec<String>>,
        pub checked_out: RefCell<Vec<String>>,
        /// Manifest written into the destination of a clone.
        pub clone_manifest: Option<String>,
        /// Acts as if git is not installed.
        pub missing: bool,
    }

    impl MockGit {
        pub fn new() -> Self {
            Self {
                repo: true,
                branch: RefCell::new(String::from("main")),
                ..Self::default()
            }
        }
    }

    impl GitBackend for MockGit {
        fn is_repo(&self, _: &Path) -> bool {
            self.repo
        }

        fn is_bare(&self, _: &Path) -> Result<bool, Error> {
            Ok(self.bare)
        }

        fn is_dirty(&self, _: &Path) -> Result<bool, Error> {
            Ok(*self.dirty.borrow())
        }

        fn active_branch(&self, _: &Path) -> Result<String, Error> {
            Ok(self.branch.borrow().clone())
        }

        fn tags_by_date(&self, _: &Path) -> Result<Vec<String>, Error> {
            Ok(self.tags.borrow().clone())
        }

        fn create_tag(&self, _: &Path, name: &str, _: &str) -> Result<(), Error> {
            self.tags.borrow_mut().push(name.to_string());
            Ok(())
        }

        fn push_tag(&self, _: &Path, name: &str) -> Result<(), Error> {
            self.pushed.borrow_mut().push(name.to_string());
            Ok(())
        }

        fn checkout(&self, _: &Path, reference: &str) -> Result<(), Error> {
            self.checked_out.borrow_mut().push(reference.to_string());
            Ok(())
        }

        fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error> {
            match &self.clone_manifest {
                Some(text) => {
                    std::fs::create_dir_all(dest).map_err(|e| Error::file_access(dest, e))?;
                    std::fs::write(dest.join("package.yaml"), text)
                        .map_err(|e| Error::file_access(dest, e))?;
                    Ok(())
                }
                None => Err(Error::GitCommand(LastError(format!(
                    "repository {} not found",
                    url
                )))),
            }
        }

        fn version(&self) -> Result<String, Error> {
            match self.missing {
                true => Err(Error::GitCommand(LastError(String::from(
                    "git: command not found",
                )))),
                false => Ok(String::from("git version 2.40.0")),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockGit;
    use super::*;

    fn checker(git: MockGit) -> RepoChecker<MockGit> {
        RepoChecker::with_backend(Path::new("/repo"), git).unwrap()
    }

    #[test]
    fn open_requires_non_bare_repo() {
        let mut git = MockGit::new();
        git.repo = false;
        assert_eq!(
            RepoChecker::with_backend(Path::new("/repo"), git).unwrap_err(),
            Error::InvalidGitRepository(PathBuf::from("/repo"), String::from("not a git repository"))
        );
        let mut git = MockGit::new();
        git.bare = true;
        assert_eq!(
            RepoChecker::with_backend(Path::new("/repo"), git).is_err(),
            true
        );
    }

    #[test]
    fn assert_repo_checks_every_time() {
        let repo = checker(MockGit::new());
        assert_eq!(repo.assert_repo(), Ok(()));

        *repo.backend().dirty.borrow_mut() = true;
        assert_eq!(
            repo.assert_repo(),
            Err(Error::DirtyGitRepo(PathBuf::from("/repo")))
        );

        *repo.backend().dirty.borrow_mut() = false;
        *repo.backend().branch.borrow_mut() = String::from("feature/x");
        assert_eq!(
            repo.assert_repo(),
            Err(Error::IncorrectCurrentBranch(String::from("feature/x")))
        );

        *repo.backend().branch.borrow_mut() = String::from("master");
        assert_eq!(repo.assert_repo(), Ok(()));
    }

    #[test]
    fn latest_tag_of_empty_repo() {
        let repo = checker(MockGit::new());
        assert_eq!(repo.latest_tag(), Ok(None));
        repo.backend().tags.borrow_mut().extend([
            String::from("1.0.0"),
            String::from("0.9.0"),
        ]);
        // ordering is by date as reported by the backend
        assert_eq!(repo.latest_tag(), Ok(Some(String::from("0.9.0"))));
    }

    #[test]
    fn parse_tag_dates() {
        assert_eq!(
            parse_tag_line("1.0.0|1577836800 +0000|1704067200 +0100"),
            Some((1577836800, String::from("1.0.0")))
        );
        assert_eq!(
            parse_tag_line("light||1640995200 -0500"),
            Some((1640995200, String::from("light")))
        );
        assert_eq!(parse_tag_line("odd||"), Some((0, String::from("odd"))));
        assert_eq!(parse_tag_line(""), None);
    }

    #[test]
    fn has_git_reports_missing_binary() {
        assert_eq!(has_git(&MockGit::new()), true);
        let git = MockGit {
            missing: true,
            ..MockGit::new()
        };
        assert_eq!(has_git(&git), false);
        let git = ExtGit::new().command(Some(String::from("trellis-no-such-git")));
        assert_eq!(has_git(&git), false);
    }

    /// Runs git in `dir` with a fixed identity and author/committer date.
    fn git_at(dir: &Path, date: &str, args: &[&str]) {
        let out = Command::new("git")
            .args(["-c", "user.name=trellis", "-c", "user.email=trellis@example.com"])
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?}: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    #[test]
    fn tags_follow_commit_dates() {
        if has_git(&ExtGit::new()) == false {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        git_at(repo, "2020-01-01T00:00:00Z", &["init", "-q"]);
        git_at(repo, "2020-01-01T00:00:00Z", &["commit", "-q", "--allow-empty", "-m", "old"]);
        git_at(repo, "2020-01-01T00:00:00Z", &["tag", "-a", "hotfix-old", "-m", "old"]);
        git_at(repo, "2022-01-01T00:00:00Z", &["commit", "-q", "--allow-empty", "-m", "new"]);
        git_at(repo, "2022-01-01T00:00:00Z", &["tag", "-a", "2.0.0", "-m", "new"]);
        // tagged two years after the commit it points to
        git_at(
            repo,
            "2024-01-01T00:00:00Z",
            &["tag", "-a", "1.0.1", "-m", "late", "hotfix-old^{}"],
        );

        let checker = RepoChecker::open(repo).unwrap();
        assert_eq!(
            checker.tags().unwrap(),
            vec![
                String::from("1.0.1"),
                String::from("hotfix-old"),
                String::from("2.0.0")
            ]
        );
        assert_eq!(checker.latest_tag().unwrap(), Some(String::from("2.0.0")));
    }

    #[test]
    fn tag_then_push() {
        let mut repo = checker(MockGit::new());
        assert_eq!(
            repo.push_tag(),
            Err(Error::GitTagNotCreated(Hint::CreateTag))
        );
        repo.create_tag("1.0.0", "first release").unwrap();
        assert_eq!(repo.tag(), Some("1.0.0"));
        assert_eq!(
            repo.create_tag("1.0.0", "again"),
            Err(Error::GitTagAlreadyExists(String::from("1.0.0")))
        );
        repo.push_tag().unwrap();
        assert_eq!(*repo.backend().pushed.borrow(), vec![String::from("1.0.0")]);
    }

    #[test]
    fn create_tag_requires_clean_repo() {
        let git = MockGit::new();
        *git.dirty.borrow_mut() = true;
        let mut repo = checker(git);
        assert_eq!(
            repo.create_tag("1.0.0", ""),
            Err(Error::DirtyGitRepo(PathBuf::from("/repo")))
        );
        assert_eq!(repo.tag(), None);
    }

    #[test]
    fn repo_names() {
        assert_eq!(repo_name_from_url("https://example.com/org/pkg.git"), "pkg");
        assert_eq!(repo_name_from_url("git@example.com:org/tools.git"), "tools");
        assert_eq!(repo_name_from_url("/local/repo/"), "repo");
    }
}
