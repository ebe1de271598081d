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


use crate::commands::helps::env;
use crate::core::context::Context;
use crate::core::manager::PackagesManager;
use crate::core::package::Package;
use crate::core::resolver::ResolveOptions;
use crate::util::anyerror::Fault;
use crate::util::environment::Environment;
use crate::util::filesystem;

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct Env {
    file: Option<String>,
    no_override: bool,
    startup: bool,
    keys: Vec<String>,
}

impl Subcommand<Context> for Env {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(env::HELP))?;
        Ok(Env {
            // Flags
            no_override: cli.check(Arg::flag("no-override"))?,
            startup: cli.check(Arg::flag("startup"))?,
            // Options
            file: cli.get(Arg::option("file").value("path"))?,
            keys: cli
                .get_all(Arg::option("key").value("key"))?
                .unwrap_or_default(),
        })
    }

    fn execute(self, c: &Context) -> proc::Result {
        let mut manager = c.manager()?;
        let packages = self.resolve(&mut manager)?;
        let env = Environment::new().from_packages(&packages);
        println!("{}", self.render(&env));
        if self.startup == true {
            manager.shutdown();
        }
        Ok(())
    }
}

impl Env {
    pub fn new() -> Self {
        Self {
            file: None,
            no_override: false,
            startup: false,
            keys: Vec::new(),
        }
    }

    pub fn file(mut self, path: &str) -> Self {
        self.file = Some(path.to_string());
        self
    }

    pub fn no_override(mut self, flag: bool) -> Self {
        self.no_override = flag;
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.keys.push(key.to_string());
        self
    }

    /// Resolves the requested environment file.
    ///
    /// Startup commands only run, and the process environment is only
    /// touched, when `--startup` is given.
    pub fn resolve(&self, manager: &mut PackagesManager) -> Result<Vec<Package>, Fault> {
        let opts = ResolveOptions {
            apply: self.startup,
            run_commands: self.startup,
        };
        let path = match &self.file {
            Some(f) => filesystem::resolve_rel_path(&std::env::current_dir()?, f),
            None => manager.resolver().environment_path()?,
        };
        Ok(manager
            .resolver_mut()
            .resolve_from_path(&path, self.no_override == false, opts)?)
    }

    /// Formats every variable, or only the values of the requested keys.
    pub fn render(&self, env: &Environment) -> String {
        match self.keys.is_empty() {
            true => env
                .iter()
                .map(|e| format!("{:?}", e))
                .collect::<Vec<String>>()
                .join("\n"),
            false => self
                .keys
                .iter()
                .map(|k| match env.get(k) {
                    Some(entry) => entry.get_value().to_string(),
                    None => String::new(),
                })
                .collect::<Vec<String>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::descriptor::{DescriptorInfo, DescriptorKind};
    use crate::core::package::{Manifest, PACKAGE_FILE};
    use crate::core::resolver::{ENV_FOLDER, OVERRIDE_FILE};
    use crate::util::environment::EnvVar;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_manifest(packages: &Path, manifest: &Manifest, version: &str) -> std::path::PathBuf {
        let dir = packages.join(manifest.name()).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PACKAGE_FILE), serde_yaml::to_string(manifest).unwrap()).unwrap();
        dir
    }

    fn installed(name: &str, version: &str) -> DescriptorInfo {
        DescriptorInfo::new()
            .name(name)
            .version(version)
            .kind(DescriptorKind::Installed)
    }

    #[test]
    fn render_all_and_keys() {
        let env = Environment::new()
            .add(EnvVar::new().key("B").value("2"))
            .add(EnvVar::new().key("A").value("1"));
        assert_eq!(Env::new().render(&env), "A=\"1\"\nB=\"2\"");
        assert_eq!(Env::new().key("B").key("C").key("A").render(&env), "2\n\n1");
    }

    #[test]
    fn resolves_environment_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        let mut manager = PackagesManager::new(dir.path(), false).unwrap();
        let manifest = Manifest::new("core", "1.0.0")
            .environment("TRELLIS_ENV_CMD_TEST_PATH", &["{self}/lib", "{dep.tools}/bin"]);
        let core = write_manifest(manager.packages_path(), &manifest, "1.0.0");
        let manifest = Manifest::new("tools", "2.0.0")
            .environment("TRELLIS_ENV_CMD_TEST_PATH", &["{self}/lib"]);
        let tools = write_manifest(manager.packages_path(), &manifest, "2.0.0");
        manager
            .resolver()
            .create_environment_file(&[installed("core", "1.0.0"), installed("tools", "2.0.0")])
            .unwrap();

        let cmd = Env::new().key("TRELLIS_ENV_CMD_TEST_PATH");
        let packages = cmd.resolve(&mut manager).unwrap();
        assert_eq!(packages.len(), 2);
        let env = Environment::new().from_packages(&packages);
        let value = cmd.render(&env);
        let parts = crate::util::environment::split_paths(&value);
        assert_eq!(
            parts,
            vec![
                core.join("lib").display().to_string(),
                tools.join("bin").display().to_string(),
                tools.join("lib").display().to_string(),
            ]
        );
        // nothing was applied to the process
        assert!(std::env::var("TRELLIS_ENV_CMD_TEST_PATH").is_err());
    }

    #[test]
    fn override_can_be_skipped() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        let mut manager = PackagesManager::new(dir.path(), false).unwrap();
        let manifest = Manifest::new("core", "1.0.0").environment("TRELLIS_ENV_OVR_A", &["a"]);
        write_manifest(manager.packages_path(), &manifest, "1.0.0");
        let manifest = Manifest::new("core", "1.1.0").environment("TRELLIS_ENV_OVR_B", &["b"]);
        write_manifest(manager.packages_path(), &manifest, "1.1.0");
        manager
            .resolver()
            .create_environment_file(&[installed("core", "1.0.0")])
            .unwrap();
        std::fs::write(
            manager.config_path().join(ENV_FOLDER).join(OVERRIDE_FILE),
            "requirements:\n  - \"https://example.com/core.git: 1.1.0\"\n",
        )
        .unwrap();

        let pkgs = Env::new().resolve(&mut manager).unwrap();
        assert_eq!(pkgs[0].version(), "1.1.0");

        let mut manager = PackagesManager::new(dir.path(), false).unwrap();
        let pkgs = Env::new().no_override(true).resolve(&mut manager).unwrap();
        assert_eq!(pkgs[0].version(), "1.0.0");
    }

    #[test]
    fn explicit_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages")).unwrap();
        let mut manager = PackagesManager::new(dir.path(), false).unwrap();
        let manifest = Manifest::new("core", "1.0.0").environment("TRELLIS_ENV_FILE_A", &["a"]);
        write_manifest(manager.packages_path(), &manifest, "1.0.0");
        let file = dir.path().join("other.config");
        crate::core::resolver::Resolver::write_environment_file(&file, &[installed("core", "1.0.0")])
            .unwrap();

        let pkgs = Env::new()
            .file(&file.display().to_string())
            .resolve(&mut manager)
            .unwrap();
        assert_eq!(pkgs.len(), 1);
    }
}
