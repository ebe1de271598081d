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


use crate::commands::env::Env;
use crate::commands::help::Help as HelpCommand;
use crate::commands::helps::trellis;
use crate::commands::install::InstallPackage;
use crate::commands::list::List;
use crate::commands::release::Release;
use crate::commands::setup::Setup;
use crate::commands::uninstall::Uninstall;
use crate::core::context::Context;
use crate::core::host::Host;
use crate::util::logging;
use std::path::PathBuf;

use cliproc::{cli, proc, stage::*};
use cliproc::{Arg, Cli, Command, Help, Subcommand};

#[derive(Debug, PartialEq)]
pub struct Trellis {
    root: Option<PathBuf>,
    dev: bool,
    version: bool,
    command: Option<TrellisSubcommand>,
}

impl Command for Trellis {
    fn interpret(cli: &mut Cli<Memory>) -> cli::Result<Self> {
        cli.help(Help::with(trellis::HELP))?;
        Ok(Trellis {
            // Flags
            dev: cli.check(Arg::flag("dev"))?,
            version: cli.check(Arg::flag("version"))?,
            // Options
            root: cli.get(Arg::option("root").value("path"))?,
            // Subcommands
            command: cli.nest(Arg::subcommand("command"))?,
        })
    }

    fn execute(self) -> proc::Result {
        // prioritize version information
        if self.version == true {
            println!("trellis {}", VERSION);
            return Ok(());
        }
        let command = match self.command {
            Some(c) => c,
            None => {
                println!("{}", trellis::HELP);
                return Ok(());
            }
        };
        // the guard keeps the subscriber installed until the command finishes
        let _log = logging::init(
            Host::from_env(),
            &logging::resolve_level(Some(&logging::level_from_env()), self.dev),
        );
        let context = Context::from_env(self.root, self.dev)?;
        command.execute(&context)
    }
}

#[derive(Debug, PartialEq)]
enum TrellisSubcommand {
    Help(HelpCommand),
    Install(InstallPackage),
    Setup(Setup),
    Uninstall(Uninstall),
    Env(Env),
    List(List),
    Release(Release),
}

impl Subcommand<Context> for TrellisSubcommand {
    fn interpret<'c>(cli: &'c mut Cli<Memory>) -> cli::Result<Self> {
        match cli
            .select(&[
                "help",
                "install",
                "installPackage",
                "setup",
                "uninstall",
                "env",
                "list",
                "release",
            ])?
            .as_ref()
        {
            "help" => Ok(Self::Help(HelpCommand::interpret(cli)?)),
            "install" | "installPackage" => Ok(Self::Install(InstallPackage::interpret(cli)?)),
            "setup" => Ok(Self::Setup(Setup::interpret(cli)?)),
            "uninstall" => Ok(Self::Uninstall(Uninstall::interpret(cli)?)),
            "env" => Ok(Self::Env(Env::interpret(cli)?)),
            "list" => Ok(Self::List(List::interpret(cli)?)),
            "release" => Ok(Self::Release(Release::interpret(cli)?)),
            _ => panic!("an unimplemented command was passed through!"),
        }
    }

    fn execute(self, context: &Context) -> proc::Result {
        match self {
            Self::Help(c) => c.execute(&()),
            Self::Install(c) => c.execute(context),
            Self::Setup(c) => c.execute(context),
            Self::Uninstall(c) => c.execute(context),
            Self::Env(c) => c.execute(context),
            Self::List(c) => c.execute(context),
            Self::Release(c) => c.execute(context),
        }
    }
}

const VERSION: &str = env!("CARGO_PKG_VERSION");
