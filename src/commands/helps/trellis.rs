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


pub const HELP: &str = r#"Trellis bootstraps packages and their environments for DCC tools.

Usage:
    trellis [options] [command]

Commands:
    install         install a package from a path or git repository
    setup           copy the framework to a new location
    uninstall       remove a package from the environment
    env             resolve the environment and print its variables
    list            view the packages in the environment
    release         tag a package repository for release
    help            read more about a command

Options:
    --root <path>   framework root directory
    --dev           run in development mode
    --version       print version information and exit
    --help, -h      print help information

Use 'trellis help <command>' for more information about a command.
"#;
