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


pub const HELP: &str = r#"Tag a package repository for release.

Usage:
    trellis release [options]

Options:
    --path <path>       repository to release (default: current directory)
    --tag <tag>         tag to create
    --message <msg>     tag annotation message
    --push              push the created tag to the remote
    --latest            print the most recent tag and exit
    --zip <dir>         write an archive of the package into a directory

Use 'trellis help release' to read more about the command.
"#;
