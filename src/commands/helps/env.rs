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


pub const HELP: &str = r#"Resolve the environment and print its variables.

Usage:
    trellis env [options]

Options:
    --file <path>       environment file to resolve instead of the default
    --no-override       ignore the override file
    --startup           run the packages' startup commands
    --key <key>...      only print the given variables

Use 'trellis help env' to read more about the command.
"#;
