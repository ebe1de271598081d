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


use crate::util::anyerror::AnyError;
use crate::util::environment::{Environment, TPDCC_HOST, TPDCC_HOST_VERSION};
use std::fmt::Display;
use std::str::FromStr;

/// The application process that loads the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Host {
    Standalone,
    Maya,
    Max,
    Houdini,
    MotionBuilder,
    Unreal,
    Substance,
}

impl Host {
    /// Reads the host from `TPDCC_HOST`, defaulting to a standalone process.
    pub fn from_env() -> Self {
        match Environment::read(TPDCC_HOST) {
            Some(s) => match Self::from_str(&s) {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!("{}; assuming a standalone process", e);
                    Self::Standalone
                }
            },
            None => Self::Standalone,
        }
    }

    /// Reads the host application version from `TPDCC_HOST_VERSION`.
    pub fn version_from_env() -> Option<String> {
        Environment::read(TPDCC_HOST_VERSION)
    }

    pub fn is_standalone(&self) -> bool {
        self == &Self::Standalone
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Standalone => "standalone",
                Self::Maya => "maya",
                Self::Max => "max",
                Self::Houdini => "houdini",
                Self::MotionBuilder => "motionbuilder",
                Self::Unreal => "unreal",
                Self::Substance => "substance",
            }
        )
    }
}

impl FromStr for Host {
    type Err = AnyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "standalone" | "python" => Ok(Self::Standalone),
            "maya" => Ok(Self::Maya),
            "max" | "3dsmax" => Ok(Self::Max),
            "houdini" => Ok(Self::Houdini),
            "motionbuilder" | "mobu" => Ok(Self::MotionBuilder),
            "unreal" | "ue" => Ok(Self::Unreal),
            "substance" | "painter" => Ok(Self::Substance),
            _ => Err(AnyError(format!("unknown host application \"{}\"", s))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_hosts() {
        assert_eq!(Host::from_str("Maya").unwrap(), Host::Maya);
        assert_eq!(Host::from_str("3dsmax").unwrap(), Host::Max);
        assert_eq!(Host::from_str("mobu").unwrap(), Host::MotionBuilder);
        assert_eq!(Host::from_str("").unwrap(), Host::Standalone);
        assert_eq!(Host::from_str("blender").is_err(), true);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(Host::MotionBuilder.to_string(), "motionbuilder");
        assert_eq!(Host::Standalone.is_standalone(), true);
        assert_eq!(Host::Houdini.is_standalone(), false);
    }
}
