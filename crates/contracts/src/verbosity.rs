//! Per-dispatcher log verbosity flags

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Bit set of verbosity flags for one dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Verbosity(u8);

impl Verbosity {
    /// No extra logging
    pub const NONE: Verbosity = Verbosity(0b0000_0000);
    /// Log every dispatched message
    pub const DEBUG: Verbosity = Verbosity(0b0000_0001);
    /// Log the duration of every callback
    pub const TIMING: Verbosity = Verbosity(0b0000_0010);

    /// Build from raw bits; unknown bits are dropped
    pub const fn from_bits(bits: u8) -> Self {
        Verbosity(bits & (Self::DEBUG.0 | Self::TIMING.0))
    }

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Verbosity) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Fold a list of configured flags
    pub fn from_flags(flags: &[VerbosityFlag]) -> Self {
        flags
            .iter()
            .fold(Verbosity::NONE, |acc, flag| acc | Verbosity::from(*flag))
    }
}

impl BitOr for Verbosity {
    type Output = Verbosity;

    fn bitor(self, rhs: Self) -> Self::Output {
        Verbosity(self.0 | rhs.0)
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::DEBUG), self.contains(Self::TIMING)) {
            (false, false) => write!(f, "none"),
            (true, false) => write!(f, "debug"),
            (false, true) => write!(f, "timing"),
            (true, true) => write!(f, "debug|timing"),
        }
    }
}

/// Single verbosity flag as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbosityFlag {
    Debug,
    Timing,
}

impl From<VerbosityFlag> for Verbosity {
    fn from(flag: VerbosityFlag) -> Self {
        match flag {
            VerbosityFlag::Debug => Verbosity::DEBUG,
            VerbosityFlag::Timing => Verbosity::TIMING,
        }
    }
}
