// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

/// Reconciliation verdict for one multipath device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Not decided yet; the topology differ has to run.
    #[default]
    Undefined,
    /// Leave the kernel map alone.
    Nothing,
    Create,
    Reload,
    SwitchGroup,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undef",
            Self::Nothing => "none",
            Self::Create => "create",
            Self::Reload => "reload",
            Self::SwitchGroup => "switchpg",
        }
    }

    pub fn is_decided(&self) -> bool {
        *self != Self::Undefined
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
