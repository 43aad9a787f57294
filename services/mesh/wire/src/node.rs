//! Mesh node identifiers.

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Radio node number
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Destination used for packets addressed to every node
    pub const BROADCAST: NodeId = NodeId(0xFFFF_FFFF);

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Short hex form used in the UI, e.g. `!a1b2c3d4`
    pub fn hex_id(&self) -> String {
        format!("!{:x}", self.0)
    }

    /// Stable display colour derived from the low 24 bits
    pub fn colour(&self) -> String {
        format!("#{:06x}", self.0 & 0x00FF_FFFF)
    }

    /// Black or white, whichever reads better on top of [`NodeId::colour`]
    pub fn text_colour(&self) -> &'static str {
        let r = ((self.0 & 0xFF_0000) >> 16) as f64;
        let g = ((self.0 & 0x00_FF00) >> 8) as f64;
        let b = (self.0 & 0x00_00FF) as f64;

        let brightness = (r * 0.299 + g * 0.587 + b * 0.114) / 255.0;
        if brightness > 0.5 {
            "#000000"
        } else {
            "#FFFFFF"
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex_id())
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

impl FromStr for NodeId {
    type Err = WireError;

    /// Accepts `!a1b2c3d4`, `0xa1b2c3d4` or a decimal node number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix('!').or_else(|| s.strip_prefix("0x")) {
            u32::from_str_radix(hex, 16)
        } else {
            s.parse::<u32>()
        };
        parsed
            .map(NodeId)
            .map_err(|e| WireError::InvalidNodeId(format!("{:?}: {}", s, e)))
    }
}
