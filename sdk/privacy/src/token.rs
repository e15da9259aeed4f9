use serde::{Deserialize, Serialize};
use std::fmt;

/// Token a commitment is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenType(pub u16);

impl TokenType {
    pub const LAMPORTS: Self = Self(0);
    pub const USDC: Self = Self(1);
    pub const USDT: Self = Self(2);

    pub fn name(&self) -> Option<&'static str> {
        match self.0 {
            0 => Some("LAMPORTS"),
            1 => Some("USDC"),
            2 => Some("USDT"),
            _ => None,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "TOKEN#{}", self.0),
        }
    }
}
