//! Service kind enumeration.
//!
//! The kind is the role a service plays towards the broker. It is part of the
//! service identity and of its transport address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of a service.
///
/// Serialized in lowercase (`"pub"`, `"sub"`, `"req"`, `"rep"`), which is also
/// the directory name used in the service's endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Publishes values towards the broker
    Pub,

    /// Pulls values published by someone else
    Sub,

    /// Issues requests
    Req,

    /// Answers requests
    Rep,
}

impl ServiceKind {
    /// Get the kind as its wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pub => "pub",
            Self::Sub => "sub",
            Self::Req => "req",
            Self::Rep => "rep",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub" => Ok(Self::Pub),
            "sub" => Ok(Self::Sub),
            "req" => Ok(Self::Req),
            "rep" => Ok(Self::Rep),
            other => Err(format!("unknown service kind '{other}'")),
        }
    }
}
