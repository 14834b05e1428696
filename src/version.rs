//! Exchange protocol versions.

use crate::error::EwsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known Exchange Web Services schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExchangeVersion {
    #[serde(rename = "Exchange2007")]
    Exchange2007,
    #[serde(rename = "Exchange2007_SP1")]
    Exchange2007Sp1,
    #[serde(rename = "Exchange2010")]
    Exchange2010,
    #[serde(rename = "Exchange2010_SP1")]
    Exchange2010Sp1,
    #[serde(rename = "Exchange2010_SP2")]
    Exchange2010Sp2,
    #[serde(rename = "Exchange2013")]
    Exchange2013,
    #[serde(rename = "Exchange2013_SP1")]
    Exchange2013Sp1,
    #[serde(rename = "Exchange2016")]
    Exchange2016,
    #[serde(rename = "Office365")]
    Office365,
}

impl ExchangeVersion {
    /// Every version this client knows how to speak.
    pub const ALL: [ExchangeVersion; 9] = [
        Self::Exchange2007,
        Self::Exchange2007Sp1,
        Self::Exchange2010,
        Self::Exchange2010Sp1,
        Self::Exchange2010Sp2,
        Self::Exchange2013,
        Self::Exchange2013Sp1,
        Self::Exchange2016,
        Self::Office365,
    ];

    /// Negotiation order used when none is configured, most likely first.
    pub const DEFAULT_ORDER: [ExchangeVersion; 6] = [
        Self::Exchange2016,
        Self::Exchange2013Sp1,
        Self::Exchange2013,
        Self::Exchange2010Sp2,
        Self::Exchange2010Sp1,
        Self::Exchange2010,
    ];

    /// Name of the version as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange2007 => "Exchange2007",
            Self::Exchange2007Sp1 => "Exchange2007_SP1",
            Self::Exchange2010 => "Exchange2010",
            Self::Exchange2010Sp1 => "Exchange2010_SP1",
            Self::Exchange2010Sp2 => "Exchange2010_SP2",
            Self::Exchange2013 => "Exchange2013",
            Self::Exchange2013Sp1 => "Exchange2013_SP1",
            Self::Exchange2016 => "Exchange2016",
            Self::Office365 => "Office365",
        }
    }

    /// Value placed in the envelope's version marker.
    ///
    /// Office 365 speaks the Exchange2016 schema.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Office365 => Self::Exchange2016.as_str(),
            other => other.as_str(),
        }
    }

    /// Map a server build number such as `15.20.5` to its API version.
    pub fn from_build(build: &str) -> Result<Self, EwsError> {
        let parts: Vec<u32> = build
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| EwsError::InvalidVersion(format!("unparseable build number '{}'", build)))?;

        let (major, minor) = match parts.as_slice() {
            [major, minor, ..] => (*major, *minor),
            _ => {
                return Err(EwsError::InvalidVersion(format!(
                    "build number '{}' needs at least major.minor",
                    build
                )))
            }
        };
        let build_no = parts.get(2).copied().unwrap_or(0);

        let version = match (major, minor) {
            (8, 0) => Self::Exchange2007,
            (8, 1..=3) => Self::Exchange2007Sp1,
            (14, 0) => Self::Exchange2010,
            (14, 1) => Self::Exchange2010Sp1,
            (14, 2..=3) => Self::Exchange2010Sp2,
            (15, 0) if build_no >= 847 => Self::Exchange2013Sp1,
            (15, 0) => Self::Exchange2013,
            (15, 1) | (15, 20) => Self::Exchange2016,
            _ => {
                return Err(EwsError::InvalidVersion(format!(
                    "no API version known for build '{}'",
                    build
                )))
            }
        };
        Ok(version)
    }
}

impl FromStr for ExchangeVersion {
    type Err = EwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| EwsError::InvalidVersion(s.to_string()))
    }
}

impl fmt::Display for ExchangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
