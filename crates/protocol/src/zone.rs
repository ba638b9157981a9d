use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical content zone. The same twelve keys (without `Unknown`) double as
/// target-section keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    Overview,
    Design,
    InvestigationalProduct,
    Statistics,
    Safety,
    Endpoints,
    Population,
    Procedures,
    DataManagement,
    Ethics,
    Admin,
    Appendix,
    Unknown,
}

impl Default for Zone {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Zone {
    /// The twelve canonical zones, in taxonomy order.
    pub const ALL: [Zone; 12] = [
        Zone::Overview,
        Zone::Design,
        Zone::InvestigationalProduct,
        Zone::Statistics,
        Zone::Safety,
        Zone::Endpoints,
        Zone::Population,
        Zone::Procedures,
        Zone::DataManagement,
        Zone::Ethics,
        Zone::Admin,
        Zone::Appendix,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Design => "design",
            Self::InvestigationalProduct => "investigational-product",
            Self::Statistics => "statistics",
            Self::Safety => "safety",
            Self::Endpoints => "endpoints",
            Self::Population => "population",
            Self::Procedures => "procedures",
            Self::DataManagement => "data-management",
            Self::Ethics => "ethics",
            Self::Admin => "admin",
            Self::Appendix => "appendix",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        if key == "unknown" {
            return Ok(Self::Unknown);
        }
        Self::ALL
            .into_iter()
            .find(|zone| zone.as_str() == key)
            .ok_or_else(|| format!("unknown zone key '{raw}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_keys_roundtrip_through_serde() {
        for zone in Zone::ALL {
            let json = serde_json::to_string(&zone).unwrap();
            assert_eq!(json, format!("\"{}\"", zone.as_str()));
            let back: Zone = serde_json::from_str(&json).unwrap();
            assert_eq!(back, zone);
        }
    }

    #[test]
    fn parses_snake_case_aliases() {
        assert_eq!(
            "data_management".parse::<Zone>().unwrap(),
            Zone::DataManagement
        );
        assert_eq!(
            "Investigational-Product".parse::<Zone>().unwrap(),
            Zone::InvestigationalProduct
        );
        assert!("pharmacology".parse::<Zone>().is_err());
    }

    #[test]
    fn unknown_is_not_a_target_section() {
        assert!(!Zone::Unknown.is_known());
        assert!(Zone::ALL.iter().all(|z| z.is_known()));
    }
}
