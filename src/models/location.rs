use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::PricingError;
use crate::models::package::PackageSize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingScheme {
    Flat,
    FlatSize,
    ProgressiveDay,
    ProgressivePackage,
}

impl PricingScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingScheme::Flat => "FLAT",
            PricingScheme::FlatSize => "FLAT_SIZE",
            PricingScheme::ProgressiveDay => "PROGRESSIVE_DAY",
            PricingScheme::ProgressivePackage => "PROGRESSIVE_PACKAGE",
        }
    }
}

impl fmt::Display for PricingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingScheme {
    type Err = PricingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "FLAT" => Ok(PricingScheme::Flat),
            "FLAT_SIZE" => Ok(PricingScheme::FlatSize),
            "PROGRESSIVE_DAY" => Ok(PricingScheme::ProgressiveDay),
            "PROGRESSIVE_PACKAGE" => Ok(PricingScheme::ProgressivePackage),
            other => Err(PricingError::UnknownScheme(other.to_string())),
        }
    }
}

/// Missing, null and negative amounts all read as zero.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default();
    Ok(amount.max(Decimal::ZERO))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlatConfig {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub base_price: Decimal,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub penalty_per24h: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SizeRate {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub base: Decimal,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub penalty: Decimal,
}

impl SizeRate {
    fn new(base: i64, penalty: i64) -> Self {
        Self {
            base: Decimal::from(base),
            penalty: Decimal::from(penalty),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatSizeConfig {
    #[serde(rename = "S", default)]
    pub small: SizeRate,
    #[serde(rename = "M", default)]
    pub medium: SizeRate,
    #[serde(rename = "L", default)]
    pub large: SizeRate,
    #[serde(rename = "XL", default)]
    pub extra_large: SizeRate,
}

impl FlatSizeConfig {
    pub fn rate(&self, size: PackageSize) -> &SizeRate {
        match size {
            PackageSize::S => &self.small,
            PackageSize::M => &self.medium,
            PackageSize::L => &self.large,
            PackageSize::XL => &self.extra_large,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressiveDayConfig {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub day1_price: Decimal,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub day2_and_after_price: Decimal,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyMode {
    FirstPackage,
    #[default]
    AdditionalPackage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressivePackageConfig {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub first_package_price: Decimal,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub additional_package_price: Decimal,
    #[serde(default)]
    pub penalty_mode: PenaltyMode,
}

/// Scheme-specific price configuration. The variant is the scheme, so a
/// location can never hold a config of the wrong shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "pricing_scheme",
    content = "price_config",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum PriceConfig {
    Flat(FlatConfig),
    FlatSize(FlatSizeConfig),
    ProgressiveDay(ProgressiveDayConfig),
    ProgressivePackage(ProgressivePackageConfig),
}

impl PriceConfig {
    pub fn scheme(&self) -> PricingScheme {
        match self {
            PriceConfig::Flat(_) => PricingScheme::Flat,
            PriceConfig::FlatSize(_) => PricingScheme::FlatSize,
            PriceConfig::ProgressiveDay(_) => PricingScheme::ProgressiveDay,
            PriceConfig::ProgressivePackage(_) => PricingScheme::ProgressivePackage,
        }
    }

    pub fn default_for(scheme: PricingScheme) -> Self {
        match scheme {
            PricingScheme::Flat => PriceConfig::Flat(FlatConfig {
                base_price: Decimal::from(5000),
                penalty_per24h: Decimal::from(3000),
            }),
            PricingScheme::FlatSize => PriceConfig::FlatSize(FlatSizeConfig {
                small: SizeRate::new(3000, 2000),
                medium: SizeRate::new(5000, 3000),
                large: SizeRate::new(7000, 4000),
                extra_large: SizeRate::new(10000, 5000),
            }),
            PricingScheme::ProgressiveDay => PriceConfig::ProgressiveDay(ProgressiveDayConfig {
                day1_price: Decimal::from(5000),
                day2_and_after_price: Decimal::from(3000),
            }),
            PricingScheme::ProgressivePackage => {
                PriceConfig::ProgressivePackage(ProgressivePackageConfig {
                    first_package_price: Decimal::from(5000),
                    additional_package_price: Decimal::from(3000),
                    penalty_mode: PenaltyMode::AdditionalPackage,
                })
            }
        }
    }

    /// Builds a typed config from a scheme tag and an untyped config body.
    /// A missing body yields the scheme's default shape.
    pub fn from_raw(
        scheme: &str,
        raw: Option<serde_json::Value>,
    ) -> Result<Self, PricingError> {
        let scheme: PricingScheme = scheme.parse()?;
        let Some(raw) = raw.filter(|value| !value.is_null()) else {
            return Ok(Self::default_for(scheme));
        };

        let malformed = |err: serde_json::Error| PricingError::MalformedConfig {
            scheme,
            reason: err.to_string(),
        };

        let config = match scheme {
            PricingScheme::Flat => PriceConfig::Flat(serde_json::from_value(raw).map_err(malformed)?),
            PricingScheme::FlatSize => {
                PriceConfig::FlatSize(serde_json::from_value(raw).map_err(malformed)?)
            }
            PricingScheme::ProgressiveDay => {
                PriceConfig::ProgressiveDay(serde_json::from_value(raw).map_err(malformed)?)
            }
            PricingScheme::ProgressivePackage => {
                PriceConfig::ProgressivePackage(serde_json::from_value(raw).map_err(malformed)?)
            }
        };

        Ok(config)
    }

    /// Applies an edit. Switching scheme without a new body resets to the new
    /// scheme's default shape rather than keeping a mismatched config.
    pub fn updated(
        &self,
        scheme: Option<&str>,
        raw: Option<serde_json::Value>,
    ) -> Result<Self, PricingError> {
        match (scheme, raw) {
            (None, None) => Ok(self.clone()),
            (None, Some(raw)) => Self::from_raw(self.scheme().as_str(), Some(raw)),
            (Some(scheme), None) => {
                let scheme: PricingScheme = scheme.parse()?;
                if scheme == self.scheme() {
                    Ok(self.clone())
                } else {
                    Ok(Self::default_for(scheme))
                }
            }
            (Some(scheme), Some(raw)) => Self::from_raw(scheme, Some(raw)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryFees {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "S", default, deserialize_with = "lenient_amount")]
    pub small: Decimal,
    #[serde(rename = "M", default, deserialize_with = "lenient_amount")]
    pub medium: Decimal,
    #[serde(rename = "L", default, deserialize_with = "lenient_amount")]
    pub large: Decimal,
    #[serde(rename = "XL", default, deserialize_with = "lenient_amount")]
    pub extra_large: Decimal,
}

impl DeliveryFees {
    pub fn fee(&self, size: PackageSize) -> Decimal {
        match size {
            PackageSize::S => self.small,
            PackageSize::M => self.medium,
            PackageSize::L => self.large,
            PackageSize::XL => self.extra_large,
        }
    }
}

impl Default for DeliveryFees {
    fn default() -> Self {
        Self {
            enabled: false,
            small: Decimal::from(5000),
            medium: Decimal::from(7000),
            large: Decimal::from(10000),
            extra_large: Decimal::from(15000),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationState {
    Active,
    /// Soft-deleted: kept for the packages that still reference it.
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(flatten)]
    pub pricing: PriceConfig,
    pub grace_period_days: u32,
    pub delivery: DeliveryFees,
    pub state: LocationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn is_active(&self) -> bool {
        self.state == LocationState::Active
    }
}

/// Lower-cases, joins words with `-` and drops everything outside `[a-z0-9-]`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
