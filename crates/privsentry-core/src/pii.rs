//! PII type vocabulary shared by every stage.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Recognized PII categories. Labels match the detection engine's entity names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiType {
    PersonName,
    EmailAddress,
    PhoneNumber,
    CreditCardNumber,
    UsSsn,
    UsDriverLicense,
    UsPassport,
}

/// Deduplicated set of PII types; iteration order is the enum order.
pub type PiiTypeSet = BTreeSet<PiiType>;

impl PiiType {
    pub fn all() -> &'static [PiiType] {
        &[
            Self::PersonName,
            Self::EmailAddress,
            Self::PhoneNumber,
            Self::CreditCardNumber,
            Self::UsSsn,
            Self::UsDriverLicense,
            Self::UsPassport,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PersonName => "PERSON_NAME",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::CreditCardNumber => "CREDIT_CARD_NUMBER",
            Self::UsSsn => "US_SSN",
            Self::UsDriverLicense => "US_DRIVER_LICENSE",
            Self::UsPassport => "US_PASSPORT",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PiiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unrecognized PII type: {}", s))
    }
}
