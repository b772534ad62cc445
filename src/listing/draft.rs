use serde::{Deserialize, Serialize};

/// Allowed cask-wood metafield choices. Must match the shop's definition
/// exactly.
pub const VALID_CASK_WOODS: [&str; 17] = [
    "American White Oak",
    "European Oak",
    "French Oak",
    "Ex-Bourbon Barrels",
    "Sherry Casks",
    "Pedro Ximénez",
    "Fino / Amontillado",
    "Rum Casks",
    "Wine Cask",
    "Port Cask",
    "Madeira Casks",
    "Cognac or Brandy Casks",
    "Beer Cask",
    "Mizunara Oak",
    "Amburana Cask",
    "Chinquapin Oak",
    "Other",
];

pub const VALID_COUNTRIES: [&str; 13] = [
    "USA", "Ireland", "Scotland", "Canada", "Japan", "India", "Taiwan", "England", "France",
    "Mexico", "Italy", "Portugal", "Other",
];

/// Alcohol by volume, either a display percent ("53.5%") or an explicit
/// unknown. Unknown is never replaced by a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AbvField {
    Percent(String),
    Unknown,
}

impl AbvField {
    pub fn from_percent(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return AbvField::Unknown;
        }
        let rounded = (value * 10.0).round() / 10.0;
        let mut text = format!("{rounded:.1}");
        if let Some(stripped) = text.strip_suffix(".0") {
            text = stripped.to_string();
        }
        AbvField::Percent(format!("{text}%"))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AbvField::Unknown)
    }

    pub fn as_display(&self) -> &str {
        match self {
            AbvField::Percent(text) => text,
            AbvField::Unknown => "",
        }
    }
}

impl From<String> for AbvField {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("unknown")
            || trimmed.eq_ignore_ascii_case("n/a")
        {
            AbvField::Unknown
        } else {
            AbvField::Percent(trimmed.to_string())
        }
    }
}

impl From<AbvField> for String {
    fn from(field: AbvField) -> Self {
        field.as_display().to_string()
    }
}

/// The validated listing. Every field has passed normalization; string
/// fields are non-empty and vocabulary fields hold canonical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub nose: Vec<String>,
    pub palate: Vec<String>,
    pub finish: Vec<String>,
    pub sub_type: String,
    pub country: String,
    pub region: String,
    pub cask_wood: Vec<String>,
    pub finish_type: String,
    pub age_statement: String,
    pub abv: AbvField,
    pub finished: bool,
    pub store_pick: bool,
    pub cask_strength: bool,
    pub single_barrel: bool,
    pub limited_release: bool,
    pub gift_pack: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_formatting_trims_trailing_zero() {
        assert_eq!(AbvField::from_percent(53.5).as_display(), "53.5%");
        assert_eq!(AbvField::from_percent(45.0).as_display(), "45%");
        assert_eq!(AbvField::from_percent(46.35).as_display(), "46.4%");
        assert!(AbvField::from_percent(0.0).is_unknown());
        assert!(AbvField::from_percent(f64::NAN).is_unknown());
    }

    #[test]
    fn serde_round_trip_keeps_unknown_explicit() {
        let unknown: AbvField = serde_json::from_str("\"\"").unwrap();
        assert!(unknown.is_unknown());
        let spelled: AbvField = serde_json::from_str("\"Unknown\"").unwrap();
        assert!(spelled.is_unknown());

        let known: AbvField = serde_json::from_str("\"53.5%\"").unwrap();
        assert_eq!(known.as_display(), "53.5%");
        assert_eq!(serde_json::to_string(&known).unwrap(), "\"53.5%\"");
        assert_eq!(
            serde_json::to_string(&AbvField::Unknown).unwrap(),
            "\"\""
        );
    }
}
