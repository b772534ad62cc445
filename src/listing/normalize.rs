use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::listing::draft::{AbvField, ListingDraft, VALID_CASK_WOODS, VALID_COUNTRIES};
use crate::listing::signals::SignalExtraction;
use crate::models::ProductRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("draft is not a JSON object")]
    NotObject,
    #[error("missing or invalid field: {field}")]
    Field { field: &'static str },
    #[error("{field} needs at least {min} entries")]
    TooFew { field: &'static str, min: usize },
}

/// Turn a raw generated draft into a validated `ListingDraft`.
///
/// Steps run in a fixed order: alias folding, shape coercion, vocabulary
/// mapping, numeric normalization, extraction override, hard validation.
/// User-provided facts always win; a confident extraction beats the
/// creative draft; an unknown ABV stays unknown.
pub fn normalize_listing(
    raw: Value,
    signals: Option<&SignalExtraction>,
    request: &ProductRequest,
) -> Result<ListingDraft, SchemaViolation> {
    let Value::Object(mut obj) = raw else {
        return Err(SchemaViolation::NotObject);
    };

    fold_aliases(&mut obj);

    let nose = to_string_list(obj.get("nose"));
    let palate = to_string_list(obj.get("palate"));
    let finish = to_string_list(obj.get("finish"));
    let cask_wood: Vec<String> = to_string_list(obj.get("cask_wood"))
        .iter()
        .map(|raw| normalize_cask_wood(raw))
        .collect();

    let country = get_scalar(&obj, "country")
        .map(|raw| normalize_country(&raw))
        .unwrap_or_default();

    let abv = resolve_abv(get_scalar(&obj, "abv"), signals, request);

    let mut store_pick = get_bool(&obj, "store_pick");
    let mut single_barrel = get_bool(&obj, "single_barrel");
    if let Some(signals) = signals {
        if let Some(value) = signals.confident_store_pick() {
            store_pick = value;
        }
        if let Some(value) = signals.confident_single_barrel() {
            single_barrel = value;
        }
    }

    let draft = ListingDraft {
        title: require("title", get_scalar(&obj, "title"))?,
        description: require("description", get_scalar(&obj, "description"))?,
        nose,
        palate,
        finish,
        sub_type: require("sub_type", get_scalar(&obj, "sub_type"))?,
        country: require("country", Some(country))?,
        region: require("region", get_scalar(&obj, "region"))?,
        cask_wood,
        finish_type: require("finish_type", get_scalar(&obj, "finish_type"))?,
        age_statement: require("age_statement", get_scalar(&obj, "age_statement"))?,
        abv,
        finished: get_bool(&obj, "finished"),
        store_pick,
        cask_strength: get_bool(&obj, "cask_strength"),
        single_barrel,
        limited_release: get_bool(&obj, "limited_release"),
        gift_pack: get_bool(&obj, "gift_pack"),
    };

    check_list("nose", &draft.nose, 3)?;
    check_list("palate", &draft.palate, 3)?;
    check_list("finish", &draft.finish, 2)?;
    check_list("cask_wood", &draft.cask_wood, 1)?;

    Ok(draft)
}

/// Fold the field-name variations generative output actually produces onto
/// the canonical names.
fn fold_aliases(obj: &mut Map<String, Value>) {
    if get_scalar(obj, "title").is_none() {
        let brand = get_scalar(obj, "brand");
        let product = get_scalar(obj, "product_name");
        let title = match (brand, product) {
            (Some(brand), Some(product)) => Some(format!("{brand} {product}")),
            (None, Some(product)) => Some(product),
            _ => None,
        };
        if let Some(title) = title {
            obj.insert("title".into(), Value::String(title));
        }
    }

    if get_scalar(obj, "description").is_none() {
        for alias in ["body", "summary", "body_html"] {
            if let Some(text) = get_scalar(obj, alias) {
                obj.insert("description".into(), Value::String(text));
                break;
            }
        }
    }

    if let Some(Value::Object(notes)) = obj.get("tasting_notes").cloned() {
        for key in ["nose", "palate", "finish"] {
            let missing = to_string_list(obj.get(key)).is_empty();
            if missing && let Some(value) = notes.get(key) {
                obj.insert(key.into(), value.clone());
            }
        }
    }

    if obj.get("limited_release").is_none()
        && let Some(value) = obj.get("limited_time_offer").cloned()
    {
        obj.insert("limited_release".into(), value);
    }
}

/// Coerce whatever shape arrived into a list of trimmed strings. Scalars
/// wrap into singletons; delimited strings split on comma, semicolon, or
/// newline.
fn to_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.trim().to_string()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect(),
        Some(Value::String(text)) => text
            .split([',', ';', '\n'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Number(number)) => vec![number.to_string()],
        Some(Value::Bool(flag)) => vec![flag.to_string()],
        _ => Vec::new(),
    }
}

/// Map onto the allowed cask-wood vocabulary: exact, then case-insensitive,
/// then substring heuristics, else "Other".
pub fn normalize_cask_wood(raw: &str) -> String {
    let trimmed = raw.trim();
    if VALID_CASK_WOODS.contains(&trimmed) {
        return trimmed.to_string();
    }
    if let Some(canonical) = VALID_CASK_WOODS
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return canonical.to_string();
    }
    let lowered = trimmed.to_lowercase();
    if lowered.contains("american") && lowered.contains("oak") {
        return "American White Oak".to_string();
    }
    if lowered.contains("sherry") {
        return "Sherry Casks".to_string();
    }
    if lowered.contains("bourbon") {
        return "Ex-Bourbon Barrels".to_string();
    }
    warn!(target: "rickhouse.listing", value = trimmed, "unknown cask_wood, using Other");
    "Other".to_string()
}

pub fn normalize_country(raw: &str) -> String {
    let trimmed = raw.trim();
    if VALID_COUNTRIES.contains(&trimmed) {
        return trimmed.to_string();
    }
    if let Some(canonical) = VALID_COUNTRIES
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return canonical.to_string();
    }
    warn!(target: "rickhouse.listing", value = trimmed, "unknown country, using Other");
    "Other".to_string()
}

/// ABV precedence: user proof, user abv, confident extraction, draft text.
/// Anything else is an explicit unknown.
fn resolve_abv(
    raw: Option<String>,
    signals: Option<&SignalExtraction>,
    request: &ProductRequest,
) -> AbvField {
    if let Some(proof) = request.proof {
        return AbvField::from_percent(proof / 2.0);
    }
    if let Some(abv) = request.abv {
        return AbvField::from_percent(abv);
    }
    if let Some(signals) = signals
        && let Some(text) = signals.confident_abv()
        && let Some(value) = parse_abv_text(text)
    {
        return AbvField::from_percent(value);
    }
    if let Some(raw) = raw
        && !is_bad(&raw)
        && !raw.trim().eq_ignore_ascii_case("unknown")
        && let Some(value) = parse_abv_text(&raw)
    {
        return AbvField::from_percent(value);
    }
    AbvField::Unknown
}

/// First number in the text, read as a percent. "53.5% ABV" parses to 53.5.
pub fn parse_abv_text(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let number: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value = number.parse::<f64>().ok()?;
    (value > 0.0 && value <= 100.0).then_some(value)
}

fn get_scalar(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

fn get_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => {
            let lowered = text.trim().to_lowercase();
            lowered == "true" || lowered == "yes" || lowered == "1"
        }
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn require(field: &'static str, value: Option<String>) -> Result<String, SchemaViolation> {
    match value {
        Some(value) if !is_bad(&value) => Ok(value),
        _ => Err(SchemaViolation::Field { field }),
    }
}

fn is_bad(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == "N/A" || trimmed == "Unknown"
}

fn check_list(
    field: &'static str,
    values: &[String],
    min: usize,
) -> Result<(), SchemaViolation> {
    if values.len() < min {
        return Err(SchemaViolation::TooFew { field, min });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::signals::{SignalExtraction, SignalValue};
    use serde_json::json;

    fn sample_request() -> ProductRequest {
        ProductRequest {
            image_url: "https://cdn.example.com/bottle.jpg".into(),
            cost: 38.0,
            price: 64.99,
            abv: None,
            proof: None,
            quantity: None,
            barcode: None,
            reference_link: None,
            notes: String::new(),
            vendor: None,
            dry_run: false,
        }
    }

    fn sample_raw() -> Value {
        json!({
            "title": "Old Forester 1920 Prohibition Style",
            "description": "A bold, high-proof bourbon honoring the Prohibition era.",
            "nose": ["caramel", "dark cherry", "baking spice"],
            "palate": ["toffee", "oak char", "black pepper"],
            "finish": ["long", "smoky"],
            "sub_type": "Straight Bourbon Whiskey",
            "country": "USA",
            "region": "Kentucky",
            "cask_wood": ["American White Oak"],
            "finish_type": "None",
            "age_statement": "NAS",
            "abv": "57.5%",
            "finished": false,
            "store_pick": false,
            "cask_strength": true,
            "single_barrel": false,
            "limited_release": false,
            "gift_pack": false
        })
    }

    #[test]
    fn valid_draft_passes_through() {
        let draft = normalize_listing(sample_raw(), None, &sample_request()).unwrap();
        assert_eq!(draft.title, "Old Forester 1920 Prohibition Style");
        assert_eq!(draft.abv.as_display(), "57.5%");
        assert!(draft.cask_strength);
        assert!(!draft.abv.is_unknown());
    }

    #[test]
    fn each_missing_required_field_is_named() {
        for field in [
            "title",
            "description",
            "sub_type",
            "country",
            "region",
            "finish_type",
            "age_statement",
        ] {
            let mut raw = sample_raw();
            raw.as_object_mut().unwrap().remove(field);
            let err = normalize_listing(raw, None, &sample_request()).unwrap_err();
            assert_eq!(err, SchemaViolation::Field { field }, "field {field}");
        }
    }

    #[test]
    fn placeholder_values_are_rejected() {
        for bad in ["", "N/A", "Unknown"] {
            let mut raw = sample_raw();
            raw["region"] = json!(bad);
            let err = normalize_listing(raw, None, &sample_request()).unwrap_err();
            assert_eq!(err, SchemaViolation::Field { field: "region" });
        }
    }

    #[test]
    fn tasting_note_minimums_are_enforced() {
        let mut raw = sample_raw();
        raw["nose"] = json!(["caramel", "cherry"]);
        let err = normalize_listing(raw, None, &sample_request()).unwrap_err();
        assert_eq!(err, SchemaViolation::TooFew { field: "nose", min: 3 });

        let mut raw = sample_raw();
        raw["finish"] = json!(["long"]);
        let err = normalize_listing(raw, None, &sample_request()).unwrap_err();
        assert_eq!(err, SchemaViolation::TooFew { field: "finish", min: 2 });
    }

    #[test]
    fn delimited_strings_coerce_into_lists() {
        let mut raw = sample_raw();
        raw["nose"] = json!("vanilla, caramel; toasted oak");
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert_eq!(draft.nose, vec!["vanilla", "caramel", "toasted oak"]);
    }

    #[test]
    fn nested_tasting_notes_fold_onto_flat_fields() {
        let mut raw = sample_raw();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("nose");
        obj.remove("palate");
        obj.insert(
            "tasting_notes".into(),
            json!({
                "nose": ["apple", "honey", "grain"],
                "palate": ["pear", "malt", "pepper"]
            }),
        );
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert_eq!(draft.nose, vec!["apple", "honey", "grain"]);
        assert_eq!(draft.palate, vec!["pear", "malt", "pepper"]);
    }

    #[test]
    fn title_folds_from_brand_and_product_name() {
        let mut raw = sample_raw();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("title");
        obj.insert("brand".into(), json!("Elijah Craig"));
        obj.insert("product_name".into(), json!("Barrel Proof C923"));
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert_eq!(draft.title, "Elijah Craig Barrel Proof C923");
    }

    #[test]
    fn cask_wood_heuristics_map_onto_vocabulary() {
        assert_eq!(normalize_cask_wood("Bourbon barrel"), "Ex-Bourbon Barrels");
        assert_eq!(normalize_cask_wood("sherry cask finish"), "Sherry Casks");
        assert_eq!(normalize_cask_wood("charred american oak"), "American White Oak");
        assert_eq!(normalize_cask_wood("pedro ximénez"), "Pedro Ximénez");
        assert_eq!(normalize_cask_wood("Maple Wood"), "Other");
    }

    #[test]
    fn vocabulary_mapping_is_idempotent() {
        for canonical in VALID_CASK_WOODS {
            assert_eq!(normalize_cask_wood(canonical), canonical);
        }
        for canonical in VALID_COUNTRIES {
            assert_eq!(normalize_country(canonical), canonical);
        }
        assert_eq!(normalize_country("scotland"), "Scotland");
        assert_eq!(normalize_country("Kentucky"), "Other");
    }

    #[test]
    fn user_proof_halves_into_percent_and_beats_extraction() {
        let mut request = sample_request();
        request.proof = Some(107.0);

        let signals = SignalExtraction {
            abv: Some(SignalValue {
                value: "50%".into(),
                confidence: 0.95,
            }),
            ..SignalExtraction::default()
        };

        let mut raw = sample_raw();
        raw["abv"] = json!("unknown");
        let draft = normalize_listing(raw, Some(&signals), &request).unwrap();
        assert_eq!(draft.abv.as_display(), "53.5%");
        assert!(!draft.abv.is_unknown());
    }

    #[test]
    fn missing_abv_stays_unknown_instead_of_guessed() {
        let mut raw = sample_raw();
        raw["abv"] = json!("unknown");
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert!(draft.abv.is_unknown());
        assert_eq!(draft.abv.as_display(), "");
    }

    #[test]
    fn bare_numbers_gain_a_percent_suffix() {
        let mut raw = sample_raw();
        raw["abv"] = json!("45");
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert_eq!(draft.abv.as_display(), "45%");

        let mut raw = sample_raw();
        raw["abv"] = json!("46.3% ABV");
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert_eq!(draft.abv.as_display(), "46.3%");
    }

    #[test]
    fn confident_extraction_overrides_draft_booleans() {
        let signals = SignalExtraction {
            store_pick: Some(SignalValue {
                value: true,
                confidence: 0.9,
            }),
            single_barrel: Some(SignalValue {
                value: true,
                confidence: 0.3,
            }),
            ..SignalExtraction::default()
        };
        let draft = normalize_listing(sample_raw(), Some(&signals), &sample_request()).unwrap();
        assert!(draft.store_pick);
        // below the confidence threshold the draft value stands
        assert!(!draft.single_barrel);
    }

    #[test]
    fn limited_time_offer_alias_is_folded() {
        let mut raw = sample_raw();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("limited_release");
        obj.insert("limited_time_offer".into(), json!(true));
        let draft = normalize_listing(raw, None, &sample_request()).unwrap();
        assert!(draft.limited_release);
    }

    #[test]
    fn non_object_drafts_are_rejected() {
        let err = normalize_listing(json!("not an object"), None, &sample_request()).unwrap_err();
        assert_eq!(err, SchemaViolation::NotObject);
    }
}
