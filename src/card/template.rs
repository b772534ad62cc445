use crate::shopify::ProductSnapshot;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

pub const CARD_WIDTH: u32 = 1275;
pub const CARD_HEIGHT: u32 = 1650;

const TEMPLATE_HTML: &str = include_str!("../../assets/tasting-card.html");

/// Placeholder glyph for fields the shop has not filled in.
const BLANK: &str = "—";

/// Display-ready values for the card template.
#[derive(Debug, Clone)]
pub struct CardData {
    pub title: String,
    pub image_url: String,
    pub country: String,
    pub location: String,
    pub country_flag_url: String,
    pub sub_type: String,
    pub age_statement: String,
    pub abv_display: String,
    pub price: String,
    pub description: String,
    pub nose: String,
    pub palate: String,
    pub finish: String,
    pub handle: String,
}

pub fn card_data(snapshot: &ProductSnapshot) -> CardData {
    let mf = |key: &str| snapshot.metafield(key).unwrap_or_default();

    let mut country = metafield_text(mf("custom.location_"));
    if country.is_empty() {
        country = "USA".to_string();
    }
    let state = mf("custom.state").to_string();
    let mut age_statement = mf("custom.age_statement").to_string();
    if age_statement.is_empty() {
        age_statement = "NAS".to_string();
    }

    CardData {
        title: snapshot.title.clone(),
        image_url: snapshot.image_url.clone().unwrap_or_default(),
        location: build_location(&country, &state),
        country_flag_url: country_flag_url(&country).to_string(),
        country,
        sub_type: non_blank(&metafield_text(mf("custom.sub_type"))),
        age_statement,
        abv_display: abv_display(mf("custom.alcohol_by_volume")).display,
        price: format_price(snapshot.price.as_deref()),
        description: strip_html(&snapshot.description_html),
        nose: non_blank(&metafield_text(mf("custom.nose"))),
        palate: non_blank(&metafield_text(mf("custom.palate"))),
        finish: non_blank(&metafield_text(mf("custom.finish"))),
        handle: snapshot.handle.clone(),
    }
}

pub fn build_card_html(data: &CardData, qr_data_url: &str) -> String {
    let replacements = [
        ("{{TITLE}}", escape_html(&data.title)),
        ("{{IMAGE_URL}}", data.image_url.clone()),
        ("{{COUNTRY_FLAG_URL}}", data.country_flag_url.clone()),
        ("{{COUNTRY}}", escape_html(&data.country)),
        ("{{LOCATION}}", escape_html(&data.location)),
        ("{{SUB_TYPE}}", escape_html(&data.sub_type)),
        ("{{AGE_STATEMENT}}", escape_html(&data.age_statement)),
        ("{{ABV_DISPLAY}}", escape_html(&data.abv_display)),
        ("{{PRICE}}", data.price.clone()),
        ("{{DESCRIPTION}}", escape_html(&data.description)),
        ("{{NOSE}}", escape_html(&data.nose)),
        ("{{PALATE}}", escape_html(&data.palate)),
        ("{{FINISH}}", escape_html(&data.finish)),
        ("{{QR_CODE_DATA_URL}}", qr_data_url.to_string()),
    ];
    let mut html = TEMPLATE_HTML.to_string();
    for (token, value) in replacements {
        html = html.replace(token, &value);
    }
    html
}

/// Any `{{TOKEN}}` placeholders left after substitution.
pub fn unreplaced_tokens(html: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut at = 0;
    while let Some(offset) = html[at..].find("{{") {
        let start = at + offset;
        let body = &html[start + 2..];
        let len = body
            .bytes()
            .take_while(|b| b.is_ascii_uppercase() || *b == b'_')
            .count();
        if len > 0 && body[len..].starts_with("}}") {
            found.push(html[start..start + len + 4].to_string());
            at = start + len + 4;
        } else {
            at = start + 2;
        }
    }
    found
}

pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Hard cap for the description panel. Cuts on a word boundary where one
/// is close enough, then appends an ellipsis.
pub fn truncate_to_budget(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let cut = budget.saturating_sub(1);
    let head: String = text.chars().take(cut).collect();
    let trimmed = match head.rfind(' ') {
        Some(space) if space > cut / 2 => &head[..space],
        _ => head.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

/// Storefront product page the card's QR code points at.
pub fn product_page_url(storefront_base: &str, handle: &str) -> String {
    format!("{}/products/{handle}", storefront_base.trim_end_matches('/'))
}

/// Unpacks a stored metafield value: list fields hold a JSON-encoded
/// array, scalars hold plain text.
pub fn metafield_text(value: &str) -> String {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Ok(Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => value.to_string(),
    }
}

fn non_blank(text: &str) -> String {
    if text.is_empty() {
        BLANK.to_string()
    } else {
        text.to_string()
    }
}

fn build_location(country: &str, state: &str) -> String {
    match (state.is_empty(), country.is_empty()) {
        (false, false) => format!("{state}, {country}"),
        (true, false) => country.to_string(),
        (false, true) => state.to_string(),
        (true, true) => BLANK.to_string(),
    }
}

fn format_price(price: Option<&str>) -> String {
    let Some(price) = price else {
        return BLANK.to_string();
    };
    match price.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() => format!("${amount:.2}"),
        _ => BLANK.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbvDisplay {
    pub abv: String,
    pub proof: String,
    pub display: String,
}

/// "46.3%" becomes "46.3% (≈93 proof)". Values with no numeric part pass
/// through untouched so an odd label reading still shows something.
pub fn abv_display(raw: &str) -> AbvDisplay {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AbvDisplay {
            abv: BLANK.to_string(),
            proof: BLANK.to_string(),
            display: BLANK.to_string(),
        };
    }
    let Some(value) = first_number(trimmed) else {
        return AbvDisplay {
            abv: trimmed.to_string(),
            proof: BLANK.to_string(),
            display: trimmed.to_string(),
        };
    };
    let proof = (value * 2.0).round() as i64;
    AbvDisplay {
        abv: format!("{value}%"),
        proof: proof.to_string(),
        display: format!("{value}% (≈{proof} proof)"),
    }
}

fn first_number(text: &str) -> Option<f64> {
    let start = text.find(|ch: char| ch.is_ascii_digit())?;
    let run: String = text[start..]
        .chars()
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();
    run.trim_end_matches('.').parse().ok()
}

/// flagcdn serves reliable small PNGs; countries outside the shop
/// vocabulary fall back to the UN flag.
static COUNTRY_FLAGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("USA", "https://flagcdn.com/w80/us.png"),
        ("Scotland", "https://flagcdn.com/w80/gb-sct.png"),
        ("Ireland", "https://flagcdn.com/w80/ie.png"),
        ("Japan", "https://flagcdn.com/w80/jp.png"),
        ("Canada", "https://flagcdn.com/w80/ca.png"),
        ("Taiwan", "https://flagcdn.com/w80/tw.png"),
        ("India", "https://flagcdn.com/w80/in.png"),
        ("England", "https://flagcdn.com/w80/gb-eng.png"),
        ("Wales", "https://flagcdn.com/w80/gb-wls.png"),
        ("France", "https://flagcdn.com/w80/fr.png"),
        ("Italy", "https://flagcdn.com/w80/it.png"),
        ("Portugal", "https://flagcdn.com/w80/pt.png"),
        ("Mexico", "https://flagcdn.com/w80/mx.png"),
        ("Australia", "https://flagcdn.com/w80/au.png"),
        ("Caribbean", "https://flagcdn.com/w80/jm.png"),
    ])
});

fn country_flag_url(country: &str) -> &'static str {
    COUNTRY_FLAGS
        .get(country)
        .copied()
        .unwrap_or("https://flagcdn.com/w80/un.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_snapshot() -> ProductSnapshot {
        let mut metafields = BTreeMap::new();
        metafields.insert("custom.location_".to_string(), "USA".to_string());
        metafields.insert("custom.state".to_string(), "Kentucky".to_string());
        metafields.insert("custom.age_statement".to_string(), "12 Years".to_string());
        metafields.insert("custom.alcohol_by_volume".to_string(), "46.3%".to_string());
        metafields.insert("custom.sub_type".to_string(), "Bourbon".to_string());
        metafields.insert(
            "custom.nose".to_string(),
            r#"["caramel","vanilla","oak"]"#.to_string(),
        );
        metafields.insert("custom.palate".to_string(), r#"["toffee"]"#.to_string());
        metafields.insert("custom.finish".to_string(), r#"["warm"]"#.to_string());
        ProductSnapshot {
            id: 42,
            title: "Benchmark Test Bourbon".into(),
            handle: "benchmark-test-bourbon".into(),
            description_html: "<p>Soft &amp; sweet,<br>with oak.</p>".into(),
            image_url: Some("https://cdn.example.com/bottle.png".into()),
            price: Some("49.99".into()),
            metafields,
        }
    }

    #[test]
    fn strip_html_drops_tags_and_decodes_entities() {
        assert_eq!(
            strip_html("<p>Soft &amp; sweet,<br>with   oak.</p>"),
            "Soft & sweet, with oak."
        );
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn escape_html_covers_the_template_characters() {
        assert_eq!(
            escape_html(r#"Eagle <"Rare"> & Co"#),
            "Eagle &lt;&quot;Rare&quot;&gt; &amp; Co"
        );
    }

    #[test]
    fn abv_display_derives_proof() {
        let parsed = abv_display("46.3%");
        assert_eq!(parsed.abv, "46.3%");
        assert_eq!(parsed.proof, "93");
        assert_eq!(parsed.display, "46.3% (≈93 proof)");

        assert_eq!(abv_display("50%").display, "50% (≈100 proof)");
        assert_eq!(abv_display("").display, BLANK);
        assert_eq!(abv_display("barrel strength").display, "barrel strength");
    }

    #[test]
    fn price_formats_or_blanks() {
        assert_eq!(format_price(Some("49.99")), "$49.99");
        assert_eq!(format_price(Some("50")), "$50.00");
        assert_eq!(format_price(Some("not a price")), BLANK);
        assert_eq!(format_price(None), BLANK);
    }

    #[test]
    fn metafield_text_unpacks_json_lists() {
        assert_eq!(
            metafield_text(r#"["caramel","vanilla","oak"]"#),
            "caramel, vanilla, oak"
        );
        assert_eq!(metafield_text("Kentucky"), "Kentucky");
        assert_eq!(metafield_text(""), "");
    }

    #[test]
    fn card_data_fills_display_defaults() {
        let data = card_data(&sample_snapshot());
        assert_eq!(data.location, "Kentucky, USA");
        assert_eq!(data.nose, "caramel, vanilla, oak");
        assert_eq!(data.abv_display, "46.3% (≈93 proof)");
        assert_eq!(data.price, "$49.99");
        assert_eq!(data.description, "Soft & sweet, with oak.");

        let mut snapshot = sample_snapshot();
        snapshot.metafields.clear();
        snapshot.price = None;
        let data = card_data(&snapshot);
        assert_eq!(data.country, "USA");
        assert_eq!(data.age_statement, "NAS");
        assert_eq!(data.nose, BLANK);
        assert_eq!(data.price, BLANK);
    }

    #[test]
    fn every_token_is_replaced() {
        let data = card_data(&sample_snapshot());
        let html = build_card_html(&data, "data:image/png;base64,QR");
        assert!(unreplaced_tokens(&html).is_empty(), "leftover tokens in {html}");
        assert!(html.contains("Benchmark Test Bourbon"));
        assert!(html.contains("data:image/png;base64,QR"));
    }

    #[test]
    fn unreplaced_tokens_are_reported() {
        let tokens = unreplaced_tokens("<b>{{TITLE}}</b> and {{NOSE}} but not {lone}");
        assert_eq!(tokens, vec!["{{TITLE}}", "{{NOSE}}"]);
    }

    #[test]
    fn truncation_respects_the_budget() {
        let text = "oak and caramel with a long warm finish that keeps going";
        let cut = truncate_to_budget(text, 30);
        assert!(cut.chars().count() <= 30);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_to_budget("short", 30), "short");
    }

    #[test]
    fn qr_target_joins_cleanly() {
        assert_eq!(
            product_page_url("https://www.whiskeylibrary.com/", "benchmark-test-bourbon"),
            "https://www.whiskeylibrary.com/products/benchmark-test-bourbon"
        );
    }
}
