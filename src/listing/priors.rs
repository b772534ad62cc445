//! Deterministic tasting-note priors used when web evidence is missing.
//! These are educated category defaults, not claims about a specific
//! bottling, and they always satisfy the draft's minimum list lengths.

#[derive(Debug, Clone, Default)]
pub struct PriorInput {
    pub query: String,
    pub vendor: String,
    pub title: String,
    pub notes: String,
    pub abv: Option<f64>,
    pub proof: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TastingPriors {
    pub nose: Vec<String>,
    pub palate: Vec<String>,
    pub finish: Vec<String>,
    pub finish_type: &'static str,
    pub rationale: Vec<String>,
}

const BOURBON_NOSE: [&str; 5] = [
    "rich caramel and vanilla",
    "toasted oak with brown sugar",
    "warm baking spices",
    "butterscotch and maple sweetness",
    "hints of orange peel",
];
const BOURBON_PALATE: [&str; 4] = [
    "honeyed toffee and brown sugar",
    "charred oak with cinnamon warmth",
    "black pepper and dark chocolate",
    "full-bodied and coating",
];
const RYE_NOSE: [&str; 4] = [
    "fresh mint and eucalyptus",
    "bold pepper and baking spices",
    "toasted oak with citrus zest",
    "herbal undertones",
];
const RYE_PALATE: [&str; 4] = [
    "spicy rye character with black pepper",
    "cinnamon and clove warmth",
    "hints of mint and honey",
    "medium-bodied with oak backbone",
];
const CORN_NOSE: [&str; 4] = [
    "sweet corn and grain",
    "light honey and butterscotch",
    "gentle baking spices",
    "subtle herbal notes",
];
const CORN_PALATE: [&str; 4] = [
    "creamy corn sweetness",
    "honey and light toffee",
    "gentle pepper and oak",
    "citrus brightness",
];
const SCOTCH_NOSE: [&str; 4] = [
    "peat smoke and earthy notes",
    "malty sweetness with oak",
    "dried fruit and citrus",
    "maritime hints",
];
const SCOTCH_PALATE: [&str; 4] = [
    "smoky and peppery",
    "rich malt with oak tannins",
    "dried fruit and dark chocolate",
    "complex and layered",
];

pub fn build_tasting_priors(input: &PriorInput) -> TastingPriors {
    let text = [
        input.query.as_str(),
        input.vendor.as_str(),
        input.title.as_str(),
        input.notes.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .cloned()
    .collect::<Vec<_>>()
    .join(" | ")
    .to_lowercase();

    let is_rye = contains_word(&text, "rye");
    let is_corn = contains_word(&text, "corn") || contains_word(&text, "jimmy red");
    let is_wheated = contains_word(&text, "wheat") || contains_word(&text, "wheated");
    let is_scotch = contains_word(&text, "scotch")
        || contains_word(&text, "single malt")
        || contains_word(&text, "peat");

    let finish_type = detect_finish_type(&text);
    let intensity = score_intensity(input.abv, input.proof);

    let vendor = input.vendor.to_lowercase();
    let title = input.title.to_lowercase();
    let query = input.query.to_lowercase();

    let mut rationale = Vec::new();
    if is_corn {
        rationale.push("corn whiskey / Jimmy Red-style cue".to_string());
    }
    if is_rye {
        rationale.push("rye cue".to_string());
    }
    if is_wheated {
        rationale.push("wheated cue".to_string());
    }
    if finish_type != "None" {
        rationale.push(format!("finish cue: {finish_type}"));
    }
    if input.abv.is_some() || input.proof.is_some() {
        rationale.push("intensity adjusted by proof/ABV".to_string());
    }

    let (mut nose, mut palate): (Vec<String>, Vec<String>) = if is_scotch {
        (to_vec(&SCOTCH_NOSE), to_vec(&SCOTCH_PALATE))
    } else if is_corn {
        (to_vec(&CORN_NOSE), to_vec(&CORN_PALATE))
    } else if is_rye {
        (to_vec(&RYE_NOSE), to_vec(&RYE_PALATE))
    } else {
        (to_vec(&BOURBON_NOSE), to_vec(&BOURBON_PALATE))
    };

    // Producer nudges, kept small and conservative.
    if vendor.contains("heaven hill") || title.contains("heaven hill") {
        push_all(&mut nose, &["peanut brittle", "tobacco", "nutty"]);
        push_all(&mut palate, &["peanut brittle", "tobacco"]);
        rationale.push("Heaven Hill profile nudges (nutty/peanut/tobacco)".to_string());
    }
    if query.contains("parker") || title.contains("parker") {
        push_all(&mut nose, &["leather", "tobacco", "dried fruit"]);
        push_all(&mut palate, &["leather", "dried fruit"]);
        rationale.push("Parker's Heritage-style release nudges".to_string());
    }
    if query.contains("wild turkey") || title.contains("wild turkey") {
        push_all(&mut nose, &["orange peel", "cinnamon"]);
        push_all(&mut palate, &["orange peel", "cinnamon"]);
        rationale.push("Wild Turkey citrus/spice nudges".to_string());
    }

    match finish_type {
        "Sherry" | "Pedro Ximénez" | "Oloroso" => {
            push_all(&mut nose, &["raisin", "fig", "chocolate", "nutty"]);
            push_all(&mut palate, &["raisin", "fig", "chocolate", "coffee"]);
        }
        "Port" => {
            push_all(&mut nose, &["red fruit", "cherry", "chocolate"]);
            push_all(&mut palate, &["red fruit", "cherry", "chocolate"]);
        }
        "Madeira" | "Wine" => {
            push_all(&mut nose, &["stone fruit", "orchard fruit", "citrus"]);
            push_all(&mut palate, &["stone fruit", "orchard fruit", "citrus"]);
        }
        "Rum" => {
            push_all(&mut nose, &["brown sugar", "toffee", "tropical"]);
            push_all(&mut palate, &["brown sugar", "toffee", "tropical"]);
        }
        "Cognac" => {
            push_all(&mut nose, &["dried fruit", "nutty", "chocolate"]);
            push_all(&mut palate, &["dried fruit", "nutty", "chocolate"]);
        }
        "Beer/Stout" => {
            push_all(&mut nose, &["coffee", "cocoa", "chocolate"]);
            push_all(&mut palate, &["coffee", "cocoa", "chocolate"]);
        }
        "Amburana" => {
            push_all(&mut nose, &["cinnamon", "nutmeg", "clove"]);
            push_all(&mut palate, &["cinnamon", "nutmeg", "clove"]);
        }
        "Mizunara" => {
            push_all(&mut nose, &["cedar", "eucalyptus"]);
            push_all(&mut palate, &["cedar", "herbal"]);
        }
        _ => {}
    }

    // Wheated reads softer and sweeter.
    if is_wheated {
        push_all(&mut nose, &["honey", "toffee"]);
        push_all(&mut palate, &["honey", "toffee"]);
    }

    let mut finish = Vec::new();
    finish.push(if intensity >= 0.75 { "bold" } else { "smooth" }.to_string());
    finish.push(if intensity >= 0.65 { "long" } else { "medium" }.to_string());
    finish.push(if intensity >= 0.55 { "warm" } else { "clean" }.to_string());
    if is_rye || finish_type == "Amburana" {
        finish.push("spicy".to_string());
    }
    if !is_rye && !is_corn {
        finish.push("oaky".to_string());
    }

    let mut nose = uniq(nose);
    nose.truncate(5);
    let mut palate = uniq(palate);
    palate.truncate(5);
    let mut finish = uniq(finish);
    finish.truncate(4);

    // Validation minimums always hold.
    while nose.len() < 3 {
        nose.push("oak".to_string());
    }
    while palate.len() < 3 {
        palate.push("oak".to_string());
    }
    while finish.len() < 2 {
        finish.push("warm".to_string());
    }

    rationale.truncate(8);

    TastingPriors {
        nose,
        palate,
        finish,
        finish_type,
        rationale,
    }
}

fn detect_finish_type(text: &str) -> &'static str {
    if contains_word(text, "px")
        || contains_word(text, "pedro ximenez")
        || contains_word(text, "pedro ximénez")
    {
        return "Pedro Ximénez";
    }
    if contains_word(text, "oloroso") {
        return "Oloroso";
    }
    if contains_word(text, "sherry") {
        return "Sherry";
    }
    if contains_word(text, "port") {
        return "Port";
    }
    if contains_word(text, "madeira") {
        return "Madeira";
    }
    if contains_word(text, "cognac") {
        return "Cognac";
    }
    if contains_word(text, "rum") {
        return "Rum";
    }
    if contains_word(text, "stout") || contains_word(text, "beer") {
        return "Beer/Stout";
    }
    if contains_word(text, "wine") {
        return "Wine";
    }
    if contains_word(text, "amburana") {
        return "Amburana";
    }
    if contains_word(text, "mizunara") {
        return "Mizunara";
    }
    if contains_word(text, "toasted") || contains_word(text, "double oak") {
        return "Toasted Barrel";
    }
    "None"
}

/// 40% -> 0.3, 50% -> 0.55, 60% -> 0.8, clamped to [0.2, 0.95]. Unknown
/// strength sits in the middle.
fn score_intensity(abv: Option<f64>, proof: Option<f64>) -> f64 {
    let computed = abv.or(proof.map(|p| p / 2.0));
    match computed {
        Some(value) if value > 0.0 => ((value - 35.0) / 40.0).clamp(0.2, 0.95),
        _ => 0.5,
    }
}

/// Whole-word containment over lowercased text.
fn contains_word(text: &str, phrase: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(offset) = text[from..].find(phrase) {
        let begin = from + offset;
        let end = begin + phrase.len();
        let before_ok = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        from = begin + 1;
    }
    false
}

fn to_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn push_all(target: &mut Vec<String>, items: &[&str]) {
    target.extend(items.iter().map(|s| s.to_string()));
}

fn uniq(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}
