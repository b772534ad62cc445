use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::listing::draft::{ListingDraft, VALID_CASK_WOODS, VALID_COUNTRIES};
use crate::listing::normalize::{SchemaViolation, normalize_listing};
use crate::listing::priors::{PriorInput, build_tasting_priors};
use crate::listing::signals::SignalExtraction;
use crate::llm::{LlmClient, LlmError};
use crate::models::ProductRequest;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("draft generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

/// Generate the creative draft from the packshot and notes, then normalize
/// and validate it. Schema violations are fatal to the run.
pub async fn synthesize_listing(
    llm: &LlmClient,
    request: &ProductRequest,
    image_url: &str,
    signals: Option<&SignalExtraction>,
    evidence: Option<&str>,
) -> Result<ListingDraft, SynthesisError> {
    let system = system_prompt();
    let user = user_prompt(request, signals, evidence);

    let raw: Value = llm.vision_json(&system, &user, Some(image_url)).await?;
    debug!(target: "rickhouse.llm", draft = %raw, "raw listing draft");

    Ok(normalize_listing(raw, signals, request)?)
}

fn system_prompt() -> String {
    let cask_woods = VALID_CASK_WOODS
        .map(|w| format!("\"{w}\""))
        .join(", ");
    let countries = VALID_COUNTRIES.map(|c| format!("\"{c}\"")).join(", ");

    format!(
        r#"You are a whiskey expert and e-commerce copywriter generating a product listing
for a whiskey bottle. You can SEE the bottle image and must read the label text.

RULES:
- Return valid JSON only
- Fill in every field except as noted for abv
- Prefer what is visible on the label over assumptions
- Always generate realistic tasting notes; never invent rare finishes, ages, or mash bills
- If information is unknown or unclear, use safe defaults:
  - age_statement: "NAS"
  - finish_type: "None"
- abv: report it ONLY if it is clearly printed on the label or stated in the
  provided evidence. Otherwise output the string "unknown". Never estimate an ABV.

For cask_wood you MUST use ONLY these exact values (array allowed for multiple):
[{cask_woods}]

For country you MUST use ONLY these exact values:
[{countries}]

Return JSON in this EXACT structure:
{{
  "title": "Brand Name Product Name",
  "description": "A compelling 2-3 sentence product description",
  "nose": ["aroma note 1", "aroma note 2", "aroma note 3"],
  "palate": ["taste note 1", "taste note 2", "taste note 3"],
  "finish": ["finish note 1", "finish note 2"],
  "sub_type": "Straight Bourbon Whiskey",
  "country": "USA",
  "region": "Kentucky",
  "cask_wood": ["American White Oak"],
  "finish_type": "None",
  "age_statement": "4 Years",
  "abv": "45%",
  "finished": false,
  "store_pick": false,
  "cask_strength": false,
  "single_barrel": false,
  "limited_release": false,
  "gift_pack": false
}}"#
    )
}

fn user_prompt(
    request: &ProductRequest,
    signals: Option<&SignalExtraction>,
    evidence: Option<&str>,
) -> String {
    let mut sections = Vec::new();

    let notes = request.notes.trim();
    sections.push(format!(
        "Operator notes (may be empty or incomplete):\n{}",
        if notes.is_empty() { "No additional notes provided" } else { notes }
    ));

    if let Some(link) = request.reference_link.as_deref().map(str::trim)
        && !link.is_empty()
    {
        sections.push(format!("Operator-supplied reference page: {link}"));
    }

    if let Some(signals) = signals
        && !signals.evidence.is_empty()
    {
        sections.push(format!(
            "Label text read from the photo:\n{}",
            signals.evidence.join("\n")
        ));
    }

    match evidence {
        Some(summary) if !summary.trim().is_empty() => {
            sections.push(format!(
                "Web research snippets about this bottle:\n{summary}"
            ));
        }
        _ => {
            let priors = build_tasting_priors(&PriorInput {
                query: signals
                    .and_then(|s| s.search_query.clone())
                    .unwrap_or_default(),
                vendor: request.vendor.clone().unwrap_or_default(),
                title: String::new(),
                notes: request.notes.clone(),
                abv: request.abv,
                proof: request.proof,
            });
            sections.push(format!(
                "No web evidence was found. Category priors, use unless the label contradicts:\nnose: {}\npalate: {}\nfinish: {}\nfinish_type: {}",
                priors.nose.join(", "),
                priors.palate.join(", "),
                priors.finish.join(", "),
                priors.finish_type,
            ));
        }
    }

    sections.push(
        "TASK:\n1. Read the bottle label from the image\n2. Identify the brand and product name\n3. Generate a complete whiskey product listing".to_string(),
    );

    sections.join("\n\n")
}
