use serde_json::Value;
use tracing::warn;

use crate::llm::LlmClient;

/// Extraction values below this confidence never override the draft.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

const SYSTEM_PROMPT: &str = r#"
You inspect whiskey bottle photographs for an inventory team. Report ONLY facts you can
actually read on the label or clearly see. Never infer or estimate.

Respond with valid JSON only, in this structure:
{
  "abv": {"value": "50.5%", "confidence": 0.9} or null,
  "store_pick": {"value": true, "confidence": 0.8} or null,
  "single_barrel": {"value": true, "confidence": 0.8} or null,
  "search_query": "brand expression age/finish, good for a web search",
  "evidence": ["short phrases quoting what you read"]
}

Confidence is 0.0-1.0 and reflects how legible the supporting label text is.
Use null for anything you cannot read.
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct SignalValue<T> {
    pub value: T,
    pub confidence: f64,
}

/// High-confidence facts read off the bottle, kept separate from the
/// creative draft so they can override it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalExtraction {
    pub abv: Option<SignalValue<String>>,
    pub store_pick: Option<SignalValue<bool>>,
    pub single_barrel: Option<SignalValue<bool>>,
    pub search_query: Option<String>,
    pub evidence: Vec<String>,
}

impl SignalExtraction {
    pub fn confident_abv(&self) -> Option<&str> {
        self.abv
            .as_ref()
            .filter(|signal| signal.confidence >= CONFIDENCE_THRESHOLD)
            .map(|signal| signal.value.as_str())
    }

    pub fn confident_store_pick(&self) -> Option<bool> {
        self.store_pick
            .as_ref()
            .filter(|signal| signal.confidence >= CONFIDENCE_THRESHOLD)
            .map(|signal| signal.value)
    }

    pub fn confident_single_barrel(&self) -> Option<bool> {
        self.single_barrel
            .as_ref()
            .filter(|signal| signal.confidence >= CONFIDENCE_THRESHOLD)
            .map(|signal| signal.value)
    }

    /// Tolerant parse: malformed sections become `None` rather than errors.
    pub fn from_value(value: &Value) -> Self {
        Self {
            abv: parse_string_signal(value.get("abv")),
            store_pick: parse_bool_signal(value.get("store_pick")),
            single_barrel: parse_bool_signal(value.get("single_barrel")),
            search_query: value
                .get("search_query")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(String::from),
            evidence: value
                .get("evidence")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|text| !text.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn parse_string_signal(value: Option<&Value>) -> Option<SignalValue<String>> {
    let obj = value?.as_object()?;
    let text = match obj.get("value") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => return None,
    };
    Some(SignalValue {
        value: text,
        confidence: obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
    })
}

fn parse_bool_signal(value: Option<&Value>) -> Option<SignalValue<bool>> {
    let obj = value?.as_object()?;
    let flag = obj.get("value")?.as_bool()?;
    Some(SignalValue {
        value: flag,
        confidence: obj.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
    })
}

/// Run the extraction pass. Failure degrades to `None`; the pipeline keeps
/// going without overrides.
pub async fn extract_signals(
    llm: &LlmClient,
    image_url: &str,
    notes: &str,
) -> Option<SignalExtraction> {
    let user = format!(
        "Operator shelf notes (may be empty or incomplete):\n{}\n\nRead the label and report the signals.",
        if notes.trim().is_empty() { "none" } else { notes }
    );

    match llm.vision_json(SYSTEM_PROMPT, &user, Some(image_url)).await {
        Ok(value) => Some(SignalExtraction::from_value(&value)),
        Err(err) => {
            warn!(target: "rickhouse.llm", error = %err, "signal extraction failed, continuing without");
            None
        }
    }
}
