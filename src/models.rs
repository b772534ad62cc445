use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProductRequest {
    /// URL of the raw bottle photo (chat attachment, phone upload, ...).
    pub image_url: String,
    pub cost: f64,
    pub price: f64,
    #[serde(default)]
    pub abv: Option<f64>,
    #[serde(default)]
    pub proof: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub reference_link: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl ProductRequest {
    /// Surface-level sanity checks before any stage runs. Mirrors the ranges
    /// enforced by the chat command definition.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_url.trim().is_empty() {
            return Err("image_url is required".into());
        }
        if !(self.cost.is_finite() && self.cost >= 0.0) {
            return Err("cost must be a non-negative number".into());
        }
        if !(self.price.is_finite() && self.price >= 0.0) {
            return Err("price must be a non-negative number".into());
        }
        if let Some(abv) = self.abv
            && !(0.0..=100.0).contains(&abv)
        {
            return Err("abv must be between 0 and 100".into());
        }
        if let Some(proof) = self.proof
            && !(0.0..=200.0).contains(&proof)
        {
            return Err("proof must be between 0 and 200".into());
        }
        if let Some(quantity) = self.quantity
            && quantity < 0
        {
            return Err("quantity must not be negative".into());
        }
        Ok(())
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProductResponse {
    /// Absent on dry runs, which stop before the commerce write.
    pub product_id: Option<u64>,
    pub admin_url: Option<String>,
    pub title: String,
    pub needs_abv: bool,
    pub warnings: Vec<String>,
    pub listing: Value,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TastingCardRequest {
    #[serde(default)]
    pub product_id: Option<u64>,
    #[serde(default)]
    pub admin_url: Option<String>,
    #[serde(default)]
    pub force: bool,
}

impl TastingCardRequest {
    pub fn resolve_product_id(&self) -> Option<u64> {
        self.product_id
            .or_else(|| self.admin_url.as_deref().and_then(extract_product_id))
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TastingCardResponse {
    pub product_id: u64,
    pub skipped: bool,
    pub reason: Option<String>,
    pub card_url: Option<String>,
    pub card_id: Option<String>,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeImageRequest {
    pub image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Accepts a bare numeric id or any admin/product URL containing
/// `/products/<id>` and returns the numeric product id.
pub fn extract_product_id(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if let Ok(id) = trimmed.parse::<u64>() {
        return Some(id);
    }
    let rest = &trimmed[trimmed.find("/products/")? + "/products/".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ProductRequest {
        ProductRequest {
            image_url: "https://cdn.example.com/bottle.jpg".into(),
            cost: 38.0,
            price: 64.99,
            abv: None,
            proof: Some(107.0),
            quantity: Some(6),
            barcode: None,
            reference_link: None,
            notes: "store pick, single barrel".into(),
            vendor: None,
            dry_run: false,
        }
    }

    #[test]
    fn request_validation_catches_out_of_range_numbers() {
        assert!(sample_request().validate().is_ok());

        let mut bad = sample_request();
        bad.abv = Some(250.0);
        assert!(bad.validate().unwrap_err().contains("abv"));

        let mut bad = sample_request();
        bad.proof = Some(-1.0);
        assert!(bad.validate().unwrap_err().contains("proof"));

        let mut bad = sample_request();
        bad.image_url = "  ".into();
        assert!(bad.validate().unwrap_err().contains("image_url"));
    }

    #[test]
    fn product_id_extraction_handles_urls_and_bare_ids() {
        assert_eq!(extract_product_id("8675309"), Some(8_675_309));
        assert_eq!(
            extract_product_id(
                "https://admin.shopify.com/store/rickhouse/products/8675309?tab=variants"
            ),
            Some(8_675_309)
        );
        assert_eq!(extract_product_id("https://example.com/collections/all"), None);
        assert_eq!(extract_product_id("not a url"), None);
    }
}
