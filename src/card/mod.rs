pub mod hash;
pub mod render;
pub mod template;

pub use hash::CardContent;
pub use render::RenderError;
pub use template::{CARD_HEIGHT, CARD_WIDTH, CardData};

use crate::config::CardConfig;
use crate::llm::LlmClient;
use crate::models::TastingCardResponse;
use crate::shopify::{
    MetafieldEntry, ProductSnapshot, ShopifyClient, ShopifyError,
    files::upload_png,
    metafields::write_metafields,
    product::fetch_snapshot,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

/// A condensed description shorter than this is treated as a failed
/// shortening and replaced by hard truncation of the original.
const MIN_CONDENSED_CHARS: usize = 60;

const CONDENSE_SYSTEM: &str = "You shorten whiskey product descriptions for a printed card. \
Keep the voice and the concrete tasting facts, drop marketing filler. \
Reply with the shortened text only, no quotes and no preamble.";

#[derive(Debug, Error)]
pub enum CardError {
    #[error(transparent)]
    Shopify(#[from] ShopifyError),
    #[error("product {0} has no image for the card")]
    MissingImage(u64),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Renders and attaches tasting cards, skipping work when the rendered
/// content has not changed since the last run.
pub struct CardGenerator {
    shopify: ShopifyClient,
    llm: LlmClient,
    config: CardConfig,
}

impl CardGenerator {
    pub fn new(shopify: ShopifyClient, llm: LlmClient, config: CardConfig) -> Self {
        Self {
            shopify,
            llm,
            config,
        }
    }

    pub async fn generate(
        &self,
        product_id: u64,
        force: bool,
    ) -> Result<TastingCardResponse, CardError> {
        let snapshot = fetch_snapshot(&self.shopify, product_id).await?;
        let content_hash = CardContent::from_snapshot(&snapshot).content_hash();
        let stored = snapshot.metafield("custom.tasting_card_hash");

        let Some(reason) = regen_reason(stored, &content_hash, force) else {
            info!(target: "rickhouse.card", product_id, "card content unchanged; skipping");
            return Ok(TastingCardResponse {
                product_id,
                skipped: true,
                reason: Some("content unchanged".to_string()),
                card_url: None,
                card_id: None,
                content_hash,
                warnings: Vec::new(),
            });
        };
        info!(target: "rickhouse.card", product_id, reason, "generating card");

        if snapshot.image_url.is_none() {
            return Err(CardError::MissingImage(product_id));
        }

        let (html, mut warnings) = self.prepare_html(&snapshot).await?;
        let png = render::render_card_png(&self.config, &html).await?;

        let file = upload_png(&self.shopify, &card_filename(&snapshot), png).await?;

        // The new hash is persisted only after a successful render and
        // upload; a failed attach degrades to a warning so the card itself
        // is not lost.
        let entries = [
            MetafieldEntry::file_reference("tasting_card", &file.id),
            MetafieldEntry::text("tasting_card_hash", &content_hash),
        ];
        match write_metafields(&self.shopify, product_id, &entries).await {
            Ok(report) => {
                for failure in &report.failed {
                    warnings.push(format!(
                        "could not save {}: {}",
                        failure.key, failure.message
                    ));
                }
            }
            Err(err) => warnings.push(format!("could not attach the card: {err}")),
        }

        Ok(TastingCardResponse {
            product_id,
            skipped: false,
            reason: Some(reason.to_string()),
            card_url: file.url,
            card_id: Some(file.id),
            content_hash,
            warnings,
        })
    }

    /// Card HTML without the screenshot step, for checking layout in a
    /// browser.
    pub async fn preview_html(&self, product_id: u64) -> Result<String, CardError> {
        let snapshot = fetch_snapshot(&self.shopify, product_id).await?;
        let (html, _) = self.prepare_html(&snapshot).await?;
        Ok(html)
    }

    /// Layout preview with canned product data, no platform calls.
    pub async fn preview_sample(&self) -> Result<String, CardError> {
        let (html, _) = self.prepare_html(&sample_snapshot()).await?;
        Ok(html)
    }

    async fn prepare_html(
        &self,
        snapshot: &ProductSnapshot,
    ) -> Result<(String, Vec<String>), CardError> {
        let mut warnings = Vec::new();
        let mut data = template::card_data(snapshot);
        data.description = self
            .fit_description(&data.title, &data.description, &mut warnings)
            .await;

        let page_url = template::product_page_url(&self.config.storefront_base, &data.handle);
        let qr = render::qr_data_url(&page_url)?;
        let html = template::build_card_html(&data, &qr);

        let leftover = template::unreplaced_tokens(&html);
        if !leftover.is_empty() {
            warn!(target: "rickhouse.card", tokens = ?leftover, "unreplaced template tokens");
            warnings.push(format!("unreplaced template tokens: {}", leftover.join(", ")));
        }
        Ok((html, warnings))
    }

    /// Fits the description into the card's character budget. Shortening is
    /// only attempted when the text is over budget, and its result is
    /// re-checked against hard bounds; anything out of bounds falls back to
    /// truncation so the layout never overflows.
    async fn fit_description(
        &self,
        title: &str,
        description: &str,
        warnings: &mut Vec<String>,
    ) -> String {
        let budget = self.config.description_budget;
        if description.chars().count() <= budget {
            return description.to_string();
        }

        if self.llm.is_configured() {
            let prompt = format!(
                "Shorten this description of \"{title}\" to at most {budget} characters:\n\n{description}"
            );
            match self.llm.chat_text(CONDENSE_SYSTEM, &prompt).await {
                Ok(short) => {
                    let short = short.trim().to_string();
                    let chars = short.chars().count();
                    if (MIN_CONDENSED_CHARS..=budget).contains(&chars) {
                        return short;
                    }
                    warn!(
                        target: "rickhouse.card",
                        chars,
                        budget,
                        "condensed description out of bounds; truncating"
                    );
                }
                Err(err) => {
                    warn!(target: "rickhouse.card", error = %err, "condense call failed; truncating");
                }
            }
        }
        warnings.push("description truncated to fit the card".to_string());
        template::truncate_to_budget(description, budget)
    }
}

/// Decides whether a card render is needed. `None` means the stored hash
/// already matches the computed one and nothing was forced; otherwise the
/// returned reason says why a fresh render happens.
fn regen_reason(stored: Option<&str>, computed: &str, force: bool) -> Option<&'static str> {
    if !force && stored == Some(computed) {
        return None;
    }
    Some(if force {
        "forced"
    } else if stored.is_none() {
        "first generation"
    } else {
        "content changed"
    })
}

fn card_filename(snapshot: &ProductSnapshot) -> String {
    if snapshot.handle.is_empty() {
        format!("tasting-card-{}.png", snapshot.id)
    } else {
        format!("tasting-card-{}.png", snapshot.handle)
    }
}

fn sample_snapshot() -> ProductSnapshot {
    let mut metafields = BTreeMap::new();
    for (key, value) in [
        ("custom.location_", "USA"),
        ("custom.state", "Kentucky"),
        ("custom.sub_type", "Bourbon"),
        ("custom.age_statement", "12 Years"),
        ("custom.alcohol_by_volume", "53.5%"),
        ("custom.nose", r#"["caramel","vanilla","charred oak"]"#),
        ("custom.palate", r#"["toffee","dark cherry","baking spice"]"#),
        ("custom.finish", r#"["long","warming"]"#),
    ] {
        metafields.insert(key.to_string(), value.to_string());
    }
    ProductSnapshot {
        id: 0,
        title: "Rickhouse Reserve Single Barrel".to_string(),
        handle: "rickhouse-reserve-single-barrel".to_string(),
        description_html: "<p>A single barrel bourbon picked for the shop. Deep caramel \
            sweetness up front, dark cherry and toffee through the middle, and a long \
            warming oak finish.</p>"
            .to_string(),
        image_url: Some("https://cdn.shopify.com/sample-bottle.png".to_string()),
        price: Some("89.99".to_string()),
        metafields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CardConfig, LlmConfig, ShopifyConfig};
    use crate::http::build_client;
    use std::collections::BTreeMap;

    fn generator() -> CardGenerator {
        let shopify = ShopifyClient::new(
            ShopifyConfig {
                store_domain: String::new(),
                admin_token: String::new(),
                api_version: "2024-10".into(),
                default_vendor: "The Whiskey Library".into(),
            },
            build_client(),
        );
        let llm = LlmClient::new(LlmConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            temperature: 0.4,
        });
        let config = CardConfig {
            chrome_binary: "chromium".into(),
            render_timeout_secs: 40,
            storefront_base: "https://www.whiskeylibrary.com".into(),
            description_budget: 120,
        };
        CardGenerator::new(shopify, llm, config)
    }

    fn sample_snapshot() -> ProductSnapshot {
        ProductSnapshot {
            id: 42,
            title: "Benchmark Test Bourbon".into(),
            handle: "benchmark-test-bourbon".into(),
            description_html: "<p>Soft and sweet.</p>".into(),
            image_url: Some("https://cdn.example.com/bottle.png".into()),
            price: Some("49.99".into()),
            metafields: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn short_descriptions_pass_through_unchanged() {
        let generator = generator();
        let mut warnings = Vec::new();
        let fitted = generator
            .fit_description("Benchmark", "Soft and sweet.", &mut warnings)
            .await;
        assert_eq!(fitted, "Soft and sweet.");
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn over_budget_without_a_model_hard_truncates() {
        let generator = generator();
        let long = "caramel and oak ".repeat(20);
        let mut warnings = Vec::new();
        let fitted = generator
            .fit_description("Benchmark", &long, &mut warnings)
            .await;
        assert!(fitted.chars().count() <= 120);
        assert!(fitted.ends_with('…'));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn matching_hash_skips_unless_forced() {
        let hash = "abc123";
        assert_eq!(regen_reason(Some(hash), hash, false), None);
        assert_eq!(regen_reason(Some(hash), hash, true), Some("forced"));
        assert_eq!(regen_reason(None, hash, false), Some("first generation"));
        assert_eq!(
            regen_reason(Some("older"), hash, false),
            Some("content changed")
        );
    }

    #[test]
    fn unchanged_snapshot_reproduces_the_stored_hash_and_skips() {
        let snapshot = sample_snapshot();
        let first = CardContent::from_snapshot(&snapshot).content_hash();

        // A second fetch of the same product hashes identically, so the
        // stored value gates the rerender off.
        let again = CardContent::from_snapshot(&snapshot).content_hash();
        assert_eq!(first, again);
        assert_eq!(regen_reason(Some(first.as_str()), &again, false), None);

        let mut edited = snapshot;
        edited.title = "Benchmark Test Bourbon Batch 2".into();
        let changed = CardContent::from_snapshot(&edited).content_hash();
        assert_ne!(first, changed);
        assert_eq!(
            regen_reason(Some(first.as_str()), &changed, false),
            Some("content changed")
        );
    }

    #[test]
    fn filename_prefers_the_handle() {
        assert_eq!(
            card_filename(&sample_snapshot()),
            "tasting-card-benchmark-test-bourbon.png"
        );
        let mut snapshot = sample_snapshot();
        snapshot.handle.clear();
        assert_eq!(card_filename(&snapshot), "tasting-card-42.png");
    }
}
