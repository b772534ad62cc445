use crate::card::CardGenerator;
use crate::config::AppConfig;
use crate::http::build_client;
use crate::imaging::{EditedImage, StudioNormalizer, StudioOutcome, providers_from_config};
use crate::listing::{ListingDraft, SignalExtraction, SynthesisError, synthesize_listing};
use crate::llm::LlmClient;
use crate::models::{ProductRequest, ProductResponse, StageReport, TastingCardResponse};
use crate::notify::{self, Notifier};
use crate::research::{EvidenceBundle, ResearchClient};
use crate::shopify::{
    CreatedProduct, MetafieldWriteReport, ProductRecord, PublishReport, ShopifyClient,
};
use reqwest::Client;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::warn;

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmClient>,
    shopify: ShopifyClient,
    research: Arc<ResearchClient>,
    studio: Arc<StudioNormalizer>,
    card: Arc<CardGenerator>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let http = build_client();
        let notifier = notify::from_config(&config.notify, http.clone());
        Self::assemble(config, http, notifier)
    }

    /// Same wiring with the progress channel swapped out. Tests inject a
    /// recording notifier through this.
    pub fn with_notifier(config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self::assemble(config, build_client(), notifier)
    }

    fn assemble(config: AppConfig, http: Client, notifier: Arc<dyn Notifier>) -> Self {
        let llm = Arc::new(LlmClient::new(config.llm.clone()));
        let shopify = ShopifyClient::new(config.shopify.clone(), http.clone());
        let research = Arc::new(ResearchClient::new(http.clone(), &config.search));
        let providers = providers_from_config(&config.studio, &http);
        let studio = Arc::new(StudioNormalizer::new(http, providers, &config.studio));
        let card = Arc::new(CardGenerator::new(
            shopify.clone(),
            LlmClient::new(config.llm.clone()),
            config.card.clone(),
        ));
        Self {
            config: Arc::new(config),
            llm,
            shopify,
            research,
            studio,
            card,
            notifier,
        }
    }

    pub fn card(&self) -> &CardGenerator {
        &self.card
    }

    // Public wrappers for granular stage endpoints
    pub async fn stage_normalize_image(
        &self,
        image_url: &str,
    ) -> Result<StageOutcome<String>, PipelineError> {
        stages::normalize_image(&self.studio, &self.shopify, image_url, true).await
    }

    pub async fn stage_research(
        &self,
        query: &str,
    ) -> Result<StageOutcome<EvidenceBundle>, PipelineError> {
        stages::research(&self.research, query).await
    }

    /// Runs the whole intake flow for one bottle. The terminal outcome,
    /// success or failure, is always reported through the notifier before
    /// this returns.
    pub async fn run(&self, request: ProductRequest) -> Result<ProductResponse, PipelineError> {
        self.notifier.notify("🚀 Product creation started").await;

        if let Err(message) = request.validate() {
            let err = PipelineError::invalid_input("validate_request", message);
            self.report_failure(&err, None).await;
            return Err(err);
        }

        let mut stages = Vec::new();
        let mut warnings = Vec::new();
        let mut record = ProductRecord::new();

        match self
            .drive(&request, &mut stages, &mut warnings, &mut record)
            .await
        {
            Ok(draft) => {
                let response = assemble_response(draft, &record, warnings, stages);
                self.notifier.notify(&terminal_success(&response)).await;
                Ok(response)
            }
            Err(err) => {
                self.report_failure(&err, record.product()).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        request: &ProductRequest,
        stages: &mut Vec<StageReport>,
        warnings: &mut Vec<String>,
        record: &mut ProductRecord,
    ) -> Result<ListingDraft, PipelineError> {
        let image_url = self
            .capture_stage("normalize_image", "📸 Image received", stages, async {
                stages::normalize_image(
                    &self.studio,
                    &self.shopify,
                    &request.image_url,
                    !request.dry_run,
                )
                .await
            })
            .await?;

        let signals = self
            .capture_stage("extract_signals", "🔍 Reading the label", stages, async {
                stages::extract_signals(&self.llm, &image_url, &request.notes).await
            })
            .await?;

        let query = signals
            .as_ref()
            .and_then(|signals| signals.search_query.clone())
            .unwrap_or_else(|| request.notes.trim().to_string());
        let evidence = self
            .capture_stage("research", "🌐 Researching the bottle", stages, async {
                stages::research(&self.research, &query).await
            })
            .await?;
        if let Some(failure) = &evidence.failure {
            warnings.push(format!(
                "research failed: {} ({})",
                failure.message, failure.hint
            ));
        }

        let summary = match evidence.summary.trim() {
            "" => None,
            summary => Some(summary),
        };
        let draft = self
            .capture_stage(
                "synthesize_listing",
                "🧠 AI is writing the product page",
                stages,
                async {
                    stages::synthesize(&self.llm, request, &image_url, signals.as_ref(), summary)
                        .await
                },
            )
            .await?;
        if draft.abv.is_unknown() {
            warnings.push(
                "ABV could not be read; set alcohol_by_volume on the product before publishing"
                    .to_string(),
            );
        }

        if request.dry_run {
            return Ok(draft);
        }

        let created = self
            .capture_stage(
                "create_record",
                "🛒 Creating the draft product",
                stages,
                async {
                    stages::create_record(
                        &self.shopify,
                        request,
                        &draft,
                        &image_url,
                        &self.config.shopify.default_vendor,
                    )
                    .await
                },
            )
            .await?;
        record
            .mark_created(created)
            .map_err(|err| PipelineError::internal("create_record", err.to_string()))?;
        let product_id = record
            .product()
            .map(|product| product.id)
            .unwrap_or_default();

        let report = self
            .capture_stage(
                "reconcile_metafields",
                "🏷️ Saving whiskey details",
                stages,
                async { stages::reconcile_metafields(&self.shopify, product_id, &draft).await },
            )
            .await?;
        for failure in &report.failed {
            warnings.push(format!(
                "metafield {} was not written: {}",
                failure.key, failure.message
            ));
        }
        record
            .mark_metafields_reconciled(report)
            .map_err(|err| PipelineError::internal("reconcile_metafields", err.to_string()))?;

        let publish = self
            .capture_stage(
                "publish_channels",
                "📢 Publishing to sales channels",
                stages,
                async { stages::publish_channels(&self.shopify, product_id).await },
            )
            .await?;
        warnings.extend(publish.warnings.iter().cloned());
        for failure in &publish.failed {
            warnings.push(format!(
                "channel {} rejected the product: {}",
                failure.channel, failure.message
            ));
        }
        record
            .mark_published(publish)
            .map_err(|err| PipelineError::internal("publish_channels", err.to_string()))?;

        let card = self
            .capture_stage(
                "tasting_card",
                "🎴 Generating the tasting card",
                stages,
                async { stages::tasting_card(&self.card, product_id).await },
            )
            .await?;
        match card {
            Some(card) => warnings.extend(card.warnings),
            None => warnings.push(
                "tasting card was not generated; retry via POST /tasting-cards/generate"
                    .to_string(),
            ),
        }

        Ok(draft)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        announce: &str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        self.notifier.notify(announce).await;
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }

    async fn report_failure(&self, err: &PipelineError, product: Option<&CreatedProduct>) {
        let mut message = format!(
            "❌ Product creation failed at {}: {}",
            err.stage(),
            err.detail()
        );
        if let Some(product) = product {
            message.push_str(&format!("\n{}", product.admin_url));
        }
        self.notifier.notify(&message).await;
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Validation,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn validation(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Validation,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

fn assemble_response(
    draft: ListingDraft,
    record: &ProductRecord,
    warnings: Vec<String>,
    stages: Vec<StageReport>,
) -> ProductResponse {
    let needs_abv = draft.abv.is_unknown();
    let listing = serde_json::to_value(&draft).unwrap_or(Value::Null);
    ProductResponse {
        product_id: record.product().map(|product| product.id),
        admin_url: record.product().map(|product| product.admin_url.clone()),
        title: draft.title,
        needs_abv,
        warnings,
        listing,
        stages,
    }
}

fn terminal_success(response: &ProductResponse) -> String {
    let mut message = match &response.admin_url {
        Some(admin_url) if response.warnings.is_empty() => {
            format!("✅ Draft product created: {}\n{admin_url}", response.title)
        }
        Some(admin_url) => format!(
            "⚠️ Draft product created with {} warning(s): {}\n{admin_url}",
            response.warnings.len(),
            response.title
        ),
        None => format!(
            "✅ Dry run complete: {} (nothing was created)",
            response.title
        ),
    };
    for warning in &response.warnings {
        message.push_str(&format!("\n• {warning}"));
    }
    message
}

/// Storefront tags for a validated draft: category, origin, then the
/// provenance flags worth filtering on.
fn product_tags(draft: &ListingDraft) -> Vec<String> {
    let mut tags = vec![
        draft.sub_type.clone(),
        draft.country.clone(),
        draft.region.clone(),
    ];
    for (set, tag) in [
        (draft.store_pick, "Store Pick"),
        (draft.cask_strength, "Cask Strength"),
        (draft.single_barrel, "Single Barrel"),
        (draft.limited_release, "Limited Release"),
        (draft.gift_pack, "Gift Pack"),
        (draft.finished, "Finished"),
    ] {
        if set {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub mod stages {
    use super::*;
    use crate::listing;
    use crate::shopify::ShopifyError;
    use crate::shopify::files::upload_png;
    use crate::shopify::metafields::{FailedField, listing_metafields, write_metafields};
    use crate::shopify::product::{CreateProductRequest, create_product};
    use crate::shopify::publish::publish_to_all_channels;
    use uuid::Uuid;

    /// Studio-normalizes the packshot. Whatever happens here the pipeline
    /// keeps a usable image reference; a failed edit or upload falls back
    /// to the source URL.
    pub(super) async fn normalize_image(
        studio: &StudioNormalizer,
        shopify: &ShopifyClient,
        source_url: &str,
        host_bytes: bool,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let outcome = studio.normalize(source_url).await;
        let (image_url, output) = match outcome {
            StudioOutcome::Edited {
                image: EditedImage::Url(url),
                provider,
                whitened,
            } => {
                let output = json!({
                    "source": "provider",
                    "provider": provider,
                    "whitened": whitened,
                    "image_url": url,
                });
                (url, output)
            }
            StudioOutcome::Edited {
                image: EditedImage::Bytes(bytes),
                provider,
                whitened,
            } => {
                if host_bytes {
                    match host_edited_bytes(shopify, bytes).await {
                        Ok(url) => {
                            let output = json!({
                                "source": "upload",
                                "provider": provider,
                                "whitened": whitened,
                                "image_url": url,
                            });
                            (url, output)
                        }
                        Err(err) => {
                            warn!(
                                target: "rickhouse.image",
                                error = %err,
                                "edited image upload failed, keeping original"
                            );
                            let output = json!({
                                "source": "original",
                                "provider": provider,
                                "upload_error": err.to_string(),
                            });
                            (source_url.to_string(), output)
                        }
                    }
                } else {
                    let output = json!({
                        "source": "original",
                        "provider": provider,
                        "reason": "edited bytes are not hosted on a dry run",
                    });
                    (source_url.to_string(), output)
                }
            }
            StudioOutcome::Original => (source_url.to_string(), json!({ "source": "original" })),
        };
        Ok(StageOutcome::new(image_url, output))
    }

    async fn host_edited_bytes(
        shopify: &ShopifyClient,
        bytes: Vec<u8>,
    ) -> Result<String, ShopifyError> {
        let filename = format!("packshot-{}.png", Uuid::new_v4().simple());
        let handle = upload_png(shopify, &filename, bytes).await?;
        handle.url.ok_or(ShopifyError::MissingField("file url"))
    }

    pub(super) async fn extract_signals(
        llm: &LlmClient,
        image_url: &str,
        notes: &str,
    ) -> Result<StageOutcome<Option<SignalExtraction>>, PipelineError> {
        let signals = listing::extract_signals(llm, image_url, notes).await;
        let output = match &signals {
            Some(signals) => json!({
                "abv": signals.confident_abv(),
                "store_pick": signals.confident_store_pick(),
                "single_barrel": signals.confident_single_barrel(),
                "search_query": signals.search_query,
                "evidence": signals.evidence.len(),
            }),
            None => json!({ "degraded": true }),
        };
        Ok(StageOutcome::new(signals, output))
    }

    pub(super) async fn research(
        client: &ResearchClient,
        query: &str,
    ) -> Result<StageOutcome<EvidenceBundle>, PipelineError> {
        let bundle = client.tasting_notes(query).await;
        let output = json!({
            "status": bundle.status,
            "query": query,
            "results": bundle.results.len(),
            "failure": bundle.failure,
        });
        Ok(StageOutcome::new(bundle, output))
    }

    pub(super) async fn synthesize(
        llm: &LlmClient,
        request: &ProductRequest,
        image_url: &str,
        signals: Option<&SignalExtraction>,
        evidence: Option<&str>,
    ) -> Result<StageOutcome<ListingDraft>, PipelineError> {
        let draft = synthesize_listing(llm, request, image_url, signals, evidence)
            .await
            .map_err(|err| match err {
                SynthesisError::Schema(violation) => {
                    PipelineError::validation("synthesize_listing", violation.to_string())
                }
                SynthesisError::Llm(err) => {
                    PipelineError::internal("synthesize_listing", err.to_string())
                }
            })?;
        let output = json!({
            "title": draft.title,
            "sub_type": draft.sub_type,
            "country": draft.country,
            "abv": draft.abv.as_display(),
            "nose": draft.nose.len(),
            "palate": draft.palate.len(),
            "finish": draft.finish.len(),
        });
        Ok(StageOutcome::new(draft, output))
    }

    pub(super) async fn create_record(
        shopify: &ShopifyClient,
        request: &ProductRequest,
        draft: &ListingDraft,
        image_url: &str,
        default_vendor: &str,
    ) -> Result<StageOutcome<CreatedProduct>, PipelineError> {
        let create = CreateProductRequest {
            title: draft.title.clone(),
            description_html: draft.description.clone(),
            vendor: request
                .vendor
                .clone()
                .unwrap_or_else(|| default_vendor.to_string()),
            product_type: draft.sub_type.clone(),
            price: request.price,
            cost: request.cost,
            quantity: request.quantity.unwrap_or(1),
            barcode: request.barcode.clone(),
            image_url: Some(image_url.to_string()),
            tags: product_tags(draft),
        };
        let created = create_product(shopify, &create)
            .await
            .map_err(|err| PipelineError::internal("create_record", err.to_string()))?;
        let output = json!({
            "id": created.id,
            "handle": created.handle,
            "admin_url": created.admin_url,
            "vendor": create.vendor,
            "tags": create.tags,
        });
        Ok(StageOutcome::new(created, output))
    }

    /// A transport-level failure here degrades to an all-failed report so
    /// the run can continue to publication; the product already exists.
    pub(super) async fn reconcile_metafields(
        shopify: &ShopifyClient,
        product_id: u64,
        draft: &ListingDraft,
    ) -> Result<StageOutcome<MetafieldWriteReport>, PipelineError> {
        let entries = listing_metafields(draft);
        let report = match write_metafields(shopify, product_id, &entries).await {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    target: "rickhouse.shopify",
                    error = %err,
                    "metafield write transport failure"
                );
                MetafieldWriteReport {
                    written: Vec::new(),
                    failed: entries
                        .iter()
                        .map(|entry| FailedField {
                            key: entry.key.clone(),
                            message: err.to_string(),
                        })
                        .collect(),
                    rounds: 0,
                }
            }
        };
        let output = json!({
            "written": report.written,
            "failed": report.failed,
            "rounds": report.rounds,
        });
        Ok(StageOutcome::new(report, output))
    }

    pub(super) async fn publish_channels(
        shopify: &ShopifyClient,
        product_id: u64,
    ) -> Result<StageOutcome<PublishReport>, PipelineError> {
        let report = publish_to_all_channels(shopify, product_id).await;
        let output = json!({
            "summary": report.summary(),
            "published": report.published,
            "failed": report.failed,
            "warnings": report.warnings,
        });
        Ok(StageOutcome::new(report, output))
    }

    /// The card is a best-effort finishing touch; the product stands
    /// without it.
    pub(super) async fn tasting_card(
        card: &CardGenerator,
        product_id: u64,
    ) -> Result<StageOutcome<Option<TastingCardResponse>>, PipelineError> {
        match card.generate(product_id, false).await {
            Ok(card) => {
                let output = json!({
                    "skipped": card.skipped,
                    "reason": card.reason,
                    "card_url": card.card_url,
                    "content_hash": card.content_hash,
                });
                Ok(StageOutcome::new(Some(card), output))
            }
            Err(err) => {
                warn!(
                    target: "rickhouse.card",
                    error = %err,
                    "tasting card generation failed, continuing"
                );
                Ok(StageOutcome::new(None, json!({ "error": err.to_string() })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CardConfig, LlmConfig, NotifyConfig, SearchConfig, ShopifyConfig, StudioConfig,
    };
    use crate::listing::AbvField;
    use crate::notify::testing::RecordingNotifier;
    use crate::research::ResearchStatus;

    fn offline_config() -> AppConfig {
        AppConfig {
            shopify: ShopifyConfig {
                store_domain: String::new(),
                admin_token: String::new(),
                api_version: "2024-10".into(),
                default_vendor: "The Whiskey Library".into(),
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".into(),
                model: "gpt-4o".into(),
                temperature: 0.4,
            },
            search: SearchConfig {
                api_key: None,
                cx: None,
            },
            studio: StudioConfig {
                nanobanana_api_key: None,
                nanobanana_base_url: "https://api.nanobanana.ai".into(),
                removebg_api_key: None,
                call_timeout_secs: 5,
                whitewash: false,
                whitewash_tolerance: 24,
            },
            card: CardConfig {
                chrome_binary: "chromium".into(),
                render_timeout_secs: 5,
                storefront_base: "https://www.whiskeylibrary.com".into(),
                description_budget: 420,
            },
            notify: NotifyConfig {
                webhook_url: None,
                mode: "off".into(),
            },
        }
    }

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
            notes: "single barrel store pick".into(),
            vendor: None,
            dry_run: false,
        }
    }

    fn sample_draft() -> ListingDraft {
        ListingDraft {
            title: "Benchmark Test Bourbon".into(),
            description: "Soft and sweet with a long finish.".into(),
            nose: vec!["caramel".into(), "vanilla".into(), "oak".into()],
            palate: vec!["toffee".into(), "cherry".into(), "baking spice".into()],
            finish: vec!["medium".into(), "warm".into()],
            sub_type: "Bourbon".into(),
            country: "USA".into(),
            region: "Kentucky".into(),
            cask_wood: vec!["American White Oak".into()],
            finish_type: "None".into(),
            age_statement: "NAS".into(),
            abv: AbvField::from_percent(46.5),
            finished: false,
            store_pick: true,
            cask_strength: true,
            single_barrel: false,
            limited_release: false,
            gift_pack: false,
        }
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_and_reported_once() {
        let recorder = RecordingNotifier::new();
        let pipeline = Pipeline::with_notifier(offline_config(), recorder.clone());
        let request = ProductRequest {
            image_url: "   ".into(),
            ..sample_request()
        };

        let err = pipeline.run(request).await.expect_err("must reject");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.stage(), "validate_request");

        let messages = recorder.messages.lock().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "🚀 Product creation started");
        assert!(messages[1].starts_with("❌ Product creation failed at validate_request"));
    }

    #[tokio::test]
    async fn packshot_stage_keeps_the_original_without_providers() {
        let pipeline = Pipeline::with_notifier(offline_config(), RecordingNotifier::new());
        let out = stages::normalize_image(
            &pipeline.studio,
            &pipeline.shopify,
            "https://cdn.example.com/bottle.jpg",
            true,
        )
        .await
        .expect("normalize_image");

        assert_eq!(out.value, "https://cdn.example.com/bottle.jpg");
        assert_eq!(out.output["source"], json!("original"));
    }

    #[tokio::test]
    async fn research_stage_degrades_to_disabled_without_credentials() {
        let pipeline = Pipeline::with_notifier(offline_config(), RecordingNotifier::new());
        let out = stages::research(&pipeline.research, "Benchmark Test Bourbon")
            .await
            .expect("research");

        assert!(matches!(out.value.status, ResearchStatus::Disabled));
        assert!(out.value.results.is_empty());
        assert!(out.value.failure.is_none());
    }

    #[tokio::test]
    async fn metafield_transport_failure_becomes_an_all_failed_report() {
        let pipeline = Pipeline::with_notifier(offline_config(), RecordingNotifier::new());
        let draft = sample_draft();
        let out = stages::reconcile_metafields(&pipeline.shopify, 42, &draft)
            .await
            .expect("reconcile_metafields");

        let report = out.value;
        assert!(report.written.is_empty());
        assert_eq!(report.rounds, 0);
        // every entry named, nothing silently dropped
        assert_eq!(
            report.failed.len(),
            crate::shopify::listing_metafields(&draft).len()
        );
    }

    #[tokio::test]
    async fn card_stage_failure_degrades_to_a_warning_value() {
        let pipeline = Pipeline::with_notifier(offline_config(), RecordingNotifier::new());
        let out = stages::tasting_card(&pipeline.card, 42)
            .await
            .expect("tasting_card");

        assert!(out.value.is_none());
        assert!(out.output.get("error").is_some());
    }

    #[test]
    fn product_tags_carry_category_origin_and_flags() {
        let tags = product_tags(&sample_draft());
        assert_eq!(tags[0], "Bourbon");
        assert_eq!(tags[1], "USA");
        assert_eq!(tags[2], "Kentucky");
        assert!(tags.contains(&"Store Pick".to_string()));
        assert!(tags.contains(&"Cask Strength".to_string()));
        assert!(!tags.contains(&"Gift Pack".to_string()));
    }

    #[test]
    fn terminal_messages_cover_all_outcomes() {
        let base = ProductResponse {
            product_id: Some(42),
            admin_url: Some("https://admin.shopify.com/store/x/products/42".into()),
            title: "Benchmark Test Bourbon".into(),
            needs_abv: false,
            warnings: Vec::new(),
            listing: Value::Null,
            stages: Vec::new(),
        };
        let clean = terminal_success(&base);
        assert!(clean.starts_with("✅ Draft product created"));
        assert!(clean.contains("/products/42"));

        let with_warnings = terminal_success(&ProductResponse {
            warnings: vec!["metafield nose was not written: type mismatch".into()],
            ..base.clone()
        });
        assert!(with_warnings.starts_with("⚠️"));
        assert!(with_warnings.contains("1 warning(s)"));
        assert!(with_warnings.contains("\n• metafield nose"));

        let dry = terminal_success(&ProductResponse {
            product_id: None,
            admin_url: None,
            ..base
        });
        assert!(dry.starts_with("✅ Dry run complete"));
        assert!(!dry.contains("/products/"));
    }
}
