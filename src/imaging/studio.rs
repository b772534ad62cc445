use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StudioConfig;
use crate::http::fetch_bytes;
use crate::imaging::whitewash::whiten_background;

const STANDARD_INSTRUCTION: &str = "Professional e-commerce product photo of a liquor bottle. \
Front-facing view. Pure white background. Soft studio lighting. No shadows. Clean and minimal. \
High resolution product photography.";

const STRICTER_INSTRUCTION: &str = "Re-shoot this liquor bottle as a studio packshot. The output \
must differ from the input: replace the entire background with pure white, center the bottle \
front-facing, and apply soft even lighting. Do not return the source photo unchanged.";

const NEGATIVE_PROMPT: &str = "blurry, distorted, low quality, watermark, text overlay, \
background objects, shadows, reflections";

/// Output bytes within this length delta of the input, with a matching
/// prefix, are assumed to be the input echoed back.
const NOOP_LENGTH_DELTA: f64 = 0.01;
const NOOP_PREFIX_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("http error: {0}")]
    Http(String),
    #[error("no image in response: {0}")]
    NoImage(String),
}

#[derive(Debug, Clone)]
pub enum EditedImage {
    Url(String),
    Bytes(Vec<u8>),
}

#[async_trait]
pub trait EditProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn edit(&self, source_url: &str, instruction: &str) -> Result<EditedImage, EditError>;
}

/// Result of the normalization chain. `Original` means every provider was
/// skipped, failed, or echoed the input; callers keep the source reference.
#[derive(Debug)]
pub enum StudioOutcome {
    Edited {
        image: EditedImage,
        provider: &'static str,
        whitened: bool,
    },
    Original,
}

pub struct StudioNormalizer {
    client: Client,
    providers: Vec<Box<dyn EditProvider>>,
    call_timeout: Duration,
    whitewash: bool,
    whitewash_tolerance: u8,
}

impl StudioNormalizer {
    pub fn new(client: Client, providers: Vec<Box<dyn EditProvider>>, cfg: &StudioConfig) -> Self {
        Self {
            client,
            providers,
            call_timeout: Duration::from_secs(cfg.call_timeout_secs),
            whitewash: cfg.whitewash,
            whitewash_tolerance: cfg.whitewash_tolerance,
        }
    }

    /// Walk the provider chain until one returns a genuinely edited image.
    /// Never errors: any total failure falls back to the original reference.
    pub async fn normalize(&self, source_url: &str) -> StudioOutcome {
        if self.providers.is_empty() {
            info!(target: "rickhouse.image", "no studio providers configured, keeping original");
            return StudioOutcome::Original;
        }

        let source_bytes = match fetch_bytes(&self.client, source_url).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(target: "rickhouse.image", error = %err, "source fetch failed, no-op detection disabled");
                None
            }
        };

        self.run_chain(source_url, source_bytes.as_deref()).await
    }

    async fn run_chain(&self, source_url: &str, source_bytes: Option<&[u8]>) -> StudioOutcome {
        for provider in &self.providers {
            let name = provider.name();

            let first = self
                .attempt(provider.as_ref(), source_url, STANDARD_INSTRUCTION, source_bytes)
                .await;

            let edited = match first {
                Attempt::Edited(image) => Some(image),
                Attempt::NoOp => {
                    warn!(target: "rickhouse.image", provider = name, "provider echoed the input, retrying with stricter instruction");
                    match self
                        .attempt(provider.as_ref(), source_url, STRICTER_INSTRUCTION, source_bytes)
                        .await
                    {
                        Attempt::Edited(image) => Some(image),
                        Attempt::NoOp => {
                            warn!(target: "rickhouse.image", provider = name, "stricter retry also a no-op");
                            None
                        }
                        Attempt::Failed => None,
                    }
                }
                Attempt::Failed => None,
            };

            if let Some(image) = edited {
                info!(target: "rickhouse.image", provider = name, "studio edit accepted");
                return self.finish(image, name).await;
            }
        }

        info!(target: "rickhouse.image", "all studio providers failed, keeping original");
        StudioOutcome::Original
    }

    async fn attempt(
        &self,
        provider: &dyn EditProvider,
        source_url: &str,
        instruction: &str,
        source_bytes: Option<&[u8]>,
    ) -> Attempt {
        let call = provider.edit(source_url, instruction);
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(target: "rickhouse.image", provider = provider.name(), "edit call timed out");
                return Attempt::Failed;
            }
        };

        let image = match result {
            Ok(image) => image,
            Err(err) => {
                warn!(target: "rickhouse.image", provider = provider.name(), error = %err, "edit call failed");
                return Attempt::Failed;
            }
        };

        let Some(input) = source_bytes else {
            return Attempt::Edited(image);
        };

        let output_bytes = match &image {
            EditedImage::Bytes(bytes) => Some(bytes.clone()),
            EditedImage::Url(url) => match fetch_bytes(&self.client, url).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(target: "rickhouse.image", provider = provider.name(), error = %err, "output fetch failed, accepting uncompared");
                    None
                }
            },
        };

        match output_bytes {
            Some(output) if is_probable_noop(input, &output) => Attempt::NoOp,
            Some(output) => Attempt::Edited(EditedImage::Bytes(output)),
            None => Attempt::Edited(image),
        }
    }

    async fn finish(&self, image: EditedImage, provider: &'static str) -> StudioOutcome {
        if !self.whitewash {
            return StudioOutcome::Edited {
                image,
                provider,
                whitened: false,
            };
        }

        let bytes = match &image {
            EditedImage::Bytes(bytes) => Some(bytes.clone()),
            EditedImage::Url(url) => match fetch_bytes(&self.client, url).await {
                Ok(bytes) => Some(bytes),
                Err(_) => None,
            },
        };

        if let Some(bytes) = bytes
            && let Some(whitened) = whiten_background(&bytes, self.whitewash_tolerance)
        {
            return StudioOutcome::Edited {
                image: EditedImage::Bytes(whitened),
                provider,
                whitened: true,
            };
        }

        StudioOutcome::Edited {
            image,
            provider,
            whitened: false,
        }
    }
}

enum Attempt {
    Edited(EditedImage),
    NoOp,
    Failed,
}

pub fn is_probable_noop(input: &[u8], output: &[u8]) -> bool {
    if input.is_empty() || output.is_empty() {
        return false;
    }
    if input == output {
        return true;
    }
    let delta = input.len().abs_diff(output.len()) as f64;
    if delta > input.len() as f64 * NOOP_LENGTH_DELTA {
        return false;
    }
    let window = NOOP_PREFIX_BYTES.min(input.len()).min(output.len());
    input[..window] == output[..window]
}

pub fn providers_from_config(cfg: &StudioConfig, client: &Client) -> Vec<Box<dyn EditProvider>> {
    let mut providers: Vec<Box<dyn EditProvider>> = Vec::new();
    if let Some(key) = &cfg.nanobanana_api_key {
        providers.push(Box::new(NanoBananaProvider {
            client: client.clone(),
            base_url: cfg.nanobanana_base_url.clone(),
            api_key: key.clone(),
        }));
    }
    if let Some(key) = &cfg.removebg_api_key {
        providers.push(Box::new(RemoveBgProvider {
            client: client.clone(),
            api_key: key.clone(),
        }));
    }
    providers
}

/// Generative studio-shot API. Returns a hosted URL for the edited image.
struct NanoBananaProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[async_trait]
impl EditProvider for NanoBananaProvider {
    fn name(&self) -> &'static str {
        "nanobanana"
    }

    async fn edit(&self, source_url: &str, instruction: &str) -> Result<EditedImage, EditError> {
        let body = serde_json::json!({
            "image": source_url,
            "style": "studio_product_white_background",
            "prompt": instruction,
            "negative_prompt": NEGATIVE_PROMPT,
            "remove_background": true,
            "white_background": true,
        });

        let response = self
            .client
            .post(format!("{}/generate", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| EditError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EditError::Http(format!("HTTP {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| EditError::NoImage(err.to_string()))?;

        payload
            .get("output_image_url")
            .or_else(|| payload.get("image_url"))
            .and_then(|v| v.as_str())
            .map(|url| EditedImage::Url(url.to_string()))
            .ok_or_else(|| EditError::NoImage("response carried no image url".into()))
    }
}

/// Background-removal API. Ignores the instruction and returns raw PNG bytes.
struct RemoveBgProvider {
    client: Client,
    api_key: String,
}

#[async_trait]
impl EditProvider for RemoveBgProvider {
    fn name(&self) -> &'static str {
        "removebg"
    }

    async fn edit(&self, source_url: &str, _instruction: &str) -> Result<EditedImage, EditError> {
        let form = [
            ("image_url", source_url),
            ("size", "auto"),
            ("bg_color", "white"),
        ];

        let response = self
            .client
            .post("https://api.remove.bg/v1.0/removebg")
            .header("X-Api-Key", &self.api_key)
            .form(&form)
            .send()
            .await
            .map_err(|err| EditError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EditError::Http(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| EditError::Http(err.to_string()))?;
        if bytes.is_empty() {
            return Err(EditError::NoImage("empty body".into()));
        }
        Ok(EditedImage::Bytes(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn normalizer(providers: Vec<Box<dyn EditProvider>>) -> StudioNormalizer {
        let cfg = StudioConfig {
            nanobanana_api_key: None,
            nanobanana_base_url: String::new(),
            removebg_api_key: None,
            call_timeout_secs: 5,
            whitewash: false,
            whitewash_tolerance: 24,
        };
        StudioNormalizer::new(Client::new(), providers, &cfg)
    }

    struct FailingProvider;

    #[async_trait]
    impl EditProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn edit(&self, _: &str, _: &str) -> Result<EditedImage, EditError> {
            Err(EditError::Http("HTTP 500".into()))
        }
    }

    struct EchoProvider {
        source: Vec<u8>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EditProvider for EchoProvider {
        fn name(&self) -> &'static str {
            "echo"
        }
        async fn edit(&self, _: &str, _: &str) -> Result<EditedImage, EditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EditedImage::Bytes(self.source.clone()))
        }
    }

    /// Echoes once, produces a real edit on the stricter retry.
    struct SecondTryProvider {
        source: Vec<u8>,
    }

    #[async_trait]
    impl EditProvider for SecondTryProvider {
        fn name(&self) -> &'static str {
            "second_try"
        }
        async fn edit(&self, _: &str, instruction: &str) -> Result<EditedImage, EditError> {
            if instruction == STRICTER_INSTRUCTION {
                Ok(EditedImage::Bytes(vec![9u8; 4096]))
            } else {
                Ok(EditedImage::Bytes(self.source.clone()))
            }
        }
    }

    fn source_bytes() -> Vec<u8> {
        vec![7u8; 2048]
    }

    #[test]
    fn noop_detection_flags_identical_and_near_identical_output() {
        let input = source_bytes();
        assert!(is_probable_noop(&input, &input));

        // within 1% length delta with a matching prefix
        let mut padded = source_bytes();
        padded.extend_from_slice(&[7u8; 16]);
        assert!(is_probable_noop(&input, &padded));

        // same length, different content
        let different = vec![8u8; 2048];
        assert!(!is_probable_noop(&input, &different));

        // large length delta means a real edit
        let bigger = vec![7u8; 4096];
        assert!(!is_probable_noop(&input, &bigger));
    }

    #[tokio::test]
    async fn all_failing_providers_fall_back_to_original() {
        let normalizer = normalizer(vec![Box::new(FailingProvider), Box::new(FailingProvider)]);
        let outcome = normalizer
            .run_chain("https://example.com/bottle.jpg", Some(&source_bytes()))
            .await;
        assert!(matches!(outcome, StudioOutcome::Original));
    }

    #[tokio::test]
    async fn echoed_output_is_retried_once_then_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let echo = Box::new(EchoProvider {
            source: source_bytes(),
            calls: calls.clone(),
        });
        let normalizer = normalizer(vec![echo]);

        let outcome = normalizer
            .run_chain("https://example.com/bottle.jpg", Some(&source_bytes()))
            .await;

        assert!(matches!(outcome, StudioOutcome::Original));
        // one standard attempt plus one stricter retry
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stricter_retry_can_rescue_a_provider() {
        let provider = Box::new(SecondTryProvider {
            source: source_bytes(),
        });
        let normalizer = normalizer(vec![provider]);

        let outcome = normalizer
            .run_chain("https://example.com/bottle.jpg", Some(&source_bytes()))
            .await;

        match outcome {
            StudioOutcome::Edited {
                provider, whitened, ..
            } => {
                assert_eq!(provider, "second_try");
                assert!(!whitened);
            }
            StudioOutcome::Original => panic!("expected an edited outcome"),
        }
    }

    #[tokio::test]
    async fn empty_provider_list_keeps_original() {
        let normalizer = normalizer(Vec::new());
        let outcome = normalizer.normalize("https://example.com/bottle.jpg").await;
        assert!(matches!(outcome, StudioOutcome::Original));
    }
}
