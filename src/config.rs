use std::env;

/// Immutable service configuration, read from the environment once at startup
/// and passed by reference into every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub shopify: ShopifyConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub studio: StudioConfig,
    pub card: CardConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// e.g. "the-whiskey-library.myshopify.com"
    pub store_domain: String,
    pub admin_token: String,
    pub api_version: String,
    pub default_vendor: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    /// Raw engine id; tolerates a pasted control-panel URL (`cx=` extracted
    /// at use).
    pub cx: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub nanobanana_api_key: Option<String>,
    pub nanobanana_base_url: String,
    pub removebg_api_key: Option<String>,
    pub call_timeout_secs: u64,
    pub whitewash: bool,
    pub whitewash_tolerance: u8,
}

#[derive(Debug, Clone)]
pub struct CardConfig {
    pub chrome_binary: String,
    pub render_timeout_secs: u64,
    pub storefront_base: String,
    pub description_budget: usize,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// "webhook" | "console" | "off"; empty picks webhook when a URL is set.
    pub mode: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            shopify: ShopifyConfig {
                store_domain: env_string("SHOPIFY_STORE_DOMAIN", ""),
                admin_token: env_string("SHOPIFY_ADMIN_TOKEN", ""),
                api_version: env_string("SHOPIFY_API_VERSION", "2024-10"),
                default_vendor: env_string("DEFAULT_VENDOR", "The Whiskey Library"),
            },
            llm: LlmConfig {
                api_key: env_opt("OPENAI_API_KEY"),
                base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: env_string("OPENAI_MODEL", "gpt-4o"),
                temperature: env_parse("LLM_TEMPERATURE", 0.4),
            },
            search: SearchConfig {
                api_key: env_opt("GOOGLE_API_KEY"),
                cx: env_opt("GOOGLE_CSE_CX"),
            },
            studio: StudioConfig {
                nanobanana_api_key: env_opt("NANOBANANA_API_KEY"),
                nanobanana_base_url: env_string("NANOBANANA_BASE_URL", "https://api.nanobanana.ai"),
                removebg_api_key: env_opt("REMOVEBG_API_KEY"),
                call_timeout_secs: env_parse("STUDIO_TIMEOUT_SECS", 30),
                whitewash: env_parse("STUDIO_WHITEWASH", true),
                whitewash_tolerance: env_parse("STUDIO_WHITEWASH_TOLERANCE", 24),
            },
            card: CardConfig {
                chrome_binary: env_string("CHROME_BIN", "chromium"),
                render_timeout_secs: env_parse("CARD_RENDER_TIMEOUT_SECS", 40),
                storefront_base: env_string(
                    "STOREFRONT_BASE_URL",
                    "https://www.whiskeylibrary.com",
                ),
                description_budget: env_parse("CARD_DESCRIPTION_CHARS", 420),
            },
            notify: NotifyConfig {
                webhook_url: env_opt("NOTIFY_WEBHOOK_URL"),
                mode: env_string("NOTIFY_MODE", ""),
            },
        }
    }
}

impl ShopifyConfig {
    pub fn is_configured(&self) -> bool {
        !self.store_domain.is_empty() && !self.admin_token.is_empty()
    }

    pub fn rest_base(&self) -> String {
        format!("https://{}/admin/api/{}", self.store_domain, self.api_version)
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql.json", self.rest_base())
    }

    pub fn admin_product_url(&self, product_id: u64) -> String {
        let store = self
            .store_domain
            .strip_suffix(".myshopify.com")
            .unwrap_or(&self.store_domain);
        format!("https://admin.shopify.com/store/{store}/products/{product_id}")
    }
}

fn env_string(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_strips_myshopify_suffix() {
        let cfg = ShopifyConfig {
            store_domain: "rickhouse.myshopify.com".into(),
            admin_token: "tok".into(),
            api_version: "2024-10".into(),
            default_vendor: "The Whiskey Library".into(),
        };
        assert_eq!(
            cfg.admin_product_url(8_675_309),
            "https://admin.shopify.com/store/rickhouse/products/8675309"
        );
        assert!(cfg.rest_base().ends_with("/admin/api/2024-10"));
    }

    #[test]
    fn unset_keys_fall_back() {
        assert_eq!(env_string("RICKHOUSE_TEST_UNSET_KEY", "fallback"), "fallback");
        assert_eq!(env_opt("RICKHOUSE_TEST_UNSET_KEY"), None);
        assert_eq!(env_parse("RICKHOUSE_TEST_UNSET_KEY", 42u64), 42);
    }
}
