use crate::shopify::client::{ShopifyClient, ShopifyError, gid_numeric_id, product_gid};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::info;

const SNAPSHOT_QUERY: &str = r#"
query productSnapshot($id: ID!) {
  product(id: $id) {
    id
    title
    handle
    descriptionHtml
    featuredImage { url }
    variants(first: 1) { edges { node { price } } }
    metafields(first: 30) { edges { node { namespace key value } } }
  }
}
"#;

#[derive(Debug, Clone)]
pub struct CreateProductRequest {
    pub title: String,
    pub description_html: String,
    pub vendor: String,
    pub product_type: String,
    pub price: f64,
    pub cost: f64,
    pub quantity: i64,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

impl CreateProductRequest {
    /// REST payload. Products are always created as drafts; publication is
    /// a separate step once metafields are in place.
    fn rest_payload(&self) -> Value {
        let mut variant = json!({
            "price": format!("{:.2}", self.price),
            "cost": format!("{:.2}", self.cost),
            "inventory_management": "shopify",
            "inventory_policy": "deny",
            "inventory_quantity": self.quantity,
            "weight": 3.5,
            "weight_unit": "lb",
            "requires_shipping": true,
        });
        if let Some(barcode) = &self.barcode
            && let Some(map) = variant.as_object_mut()
        {
            map.insert("barcode".to_string(), json!(barcode));
        }
        let images = match &self.image_url {
            Some(url) => json!([{ "src": url }]),
            None => json!([]),
        };
        json!({
            "product": {
                "title": self.title,
                "body_html": self.description_html,
                "vendor": self.vendor,
                "product_type": self.product_type,
                "status": "draft",
                "published_scope": "global",
                "tags": self.tags.join(", "),
                "variants": [variant],
                "images": images,
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreatedProduct {
    pub id: u64,
    pub title: String,
    pub handle: String,
    pub admin_url: String,
}

pub async fn create_product(
    client: &ShopifyClient,
    request: &CreateProductRequest,
) -> Result<CreatedProduct, ShopifyError> {
    let payload = client
        .rest_post("/products.json", &request.rest_payload())
        .await?;
    let product = payload
        .get("product")
        .ok_or(ShopifyError::MissingField("product"))?;
    let id = product
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(ShopifyError::MissingField("product.id"))?;
    let title = product
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(&request.title)
        .to_string();
    let handle = product
        .get("handle")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(target: "rickhouse.shopify", id, title = %title, "draft product created");
    Ok(CreatedProduct {
        id,
        title,
        handle,
        admin_url: client.config().admin_product_url(id),
    })
}

/// Product fields the tasting card renders, plus the stored metafields
/// keyed `namespace.key`.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: u64,
    pub title: String,
    pub handle: String,
    pub description_html: String,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub metafields: BTreeMap<String, String>,
}

impl ProductSnapshot {
    pub fn metafield(&self, key: &str) -> Option<&str> {
        self.metafields.get(key).map(String::as_str)
    }
}

pub async fn fetch_snapshot(
    client: &ShopifyClient,
    product_id: u64,
) -> Result<ProductSnapshot, ShopifyError> {
    let variables = json!({ "id": product_gid(product_id) });
    let payload = client.graphql(SNAPSHOT_QUERY, variables).await?;
    parse_snapshot(&payload)
}

fn parse_snapshot(payload: &Value) -> Result<ProductSnapshot, ShopifyError> {
    let product = payload
        .pointer("/data/product")
        .filter(|node| !node.is_null())
        .ok_or(ShopifyError::MissingField("product"))?;
    let id = product
        .get("id")
        .and_then(Value::as_str)
        .and_then(gid_numeric_id)
        .ok_or(ShopifyError::MissingField("product.id"))?;
    let title = product
        .get("title")
        .and_then(Value::as_str)
        .ok_or(ShopifyError::MissingField("product.title"))?
        .to_string();
    let handle = product
        .get("handle")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let description_html = product
        .get("descriptionHtml")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let image_url = product
        .pointer("/featuredImage/url")
        .and_then(Value::as_str)
        .map(str::to_string);
    let price = product
        .pointer("/variants/edges/0/node/price")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut metafields = BTreeMap::new();
    if let Some(edges) = product
        .pointer("/metafields/edges")
        .and_then(Value::as_array)
    {
        for edge in edges {
            let Some(node) = edge.get("node") else {
                continue;
            };
            if let (Some(namespace), Some(key), Some(value)) = (
                node.get("namespace").and_then(Value::as_str),
                node.get("key").and_then(Value::as_str),
                node.get("value").and_then(Value::as_str),
            ) {
                metafields.insert(format!("{namespace}.{key}"), value.to_string());
            }
        }
    }

    Ok(ProductSnapshot {
        id,
        title,
        handle,
        description_html,
        image_url,
        price,
        metafields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateProductRequest {
        CreateProductRequest {
            title: "Benchmark Test Bourbon".into(),
            description_html: "<p>Soft and sweet.</p>".into(),
            vendor: "The Whiskey Library".into(),
            product_type: "Bourbon".into(),
            price: 49.99,
            cost: 27.5,
            quantity: 6,
            barcode: Some("012345678905".into()),
            image_url: Some("https://cdn.example.com/bottle.png".into()),
            tags: vec!["Bourbon".into(), "USA".into()],
        }
    }

    #[test]
    fn rest_payload_creates_a_draft_with_one_variant() {
        let payload = sample_request().rest_payload();
        let product = payload.get("product").unwrap();
        assert_eq!(product["status"], "draft");
        assert_eq!(product["published_scope"], "global");
        assert_eq!(product["tags"], "Bourbon, USA");

        let variant = &product["variants"][0];
        assert_eq!(variant["price"], "49.99");
        assert_eq!(variant["cost"], "27.50");
        assert_eq!(variant["inventory_policy"], "deny");
        assert_eq!(variant["inventory_quantity"], 6);
        assert_eq!(variant["barcode"], "012345678905");
        assert_eq!(variant["weight_unit"], "lb");

        assert_eq!(product["images"][0]["src"], "https://cdn.example.com/bottle.png");
    }

    #[test]
    fn rest_payload_omits_barcode_and_images_when_absent() {
        let mut request = sample_request();
        request.barcode = None;
        request.image_url = None;
        let payload = request.rest_payload();
        let product = payload.get("product").unwrap();
        assert!(product["variants"][0].get("barcode").is_none());
        assert_eq!(product["images"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn snapshot_parses_metafields_into_a_keyed_map() {
        let payload = json!({
            "data": {
                "product": {
                    "id": "gid://shopify/Product/8675309",
                    "title": "Benchmark Test Bourbon",
                    "handle": "benchmark-test-bourbon",
                    "descriptionHtml": "<p>Soft and sweet.</p>",
                    "featuredImage": { "url": "https://cdn.example.com/bottle.png" },
                    "variants": { "edges": [ { "node": { "price": "49.99" } } ] },
                    "metafields": { "edges": [
                        { "node": { "namespace": "custom", "key": "nose", "value": "[\"caramel\",\"oak\"]" } },
                        { "node": { "namespace": "custom", "key": "location_", "value": "USA" } }
                    ] }
                }
            }
        });
        let snapshot = parse_snapshot(&payload).unwrap();
        assert_eq!(snapshot.id, 8_675_309);
        assert_eq!(snapshot.handle, "benchmark-test-bourbon");
        assert_eq!(snapshot.price.as_deref(), Some("49.99"));
        assert_eq!(snapshot.metafield("custom.location_"), Some("USA"));
        assert_eq!(
            snapshot.metafield("custom.nose"),
            Some("[\"caramel\",\"oak\"]")
        );
        assert_eq!(snapshot.metafield("custom.palate"), None);
    }

    #[test]
    fn snapshot_of_a_missing_product_is_an_error() {
        let payload = json!({ "data": { "product": null } });
        assert!(matches!(
            parse_snapshot(&payload),
            Err(ShopifyError::MissingField("product"))
        ));
    }
}
