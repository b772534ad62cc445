use crate::shopify::client::{ShopifyClient, ShopifyError, product_gid};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

const PUBLICATIONS_QUERY: &str = r#"
query { publications(first: 20) { edges { node { id name } } } }
"#;

const PUBLISH_MUTATION: &str = r#"
mutation publishablePublish($id: ID!, $input: [PublicationInput!]!) {
  publishablePublish(id: $id, input: $input) {
    publishable { ... on Product { id } }
    userErrors { field message }
  }
}
"#;

#[derive(Debug, Clone, PartialEq)]
struct Publication {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub published: Vec<String>,
    pub failed: Vec<ChannelFailure>,
    pub warnings: Vec<String>,
}

impl PublishReport {
    pub fn summary(&self) -> String {
        let total = self.published.len() + self.failed.len();
        format!("published to {}/{} channels", self.published.len(), total)
    }
}

/// Publishes the product to every sales channel the token can see. Channel
/// failures never abort the run; they come back in the report. An empty
/// publication list almost always means the token lacks the
/// `read_publications` scope, which is reported as a warning.
pub async fn publish_to_all_channels(client: &ShopifyClient, product_id: u64) -> PublishReport {
    let mut report = PublishReport::default();

    let channels = match list_publications(client).await {
        Ok(channels) => channels,
        Err(err) => {
            warn!(target: "rickhouse.shopify", error = %err, "publications query failed");
            report.warnings.push(format!(
                "publications query failed: {err}; check the admin token has the read_publications scope"
            ));
            return report;
        }
    };
    if channels.is_empty() {
        warn!(target: "rickhouse.shopify", "no publications visible to the admin token");
        report.warnings.push(
            "no sales channels visible; add the read_publications and write_publications \
             scopes to the admin token"
                .to_string(),
        );
        return report;
    }

    let gid = product_gid(product_id);
    for channel in &channels {
        match publish_one(client, &gid, &channel.id).await {
            Ok(()) => {
                info!(target: "rickhouse.shopify", channel = %channel.name, "published");
                report.published.push(channel.name.clone());
            }
            Err(message) => {
                warn!(
                    target: "rickhouse.shopify",
                    channel = %channel.name,
                    message = %message,
                    "publish failed"
                );
                report.failed.push(ChannelFailure {
                    channel: channel.name.clone(),
                    message,
                });
            }
        }
    }
    info!(target: "rickhouse.shopify", "{}", report.summary());
    report
}

async fn list_publications(client: &ShopifyClient) -> Result<Vec<Publication>, ShopifyError> {
    let payload = client.graphql(PUBLICATIONS_QUERY, json!({})).await?;
    Ok(parse_publications(&payload))
}

fn parse_publications(payload: &Value) -> Vec<Publication> {
    let Some(edges) = payload
        .pointer("/data/publications/edges")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    edges
        .iter()
        .filter_map(|edge| {
            let node = edge.get("node")?;
            Some(Publication {
                id: node.get("id").and_then(Value::as_str)?.to_string(),
                name: node
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unnamed channel")
                    .to_string(),
            })
        })
        .collect()
}

async fn publish_one(
    client: &ShopifyClient,
    gid: &str,
    publication_id: &str,
) -> Result<(), String> {
    let variables = json!({ "id": gid, "input": [{ "publicationId": publication_id }] });
    let payload = client
        .graphql(PUBLISH_MUTATION, variables)
        .await
        .map_err(|err| err.to_string())?;
    if let Some(message) = first_user_error(&payload) {
        return Err(message);
    }
    Ok(())
}

fn first_user_error(payload: &Value) -> Option<String> {
    payload
        .pointer("/data/publishablePublish/userErrors/0/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
