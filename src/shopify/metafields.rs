use crate::listing::ListingDraft;
use crate::shopify::client::{ShopifyClient, ShopifyError, product_gid};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{info, warn};

const METAFIELDS_MUTATION: &str = r#"
mutation productUpdate($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id }
    userErrors { field message }
  }
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetafieldType {
    SingleLineText,
    ListSingleLineText,
    Boolean,
    FileReference,
}

impl MetafieldType {
    pub fn shopify_code(self) -> &'static str {
        match self {
            Self::SingleLineText => "single_line_text_field",
            Self::ListSingleLineText => "list.single_line_text_field",
            Self::Boolean => "boolean",
            Self::FileReference => "file_reference",
        }
    }

    /// Counterpart shape for a scalar/list mismatch. Booleans and file
    /// references have none.
    fn flipped(self) -> Option<MetafieldType> {
        match self {
            Self::SingleLineText => Some(Self::ListSingleLineText),
            Self::ListSingleLineText => Some(Self::SingleLineText),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetafieldEntry {
    pub namespace: &'static str,
    pub key: String,
    pub value: String,
    pub value_type: MetafieldType,
}

impl MetafieldEntry {
    pub fn text(key: &str, value: &str) -> Self {
        Self {
            namespace: "custom",
            key: key.to_string(),
            value: value.to_string(),
            value_type: MetafieldType::SingleLineText,
        }
    }

    /// List values are persisted as a JSON-encoded array string, which is
    /// what the platform stores for `list.single_line_text_field`.
    pub fn list(key: &str, values: &[String]) -> Self {
        Self {
            namespace: "custom",
            key: key.to_string(),
            value: serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string()),
            value_type: MetafieldType::ListSingleLineText,
        }
    }

    pub fn boolean(key: &str, value: bool) -> Self {
        Self {
            namespace: "custom",
            key: key.to_string(),
            value: if value { "true" } else { "false" }.to_string(),
            value_type: MetafieldType::Boolean,
        }
    }

    pub fn file_reference(key: &str, file_gid: &str) -> Self {
        Self {
            namespace: "custom",
            key: key.to_string(),
            value: file_gid.to_string(),
            value_type: MetafieldType::FileReference,
        }
    }

    pub fn graphql_input(&self) -> Value {
        json!({
            "namespace": self.namespace,
            "key": self.key,
            "value": self.value,
            "type": self.value_type.shopify_code(),
        })
    }

    /// Rebuilds the entry in the opposite scalar/list shape: a list keeps
    /// its first element, a scalar becomes a singleton list. Entries with
    /// no counterpart shape return `None`.
    pub fn coerce_shape(&self) -> Option<MetafieldEntry> {
        let flipped = self.value_type.flipped()?;
        let value = match self.value_type {
            MetafieldType::ListSingleLineText => {
                let items: Vec<String> = serde_json::from_str(&self.value).ok()?;
                items.into_iter().next()?
            }
            MetafieldType::SingleLineText => json!([self.value]).to_string(),
            _ => return None,
        };
        Some(MetafieldEntry {
            namespace: self.namespace,
            key: self.key.clone(),
            value,
            value_type: flipped,
        })
    }
}

/// Builds the metafield batch for a validated listing. Key names mirror the
/// shop's definitions; `location_` keeps its trailing underscore.
pub fn listing_metafields(draft: &ListingDraft) -> Vec<MetafieldEntry> {
    let mut entries = vec![
        MetafieldEntry::text("location_", &draft.country),
        MetafieldEntry::text("state", &draft.region),
        MetafieldEntry::text("age_statement", &draft.age_statement),
        MetafieldEntry::text("sub_type", &draft.sub_type),
        MetafieldEntry::text("finish_type", &draft.finish_type),
        MetafieldEntry::list("nose", &draft.nose),
        MetafieldEntry::list("palate", &draft.palate),
        MetafieldEntry::list("finish", &draft.finish),
        MetafieldEntry::list("cask_wood", &draft.cask_wood),
        MetafieldEntry::boolean("finished", draft.finished),
        MetafieldEntry::boolean("store_pick", draft.store_pick),
        MetafieldEntry::boolean("cask_strength", draft.cask_strength),
        MetafieldEntry::boolean("single_barrel", draft.single_barrel),
        MetafieldEntry::boolean("limited_release", draft.limited_release),
        MetafieldEntry::boolean("gift_pack", draft.gift_pack),
    ];
    if !draft.abv.is_unknown() {
        entries.push(MetafieldEntry::text(
            "alcohol_by_volume",
            draft.abv.as_display(),
        ));
    }
    entries
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserError {
    /// Field path as returned by the platform, e.g.
    /// `["input", "metafields", "3", "type"]`.
    pub field: Vec<String>,
    pub message: String,
}

/// Next write round after a failed batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPlan {
    /// Retry the whole batch with the implicated entries reshaped.
    CoercedBulk(Vec<MetafieldEntry>),
    /// Write each entry on its own so one bad field cannot block the rest.
    PerField(Vec<MetafieldEntry>),
}

/// Decides the retry round for a failed bulk write. Pure: the input batch
/// is never mutated. Entries named by the platform errors get their
/// scalar/list shape flipped; when no entry can be identified there is
/// nothing to coerce and the plan skips straight to individual writes.
pub fn plan_retry(entries: &[MetafieldEntry], errors: &[UserError]) -> RetryPlan {
    let implicated = implicated_indices(entries, errors);
    let coercible = implicated
        .iter()
        .any(|&idx| entries[idx].coerce_shape().is_some());
    if !coercible {
        return RetryPlan::PerField(entries.to_vec());
    }
    let coerced = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            if implicated.contains(&idx)
                && let Some(flipped) = entry.coerce_shape()
            {
                flipped
            } else {
                entry.clone()
            }
        })
        .collect();
    RetryPlan::CoercedBulk(coerced)
}

/// Indices of entries named by the platform errors, either through a
/// numeric `metafields.N` path segment or a key name in the message.
fn implicated_indices(entries: &[MetafieldEntry], errors: &[UserError]) -> BTreeSet<usize> {
    let mut indices = BTreeSet::new();
    for error in errors {
        if let Some(idx) = index_from_path(&error.field)
            && idx < entries.len()
        {
            indices.insert(idx);
            continue;
        }
        for (idx, entry) in entries.iter().enumerate() {
            if error.message.contains(&entry.key) {
                indices.insert(idx);
            }
        }
    }
    indices
}

fn index_from_path(path: &[String]) -> Option<usize> {
    let mut segments = path.iter();
    segments.find(|segment| segment.as_str() == "metafields")?;
    segments.next()?.parse().ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedField {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetafieldWriteReport {
    pub written: Vec<String>,
    pub failed: Vec<FailedField>,
    pub rounds: u8,
}

impl MetafieldWriteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes the batch with progressive narrowing: one bulk call, then a
/// coerced bulk retry on a shape mismatch, then per-field writes. Only a
/// field that fails every round lands in `failed`; the run continues.
pub async fn write_metafields(
    client: &ShopifyClient,
    product_id: u64,
    entries: &[MetafieldEntry],
) -> Result<MetafieldWriteReport, ShopifyError> {
    let gid = product_gid(product_id);
    let gid = gid.as_str();
    drive_writes(entries, move |batch| async move {
        send_batch(client, gid, &batch).await
    })
    .await
}

/// The narrowing rounds, independent of the transport so the convergence
/// behavior can be exercised against a scripted sender.
async fn drive_writes<F, Fut>(
    entries: &[MetafieldEntry],
    send: F,
) -> Result<MetafieldWriteReport, ShopifyError>
where
    F: Fn(Vec<MetafieldEntry>) -> Fut,
    Fut: Future<Output = Result<Vec<UserError>, ShopifyError>>,
{
    if entries.is_empty() {
        return Ok(MetafieldWriteReport {
            written: Vec::new(),
            failed: Vec::new(),
            rounds: 0,
        });
    }

    let errors = send(entries.to_vec()).await?;
    if errors.is_empty() {
        info!(target: "rickhouse.shopify", count = entries.len(), "metafields written");
        return Ok(all_written(entries, 1));
    }
    warn!(
        target: "rickhouse.shopify",
        errors = errors.len(),
        first = %errors[0].message,
        "bulk metafield write rejected; narrowing"
    );

    let mut rounds = 1;
    let narrowed = match plan_retry(entries, &errors) {
        RetryPlan::CoercedBulk(coerced) => {
            rounds += 1;
            let retry_errors = send(coerced.clone()).await?;
            if retry_errors.is_empty() {
                info!(target: "rickhouse.shopify", "coerced bulk retry succeeded");
                return Ok(all_written(&coerced, rounds));
            }
            coerced
        }
        RetryPlan::PerField(list) => list,
    };

    rounds += 1;
    let mut written = Vec::new();
    let mut failed = Vec::new();
    for entry in &narrowed {
        match write_one(&send, entry).await {
            Ok(()) => written.push(entry.key.clone()),
            Err(message) => {
                warn!(
                    target: "rickhouse.shopify",
                    key = %entry.key,
                    message = %message,
                    "metafield rejected"
                );
                failed.push(FailedField {
                    key: entry.key.clone(),
                    message,
                });
            }
        }
    }
    info!(
        target: "rickhouse.shopify",
        written = written.len(),
        failed = failed.len(),
        "per-field metafield writes finished"
    );
    Ok(MetafieldWriteReport {
        written,
        failed,
        rounds,
    })
}

/// Writes a single entry, giving it one flipped-shape attempt when the
/// platform rejects its declared type.
async fn write_one<F, Fut>(send: &F, entry: &MetafieldEntry) -> Result<(), String>
where
    F: Fn(Vec<MetafieldEntry>) -> Fut,
    Fut: Future<Output = Result<Vec<UserError>, ShopifyError>>,
{
    let errors = send(vec![entry.clone()])
        .await
        .map_err(|err| err.to_string())?;
    let Some(first) = errors.first() else {
        return Ok(());
    };
    if let Some(flipped) = entry.coerce_shape() {
        let retry_errors = send(vec![flipped])
            .await
            .map_err(|err| err.to_string())?;
        if retry_errors.is_empty() {
            info!(target: "rickhouse.shopify", key = %entry.key, "metafield written after shape flip");
            return Ok(());
        }
    }
    Err(first.message.clone())
}

async fn send_batch(
    client: &ShopifyClient,
    gid: &str,
    entries: &[MetafieldEntry],
) -> Result<Vec<UserError>, ShopifyError> {
    let inputs: Vec<Value> = entries.iter().map(MetafieldEntry::graphql_input).collect();
    let variables = json!({ "input": { "id": gid, "metafields": inputs } });
    let payload = client.graphql(METAFIELDS_MUTATION, variables).await?;
    Ok(parse_user_errors(&payload))
}

fn parse_user_errors(payload: &Value) -> Vec<UserError> {
    let Some(errors) = payload
        .pointer("/data/productUpdate/userErrors")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    errors
        .iter()
        .map(|error| UserError {
            field: error
                .get("field")
                .and_then(Value::as_array)
                .map(|path| {
                    path.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        })
        .collect()
}

fn all_written(entries: &[MetafieldEntry], rounds: u8) -> MetafieldWriteReport {
    MetafieldWriteReport {
        written: entries.iter().map(|entry| entry.key.clone()).collect(),
        failed: Vec::new(),
        rounds,
    }
}
