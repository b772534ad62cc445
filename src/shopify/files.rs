use crate::shopify::client::{ShopifyClient, ShopifyError};
use reqwest::multipart;
use serde_json::{Value, json};
use tracing::info;

const STAGED_UPLOADS_MUTATION: &str = r#"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      url
      resourceUrl
      parameters { name value }
    }
    userErrors { field message }
  }
}
"#;

const FILE_CREATE_MUTATION: &str = r#"
mutation fileCreate($files: [FileCreateInput!]!) {
  fileCreate(files: $files) {
    files {
      id
      preview { image { url } }
    }
    userErrors { field message }
  }
}
"#;

/// A file registered with the platform. The CDN `url` can lag behind
/// creation while the file is processed.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub id: String,
    pub url: Option<String>,
}

/// Uploads a PNG through the staged-upload flow: reserve a target, POST
/// the bytes to it, then register the resource as a platform file.
pub async fn upload_png(
    client: &ShopifyClient,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<FileHandle, ShopifyError> {
    let target = create_staged_target(client, filename, bytes.len()).await?;
    post_to_target(client, &target, filename, bytes).await?;
    let handle = register_file(client, &target.resource_url).await?;
    info!(
        target: "rickhouse.shopify",
        id = %handle.id,
        filename,
        "file uploaded"
    );
    Ok(handle)
}

#[derive(Debug, Clone)]
struct StagedTarget {
    url: String,
    resource_url: String,
    parameters: Vec<(String, String)>,
}

async fn create_staged_target(
    client: &ShopifyClient,
    filename: &str,
    size: usize,
) -> Result<StagedTarget, ShopifyError> {
    let variables = json!({
        "input": [{
            "filename": filename,
            "mimeType": "image/png",
            "fileSize": size.to_string(),
            "httpMethod": "POST",
            "resource": "FILE",
        }]
    });
    let payload = client.graphql(STAGED_UPLOADS_MUTATION, variables).await?;
    if let Some(message) = payload
        .pointer("/data/stagedUploadsCreate/userErrors/0/message")
        .and_then(Value::as_str)
    {
        return Err(ShopifyError::Graphql(message.to_string()));
    }
    let target = payload
        .pointer("/data/stagedUploadsCreate/stagedTargets/0")
        .ok_or(ShopifyError::MissingField("stagedTargets"))?;
    parse_target(target)
}

fn parse_target(target: &Value) -> Result<StagedTarget, ShopifyError> {
    let url = target
        .get("url")
        .and_then(Value::as_str)
        .ok_or(ShopifyError::MissingField("stagedTargets.url"))?
        .to_string();
    let resource_url = target
        .get("resourceUrl")
        .and_then(Value::as_str)
        .ok_or(ShopifyError::MissingField("stagedTargets.resourceUrl"))?
        .to_string();
    let parameters = target
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(|param| {
                    Some((
                        param.get("name").and_then(Value::as_str)?.to_string(),
                        param.get("value").and_then(Value::as_str)?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(StagedTarget {
        url,
        resource_url,
        parameters,
    })
}

/// The staged parameters must precede the file part in the form.
async fn post_to_target(
    client: &ShopifyClient,
    target: &StagedTarget,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<(), ShopifyError> {
    let mut form = multipart::Form::new();
    for (name, value) in &target.parameters {
        form = form.text(name.clone(), value.clone());
    }
    let part = multipart::Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str("image/png")
        .map_err(|err| ShopifyError::Request(err.to_string()))?;
    form = form.part("file", part);

    let response = client
        .http()
        .post(&target.url)
        .multipart(form)
        .send()
        .await
        .map_err(|err| ShopifyError::Request(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ShopifyError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

async fn register_file(
    client: &ShopifyClient,
    resource_url: &str,
) -> Result<FileHandle, ShopifyError> {
    let variables = json!({
        "files": [{
            "originalSource": resource_url,
            "contentType": "IMAGE",
        }]
    });
    let payload = client.graphql(FILE_CREATE_MUTATION, variables).await?;
    if let Some(message) = payload
        .pointer("/data/fileCreate/userErrors/0/message")
        .and_then(Value::as_str)
    {
        return Err(ShopifyError::Graphql(message.to_string()));
    }
    let file = payload
        .pointer("/data/fileCreate/files/0")
        .ok_or(ShopifyError::MissingField("fileCreate.files"))?;
    let id = file
        .get("id")
        .and_then(Value::as_str)
        .ok_or(ShopifyError::MissingField("fileCreate.files.id"))?
        .to_string();
    let url = file
        .pointer("/preview/image/url")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(FileHandle { id, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_target_parses_url_and_parameters() {
        let target = json!({
            "url": "https://upload.example.com/tmp",
            "resourceUrl": "https://cdn.example.com/files/card.png",
            "parameters": [
                { "name": "key", "value": "tmp/card.png" },
                { "name": "policy", "value": "abc123" }
            ]
        });
        let parsed = parse_target(&target).unwrap();
        assert_eq!(parsed.url, "https://upload.example.com/tmp");
        assert_eq!(parsed.resource_url, "https://cdn.example.com/files/card.png");
        assert_eq!(parsed.parameters.len(), 2);
        assert_eq!(parsed.parameters[0].0, "key");
    }

    #[test]
    fn staged_target_without_a_url_is_an_error() {
        let target = json!({ "resourceUrl": "https://cdn.example.com/files/card.png" });
        assert!(matches!(
            parse_target(&target),
            Err(ShopifyError::MissingField("stagedTargets.url"))
        ));
    }
}
