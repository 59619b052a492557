//! Elasticsearch `_bulk` client
//!
//! Actions are plain JSON objects: the document fields plus `_op_type`,
//! `_index` and an optional `_id`. The client turns them into the NDJSON
//! body of a single `_bulk` request and reports which items failed.

use async_trait::async_trait;
use base64::Engine;
use esf_config::ElasticsearchArgs;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{Result, ShipperError};

/// Metadata keys of an action that are not part of the document
const ACTION_META_KEYS: [&str; 3] = ["_op_type", "_index", "_id"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// An item of a bulk request that Elasticsearch did not accept
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    /// Position of the action in the request
    pub position: usize,
    pub status: u16,
    pub error: Value,
}

#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Send `actions` in one request. An `Err` means the request as a whole
    /// failed; per-item rejections are returned as failures.
    async fn bulk(&self, actions: &[Value]) -> Result<Vec<BulkItemFailure>>;
}

#[derive(Debug, Clone)]
enum Auth {
    Basic { username: String, password: String },
    ApiKey(String),
}

pub struct HttpBulkClient {
    client: reqwest::Client,
    bulk_url: String,
    auth: Auth,
}

impl HttpBulkClient {
    pub fn from_args(args: &ElasticsearchArgs) -> Result<Self> {
        let base_url = match (&args.elasticsearch_url, &args.cloud_id) {
            (Some(url), _) => url.clone(),
            (None, Some(cloud_id)) => cloud_id_to_url(cloud_id)?,
            (None, None) => {
                return Err(ShipperError::InvalidOutput(
                    "one of elasticsearch_url or cloud_id must be set".to_string(),
                ))
            }
        };

        // an empty api_key counts as unset, as in ElasticsearchArgs::validate
        let api_key = args.api_key.as_deref().filter(|key| !key.is_empty());
        let auth = match (api_key, &args.username) {
            (Some(api_key), _) => Auth::ApiKey(api_key.to_string()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: args.password.clone().unwrap_or_default(),
            },
            (None, None) => {
                return Err(ShipperError::InvalidOutput(
                    "either api_key or username and password must be set".to_string(),
                ))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ShipperError::Client)?;

        Ok(Self {
            client,
            bulk_url: format!("{}/_bulk", base_url.trim_end_matches('/')),
            auth,
        })
    }

    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }
}

#[async_trait]
impl BulkClient for HttpBulkClient {
    async fn bulk(&self, actions: &[Value]) -> Result<Vec<BulkItemFailure>> {
        let body = encode_ndjson(actions)?;

        let request = self
            .client
            .post(&self.bulk_url)
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        let request = match &self.auth {
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::ApiKey(api_key) => request.header("Authorization", format!("ApiKey {api_key}")),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShipperError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: Value = response.json().await?;
        Ok(parse_failures(&response))
    }
}

/// `name:base64(host[:port]$es_uuid$kibana_uuid)` -> `https://es_uuid.host[:port]`
pub fn cloud_id_to_url(cloud_id: &str) -> Result<String> {
    let invalid = || ShipperError::InvalidCloudId(cloud_id.to_string());

    let (_, encoded) = cloud_id.rsplit_once(':').ok_or_else(invalid)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

    let mut parts = decoded.split('$');
    let host = parts.next().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let es_uuid = parts.next().filter(|u| !u.is_empty()).ok_or_else(invalid)?;

    Ok(match host.split_once(':') {
        Some((host, port)) if port != "443" => format!("https://{es_uuid}.{host}:{port}"),
        Some((host, _)) => format!("https://{es_uuid}.{host}"),
        None => format!("https://{es_uuid}.{host}"),
    })
}

fn encode_ndjson(actions: &[Value]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for action in actions {
        let fields = action.as_object().ok_or(ShipperError::InvalidEvent)?;

        let op_type = fields
            .get("_op_type")
            .and_then(Value::as_str)
            .unwrap_or("create");
        let mut meta = Map::new();
        for key in ["_index", "_id"] {
            if let Some(value) = fields.get(key) {
                meta.insert(key.to_string(), value.clone());
            }
        }

        let source: Map<String, Value> = fields
            .iter()
            .filter(|(key, _)| !ACTION_META_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut header = Map::new();
        header.insert(op_type.to_string(), Value::Object(meta));

        serde_json::to_writer(&mut body, &header)?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, &source)?;
        body.push(b'\n');
    }
    Ok(body)
}

/// Items rejected by Elasticsearch. Version conflicts mean the document is
/// already indexed and are not failures.
fn parse_failures(response: &Value) -> Vec<BulkItemFailure> {
    if response.get("errors").and_then(Value::as_bool) == Some(false) {
        return Vec::new();
    }

    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(position, item)| {
                    let result = item.as_object()?.values().next()?;
                    let status = result.get("status").and_then(Value::as_u64)? as u16;
                    if status < 300 || status == 409 {
                        return None;
                    }
                    Some(BulkItemFailure {
                        position,
                        status,
                        error: result.get("error").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_cloud_id() {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode("eu-central-1.aws.cloud.es.io$es-uuid$kibana-uuid");
        assert_eq!(
            cloud_id_to_url(&format!("deployment:{encoded}")).unwrap(),
            "https://es-uuid.eu-central-1.aws.cloud.es.io"
        );

        let with_port = base64::engine::general_purpose::STANDARD
            .encode("us-central1.gcp.cloud.es.io:9243$es-uuid$kibana-uuid");
        assert_eq!(
            cloud_id_to_url(&format!("deployment:{with_port}")).unwrap(),
            "https://es-uuid.us-central1.gcp.cloud.es.io:9243"
        );
    }

    #[test]
    fn rejects_invalid_cloud_ids() {
        assert!(cloud_id_to_url("no-separator").is_err());
        assert!(cloud_id_to_url("deployment:!!not-base64!!").is_err());
        let no_uuid = base64::engine::general_purpose::STANDARD.encode("host.es.io");
        assert!(cloud_id_to_url(&format!("deployment:{no_uuid}")).is_err());
    }

    #[test]
    fn encodes_actions_as_ndjson() {
        let actions = vec![json!({
            "_op_type": "create",
            "_index": "logs-generic-default",
            "_id": "abc-000000000000",
            "fields": {"message": "hello"},
        })];

        let body = String::from_utf8(encode_ndjson(&actions).unwrap()).unwrap();
        let lines: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert!(body.ends_with('\n'));
        assert_eq!(
            lines[0],
            json!({"create": {"_index": "logs-generic-default", "_id": "abc-000000000000"}})
        );
        assert_eq!(lines[1], json!({"fields": {"message": "hello"}}));
    }

    #[test]
    fn conflicts_are_not_failures() {
        let response = json!({
            "errors": true,
            "items": [
                {"create": {"status": 201}},
                {"create": {"status": 409, "error": {"type": "version_conflict_engine_exception"}}},
                {"create": {"status": 400, "error": {"type": "mapper_parsing_exception"}}},
            ]
        });

        let failures = parse_failures(&response);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].position, 2);
        assert_eq!(failures[0].status, 400);
        assert_eq!(failures[0].error["type"], "mapper_parsing_exception");
    }

    #[test]
    fn no_errors_flag_short_circuits() {
        assert!(parse_failures(&json!({"errors": false, "items": []})).is_empty());
    }
}
