//! Outbound HTTP for workspace-defined integrations.
//!
//! An integration is a request template plus a list of named JSON paths.
//! Secrets and ticket variables are substituted into the URL, headers and
//! body; the response is projected through the paths into placeholders.

use async_trait::async_trait;
use log::{debug, warn};
use regex::Captures;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::shared::error::InfraError;
use crate::shared::models::WorkspaceId;

use super::{NOT_AVAILABLE, PLACEHOLDER};

/// Headers a workspace may not set: hop-by-hop, forwarding and identity
/// headers the proxy or the platform owns.
const BLOCKED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "forwarded",
    "via",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "proxy-authorization",
    "proxy-connection",
    "cookie",
];

const MAX_RESPONSE_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrationPlaceholder {
    pub name: String,
    /// Dot path into the JSON response, e.g. `data.stats.0.value`.
    pub json_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrationDefinition {
    pub id: i32,
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub secrets: HashMap<String, String>,
    pub placeholders: Vec<IntegrationPlaceholder>,
}

impl IntegrationDefinition {
    pub fn provides_any(&self, keys: &[String]) -> bool {
        self.placeholders.iter().any(|p| keys.contains(&p.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Integration returned status {0}")]
    Status(u16),
    #[error("Response is not valid JSON: {0}")]
    Decode(String),
    #[error("Response exceeds {0} bytes")]
    TooLarge(usize),
}

/// Integrations enabled for a workspace.
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    async fn integrations(&self, workspace_id: WorkspaceId) -> Result<Vec<IntegrationDefinition>, InfraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw,
    Url,
    Json,
}

/// Replaces each `%name%` in one pass, looking secrets up before ticket
/// variables. Substituted values are never scanned again, so a secret that
/// happens to contain `%user_id%` stays literal.
fn render(template: &str, secrets: &HashMap<String, String>, vars: &HashMap<String, String>, encoding: Encoding) -> String {
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match secrets.get(name).or_else(|| vars.get(name)) {
                Some(value) => encode(value, encoding),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn encode(value: &str, encoding: Encoding) -> String {
    match encoding {
        Encoding::Raw => value.to_string(),
        Encoding::Url => urlencoding::encode(value).into_owned(),
        Encoding::Json => {
            let quoted = Value::String(value.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
    }
}

pub fn strip_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.trim().to_ascii_lowercase();
            let blocked = BLOCKED_HEADERS.contains(&lower.as_str());
            if blocked {
                debug!("Dropping blocked integration header {name}");
            }
            !blocked
        })
        .cloned()
        .collect()
}

/// Follows `path` through objects and arrays. `None` when any segment is
/// missing or the leaf is null.
pub fn extract_path(value: &Value, path: &str) -> Option<String> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(current.to_string()),
        Value::Array(_) | Value::Object(_) => Some(current.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationClient {
    http: reqwest::Client,
}

impl IntegrationClient {
    pub fn new(timeout: Duration) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("ticketcore-integrations/1.0")
            .build()
            .map_err(|e| IntegrationError::Request(e.to_string()))?;
        Ok(Self { http })
    }

    /// Executes the integration and returns one value per declared
    /// placeholder, "N/A" where the path does not resolve.
    pub async fn fetch(
        &self,
        definition: &IntegrationDefinition,
        vars: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, IntegrationError> {
        let url = render(&definition.url, &definition.secrets, vars, Encoding::Url);
        let method = match definition.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.http.request(method, &url);
        for (name, value) in strip_headers(&definition.headers) {
            request = request.header(name, render(&value, &definition.secrets, vars, Encoding::Raw));
        }
        if let Some(body) = &definition.body {
            request = request
                .header("Content-Type", "application/json")
                .body(render(body, &definition.secrets, vars, Encoding::Json));
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| IntegrationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Integration {} returned {}", definition.id, status);
            return Err(IntegrationError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
        {
            return Err(IntegrationError::TooLarge(MAX_RESPONSE_BYTES));
        }

        // Content-Length may be absent or wrong; count what actually arrives.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| IntegrationError::Request(e.to_string()))?
        {
            if bytes.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(IntegrationError::TooLarge(MAX_RESPONSE_BYTES));
            }
            bytes.extend_from_slice(&chunk);
        }

        let json: Value =
            serde_json::from_slice(&bytes).map_err(|e| IntegrationError::Decode(e.to_string()))?;

        Ok(definition
            .placeholders
            .iter()
            .map(|p| {
                let value = extract_path(&json, &p.json_path).unwrap_or_else(|| NOT_AVAILABLE.to_string());
                (p.name.clone(), value)
            })
            .collect())
    }
}
