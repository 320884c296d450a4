//! API call tool - Make an HTTP request to an external endpoint

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_CHARS: usize = 5000;
const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

pub struct MakeApiCallTool {
    http: reqwest::Client,
}

impl Default for MakeApiCallTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MakeApiCallTool {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Deserialize)]
struct Params {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

fn truncate_body(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_BODY_CHARS).collect();
    out.push_str("\n\n[Response truncated...]");
    out
}

#[async_trait]
impl Tool for MakeApiCallTool {
    fn name(&self) -> &str {
        "make_api_call"
    }

    fn description(&self) -> &str {
        "Make an HTTP API call to an external REST endpoint and return the status and body."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The full API endpoint URL"},
                "method": {
                    "type": "string",
                    "enum": METHODS,
                    "description": "HTTP method (default GET)"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "description": "Request headers"
                },
                "body": {"description": "JSON request body for POST/PUT/PATCH"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let method_name = params.method.to_uppercase();
        if !METHODS.contains(&method_name.as_str()) {
            return ToolResult::error(format!(
                "Invalid method '{}'. Use GET, POST, PUT, PATCH, or DELETE.",
                method_name
            ));
        }
        let method = match reqwest::Method::from_bytes(method_name.as_bytes()) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(e),
        };

        let mut request = self.http.request(method, &params.url);
        for (name, value) in &params.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &params.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("API call failed: {}", e)),
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => ToolResult::success(format!(
                "Status: {}\n\nBody:\n{}",
                status,
                truncate_body(&text)
            )),
            Err(e) => ToolResult::failure(format!("API call failed: {}", e)),
        }
    }
}
