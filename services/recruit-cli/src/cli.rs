//! Command-line arguments

use clap::Parser;
use reqwest::Method;
use session_client::ApiRequest;

#[derive(Debug, Parser)]
#[command(name = "recruit-cli")]
#[command(about = "Send one request to the recruit platform API")]
#[command(version)]
pub struct Cli {
    /// Config file; falls back to CONFIG_PATH, then ./recruit-client.toml
    #[arg(long)]
    pub config: Option<String>,

    /// Page the client pretends to be on; drives redirect suppression
    #[arg(long, default_value = "/")]
    pub page: String,

    /// Log in with this email before sending the request
    #[arg(long, value_name = "EMAIL")]
    pub login: Option<String>,

    /// Password for --login
    #[arg(long, env = "RECRUIT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Dump Prometheus counters to stderr on exit
    #[arg(long)]
    pub metrics: bool,

    /// HTTP method, case-insensitive
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Path relative to the API base URL, e.g. /jobs
    pub path: String,

    /// JSON request body
    #[arg(value_name = "JSON_BODY", value_parser = parse_body)]
    pub body: Option<serde_json::Value>,
}

impl Cli {
    pub fn request(&self) -> ApiRequest {
        let request = ApiRequest::new(self.method.clone(), self.path.clone());
        match &self.body {
            Some(body) => request.json(body.clone()),
            None => request,
        }
    }
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid HTTP method {raw}: {e}"))
}

fn parse_body(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}
