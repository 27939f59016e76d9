//! Redis-compatible REST endpoint (Upstash style).
//!
//! Each command is POSTed as a JSON array such as `["SET","k","v","EX","60"]`
//! and answered with `{"result": ...}` or `{"error": "..."}`.

use async_trait::async_trait;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;

use super::{Substrate, SubstrateError};

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct RestSubstrate {
    client: Client,
    endpoint: Url,
    auth: String,
}

impl RestSubstrate {
    pub fn new(endpoint: Url, token: &str) -> Result<Self, SubstrateError> {
        let client = Client::builder()
            .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SubstrateError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            auth: format!("Bearer {token}"),
        })
    }

    async fn command(&self, args: Vec<String>) -> Result<Value, SubstrateError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, &self.auth)
            .json(&args)
            .send()
            .await
            .map_err(|err| SubstrateError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SubstrateError::Transport(err.to_string()))?;
        parse_reply(status.is_success(), &body)
    }
}

fn parse_reply(success: bool, body: &str) -> Result<Value, SubstrateError> {
    let reply: Reply = serde_json::from_str(body)
        .map_err(|err| SubstrateError::Protocol(format!("unreadable reply: {err}")))?;
    if let Some(message) = reply.error {
        return Err(SubstrateError::Protocol(message));
    }
    if !success {
        return Err(SubstrateError::Protocol(format!(
            "endpoint rejected command: {body}"
        )));
    }
    Ok(reply.result)
}

fn as_opt_string(value: Value) -> Result<Option<String>, SubstrateError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        other => Err(unexpected("string", &other)),
    }
}

fn as_u64(value: &Value) -> Result<u64, SubstrateError> {
    match value {
        Value::Number(number) => number.as_u64().ok_or_else(|| unexpected("integer", value)),
        Value::String(text) => text.parse().map_err(|_| unexpected("integer", value)),
        other => Err(unexpected("integer", other)),
    }
}

fn as_strings(value: Value) -> Result<Vec<String>, SubstrateError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| as_opt_string(item)?.ok_or(SubstrateError::Protocol("null key".into())))
            .collect(),
        other => Err(unexpected("array", &other)),
    }
}

fn unexpected(expected: &str, got: &Value) -> SubstrateError {
    SubstrateError::Protocol(format!("expected {expected} reply, got {got}"))
}

fn cmd(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

#[async_trait]
impl Substrate for RestSubstrate {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        as_opt_string(self.command(cmd(&["GET", key])).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        self.command(cmd(&["SET", key, value])).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SubstrateError> {
        let ttl = ttl_secs.max(1).to_string();
        self.command(cmd(&["SET", key, value, "EX", &ttl])).await?;
        Ok(())
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, SubstrateError> {
        let ttl = ttl_secs.max(1).to_string();
        let reply = self
            .command(cmd(&["SET", key, value, "NX", "EX", &ttl]))
            .await?;
        Ok(!reply.is_null())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, SubstrateError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("DEL".to_string());
        args.extend(keys.iter().cloned());
        as_u64(&self.command(args).await?)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), SubstrateError> {
        let (cursor, count) = (cursor.to_string(), count.to_string());
        let reply = self
            .command(cmd(&["SCAN", &cursor, "MATCH", pattern, "COUNT", &count]))
            .await?;
        parse_scan(reply)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SubstrateError> {
        as_strings(self.command(cmd(&["KEYS", pattern])).await?)
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        match as_opt_string(self.command(cmd(&["PING"])).await?)? {
            Some(pong) if pong.eq_ignore_ascii_case("PONG") => Ok(()),
            other => Err(SubstrateError::Protocol(format!(
                "unexpected PING reply {other:?}"
            ))),
        }
    }
}

fn parse_scan(reply: Value) -> Result<(u64, Vec<String>), SubstrateError> {
    match reply {
        Value::Array(mut parts) if parts.len() == 2 => {
            let keys = as_strings(parts.pop().unwrap_or_default())?;
            let cursor = as_u64(&parts[0])?;
            Ok((cursor, keys))
        }
        other => Err(unexpected("[cursor, keys]", &other)),
    }
}
