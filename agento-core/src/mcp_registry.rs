//! MCP server registry (§6 "MCP registry file format"): `mcps.yaml` maps server name to a
//! transport spec, fed into `RunOptions.mcp_servers` alongside integration tool servers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum McpRegistryError {
    #[error("read '{path}': {source}")]
    Read { path: String, source: std::io::Error },
    #[error("parse '{path}': {source}")]
    Parse { path: String, source: serde_yaml::Error },
    #[error("server '{server}' references missing environment variable '{var}'")]
    MissingEnvVar { server: String, var: String },
}

/// One entry of `mcps.yaml` before `${ENV:VAR}` substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum McpServerSpec {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    StreamableHttp { url: String },
    Sse { url: String },
}

fn resolve_placeholder(server: &str, value: &str) -> Result<String, McpRegistryError> {
    let Some(var) = value.strip_prefix("${ENV:").and_then(|s| s.strip_suffix('}')) else {
        return Ok(value.to_string());
    };
    std::env::var(var).map_err(|_| McpRegistryError::MissingEnvVar {
        server: server.to_string(),
        var: var.to_string(),
    })
}

/// Loads and resolves `${ENV:VAR}` placeholders in `command`, `args`, `env` values, and `url`.
/// A missing referenced variable is a fatal load error (§6).
pub fn load(path: impl AsRef<Path>) -> Result<BTreeMap<String, McpServerSpec>, McpRegistryError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| McpRegistryError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut servers: BTreeMap<String, McpServerSpec> =
        serde_yaml::from_str(&raw).map_err(|source| McpRegistryError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    for (name, spec) in servers.iter_mut() {
        match spec {
            McpServerSpec::Stdio { command, args, env } => {
                *command = resolve_placeholder(name, command)?;
                for arg in args.iter_mut() {
                    *arg = resolve_placeholder(name, arg)?;
                }
                for value in env.values_mut() {
                    *value = resolve_placeholder(name, value)?;
                }
            }
            McpServerSpec::StreamableHttp { url } | McpServerSpec::Sse { url } => {
                *url = resolve_placeholder(name, url)?;
            }
        }
    }
    Ok(servers)
}
