//! Tool allowlist construction (§4.1): merges built-in, local, and integration tool sources
//! into the single qualified-name list passed to the runtime.
//!
//! Resolved ambiguity (spec.md is silent on how a `Capabilities::Local` entry names which of
//! potentially several configured `mcps.yaml` servers it refers to): entries take the form
//! `"<server-name>/<tool-name>"`. See DESIGN.md.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::integrations::IntegrationRegistry;
use crate::mcp_registry::McpServerSpec;
use crate::model::{Capabilities, SourceKind};
use crate::tools::LocalToolServer;

/// `mcp__<integration-id>__<tool-name>` / `mcp__<server-name>__<tool-name>` per §4.1.
pub fn qualify(server: impl std::fmt::Display, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// Builds the merged allowlist for one run. Built-ins are validated against the live
/// `LocalToolServer` registry; local entries are validated against the configured mcps.yaml
/// registry; integration entries are validated against the registry's running, authenticated
/// tool servers only (§4.1: "only integrations with enabled ∧ authenticated are included").
pub async fn build_allowed_tools(
    capabilities: &Capabilities,
    local_tools: &LocalToolServer,
    local_registry: &std::collections::BTreeMap<String, McpServerSpec>,
    integrations: &IntegrationRegistry,
) -> Vec<String> {
    let mut allowed = Vec::new();

    if let Some(names) = capabilities.get(&SourceKind::BuiltIn) {
        let known: BTreeSet<_> = local_tools.tool_names().into_iter().collect();
        allowed.extend(names.iter().filter(|n| known.contains(*n)).cloned());
    }

    if let Some(refs) = capabilities.get(&SourceKind::Local) {
        for reference in refs {
            if let Some((server, tool)) = reference.split_once('/') {
                if local_registry.contains_key(server) {
                    allowed.push(qualify(server, tool));
                }
            }
        }
    }

    for (kind, names) in capabilities.iter() {
        let SourceKind::Integration(id_str) = kind else { continue };
        let Ok(id) = Uuid::parse_str(id_str) else { continue };
        let Some(server) = integrations.tool_server(id).await else { continue };
        let qualified = server.qualified_tool_names();
        if names.is_empty() {
            allowed.extend(qualified);
        } else {
            for name in names {
                let q = qualify(id, name);
                if qualified.contains(&q) {
                    allowed.push(q);
                }
            }
        }
    }

    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::integrations::IntegrationRepo;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn builtin_allowlist_only_includes_registered_names() {
        let mut caps: Capabilities = BTreeMap::new();
        caps.insert(SourceKind::BuiltIn, vec!["current_time".into(), "not_a_real_tool".into()]);
        let local_tools = LocalToolServer::default();
        let local_registry = BTreeMap::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.db");
        std::mem::forget(dir);
        let conn = rusqlite::Connection::open(&path).unwrap();
        crate::repo::schema::init(&conn).unwrap();
        let integrations = IntegrationRegistry::new(IntegrationRepo::new(std::sync::Arc::new(path)));

        let allowed = build_allowed_tools(&caps, &local_tools, &local_registry, &integrations).await;
        assert_eq!(allowed, vec!["current_time".to_string()]);
    }

    #[test]
    fn qualify_uses_mcp_prefix_convention() {
        assert_eq!(qualify("notion", "search"), "mcp__notion__search");
    }
}
