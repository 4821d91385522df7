//! Per-service tool catalog for integration tool servers (§4.4 tool server contract): "Only tools
//! listed in `services[svc].tools` (when non-empty) are registered; empty list means 'all tools
//! for that service'." Mirrors `scopes.rs`'s enabled-service-union shape, one static table per
//! integration type instead of per scope.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Integration, IntegrationType};
use crate::tools::{LocalTool, ToolError, ToolSpec};

struct CatalogEntry {
    name: &'static str,
    description: &'static str,
    method: &'static str,
    url: &'static str,
}

const CALENDAR_TOOLS: &[CatalogEntry] = &[CatalogEntry {
    name: "list_events",
    description: "Lists upcoming events on the user's primary Google Calendar.",
    method: "GET",
    url: "https://www.googleapis.com/calendar/v3/calendars/primary/events",
}];

const GMAIL_TOOLS: &[CatalogEntry] = &[CatalogEntry {
    name: "list_messages",
    description: "Lists message ids in the user's Gmail inbox.",
    method: "GET",
    url: "https://gmail.googleapis.com/gmail/v1/users/me/messages",
}];

const DRIVE_TOOLS: &[CatalogEntry] = &[CatalogEntry {
    name: "list_files",
    description: "Lists files in the user's Google Drive.",
    method: "GET",
    url: "https://www.googleapis.com/drive/v3/files",
}];

const TASKS_TOOLS: &[CatalogEntry] = &[CatalogEntry {
    name: "list_tasks",
    description: "Lists tasks in the user's default Google Tasks list.",
    method: "GET",
    url: "https://tasks.googleapis.com/tasks/v1/lists/@default/tasks",
}];

const CONTACTS_TOOLS: &[CatalogEntry] = &[CatalogEntry {
    name: "list_contacts",
    description: "Lists the user's Google Contacts.",
    method: "GET",
    url: "https://people.googleapis.com/v1/people/me/connections",
}];

fn google_catalog(service: &str) -> &'static [CatalogEntry] {
    match service {
        "calendar" => CALENDAR_TOOLS,
        "gmail" => GMAIL_TOOLS,
        "drive" => DRIVE_TOOLS,
        "tasks" => TASKS_TOOLS,
        "contacts" => CONTACTS_TOOLS,
        _ => &[],
    }
}

/// A tool backed by a single Google API endpoint, authorized with the integration's stored
/// access token.
struct GoogleApiTool {
    spec: ToolSpec,
    method: reqwest::Method,
    url: String,
    access_token: String,
}

#[async_trait]
impl LocalTool for GoogleApiTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, _input: Value) -> Result<Value, ToolError> {
        let client = reqwest::Client::new();
        let response = client
            .request(self.method.clone(), &self.url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(e.to_string()))?;
        response.json::<Value>().await.map_err(|e| ToolError::Upstream(e.to_string()))
    }
}

/// Builds the tool set an integration exposes from its `services` config: only `enabled` services
/// contribute, and within each, a non-empty `tools` list filters the catalog down to those names.
pub fn build_tools(integration: &Integration) -> Vec<Arc<dyn LocalTool>> {
    let access_token = integration.auth.as_ref().map(|t| t.access_token.clone()).unwrap_or_default();
    let mut tools: Vec<Arc<dyn LocalTool>> = Vec::new();
    for (service, cfg) in &integration.services {
        if !cfg.enabled {
            continue;
        }
        let catalog: &[CatalogEntry] = match integration.kind {
            IntegrationType::Google => google_catalog(service),
        };
        for entry in catalog {
            if !cfg.tools.is_empty() && !cfg.tools.iter().any(|t| t == entry.name) {
                continue;
            }
            tools.push(Arc::new(GoogleApiTool {
                spec: ToolSpec {
                    name: entry.name.to_string(),
                    description: entry.description.to_string(),
                    input_schema: serde_json::json!({ "type": "object", "properties": {} }),
                },
                method: entry.method.parse().expect("catalog method is a valid HTTP method literal"),
                url: entry.url.to_string(),
                access_token: access_token.clone(),
            }));
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OAuthCredentials, ServiceConfig};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn integration_with(services: BTreeMap<String, ServiceConfig>) -> Integration {
        let now = chrono::Utc::now();
        Integration {
            id: Uuid::new_v4(),
            name: "Calendar".into(),
            kind: IntegrationType::Google,
            enabled: true,
            credentials: OAuthCredentials::default(),
            auth: None,
            services,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn disabled_service_contributes_no_tools() {
        let mut services = BTreeMap::new();
        services.insert("calendar".to_string(), ServiceConfig { enabled: false, tools: vec![] });
        let tools = build_tools(&integration_with(services));
        assert!(tools.is_empty());
    }

    #[test]
    fn empty_tools_list_means_all_tools_for_the_service() {
        let mut services = BTreeMap::new();
        services.insert("calendar".to_string(), ServiceConfig { enabled: true, tools: vec![] });
        let tools = build_tools(&integration_with(services));
        assert_eq!(tools.len(), CALENDAR_TOOLS.len());
    }

    #[test]
    fn non_empty_tools_list_filters_the_catalog() {
        let mut services = BTreeMap::new();
        services.insert(
            "gmail".to_string(),
            ServiceConfig { enabled: true, tools: vec!["nonexistent_tool".to_string()] },
        );
        let tools = build_tools(&integration_with(services));
        assert!(tools.is_empty());
    }

    #[test]
    fn enabled_known_tool_name_is_included() {
        let mut services = BTreeMap::new();
        services.insert(
            "gmail".to_string(),
            ServiceConfig { enabled: true, tools: vec!["list_messages".to_string()] },
        );
        let tools = build_tools(&integration_with(services));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].spec().name, "list_messages");
    }
}
