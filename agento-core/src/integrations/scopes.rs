//! OAuth scope computation (§4.4): "scopes are the union of the per-service scope sets of
//! enabled services only."

use std::collections::BTreeMap;

use crate::model::{IntegrationType, ServiceConfig};

/// Static per-service scope table for the `google` integration type. Service names are the
/// keys a caller uses in `Integration::services`.
fn google_service_scopes(service: &str) -> &'static [&'static str] {
    match service {
        "calendar" => &["https://www.googleapis.com/auth/calendar"],
        "gmail" => &["https://www.googleapis.com/auth/gmail.modify"],
        "drive" => &["https://www.googleapis.com/auth/drive"],
        "tasks" => &["https://www.googleapis.com/auth/tasks"],
        "contacts" => &["https://www.googleapis.com/auth/contacts.readonly"],
        _ => &[],
    }
}

/// Union of scopes for every `enabled` service, deduplicated, in a stable order (§4.4).
pub fn scopes_for_services(kind: &IntegrationType, services: &BTreeMap<String, ServiceConfig>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for (name, cfg) in services {
        if !cfg.enabled {
            continue;
        }
        let scopes: &[&str] = match kind {
            IntegrationType::Google => google_service_scopes(name),
        };
        seen.extend(scopes.iter().map(|s| s.to_string()));
    }
    seen.into_iter().collect()
}
