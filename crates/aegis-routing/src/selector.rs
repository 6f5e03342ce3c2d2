//! Provider selection.
//!
//! Precedence is explicit override, then group assignment, then the
//! configured default. An override naming an unknown profile does not fail
//! the request; selection falls through to the next tier and the fallback
//! is logged so misconfigured clients are visible in the audit trail.

use aegis_core::{ProviderProfile, RequestContext};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Which tier produced the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Explicit per-request override.
    Override,
    /// The caller's group assignment.
    Group,
    /// The configured default provider.
    Default,
}

/// Result of selection: the profile to dispatch against and the model to
/// request from it.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// The selected profile.
    pub profile: ProviderProfile,
    /// Model to request. An override may name a model other than the
    /// profile's default.
    pub model: String,
    /// Which tier won.
    pub source: RouteSource,
}

/// Immutable routing configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    profiles: HashMap<String, ProviderProfile>,
    groups: HashMap<String, String>,
    default_provider: String,
}

impl RouteTable {
    /// Build a table.
    ///
    /// `groups` maps group id to profile name. `default_provider` must name
    /// a profile in `profiles`; [`Self::validate`] enforces that.
    #[must_use]
    pub fn new(
        profiles: Vec<ProviderProfile>,
        groups: HashMap<String, String>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.name.clone(), p)).collect(),
            groups,
            default_provider: default_provider.into(),
        }
    }

    /// Check referential integrity: the default provider and every group
    /// target must name a known profile.
    ///
    /// # Errors
    /// Returns the names of the dangling references.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut dangling = Vec::new();
        if !self.profiles.contains_key(&self.default_provider) {
            dangling.push(format!("default provider '{}'", self.default_provider));
        }
        for (group, provider) in &self.groups {
            if !self.profiles.contains_key(provider) {
                dangling.push(format!("group '{group}' -> provider '{provider}'"));
            }
        }
        if dangling.is_empty() {
            Ok(())
        } else {
            Err(dangling)
        }
    }

    /// Look up a profile by name.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&ProviderProfile> {
        self.profiles.get(name)
    }

    /// All profile names, for the health surface.
    #[must_use]
    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Name of the configured default provider.
    #[must_use]
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Select the profile and model for a request.
    ///
    /// Pure over the table and the context; same inputs always yield the
    /// same decision. Returns `None` only when even the default provider is
    /// unknown, which `validate` rules out at startup.
    #[must_use]
    pub fn select(&self, ctx: &RequestContext) -> Option<RouteDecision> {
        if let Some(route) = ctx.route_override() {
            if let Some(profile) = self.profiles.get(&route.provider) {
                return Some(RouteDecision {
                    profile: profile.clone(),
                    model: route.model.clone(),
                    source: RouteSource::Override,
                });
            }
            warn!(
                correlation_id = %ctx.correlation_id(),
                requested = %route.provider,
                "override names unknown provider; falling back"
            );
        }

        if let Some(group) = ctx.group_id() {
            if let Some(provider) = self.groups.get(group) {
                if let Some(profile) = self.profiles.get(provider) {
                    return Some(RouteDecision {
                        profile: profile.clone(),
                        model: profile.model.clone(),
                        source: RouteSource::Group,
                    });
                }
                warn!(
                    correlation_id = %ctx.correlation_id(),
                    group = %group,
                    provider = %provider,
                    "group maps to unknown provider; falling back"
                );
            }
        }

        let profile = self.profiles.get(&self.default_provider)?;
        Some(RouteDecision {
            profile: profile.clone(),
            model: profile.model.clone(),
            source: RouteSource::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::RouteOverride;

    fn table() -> RouteTable {
        let profiles = vec![
            ProviderProfile::new("ollama", "http://localhost:11434", "mistral"),
            ProviderProfile::new("openai", "https://api.openai.com/v1", "gpt-4"),
        ];
        let groups = HashMap::from([("research".to_string(), "openai".to_string())]);
        RouteTable::new(profiles, groups, "ollama")
    }

    fn ctx(group: Option<&str>, route: Option<RouteOverride>) -> RequestContext {
        RequestContext::builder()
            .prompt("hi")
            .api_key_hash("h")
            .client_addr("127.0.0.1")
            .group_id(group.map(String::from))
            .route_override(route)
            .build()
    }

    #[test]
    fn default_when_nothing_set() {
        let decision = table().select(&ctx(None, None)).unwrap();
        assert_eq!(decision.profile.name, "ollama");
        assert_eq!(decision.model, "mistral");
        assert_eq!(decision.source, RouteSource::Default);
    }

    #[test]
    fn group_beats_default() {
        let decision = table().select(&ctx(Some("research"), None)).unwrap();
        assert_eq!(decision.profile.name, "openai");
        assert_eq!(decision.model, "gpt-4");
        assert_eq!(decision.source, RouteSource::Group);
    }

    #[test]
    fn override_beats_group_and_default() {
        let route = RouteOverride {
            provider: "openai".to_string(),
            model: "gpt-4-turbo".to_string(),
        };
        let decision = table().select(&ctx(Some("research"), Some(route))).unwrap();
        assert_eq!(decision.profile.name, "openai");
        assert_eq!(decision.model, "gpt-4-turbo");
        assert_eq!(decision.source, RouteSource::Override);
    }

    #[test]
    fn unknown_override_falls_back_to_group() {
        let route = RouteOverride {
            provider: "nonexistent".to_string(),
            model: "whatever".to_string(),
        };
        let decision = table().select(&ctx(Some("research"), Some(route))).unwrap();
        assert_eq!(decision.profile.name, "openai");
        assert_eq!(decision.source, RouteSource::Group);
    }

    #[test]
    fn unknown_group_falls_back_to_default() {
        let decision = table().select(&ctx(Some("no-such-group"), None)).unwrap();
        assert_eq!(decision.profile.name, "ollama");
        assert_eq!(decision.source, RouteSource::Default);
    }

    #[test]
    fn selection_is_deterministic() {
        let t = table();
        let c = ctx(Some("research"), None);
        let a = t.select(&c).unwrap();
        let b = t.select(&c).unwrap();
        assert_eq!(a.profile.name, b.profile.name);
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn validate_catches_dangling_references() {
        let profiles = vec![ProviderProfile::new("ollama", "http://localhost:11434", "mistral")];
        let groups = HashMap::from([("eng".to_string(), "missing".to_string())]);
        let table = RouteTable::new(profiles, groups, "also-missing");
        let dangling = table.validate().unwrap_err();
        assert_eq!(dangling.len(), 2);
    }

    #[test]
    fn validate_passes_consistent_table() {
        assert!(table().validate().is_ok());
    }
}
