//! Tool and resource catalog of the current session.
//!
//! Pure derived state: replaced wholesale on every successful connect and
//! emptied on disconnect or connection loss. Never merged incrementally.

use std::collections::BTreeMap;

use super::types::{ResourceDescriptor, ToolDescriptor};

/// Catalog advertised by the connected peer.
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    /// Tools keyed by name, in name order.
    tools: BTreeMap<String, ToolDescriptor>,
    /// Resources in the order the peer listed them (uri is unique).
    resources: Vec<ResourceDescriptor>,
}

impl CatalogCache {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from freshly listed tools and resources.
    ///
    /// Later duplicates of a tool name or resource uri are dropped.
    pub fn from_listing(tools: Vec<ToolDescriptor>, resources: Vec<ResourceDescriptor>) -> Self {
        let mut by_name = BTreeMap::new();
        for tool in tools {
            if by_name.contains_key(&tool.name) {
                tracing::warn!(tool = %tool.name, "peer listed duplicate tool name, keeping first");
                continue;
            }
            by_name.insert(tool.name.clone(), tool);
        }

        let mut unique: Vec<ResourceDescriptor> = Vec::with_capacity(resources.len());
        for resource in resources {
            if unique.iter().any(|r| r.uri == resource.uri) {
                tracing::warn!(uri = %resource.uri, "peer listed duplicate resource uri, keeping first");
                continue;
            }
            unique.push(resource);
        }

        Self {
            tools: by_name,
            resources: unique,
        }
    }

    /// Replace the whole catalog with `other`.
    pub fn replace(&mut self, other: CatalogCache) {
        *self = other;
    }

    /// Drop every tool and resource.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.resources.clear();
    }

    /// All tools, sorted by name.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }

    /// All resources in listing order.
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.resources.clone()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    fn resource(uri: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: None,
        }
    }

    fn names(cache: &CatalogCache) -> Vec<String> {
        cache.tools().into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_from_listing_keys_tools_by_name() {
        let cache = CatalogCache::from_listing(
            vec![tool("function_details"), tool("similar_functions")],
            vec![resource("greeting://world")],
        );
        assert_eq!(names(&cache), vec!["function_details", "similar_functions"]);
        assert_eq!(cache.resource_count(), 1);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut second = tool("a");
        second.description = Some("second".into());
        let cache = CatalogCache::from_listing(
            vec![tool("a"), second],
            vec![resource("x://1"), resource("x://1")],
        );
        assert_eq!(cache.tool_count(), 1);
        assert_eq!(cache.tools()[0].description.as_deref(), Some("a tool"));
        assert_eq!(cache.resource_count(), 1);
    }

    #[test]
    fn test_replace_is_wholesale_not_merge() {
        let mut cache = CatalogCache::from_listing(vec![tool("old")], vec![resource("old://")]);
        cache.replace(CatalogCache::from_listing(vec![tool("new")], vec![]));
        assert_eq!(names(&cache), vec!["new"]);
        assert_eq!(cache.resource_count(), 0);
    }

    #[test]
    fn test_clear_empties_both_catalogs() {
        let mut cache = CatalogCache::from_listing(vec![tool("t")], vec![resource("r://")]);
        assert_eq!(cache.tool_count(), 1);
        cache.clear();
        assert!(cache.tools().is_empty());
        assert!(cache.resources().is_empty());
    }
}
