//! Duck-typed server capability snapshot (§3, §9 "Design Notes").
//!
//! Servers report capabilities as either `{listChanged: bool, ...}` blocks or
//! opaque objects. We model the known shapes as tagged optional fields and
//! keep an `experimental` escape hatch of raw key/value pairs, exactly as
//! Design Note §9 prescribes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub experimental: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
    /// Strict form per the resolved Open Question: only `true` counts.
    #[serde(default)]
    pub templates: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsCapability {
    /// Strict form per the resolved Open Question: a roots-changed
    /// notification is only sent when this is explicitly `true`, never when
    /// `roots` is merely present.
    #[serde(default)]
    pub list_changed: bool,
}

impl ServerCapabilities {
    #[must_use]
    pub fn supports_tools(&self) -> bool {
        self.tools.is_some()
    }

    #[must_use]
    pub fn supports_resources(&self) -> bool {
        self.resources.is_some()
    }

    #[must_use]
    pub fn supports_resource_templates(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| r.templates)
    }

    #[must_use]
    pub fn supports_prompts(&self) -> bool {
        self.prompts.is_some()
    }

    #[must_use]
    pub fn wants_roots_list_changed(&self) -> bool {
        self.roots.as_ref().is_some_and(|r| r.list_changed)
    }

    #[must_use]
    pub fn supports_resource_subscribe(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| r.subscribe)
    }
}
