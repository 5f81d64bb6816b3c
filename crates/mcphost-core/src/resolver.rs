//! Resolver (§4.3): pure, stateless server-suggestion functions.
//!
//! No state, no I/O — every function here takes a borrowed snapshot of
//! aggregated data and returns ranked suggestions. This mirrors how the
//! teacher keeps the equivalent MCP-types logic (`turbomcp-types::traits`)
//! free of any runtime dependency.

use mcphost_types::{AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Template,
    Scheme,
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub server_id: String,
    pub match_type: MatchType,
    pub confidence: f64,
}

fn uri_scheme(uri: &str) -> Option<&str> {
    uri.find(':').map(|idx| &uri[..=idx])
}

/// Builds an anchored regex from a URI template by substituting every
/// `{placeholder}` with `.*` (§4.3 step 2).
fn template_regex(uri_template: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(uri_template.len() + 8);
    pattern.push('^');
    let mut chars = uri_template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                }
                pattern.push_str(".*");
            }
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// `resolveResourceServer` — exact, then template, then scheme fallback.
///
/// Returns an empty list when nothing matches at any tier (§4.3, §8 scenario 4).
#[must_use]
pub fn resolve_resource_server(
    target_uri: &str,
    resources: &[AggregatedResource],
    templates: &[AggregatedResourceTemplate],
) -> Vec<Suggestion> {
    let exact: Vec<Suggestion> = resources
        .iter()
        .filter(|r| r.uri == target_uri)
        .map(|r| Suggestion {
            server_id: r.server_id.clone(),
            match_type: MatchType::Exact,
            confidence: 1.0,
        })
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let template_matches: Vec<Suggestion> = templates
        .iter()
        .filter(|t| {
            template_regex(&t.uri_template).is_some_and(|re| re.is_match(target_uri))
        })
        .map(|t| Suggestion {
            server_id: t.server_id.clone(),
            match_type: MatchType::Template,
            confidence: 0.8,
        })
        .collect();
    if !template_matches.is_empty() {
        return template_matches;
    }

    let Some(target_scheme) = uri_scheme(target_uri) else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    resources
        .iter()
        .filter(|r| uri_scheme(&r.uri) == Some(target_scheme))
        .filter(|r| seen.insert(r.server_id.clone()))
        .map(|r| Suggestion {
            server_id: r.server_id.clone(),
            match_type: MatchType::Scheme,
            confidence: 0.5,
        })
        .collect()
}

/// `suggestServerForTool` — exact name match only (§4.3 "Tool / Prompt resolution").
#[must_use]
pub fn resolve_tool_server(name: &str, tools: &[AggregatedTool]) -> Vec<Suggestion> {
    tools
        .iter()
        .filter(|t| t.name == name)
        .map(|t| Suggestion {
            server_id: t.server_id.clone(),
            match_type: MatchType::Name,
            confidence: 1.0,
        })
        .collect()
}

/// `suggestServerForPrompt` — exact name match only.
#[must_use]
pub fn resolve_prompt_server(name: &str, prompts: &[AggregatedPrompt]) -> Vec<Suggestion> {
    prompts
        .iter()
        .filter(|p| p.name == name)
        .map(|p| Suggestion {
            server_id: p.server_id.clone(),
            match_type: MatchType::Name,
            confidence: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(server_id: &str, uri: &str) -> AggregatedResource {
        AggregatedResource {
            server_id: server_id.to_string(),
            uri: uri.to_string(),
            name: uri.to_string(),
            mime_type: None,
            size: None,
        }
    }

    fn template(server_id: &str, uri_template: &str) -> AggregatedResourceTemplate {
        AggregatedResourceTemplate {
            server_id: server_id.to_string(),
            id: uri_template.to_string(),
            name: uri_template.to_string(),
            uri_template: uri_template.to_string(),
            description: None,
        }
    }

    #[test]
    fn exact_match_wins_over_everything() {
        let resources = vec![
            resource("A", "file:///x.txt"),
            resource("B", "file:///x.txt"),
        ];
        let result = resolve_resource_server("file:///x.txt", &resources, &[]);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|s| s.match_type == MatchType::Exact));
        assert!(result.iter().all(|s| s.confidence == 1.0));
        assert_eq!(result[0].server_id, "A");
        assert_eq!(result[1].server_id, "B");
    }

    #[test]
    fn template_match_when_no_exact() {
        let templates = vec![template("T", "file:///dynamic/{id}.txt")];
        let result = resolve_resource_server("file:///dynamic/42.txt", &[], &templates);
        assert_eq!(
            result,
            vec![Suggestion {
                server_id: "T".to_string(),
                match_type: MatchType::Template,
                confidence: 0.8,
            }]
        );
    }

    #[test]
    fn scheme_fallback_and_miss() {
        let resources = vec![resource("W", "http://api/x")];
        let result = resolve_resource_server("http://other/y", &resources, &[]);
        assert_eq!(
            result,
            vec![Suggestion {
                server_id: "W".to_string(),
                match_type: MatchType::Scheme,
                confidence: 0.5,
            }]
        );

        let miss = resolve_resource_server("ftp://host/f", &resources, &[]);
        assert!(miss.is_empty());
    }

    #[test]
    fn scheme_fallback_deduplicates_server() {
        let resources = vec![
            resource("W", "http://api/x"),
            resource("W", "http://api/y"),
        ];
        let result = resolve_resource_server("http://other/z", &resources, &[]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn tool_and_prompt_resolution_is_exact_name_only() {
        let tools = vec![AggregatedTool {
            server_id: "S".to_string(),
            name: "search".to_string(),
            description: None,
            input_schema: serde_json::json!({}),
            annotations: None,
        }];
        let result = resolve_tool_server("search", &tools);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].match_type, MatchType::Name);

        assert!(resolve_tool_server("missing", &tools).is_empty());
    }
}
