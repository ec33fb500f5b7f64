//! Index-based tool selector.
//!
//! The tool list is shown with servers sorted by name (`S1`, `S2`, ...) and
//! one global 1-based number per tool. Input is a comma separated mix of
//! `3`, `5-8`, `S2`, `a`/`all` and `n`/`none`.

use crate::visibility::ToolVisibility;
use ollmcp_mcp::{Tool, ToolId};
use std::ops::Range;

/// Numbering of the displayed tool list.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    servers: Vec<(String, Vec<ToolId>)>,
}

impl Layout {
    /// Build from a catalog ordered by server name, then server order.
    pub fn from_tools(catalog: &[Tool]) -> Self {
        let mut servers: Vec<(String, Vec<ToolId>)> = Vec::new();
        for tool in catalog {
            match servers.last_mut() {
                Some((server, ids)) if server == tool.server() => ids.push(tool.id.clone()),
                _ => servers.push((tool.server().to_string(), vec![tool.id.clone()])),
            }
        }
        Self { servers }
    }

    /// Servers with their tools, in display order.
    pub fn servers(&self) -> &[(String, Vec<ToolId>)] {
        &self.servers
    }

    /// Tool shown under global number `number` (1-based).
    pub fn tool(&self, number: usize) -> Option<&ToolId> {
        self.servers
            .iter()
            .flat_map(|(_, ids)| ids.iter())
            .nth(number.checked_sub(1)?)
    }

    /// Server shown as `S{number}` (1-based).
    pub fn server(&self, number: usize) -> Option<&str> {
        self.servers
            .get(number.checked_sub(1)?)
            .map(|(name, _)| name.as_str())
    }

    pub fn tool_count(&self) -> usize {
        self.servers.iter().map(|(_, ids)| ids.len()).sum()
    }

    /// Split the global numbers `start..=end` into zero-based ranges per
    /// server.
    pub fn segments(&self, start: usize, end: usize) -> Vec<(String, Range<usize>)> {
        let mut segments = Vec::new();
        let mut offset = 0;
        for (server, ids) in &self.servers {
            let first = start.saturating_sub(1).max(offset);
            let last = end.min(offset + ids.len());
            if first < last {
                segments.push((server.clone(), first - offset..last - offset));
            }
            offset += ids.len();
        }
        segments
    }
}

/// One parsed selector action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Toggle(Vec<ToolId>),
    /// Zero-based positions within one server's tool order.
    ToggleRange {
        server: String,
        range: Range<usize>,
    },
    ToggleServer(String),
    EnableAll,
    DisableAll,
}

/// Result of parsing selector input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub actions: Vec<Action>,
    /// Tokens that could not be understood.
    pub invalid: Vec<String>,
}

impl Selection {
    /// Apply every action in order. `catalog` is the list the layout was
    /// built from.
    pub fn apply(&self, visibility: &mut ToolVisibility, catalog: &[Tool]) {
        for action in &self.actions {
            match action {
                Action::Toggle(ids) => visibility.toggle(ids),
                Action::ToggleRange { server, range } => {
                    visibility.toggle_range(catalog, server, range.clone())
                }
                Action::ToggleServer(server) => visibility.toggle_server(server),
                Action::EnableAll => visibility.enable_all(),
                Action::DisableAll => visibility.disable_all(),
            }
        }
    }
}

/// Parse selector input against `layout`.
///
/// Invalid tokens are reported in [`Selection::invalid`]; the valid ones
/// still produce actions.
pub fn parse(input: &str, layout: &Layout) -> Selection {
    let mut selection = Selection::default();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match parse_token(token, layout) {
            Some(actions) => selection.actions.extend(actions),
            None => selection.invalid.push(token.to_string()),
        }
    }
    selection
}

fn parse_token(token: &str, layout: &Layout) -> Option<Vec<Action>> {
    match token.to_ascii_lowercase().as_str() {
        "a" | "all" => return Some(vec![Action::EnableAll]),
        "n" | "none" => return Some(vec![Action::DisableAll]),
        _ => {}
    }

    if let Some(number) = token.strip_prefix(['S', 's']) {
        let server = layout.server(number.parse().ok()?)?;
        return Some(vec![Action::ToggleServer(server.to_string())]);
    }

    if let Some((start, end)) = token.split_once('-') {
        let start: usize = start.trim().parse().ok()?;
        let end: usize = end.trim().parse().ok()?;
        if start == 0 || start > end || end > layout.tool_count() {
            return None;
        }
        let actions = layout
            .segments(start, end)
            .into_iter()
            .map(|(server, range)| Action::ToggleRange { server, range })
            .collect();
        return Some(actions);
    }

    let id = layout.tool(token.parse().ok()?)?;
    Some(vec![Action::Toggle(vec![id.clone()])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<Tool> {
        let schema = json!({"type": "object"});
        vec![
            Tool::new("files", "read", "", schema.clone()),
            Tool::new("files", "write", "", schema.clone()),
            Tool::new("weather", "get_forecast", "", schema.clone()),
            Tool::new("weather", "get_alerts", "", schema),
        ]
    }

    #[test]
    fn test_layout_numbering() {
        let layout = Layout::from_tools(&catalog());
        assert_eq!(layout.tool_count(), 4);
        assert_eq!(layout.tool(3), Some(&ToolId::new("weather", "get_forecast")));
        assert_eq!(layout.tool(0), None);
        assert_eq!(layout.server(2), Some("weather"));
        assert_eq!(layout.server(3), None);
    }

    #[test]
    fn test_parse_numbers_and_ranges() {
        let layout = Layout::from_tools(&catalog());
        let selection = parse("1, 3-4", &layout);
        assert!(selection.invalid.is_empty());
        assert_eq!(
            selection.actions,
            vec![
                Action::Toggle(vec![ToolId::new("files", "read")]),
                Action::ToggleRange {
                    server: "weather".into(),
                    range: 0..2,
                },
            ]
        );
    }

    #[test]
    fn test_range_across_servers_toggles_each_segment() {
        let tools = catalog();
        let layout = Layout::from_tools(&tools);
        assert_eq!(
            layout.segments(2, 3),
            vec![("files".to_string(), 1..2), ("weather".to_string(), 0..1)]
        );

        let mut visibility = ToolVisibility::new();
        visibility.sync(&tools);
        parse("2-3", &layout).apply(&mut visibility, &tools);

        assert!(visibility.is_enabled(&ToolId::new("files", "read")));
        assert!(!visibility.is_enabled(&ToolId::new("files", "write")));
        assert!(!visibility.is_enabled(&ToolId::new("weather", "get_forecast")));
        assert!(visibility.is_enabled(&ToolId::new("weather", "get_alerts")));
    }

    #[test]
    fn test_parse_keywords_and_servers() {
        let layout = Layout::from_tools(&catalog());
        let selection = parse("S2,a,none", &layout);
        assert_eq!(
            selection.actions,
            vec![
                Action::ToggleServer("weather".into()),
                Action::EnableAll,
                Action::DisableAll,
            ]
        );
    }

    #[test]
    fn test_invalid_tokens_reported_valid_ones_apply() {
        let tools = catalog();
        let layout = Layout::from_tools(&tools);
        let mut visibility = ToolVisibility::new();
        visibility.sync(&tools);

        let selection = parse("2, 9, x, 4-1, S7", &layout);
        assert_eq!(selection.invalid, vec!["9", "x", "4-1", "S7"]);

        selection.apply(&mut visibility, &tools);
        assert!(!visibility.is_enabled(&ToolId::new("files", "write")));
        assert_eq!(visibility.enabled_count(), 3);
    }
}
