//! Which tools the model gets to see.

use ollmcp_mcp::{Tool, ToolId};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use tracing::{debug, warn};

/// Aggregate state of one server's tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    AllEnabled,
    AllDisabled,
    Mixed,
}

/// Enabled flag per tool identity.
///
/// Holds exactly one entry per tool in the last synced catalog. Flags of
/// servers that are known but offline are parked outside that set until
/// the server's tools come back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolVisibility {
    enabled: BTreeMap<ToolId, bool>,
    parked: BTreeMap<ToolId, bool>,
}

impl ToolVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the key set to `tools`. New identities start enabled, known
    /// ones keep their flag, vanished ones are dropped.
    pub fn sync(&mut self, tools: &[Tool]) {
        self.sync_with_offline(tools, &BTreeSet::new());
    }

    /// Like [`sync`](Self::sync), but flags of servers listed in `offline`
    /// that have no live tools are parked instead of dropped, and restored
    /// when those tools reappear.
    pub fn sync_with_offline(&mut self, tools: &[Tool], offline: &BTreeSet<String>) {
        let mut previous = std::mem::take(&mut self.parked);
        previous.append(&mut self.enabled);

        let live: BTreeSet<&str> = tools.iter().map(Tool::server).collect();
        self.enabled = tools
            .iter()
            .map(|tool| {
                let flag = previous.get(&tool.id).copied().unwrap_or(true);
                (tool.id.clone(), flag)
            })
            .collect();
        self.parked = previous
            .into_iter()
            .filter(|(id, _)| offline.contains(&id.server) && !live.contains(id.server.as_str()))
            .collect();
        if !self.parked.is_empty() {
            debug!(parked = self.parked.len(), "Keeping flags of offline servers");
        }

        for name in self.wire_collisions() {
            warn!(tool = %name, "Several tools share this name; calls to it are refused");
        }
    }

    /// Wire names claimed by more than one live tool, e.g. `a.b` + `c` and
    /// `a` + `b.c`.
    pub fn wire_collisions(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut collisions = BTreeSet::new();
        for id in self.enabled.keys() {
            let name = id.wire_name();
            if !seen.insert(name.clone()) {
                collisions.insert(name);
            }
        }
        collisions.into_iter().collect()
    }

    pub fn is_enabled(&self, id: &ToolId) -> bool {
        self.enabled.get(id).copied().unwrap_or(false)
    }

    pub fn contains(&self, id: &ToolId) -> bool {
        self.enabled.contains_key(id)
    }

    /// Set one flag. Returns false when the identity is unknown.
    pub fn set(&mut self, id: &ToolId, enabled: bool) -> bool {
        match self.enabled.get_mut(id) {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    /// Flip each listed identity. Unknown identities are ignored.
    pub fn toggle<'a>(&mut self, ids: impl IntoIterator<Item = &'a ToolId>) {
        for id in ids {
            if let Some(flag) = self.enabled.get_mut(id) {
                *flag = !*flag;
            }
        }
    }

    /// Flip tools of `server` by zero-based position in the server's own
    /// tool order. Out-of-range positions are ignored.
    pub fn toggle_range(&mut self, catalog: &[Tool], server: &str, range: Range<usize>) {
        let ids: Vec<ToolId> = catalog
            .iter()
            .filter(|tool| tool.server() == server)
            .enumerate()
            .filter(|(index, _)| range.contains(index))
            .map(|(_, tool)| tool.id.clone())
            .collect();
        self.toggle(&ids);
    }

    /// Flip a whole server.
    ///
    /// A uniform server flips to the opposite state. A mixed server with
    /// more tools enabled than disabled becomes all disabled; otherwise it
    /// becomes all enabled.
    pub fn toggle_server(&mut self, server: &str) {
        let (on, off) = self.counts(server);
        if on + off == 0 {
            return;
        }
        self.set_server(server, on <= off);
    }

    pub fn enable_all(&mut self) {
        self.enabled.values_mut().for_each(|flag| *flag = true);
    }

    pub fn disable_all(&mut self) {
        self.enabled.values_mut().for_each(|flag| *flag = false);
    }

    pub fn set_server(&mut self, server: &str, enabled: bool) {
        for (id, flag) in self.enabled.iter_mut() {
            if id.server == server {
                *flag = enabled;
            }
        }
    }

    /// Derived state of `server`, or `None` if it has no tools.
    pub fn server_state(&self, server: &str) -> Option<ServerState> {
        match self.counts(server) {
            (0, 0) => None,
            (_, 0) => Some(ServerState::AllEnabled),
            (0, _) => Some(ServerState::AllDisabled),
            _ => Some(ServerState::Mixed),
        }
    }

    fn counts(&self, server: &str) -> (usize, usize) {
        self.enabled
            .iter()
            .filter(|(id, _)| id.server == server)
            .fold((0, 0), |(on, off), (_, enabled)| {
                if *enabled {
                    (on + 1, off)
                } else {
                    (on, off + 1)
                }
            })
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.values().filter(|flag| **flag).count()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    /// Tools of `catalog` that are enabled, in catalog order.
    pub fn visible_tools(&self, catalog: &[Tool]) -> Vec<Tool> {
        catalog
            .iter()
            .filter(|tool| self.is_enabled(&tool.id))
            .cloned()
            .collect()
    }

    /// Flags keyed by wire name, for persistence.
    pub fn to_wire_map(&self) -> BTreeMap<String, bool> {
        self.enabled
            .iter()
            .map(|(id, flag)| (id.wire_name(), *flag))
            .collect()
    }

    /// Overwrite flags from a wire-name map. Known identities missing from
    /// the map become enabled; map entries for unknown tools are ignored.
    pub fn apply_wire_map(&mut self, map: &BTreeMap<String, bool>) {
        for (id, flag) in self.enabled.iter_mut() {
            *flag = map.get(&id.wire_name()).copied().unwrap_or(true);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ToolId, bool)> {
        self.enabled.iter().map(|(id, flag)| (id, *flag))
    }
}
