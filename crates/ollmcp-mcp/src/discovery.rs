//! Server descriptor sources: CLI arguments, JSON config files and
//! auto-discovery from the Claude desktop config.

use crate::error::{McpError, McpResult};
use crate::server::{ServerDescriptor, TransportKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the Claude config read by auto-discovery.
pub const CLAUDE_CONFIG_FILE: &str = ".claude.json";

/// Top-level shape of an `mcpServers` config document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServersFile {
    #[serde(default)]
    mcp_servers: HashMap<String, ServerEntry>,
}

/// One named entry under `mcpServers`.
#[derive(Debug, Deserialize)]
struct ServerEntry {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    disabled: bool,
}

impl ServerEntry {
    fn into_descriptor(self, name: &str) -> McpResult<ServerDescriptor> {
        let kind = match (self.kind.as_deref(), &self.url) {
            (Some(kind), _) => TransportKind::parse(kind).ok_or_else(|| {
                McpError::invalid_config(format!("{name}: unknown server type `{kind}`"))
            })?,
            (None, Some(_)) => TransportKind::StreamableHttp,
            (None, None) => TransportKind::Stdio,
        };

        let descriptor = match kind {
            TransportKind::Stdio => {
                let command = self.command.ok_or_else(|| {
                    McpError::invalid_config(format!("{name}: missing `command`"))
                })?;
                let args = fix_directory_args(name, self.args)?;
                let mut descriptor = ServerDescriptor::stdio(name, command, args);
                descriptor.env = self.env;
                descriptor
            }
            TransportKind::Sse | TransportKind::StreamableHttp => {
                let url = self
                    .url
                    .ok_or_else(|| McpError::invalid_config(format!("{name}: missing `url`")))?;
                let mut descriptor = if kind == TransportKind::Sse {
                    ServerDescriptor::sse(name, url)
                } else {
                    ServerDescriptor::streamable_http(name, url)
                };
                descriptor.headers = self.headers;
                descriptor
            }
        };

        Ok(if self.disabled {
            descriptor.disabled()
        } else {
            descriptor
        })
    }
}

/// Check `--directory <dir>` arguments of a stdio server.
///
/// A `.py` or `.js` file given as the directory is replaced by its parent.
/// A directory that does not exist makes the entry unusable.
fn fix_directory_args(name: &str, mut args: Vec<String>) -> McpResult<Vec<String>> {
    for index in 0..args.len().saturating_sub(1) {
        if args[index] != "--directory" {
            continue;
        }
        let value = &mut args[index + 1];
        let path = Path::new(value.as_str());
        let is_script = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("py") | Some("js")
        );
        if is_script && path.is_file() {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.to_string_lossy().into_owned()
                }
                _ => ".".to_string(),
            };
            warn!(
                server = %name,
                file = %value,
                directory = %parent,
                "Server passes a file as --directory, using its parent"
            );
            *value = parent;
        }
        if !Path::new(value.as_str()).exists() {
            warn!(server = %name, directory = %value, "Server directory does not exist");
            return Err(McpError::invalid_config(format!(
                "{name}: directory `{value}` does not exist"
            )));
        }
    }
    Ok(args)
}

/// Parse an `{"mcpServers": {...}}` document.
///
/// Disabled entries are dropped. Entries that cannot be used (no command,
/// no url, unknown type) are logged and skipped so one bad entry does not
/// hide the rest. Descriptors come back sorted by name.
pub fn parse_server_config(json: &str) -> McpResult<Vec<ServerDescriptor>> {
    let file: ServersFile = serde_json::from_str(json)
        .map_err(|e| McpError::invalid_config(format!("invalid servers JSON: {e}")))?;

    let mut entries: Vec<_> = file.mcp_servers.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut descriptors = Vec::new();
    for (name, entry) in entries {
        match entry.into_descriptor(&name) {
            Ok(descriptor) if !descriptor.enabled => {
                debug!(server = %name, "Skipping disabled server");
            }
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => warn!(server = %name, error = %e, "Skipping invalid server entry"),
        }
    }
    Ok(descriptors)
}

/// Read and parse a servers config file.
pub fn load_server_config(path: &Path) -> McpResult<Vec<ServerDescriptor>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        McpError::invalid_config(format!("cannot read {}: {e}", path.display()))
    })?;
    let descriptors = parse_server_config(&content)?;
    info!(path = %path.display(), count = descriptors.len(), "Loaded server config");
    Ok(descriptors)
}

/// Build a stdio descriptor for a `.py` or `.js` server script.
pub fn script_descriptor(path: &Path) -> McpResult<ServerDescriptor> {
    let interpreter = match path.extension().and_then(|e| e.to_str()) {
        Some("py") => "python",
        Some("js") => "node",
        _ => {
            return Err(McpError::invalid_config(format!(
                "{}: server script must be a .py or .js file",
                path.display()
            )))
        }
    };
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            McpError::invalid_config(format!("{}: cannot derive server name", path.display()))
        })?;

    Ok(ServerDescriptor::stdio(
        name,
        interpreter,
        [path.to_string_lossy().into_owned()],
    ))
}

/// Build a network descriptor for a server URL given on the command line.
///
/// URLs whose path ends in `/sse` use the SSE transport; everything else
/// uses streamable HTTP. The server is named after host and port.
pub fn url_descriptor(raw: &str) -> McpResult<ServerDescriptor> {
    let url = url::Url::parse(raw)
        .map_err(|e| McpError::invalid_config(format!("malformed url `{raw}`: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| McpError::invalid_config(format!("url `{raw}` has no host")))?;
    let name = match url.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    };

    if url.path().trim_end_matches('/').ends_with("/sse") {
        Ok(ServerDescriptor::sse(name, raw))
    } else {
        Ok(ServerDescriptor::streamable_http(name, raw))
    }
}

/// Location of the Claude config used for auto-discovery.
pub fn claude_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CLAUDE_CONFIG_FILE))
}

/// Read servers from the Claude config, if it exists.
pub fn auto_discover() -> Vec<ServerDescriptor> {
    let Some(path) = claude_config_path() else {
        return Vec::new();
    };
    auto_discover_from(&path)
}

/// Read servers from a Claude-style config at `path`. A missing or
/// unreadable file yields no servers.
pub fn auto_discover_from(path: &Path) -> Vec<ServerDescriptor> {
    if !path.exists() {
        debug!(path = %path.display(), "No config for auto-discovery");
        return Vec::new();
    }
    match load_server_config(path) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Auto-discovery failed");
            Vec::new()
        }
    }
}

/// Where servers come from on startup.
#[derive(Debug, Clone, Default)]
pub struct ServerSources {
    /// Local script paths.
    pub scripts: Vec<PathBuf>,
    /// Remote server URLs.
    pub urls: Vec<String>,
    /// A servers config file.
    pub config_file: Option<PathBuf>,
    /// Read the Claude config too.
    pub auto_discovery: bool,
}

impl ServerSources {
    /// True when no source was given explicitly.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.urls.is_empty() && self.config_file.is_none()
    }
}

/// Collect descriptors from every source.
///
/// Sources are read in order scripts, urls, config file, auto-discovery;
/// a name seen earlier wins. Auto-discovery runs when requested or when
/// no other source was given. Problems with individual sources are
/// returned alongside the descriptors that were found.
pub fn collect_descriptors(sources: &ServerSources) -> (Vec<ServerDescriptor>, Vec<McpError>) {
    let mut descriptors: Vec<ServerDescriptor> = Vec::new();
    let mut problems = Vec::new();

    let mut push = |found: Vec<ServerDescriptor>| {
        for descriptor in found {
            if descriptors.iter().any(|d| d.name == descriptor.name) {
                debug!(server = %descriptor.name, "Ignoring duplicate server name");
                continue;
            }
            descriptors.push(descriptor);
        }
    };

    for script in &sources.scripts {
        match script_descriptor(script) {
            Ok(descriptor) => push(vec![descriptor]),
            Err(e) => problems.push(e),
        }
    }
    for url in &sources.urls {
        match url_descriptor(url) {
            Ok(descriptor) => push(vec![descriptor]),
            Err(e) => problems.push(e),
        }
    }
    if let Some(path) = &sources.config_file {
        match load_server_config(path) {
            Ok(found) => push(found),
            Err(e) => problems.push(e),
        }
    }
    if sources.auto_discovery || sources.is_empty() {
        push(auto_discover());
    }

    (descriptors, problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_kinds() {
        let json = r#"{
            "mcpServers": {
                "weather": {
                    "command": "uv",
                    "args": ["run", "weather.py"],
                    "env": {"API_KEY": "k"}
                },
                "remote": {"url": "http://localhost:8000/mcp"},
                "events": {
                    "type": "sse",
                    "url": "http://localhost:8000/sse",
                    "headers": {"Authorization": "Bearer t"}
                },
                "off": {"command": "x", "disabled": true}
            }
        }"#;

        let descriptors = parse_server_config(json).unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["events", "remote", "weather"]);

        assert_eq!(descriptors[0].kind, TransportKind::Sse);
        assert_eq!(descriptors[0].headers["Authorization"], "Bearer t");
        assert_eq!(descriptors[1].kind, TransportKind::StreamableHttp);
        assert_eq!(descriptors[2].kind, TransportKind::Stdio);
        assert_eq!(descriptors[2].args, vec!["run", "weather.py"]);
        assert_eq!(descriptors[2].env["API_KEY"], "k");
    }

    #[test]
    fn test_parse_skips_unusable_entries() {
        let json = r#"{"mcpServers": {
            "nothing": {},
            "weird": {"type": "carrier-pigeon", "url": "http://x"},
            "ok": {"command": "node", "args": ["s.js"]}
        }}"#;
        let descriptors = parse_server_config(json).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "ok");
    }

    #[test]
    fn test_directory_pointing_at_script_uses_parent() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("server.py");
        std::fs::write(&script, "print('hi')").unwrap();

        let args = vec![
            "--directory".to_string(),
            script.to_string_lossy().into_owned(),
            "run".to_string(),
            "server.py".to_string(),
        ];
        let fixed = fix_directory_args("weather", args).unwrap();
        assert_eq!(fixed[1], dir.path().to_string_lossy());
        assert_eq!(&fixed[2..], ["run", "server.py"]);
    }

    #[test]
    fn test_missing_directory_skips_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let json = serde_json::json!({"mcpServers": {
            "gone": {"command": "uv", "args": ["--directory", missing, "run", "s.py"]},
            "here": {"command": "uv", "args": ["--directory", dir.path(), "run", "s.py"]},
            "plain": {"command": "node", "args": ["--directory"]}
        }});

        let descriptors = parse_server_config(&json.to_string()).unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["here", "plain"]);
        assert_eq!(descriptors[0].args[1], dir.path().to_string_lossy());
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_server_config("{not json"),
            Err(McpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_section_is_empty() {
        assert!(parse_server_config("{}").unwrap().is_empty());
    }

    #[test]
    fn test_script_descriptor() {
        let descriptor = script_descriptor(Path::new("/srv/weather.py")).unwrap();
        assert_eq!(descriptor.name, "weather");
        assert_eq!(descriptor.command.as_deref(), Some("python"));
        assert_eq!(descriptor.args, vec!["/srv/weather.py"]);

        let descriptor = script_descriptor(Path::new("tools/files.js")).unwrap();
        assert_eq!(descriptor.command.as_deref(), Some("node"));

        assert!(script_descriptor(Path::new("server.rb")).is_err());
    }

    #[test]
    fn test_url_descriptor() {
        let descriptor = url_descriptor("http://localhost:8000/sse").unwrap();
        assert_eq!(descriptor.kind, TransportKind::Sse);
        assert_eq!(descriptor.name, "localhost_8000");

        let descriptor = url_descriptor("https://mcp.example.com/mcp").unwrap();
        assert_eq!(descriptor.kind, TransportKind::StreamableHttp);
        assert_eq!(descriptor.name, "mcp.example.com");

        assert!(url_descriptor("not a url").is_err());
    }

    #[test]
    fn test_load_and_auto_discover_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, r#"{"mcpServers":{"fs":{"command":"npx","args":["fs"]}}}"#)
            .unwrap();

        assert_eq!(load_server_config(&path).unwrap().len(), 1);
        assert_eq!(auto_discover_from(&path).len(), 1);
        assert!(auto_discover_from(&dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn test_sources_earlier_names_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"{"mcpServers":{"weather":{"command":"other"},"files":{"command":"npx"}}}"#,
        )
        .unwrap();

        let sources = ServerSources {
            scripts: vec![PathBuf::from("weather.py"), PathBuf::from("bad.txt")],
            urls: Vec::new(),
            config_file: Some(path),
            auto_discovery: false,
        };
        let (descriptors, problems) = collect_descriptors(&sources);
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "files"]);
        assert_eq!(descriptors[0].command.as_deref(), Some("python"));
        assert_eq!(problems.len(), 1);
    }
}
