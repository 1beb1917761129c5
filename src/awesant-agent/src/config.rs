// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for the awesant agent.
//!
//! Config is loaded from `awesant.toml`. Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./awesant.toml`
//! 3. `~/.config/awesant/awesant.toml`
//! 4. `/etc/awesant/awesant.toml`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use awesant_app::{normalize_name, ConfigError, ConfigFile};
use awesant_core::AddFieldRule;
use awesant_multiline::{MultilineConfig, MultilineMode};
use awesant_protocol::{Compression, ProtocolVersion};
use awesant_tail::StartPosition;

/// Poll cadence bounds (milliseconds).
pub const POLL_MIN_MS: u64 = 100;
pub const POLL_MAX_MS: u64 = 9999;

/// A TOML value that is either a scalar or an array of scalars.
/// Normalised to a list during validation; always treated as a list
/// downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OneOrMany::Many(vs) if vs.is_empty())
    }
}

/// A yes/no flag that also accepts `1`/`0` and booleans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Switch {
    pub fn enabled(&self) -> Result<bool, String> {
        match self {
            Switch::Bool(b) => Ok(*b),
            Switch::Int(0) => Ok(false),
            Switch::Int(1) => Ok(true),
            Switch::Int(other) => Err(format!("invalid switch value {}", other)),
            Switch::Text(s) => match s.as_str() {
                "yes" | "1" => Ok(true),
                "no" | "0" => Ok(false),
                other => Err(format!("invalid switch value '{}'", other)),
            },
        }
    }
}

impl Default for Switch {
    fn default() -> Self {
        Switch::Bool(true)
    }
}

impl From<bool> for Switch {
    fn from(value: bool) -> Self {
        Switch::Bool(value)
    }
}

/// Payload format of an input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Plain,
    Json,
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    pub inputs: Vec<InputConfig>,
    pub outputs: Vec<OutputConfig>,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Directory for position files
    pub libdir: String,
    /// Hostname stamped into events (default: the system hostname)
    pub hostname: Option<String>,
    /// Poll interval in milliseconds (clamped to 100..=9999)
    pub poll: u64,
    /// Maximum events per pull
    pub lines: usize,
    /// Wildcard re-glob interval in seconds
    pub log_watch_interval: u64,
    /// Log per-worker throughput counters
    pub benchmark: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: None,
            libdir: "/var/lib/awesant".to_string(),
            hostname: None,
            poll: 500,
            lines: 100,
            log_watch_interval: 10,
            benchmark: false,
        }
    }
}

impl AgentSettings {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll.clamp(POLL_MIN_MS, POLL_MAX_MS))
    }

    pub fn resolved_hostname(&self) -> String {
        if let Some(name) = &self.hostname {
            return name.clone();
        }
        std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "localhost".to_string())
    }
}

/// One derived add_field rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddFieldRuleConfig {
    /// Field to set
    pub key: String,
    /// Field the match runs against
    pub field: String,
    /// Regex with capture groups
    #[serde(rename = "match")]
    pub matcher: String,
    /// Capture substitution template ($1, ${name})
    pub template: String,
    /// Value used when the regex does not match
    pub default: Option<String>,
}

impl AddFieldRuleConfig {
    pub fn compile(&self) -> Result<AddFieldRule, String> {
        AddFieldRule::new(
            &self.key,
            &self.field,
            &self.matcher,
            &self.template,
            self.default.clone(),
        )
        .map_err(|e| format!("add_field rule '{}': {}", self.key, e))
    }
}

/// One `[[inputs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Input kind: "file", "oraclexml" or "lumberjack"
    pub kind: String,
    /// Routing key. Optional for json-format inputs whose payloads carry
    /// their own type.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// Path to tail (file/oraclexml). Globs spawn a tailer per match.
    pub path: Option<String>,
    /// Payload format
    pub format: Format,
    /// Tags merged into every event
    pub tags: OneOrMany<String>,
    /// Static fields merged into every event
    pub add_field: BTreeMap<String, String>,
    /// Derived field rules
    pub add_field_rules: Vec<AddFieldRuleConfig>,
    /// Worker count; 0 joins the shared implicit group
    pub workers: Option<u32>,
    /// "begin" or "end"
    pub start_position: String,
    /// Persist the committed offset across restarts
    pub save_position: bool,
    /// Lines matching any of these regexes are dropped before grouping
    pub skip: OneOrMany<String>,
    /// When set, only lines matching one of these regexes pass
    pub grep: OneOrMany<String>,

    pub multiline_mode: Option<String>,
    pub multiline_prefix: Option<String>,
    pub multiline_suffix: Option<String>,
    pub multiline_garbage: Option<String>,
    pub multiline_indented_group: Option<String>,
    /// yes|no|1|0 (default yes)
    pub multiline_drop_garbage: Switch,

    /// Bind address for the lumberjack input
    pub host: String,
    /// Bind port for the lumberjack input
    pub port: Option<u16>,
    pub ssl_cert_file: Option<String>,
    pub ssl_key_file: Option<String>,
    pub ssl_ca_file: Option<String>,
    /// DEFLATE wrapper expected inside `C` frames
    pub compression: Compression,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            kind: String::new(),
            event_type: None,
            path: None,
            format: Format::Plain,
            tags: OneOrMany::default(),
            add_field: BTreeMap::new(),
            add_field_rules: Vec::new(),
            workers: None,
            start_position: "end".to_string(),
            save_position: true,
            skip: OneOrMany::default(),
            grep: OneOrMany::default(),
            multiline_mode: None,
            multiline_prefix: None,
            multiline_suffix: None,
            multiline_garbage: None,
            multiline_indented_group: None,
            multiline_drop_garbage: Switch::default(),
            host: "0.0.0.0".to_string(),
            port: None,
            ssl_cert_file: None,
            ssl_key_file: None,
            ssl_ca_file: None,
            compression: Compression::default(),
        }
    }
}

impl InputConfig {
    pub fn normalized_kind(&self) -> String {
        normalize_name(&self.kind)
    }

    pub fn is_file_kind(&self) -> bool {
        matches!(self.normalized_kind().as_str(), "file" | "oraclexml")
    }

    pub fn parsed_start_position(&self) -> Result<StartPosition, String> {
        self.start_position.parse()
    }

    /// Compile the multiline keys into a grouper config.
    pub fn multiline_config(&self) -> Result<MultilineConfig, String> {
        let mode: MultilineMode = match &self.multiline_mode {
            Some(mode) => mode.parse()?,
            None => MultilineMode::SingleLine,
        };
        let compile = |name: &str, pattern: &Option<String>| -> Result<Option<Regex>, String> {
            pattern
                .as_deref()
                .map(|p| Regex::new(p).map_err(|e| format!("{}: {}", name, e)))
                .transpose()
        };
        let cfg = MultilineConfig {
            mode,
            prefix: compile("multiline_prefix", &self.multiline_prefix)?,
            suffix: compile("multiline_suffix", &self.multiline_suffix)?,
            garbage: compile("multiline_garbage", &self.multiline_garbage)?,
            indented_group: compile("multiline_indented_group", &self.multiline_indented_group)?,
            drop_garbage: self.multiline_drop_garbage.enabled()?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn compiled_skip(&self) -> Result<Vec<Regex>, String> {
        compile_regex_list("skip", &self.skip)
    }

    pub fn compiled_grep(&self) -> Result<Vec<Regex>, String> {
        compile_regex_list("grep", &self.grep)
    }

    /// Name used for the `file`/`source` fields of network inputs.
    pub fn binding_label(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(0))
    }
}

fn compile_regex_list(name: &str, list: &OneOrMany<String>) -> Result<Vec<Regex>, String> {
    list.to_vec()
        .iter()
        .map(|p| Regex::new(p).map_err(|e| format!("{} '{}': {}", name, p, e)))
        .collect()
}

/// One `[[outputs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output kind: "screen", "file", "socket" or "lumberjack"
    pub kind: String,
    /// Routing keys this output serves; comma separated or a list;
    /// "*" matches any type.
    #[serde(rename = "type")]
    pub types: OneOrMany<String>,
    /// Downstream host list, rotated on connect failure
    pub host: OneOrMany<String>,
    pub port: Option<u16>,
    /// Per-send timeout in seconds
    pub timeout: u64,
    /// Per-connect timeout in seconds
    pub connect_timeout: u64,
    /// Keep the connection open between pushes
    pub persistent: bool,
    /// Lumberjack send window
    pub window_size: u32,
    /// Batch size; 0 pushes single JSON-encoded events
    pub max_window_size: usize,
    /// Lumberjack protocol version ("1" or "2")
    pub protocol: ProtocolVersion,
    /// DEFLATE wrapper for `C` frames ("zlib", "raw" or "none")
    pub compression: Compression,
    pub ssl_ca_file: Option<String>,
    pub ssl_cert_file: Option<String>,
    pub ssl_key_file: Option<String>,
    /// Target path for the file output
    pub path: Option<String>,
    /// Pretty-print events on the screen output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: String::new(),
            types: OneOrMany::default(),
            host: OneOrMany::default(),
            port: None,
            timeout: 10,
            connect_timeout: 5,
            persistent: true,
            window_size: 100,
            max_window_size: 0,
            protocol: ProtocolVersion::default(),
            compression: Compression::default(),
            ssl_ca_file: None,
            ssl_cert_file: None,
            ssl_key_file: None,
            path: None,
            pretty: false,
        }
    }
}

impl OutputConfig {
    pub fn normalized_kind(&self) -> String {
        normalize_name(&self.kind)
    }

    /// Routing keys, split on commas and lowercased. `*` matches any type.
    pub fn route_types(&self) -> Vec<String> {
        self.types
            .to_vec()
            .iter()
            .flat_map(|t| t.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// `host:port` endpoints in configured order.
    pub fn endpoints(&self) -> Vec<String> {
        self.host
            .to_vec()
            .iter()
            .map(|h| {
                if h.contains(':') {
                    h.clone()
                } else {
                    format!("{}:{}", h, self.port.unwrap_or(0))
                }
            })
            .collect()
    }

    pub fn tls_enabled(&self) -> bool {
        self.ssl_ca_file.is_some() || self.ssl_cert_file.is_some()
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.agent.log_level.as_deref())?;

        if self.agent.lines == 0 {
            return Err("[agent].lines must be > 0".to_string());
        }
        if self.agent.log_watch_interval == 0 {
            return Err("[agent].log_watch_interval must be > 0".to_string());
        }
        if self.inputs.is_empty() {
            return Err("at least one [[inputs]] entry is required".to_string());
        }
        if self.outputs.is_empty() {
            return Err("at least one [[outputs]] entry is required".to_string());
        }

        for (i, input) in self.inputs.iter().enumerate() {
            validate_input(i, input)?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            validate_output(i, output)?;
        }
        Ok(())
    }

    /// Generate an example configuration.
    pub fn example_toml() -> String {
        let example = AgentConfig {
            agent: AgentSettings {
                log_level: Some("info".to_string()),
                ..AgentSettings::default()
            },
            inputs: vec![InputConfig {
                kind: "file".to_string(),
                event_type: Some("syslog".to_string()),
                path: Some("/var/log/messages".to_string()),
                tags: OneOrMany::Many(vec!["system".to_string()]),
                ..InputConfig::default()
            }],
            outputs: vec![OutputConfig {
                kind: "lumberjack".to_string(),
                types: OneOrMany::One("syslog".to_string()),
                host: OneOrMany::Many(vec![
                    "logstash1.example".to_string(),
                    "logstash2.example".to_string(),
                ]),
                port: Some(5044),
                max_window_size: 50,
                ssl_ca_file: Some("/etc/awesant/ca.crt".to_string()),
                ..OutputConfig::default()
            }],
        };
        toml::to_string_pretty(&example).unwrap_or_default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }
}

impl ConfigFile for AgentConfig {
    fn config_filename() -> &'static str {
        "awesant.toml"
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[agent].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

fn validate_input(i: usize, input: &InputConfig) -> Result<(), String> {
    let at = format!("[[inputs]] #{}", i + 1);
    match input.normalized_kind().as_str() {
        "file" | "oraclexml" => {
            if input.path.as_deref().unwrap_or("").trim().is_empty() {
                return Err(format!("{}: path is required for kind '{}'", at, input.kind));
            }
            if input.workers.unwrap_or(0) > 1 {
                return Err(format!(
                    "{}: file-based inputs must use workers = 1 (tailer state is per file)",
                    at
                ));
            }
        }
        "lumberjack" => {
            if input.port.unwrap_or(0) == 0 {
                return Err(format!("{}: port is required for kind 'lumberjack'", at));
            }
            if input.ssl_cert_file.is_some() != input.ssl_key_file.is_some() {
                return Err(format!(
                    "{}: ssl_cert_file and ssl_key_file must be set together",
                    at
                ));
            }
        }
        other => {
            return Err(format!("{}: unknown input kind '{}'", at, other));
        }
    }

    if input.event_type.is_none() && input.format == Format::Plain {
        return Err(format!("{}: type is required for plain-format inputs", at));
    }

    input.parsed_start_position().map_err(|e| format!("{}: {}", at, e))?;
    input.multiline_config().map_err(|e| format!("{}: {}", at, e))?;
    input.compiled_skip().map_err(|e| format!("{}: {}", at, e))?;
    input.compiled_grep().map_err(|e| format!("{}: {}", at, e))?;
    for rule in &input.add_field_rules {
        rule.compile().map_err(|e| format!("{}: {}", at, e))?;
    }
    Ok(())
}

fn validate_output(i: usize, output: &OutputConfig) -> Result<(), String> {
    let at = format!("[[outputs]] #{}", i + 1);
    if output.route_types().is_empty() {
        return Err(format!("{}: type is required (use \"*\" to match all)", at));
    }
    match output.normalized_kind().as_str() {
        "screen" => {}
        "file" => {
            if output.path.as_deref().unwrap_or("").trim().is_empty() {
                return Err(format!("{}: path is required for kind 'file'", at));
            }
        }
        "socket" | "lumberjack" => {
            if output.host.is_empty() {
                return Err(format!("{}: host is required for kind '{}'", at, output.kind));
            }
            if output.port.unwrap_or(0) == 0
                && output.endpoints().iter().any(|e| e.ends_with(":0"))
            {
                return Err(format!("{}: port is required for kind '{}'", at, output.kind));
            }
            if output.ssl_cert_file.is_some() != output.ssl_key_file.is_some() {
                return Err(format!(
                    "{}: ssl_cert_file and ssl_key_file must be set together",
                    at
                ));
            }
        }
        other => {
            return Err(format!("{}: unknown output kind '{}'", at, other));
        }
    }
    if output.timeout == 0 || output.connect_timeout == 0 {
        return Err(format!("{}: timeout and connect_timeout must be > 0", at));
    }
    if output.window_size == 0 {
        return Err(format!("{}: window_size must be > 0", at));
    }
    Ok(())
}
