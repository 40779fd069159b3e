//! Automation types.

use std::path::{Component, Path, PathBuf};

use crate::definition::{Table, Value};
use crate::error::ConfigError;
use crate::rrule::RecurrenceRule;

/// Status value that enables scheduling (compared case-insensitively).
pub const ACTIVE_STATUS: &str = "ACTIVE";

/// Tool invoked by runbook automations unless overridden.
pub const DEFAULT_RUNBOOK_TOOL: &str = "runbook";

/// A unit of scheduled work loaded from a definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    /// State key. Defaults to the name of the directory holding the definition.
    pub id: String,
    /// Display name. Defaults to the definition's file name.
    pub name: String,
    /// Handler type, e.g. `command`, `runbook` or `prompt`.
    pub kind: String,
    pub status: String,
    /// Recurrence rule; automations without one only run in run-once mode.
    pub rrule: Option<String>,
    /// Absolute directories to run in, in declared order. Never empty.
    pub working_directories: Vec<PathBuf>,
    /// Every parsed field, including handler-specific ones.
    pub fields: Table,
    /// Absolute path of the definition file.
    pub source_path: PathBuf,
}

impl Automation {
    /// Build an automation from a parsed definition at `source_path`.
    ///
    /// `source_path` should be absolute; relative working directories are
    /// resolved against its parent.
    pub fn from_definition(source_path: &Path, fields: Table) -> Self {
        let base_dir = source_path.parent().unwrap_or(Path::new("/")).to_path_buf();

        let id = string_field(&fields, "id").unwrap_or_else(|| {
            base_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let name = string_field(&fields, "name").unwrap_or_else(|| {
            source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let kind = string_field(&fields, "type").unwrap_or_default();
        let status = string_field(&fields, "status").unwrap_or_else(|| ACTIVE_STATUS.to_string());
        let rrule = string_field(&fields, "rrule").filter(|r| !r.trim().is_empty());

        let mut working_directories: Vec<PathBuf> = declared_directories(&fields)
            .into_iter()
            .map(|dir| resolve_against(&base_dir, &dir))
            .collect();
        if working_directories.is_empty() {
            working_directories.push(base_dir.clone());
        }

        Self {
            id,
            name,
            kind,
            status,
            rrule,
            working_directories,
            fields,
            source_path: source_path.to_path_buf(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(ACTIVE_STATUS)
    }

    /// Directory containing the definition file.
    pub fn definition_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or(Path::new("/"))
    }

    /// Parse the recurrence rule afresh.
    pub fn recurrence(&self) -> Option<RecurrenceRule> {
        self.rrule.as_deref().map(RecurrenceRule::parse)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Values of `cwds` (list or single string), else `cwd`.
fn declared_directories(fields: &Table) -> Vec<String> {
    let from_cwds: Vec<String> = match fields.get("cwds") {
        Some(Value::List(items)) => items.iter().filter_map(Value::to_plain_string).collect(),
        Some(value) => value.to_plain_string().into_iter().collect(),
        None => Vec::new(),
    };
    let from_cwds: Vec<String> = from_cwds.into_iter().filter(|d| !d.trim().is_empty()).collect();
    if !from_cwds.is_empty() {
        return from_cwds;
    }

    string_field(fields, "cwd")
        .filter(|d| !d.trim().is_empty())
        .into_iter()
        .collect()
}

fn string_field(fields: &Table, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::to_plain_string)
}

/// Join `path` onto `base` unless it is already absolute, then remove `.`
/// and `..` components lexically.
pub fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path.trim());
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Settings for `command` automations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Shell command line.
    pub command: String,
}

impl CommandConfig {
    /// Requires `command` (or `cmd`).
    pub fn from_automation(automation: &Automation) -> Result<Self, ConfigError> {
        let command = match optional_str(automation, "command")? {
            Some(command) => command,
            None => optional_str(automation, "cmd")?.ok_or(ConfigError::MissingField("command"))?,
        };
        Ok(Self { command })
    }
}

/// Settings for `runbook` automations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunbookConfig {
    /// Absolute path, resolved against the definition's directory.
    pub runbook: PathBuf,
    pub block: String,
    /// Overrides the runner's default runbook tool.
    pub tool: Option<String>,
}

impl RunbookConfig {
    /// Requires `runbook` and `block`; `runbook_tool` is optional.
    pub fn from_automation(automation: &Automation) -> Result<Self, ConfigError> {
        let runbook = required_str(automation, "runbook")?;
        let block = required_str(automation, "block")?;
        let tool = optional_str(automation, "runbook_tool")?;
        Ok(Self {
            runbook: resolve_against(automation.definition_dir(), &runbook),
            block,
            tool,
        })
    }
}

/// Settings for `prompt` automations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub prompt: String,
    /// Program followed by leading arguments. `None` means show the prompt only.
    pub runner: Option<Vec<String>>,
}

impl PromptConfig {
    /// Requires `prompt`; `runner` may be a program name or a list of
    /// program and leading arguments.
    pub fn from_automation(automation: &Automation) -> Result<Self, ConfigError> {
        let invalid_runner = ConfigError::InvalidField {
            field: "runner",
            expected: "a string or a list of strings",
        };

        let prompt = required_str(automation, "prompt")?;
        let runner = match automation.field("runner") {
            None => None,
            Some(Value::List(items)) => {
                let argv: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                if argv.len() != items.len() {
                    return Err(invalid_runner);
                }
                Some(argv)
            }
            Some(Value::String(program)) => Some(vec![program.clone()]),
            Some(_) => return Err(invalid_runner),
        };
        let runner = runner.filter(|argv| argv.first().is_some_and(|p| !p.trim().is_empty()));
        Ok(Self { prompt, runner })
    }
}

/// Typed handler configuration, validated when an automation is dispatched or listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerConfig {
    Command(CommandConfig),
    Runbook(RunbookConfig),
    Prompt(PromptConfig),
}

impl HandlerConfig {
    /// Resolve the configuration matching the automation's type.
    pub fn resolve(automation: &Automation) -> Result<Self, ConfigError> {
        match automation.kind.as_str() {
            "command" => CommandConfig::from_automation(automation).map(HandlerConfig::Command),
            "runbook" => RunbookConfig::from_automation(automation).map(HandlerConfig::Runbook),
            "prompt" => PromptConfig::from_automation(automation).map(HandlerConfig::Prompt),
            other => Err(ConfigError::UnsupportedType(other.to_string())),
        }
    }
}

fn required_str(automation: &Automation, field: &'static str) -> Result<String, ConfigError> {
    optional_str(automation, field)?.ok_or(ConfigError::MissingField(field))
}

/// A non-empty string field. Numbers and booleans are not accepted.
fn optional_str(automation: &Automation, field: &'static str) -> Result<Option<String>, ConfigError> {
    match automation.field(field) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}
