//! Desktop entry (.desktop) parsing and rewriting

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::error::Result;
use crate::models::Metadata;

lazy_static::lazy_static! {
    static ref KEY_RE: Regex =
        Regex::new(r"^([A-Za-z0-9-]+)(\[[^\]]*\])?\s*=\s*(.*)$").unwrap();
}

const MAIN_GROUP: &str = "Desktop Entry";

/// Unlocalized keys of the `[Desktop Entry]` group
#[derive(Debug, Clone, Default)]
pub struct DesktopEntry {
    fields: HashMap<String, String>,
}

impl DesktopEntry {
    /// Parse desktop entry text
    pub fn parse(content: &str) -> Self {
        let mut fields = HashMap::new();
        let mut group: Option<&str> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                group = Some(&line[1..line.len() - 1]);
                continue;
            }
            if group != Some(MAIN_GROUP) {
                continue;
            }
            if let Some(caps) = KEY_RE.captures(line) {
                if caps.get(2).is_some() {
                    // Localized variant
                    continue;
                }
                fields
                    .entry(caps[1].to_string())
                    .or_insert_with(|| caps[3].trim().to_string());
            }
        }

        Self { fields }
    }

    /// Read and parse a desktop file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Raw value of a key, `None` when missing or empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `X-AppImage-Name`, else `Name`
    pub fn app_name(&self) -> Option<&str> {
        self.get("X-AppImage-Name").or_else(|| self.get("Name"))
    }

    /// `X-AppImage-Version`; plain `Version` is the desktop spec version
    pub fn version(&self) -> Option<&str> {
        self.get("X-AppImage-Version")
    }

    /// `Comment`, else `GenericName`
    pub fn summary(&self) -> Option<&str> {
        self.get("Comment").or_else(|| self.get("GenericName"))
    }

    /// `Categories` split on `;`
    pub fn categories(&self) -> Vec<String> {
        split_list(self.get("Categories"))
    }

    /// `Icon`
    pub fn icon(&self) -> Option<&str> {
        self.get("Icon")
    }

    /// `Exec`
    pub fn exec(&self) -> Option<&str> {
        self.get("Exec")
    }

    /// Program part of `Exec`, without arguments or field codes
    pub fn exec_program(&self) -> Option<String> {
        self.exec().map(|exec| split_exec(exec).1).filter(|p| !p.is_empty())
    }

    /// `Terminal=true`
    pub fn terminal(&self) -> bool {
        self.get("Terminal")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Split an Exec value into a leading `env VAR=value ...` prefix, the
/// program and the remaining arguments
fn split_exec(exec: &str) -> (&str, String, &str) {
    let full = exec.trim();
    let mut exec = full;
    let after_env = exec
        .strip_prefix("env")
        .filter(|rest| rest.starts_with(char::is_whitespace));
    if let Some(after_env) = after_env {
        exec = after_env.trim_start();
        while let Some(end) = exec.find(char::is_whitespace) {
            if !is_assignment(&exec[..end]) {
                break;
            }
            exec = exec[end..].trim_start();
        }
    }
    let prefix = &full[..full.len() - exec.len()];
    let (program, rest) = split_program(exec);
    (prefix, program, rest)
}

fn is_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn split_program(exec: &str) -> (String, &str) {
    if let Some(quoted) = exec.strip_prefix('"') {
        match quoted.find('"') {
            Some(end) => (quoted[..end].to_string(), quoted[end + 1..].trim_start()),
            None => (quoted.to_string(), ""),
        }
    } else {
        match exec.find(char::is_whitespace) {
            Some(end) => (exec[..end].to_string(), exec[end..].trim_start()),
            None => (exec.to_string(), ""),
        }
    }
}

/// Point a bundled desktop file at the installed launcher and icon.
///
/// `Exec` keeps its arguments and field codes in every group, so desktop
/// actions keep working.
pub fn rewrite(content: &str, launcher: &str, icon: Option<&str>) -> String {
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let rewritten = KEY_RE.captures(line.trim()).and_then(|caps| {
            if caps.get(2).is_some() {
                return None;
            }
            match &caps[1] {
                "Exec" => {
                    let (prefix, _, rest) = split_exec(&caps[3]);
                    Some(if rest.is_empty() {
                        format!("Exec={}{}", prefix, launcher)
                    } else {
                        format!("Exec={}{} {}", prefix, launcher, rest)
                    })
                }
                "TryExec" => Some(format!("TryExec={}", launcher)),
                "Icon" => icon.map(|icon| format!("Icon={}", icon)),
                _ => None,
            }
        });

        out.push_str(rewritten.as_deref().unwrap_or(line));
        out.push('\n');
    }

    out
}

/// Desktop file for bundles that ship none
pub fn generate(metadata: &Metadata, icon: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("[Desktop Entry]\n");
    out.push_str("Type=Application\n");
    out.push_str(&format!("Name={}\n", metadata.display_name));
    out.push_str(&format!("Comment={}\n", metadata.effective_summary()));
    out.push_str(&format!("Exec={} %U\n", metadata.name));
    if let Some(icon) = icon {
        out.push_str(&format!("Icon={}\n", icon));
    }
    out.push_str(&format!("Terminal={}\n", metadata.terminal));
    let categories = if metadata.categories.is_empty() {
        "Utility;".to_string()
    } else {
        format!("{};", metadata.categories.join(";"))
    };
    out.push_str(&format!("Categories={}\n", categories));
    out
}
