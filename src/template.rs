//! Autoconfig templates: discovery on disk and `${VAR}` interpolation.
//!
//! Template bodies are JSON documents full of literal braces, so ordinary
//! format strings are out. Only `${NAME}` is special, and a backslash in front
//! of it (`\${NAME}`) keeps it literal.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::TemplateError;
use crate::types::{AutoconfigTemplate, EntityKind};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"(\\)?\$\{([A-Za-z0-9_]+)\}").unwrap();
    static ref FILE_NAME: Regex = Regex::new(r"^(binary_sensor|sensor)-(\w+)\.json$").unwrap();
}

/// Substitutes every unescaped `${NAME}` with `variables[NAME]`, or nothing if absent.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            if caps.get(1).is_some() {
                return caps[0].to_string();
            }
            variables.get(&caps[2]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// A template file whose name matched `<kind>-<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub kind: EntityKind,
    pub name: String,
    pub path: PathBuf,
}

impl TemplateFile {
    pub fn load(&self) -> Result<AutoconfigTemplate, TemplateError> {
        let body = fs::read_to_string(&self.path).map_err(|source| TemplateError::Render {
            path: self.path.clone(),
            source,
        })?;
        Ok(AutoconfigTemplate {
            kind: self.kind,
            name: self.name.clone(),
            body,
        })
    }
}

/// Lists the recognised template files in `dir`, sorted by file name.
/// Anything not matching the naming pattern is skipped.
pub fn discover_templates(dir: &Path) -> io::Result<Vec<TemplateFile>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(file) = parse_file_name(file_name, entry.path()) {
            found.push(file);
        }
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn parse_file_name(file_name: &str, path: PathBuf) -> Option<TemplateFile> {
    let caps = FILE_NAME.captures(file_name)?;
    let kind = EntityKind::from_name(&caps[1])?;
    Some(TemplateFile {
        kind,
        name: caps[2].to_string(),
        path,
    })
}
