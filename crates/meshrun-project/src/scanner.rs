//! Static scan of model templates
//!
//! Finds `{{ config(...) }}`, `{{ ref(...) }}` and `{{ source(...) }}` markers
//! without rendering the template, so a project can be listed and graphed
//! before anything is resolved.

use meshrun_core::Reference;
use std::collections::BTreeMap;

/// What a static scan found in a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// References in order of first appearance, de-duplicated
    pub references: Vec<Reference>,

    /// Keyword arguments of every `config()` block, later blocks win
    pub config: BTreeMap<String, String>,
}

/// Scans `{{ ... }}` expression blocks
pub struct TemplateScanner;

impl TemplateScanner {
    /// Scan a template
    pub fn scan(sql: &str) -> ScanResult {
        let mut result = ScanResult::default();

        for content in Self::expression_blocks(sql) {
            let content = content.trim().trim_start_matches('-').trim_end_matches('-').trim();

            if let Some(args) = Self::call_arguments(content, "ref") {
                let reference = match args.as_slice() {
                    [name] => Some(Reference::model(name.clone())),
                    [project, name] => Some(Reference::upstream(project.clone(), name.clone())),
                    _ => None,
                };
                if let Some(reference) = reference {
                    if !result.references.contains(&reference) {
                        result.references.push(reference);
                    }
                }
            } else if let Some(args) = Self::call_arguments(content, "source") {
                if let [namespace, name] = args.as_slice() {
                    let reference = Reference::source(namespace.clone(), name.clone());
                    if !result.references.contains(&reference) {
                        result.references.push(reference);
                    }
                }
            } else if let Some(inner) = Self::call_inner(content, "config") {
                for (key, value) in Self::keyword_arguments(inner) {
                    result.config.insert(key, value);
                }
            }
        }

        result
    }

    /// Whether the template still contains template syntax
    pub fn has_markers(sql: &str) -> bool {
        sql.contains("{{") || sql.contains("{%")
    }

    /// Contents of every `{{ }}` block
    fn expression_blocks(sql: &str) -> Vec<&str> {
        let mut blocks = Vec::new();
        let mut start = 0;

        while let Some(open) = sql[start..].find("{{") {
            let open_pos = start + open;
            let Some(close) = sql[open_pos..].find("}}") else {
                break;
            };
            let close_pos = open_pos + close;
            blocks.push(&sql[open_pos + 2..close_pos]);
            start = close_pos + 2;
        }

        blocks
    }

    /// `name(<inner>)` -> `<inner>`
    fn call_inner<'a>(content: &'a str, name: &str) -> Option<&'a str> {
        let rest = content.strip_prefix(name)?.trim_start();
        rest.strip_prefix('(')?.strip_suffix(')')
    }

    /// Positional string-literal arguments of `name(...)`
    fn call_arguments(content: &str, name: &str) -> Option<Vec<String>> {
        let inner = Self::call_inner(content, name)?;
        inner
            .split(',')
            .map(|arg| Self::extract_string_literal(arg).map(str::to_string))
            .collect()
    }

    /// `key='value', other="value"` pairs; non-literal values are skipped
    fn keyword_arguments(inner: &str) -> Vec<(String, String)> {
        inner
            .split(',')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                let value = Self::extract_string_literal(value)?;
                Some((key.trim().to_string(), value.to_string()))
            })
            .collect()
    }

    /// Extract string literal from quoted string
    ///
    /// Handles both single and double quotes.
    fn extract_string_literal(s: &str) -> Option<&str> {
        let trimmed = s.trim();

        if let Some(content) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Some(content);
        }

        if let Some(content) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Some(content);
        }

        None
    }
}
