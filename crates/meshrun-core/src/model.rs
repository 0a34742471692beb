//! Shared model vocabulary: materializations, references, relations

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Physical form a model is persisted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// `create or replace view <name> as <select>`
    #[default]
    View,

    /// `create table <name> as <select>`, swapped in atomically
    Table,
}

impl Materialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Table => "table",
        }
    }
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Materialization {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Self::View),
            "table" => Ok(Self::Table),
            _ => Err(ParseEnumError {
                kind: "materialization",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether other projects may `ref` a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    #[serde(alias = "protected")]
    Private,
    Public,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Access {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" | "protected" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            _ => Err(ParseEnumError {
                kind: "access",
                value: s.to_string(),
            }),
        }
    }
}

/// Unknown value for a config enum
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// A logical reference marker found in a model template
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reference {
    /// `source('namespace', 'name')`
    Source { namespace: String, name: String },

    /// `ref('name')`
    Model { name: String },

    /// `ref('project', 'name')` - a public model of an upstream project
    Upstream { project: String, name: String },
}

impl Reference {
    pub fn source(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Source {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn model(name: impl Into<String>) -> Self {
        Self::Model { name: name.into() }
    }

    pub fn upstream(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Upstream {
            project: project.into(),
            name: name.into(),
        }
    }

    /// Manifest unique_id of the referent, from the point of view of `project`
    ///
    /// - `source.<project>.<namespace>.<name>`
    /// - `model.<project>.<name>`
    /// - `model.<upstream>.<name>`
    pub fn unique_id(&self, project: &str) -> String {
        match self {
            Self::Source { namespace, name } => format!("source.{}.{}.{}", project, namespace, name),
            Self::Model { name } => format!("model.{}.{}", project, name),
            Self::Upstream { project: upstream, name } => format!("model.{}.{}", upstream, name),
        }
    }

    /// Name of the model this reference points at, if it is a local model
    pub fn local_model(&self) -> Option<&str> {
        match self {
            Self::Model { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { namespace, name } => write!(f, "source('{}', '{}')", namespace, name),
            Self::Model { name } => write!(f, "ref('{}')", name),
            Self::Upstream { project, name } => write!(f, "ref('{}', '{}')", project, name),
        }
    }
}

/// Physical location of a model in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Schema name
    pub schema: String,

    /// Relation (view or table) name
    pub name: String,
}

impl Relation {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name`
    pub fn parse(qualified: &str) -> Option<Self> {
        let (schema, name) = qualified.split_once('.')?;
        if schema.is_empty() || name.is_empty() || name.contains('.') {
            return None;
        }
        Some(Self::new(schema, name))
    }

    /// Whether `name` can be used unquoted as a schema or relation name
    pub fn is_valid_identifier(name: &str) -> bool {
        static IDENT: OnceLock<Regex> = OnceLock::new();
        IDENT
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
            .is_match(name)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}
