/// Literal text normalization applied before a name is sent to the model.
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubstitutionError {
    #[error("failed to read substitution table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("substitution table must be a JSON object of strings: {0}")]
    Parse(String),
}

/// Ordered literal replacement rules.
///
/// Rules are kept longest key first, so an overlapping longer key always wins
/// over a shorter key it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    rules: Vec<(String, String)>,
}

impl SubstitutionTable {
    pub fn new<I, K, V>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rules: Vec<(String, String)> = rules
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        // Stable: equal-length keys keep their incoming order.
        rules.sort_by(|(a, _), (b, _)| b.chars().count().cmp(&a.chars().count()));
        Self { rules }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SubstitutionError> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| SubstitutionError::Parse(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SubstitutionError::Parse("top level is not an object".into()));
        };
        Self::from_map(map)
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, SubstitutionError> {
        let mut rules = Vec::with_capacity(map.len());
        for (key, value) in map {
            match value {
                Value::String(replacement) => rules.push((key, replacement)),
                other => {
                    return Err(SubstitutionError::Parse(format!(
                        "value for {key:?} is not a string: {other}"
                    )))
                }
            }
        }
        Ok(Self::new(rules))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SubstitutionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SubstitutionError::Read {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Replaces every occurrence of every key, longest key first. Each later
    /// key runs over the output of the earlier ones.
    pub fn apply(&self, text: &str) -> String {
        let mut output = text.to_string();
        for (key, replacement) in &self.rules {
            if output.contains(key.as_str()) {
                output = output.replace(key.as_str(), replacement);
            }
        }
        output
    }
}

/// Applies `table` when one is configured.
pub fn apply(text: &str, table: Option<&SubstitutionTable>) -> String {
    match table {
        Some(table) => table.apply(text),
        None => text.to_string(),
    }
}
