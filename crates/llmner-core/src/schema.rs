//! # Label Schema
//!
//! Fixed, ordered mapping between integer label IDs and BIO2 tag names.
//! The same schema is used to build prompts, validate model output and
//! translate IDs back to tags for scoring.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

/// CoNLL-2003 NER tags in the order used by the Hugging Face dataset.
pub const CONLL2003_LABELS: &[&str] = &[
    "O", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC", "B-MISC", "I-MISC",
];

/// Position of a token inside an entity chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Begin,
    Inside,
    Outside,
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Begin => write!(f, "B"),
            Prefix::Inside => write!(f, "I"),
            Prefix::Outside => write!(f, "O"),
        }
    }
}

/// Split a BIO tag into its prefix and entity type.
///
/// `"B-PER"` gives `(Begin, "PER")`, `"O"` gives `(Outside, "")`. Tags without
/// a recognised `B-`/`I-` prefix are treated as inside tokens of their own type,
/// which is how conlleval treats them.
pub fn split_tag(tag: &str) -> (Prefix, &str) {
    if tag == "O" || tag.is_empty() {
        return (Prefix::Outside, "");
    }
    match tag.split_once('-') {
        Some(("B", kind)) => (Prefix::Begin, kind),
        Some(("I", kind)) => (Prefix::Inside, kind),
        _ => (Prefix::Inside, tag),
    }
}

/// Ordered list of distinct tag names, inducing `name <-> id` in `[0, len)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSchema {
    names: Vec<String>,
    name_to_id: HashMap<String, usize>,
}

impl LabelSchema {
    /// Build a schema from ordered tag names.
    ///
    /// Fails when the list is empty or a name appears twice.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(NerError::InvalidSchema("label list is empty".into()));
        }

        let mut name_to_id = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if name_to_id.insert(name.clone(), id).is_some() {
                return Err(NerError::InvalidSchema(format!("duplicate label {name:?}")));
            }
        }

        Ok(Self { names, name_to_id })
    }

    /// The 9-tag CoNLL-2003 BIO2 schema.
    pub fn conll2003() -> Self {
        Self {
            names: CONLL2003_LABELS.iter().map(|s| s.to_string()).collect(),
            name_to_id: CONLL2003_LABELS
                .iter()
                .enumerate()
                .map(|(id, s)| (s.to_string(), id))
                .collect(),
        }
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Tag names, index aligned with their IDs.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Look up the ID of a tag name.
    pub fn id(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }

    /// Look up the tag name of an ID.
    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// The `name -> id` table.
    pub fn name_to_id(&self) -> &HashMap<String, usize> {
        &self.name_to_id
    }

    /// The `id -> name` table in the shape the evaluator expects.
    pub fn id2label(&self) -> BTreeMap<usize, String> {
        self.names.iter().cloned().enumerate().collect()
    }

    /// Check that every ID is a valid index into this schema.
    pub fn contains_all(&self, ids: &[usize]) -> bool {
        ids.iter().all(|&id| id < self.len())
    }
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self::conll2003()
    }
}

impl TryFrom<Vec<String>> for LabelSchema {
    type Error = NerError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<LabelSchema> for Vec<String> {
    fn from(schema: LabelSchema) -> Self {
        schema.names
    }
}

impl fmt::Display for LabelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conll_schema() {
        let schema = LabelSchema::conll2003();
        assert_eq!(schema.len(), 9);
        assert_eq!(schema.id("O"), Some(0));
        assert_eq!(schema.id("I-MISC"), Some(8));
        assert_eq!(schema.name(5), Some("B-LOC"));
        assert_eq!(schema.name(9), None);
    }

    #[test]
    fn test_name_id_roundtrip() {
        let schema = LabelSchema::conll2003();
        for name in schema.names() {
            let id = schema.id(name).unwrap();
            assert_eq!(schema.name(id), Some(name.as_str()));
        }
        for (id, name) in schema.id2label() {
            assert_eq!(schema.id(&name), Some(id));
        }
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(LabelSchema::new(Vec::<String>::new()).is_err());
        let err = LabelSchema::new(["O", "B-PER", "O"]).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_custom_schema_matches_constructor() {
        let schema = LabelSchema::new(CONLL2003_LABELS.iter().copied()).unwrap();
        assert_eq!(schema, LabelSchema::conll2003());
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("B-PER"), (Prefix::Begin, "PER"));
        assert_eq!(split_tag("I-MISC"), (Prefix::Inside, "MISC"));
        assert_eq!(split_tag("O"), (Prefix::Outside, ""));
        assert_eq!(split_tag("LOC"), (Prefix::Inside, "LOC"));
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let json = serde_json::to_string(&LabelSchema::conll2003()).unwrap();
        assert!(json.starts_with("[\"O\""));
        let back: LabelSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 9);
        assert!(serde_json::from_str::<LabelSchema>("[]").is_err());
    }

    #[test]
    fn test_contains_all() {
        let schema = LabelSchema::conll2003();
        assert!(schema.contains_all(&[0, 1, 8]));
        assert!(!schema.contains_all(&[0, 9]));
    }
}
