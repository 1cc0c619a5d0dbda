//! Field translation
//!
//! Maps a logical field name to the physical paths it covers, with an
//! optional transform applied to values before comparison. The table is
//! built once and read concurrently by every request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named value transform
#[derive(Clone)]
pub struct ValueTransform {
    name: String,
    func: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl ValueTransform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Built-in transforms available from configuration
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "lowercase" => Some(Self::new(name, |v| v.to_lowercase())),
            "uppercase" => Some(Self::new(name, |v| v.to_uppercase())),
            "trim" => Some(Self::new(name, |v| v.trim().to_string())),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: &str) -> String {
        (self.func)(value)
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueTransform").field(&self.name).finish()
    }
}

/// Physical paths behind one logical field
#[derive(Debug, Clone)]
pub struct FieldTranslation {
    pub paths: Vec<String>,
    pub transform: Option<ValueTransform>,
}

impl FieldTranslation {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The value as it must be compared against the physical paths
    pub fn transform(&self, value: &str) -> String {
        match &self.transform {
            Some(t) => t.apply(value),
            None => value.to_string(),
        }
    }
}

/// Immutable logical-field lookup
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: HashMap<String, FieldTranslation>,
}

impl TranslationTable {
    pub fn builder() -> TranslationTableBuilder {
        TranslationTableBuilder::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldTranslation> {
        self.entries.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Physical paths of `field`; untranslated fields map to `datatype.field`
    pub fn physical_paths(&self, datatype: &str, field: &str) -> Vec<String> {
        match self.entries.get(field) {
            Some(translation) => translation.paths.clone(),
            None => vec![format!("{}.{}", datatype, field)],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TranslationTableBuilder {
    entries: HashMap<String, FieldTranslation>,
}

impl TranslationTableBuilder {
    pub fn translate(mut self, field: impl Into<String>, translation: FieldTranslation) -> Self {
        self.entries.insert(field.into(), translation);
        self
    }

    pub fn build(self) -> TranslationTable {
        TranslationTable {
            entries: self.entries,
        }
    }
}
