use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of field types the remote store reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Char,
    Text,
    Binary,
    Boolean,
    Float,
    DateTime,
    Date,
    Many2One,
    One2Many,
    Many2Many,
    Selection,
}

impl FieldType {
    pub const ALL: [FieldType; 12] = [
        Self::Integer,
        Self::Char,
        Self::Text,
        Self::Binary,
        Self::Boolean,
        Self::Float,
        Self::DateTime,
        Self::Date,
        Self::Many2One,
        Self::One2Many,
        Self::Many2Many,
        Self::Selection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Char => "char",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::Float => "float",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Many2One => "many2one",
            Self::One2Many => "one2many",
            Self::Many2Many => "many2many",
            Self::Selection => "selection",
        }
    }

    /// Unrecognized tags fall back to `Char`; discovery never fails on a type.
    pub fn from_tag(tag: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(tag.trim()))
            .unwrap_or(Self::Char)
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, Self::Many2One | Self::One2Many | Self::Many2Many)
    }

    /// Types whose values are integers or lists of record ids.
    pub fn holds_ids(&self) -> bool {
        matches!(self, Self::Integer | Self::Many2One) || self.is_relational()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOption {
    /// Value stored by the remote store.
    pub code: String,
    /// Value shown to users.
    pub label: String,
}

impl SelectionOption {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Description of one remote field, discovered at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    /// Target model for relational fields, empty otherwise.
    pub relation: String,
    pub description: String,
    pub help: Option<String>,
    pub size: i64,
    pub selection: Vec<SelectionOption>,
    pub required: bool,
    pub read_only: bool,
    pub stored: bool,
    pub computed: bool,
    pub selectable: bool,
    /// Attribute map exactly as discovered.
    pub attributes: Map<String, Value>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            field_type,
            relation: String::new(),
            help: None,
            size: 64,
            selection: Vec::new(),
            required: false,
            read_only: false,
            stored: true,
            computed: false,
            selectable: true,
            attributes: Map::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    pub fn with_selection(mut self, options: &[(&str, &str)]) -> Self {
        self.selection = options
            .iter()
            .map(|(code, label)| SelectionOption::new(*code, *label))
            .collect();
        self
    }

    /// Builds a schema from the attribute map the remote store reports for a field.
    /// Every flag has its own default when absent.
    pub fn from_attributes(name: impl Into<String>, attributes: &Map<String, Value>) -> Self {
        let name = name.into();
        let field_type = attributes
            .get("type")
            .and_then(Value::as_str)
            .map_or(FieldType::Char, FieldType::from_tag);

        let selection = if field_type == FieldType::Selection {
            parse_selection(attributes.get("selection"))
        } else {
            Vec::new()
        };

        let computed = flag(attributes.get("func_method"), false)
            || attributes
                .get("compute")
                .and_then(Value::as_str)
                .is_some_and(|method| !method.is_empty());

        Self {
            description: attributes
                .get("string")
                .and_then(Value::as_str)
                .map_or_else(|| name.clone(), str::to_string),
            field_type,
            relation: attributes
                .get("relation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            help: attributes
                .get("help")
                .and_then(Value::as_str)
                .map(str::to_string),
            size: attributes.get("size").and_then(Value::as_i64).unwrap_or(64),
            selection,
            required: flag(attributes.get("required"), false),
            read_only: flag(attributes.get("readonly"), false),
            stored: flag(attributes.get("store"), true),
            computed,
            selectable: flag(attributes.get("selectable"), true),
            attributes: attributes.clone(),
            name,
        }
    }

    /// Raw attribute as reported by the remote store.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Per-state overrides of `property`, as `(state, value)` pairs.
    pub fn state_properties(&self, property: &str) -> Vec<(String, Value)> {
        let Some(states) = self.attributes.get("states").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut values = Vec::new();
        for (state, overrides) in states {
            for entry in overrides.as_array().into_iter().flatten() {
                if let Some([key, value]) = entry.as_array().map(Vec::as_slice)
                    && key.as_str() == Some(property)
                {
                    values.push((state.clone(), value.clone()));
                }
            }
        }
        values
    }

    pub fn selection_option(&self, value: &str) -> Option<&SelectionOption> {
        self.selection
            .iter()
            .find(|option| option.code == value || option.label == value)
    }
}

/// Booleans may arrive as `true`/`false` or as `1`/`0`.
fn flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => default,
    }
}

fn parse_selection(value: Option<&Value>) -> Vec<SelectionOption> {
    let Some(Value::Array(options)) = value else {
        return Vec::new();
    };
    options
        .iter()
        .filter_map(|option| match option.as_array().map(Vec::as_slice) {
            Some([code, label, ..]) => Some(SelectionOption::new(plain(code), plain(label))),
            _ => None,
        })
        .collect()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Ordered field schemas of one model, shared read-only by its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    /// Builds from a `name -> attributes` map as returned by field discovery.
    pub fn from_wire(fields: &Map<String, Value>) -> Self {
        let empty = Map::new();
        Self::new(
            fields
                .iter()
                .map(|(name, attrs)| {
                    FieldSchema::from_attributes(name.as_str(), attrs.as_object().unwrap_or(&empty))
                })
                .collect(),
        )
    }

    /// Derives a schema from one sample result row of an ad-hoc function call.
    ///
    /// A value that is itself a map is taken as the field's attributes; missing
    /// attributes are filled in from the key and the sample value.
    pub fn infer_from_sample(row: &Map<String, Value>) -> Self {
        let fields = row
            .iter()
            .map(|(key, sample)| {
                let mut attrs = sample.as_object().cloned().unwrap_or_default();
                attrs
                    .entry("name")
                    .or_insert_with(|| Value::String(key.clone()));
                attrs
                    .entry("string")
                    .or_insert_with(|| Value::String(key.clone()));
                attrs.entry("type").or_insert_with(|| {
                    let inferred = match sample {
                        Value::Bool(_) => FieldType::Boolean,
                        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
                        Value::Number(_) => FieldType::Float,
                        _ => FieldType::Char,
                    };
                    Value::String(inferred.as_str().to_string())
                });
                FieldSchema::from_attributes(key.as_str(), &attrs)
            })
            .collect();
        Self::new(fields)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldSchema> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    /// Schemas for `names`, in the order given. Unknown names are skipped.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self::new(
            names
                .iter()
                .filter_map(|name| self.get(name.as_ref()).cloned())
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a FieldSchema;
    type IntoIter = std::slice::Iter<'a, FieldSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
