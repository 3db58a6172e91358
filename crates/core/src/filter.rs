//! Search filters and their normalization into the remote domain format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime;
use crate::error::CoreError;
use crate::field::{FieldType, Schema};
use crate::field_value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    /// Prefix token on the wire. `And` is implicit and has none.
    pub fn wire_token(&self) -> Option<&'static str> {
        match self {
            Self::And => None,
            Self::Or => Some("|"),
            Self::Not => Some("!"),
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "&" => Some(Self::And),
            "|" => Some(Self::Or),
            "!" => Some(Self::Not),
            _ => None,
        }
    }
}

/// One `(field, comparison, value)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub field: String,
    pub comparison: String,
    pub value: FieldValue,
}

impl Criterion {
    pub fn new(
        field: impl Into<String>,
        comparison: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            field: field.into(),
            comparison: comparison.into(),
            value: value.into(),
        }
    }

    /// Equality condition, the default comparison.
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, "=", value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    Operator(LogicalOperator),
    Criterion(Criterion),
}

/// Ordered list of criteria and prefix logical operators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<FilterTerm>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        self,
        field: impl Into<String>,
        comparison: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<Self, CoreError> {
        self.add_criterion(Criterion::new(field, comparison, value))
    }

    pub fn add_criterion(mut self, criterion: Criterion) -> Result<Self, CoreError> {
        check_criterion(&criterion)?;
        self.terms.push(FilterTerm::Criterion(criterion));
        Ok(self)
    }

    pub fn operator(mut self, operator: LogicalOperator) -> Self {
        self.terms.push(FilterTerm::Operator(operator));
        self
    }

    pub fn insert(&mut self, index: usize, term: FilterTerm) -> Result<(), CoreError> {
        if let FilterTerm::Criterion(criterion) = &term {
            check_criterion(criterion)?;
        }
        if index > self.terms.len() {
            return Err(CoreError::MalformedFilter(format!(
                "index {index} is past the end of a filter with {} terms",
                self.terms.len()
            )));
        }
        self.terms.insert(index, term);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }

    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Parses a raw domain such as `["|", ["a", "=", 1], ["b", "=", 2]]`.
    pub fn from_wire(domain: &Value) -> Result<Self, CoreError> {
        let Value::Array(items) = domain else {
            return Err(CoreError::MalformedFilter("filter must be a list".to_string()));
        };
        let mut filter = Self::new();
        for item in items {
            match item {
                Value::String(token) => {
                    let operator = LogicalOperator::parse(token).ok_or_else(|| {
                        CoreError::MalformedFilter(format!("unknown logical operator '{token}'"))
                    })?;
                    filter = filter.operator(operator);
                }
                Value::Array(parts) => {
                    let [field, comparison, value] = parts.as_slice() else {
                        return Err(CoreError::MalformedFilter(format!(
                            "expected 3 elements, got {}",
                            parts.len()
                        )));
                    };
                    let (Some(field), Some(comparison)) = (field.as_str(), comparison.as_str())
                    else {
                        return Err(CoreError::MalformedFilter(
                            "field name and comparison are mandatory".to_string(),
                        ));
                    };
                    filter = filter.add(field, comparison, FieldValue::from_wire(value))?;
                }
                other => {
                    return Err(CoreError::MalformedFilter(format!(
                        "unexpected filter entry {other}"
                    )));
                }
            }
        }
        Ok(filter)
    }
}

fn check_criterion(criterion: &Criterion) -> Result<(), CoreError> {
    if criterion.field.is_empty() {
        return Err(CoreError::MalformedFilter(
            "field name is mandatory".to_string(),
        ));
    }
    if criterion.comparison.is_empty() {
        return Err(CoreError::MalformedFilter(
            "comparison is mandatory".to_string(),
        ));
    }
    Ok(())
}

/// Validates `filter` against `schema` and rewrites it into the wire domain.
pub fn normalize(filter: &Filter, schema: &Schema) -> Result<Vec<Value>, CoreError> {
    let mut domain = Vec::with_capacity(filter.len());
    for term in filter.terms() {
        match term {
            FilterTerm::Operator(operator) => {
                if let Some(token) = operator.wire_token() {
                    domain.push(Value::String(token.to_string()));
                }
            }
            FilterTerm::Criterion(criterion) => {
                domain.push(normalize_criterion(criterion, schema)?);
            }
        }
    }
    Ok(domain)
}

fn normalize_criterion(criterion: &Criterion, schema: &Schema) -> Result<Value, CoreError> {
    check_criterion(criterion)?;
    let name = criterion.field.as_str();
    let is_id = name == "id";

    let field = schema.get(name);
    if field.is_none() && !is_id {
        return Err(CoreError::UnknownField(name.to_string()));
    }
    if let Some(field) = field
        && field.computed
    {
        return Err(CoreError::ComputedFieldFilter(name.to_string()));
    }

    let field_type = field.map(|field| field.field_type);
    let (comparison, value) = match criterion.comparison.as_str() {
        "is null" => ("=", FieldValue::Boolean(false)),
        "is not null" => ("!=", FieldValue::Boolean(false)),
        comparison => (
            comparison,
            coerce(name, field_type, comparison, &criterion.value)?,
        ),
    };

    Ok(Value::Array(vec![
        Value::String(name.to_string()),
        Value::String(comparison.to_string()),
        value.to_wire(),
    ]))
}

/// Field-type driven coercion of a filter value. The first matching rule wins.
fn coerce(
    name: &str,
    field_type: Option<FieldType>,
    comparison: &str,
    value: &FieldValue,
) -> Result<FieldValue, CoreError> {
    let is_id = name == "id";
    match (field_type, value) {
        (_, FieldValue::Null) => Ok(FieldValue::Null),
        (Some(FieldType::Boolean), value) if value.as_boolean().is_none() => {
            parse_boolean(&value.to_string()).map(FieldValue::Boolean)
        }
        (Some(FieldType::Float), value) if value.as_float().is_none() => {
            to_float(name, value).map(FieldValue::Float)
        }
        (Some(FieldType::Date), FieldValue::Date(date)) => {
            Ok(FieldValue::Text(datetime::format_date(*date)))
        }
        (Some(FieldType::Date), FieldValue::DateTime(dt)) => {
            Ok(FieldValue::Text(datetime::format_date(dt.date())))
        }
        (Some(FieldType::DateTime), FieldValue::DateTime(dt)) => {
            Ok(FieldValue::Text(datetime::format_filter_datetime(*dt)))
        }
        (Some(FieldType::DateTime), FieldValue::Date(date)) => Ok(FieldValue::Text(
            datetime::format_filter_datetime(date.midnight()),
        )),
        (ty, value)
            if comparison == "="
                && (is_id || matches!(ty, Some(FieldType::Integer | FieldType::Many2One))) =>
        {
            to_integer(name, value).map(FieldValue::Integer)
        }
        (ty, value) if comparison.eq_ignore_ascii_case("in") => {
            let ids = is_id || ty.is_some_and(|ty| ty.holds_ids());
            expand_in(name, value, ids)
        }
        (_, value) => Ok(value.clone()),
    }
}

/// Interprets the first character: `1`/`y`/`t` is true, `0`/`n`/`f` is false.
pub fn parse_boolean(value: &str) -> Result<bool, CoreError> {
    match value.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('1' | 'y' | 't') => Ok(true),
        Some('0' | 'n' | 'f') => Ok(false),
        _ => Err(CoreError::UnknownBoolean(value.to_string())),
    }
}

fn to_float(name: &str, value: &FieldValue) -> Result<f64, CoreError> {
    let invalid = || CoreError::InvalidNumber {
        field: name.to_string(),
        value: value.to_string(),
    };
    match value {
        FieldValue::Integer(n) => Ok(*n as f64),
        FieldValue::Float(n) => Ok(*n),
        FieldValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn to_integer(name: &str, value: &FieldValue) -> Result<i64, CoreError> {
    let invalid = || CoreError::InvalidInteger {
        field: name.to_string(),
        value: value.to_string(),
    };
    match value {
        FieldValue::Integer(n) => Ok(*n),
        FieldValue::Float(n) if n.fract() == 0.0 => Ok(*n as i64),
        FieldValue::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        FieldValue::List(_) => value.as_id().ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn expand_in(name: &str, value: &FieldValue, ids: bool) -> Result<FieldValue, CoreError> {
    match value {
        FieldValue::Text(text) => {
            let mut items = Vec::new();
            for token in split_unescaped(text) {
                let token = csv_unescape(&token);
                if ids {
                    items.push(FieldValue::Integer(to_integer(name, &FieldValue::Text(token))?));
                } else {
                    items.push(FieldValue::Text(token));
                }
            }
            Ok(FieldValue::List(items))
        }
        FieldValue::List(_) => Ok(value.clone()),
        other => Ok(FieldValue::List(vec![other.clone()])),
    }
}

/// Splits on commas that are not directly preceded by a backslash.
/// Trailing empty tokens are dropped.
pub fn split_unescaped(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut previous = None;
    for ch in input.chars() {
        if ch == ',' && previous != Some('\\') {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
        previous = Some(ch);
    }
    parts.push(current);
    while parts.len() > 1 && parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    parts
}

/// Drops the backslash in front of every escaped character.
pub fn csv_unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next().unwrap_or('\\'));
        } else {
            out.push(ch);
        }
    }
    out
}
