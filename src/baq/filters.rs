use std::fmt;

use serde_json::Value;

use crate::baq::error::QueryError;

/// One filter value as sent to the BAQ service.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterScalar {
    /// Textual value, rendered single-quoted.
    Text(String),
    /// Integer value, rendered bare.
    Integer(i64),
    /// Floating point value, rendered bare.
    Float(f64),
}

impl FilterScalar {
    /// Parses a command-line style value.
    ///
    /// An unquoted value becomes a number only when the number renders back to
    /// exactly the input, so `0042`, `+7` and `1E5` stay text. Anything wrapped
    /// in single quotes is always text (with the quotes removed).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            return Self::Text(trimmed[1..trimmed.len() - 1].to_string());
        }
        if let Ok(number) = trimmed.parse::<i64>()
            && number.to_string() == trimmed
        {
            return Self::Integer(number);
        }
        if let Ok(number) = trimmed.parse::<f64>()
            && number.is_finite()
            && Self::Float(number).normalized() == trimmed
        {
            return Self::Float(number);
        }
        Self::Text(trimmed.to_string())
    }

    fn from_json(key: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Self::Integer(integer))
                } else if let Some(float) = number.as_f64() {
                    Ok(Self::Float(float))
                } else {
                    Err(QueryError::InvalidFilterValue {
                        key: key.to_string(),
                        reason: format!("number {number} is out of range"),
                    })
                }
            }
            other => Err(QueryError::InvalidFilterValue {
                key: key.to_string(),
                reason: format!("expected a string or number, got {}", json_kind(other)),
            }),
        }
    }

    /// String form used when comparing requested values with returned ones.
    pub fn normalized(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(number) => number.to_string(),
            Self::Float(number) => serde_json::Number::from_f64(*number)
                .map(|number| number.to_string())
                .unwrap_or_else(|| number.to_string()),
        }
    }

    /// Renders an `eq` clause for this value.
    pub fn eq_clause(&self, key: &str) -> String {
        format!("{key} eq {self}")
    }
}

impl fmt::Display for FilterScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            Self::Integer(_) | Self::Float(_) => f.write_str(&self.normalized()),
        }
    }
}

impl From<&str> for FilterScalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterScalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterScalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterScalar {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterScalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A filter is either one value or a list of alternatives.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(FilterScalar),
    List(Vec<FilterScalar>),
}

impl FilterValue {
    /// Builds a list filter from anything convertible to scalars.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterScalar>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// Renders the clause for this filter under `key`.
    pub fn clause(&self, key: &str) -> String {
        match self {
            Self::Scalar(value) => value.eq_clause(key),
            Self::List(values) => or_clause(key, values),
        }
    }
}

impl From<FilterScalar> for FilterValue {
    fn from(value: FilterScalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<FilterScalar>> for FilterValue {
    fn from(values: Vec<FilterScalar>) -> Self {
        Self::List(values)
    }
}

macro_rules! scalar_filter_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Scalar(FilterScalar::from(value))
                }
            }
        )*
    };
}

scalar_filter_from!(&str, String, i64, i32, f64);

pub(crate) fn or_clause(key: &str, values: &[FilterScalar]) -> String {
    let alternatives = values
        .iter()
        .map(|value| value.eq_clause(key))
        .collect::<Vec<_>>();
    format!("({})", alternatives.join(" or "))
}

/// Insertion-ordered filter mapping.
///
/// Key order drives both the `$filter` clause order and the enumeration order
/// of batch combinations, so two identical inputs always plan identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    entries: Vec<(String, FilterValue)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a filter; a replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| *existing == key)
        {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Filters::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a JSON object of `key: value | [values]`, keeping key order.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let object = value.as_object().ok_or_else(|| QueryError::InvalidFilters {
            reason: format!("expected a JSON object, got {}", json_kind(value)),
        })?;

        let mut filters = Self::new();
        for (key, value) in object {
            let filter = match value {
                Value::Array(items) => FilterValue::List(
                    items
                        .iter()
                        .map(|item| FilterScalar::from_json(key, item))
                        .collect::<Result<_, _>>()?,
                ),
                other => FilterValue::Scalar(FilterScalar::from_json(key, other)?),
            };
            filters.insert(key.clone(), filter);
        }
        Ok(filters)
    }

    /// Checks the shape constraints that the type system cannot express.
    pub fn validate(&self) -> Result<(), QueryError> {
        for (key, value) in self.iter() {
            if key.trim().is_empty() {
                return Err(QueryError::InvalidFilters {
                    reason: "filter keys must not be empty".to_string(),
                });
            }
            if let FilterValue::List(values) = value
                && values.is_empty()
            {
                return Err(QueryError::EmptyFilterList {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut filters = Self::new();
        for (key, value) in iter {
            filters.insert(key, value);
        }
        filters
    }
}

/// Field selection for `$select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Select {
    Field(String),
    Fields(Vec<String>),
}

impl Select {
    /// Parses a JSON string or array of strings.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::String(field) => Ok(Self::Field(field.clone())),
            Value::Array(items) => items
                .iter()
                .map(select_field)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Fields),
            other => Err(QueryError::InvalidSelect {
                reason: format!(
                    "select must be a string or a list of strings, got {}",
                    json_kind(other)
                ),
            }),
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Field(field) => vec![field.as_str()],
            Self::Fields(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        let fields = self.fields();
        if fields.is_empty() {
            return Err(QueryError::InvalidSelect {
                reason: "select list must not be empty".to_string(),
            });
        }
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err(QueryError::InvalidSelect {
                reason: "select field names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Comma-joined `$select` parameter value.
    pub fn to_param(&self) -> String {
        self.fields().join(",")
    }
}

impl From<&str> for Select {
    fn from(value: &str) -> Self {
        Self::Field(value.to_string())
    }
}

impl From<Vec<&str>> for Select {
    fn from(value: Vec<&str>) -> Self {
        Self::Fields(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Select {
    fn from(value: Vec<String>) -> Self {
        Self::Fields(value)
    }
}

fn select_field(item: &Value) -> Result<String, QueryError> {
    match item {
        Value::String(field) => Ok(field.clone()),
        other => Err(QueryError::InvalidSelect {
            reason: format!("select entries must be strings, got {}", json_kind(other)),
        }),
    }
}

/// A named BAQ call with its selection and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query_name: String,
    pub select: Option<Select>,
    pub filters: Filters,
}

impl QueryRequest {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            select: None,
            filters: Filters::new(),
        }
    }

    pub fn select(mut self, select: impl Into<Select>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(key, value);
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.query_name.trim().is_empty() {
            return Err(QueryError::EmptyQueryName);
        }
        if let Some(select) = &self.select {
            select.validate()?;
        }
        self.filters.validate()
    }
}

/// Stringifies a response cell; `null` is absent.
pub fn normalize_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterScalar, FilterValue, Filters, QueryRequest, Select, normalize_cell};
    use crate::baq::error::QueryError;
    use serde_json::json;

    fn text(value: &str) -> FilterScalar {
        FilterScalar::Text(value.to_string())
    }

    #[test]
    fn text_and_numeric_values_quote_differently() {
        let po = FilterScalar::from("ABC");
        assert_eq!(po.eq_clause("PONum"), "PONum eq 'ABC'");
        let order = FilterScalar::from(1001);
        assert_eq!(order.eq_clause("OrderNum"), "OrderNum eq 1001");
        let qty = FilterScalar::from(2.5);
        assert_eq!(qty.eq_clause("Qty"), "Qty eq 2.5");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let name = FilterScalar::from("O'Brien");
        assert_eq!(name.eq_clause("Name"), "Name eq 'O''Brien'");
    }

    #[test]
    fn list_clause_is_parenthesized_disjunction() {
        let value = FilterValue::list([1, 2, 3]);
        assert_eq!(
            value.clause("OrderNum"),
            "(OrderNum eq 1 or OrderNum eq 2 or OrderNum eq 3)"
        );
    }

    #[test]
    fn parse_recognizes_numbers_and_quoted_text() {
        assert_eq!(FilterScalar::parse("42"), FilterScalar::Integer(42));
        assert_eq!(FilterScalar::parse("-12"), FilterScalar::Integer(-12));
        assert_eq!(FilterScalar::parse("4.5"), FilterScalar::Float(4.5));
        assert_eq!(FilterScalar::parse("2.0"), FilterScalar::Float(2.0));
        assert_eq!(FilterScalar::parse("'42'"), text("42"));
        assert_eq!(FilterScalar::parse("ABC-1"), text("ABC-1"));
        assert_eq!(FilterScalar::parse("nan"), text("nan"));
    }

    #[test]
    fn parse_keeps_non_canonical_numbers_as_text() {
        for raw in ["0042", "+7", "1E5", "1.50", "-0"] {
            assert_eq!(FilterScalar::parse(raw), text(raw), "{raw}");
        }
        assert_eq!(FilterScalar::parse("0042").normalized(), "0042");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut filters = Filters::new();
        filters.insert("A", 1);
        filters.insert("B", 2);
        filters.insert("A", 3);

        let keys = filters.iter().map(|(key, _)| key).collect::<Vec<_>>();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(filters.get("A"), Some(&FilterValue::from(3)));
    }

    #[test]
    fn from_json_keeps_key_order() {
        let filters = Filters::from_json(&json!({
            "Zeta": "x",
            "Alpha": [1, 2],
            "Mid": 3.5
        }))
        .expect("filters should parse");

        let keys = filters.iter().map(|(key, _)| key).collect::<Vec<_>>();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(filters.get("Alpha"), Some(&FilterValue::list([1, 2])));
    }

    #[test]
    fn from_json_rejects_nested_values() {
        let err = Filters::from_json(&json!({"A": {"b": 1}})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterValue { key, .. } if key == "A"));

        let err = Filters::from_json(&json!({"A": [true]})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterValue { .. }));

        let err = Filters::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilters { .. }));
    }

    #[test]
    fn select_accepts_string_or_string_list() {
        let single = Select::from_json(&json!("OrderNum")).unwrap();
        assert_eq!(single.to_param(), "OrderNum");
        let many = Select::from_json(&json!(["OrderNum", "PONum"])).unwrap();
        assert_eq!(many.to_param(), "OrderNum,PONum");

        let err = Select::from_json(&json!(5)).unwrap_err();
        assert!(matches!(err, QueryError::InvalidSelect { .. }));
        let err = Select::from_json(&json!(["OrderNum", 5])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidSelect { .. }));
    }

    #[test]
    fn request_validation_catches_bad_shapes() {
        let err = QueryRequest::new("  ").validate().unwrap_err();
        assert!(matches!(err, QueryError::EmptyQueryName));

        let no_fields = QueryRequest::new("OrdersQ").select(Vec::<String>::new());
        let err = no_fields.validate().unwrap_err();
        assert!(matches!(err, QueryError::InvalidSelect { .. }));

        let empty_list = QueryRequest::new("OrdersQ")
            .filter("OrderNum", FilterValue::List(Vec::new()));
        let err = empty_list.validate().unwrap_err();
        assert!(matches!(err, QueryError::EmptyFilterList { key } if key == "OrderNum"));

        let valid = QueryRequest::new("OrdersQ")
            .select(vec!["OrderNum"])
            .filter("OrderNum", FilterValue::list([1]));
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn normalization_matches_between_request_and_response() {
        let id = FilterScalar::from(525224).normalized();
        assert_eq!(normalize_cell(&json!(525224)), Some(id));
        let qty = FilterScalar::from(2.5).normalized();
        assert_eq!(normalize_cell(&json!(2.5)), Some(qty));
        assert_eq!(normalize_cell(&json!("A1")), Some("A1".to_string()));
        assert_eq!(normalize_cell(&json!(null)), None);
    }
}
