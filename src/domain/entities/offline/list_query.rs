use super::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// ペイロードのフィールドに対するメモリ内フィルタ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RecordFilter {
    Eq { field: String, value: Value },
    NotEq { field: String, value: Value },
    /// 大文字小文字を区別しない部分一致
    Contains { field: String, needle: String },
    In { field: String, values: Vec<Value> },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
}

impl RecordFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        RecordFilter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        RecordFilter::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::Eq { field, value } => record.payload.get(field) == Some(value),
            RecordFilter::NotEq { field, value } => record.payload.get(field) != Some(value),
            RecordFilter::Contains { field, needle } => match record.payload.get(field) {
                Some(Value::String(s)) => s.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
            RecordFilter::In { field, values } => record
                .payload
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            RecordFilter::Gte { field, value } => record
                .payload
                .get(field)
                .and_then(|v| compare_values(v, value))
                .map(|ord| ord != Ordering::Less)
                .unwrap_or(false),
            RecordFilter::Lte { field, value } => record
                .payload
                .get(field)
                .and_then(|v| compare_values(v, value))
                .map(|ord| ord != Ordering::Greater)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<RecordFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut out: Vec<Record> = records
            .into_iter()
            .filter(|record| self.filters.iter().all(|f| f.matches(record)))
            .collect();

        if let Some(order) = &self.order_by {
            out.sort_by(|a, b| {
                compare_optional(
                    a.payload.get(&order.field),
                    b.payload.get(&order.field),
                    order.descending,
                )
            });
        }

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

// null / 欠損は常に末尾
fn compare_optional(a: Option<&Value>, b: Option<&Value>, descending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = compare_values(a, b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
    use chrono::Utc;
    use serde_json::json;

    fn record(id: &str, payload: Value) -> Record {
        Record::new(
            EntityType::new("clientes".into()).unwrap(),
            RecordId::new(id.into()).unwrap(),
            RecordPayload::new(payload).unwrap(),
            true,
            Utc::now(),
        )
    }

    fn sample() -> Vec<Record> {
        vec![
            record("1", json!({"nome": "Ana Souza", "pontos": 30})),
            record("2", json!({"nome": "Bruno", "pontos": 10})),
            record("3", json!({"nome": "Carla", "pontos": null})),
            record("4", json!({"nome": "ana lima", "pontos": 20})),
        ]
    }

    #[test]
    fn contains_is_case_insensitive() {
        let query = ListQuery::new().filter(RecordFilter::contains("nome", "ANA"));
        let ids: Vec<_> = query
            .apply(sample())
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn order_by_puts_missing_values_last() {
        let asc = ListQuery::new().order_by(OrderBy::asc("pontos")).apply(sample());
        let ids: Vec<_> = asc.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4", "1", "3"]);

        let desc = ListQuery::new()
            .order_by(OrderBy::desc("pontos"))
            .limit(2)
            .apply(sample());
        let ids: Vec<_> = desc.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn range_filters_compare_numbers() {
        let query = ListQuery::new()
            .filter(RecordFilter::Gte {
                field: "pontos".into(),
                value: json!(15),
            })
            .filter(RecordFilter::Lte {
                field: "pontos".into(),
                value: json!(25),
            });
        let ids: Vec<_> = query
            .apply(sample())
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["4"]);
    }
}
