//! Filter, sort and expand evaluation over plain JSON records.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use scriptflow_core_types::{Collection, Filter, Sort};

pub(crate) type Tables = HashMap<Collection, Vec<Value>>;

pub(crate) fn find<'a>(tables: &'a Tables, collection: Collection, id: &str) -> Option<&'a Value> {
    tables
        .get(&collection)?
        .iter()
        .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
}

/// Resolve a dotted path, hopping through relation fields.
pub(crate) fn resolve(tables: &Tables, record: &Value, path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = record;
    for (idx, segment) in segments.iter().enumerate() {
        let value = current.get(*segment)?;
        if idx + 1 == segments.len() {
            return scalar(value);
        }
        let related_id = value.as_str()?;
        let collection = Collection::for_relation(segment)?;
        current = find(tables, collection, related_id)?;
    }
    None
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

pub(crate) fn matches(tables: &Tables, record: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { path, value } => resolve(tables, record, path).as_deref() == Some(value),
        Filter::And(parts) => parts.iter().all(|part| matches(tables, record, part)),
    }
}

pub(crate) fn sort_records(records: &mut [Value], sort: &Sort) {
    if sort.0.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for key in &sort.0 {
            let ord = compare_json(a.get(&key.field), b.get(&key.field));
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Attach related records under `expand.<relation>`.
pub(crate) fn expand(tables: &Tables, record: &Value, relations: &[String]) -> Value {
    let mut out = record.clone();
    if relations.is_empty() {
        return out;
    }
    let mut expanded = Map::new();
    for relation in relations {
        let Some(collection) = Collection::for_relation(relation) else {
            continue;
        };
        let Some(related_id) = record.get(relation.as_str()).and_then(Value::as_str) else {
            continue;
        };
        if let Some(related) = find(tables, collection, related_id) {
            expanded.insert(relation.clone(), related.clone());
        }
    }
    if let Some(obj) = out.as_object_mut() {
        obj.insert("expand".to_string(), Value::Object(expanded));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables() -> Tables {
        let mut tables = Tables::new();
        tables.insert(
            Collection::Tasks,
            vec![json!({"id": "t1", "project": "p1", "node": "n1", "active": true})],
        );
        tables.insert(Collection::Projects, vec![json!({"id": "p1", "name": "ops"})]);
        tables
    }

    #[test]
    fn resolves_through_relations() {
        let tables = tables();
        let run = json!({"id": "r1", "task": "t1"});
        assert_eq!(resolve(&tables, &run, "task.project.id").as_deref(), Some("p1"));
        assert_eq!(resolve(&tables, &run, "task.active").as_deref(), Some("true"));
        assert!(matches(&tables, &run, &Filter::eq("task.node.id", "n1")));
        assert!(!matches(&tables, &run, &Filter::eq("task.node.id", "n2")));
        assert_eq!(resolve(&tables, &json!({"task": "missing"}), "task.id"), None);
    }

    #[test]
    fn sorts_by_multiple_keys() {
        let mut records = vec![
            json!({"id": "a", "active": false, "created": "2024-01-03"}),
            json!({"id": "b", "active": true, "created": "2024-01-01"}),
            json!({"id": "c", "active": true, "created": "2024-01-02"}),
        ];
        sort_records(&mut records, &Sort::parse("-active,-created"));
        let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn expands_known_relations() {
        let tables = tables();
        let task = json!({"id": "t1", "project": "p1"});
        let out = expand(&tables, &task, &["project".to_string(), "bogus".to_string()]);
        assert_eq!(out["expand"]["project"]["name"], "ops");
        assert!(out["expand"].get("bogus").is_none());
    }
}
