use std::cmp::Ordering;

use serde_json::json;

use super::*;

#[test]
fn query_collection_defaults() {
    let query = Query::collection("apoiados");
    assert_eq!(query.collection, "apoiados");
    assert!(query.key.is_none());
    assert!(query.filters.is_empty());
    assert!(query.order_by.is_none());
    assert!(query.limit.is_none());
}

#[test]
fn query_doc_sets_key() {
    let query = Query::doc("apoiados", "a1");
    assert_eq!(query.key.as_deref(), Some("a1"));
}

#[test]
fn query_builder_accumulates() {
    let query = Query::collection("produtos")
        .filter("validade", FilterOp::Gte, 10)
        .filter("validade", FilterOp::Lt, 20)
        .order_by("validade", Direction::Ascending)
        .limit(5);
    assert_eq!(query.filters.len(), 2);
    assert_eq!(query.filters[0].op, FilterOp::Gte);
    assert_eq!(query.filters[1].value, json!(20));
    assert_eq!(query.order_by.as_ref().map(|(f, _)| f.as_str()), Some("validade"));
    assert_eq!(query.limit, Some(5));
}

#[test]
fn write_batch_accumulates_ops() {
    let mut batch = WriteBatch::new();
    assert!(batch.is_empty());
    batch.set("a", "1", WriteFields::new());
    batch.update("b", "2", WriteFields::new());
    assert_eq!(batch.len(), 2);
    assert!(matches!(batch.ops()[0], WriteOp::Set { .. }));
    assert!(matches!(batch.ops()[1], WriteOp::Update { .. }));
}

#[test]
fn document_field_helpers() {
    let doc = Document {
        id: "m1".into(),
        fields: Fields::from([
            ("text".to_string(), json!("ola")),
            ("clientCreatedAt".to_string(), json!(42)),
            ("seenByApoiadoAt".to_string(), serde_json::Value::Null),
        ]),
    };
    assert_eq!(doc.str_field("text"), Some("ola"));
    assert_eq!(doc.i64_field("clientCreatedAt"), Some(42));
    assert_eq!(doc.str_field("clientCreatedAt"), None);
    assert_eq!(doc.i64_field("seenByApoiadoAt"), None);
    assert_eq!(doc.i64_field("missing"), None);
}

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 0);
}

#[test]
fn cmp_values_same_kinds() {
    assert_eq!(cmp_values(&json!(1), &json!(2)), Some(Ordering::Less));
    assert_eq!(cmp_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
    assert_eq!(cmp_values(&json!("a"), &json!("a")), Some(Ordering::Equal));
    assert_eq!(cmp_values(&json!(false), &json!(true)), Some(Ordering::Less));
}

#[test]
fn cmp_values_mixed_kinds_none() {
    assert_eq!(cmp_values(&json!(1), &json!("1")), None);
    assert_eq!(cmp_values(&serde_json::Value::Null, &json!(0)), None);
    assert_eq!(cmp_values(&json!([1]), &json!([1])), None);
}
