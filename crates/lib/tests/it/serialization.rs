//! Wire format of tagged operations and configuration.

use convergent::{
    SyncConfig,
    control::StaleBasePolicy,
    history::HistoryRole,
    ot::{ListOp, MapOp, ObjectOp, ObjectRef, ObjectType, Operation, Value},
    tagged::{self, TaggedUserOperation},
};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_document_operation_json_shape() {
    let items = ObjectRef::new("alice-0", ObjectType::List);
    let operation = Operation::new()
        .with("root", ObjectOp::Map(MapOp::new().put("items", None, items.clone())))
        .unwrap()
        .with(
            "alice-0",
            ObjectOp::List(ListOp::new().insert(vec![Value::from(1), Value::from("two")])),
        )
        .unwrap();
    let op = TaggedUserOperation::new(3, "alice-7", operation, Some("alice".to_string()));

    let value: serde_json::Value = serde_json::from_str(&tagged::to_json(&op).unwrap()).unwrap();
    assert_eq!(
        value["operation"],
        json!([
            {
                "id": "root",
                "type": "map",
                "op": {"items": {"new": {"reference": {"id": "alice-0", "type": "list"}}}}
            },
            {
                "id": "alice-0",
                "type": "list",
                "op": [{"insert": [{"int": 1}, {"text": "two"}]}]
            }
        ])
    );

    let decoded = tagged::from_json(&value.to_string()).unwrap();
    assert_eq!(decoded, op);
}

#[test]
fn test_whole_state_document_decodes_from_json() {
    let json = r#"{
        "historyId": 12,
        "token": "catch-up",
        "operation": [
            {"id": "doc", "type": "string", "op": [{"insert": "Hello World"}]}
        ]
    }"#;
    let op = tagged::from_json(json).unwrap();

    assert!(op.operation().is_whole_state_compatible());
    assert_eq!(text_of(op.operation(), "doc"), "Hello World");
}

#[test]
fn test_mismatched_update_type_is_rejected() {
    let json = r#"{"historyId":1,"token":"t","operation":[{"id":"m","type":"map","op":[{"retain":1}]}]}"#;
    assert!(tagged::from_json(json).unwrap_err().is_serialization_error());
}

#[test]
fn test_config_from_json() {
    let config = SyncConfig::from_json(
        r#"{"role":"passThrough","staleBase":"reject","resetOnMismatch":false,"user":"carol"}"#,
    )
    .unwrap();

    assert_eq!(config.role, HistoryRole::PassThrough);
    assert_eq!(config.stale_base, StaleBasePolicy::Reject);
    assert!(!config.reset_on_mismatch);
    assert_eq!(config.user.as_deref(), Some("carol"));
    assert_eq!(SyncConfig::from_json("{}").unwrap(), SyncConfig::default());
}
