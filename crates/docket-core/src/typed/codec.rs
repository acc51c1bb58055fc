//! PayloadCodec - Task と payload（JSON object）の相互変換
//!
//! # 変換フロー
//! 1. push: `T` → JSON object。依存フィールドの値を取り出して record に載せる
//! 2. 実行: JSON object → `T` → handler → `T` → JSON object
//!
//! 依存フィールドの形:
//! - DIRECT: `null` / フィールドなし / `"<ulid>"`
//! - ALL_OF / ANY_OF: `null` / フィールドなし / `["<ulid>", ...]`

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use super::task::Task;
use crate::domain::{DependencyRefs, DependencySchema, DependencyType, TaskId};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {task_type}: {source}")]
    Encode {
        task_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {task_type}: {source}")]
    Decode {
        task_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload of {task_type} must be a JSON object")]
    NotAnObject { task_type: String },

    #[error("dependency field '{field}': {reason}")]
    InvalidDependency { field: String, reason: String },
}

/// PayloadCodec は stateless な変換関数の集まり
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: Task>(task: &T) -> Result<Value, CodecError> {
        let value = serde_json::to_value(task).map_err(|source| CodecError::Encode {
            task_type: T::TYPE.to_string(),
            source,
        })?;
        if !value.is_object() {
            return Err(CodecError::NotAnObject {
                task_type: T::TYPE.to_string(),
            });
        }
        Ok(value)
    }

    pub fn decode<T: Task>(payload: &Value) -> Result<T, CodecError> {
        T::deserialize(payload).map_err(|source| CodecError::Decode {
            task_type: T::TYPE.to_string(),
            source,
        })
    }

    /// schema に宣言されたフィールドだけを取り出す
    pub fn extract_dependencies(
        schema: &DependencySchema,
        payload: &Value,
    ) -> Result<BTreeMap<String, DependencyRefs>, CodecError> {
        schema
            .fields()
            .iter()
            .map(|field| {
                let value = payload.get(&field.name).unwrap_or(&Value::Null);
                let refs = refs_from_value(&field.name, field.kind, value)?;
                Ok((field.name.clone(), refs))
            })
            .collect()
    }
}

fn refs_from_value(
    field: &str,
    kind: DependencyType,
    value: &Value,
) -> Result<DependencyRefs, CodecError> {
    let invalid = |reason: String| CodecError::InvalidDependency {
        field: field.to_string(),
        reason,
    };
    let parse = |raw: &Value| -> Result<TaskId, CodecError> {
        let s = raw
            .as_str()
            .ok_or_else(|| invalid(format!("expected a task id, got {raw}")))?;
        TaskId::parse(s).map_err(|e| invalid(e.to_string()))
    };

    match (kind, value) {
        (_, Value::Null) => Ok(DependencyRefs::Unset),
        (DependencyType::Direct, raw) => Ok(DependencyRefs::One(parse(raw)?)),
        (DependencyType::AllOf | DependencyType::AnyOf, Value::Array(items)) => items
            .iter()
            .map(parse)
            .collect::<Result<Vec<_>, _>>()
            .map(DependencyRefs::Many),
        (_, other) => Err(invalid(format!("expected a list of task ids, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::task::fixtures::{Child, Shout};
    use serde_json::json;
    use ulid::Ulid;

    #[test]
    fn encode_and_decode_plain_task() {
        let task = Shout { s: "hi".into() };
        let value = PayloadCodec::encode(&task).unwrap();
        assert_eq!(value, json!({"s": "hi"}));
        assert_eq!(PayloadCodec::decode::<Shout>(&value).unwrap(), task);
    }

    #[test]
    fn decode_reports_task_type() {
        let err = PayloadCodec::decode::<Shout>(&json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, CodecError::Decode { ref task_type, .. } if task_type == "test.shout.v1"));
    }

    #[test]
    fn optional_direct_dependency() {
        let parent = TaskId::from_ulid(Ulid::new());
        let with = PayloadCodec::encode(&Child {
            s: "x".into(),
            parent: Some(parent),
        })
        .unwrap();
        let without = PayloadCodec::encode(&Child {
            s: "x".into(),
            parent: None,
        })
        .unwrap();

        let schema = DependencySchema::new().direct("parent");
        assert_eq!(
            PayloadCodec::extract_dependencies(&schema, &with).unwrap()["parent"],
            DependencyRefs::One(parent)
        );
        assert_eq!(
            PayloadCodec::extract_dependencies(&schema, &without).unwrap()["parent"],
            DependencyRefs::Unset
        );
    }

    #[test]
    fn list_dependencies_accept_prefixed_ids() {
        let a = TaskId::from_ulid(Ulid::new());
        let b = TaskId::from_ulid(Ulid::new());
        let payload = json!({ "inputs": [a.to_string(), b.as_ulid().to_string()] });

        let schema = DependencySchema::new().all_of("inputs");
        let refs = PayloadCodec::extract_dependencies(&schema, &payload).unwrap();
        assert_eq!(refs["inputs"], DependencyRefs::Many(vec![a, b]));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let schema = DependencySchema::new().any_of("inputs");
        let err = PayloadCodec::extract_dependencies(&schema, &json!({"inputs": "01H"})).unwrap_err();
        assert!(matches!(err, CodecError::InvalidDependency { ref field, .. } if field == "inputs"));

        let schema = DependencySchema::new().direct("parent");
        assert!(PayloadCodec::extract_dependencies(&schema, &json!({"parent": 5})).is_err());
    }
}
