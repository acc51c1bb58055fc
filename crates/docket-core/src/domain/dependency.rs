//! Dependency - タスク間の依存関係
//!
//! 依存は「弱い参照」: 参照先の id を持つだけで、参照先のライフサイクルには関与しない。
//!
//! # 依存の種類
//! - **DIRECT**: 単一参照。未設定 or 参照先が FINISHED なら通す
//! - **ALL_OF**: 参照リスト。存在する要素がすべて FINISHED なら通す
//! - **ANY_OF**: 参照リスト。存在する要素がない or 1 つでも FINISHED なら通す
//!
//! 参照先レコードが存在しない（retention で消えた等）参照は無視する。

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    Direct,
    AllOf,
    AnyOf,
}

/// payload 上のフィールド名と依存の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyField {
    pub name: String,
    pub kind: DependencyType,
}

/// DependencySchema はタスク型ごとの依存フィールド定義
///
/// 登録時に一度だけ組み立てて `TaskDescriptor` に載せる。以後は不変。
///
/// # 使用例
/// ```ignore
/// let schema = DependencySchema::new()
///     .direct("parent")
///     .all_of("inputs");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySchema {
    fields: Vec<DependencyField>,
}

impl DependencySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direct(self, name: impl Into<String>) -> Self {
        self.with(name, DependencyType::Direct)
    }

    pub fn all_of(self, name: impl Into<String>) -> Self {
        self.with(name, DependencyType::AllOf)
    }

    pub fn any_of(self, name: impl Into<String>) -> Self {
        self.with(name, DependencyType::AnyOf)
    }

    /// 同名フィールドは後から指定した種類で置き換える
    pub fn with(mut self, name: impl Into<String>, kind: DependencyType) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(DependencyField { name, kind });
        self
    }

    pub fn fields(&self) -> &[DependencyField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// レコードに保存される依存フィールドの値
///
/// JSON では `null` / `"<ulid>"` / `["<ulid>", ...]`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRefs {
    #[default]
    Unset,
    One(TaskId),
    Many(Vec<TaskId>),
}

impl DependencyRefs {
    pub fn targets(&self) -> &[TaskId] {
        match self {
            DependencyRefs::Unset => &[],
            DependencyRefs::One(id) => std::slice::from_ref(id),
            DependencyRefs::Many(ids) => ids,
        }
    }

    /// `state_of` は参照先の現在の状態（存在しなければ `None`）を返す
    ///
    /// 存在しない参照先は数えない。
    pub fn is_satisfied<F>(&self, kind: DependencyType, state_of: F) -> bool
    where
        F: Fn(TaskId) -> Option<TaskState>,
    {
        let mut present = self.targets().iter().filter_map(|id| state_of(*id)).peekable();
        match kind {
            DependencyType::Direct | DependencyType::AllOf => {
                present.all(|state| state == TaskState::Finished)
            }
            DependencyType::AnyOf => {
                present.peek().is_none() || present.any(|state| state == TaskState::Finished)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use ulid::Ulid;

    fn ids(n: usize) -> Vec<TaskId> {
        (0..n).map(|_| TaskId::from_ulid(Ulid::new())).collect()
    }

    fn lookup(states: &[(TaskId, TaskState)]) -> impl Fn(TaskId) -> Option<TaskState> + use<> {
        let map: HashMap<TaskId, TaskState> = states.iter().copied().collect();
        move |id| map.get(&id).copied()
    }

    #[test]
    fn unset_never_blocks() {
        for kind in [DependencyType::Direct, DependencyType::AllOf, DependencyType::AnyOf] {
            assert!(DependencyRefs::Unset.is_satisfied(kind, |_| None));
            assert!(DependencyRefs::Many(vec![]).is_satisfied(kind, |_| None));
        }
    }

    #[rstest]
    #[case(TaskState::Created, false)]
    #[case(TaskState::Running, false)]
    #[case(TaskState::Failed, false)]
    #[case(TaskState::Finished, true)]
    fn direct_requires_finished(#[case] state: TaskState, #[case] satisfied: bool) {
        let id = ids(1)[0];
        let refs = DependencyRefs::One(id);
        assert_eq!(
            refs.is_satisfied(DependencyType::Direct, lookup(&[(id, state)])),
            satisfied
        );
    }

    #[test]
    fn all_of_requires_every_element() {
        let v = ids(3);
        let refs = DependencyRefs::Many(v.clone());
        let partial = lookup(&[
            (v[0], TaskState::Finished),
            (v[1], TaskState::Finished),
            (v[2], TaskState::Created),
        ]);
        assert!(!refs.is_satisfied(DependencyType::AllOf, partial));

        let all = lookup(&[
            (v[0], TaskState::Finished),
            (v[1], TaskState::Finished),
            (v[2], TaskState::Finished),
        ]);
        assert!(refs.is_satisfied(DependencyType::AllOf, all));
    }

    #[test]
    fn any_of_requires_one_element() {
        let v = ids(2);
        let refs = DependencyRefs::Many(v.clone());
        let none = lookup(&[(v[0], TaskState::Created), (v[1], TaskState::Failed)]);
        assert!(!refs.is_satisfied(DependencyType::AnyOf, none));

        let one = lookup(&[(v[0], TaskState::Created), (v[1], TaskState::Finished)]);
        assert!(refs.is_satisfied(DependencyType::AnyOf, one));
    }

    #[test]
    fn missing_target_is_ignored() {
        let v = ids(1);
        assert!(DependencyRefs::One(v[0]).is_satisfied(DependencyType::Direct, |_| None));
    }

    #[test]
    fn list_gates_count_only_present_targets() {
        let v = ids(3);
        let refs = DependencyRefs::Many(v.clone());

        let finished_and_gone = lookup(&[(v[0], TaskState::Finished)]);
        assert!(refs.is_satisfied(DependencyType::AllOf, &finished_and_gone));
        assert!(refs.is_satisfied(DependencyType::AnyOf, &finished_and_gone));

        let pending_and_gone = lookup(&[(v[1], TaskState::Running)]);
        assert!(!refs.is_satisfied(DependencyType::AllOf, &pending_and_gone));
        assert!(!refs.is_satisfied(DependencyType::AnyOf, &pending_and_gone));

        for kind in [DependencyType::AllOf, DependencyType::AnyOf] {
            assert!(refs.is_satisfied(kind, |_| None));
        }
    }

    #[test]
    fn refs_use_plain_json_shapes() {
        let v = ids(2);
        assert_eq!(serde_json::to_value(DependencyRefs::Unset).unwrap(), serde_json::Value::Null);

        let one: DependencyRefs =
            serde_json::from_value(serde_json::json!(v[0].as_ulid().to_string())).unwrap();
        assert_eq!(one, DependencyRefs::One(v[0]));

        let many: DependencyRefs = serde_json::from_value(serde_json::json!([
            v[0].as_ulid().to_string(),
            v[1].as_ulid().to_string()
        ]))
        .unwrap();
        assert_eq!(many, DependencyRefs::Many(v));
    }

    #[test]
    fn schema_replaces_duplicate_field_names() {
        let schema = DependencySchema::new().direct("parent").all_of("parent");
        assert_eq!(
            schema.fields(),
            &[DependencyField {
                name: "parent".into(),
                kind: DependencyType::AllOf
            }]
        );
    }
}
