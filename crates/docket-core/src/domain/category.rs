//! Category - partitioned polling 用のカテゴリフィルタ
//!
//! # ルール
//! - カテゴリ指定なし（空集合も含む）→ カテゴリを持たないタスクだけにマッチ
//! - 単一カテゴリ → 要素 1 つの集合に正規化
//! - 集合 → `category ∈ 集合` のタスクにマッチ

use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    /// category が未設定のタスクのみ
    #[default]
    Untagged,
    /// category がこの集合に含まれるタスクのみ（空にはならない）
    AnyOf(BTreeSet<String>),
}

impl CategoryFilter {
    pub fn untagged() -> Self {
        CategoryFilter::Untagged
    }

    /// 空文字列は捨てる。何も残らなければ `Untagged`
    pub fn any_of<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = categories
            .into_iter()
            .map(Into::into)
            .filter(|c| !c.is_empty())
            .collect();
        if set.is_empty() {
            CategoryFilter::Untagged
        } else {
            CategoryFilter::AnyOf(set)
        }
    }

    pub fn matches(&self, category: Option<&str>) -> bool {
        match (self, category) {
            (CategoryFilter::Untagged, None) => true,
            (CategoryFilter::Untagged, Some(_)) => false,
            (CategoryFilter::AnyOf(_), None) => false,
            (CategoryFilter::AnyOf(set), Some(c)) => set.contains(c),
        }
    }

    /// `AnyOf` の要素（`Untagged` なら空）
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        let set = match self {
            CategoryFilter::Untagged => None,
            CategoryFilter::AnyOf(set) => Some(set),
        };
        set.into_iter().flatten().map(String::as_str)
    }
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        CategoryFilter::any_of([value])
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        CategoryFilter::any_of([value])
    }
}

impl From<Option<String>> for CategoryFilter {
    fn from(value: Option<String>) -> Self {
        CategoryFilter::any_of(value)
    }
}

impl From<Vec<String>> for CategoryFilter {
    fn from(value: Vec<String>) -> Self {
        CategoryFilter::any_of(value)
    }
}

impl From<&[&str]> for CategoryFilter {
    fn from(value: &[&str]) -> Self {
        CategoryFilter::any_of(value.iter().copied())
    }
}

impl From<HashSet<String>> for CategoryFilter {
    fn from(value: HashSet<String>) -> Self {
        CategoryFilter::any_of(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CategoryFilter::untagged(), None, true)]
    #[case(CategoryFilter::untagged(), Some("a"), false)]
    #[case(CategoryFilter::from("a"), Some("a"), true)]
    #[case(CategoryFilter::from("a"), Some("b"), false)]
    #[case(CategoryFilter::from("a"), None, false)]
    #[case(CategoryFilter::any_of(["a", "b"]), Some("b"), true)]
    fn matching(#[case] filter: CategoryFilter, #[case] category: Option<&str>, #[case] hit: bool) {
        assert_eq!(filter.matches(category), hit);
    }

    #[test]
    fn empty_inputs_normalize_to_untagged() {
        assert_eq!(CategoryFilter::from(""), CategoryFilter::Untagged);
        assert_eq!(CategoryFilter::from(Vec::<String>::new()), CategoryFilter::Untagged);
        assert_eq!(CategoryFilter::from(None::<String>), CategoryFilter::Untagged);
    }

    #[test]
    fn single_value_and_set_agree() {
        let single = CategoryFilter::from("reports".to_string());
        let set: HashSet<String> = ["reports".to_string()].into();
        assert_eq!(single, CategoryFilter::from(set));
        assert_eq!(single.categories().collect::<Vec<_>>(), vec!["reports"]);
    }
}
