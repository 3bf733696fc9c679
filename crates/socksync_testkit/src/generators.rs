//! Property-based test generators using proptest.
//!
//! Operations are generated with raw indices and normalized against the
//! list length when applied, so any generated sequence is valid.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use socksync_engine::{EngineResult, LocalList, SyncValue};
use socksync_protocol::{GroupId, GroupType};

/// A structured list item, for typed-group tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Row key.
    pub key: String,
    /// Row payload.
    pub count: i64,
}

/// One mutation of a local list.
#[derive(Debug, Clone)]
pub enum ListOperation<T> {
    /// Insert before `index`; clamped to the length.
    Insert {
        /// Raw index
        index: usize,
        /// Item to insert
        value: T,
    },
    /// Delete at `index`; wrapped into range, skipped on an empty list.
    Delete {
        /// Raw index
        index: usize,
    },
    /// Replace at `index`; wrapped into range, skipped on an empty list.
    Set {
        /// Raw index
        index: usize,
        /// New item
        value: T,
    },
    /// Append at the end.
    Push {
        /// Item to append
        value: T,
    },
}

impl<T: SyncValue> ListOperation<T> {
    /// Applies the operation to `list`, mirroring it into `model`.
    ///
    /// Returns the normalized index that was touched, or `None` when the
    /// operation was skipped.
    pub fn apply(&self, list: &LocalList<T>, model: &mut Vec<T>) -> EngineResult<Option<usize>> {
        let touched = match self {
            ListOperation::Insert { index, value } => {
                let index = (*index).min(model.len());
                list.insert(index, value.clone())?;
                model.insert(index, value.clone());
                index
            }
            ListOperation::Delete { index } => {
                if model.is_empty() {
                    return Ok(None);
                }
                let index = index % model.len();
                list.delete(index)?;
                model.remove(index);
                index
            }
            ListOperation::Set { index, value } => {
                if model.is_empty() {
                    return Ok(None);
                }
                let index = index % model.len();
                list.set(index, value.clone())?;
                model[index] = value.clone();
                index
            }
            ListOperation::Push { value } => {
                list.push(value.clone())?;
                model.push(value.clone());
                model.len() - 1
            }
        };
        Ok(Some(touched))
    }

    /// Returns true if the operation shifts the items after its index.
    pub fn shifts(&self) -> bool {
        !matches!(self, ListOperation::Set { .. })
    }
}

/// Strategy for list items.
pub fn item_strategy() -> impl Strategy<Value = i64> {
    -1000i64..1000
}

/// Strategy for an initial list.
pub fn items_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(item_strategy(), 0..=max_len)
}

/// Strategy for structured rows.
pub fn row_strategy() -> impl Strategy<Value = Row> {
    ("[a-z]{1,8}", any::<i64>()).prop_map(|(key, count)| Row { key, count })
}

/// Strategy for one list mutation.
pub fn list_operation_strategy() -> impl Strategy<Value = ListOperation<i64>> {
    prop_oneof![
        3 => (0usize..64, item_strategy())
            .prop_map(|(index, value)| ListOperation::Insert { index, value }),
        2 => (0usize..64).prop_map(|index| ListOperation::Delete { index }),
        2 => (0usize..64, item_strategy())
            .prop_map(|(index, value)| ListOperation::Set { index, value }),
        2 => item_strategy().prop_map(|value| ListOperation::Push { value }),
    ]
}

/// Strategy for a sequence of list mutations.
pub fn list_operations_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ListOperation<i64>>> {
    prop::collection::vec(list_operation_strategy(), min_ops..max_ops)
}

/// Strategy for group names.
pub fn group_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,15}"
}

/// Strategy for group ids of any kind.
pub fn group_id_strategy() -> impl Strategy<Value = GroupId> {
    (
        prop_oneof![
            Just(GroupType::Var),
            Just(GroupType::List),
            Just(GroupType::Function),
        ],
        group_name_strategy(),
    )
        .prop_map(|(group_type, name)| GroupId::new(group_type, name))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
