//! Merge equi-join across selectors.
//!
//! Two selectors, possibly backed by different stores, are joined without
//! any native join support. Both inputs must be ordered ascending by their
//! join keys; [`SortedSelector`] carries that guarantee into [`join`].
//!
//! # Algorithm
//!
//! A single forward pass over both inputs:
//!
//! 1. Advance the left input and read its key.
//! 2. If the key equals the key of the retained right group, pair the left
//!    row with every row of that group again (consecutive equal left keys).
//! 3. Otherwise advance the right input, dropping rows with a smaller key,
//!    collecting rows with an equal key into a new group, and keeping the
//!    first greater row for later.
//! 4. A left row with no partner is skipped by an inner join and yielded
//!    once with null right columns by a left join.
//!
//! The right input is never rewound. Null keys never match.
//!
//! When order verification is on, each input's key sequence is checked to be
//! non-decreasing as it streams, so a store that silently ignored the
//! requested order fails with [`Error::UnsortedInput`] instead of producing
//! a wrong result.

use crate::{
    column::names_match,
    cursor::RowStream,
    error::{JoinSide, Result},
    expr::{CompiledFilter, CompiledOrder, SortDirection},
    selector::RowReader,
    AliasColumn, ColumnList, Error, OrderExpr, Row, Selector, Value,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Requested join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
        }
    }
}

/// An equality predicate between a left and a right column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinStatement {
    pub left: String,
    pub right: String,
}

impl JoinStatement {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    fn swapped(&self) -> Self {
        Self {
            left: self.right.clone(),
            right: self.left.clone(),
        }
    }
}

/// Join tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Check while streaming that both inputs arrive ordered by their keys
    pub verify_order: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self { verify_order: true }
    }
}

/// A selector known to be ordered ascending by `keys`.
#[derive(Debug, Clone)]
pub struct SortedSelector {
    selector: Selector,
    keys: Vec<String>,
}

impl SortedSelector {
    /// Order a selector ascending by the given columns.
    pub fn order_by_keys<S: AsRef<str>>(selector: &Selector, keys: &[S]) -> Result<Self> {
        Ok(Self {
            selector: selector.with_order(&OrderExpr::ascending(keys))?,
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        })
    }

    /// Wrap a selector whose rows the caller guarantees are already ordered
    /// ascending by the given columns.
    pub fn trusted<S: AsRef<str>>(selector: Selector, keys: &[S]) -> Self {
        Self {
            selector,
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn ensure_keys<'a>(&self, columns: impl Iterator<Item = &'a str>, side: JoinSide) -> Result<()> {
        let mut sorted = self.keys.iter();
        for column in columns {
            match sorted.next() {
                Some(key) if names_match(key, column) => {}
                _ => {
                    return Err(Error::Unsupported(format!(
                        "{} input is ordered by [{}] but joined on '{}'",
                        side,
                        self.keys.join(", "),
                        column
                    )))
                }
            }
        }
        Ok(())
    }
}

/// State of a join selector.
#[derive(Clone)]
pub(crate) struct JoinSelector {
    plan: Arc<JoinPlan>,
    pub(crate) filters: Vec<Arc<CompiledFilter>>,
}

struct JoinPlan {
    left: Selector,
    right: Selector,
    outer: bool,
    /// (left position, right position) in the children's exposed rows
    keys: Vec<(usize, usize)>,
    left_width: usize,
    right_width: usize,
    /// Right join normalized by swapping inputs
    swapped: bool,
    verify_order: bool,
}

/// Join two sorted selectors.
///
/// `None` as join type means inner. A right join is computed as a left join
/// with the inputs swapped; its columns are still exposed left first.
/// Join columns are resolved here, so an unknown column fails before any
/// row is read.
pub fn join(
    left: SortedSelector,
    right: SortedSelector,
    join_type: Option<JoinType>,
    statements: &[JoinStatement],
    options: &JoinOptions,
) -> Result<Selector> {
    if statements.is_empty() {
        return Err(Error::Unsupported(
            "join needs at least one join statement".into(),
        ));
    }
    left.ensure_keys(statements.iter().map(|s| s.left.as_str()), JoinSide::Left)?;
    right.ensure_keys(statements.iter().map(|s| s.right.as_str()), JoinSide::Right)?;

    let join_type = join_type.unwrap_or_default();
    let (left, right, statements, swapped) = match join_type {
        JoinType::Right => (
            right.selector,
            left.selector,
            statements.iter().map(JoinStatement::swapped).collect::<Vec<_>>(),
            true,
        ),
        _ => (left.selector, right.selector, statements.to_vec(), false),
    };

    let keys = statements
        .iter()
        .map(|s| {
            let l = left
                .columns()
                .find_index(&s.left)
                .ok_or_else(|| Error::InvalidReference(s.left.clone()))?;
            let r = right
                .columns()
                .find_index(&s.right)
                .ok_or_else(|| Error::InvalidReference(s.right.clone()))?;
            Ok((l, r))
        })
        .collect::<Result<Vec<_>>>()?;

    let left_width = left.columns().len();
    let right_width = right.columns().len();

    // Columns in the caller's order: the declared left side first.
    let (first, first_offset, second, second_offset) = if swapped {
        (right.columns(), left_width, left.columns(), 0)
    } else {
        (left.columns(), 0, right.columns(), left_width)
    };
    let mut columns: Vec<AliasColumn> = first
        .iter()
        .enumerate()
        .map(|(i, c)| AliasColumn::from_native(&c.column, first_offset + i, c.alias.clone()))
        .collect();
    for (i, c) in second.iter().enumerate() {
        let alias = unique_alias(&columns, &c.alias);
        columns.push(AliasColumn::from_native(&c.column, second_offset + i, alias));
    }
    let columns = ColumnList::new(columns)?;

    tracing::debug!(
        join_type = %join_type,
        keys = keys.len(),
        swapped,
        columns = ?columns.names(),
        "Created join selector"
    );

    let plan = JoinPlan {
        left,
        right,
        outer: join_type != JoinType::Inner,
        keys,
        left_width,
        right_width,
        swapped,
        verify_order: options.verify_order,
    };
    Ok(Selector::from_join(
        JoinSelector {
            plan: Arc::new(plan),
            filters: Vec::new(),
        },
        columns,
    ))
}

/// `name`, or `name_<n>` with the smallest `n` not already taken.
fn unique_alias(columns: &[AliasColumn], name: &str) -> String {
    let taken = |candidate: &str| columns.iter().any(|c| names_match(&c.alias, candidate));
    if !taken(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", name, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

impl JoinSelector {
    pub(crate) fn with_filter(&self, filter: CompiledFilter) -> Self {
        let mut next = self.clone();
        next.filters.push(Arc::new(filter));
        next
    }

    /// Accept an order only when the merge already yields it: ascending on a
    /// prefix of the left join keys.
    pub(crate) fn ensure_order(&self, order: &OrderExpr, compiled: &CompiledOrder) -> Result<()> {
        let keys = &self.plan.keys;
        let positions = compiled.positions();
        let satisfied = positions.len() <= keys.len()
            && positions
                .iter()
                .zip(keys)
                .all(|(&(position, direction), &(left, _))| {
                    direction == SortDirection::Ascending && position == left
                });
        if satisfied {
            Ok(())
        } else {
            let columns: Vec<&str> = order.items.iter().map(|i| i.column.as_str()).collect();
            Err(Error::Unsupported(format!(
                "join selectors cannot be reordered by [{}]",
                columns.join(", ")
            )))
        }
    }

    pub(crate) fn reader(&self) -> Result<Box<dyn RowReader>> {
        let plan = &self.plan;
        let left = plan.left.enumerate_all()?;
        let right = plan.right.enumerate_all()?;
        Ok(Box::new(MergeJoin {
            left,
            right,
            plan: Arc::clone(plan),
            current: None,
            matched: false,
            group: Vec::new(),
            group_key: None,
            group_pos: 0,
            emit_group: false,
            pending: None,
            right_done: false,
            last_left: None,
            last_right: None,
        }))
    }
}

struct MergeJoin {
    left: RowStream,
    right: RowStream,
    plan: Arc<JoinPlan>,
    /// Left row currently being expanded
    current: Option<Row>,
    matched: bool,
    /// Right rows whose key equals `group_key`
    group: Vec<Row>,
    group_key: Option<Vec<Value>>,
    group_pos: usize,
    emit_group: bool,
    /// First right row past the group, with its key
    pending: Option<(Row, Vec<Value>)>,
    right_done: bool,
    last_left: Option<Vec<Value>>,
    last_right: Option<Vec<Value>>,
}

fn key_of(row: &Row, positions: impl Iterator<Item = usize>) -> Vec<Value> {
    positions.map(|p| row.value_at(p).clone()).collect()
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn has_null(key: &[Value]) -> bool {
    key.iter().any(Value::is_null)
}

impl MergeJoin {
    fn joined(&self, left: Row, right: Option<Row>) -> Row {
        Row::joined(left, right, self.plan.left_width, self.plan.right_width)
    }

    /// Report a side in the caller's terms, undoing a right-join swap.
    fn side(&self, side: JoinSide) -> JoinSide {
        match (self.plan.swapped, side) {
            (false, side) => side,
            (true, JoinSide::Left) => JoinSide::Right,
            (true, JoinSide::Right) => JoinSide::Left,
        }
    }

    fn check_order(
        verify: bool,
        last: &mut Option<Vec<Value>>,
        key: &[Value],
        side: JoinSide,
    ) -> Result<()> {
        if !verify || has_null(key) {
            return Ok(());
        }
        if let Some(previous) = last.as_ref() {
            if compare_keys(previous, key) == Ordering::Greater {
                return Err(Error::UnsortedInput { side });
            }
        }
        *last = Some(key.to_vec());
        Ok(())
    }

    fn next_right(&mut self) -> Result<Option<(Row, Vec<Value>)>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        if self.right_done {
            return Ok(None);
        }
        match self.right.next_row()? {
            Some(row) => {
                let key = key_of(&row, self.plan.keys.iter().map(|k| k.1));
                let side = self.side(JoinSide::Right);
                Self::check_order(self.plan.verify_order, &mut self.last_right, &key, side)?;
                Ok(Some((row, key)))
            }
            None => {
                self.right_done = true;
                Ok(None)
            }
        }
    }

    /// Collect the right rows matching `key`, moving the right input forward.
    fn fill_group(&mut self, key: Vec<Value>) -> Result<()> {
        self.group.clear();
        while let Some((row, right_key)) = self.next_right()? {
            if has_null(&right_key) {
                continue;
            }
            match compare_keys(&right_key, &key) {
                Ordering::Less => continue,
                Ordering::Equal => self.group.push(row),
                Ordering::Greater => {
                    self.pending = Some((row, right_key));
                    break;
                }
            }
        }
        self.group_key = Some(key);
        Ok(())
    }
}

impl RowReader for MergeJoin {
    fn read(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(left) = self.current.as_ref() {
                if self.emit_group && self.group_pos < self.group.len() {
                    let row = self.joined(left.clone(), Some(self.group[self.group_pos].clone()));
                    self.group_pos += 1;
                    self.matched = true;
                    return Ok(Some(row));
                }
            }
            if let Some(left) = self.current.take() {
                if self.plan.outer && !self.matched {
                    return Ok(Some(self.joined(left, None)));
                }
            }

            let Some(left) = self.left.next_row()? else {
                return Ok(None);
            };
            let key = key_of(&left, self.plan.keys.iter().map(|k| k.0));
            let side = self.side(JoinSide::Left);
            Self::check_order(self.plan.verify_order, &mut self.last_left, &key, side)?;

            self.matched = false;
            self.group_pos = 0;
            self.emit_group = if has_null(&key) {
                false
            } else {
                let reuse = matches!(
                    &self.group_key,
                    Some(group_key) if compare_keys(group_key, &key) == Ordering::Equal
                );
                if !reuse {
                    self.fill_group(key)?;
                }
                !self.group.is_empty()
            };
            self.current = Some(left);
        }
    }

    fn close(&mut self) {
        self.left.release();
        self.right.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{row, ColumnDescriptor, DataType};

    fn memory(rows: Vec<Row>) -> Selector {
        Selector::memory(
            vec![
                ColumnDescriptor::new("key", DataType::Int),
                ColumnDescriptor::new("val", DataType::Text),
            ],
            rows,
        )
        .unwrap()
    }

    fn trusted(rows: Vec<Row>) -> SortedSelector {
        SortedSelector::trusted(memory(rows), &["key"])
    }

    fn on_key() -> Vec<JoinStatement> {
        vec![JoinStatement::new("key", "key")]
    }

    fn run(selector: &Selector) -> Result<Vec<Row>> {
        selector.enumerate_all()?.collect()
    }

    #[test]
    fn duplicate_left_keys_rematch_group() {
        let left = trusted(vec![row![1, "a"], row![1, "b"], row![2, "c"]]);
        let right = trusted(vec![row![1, "x"], row![2, "y"]]);
        let joined = join(left, right, None, &on_key(), &JoinOptions::default()).unwrap();

        assert_eq!(
            run(&joined).unwrap(),
            vec![
                row![1, "a", 1, "x"],
                row![1, "b", 1, "x"],
                row![2, "c", 2, "y"],
            ]
        );
    }

    #[test]
    fn right_rows_without_partner_are_skipped() {
        let left = trusted(vec![row![2, "b"], row![4, "d"]]);
        let right = trusted(vec![row![1, "w"], row![2, "x"], row![3, "y"], row![4, "z"]]);
        let joined = join(left, right, None, &on_key(), &JoinOptions::default()).unwrap();

        assert_eq!(
            run(&joined).unwrap(),
            vec![row![2, "b", 2, "x"], row![4, "d", 4, "z"]]
        );
    }

    #[test]
    fn null_keys_never_match() {
        let left = trusted(vec![row![Value::Null, "n"], row![1, "a"]]);
        let right = trusted(vec![row![Value::Null, "m"], row![1, "x"]]);
        let joined = join(
            left,
            right,
            Some(JoinType::Left),
            &on_key(),
            &JoinOptions::default(),
        )
        .unwrap();

        assert_eq!(
            run(&joined).unwrap(),
            vec![
                row![Value::Null, "n", Value::Null, Value::Null],
                row![1, "a", 1, "x"],
            ]
        );
    }

    #[test]
    fn colliding_names_are_suffixed() {
        let joined = join(
            trusted(vec![]),
            trusted(vec![]),
            None,
            &on_key(),
            &JoinOptions::default(),
        )
        .unwrap();
        assert_eq!(joined.columns().names(), vec!["key", "val", "key_1", "val_1"]);
    }

    #[test]
    fn unknown_join_column_fails_at_construction() {
        let left = SortedSelector::trusted(memory(vec![]), &["missing"]);
        let result = join(
            left,
            trusted(vec![]),
            None,
            &[JoinStatement::new("missing", "key")],
            &JoinOptions::default(),
        );
        assert!(matches!(result, Err(Error::InvalidReference(c)) if c == "missing"));
    }

    #[test]
    fn keys_must_match_sorted_columns() {
        let left = SortedSelector::trusted(memory(vec![]), &["val"]);
        let result = join(left, trusted(vec![]), None, &on_key(), &JoinOptions::default());
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn unsorted_input_detected() {
        let left = trusted(vec![row![2, "b"], row![1, "a"]]);
        let right = trusted(vec![row![1, "x"], row![2, "y"]]);
        let joined = join(left, right, None, &on_key(), &JoinOptions::default()).unwrap();

        assert_eq!(
            run(&joined),
            Err(Error::UnsortedInput {
                side: JoinSide::Left
            })
        );
    }

    #[test]
    fn unverified_join_trusts_caller() {
        let left = trusted(vec![row![2, "b"], row![1, "a"]]);
        let right = trusted(vec![row![1, "x"], row![2, "y"]]);
        let options = JoinOptions {
            verify_order: false,
        };
        let joined = join(left, right, None, &on_key(), &options).unwrap();

        // The right cursor has moved past key 1 by the time it is needed.
        assert_eq!(run(&joined).unwrap(), vec![row![2, "b", 2, "y"]]);
    }

    #[test]
    fn order_on_join_keys_only() {
        let joined = join(
            trusted(vec![]),
            trusted(vec![]),
            None,
            &on_key(),
            &JoinOptions::default(),
        )
        .unwrap();
        assert!(joined.with_order(&OrderExpr::ascending(&["key"])).is_ok());
        assert!(matches!(
            joined.with_order(&OrderExpr::ascending(&["val"])),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            joined.with_order(&OrderExpr::default().then("key", SortDirection::Descending)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn filter_and_project_joined_rows() {
        let left = trusted(vec![row![1, "a"], row![2, "b"]]);
        let right = trusted(vec![row![1, "x"], row![2, "y"]]);
        let joined = join(left, right, None, &on_key(), &JoinOptions::default())
            .unwrap()
            .with_filter(&crate::FilterExpr::eq("val_1", "y"))
            .unwrap()
            .with_columns(&["val".into(), crate::ColumnRef::aliased("val_1", "other")])
            .unwrap();

        assert_eq!(joined.columns().names(), vec!["val", "other"]);
        assert_eq!(run(&joined).unwrap(), vec![row!["b", "y"]]);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Nested-loop reference over key/val rows.
        fn reference(left: &[(i64, i64)], right: &[(i64, i64)], outer: bool) -> Vec<Row> {
            let mut out = Vec::new();
            for &(lk, lv) in left {
                let mut matched = false;
                for &(rk, rv) in right.iter().filter(|(rk, _)| *rk == lk) {
                    out.push(row![lk, lv, rk, rv]);
                    matched = true;
                }
                if outer && !matched {
                    out.push(row![lk, lv, Value::Null, Value::Null]);
                }
            }
            out
        }

        fn sorted_side() -> impl Strategy<Value = Vec<(i64, i64)>> {
            prop::collection::vec((0i64..6, 0i64..100), 0..12).prop_map(|mut rows| {
                rows.sort_by_key(|r| r.0);
                rows
            })
        }

        fn int_selector(rows: &[(i64, i64)]) -> SortedSelector {
            let selector = Selector::memory(
                vec![
                    ColumnDescriptor::new("key", DataType::Int),
                    ColumnDescriptor::new("val", DataType::Int),
                ],
                rows.iter().map(|&(k, v)| row![k, v]).collect(),
            )
            .unwrap();
            SortedSelector::trusted(selector, &["key"])
        }

        proptest! {
            #[test]
            fn prop_merge_matches_nested_loop(
                left in sorted_side(),
                right in sorted_side(),
                outer in any::<bool>(),
            ) {
                let join_type = if outer { JoinType::Left } else { JoinType::Inner };
                let joined = join(
                    int_selector(&left),
                    int_selector(&right),
                    Some(join_type),
                    &on_key(),
                    &JoinOptions::default(),
                )
                .unwrap();
                prop_assert_eq!(run(&joined).unwrap(), reference(&left, &right, outer));
            }

            #[test]
            fn prop_right_join_is_swapped_left_join(
                left in sorted_side(),
                right in sorted_side(),
            ) {
                let swapped = join(
                    int_selector(&left),
                    int_selector(&right),
                    Some(JoinType::Right),
                    &on_key(),
                    &JoinOptions::default(),
                )
                .unwrap();

                // Same rows as LEFT(right, left), with the halves swapped back.
                let expected: Vec<Row> = reference(&right, &left, true)
                    .into_iter()
                    .map(|r| Row::new(vec![
                        r.value_at(2).clone(),
                        r.value_at(3).clone(),
                        r.value_at(0).clone(),
                        r.value_at(1).clone(),
                    ]))
                    .collect();
                prop_assert_eq!(run(&swapped).unwrap(), expected);
            }
        }
    }
}
