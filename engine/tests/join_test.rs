//! Join tests over in-process stores.

use rowsync_engine::{
    row, ColumnDescriptor, ColumnRef, ConnectionRef, DataType, Error, FilterExpr, InProcessStore,
    JoinOptions, JoinSide, JoinStatement, JoinType, NativeFactory, OrderExpr, Row, Selector,
    SortedSelector, Value, VecTable,
};
use std::sync::Arc;

fn key_val_table(name: &str, rows: Vec<Row>) -> VecTable {
    VecTable::new(
        name,
        vec![
            ColumnDescriptor::new("k", DataType::Int),
            ColumnDescriptor::new("v", DataType::Text),
        ],
        rows,
    )
    .unwrap()
}

/// Left [(1,a),(2,b),(3,c)], right [(1,x),(1,y),(2,z)], both stored unordered.
fn fixture() -> Arc<InProcessStore> {
    Arc::new(
        InProcessStore::new("fixture")
            .with_table(key_val_table(
                "l",
                vec![row![3, "c"], row![1, "a"], row![2, "b"]],
            ))
            .with_table(key_val_table(
                "r",
                vec![row![2, "z"], row![1, "x"], row![1, "y"]],
            )),
    )
}

fn selectors(store: &Arc<InProcessStore>) -> (Selector, Selector) {
    let connection: ConnectionRef = store.clone();
    (
        Selector::native(connection.clone(), "l").unwrap(),
        Selector::native(connection, "r").unwrap(),
    )
}

fn on_k() -> Vec<JoinStatement> {
    vec![JoinStatement::new("k", "k")]
}

fn rows(selector: &Selector) -> Vec<Row> {
    selector
        .enumerate_all()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

// ============================================================================
// Join Types
// ============================================================================

#[test]
fn inner_join_fixture() {
    let (l, r) = selectors(&fixture());
    let joined = l.apply_join(&r, Some(JoinType::Inner), &on_k()).unwrap();

    assert_eq!(joined.columns().names(), vec!["k", "v", "k_1", "v_1"]);
    assert_eq!(
        rows(&joined),
        vec![
            row![1, "a", 1, "x"],
            row![1, "a", 1, "y"],
            row![2, "b", 2, "z"],
        ]
    );
}

#[test]
fn missing_join_type_means_inner() {
    let (l, r) = selectors(&fixture());
    let default = l.apply_join(&r, None, &on_k()).unwrap();
    let inner = l.apply_join(&r, Some(JoinType::Inner), &on_k()).unwrap();
    assert_eq!(rows(&default), rows(&inner));
}

#[test]
fn left_join_fixture() {
    let (l, r) = selectors(&fixture());
    let joined = l.apply_join(&r, Some(JoinType::Left), &on_k()).unwrap();

    assert_eq!(
        rows(&joined),
        vec![
            row![1, "a", 1, "x"],
            row![1, "a", 1, "y"],
            row![2, "b", 2, "z"],
            row![3, "c", Value::Null, Value::Null],
        ]
    );
}

#[test]
fn right_join_equals_swapped_left_join() {
    let (l, r) = selectors(&fixture());
    let right = l.apply_join(&r, Some(JoinType::Right), &on_k()).unwrap();
    let left = r.apply_join(&l, Some(JoinType::Left), &on_k()).unwrap();

    // Columns stay in the caller's order.
    assert_eq!(right.columns().names(), vec!["k", "v", "k_1", "v_1"]);

    let swapped_back: Vec<Row> = rows(&left)
        .iter()
        .map(|r| Row::new(vec![
            r.value_at(2).clone(),
            r.value_at(3).clone(),
            r.value_at(0).clone(),
            r.value_at(1).clone(),
        ]))
        .collect();
    assert_eq!(rows(&right), swapped_back);
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn join_by_name_on_same_connection() {
    let (l, _) = selectors(&fixture());
    let joined = l
        .apply_join_by_name(&NativeFactory, "r", Some(JoinType::Inner), &on_k())
        .unwrap()
        .with_columns(&[ColumnRef::aliased("v", "left"), ColumnRef::aliased("v_1", "right")])
        .unwrap();

    assert_eq!(
        rows(&joined),
        vec![row!["a", "x"], row!["a", "y"], row!["b", "z"]]
    );
}

#[test]
fn join_native_with_presorted_memory() {
    let (l, _) = selectors(&fixture());
    let labels = Selector::memory(
        vec![
            ColumnDescriptor::new("code", DataType::Int),
            ColumnDescriptor::new("label", DataType::Text),
        ],
        vec![row![2, "two"], row![3, "three"]],
    )
    .unwrap();

    let joined = rowsync_engine::join::join(
        SortedSelector::order_by_keys(&l, &["k"]).unwrap(),
        SortedSelector::trusted(labels, &["code"]),
        Some(JoinType::Left),
        &[JoinStatement::new("k", "code")],
        &JoinOptions::default(),
    )
    .unwrap()
    .with_columns(&["v".into(), "label".into()])
    .unwrap();

    assert_eq!(
        rows(&joined),
        vec![
            row!["a", Value::Null],
            row!["b", "two"],
            row!["c", "three"],
        ]
    );
}

#[test]
fn memory_selector_cannot_be_ordered_for_join() {
    let (l, _) = selectors(&fixture());
    let memory = Selector::memory(vec![ColumnDescriptor::new("k", DataType::Int)], vec![]).unwrap();
    assert!(matches!(
        l.apply_join(&memory, None, &on_k()),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn filter_joined_rows_by_right_column() {
    let (l, r) = selectors(&fixture());
    let joined = l
        .apply_join(&r, Some(JoinType::Left), &on_k())
        .unwrap()
        .with_filter(&FilterExpr::is_null("v_1"))
        .unwrap();
    assert_eq!(rows(&joined), vec![row![3, "c", Value::Null, Value::Null]]);
}

#[test]
fn join_of_joins() {
    let store = fixture();
    let (l, r) = selectors(&store);
    let first = l.apply_join(&r, None, &on_k()).unwrap();
    let second = first
        .with_order(&OrderExpr::ascending(&["k"]))
        .unwrap();
    let (l2, _) = selectors(&store);
    let nested = rowsync_engine::join::join(
        SortedSelector::trusted(second, &["k"]),
        SortedSelector::order_by_keys(&l2, &["k"]).unwrap(),
        None,
        &on_k(),
        &JoinOptions::default(),
    )
    .unwrap();

    assert_eq!(
        nested.columns().names(),
        vec!["k", "v", "k_1", "v_1", "k_2", "v_2"]
    );
    assert_eq!(rows(&nested).len(), 3);
}

#[test]
fn unknown_join_column() {
    let (l, r) = selectors(&fixture());
    let result = l.apply_join(&r, None, &[JoinStatement::new("k", "missing")]);
    assert!(matches!(result, Err(Error::InvalidReference(c)) if c == "missing"));
}

// ============================================================================
// Ordering and Release
// ============================================================================

#[test]
fn store_ignoring_order_is_detected() {
    let store = Arc::new(
        InProcessStore::new("lazy")
            .with_table(key_val_table("l", vec![row![1, "a"], row![2, "b"]]))
            .with_table(
                key_val_table("r", vec![row![2, "z"], row![1, "x"]]).ignoring_order(),
            ),
    );
    let (l, r) = selectors(&store);
    let joined = l.apply_join(&r, None, &on_k()).unwrap();

    let result: Result<Vec<Row>, Error> = joined.enumerate_all().unwrap().collect();
    assert_eq!(
        result,
        Err(Error::UnsortedInput {
            side: JoinSide::Right
        })
    );
}

#[test]
fn unsorted_side_named_in_callers_terms_for_right_join() {
    let store = Arc::new(
        InProcessStore::new("lazy")
            .with_table(key_val_table("l", vec![row![2, "b"], row![1, "a"]]).ignoring_order())
            .with_table(key_val_table("r", vec![row![1, "x"], row![2, "z"]])),
    );
    let (l, r) = selectors(&store);
    let joined = l.apply_join(&r, Some(JoinType::Right), &on_k()).unwrap();

    let result: Result<Vec<Row>, Error> = joined.enumerate_all().unwrap().collect();
    assert_eq!(
        result,
        Err(Error::UnsortedInput {
            side: JoinSide::Left
        })
    );
}

#[test]
fn releasing_join_stream_closes_both_inputs() {
    let store = fixture();
    let (l, r) = selectors(&store);
    let joined = l.apply_join(&r, None, &on_k()).unwrap();

    let mut stream = joined.enumerate_all().unwrap();
    stream.next_row().unwrap();
    let left = store.vec_table("l").unwrap();
    let right = store.vec_table("r").unwrap();
    assert_eq!(left.open_cursors(), 1);
    assert_eq!(right.open_cursors(), 1);

    stream.release();
    stream.release();
    assert_eq!(left.open_cursors(), 0);
    assert_eq!(right.open_cursors(), 0);
    assert!(matches!(stream.next_row(), Err(Error::Disposed)));
}

#[test]
fn join_enumerates_twice_independently() {
    let (l, r) = selectors(&fixture());
    let joined = l.apply_join(&r, None, &on_k()).unwrap();
    assert_eq!(rows(&joined), rows(&joined));
}
