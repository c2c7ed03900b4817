use forge_wasm_engine::stack::{EntryType, StackEntry, ValueStack};

#[test]
fn new_stack_is_empty() {
    let stack = ValueStack::new();
    assert_eq!(stack.size(), 0);
    assert!(stack.is_empty());
}

#[test]
fn push_and_pop_round_trip_by_tag() {
    let mut stack = ValueStack::new();
    stack.push_i32(0xDEAD_BEEF);
    assert_eq!(stack.size(), 1);
    assert_eq!(stack.pop(), Some(StackEntry::I32(0xDEAD_BEEF)));
    assert!(stack.is_empty());

    stack.push_i64(0xDEAD_BEEF_CAFE_D00D);
    assert_eq!(stack.pop(), Some(StackEntry::I64(0xDEAD_BEEF_CAFE_D00D)));
    assert!(stack.is_empty());
}

#[test]
fn pop_on_empty_stack_is_none() {
    let mut stack = ValueStack::new();
    assert_eq!(stack.pop(), None);
}

#[test]
fn pops_reverse_push_order() {
    let mut stack = ValueStack::new();
    let pushed: Vec<u32> = vec![3, 1, 4, 1, 5, 9, 2, 6];
    for value in &pushed {
        stack.push_i32(*value);
    }
    for expected in pushed.iter().rev() {
        assert_eq!(stack.pop(), Some(StackEntry::I32(*expected)));
    }
    assert!(stack.is_empty());
}

#[test]
fn size_tracks_pushes_and_pops() {
    let mut stack = ValueStack::new();
    assert_eq!(stack.size(), 0);
    stack.push_i32(1);
    assert_eq!(stack.size(), 1);
    stack.push_i32(2);
    assert_eq!(stack.size(), 2);
    stack.pop();
    assert_eq!(stack.size(), 1);
}

#[test]
fn has_at_least_counts_entries() {
    let mut stack = ValueStack::new();
    assert!(!stack.has_at_least(1));
    stack.push_i32(123);
    assert!(stack.has_at_least(1));
    assert!(!stack.has_at_least(2));
}

#[test]
fn peek_returns_top_entries_oldest_first() {
    let mut stack = ValueStack::new();
    stack.push_i64(0);
    stack.push_i32(123);
    stack.push_i32(456);

    let top = stack
        .peek_top_if_all_of_type(2, EntryType::I32)
        .expect("top two are i32");
    assert_eq!(top, &[StackEntry::I32(123), StackEntry::I32(456)]);
}

#[test]
fn peek_rejects_mixed_tags() {
    let mut stack = ValueStack::new();
    stack.push_i64(0);
    stack.push_i64(123);
    stack.push_i32(456);
    assert_eq!(stack.peek_top_if_all_of_type(2, EntryType::I32), None);
}

#[test]
fn peek_rejects_short_stack() {
    let mut stack = ValueStack::new();
    stack.push_i32(123);
    assert_eq!(stack.peek_top_if_all_of_type(2, EntryType::I32), None);
}

#[test]
fn peek_is_pure() {
    let mut stack = ValueStack::new();
    stack.push_i32(1);
    stack.push_i32(2);

    let first: Vec<StackEntry> = stack
        .peek_top_if_all_of_type(2, EntryType::I32)
        .expect("both entries are i32")
        .to_vec();
    let second: Vec<StackEntry> = stack
        .peek_top_if_all_of_type(2, EntryType::I32)
        .expect("still both i32")
        .to_vec();
    assert_eq!(first, second);
    assert_eq!(stack.size(), 2);
}

#[test]
fn drop_all_or_nothing_requires_full_count() {
    let mut stack = ValueStack::new();
    stack.push_i32(42);
    assert!(!stack.drop_entries(2, true));
    assert_eq!(stack.size(), 1);

    stack.push_i32(99);
    assert!(stack.drop_entries(1, true));
    assert_eq!(stack.size(), 1);
}

#[test]
fn drop_lenient_truncates_what_is_available() {
    let mut stack = ValueStack::new();
    stack.push_i32(42);
    assert!(stack.drop_entries(3, false));
    assert!(stack.is_empty());
}

#[test]
fn drop_on_empty_stack_reports_failure() {
    let mut stack = ValueStack::new();
    assert!(!stack.drop_entries(1, false));
    assert!(!stack.drop_entries(1, true));
}

#[test]
fn entry_type_matches_payload() {
    assert_eq!(StackEntry::I32(0).entry_type(), EntryType::I32);
    assert_eq!(StackEntry::I64(0).entry_type(), EntryType::I64);
    assert_eq!(StackEntry::F32(0.0).entry_type(), EntryType::F32);
    assert_eq!(StackEntry::F64(0.0).entry_type(), EntryType::F64);

    assert_eq!(StackEntry::I32(7).as_i32(), Some(7));
    assert_eq!(StackEntry::I32(7).as_i64(), None);
    assert_eq!(StackEntry::I64(7).as_i64(), Some(7));
}
