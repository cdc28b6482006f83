//! Tests for the stack orchestrator
//!
//! Covers skipping, lazy expansion of composite labels, error diagnosis
//! across nesting levels and persistence of forked stacks.

use tlb_stack::read::IntValue;
use tlb_stack::schema::{LabelId, StructureId, UNKNOWN_STRUCTURE};
use tlb_stack::{
    build_frame_for_structure, AllVariants, CalculatedTlbInfo, CellAddress, Error, Frame,
    LoadRequest, Path, ReadKind, ReadValue, Schema, SchemaBuilder, StepContext, StructuralExit,
    TlbField, TlbOptions, TlbStack,
};

const CELL: CellAddress = CellAddress(9);

fn request(kind: ReadKind) -> LoadRequest {
    LoadRequest::new(CELL, kind)
}

/// Pair = uint8 uint4
fn pair() -> (Schema, LabelId, StructureId, StructureId) {
    let mut builder = SchemaBuilder::new();
    let pair = builder.declare("Pair").unwrap();
    let uint8 = builder.uint(8);
    let uint4 = builder.uint(4);
    let low = builder.known_type(pair, uint4, vec![], builder.empty());
    let high = builder.known_type(pair, uint8, vec![], low);
    builder.define(pair, high).unwrap();
    (builder.finish().unwrap(), pair, high, low)
}

/// Outer = Inner uint2; Inner = uint4
fn nested() -> (Schema, LabelId, StructureId, StructureId, StructureId) {
    let mut builder = SchemaBuilder::new();
    let outer = builder.declare("Outer").unwrap();
    let inner = builder.declare("Inner").unwrap();
    let uint4 = builder.uint(4);
    let uint2 = builder.uint(2);

    let inner_body = builder.known_type(inner, uint4, vec![], builder.empty());
    builder.define(inner, inner_body).unwrap();

    let tail = builder.known_type(outer, uint2, vec![], builder.empty());
    let head = builder.known_type(outer, inner, vec![], tail);
    builder.define(outer, head).unwrap();

    (builder.finish().unwrap(), outer, head, tail, inner_body)
}

/// List = $0 | $1 uint8 List
fn list() -> (Schema, LabelId) {
    let mut builder = SchemaBuilder::new();
    let list = builder.declare("List").unwrap();
    let uint8 = builder.uint(8);
    let tail = builder.known_type(list, list, vec![], builder.empty());
    let item = builder.known_type(list, uint8, vec![], tail);
    let body = builder
        .switch(list, 1, vec![("0".into(), builder.empty()), ("1".into(), item)])
        .unwrap();
    builder.define(list, body).unwrap();
    (builder.finish().unwrap(), list)
}

fn top_structure(stack: &TlbStack) -> Option<StructureId> {
    match stack.top() {
        Some(Frame::KnownType(frame)) => Some(frame.structure_id()),
        Some(Frame::Switch(frame)) => Some(frame.structure_id()),
        _ => None,
    }
}

// ====================
// Skipping
// ====================

#[test]
fn test_skip_top_walks_prefixes() {
    let (schema, pair, high, low) = pair();
    let stack = TlbStack::new(&schema, pair, &TlbOptions::default()).unwrap();
    assert_eq!(top_structure(&stack), Some(high));

    let skipped = stack.skip_top(&schema).unwrap().unwrap();
    assert_eq!(top_structure(&skipped), Some(low));
    assert_eq!(skipped.depth(), 1);

    let finished = skipped.skip_top(&schema).unwrap().unwrap();
    assert!(finished.is_empty());
    assert_eq!(finished.skip_top(&schema).unwrap(), None);
}

#[test]
fn test_switch_frame_is_not_skippable() {
    let (schema, list) = list();
    let stack = TlbStack::new(&schema, list, &TlbOptions::default()).unwrap();
    assert!(matches!(stack.top(), Some(Frame::Switch(_))));
    assert!(!stack.top().unwrap().is_skippable());
    assert_eq!(stack.skip_top(&schema).unwrap(), None);
}

#[test]
fn test_finished_inner_frames_are_popped() {
    let (schema, _, head, tail, inner_body) = nested();
    let inner_frame =
        build_frame_for_structure(&schema, inner_body, &Path::root().enter(head), 4)
            .unwrap()
            .unwrap();
    let outer_frame = build_frame_for_structure(&schema, head, &Path::root(), 5)
        .unwrap()
        .unwrap();
    let stack = TlbStack::from_frames([outer_frame, inner_frame]);
    assert_eq!(stack.depth(), 2);

    // skipping the only prefix of Inner continues after Inner in Outer
    let skipped = stack.skip_top(&schema).unwrap().unwrap();
    assert_eq!(skipped.depth(), 1);
    assert_eq!(top_structure(&skipped), Some(tail));
}

// ====================
// Expansion
// ====================

#[test]
fn test_read_expands_composite_label() {
    let (schema, outer, head, tail, inner_body) = nested();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, outer, &TlbOptions::default()).unwrap();

    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].guard.is_true());

    let next = outcomes[0].stack().unwrap();
    assert_eq!(next.depth(), 1);
    assert_eq!(top_structure(next), Some(tail));
    assert_eq!(
        outcomes[0].value,
        Some(ReadValue::Int(IntValue::Field {
            field: TlbField::concrete(4, inner_body, Path::root().enter(head)).at(CELL),
            signed: false,
        }))
    );

    let outcomes = next.step(&ctx, &request(ReadKind::unsigned(2))).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].stack().unwrap().is_empty());
}

#[test]
fn test_expansion_spends_recursion_budget() {
    let (schema, outer, _, _, _) = nested();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, outer, &TlbOptions::with_depth(3)).unwrap();
    assert_eq!(stack.top().unwrap().left_tlb_depth(), 3);

    let expanded = stack
        .top()
        .unwrap()
        .expand_new_stack_frame(&schema)
        .unwrap()
        .unwrap();
    assert_eq!(expanded.left_tlb_depth(), 2);
    assert_eq!(expanded.path().level(), 1);

    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap();
    assert_eq!(outcomes[0].stack().unwrap().top().unwrap().left_tlb_depth(), 3);
}

#[test]
fn test_empty_composite_passes_read_through() {
    let mut builder = SchemaBuilder::new();
    let marker = builder.declare("Marker").unwrap();
    let wrapped = builder.declare("Wrapped").unwrap();
    let uint4 = builder.uint(4);
    builder.define(marker, builder.empty()).unwrap();
    let value = builder.known_type(wrapped, uint4, vec![], builder.empty());
    let body = builder.known_type(wrapped, marker, vec![], value);
    builder.define(wrapped, body).unwrap();
    let schema = builder.finish().unwrap();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);

    let stack = TlbStack::new(&schema, wrapped, &TlbOptions::default()).unwrap();
    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].stack().unwrap().is_empty());
    assert_eq!(
        outcomes[0].value,
        Some(ReadValue::Int(IntValue::Field {
            field: TlbField::concrete(4, value, Path::root()).at(CELL),
            signed: false,
        }))
    );
}

// ====================
// Error diagnosis
// ====================

#[test]
fn test_error_names_innermost_builtin() {
    let (schema, outer, _, _, _) = nested();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, outer, &TlbOptions::default()).unwrap();

    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(5))).unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].error().unwrap().exit {
        StructuralExit::ReadingOfUnexpectedType { expected_name, .. } => {
            assert_eq!(expected_name, "uint4")
        }
        other => panic!("unexpected exit {:?}", other),
    }
}

#[test]
fn test_shallower_diagnosis_is_kept() {
    let mut builder = SchemaBuilder::new();
    let funds = builder.declare("Funds").unwrap();
    let coins = builder.coins();
    let body = builder.known_type(funds, coins, vec![], builder.empty());
    builder.define(funds, body).unwrap();
    let schema = builder.finish().unwrap();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, funds, &TlbOptions::default()).unwrap();

    // uint7 fits neither the amount nor its 4-bit length prefix
    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(7))).unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].error().unwrap().exit {
        StructuralExit::ReadingOfUnexpectedType { expected, .. } => {
            assert_eq!(*expected, coins)
        }
        other => panic!("unexpected exit {:?}", other),
    }

    // the length prefix alone is readable through expansion
    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].stack().unwrap().depth(), 2);
}

#[test]
fn test_diagnosis_survives_successful_reads() {
    let mut builder = SchemaBuilder::new();
    let funds = builder.declare("Funds").unwrap();
    let coins = builder.coins();
    let body = builder.known_type(funds, coins, vec![], builder.empty());
    builder.define(funds, body).unwrap();
    let schema = builder.finish().unwrap();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, funds, &TlbOptions::default()).unwrap();

    // reading the length prefix expands Coins and remembers why
    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap();
    assert_eq!(outcomes.len(), 1);
    let inside = outcomes[0].stack().unwrap().clone();
    assert!(inside.deepest_error().is_some());

    // a bad read of the amount still names the label the caller saw
    let outcomes = inside.step(&ctx, &request(ReadKind::MsgAddr)).unwrap();
    let names: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match &o.error()?.exit {
            StructuralExit::ReadingOfUnexpectedType {
                expected,
                expected_name,
                ..
            } => Some((*expected, expected_name.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec![(coins, "Coins".to_string())]);
}

#[test]
fn test_opaque_label_is_hard_failure() {
    let mut builder = SchemaBuilder::new();
    let holder = builder.declare("Holder").unwrap();
    let dict = builder.opaque("HashmapE", 0);
    let body = builder.known_type(holder, dict, vec![], builder.empty());
    builder.define(holder, body).unwrap();
    let schema = builder.finish().unwrap();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, holder, &TlbOptions::default()).unwrap();

    let err = stack.step(&ctx, &request(ReadKind::unsigned(8))).unwrap_err();
    assert_eq!(
        err,
        Error::UninterpretableLabel {
            label: "HashmapE".into(),
            reason: "label has no built-in decoding rule".into(),
        }
    );
}

#[test]
fn test_exhausted_budget_is_hard_failure() {
    let (schema, outer, _, _, _) = nested();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, outer, &TlbOptions::with_depth(0)).unwrap();

    let err = stack.step(&ctx, &request(ReadKind::unsigned(4))).unwrap_err();
    assert!(matches!(
        err,
        Error::UninterpretableLabel { ref label, ref reason }
            if label == "Inner" && reason == "recursion budget exhausted"
    ));
}

#[test]
fn test_reachable_variants_respect_budget() {
    let (schema, list) = list();
    let options = TlbOptions::with_depth(1);
    let info = CalculatedTlbInfo::new(&schema, &options).unwrap();
    let ctx = StepContext::new(&schema, &info);

    // List at depth 1: one more element, then the inner List at depth 0
    let stack = TlbStack::new(&schema, list, &options).unwrap();
    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(1))).unwrap();
    assert_eq!(outcomes.len(), 2);
    let item = outcomes
        .iter()
        .find_map(|o| o.stack().filter(|s| !s.is_empty()))
        .unwrap()
        .clone();

    let outcomes = item.step(&ctx, &request(ReadKind::unsigned(8))).unwrap();
    let tail = outcomes[0].stack().unwrap().clone();

    // only the terminating variant is reachable at depth 0
    let outcomes = tail.step(&ctx, &request(ReadKind::unsigned(1))).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].stack().unwrap().is_empty());
}

// ====================
// Unknown and persistence
// ====================

#[test]
fn test_unknown_root_accepts_everything() {
    let mut builder = SchemaBuilder::new();
    let opaque = builder.declare("Anything").unwrap();
    builder.define(opaque, builder.unknown()).unwrap();
    let schema = builder.finish().unwrap();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, opaque, &TlbOptions::default()).unwrap();

    for kind in [ReadKind::unsigned(17), ReadKind::Coins, ReadKind::MsgAddr] {
        let outcomes = stack.step(&ctx, &request(kind)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].stack(), Some(&stack));
        assert_eq!(outcomes[0].value, None);
    }
}

#[test]
fn test_unknown_below_root_is_rejected() {
    let (schema, _, head, _, _) = nested();
    let result = build_frame_for_structure(
        &schema,
        UNKNOWN_STRUCTURE,
        &Path::root().enter(head),
        3,
    );
    assert_eq!(result.unwrap_err(), Error::MisplacedUnknown { level: 1 });
}

#[test]
fn test_forks_share_and_preserve_the_original() {
    let (schema, list) = list();
    let oracle = AllVariants(&schema);
    let ctx = StepContext::new(&schema, &oracle);
    let stack = TlbStack::new(&schema, list, &TlbOptions::default()).unwrap();
    let before = stack.frames();

    let outcomes = stack.step(&ctx, &request(ReadKind::unsigned(1))).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(stack.frames(), before);

    let depths: Vec<usize> = outcomes
        .iter()
        .map(|o| o.stack().unwrap().depth())
        .collect();
    assert_eq!(depths, vec![0, 1]);
}
