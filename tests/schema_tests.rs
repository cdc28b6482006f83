//! Tests for schema building and schema documents

use tlb_stack::schema::{AtomicLabel, Label, SizeFormula, Structure};
use tlb_stack::{Endian, Error, ErrorSeverity, SchemaBuilder, SchemaDescription};

// ====================
// Builder
// ====================

#[test]
fn test_mutually_recursive_labels() {
    let mut builder = SchemaBuilder::new();
    let even = builder.declare("Even").unwrap();
    let odd = builder.declare("Odd").unwrap();
    let bit = builder.uint(1);

    let odd_tail = builder.known_type(even, odd, vec![], builder.empty());
    let even_body = builder
        .switch(
            even,
            1,
            vec![("0".into(), builder.empty()), ("1".into(), odd_tail)],
        )
        .unwrap();
    let odd_body = {
        let rest = builder.known_type(odd, even, vec![], builder.empty());
        builder.known_type(odd, bit, vec![], rest)
    };
    builder.define(even, even_body).unwrap();
    builder.define(odd, odd_body).unwrap();

    let schema = builder.finish().unwrap();
    assert_eq!(schema.internal_structure(even), Some(even_body));
    assert_eq!(schema.internal_structure(odd), Some(odd_body));
    assert_eq!(schema.label_by_name("Odd"), Some(odd));
    assert_eq!(schema.structure(even_body).owner(), Some(even));
}

#[test]
fn test_builtin_labels_are_shared() {
    let mut builder = SchemaBuilder::new();
    assert_eq!(builder.uint(8), builder.uint(8));
    assert_ne!(builder.uint(8), builder.int(8));
    assert_eq!(builder.coins(), builder.coins());
    assert_eq!(builder.full_msg_addr(), builder.full_msg_addr());
}

#[test]
fn test_coins_body_is_length_then_amount() {
    let mut builder = SchemaBuilder::new();
    let coins = builder.coins();
    let schema = builder.finish().unwrap();

    let body = schema.internal_structure(coins).unwrap();
    let Structure::KnownTypePrefix { label, rest, .. } = schema.structure(body) else {
        panic!("coins body must start with a prefix");
    };
    assert_eq!(
        schema.label(*label),
        &Label::Atomic(AtomicLabel::Integer {
            size: 4,
            signed: false,
            endian: Endian::BigEndian,
        })
    );
    let Structure::KnownTypePrefix {
        label,
        type_arg_ids,
        ..
    } = schema.structure(*rest)
    else {
        panic!("coins amount must follow its length");
    };
    assert_eq!(type_arg_ids, &vec![body]);
    assert!(matches!(
        schema.label(*label),
        Label::Atomic(AtomicLabel::VarInteger {
            upper_bound: 120,
            bit_size: SizeFormula::ArgTimes { arg: 0, factor: 8 },
            ..
        })
    ));
}

#[test]
fn test_switch_key_length_mismatch() {
    let mut builder = SchemaBuilder::new();
    let owner = builder.declare("Bad").unwrap();
    let result = builder.switch(
        owner,
        2,
        vec![("0".into(), builder.empty()), ("11".into(), builder.empty())],
    );
    assert!(matches!(result, Err(Error::InvalidSwitch { .. })));
}

#[test]
fn test_switch_key_must_be_bits() {
    let mut builder = SchemaBuilder::new();
    let owner = builder.declare("Bad").unwrap();
    let result = builder.switch(owner, 1, vec![("x".into(), builder.empty())]);
    assert!(matches!(result, Err(Error::InvalidSwitch { .. })));
}

#[test]
fn test_declared_label_without_body() {
    let mut builder = SchemaBuilder::new();
    builder.declare("Orphan").unwrap();
    assert_eq!(
        builder.finish().unwrap_err(),
        Error::MissingStructure {
            name: "Orphan".into()
        }
    );
}

#[test]
fn test_duplicate_declaration() {
    let mut builder = SchemaBuilder::new();
    builder.declare("Twice").unwrap();
    assert!(matches!(
        builder.declare("Twice"),
        Err(Error::DuplicateLabel { .. })
    ));
}

#[test]
fn test_arity_mismatch() {
    let mut builder = SchemaBuilder::new();
    let owner = builder.declare("Sized").unwrap();
    let var = builder.atomic(AtomicLabel::VarInteger {
        signed: false,
        endian: Endian::BigEndian,
        upper_bound: 32,
        bit_size: SizeFormula::ArgTimes { arg: 0, factor: 1 },
    });
    let body = builder.known_type(owner, var, vec![], builder.empty());
    builder.define(owner, body).unwrap();

    let err = builder.finish().unwrap_err();
    assert!(matches!(
        err,
        Error::ArityMismatch {
            expected: 1,
            got: 0,
            ..
        }
    ));
    assert_eq!(err.classify(), ErrorSeverity::Fatal);
}

#[test]
fn test_signed_type_argument_rejected() {
    let mut builder = SchemaBuilder::new();
    let owner = builder.declare("Sized").unwrap();
    let len = builder.int(5);
    let var = builder.atomic(AtomicLabel::VarInteger {
        signed: false,
        endian: Endian::BigEndian,
        upper_bound: 32,
        bit_size: SizeFormula::ArgTimes { arg: 0, factor: 1 },
    });
    let len_id = builder.reserve();
    let value = builder.known_type(owner, var, vec![len_id], builder.empty());
    builder
        .place(
            len_id,
            Structure::KnownTypePrefix {
                label: len,
                type_arg_ids: vec![],
                rest: value,
                owner,
            },
        )
        .unwrap();
    builder.define(owner, len_id).unwrap();

    assert!(matches!(
        builder.finish(),
        Err(Error::InvalidTypeArgument { .. })
    ));
}

#[test]
fn test_reserved_slot_must_be_placed() {
    let mut builder = SchemaBuilder::new();
    builder.reserve();
    assert!(builder.finish().is_err());
}

// ====================
// Schema documents
// ====================

const MESSAGE: &str = r#"{
    "labels": [
        {
            "name": "Transfer",
            "structure": {
                "kind": "prefix", "label": { "builtin": "uint", "size": 32 },
                "rest": {
                    "kind": "prefix", "label": { "builtin": "coins" },
                    "rest": {
                        "kind": "prefix", "label": { "builtin": "msg_addr" },
                        "rest": {
                            "kind": "prefix", "label": { "builtin": "maybe_ref", "of": "Payload" },
                            "rest": { "kind": "empty" }
                        }
                    }
                }
            }
        },
        {
            "name": "Payload",
            "structure": {
                "kind": "prefix", "label": { "builtin": "uint", "size": 5 }, "name": "len",
                "rest": {
                    "kind": "prefix",
                    "label": { "builtin": "var_uint", "upper_bound": 31 },
                    "args": ["len"],
                    "rest": { "kind": "empty" }
                }
            }
        }
    ]
}"#;

#[test]
fn test_document_compiles_with_builtins() {
    let schema = SchemaDescription::from_json(MESSAGE)
        .unwrap()
        .compile()
        .unwrap();
    let transfer = schema.label_by_name("Transfer").unwrap();
    let payload = schema.label_by_name("Payload").unwrap();
    assert!(schema.internal_structure(transfer).is_some());
    assert!(schema.internal_structure(payload).is_some());

    let builtins: Vec<String> = schema
        .composite_labels()
        .filter(|label| schema.label(*label).is_builtin())
        .map(|label| schema.label_name(label))
        .collect();
    assert!(builtins.contains(&"Coins".to_string()));
    assert!(builtins.contains(&"MsgAddress".to_string()));
    assert!(builtins.contains(&"Maybe".to_string()));
}

#[test]
fn test_document_with_undefined_reference() {
    let json = r#"{
        "labels": [{
            "name": "A",
            "structure": { "kind": "prefix", "label": "B", "rest": { "kind": "empty" } }
        }]
    }"#;
    let result = SchemaDescription::from_json(json).unwrap().compile();
    assert_eq!(result.unwrap_err(), Error::UndefinedLabel { name: "B".into() });
}

#[test]
fn test_document_switch_with_bad_key() {
    let json = r#"{
        "labels": [{
            "name": "A",
            "structure": {
                "kind": "switch", "size": 2,
                "variants": { "0": { "kind": "empty" }, "10": { "kind": "empty" } }
            }
        }]
    }"#;
    let result = SchemaDescription::from_json(json).unwrap().compile();
    assert!(matches!(result, Err(Error::InvalidSwitch { .. })));
}

#[test]
fn test_malformed_document_is_recoverable() {
    let err = SchemaDescription::from_json(r#"{"labels": [{"name": 1}]}"#).unwrap_err();
    assert!(matches!(err, Error::SchemaDescription(_)));
    assert_eq!(err.classify(), ErrorSeverity::Recoverable);
}
