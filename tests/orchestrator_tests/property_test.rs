//! Property-based tests for the orchestrator guarantees.

use figform::eval::EvaluationContext;
use figform::expression::Expression;
use figform::orchestrator::{DefaultOutcome, ValidationState};
use figform::{FieldDefinition, Response};
use proptest::prelude::*;
use serde_json::{json, Value};

use super::support::{greeting_label, orchestrator};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Arbitrary literal parameter values.
fn literal_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 %$]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(2, 8, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::Array)
    })
}

fn non_empty_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,10}"
}

proptest! {
    #[test]
    fn test_default_never_overwrites_answers(
        answer in non_empty_text(),
        default in literal_strategy(),
        repeats in 1usize..5,
    ) {
        let rt = runtime();
        let (orchestrator, evaluator) = orchestrator(&[]);
        let current = Response::text(&answer);
        let context = EvaluationContext::from_responses([("field", current.clone())]);

        for _ in 0..repeats {
            let outcome = rt.block_on(orchestrator.apply_default(
                "field",
                &Expression::Literal(default.clone()),
                Some(&current),
                &context,
                |_| panic!("default applied over an answer"),
            )).unwrap();
            prop_assert_eq!(outcome, DefaultOutcome::Skipped);

            let outcome = rt.block_on(orchestrator.apply_default(
                "field",
                &Expression::property("currentUser.firstName"),
                Some(&current),
                &context,
                |_| panic!("default applied over an answer"),
            )).unwrap();
            prop_assert_eq!(outcome, DefaultOutcome::Skipped);
        }
        prop_assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_literal_parameters_are_idempotent(
        literals in prop::collection::btree_map("[a-z]{1,8}", literal_strategy(), 0..6),
        name in non_empty_text(),
    ) {
        let rt = runtime();
        let (orchestrator, _) = orchestrator(&[]);
        let field = literals.iter().fold(
            FieldDefinition::new("field", "shortText"),
            |field, (key, value)| field.with_parameter(key, Expression::Literal(value.clone())),
        );
        let context = EvaluationContext::from_responses([("name", Response::text(&name))]);

        let (first, second) = rt.block_on(async {
            let first = orchestrator.resolve_parameters(&field, &context).unwrap();
            let second = orchestrator.resolve_parameters(&field, &context).unwrap();
            (first, second)
        });
        prop_assert_eq!(&first, &second);
        for (key, value) in &literals {
            prop_assert_eq!(first.get(key), Some(value));
        }
    }

    #[test]
    fn test_validation_message_takes_precedence(message in "[a-zA-Z ]{1,20}") {
        let rt = runtime();
        let (orchestrator, _) = orchestrator(&[]);
        let failing = Expression::operator(
            "=",
            vec![Expression::property("thisResponse"), Expression::literal("expected")],
        );
        let context = EvaluationContext::from_responses([("field", Response::text(""))])
            .with_this_response("field");

        let state = rt.block_on(orchestrator.evaluate_validation(
            Some(&failing),
            Some(&message),
            true,
            true,
            &context,
        )).unwrap();
        prop_assert_eq!(state, ValidationState::Invalid { message });
    }

    #[test]
    fn test_placeholder_is_visible_before_resolution(name in non_empty_text()) {
        let rt = runtime();
        let (orchestrator, _) = orchestrator(&[]);
        let field = FieldDefinition::new("greeting", "textInfo").with_parameter("label", greeting_label());
        let context = EvaluationContext::from_responses([("name", Response::text(&name))]);

        let (pending, settled) = rt.block_on(async {
            let pending = orchestrator.resolve_parameters(&field, &context).unwrap();
            orchestrator.settled().await;
            let settled = orchestrator.resolve_parameters(&field, &context).unwrap();
            (pending, settled)
        });
        prop_assert_eq!(pending.get("label"), Some(&json!("Loading...")));
        prop_assert_eq!(settled.get("label"), Some(&json!(format!("Hello {}", name))));
    }
}
