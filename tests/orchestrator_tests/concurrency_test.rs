use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use figform::eval::EvaluationContext;
use figform::event_bus::{ErrorKind, EventReceiver, FieldEvent};
use figform::expression::Expression;
use figform::orchestrator::{ParameterValue, SlotKey, ValidationState};
use figform::{FieldDefinition, Response, ResponseStore};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use super::support::{greeting_label, orchestrator};

fn greeting() -> FieldDefinition {
    FieldDefinition::new("greeting", "textInfo").with_parameter("label", greeting_label())
}

fn changed(codes: &[&str]) -> HashSet<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

fn married_is(answer: &str) -> Expression {
    Expression::operator(
        "=",
        vec![Expression::property("responses.married.text"), Expression::literal(answer)],
    )
}

fn required_message() -> ValidationState {
    ValidationState::Invalid {
        message: "Field is required".into(),
    }
}

async fn next_validation_change(events: &mut EventReceiver) -> FieldEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event @ FieldEvent::ValidationChanged { .. }) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("validation was not refreshed")
}

#[tokio::test]
async fn test_last_issued_request_wins() {
    // 1回目は遅く、2回目は即座に解決する
    let (orchestrator, evaluator) = orchestrator(&[60, 0]);
    let (mut events, _errors) = orchestrator.subscribe();
    let field = greeting();

    let first = EvaluationContext::from_responses([("name", Response::text("Jo"))]);
    let second = EvaluationContext::from_responses([("name", Response::text("Sam"))]);
    orchestrator.resolve_parameters(&field, &first).unwrap();
    orchestrator.resolve_parameters(&field, &second).unwrap();
    orchestrator.settled().await;

    assert_eq!(evaluator.calls(), 2);
    assert_eq!(
        orchestrator.parameter("greeting", "label"),
        Some(ParameterValue::Ready(json!("Hello Sam")))
    );
    let resolved: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, FieldEvent::ParameterResolved { .. }))
        .collect();
    assert_eq!(resolved.len(), 1);
}

#[tokio::test]
async fn test_previous_value_is_kept_while_refreshing() {
    let (orchestrator, _) = orchestrator(&[0, 60]);
    let field = greeting();

    let first = EvaluationContext::from_responses([("name", Response::text("Jo"))]);
    orchestrator.resolve_parameters(&field, &first).unwrap();
    orchestrator.settled().await;

    let second = EvaluationContext::from_responses([("name", Response::text("Sam"))]);
    let refreshing = orchestrator.resolve_parameters(&field, &second).unwrap();
    assert_eq!(refreshing.get("label"), Some(&json!("Hello Jo")));

    orchestrator.settled().await;
    assert_eq!(
        orchestrator.parameter("greeting", "label"),
        Some(ParameterValue::Ready(json!("Hello Sam")))
    );
}

#[tokio::test]
async fn test_evaluation_uses_snapshot_taken_at_issue() {
    let (orchestrator, _) = orchestrator(&[30]);
    let store = ResponseStore::default();
    store.save("name", Response::text("Jo")).await.unwrap();

    let context = store.snapshot(Value::Null, Value::Null).await;
    orchestrator.resolve_parameters(&greeting(), &context).unwrap();
    store.save("name", Response::text("Sam")).await.unwrap();
    orchestrator.settled().await;

    assert_eq!(
        orchestrator.parameter("greeting", "label"),
        Some(ParameterValue::Ready(json!("Hello Jo")))
    );
    assert_eq!(context.revision(), 1);
    assert_eq!(store.revision(), 2);
}

#[tokio::test]
async fn test_invalidation_targets_dependents_only() {
    let (orchestrator, evaluator) = orchestrator(&[]);
    let contact = FieldDefinition::new("contact", "textInfo").with_parameter(
        "label",
        Expression::operator(
            "stringSubstitution",
            vec![
                Expression::literal("Write to %1"),
                Expression::property("responses.email.text"),
            ],
        ),
    );
    let fields = vec![greeting(), contact];
    let context = EvaluationContext::from_responses([
        ("name", Response::text("Jo")),
        ("email", Response::text("jo@example.com")),
    ]);
    for field in &fields {
        orchestrator.resolve_parameters(field, &context).unwrap();
    }
    orchestrator.settled().await;
    assert_eq!(evaluator.calls(), 2);

    let updated = EvaluationContext::from_responses([
        ("name", Response::text("Sam")),
        ("email", Response::text("jo@example.com")),
    ]);
    let invalidated = orchestrator
        .invalidate_on_context_change(&changed(&["name"]), &fields, &updated)
        .unwrap();
    assert_eq!(invalidated, vec![SlotKey::parameter("greeting", "label")]);

    orchestrator.settled().await;
    assert_eq!(evaluator.calls(), 3);
    assert_eq!(
        orchestrator.parameter("greeting", "label"),
        Some(ParameterValue::Ready(json!("Hello Sam")))
    );
    assert_eq!(
        orchestrator.parameter("contact", "label"),
        Some(ParameterValue::Ready(json!("Write to jo@example.com")))
    );
}

#[tokio::test]
async fn test_unknown_dependencies_are_always_invalidated() {
    let (orchestrator, _) = orchestrator(&[]);
    let dynamic_path = Expression::operator(
        "objectProperties",
        vec![Expression::property("applicationData.lookupPath")],
    );
    let field = FieldDefinition::new("lookup", "textInfo").with_parameter("value", dynamic_path);
    let context = EvaluationContext::default();
    orchestrator.resolve_parameters(&field, &context).unwrap();
    orchestrator.settled().await;

    let invalidated = orchestrator
        .invalidate_on_context_change(&changed(&["anything"]), &[field], &context)
        .unwrap();
    assert_eq!(invalidated, vec![SlotKey::parameter("lookup", "value")]);
    orchestrator.settled().await;
}

#[tokio::test]
async fn test_validation_is_invalidated_by_own_response() {
    let (orchestrator, _) = orchestrator(&[]);
    let field = FieldDefinition::new("age", "number").required(Expression::literal(true));
    let context = EvaluationContext::from_responses([("age", Response::text(""))]);
    orchestrator.evaluate_field(&field, &context, true).await.unwrap();
    assert!(orchestrator.validation_state("age").is_some());

    let fields = [field];
    let untouched = orchestrator
        .invalidate_on_context_change(&changed(&["name"]), &fields, &context)
        .unwrap();
    assert!(untouched.is_empty());

    let invalidated = orchestrator
        .invalidate_on_context_change(&changed(&["age"]), &fields, &context)
        .unwrap();
    assert_eq!(invalidated, vec![SlotKey::validation("age")]);
    assert_eq!(orchestrator.validation_state("age"), None);
}

#[tokio::test]
async fn test_error_in_one_field_is_isolated() {
    let (orchestrator, _) = orchestrator(&[]);
    let (_events, mut errors) = orchestrator.subscribe();
    let remote_check = Expression::operator(
        "GET",
        vec![Expression::literal("https://example.com/check")],
    );
    let broken = FieldDefinition::new("broken", "shortText").with_validation(remote_check, "Not allowed");
    let healthy = FieldDefinition::new("healthy", "shortText")
        .required(Expression::literal(true))
        .with_parameter("label", Expression::literal("Healthy"));
    let context = EvaluationContext::from_responses([
        ("broken", Response::text("x")),
        ("healthy", Response::text("y")),
    ]);

    let alone = orchestrator.evaluate_field(&healthy, &context, true).await.unwrap();
    let results = orchestrator
        .evaluate_fields(&[broken, healthy], &context, true)
        .await;

    let (code, broken_state) = &results[0];
    assert_eq!(code, "broken");
    let broken_state = broken_state.as_ref().unwrap();
    assert!(broken_state.validation.is_evaluation_error());
    assert!(!broken_state.is_valid());

    let (code, healthy_state) = &results[1];
    assert_eq!(code, "healthy");
    assert_eq!(healthy_state.as_ref().unwrap(), &alone);
    assert_eq!(alone.validation, ValidationState::Valid);

    let error = errors.recv().await.unwrap();
    assert_eq!(error.field, "broken");
    assert_eq!(error.kind, ErrorKind::Evaluation);
}

#[tokio::test]
async fn test_store_watcher_refreshes_dependents() {
    let (orchestrator, _) = orchestrator(&[]);
    let orchestrator = Arc::new(orchestrator);
    let store = Arc::new(ResponseStore::default());
    store.save("name", Response::text("Jo")).await.unwrap();
    let fields = Arc::new(vec![greeting()]);

    let context = store.snapshot(Value::Null, Value::Null).await;
    orchestrator.resolve_parameters(&fields[0], &context).unwrap();
    orchestrator.settled().await;

    let (mut events, _errors) = orchestrator.subscribe();
    let watcher = orchestrator.watch_store(store.clone(), fields, Value::Null, Value::Null, false);
    store.save("name", Response::text("Sam")).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event @ FieldEvent::ParameterResolved { .. }) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("label was not refreshed");

    assert_eq!(
        event,
        FieldEvent::ParameterResolved {
            field: "greeting".into(),
            parameter: "label".into(),
            value: ParameterValue::Ready(json!("Hello Sam")),
        }
    );
    watcher.abort();
}

#[tokio::test]
async fn test_last_issued_validation_wins() {
    let (orchestrator, evaluator) = orchestrator(&[60, 0]);
    let (mut events, _errors) = orchestrator.subscribe();
    let age = FieldDefinition::new("age", "number").with_validation(
        Expression::operator(
            ">",
            vec![Expression::property("thisResponse"), Expression::literal(18)],
        ),
        "Must be over 18",
    );
    let context = EvaluationContext::default();
    let young = context.with_candidate("age", Response::text("15"));
    let adult = context.with_candidate("age", Response::text("21"));

    let (first, second) = tokio::join!(
        orchestrator.validate_field(&age, false, true, &young),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            orchestrator.validate_field(&age, false, true, &adult).await
        }
    );

    assert_eq!(evaluator.calls(), 2);
    assert_eq!(
        first.unwrap(),
        ValidationState::Invalid {
            message: "Must be over 18".into()
        }
    );
    assert_eq!(second.unwrap(), ValidationState::Valid);
    assert_eq!(orchestrator.validation_state("age"), Some(ValidationState::Valid));
    assert_eq!(
        events.drain(),
        vec![FieldEvent::ValidationChanged {
            field: "age".into(),
            state: ValidationState::Valid,
        }]
    );
}

#[tokio::test]
async fn test_validation_follows_required_flag_of_other_field() {
    let (orchestrator, _) = orchestrator(&[]);
    let fields = [FieldDefinition::new("spouse", "shortText").required(married_is("yes"))];
    let married = EvaluationContext::from_responses([
        ("married", Response::text("yes")),
        ("spouse", Response::text("")),
    ]);
    let state = orchestrator.evaluate_field(&fields[0], &married, true).await.unwrap();
    assert_eq!(state.validation, required_message());
    assert_eq!(
        orchestrator
            .dependencies_of(&SlotKey::validation("spouse"))
            .unwrap()
            .response_codes(),
        vec!["married"]
    );

    let single = EvaluationContext::from_responses([
        ("married", Response::text("no")),
        ("spouse", Response::text("")),
    ]);
    let invalidated = orchestrator
        .invalidate_on_context_change(&changed(&["married"]), &fields, &single)
        .unwrap();
    assert_eq!(invalidated, vec![SlotKey::validation("spouse")]);
    assert_eq!(orchestrator.validation_state("spouse"), None);

    let state = orchestrator.evaluate_field(&fields[0], &single, true).await.unwrap();
    assert_eq!(state.validation, ValidationState::Valid);
}

#[tokio::test]
async fn test_validation_follows_visibility_of_other_field() {
    let (orchestrator, _) = orchestrator(&[]);
    let fields = [FieldDefinition::new("spouse", "shortText")
        .visible(married_is("yes"))
        .required(Expression::literal(true))];
    let single = EvaluationContext::from_responses([
        ("married", Response::text("no")),
        ("spouse", Response::text("")),
    ]);
    let state = orchestrator.evaluate_field(&fields[0], &single, true).await.unwrap();
    assert!(!state.is_visible);
    assert_eq!(orchestrator.validation_state("spouse"), Some(ValidationState::Valid));

    let married = EvaluationContext::from_responses([
        ("married", Response::text("yes")),
        ("spouse", Response::text("")),
    ]);
    let invalidated = orchestrator
        .invalidate_on_context_change(&changed(&["married"]), &fields, &married)
        .unwrap();
    assert_eq!(invalidated, vec![SlotKey::validation("spouse")]);

    let state = orchestrator.evaluate_field(&fields[0], &married, true).await.unwrap();
    assert!(state.is_visible);
    assert_eq!(state.validation, required_message());
}

#[tokio::test]
async fn test_store_watcher_revalidates_when_required_flag_flips() {
    let (orchestrator, _) = orchestrator(&[]);
    let orchestrator = Arc::new(orchestrator);
    let store = Arc::new(ResponseStore::default());
    store.save("married", Response::text("yes")).await.unwrap();
    store.save("spouse", Response::text("")).await.unwrap();
    let fields = Arc::new(vec![
        FieldDefinition::new("spouse", "shortText").required(married_is("yes"))
    ]);

    let context = store.snapshot(Value::Null, Value::Null).await;
    let state = orchestrator.evaluate_field(&fields[0], &context, true).await.unwrap();
    assert_eq!(state.validation, required_message());

    let (mut events, _errors) = orchestrator.subscribe();
    let watcher = orchestrator.watch_store(store.clone(), fields, Value::Null, Value::Null, true);
    store.save("married", Response::text("no")).await.unwrap();

    assert_eq!(
        next_validation_change(&mut events).await,
        FieldEvent::ValidationChanged {
            field: "spouse".into(),
            state: ValidationState::Valid,
        }
    );
    assert_eq!(orchestrator.validation_state("spouse"), Some(ValidationState::Valid));
    watcher.abort();
}

#[tokio::test]
async fn test_store_watcher_revalidates_when_field_becomes_visible() {
    let (orchestrator, _) = orchestrator(&[]);
    let orchestrator = Arc::new(orchestrator);
    let store = Arc::new(ResponseStore::default());
    store.save("married", Response::text("no")).await.unwrap();
    store.save("spouse", Response::text("")).await.unwrap();
    let fields = Arc::new(vec![FieldDefinition::new("spouse", "shortText")
        .visible(married_is("yes"))
        .required(Expression::literal(true))]);

    let context = store.snapshot(Value::Null, Value::Null).await;
    let state = orchestrator.evaluate_field(&fields[0], &context, true).await.unwrap();
    assert_eq!(state.validation, ValidationState::Valid);

    let (mut events, _errors) = orchestrator.subscribe();
    let watcher = orchestrator.watch_store(store.clone(), fields, Value::Null, Value::Null, true);
    store.save("married", Response::text("yes")).await.unwrap();

    assert_eq!(
        next_validation_change(&mut events).await,
        FieldEvent::ValidationChanged {
            field: "spouse".into(),
            state: required_message(),
        }
    );
    assert_eq!(orchestrator.validation_state("spouse"), Some(required_message()));
    watcher.abort();
}
