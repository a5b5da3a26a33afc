use std::sync::Arc;

use figform::config::OrchestratorConfig;
use figform::eval::{EvaluationContext, ExpressionEvaluator};
use figform::expression::Expression;
use figform::functions::FunctionRegistry;
use figform::orchestrator::ParameterValue;
use figform::FieldDefinition;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::support::{orchestrator_with, ScriptedEvaluator};

#[test]
fn test_preview_and_evaluation_share_the_registry() {
    let functions = Arc::new(FunctionRegistry::standard());
    let orchestrator = orchestrator_with(
        Arc::new(ScriptedEvaluator::new(functions.clone())),
        functions.clone(),
        OrchestratorConfig::default(),
    );

    assert!(Arc::ptr_eq(orchestrator.functions(), &functions));
    assert_eq!(orchestrator.functions().fingerprint(), FunctionRegistry::standard().fingerprint());
}

#[test]
fn test_every_standard_function_previews() {
    let registry = FunctionRegistry::standard();
    for name in [
        "getYear",
        "getFormattedDate",
        "generateExpiry",
        "isExpired",
        "lowerCase",
        "upperCase",
        "filterArray",
        "joinStrings",
        "extractNumber",
        "roundNumber",
    ] {
        let function = registry
            .get(name)
            .unwrap_or_else(|| panic!("{} is not registered", name));
        assert!(!function.description.is_empty());
        assert!(function.preview().is_ok(), "{} failed its preview", name);
    }
}

#[tokio::test]
async fn test_preview_matches_authoritative_result() {
    let functions = Arc::new(FunctionRegistry::standard());
    let preview = ScriptedEvaluator::new(functions.clone());
    let orchestrator = orchestrator_with(
        Arc::new(ScriptedEvaluator::new(functions.clone())),
        functions.clone(),
        OrchestratorConfig::default(),
    );
    let upper = Expression::operator(
        "objectFunctions",
        vec![
            Expression::literal("functions.upperCase"),
            Expression::property("responses.name.text"),
        ],
    );
    let field = FieldDefinition::new("shout", "textInfo").with_parameter("label", upper.clone());
    let context = EvaluationContext::from_responses([("name", figform::Response::text("jo"))]);

    let previewed = preview.evaluate(&upper, &context).await.unwrap();
    orchestrator.resolve_parameters(&field, &context).unwrap();
    orchestrator.settled().await;

    assert_eq!(previewed, json!("JO"));
    assert_eq!(
        orchestrator.parameter("shout", "label"),
        Some(ParameterValue::Ready(previewed))
    );
}

#[tokio::test]
async fn test_unregistered_function_is_a_configuration_error() {
    let functions = Arc::new(FunctionRegistry::standard());
    let orchestrator = orchestrator_with(
        Arc::new(ScriptedEvaluator::new(functions.clone())),
        functions,
        OrchestratorConfig::development(),
    );
    let field = FieldDefinition::new("shout", "textInfo").with_parameter(
        "label",
        Expression::operator("objectFunctions", vec![Expression::literal("functions.shout")]),
    );

    let result = orchestrator.resolve_parameters(&field, &EvaluationContext::default());
    assert!(result.is_err_and(|e| e.is_configuration()));
}
