use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use figform::config::OrchestratorConfig;
use figform::eval::{EvalError, EvalResult, EvaluationContext, ExpressionEvaluator};
use figform::expression::{is_empty_value, Expression, FragmentTable, Operator};
use figform::functions::FunctionRegistry;
use figform::FieldOrchestrator;
use serde_json::{json, Value};

/// Small interpreter for the handful of operators the tests use.
///
/// Each call first sleeps for the next queued delay, so tests can make an
/// earlier request resolve after a later one.
pub struct ScriptedEvaluator {
    functions: Arc<FunctionRegistry>,
    delays: Mutex<VecDeque<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            functions,
            delays: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delays(self, delays: &[u64]) -> Self {
        self.delays
            .lock()
            .unwrap()
            .extend(delays.iter().map(|ms| Duration::from_millis(*ms)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn interpret(&self, expression: &Expression, data: &Value) -> EvalResult<Value> {
        let node = match expression {
            Expression::Literal(value) => return Ok(value.clone()),
            Expression::Fragment(node) => {
                return Err(EvalError::Malformed(format!("unresolved fragment {}", node.fragment)))
            }
            Expression::Operator(node) => node,
        };
        let operator = Operator::from_name(&node.operator)
            .ok_or_else(|| EvalError::UnknownOperator(node.operator.clone()))?;
        let args = node
            .children
            .iter()
            .map(|child| self.interpret(child, data))
            .collect::<EvalResult<Vec<_>>>()?;

        match operator {
            Operator::ObjectProperties => {
                let path = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(lookup(data, path))
            }
            Operator::GreaterThan => {
                // 空の回答は必須チェックに任せる
                if args.first().map_or(true, is_empty_value) {
                    return Ok(json!(true));
                }
                Ok(json!(number(&args[0]) > number(&args[1])))
            }
            Operator::Equal => Ok(json!(args.windows(2).all(|pair| pair[0] == pair[1]))),
            Operator::StringSubstitution => {
                let mut text = args.first().map(as_text).unwrap_or_default();
                for (i, arg) in args.iter().enumerate().skip(1) {
                    text = text.replace(&format!("%{}", i), &as_text(arg));
                }
                Ok(Value::String(text))
            }
            Operator::CustomFunctions => {
                let name = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(self.functions.call(name, args.get(1..).unwrap_or(&[]))?)
            }
            Operator::Get | Operator::Post | Operator::Graphql => {
                Err(EvalError::Network("no network in tests".into()))
            }
            other => Err(EvalError::Other(format!("{} is not scripted", other))),
        }
    }
}

#[async_trait]
impl ExpressionEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.interpret(expression, &context.data())
    }
}

fn lookup(data: &Value, path: &str) -> Value {
    path.split('.')
        .try_fold(data, |value, segment| value.get(segment))
        .cloned()
        .unwrap_or(Value::Null)
}

fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn orchestrator_with(
    evaluator: Arc<ScriptedEvaluator>,
    functions: Arc<FunctionRegistry>,
    config: OrchestratorConfig,
) -> FieldOrchestrator {
    FieldOrchestrator::new(evaluator, Arc::new(FragmentTable::new()), functions, config)
        .expect("valid configuration")
}

pub fn orchestrator(delays: &[u64]) -> (FieldOrchestrator, Arc<ScriptedEvaluator>) {
    let functions = Arc::new(FunctionRegistry::standard());
    let evaluator = Arc::new(ScriptedEvaluator::new(functions.clone()).with_delays(delays));
    let orchestrator = orchestrator_with(evaluator.clone(), functions, OrchestratorConfig::default());
    (orchestrator, evaluator)
}

pub fn greeting_label() -> Expression {
    Expression::operator(
        "stringSubstitution",
        vec![
            Expression::literal("Hello %1"),
            Expression::property("responses.name.text"),
        ],
    )
}
