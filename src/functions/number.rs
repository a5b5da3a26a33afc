use serde_json::{json, Value};

use super::{arg, number_arg, CustomFunction, FunctionRegistry, FunctionResult};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "roundNumber",
        CustomFunction::new(
            "Rounds a number to the given decimal places (default 0)",
            vec![json!(3.14159), json!(2)],
            round_number,
        ),
    );
}

fn round_number(args: &[Value]) -> FunctionResult<Value> {
    let value = number_arg("roundNumber", args, 0)?;
    let places = match arg(args, 1) {
        Some(_) => number_arg("roundNumber", args, 1)?.clamp(0.0, 15.0) as i32,
        None => 0,
    };
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if places == 0 {
        return Ok(json!(rounded as i64));
    }
    Ok(json!(rounded))
}
