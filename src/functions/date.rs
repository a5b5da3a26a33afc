use std::fmt::Write;

use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use super::{arg, number_arg, string_arg, CustomFunction, FunctionError, FunctionRegistry, FunctionResult};

const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "getYear",
        CustomFunction::new(
            "Year of the given ISO date, or of today when no date is given",
            vec![],
            get_year,
        ),
    );
    registry.register(
        "getFormattedDate",
        CustomFunction::new(
            "Formats an ISO date with a strftime pattern (default %d/%m/%Y)",
            vec![json!("2024-01-31"), json!("%d %B %Y")],
            get_formatted_date,
        ),
    );
    registry.register(
        "generateExpiry",
        CustomFunction::new(
            "ISO date a duration ({years, months, days} or a number of days) after the start date (default today)",
            vec![json!({"years": 1})],
            generate_expiry,
        ),
    );
    registry.register(
        "isExpired",
        CustomFunction::new(
            "Whether the given ISO date is before today",
            vec![json!("2000-01-01")],
            is_expired,
        ),
    );
}

pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn date_arg(function: &str, args: &[Value], index: usize) -> FunctionResult<NaiveDate> {
    let raw = string_arg(function, args, index)?;
    parse_date(&raw)
        .ok_or_else(|| FunctionError::invalid_argument(function, format!("\"{}\" is not a date", raw)))
}

fn get_year(args: &[Value]) -> FunctionResult<Value> {
    use chrono::Datelike;
    let date = match arg(args, 0) {
        Some(_) => date_arg("getYear", args, 0)?,
        None => today(),
    };
    Ok(json!(date.year()))
}

fn get_formatted_date(args: &[Value]) -> FunctionResult<Value> {
    let date = date_arg("getFormattedDate", args, 0)?;
    let format = match arg(args, 1) {
        Some(_) => string_arg("getFormattedDate", args, 1)?,
        None => DEFAULT_DATE_FORMAT.to_string(),
    };
    let mut out = String::new();
    write!(out, "{}", date.format(&format)).map_err(|_| {
        FunctionError::invalid_argument("getFormattedDate", format!("invalid format \"{}\"", format))
    })?;
    Ok(Value::String(out))
}

fn generate_expiry(args: &[Value]) -> FunctionResult<Value> {
    let start = match arg(args, 1) {
        Some(_) => date_arg("generateExpiry", args, 1)?,
        None => today(),
    };
    let too_large = || FunctionError::invalid_argument("generateExpiry", "duration too large");
    let (months, days) = match arg(args, 0) {
        Some(Value::Object(duration)) => {
            let field = |key: &str| duration.get(key).and_then(Value::as_u64).unwrap_or(0);
            let months = field("years")
                .checked_mul(12)
                .and_then(|m| m.checked_add(field("months")))
                .ok_or_else(too_large)?;
            (months, field("days"))
        }
        Some(_) => (0, number_arg("generateExpiry", args, 0)?.max(0.0) as u64),
        None => {
            return Err(FunctionError::invalid_argument(
                "generateExpiry",
                "missing duration",
            ))
        }
    };
    let months = u32::try_from(months).map_err(|_| too_large())?;
    let expiry = start
        .checked_add_months(Months::new(months))
        .and_then(|d| d.checked_add_days(Days::new(days)))
        .ok_or_else(|| FunctionError::invalid_argument("generateExpiry", "date out of range"))?;
    Ok(Value::String(expiry.format("%Y-%m-%d").to_string()))
}

fn is_expired(args: &[Value]) -> FunctionResult<Value> {
    let date = date_arg("isExpired", args, 0)?;
    Ok(Value::Bool(date < today()))
}
