//! `evaluate(expr, await?)` handler: runs script in the target
//! context's realm. A bare expression is sent as-is; anything that
//! looks like a function body is wrapped in an immediately-invoked
//! function expression so `return` works the way callers expect.

use vibium_bidi::script::{EvaluateParams, EvaluateResult};

use crate::error::{EngineError, Result};
use crate::session::SessionState;

use super::resolve_context;

fn wrap_if_function_body(expr: &str) -> String {
    let trimmed = expr.trim_start();
    if trimmed.starts_with("function") || trimmed.starts_with('{') || trimmed.starts_with("async") {
        format!("(() => {expr})()")
    } else {
        expr.to_string()
    }
}

pub async fn evaluate(
    session: &mut SessionState,
    context: Option<&str>,
    expr: &str,
    await_promise: bool,
) -> Result<serde_json::Value> {
    let context = resolve_context(session, context)?;
    let expression = wrap_if_function_body(expr);
    let params = EvaluateParams::new(expression, context, await_promise);
    let response = session.transport.send(params).await?;
    match &response.result {
        EvaluateResult::Success { result } => Ok(result.value.clone().unwrap_or(serde_json::Value::Null)),
        EvaluateResult::Exception { exception_details } => Err(EngineError::msg(exception_details.text.clone())),
    }
}
