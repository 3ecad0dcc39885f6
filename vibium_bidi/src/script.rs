//! `script` module: expression evaluation and function calls in a
//! browsing context's realm.
//!
//! [BiDi script](https://w3c.github.io/webdriver-bidi/#module-script)

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use vibium_types::{Command, Method};

use crate::browsing_context::BrowsingContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Target {
    Context {
        context: BrowsingContext,
        #[serde(skip_serializing_if = "Option::is_none")]
        sandbox: Option<String>,
    },
}

impl Target {
    pub fn context(context: BrowsingContext) -> Self {
        Target::Context {
            context,
            sandbox: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    pub target: Target,
    pub await_promise: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ownership: Option<ResultOwnership>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOwnership {
    Root,
    None,
}

impl EvaluateParams {
    pub fn new(expression: impl Into<String>, context: BrowsingContext, await_promise: bool) -> Self {
        Self {
            expression: expression.into(),
            target: Target::context(context),
            await_promise,
            result_ownership: None,
        }
    }
}

impl Method for EvaluateParams {
    fn identifier(&self) -> Cow<'static, str> {
        "script.evaluate".into()
    }
}

impl Command for EvaluateParams {
    type Response = EvaluateResult;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    pub function_declaration: String,
    pub target: Target,
    pub arguments: Vec<LocalValue>,
    pub await_promise: bool,
}

impl CallFunctionParams {
    pub fn new(
        function_declaration: impl Into<String>,
        context: BrowsingContext,
        arguments: Vec<LocalValue>,
        await_promise: bool,
    ) -> Self {
        Self {
            function_declaration: function_declaration.into(),
            target: Target::context(context),
            arguments,
            await_promise,
        }
    }
}

impl Method for CallFunctionParams {
    fn identifier(&self) -> Cow<'static, str> {
        "script.callFunction".into()
    }
}

impl Command for CallFunctionParams {
    type Response = EvaluateResult;
}

/// A value passed into an evaluated/called script from the engine side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum LocalValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    #[serde(rename = "remoteReference")]
    RemoteReference(RemoteReference),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReference {
    pub handle: String,
}

/// Result of `script.evaluate`/`script.callFunction`: either a realm
/// result or a thrown-exception report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EvaluateResult {
    Success { result: RemoteValue },
    Exception { exception_details: ExceptionDetails },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    pub line_number: u64,
    pub column_number: u64,
}

/// A JS value mirrored back from the browser. `handle` is present for
/// object/node values and is what the engine stores as
/// `remoteObjectId` in the ref table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteValue {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub handle: Option<String>,
}
