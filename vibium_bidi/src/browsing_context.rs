//! `browsingContext` module: navigation, tabs/frames, screenshots and
//! user prompts.
//!
//! [BiDi browsingContext](https://w3c.github.io/webdriver-bidi/#module-browsingContext)

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use vibium_types::{Command, Event, Method};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct BrowsingContext(String);

impl BrowsingContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl AsRef<str> for BrowsingContext {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BrowsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle event `navigate` should wait for before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadinessState {
    None,
    Interactive,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub context: BrowsingContext,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<ReadinessState>,
}

impl NavigateParams {
    pub fn new(context: BrowsingContext, url: impl Into<String>) -> Self {
        Self {
            context,
            url: url.into(),
            wait: Some(ReadinessState::Complete),
        }
    }
}

impl Method for NavigateParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.navigate".into()
    }
}

impl Command for NavigateParams {
    type Response = NavigateResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    pub navigation: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    #[serde(rename = "type")]
    pub kind: CreateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_context: Option<BrowsingContext>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateType {
    Tab,
    Window,
}

impl CreateParams {
    pub fn new(kind: CreateType) -> Self {
        Self {
            kind,
            reference_context: None,
        }
    }
}

impl Method for CreateParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.create".into()
    }
}

impl Command for CreateParams {
    type Response = CreateResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub context: BrowsingContext,
}

/// Reads the current context tree, for seeding a freshly negotiated
/// session with the tabs/frames that already exist.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTreeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<BrowsingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u64>,
}

impl GetTreeParams {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Method for GetTreeParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.getTree".into()
    }
}

impl Command for GetTreeParams {
    type Response = GetTreeResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTreeResult {
    pub contexts: Vec<ContextTreeNode>,
}

/// One node of the tree `getTree` returns: a tab or frame, with its
/// children nested directly rather than linked by parent id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTreeNode {
    pub context: BrowsingContext,
    pub url: String,
    #[serde(default)]
    pub children: Vec<ContextTreeNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseParams {
    pub context: BrowsingContext,
}

impl Method for CloseParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.close".into()
    }
}

impl Command for CloseParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageFormat {
    Png,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenshotOrigin {
    Viewport,
    Document,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureScreenshotParams {
    pub context: BrowsingContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ScreenshotOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipRectangle>,
}

impl CaptureScreenshotParams {
    pub fn new(context: BrowsingContext) -> Self {
        Self {
            context,
            origin: None,
            clip: None,
        }
    }

    pub fn full_page(mut self) -> Self {
        self.origin = Some(ScreenshotOrigin::Document);
        self
    }

    pub fn with_clip(mut self, clip: ClipRectangle) -> Self {
        self.clip = Some(clip);
        self
    }
}

impl Method for CaptureScreenshotParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.captureScreenshot".into()
    }
}

impl Command for CaptureScreenshotParams {
    type Response = CaptureScreenshotResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureScreenshotResult {
    /// base64-encoded PNG data.
    pub data: String,
}

/// Accept or dismiss a `beforeunload`/`alert`/`confirm`/`prompt` dialog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleUserPromptParams {
    pub context: BrowsingContext,
    pub accept: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_text: Option<String>,
}

impl HandleUserPromptParams {
    pub fn accept(context: BrowsingContext, text: Option<String>) -> Self {
        Self {
            context,
            accept: true,
            user_text: text,
        }
    }

    pub fn dismiss(context: BrowsingContext) -> Self {
        Self {
            context,
            accept: false,
            user_text: None,
        }
    }
}

impl Method for HandleUserPromptParams {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.handleUserPrompt".into()
    }
}

impl Command for HandleUserPromptParams {
    type Response = serde_json::Value;
}

// ---- events ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub context: BrowsingContext,
    pub parent: Option<BrowsingContext>,
    pub url: String,
}

impl Method for ContextInfo {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.contextCreated".into()
    }
}
impl Event for ContextInfo {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationInfo {
    pub context: BrowsingContext,
    pub navigation: Option<String>,
    pub url: String,
}

impl Method for NavigationInfo {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.navigationStarted".into()
    }
}
impl Event for NavigationInfo {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptType {
    Alert,
    Confirm,
    Prompt,
    Beforeunload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptOpened {
    pub context: BrowsingContext,
    #[serde(rename = "type")]
    pub kind: PromptType,
    pub message: String,
}

impl Method for UserPromptOpened {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.userPromptOpened".into()
    }
}
impl Event for UserPromptOpened {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptClosed {
    pub context: BrowsingContext,
    pub accepted: bool,
}

impl Method for UserPromptClosed {
    fn identifier(&self) -> Cow<'static, str> {
        "browsingContext.userPromptClosed".into()
    }
}
impl Event for UserPromptClosed {}

/// Fired for both `browsingContext.domContentLoaded` and
/// `browsingContext.load`; the method name on the envelope tells them
/// apart, the payload shape is identical.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub context: BrowsingContext,
    pub navigation: Option<String>,
    pub url: String,
}
