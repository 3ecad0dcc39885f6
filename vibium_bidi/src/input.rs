//! `input` module: synthesized pointer and keyboard actions.
//!
//! [BiDi input](https://w3c.github.io/webdriver-bidi/#module-input)

use std::borrow::Cow;

use serde::Serialize;
use vibium_types::{Command, Method};

use crate::browsing_context::BrowsingContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SourceActions {
    #[serde(rename = "pointer")]
    Pointer {
        id: String,
        actions: Vec<PointerAction>,
    },
    #[serde(rename = "key")]
    Key { id: String, actions: Vec<KeyAction> },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PointerAction {
    #[serde(rename = "pointerMove")]
    Move {
        x: f64,
        y: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },
    #[serde(rename = "pointerDown")]
    Down { button: u8 },
    #[serde(rename = "pointerUp")]
    Up { button: u8 },
    #[serde(rename = "pause")]
    Pause { duration: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum KeyAction {
    #[serde(rename = "keyDown")]
    Down { value: String },
    #[serde(rename = "keyUp")]
    Up { value: String },
    #[serde(rename = "pause")]
    Pause { duration: u64 },
}

impl PointerAction {
    pub fn click_sequence() -> Vec<PointerAction> {
        vec![
            PointerAction::Down { button: 0 },
            PointerAction::Up { button: 0 },
        ]
    }

    pub fn dblclick_sequence() -> Vec<PointerAction> {
        let mut actions = Self::click_sequence();
        actions.push(PointerAction::Pause { duration: 50 });
        actions.extend(Self::click_sequence());
        actions
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformActionsParams {
    pub context: BrowsingContext,
    pub actions: Vec<SourceActions>,
}

impl PerformActionsParams {
    pub fn new(context: BrowsingContext, actions: Vec<SourceActions>) -> Self {
        Self { context, actions }
    }
}

impl Method for PerformActionsParams {
    fn identifier(&self) -> Cow<'static, str> {
        "input.performActions".into()
    }
}

impl Command for PerformActionsParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseActionsParams {
    pub context: BrowsingContext,
}

impl Method for ReleaseActionsParams {
    fn identifier(&self) -> Cow<'static, str> {
        "input.releaseActions".into()
    }
}

impl Command for ReleaseActionsParams {
    type Response = serde_json::Value;
}

/// Builds the pointer-move-then-click sequence used by `click`/`hover`,
/// and the two-stage drag gesture used by `dragTo`.
pub fn pointer_click_at(context: BrowsingContext, x: f64, y: f64) -> PerformActionsParams {
    let mut actions = vec![PointerAction::Move {
        x,
        y,
        duration: Some(0),
    }];
    actions.extend(PointerAction::click_sequence());
    PerformActionsParams::new(
        context,
        vec![SourceActions::Pointer {
            id: "vibium-pointer".to_string(),
            actions,
        }],
    )
}

pub fn pointer_dblclick_at(context: BrowsingContext, x: f64, y: f64) -> PerformActionsParams {
    let mut actions = vec![PointerAction::Move {
        x,
        y,
        duration: Some(0),
    }];
    actions.extend(PointerAction::dblclick_sequence());
    PerformActionsParams::new(
        context,
        vec![SourceActions::Pointer {
            id: "vibium-pointer".to_string(),
            actions,
        }],
    )
}

pub fn pointer_move_to(context: BrowsingContext, x: f64, y: f64) -> PerformActionsParams {
    PerformActionsParams::new(
        context,
        vec![SourceActions::Pointer {
            id: "vibium-pointer".to_string(),
            actions: vec![PointerAction::Move {
                x,
                y,
                duration: Some(0),
            }],
        }],
    )
}

pub fn pointer_drag(context: BrowsingContext, from: (f64, f64), to: (f64, f64)) -> PerformActionsParams {
    let actions = vec![
        PointerAction::Move {
            x: from.0,
            y: from.1,
            duration: Some(0),
        },
        PointerAction::Down { button: 0 },
        PointerAction::Move {
            x: to.0,
            y: to.1,
            duration: Some(100),
        },
        PointerAction::Up { button: 0 },
    ];
    PerformActionsParams::new(
        context,
        vec![SourceActions::Pointer {
            id: "vibium-pointer".to_string(),
            actions,
        }],
    )
}

/// A single key down/up pair, used by `press` rather than a full typed
/// sequence (it never simulates additional printable characters).
pub fn key_press(context: BrowsingContext, key: &str) -> PerformActionsParams {
    PerformActionsParams::new(
        context,
        vec![SourceActions::Key {
            id: "vibium-keyboard".to_string(),
            actions: vec![
                KeyAction::Down { value: key.to_string() },
                KeyAction::Up { value: key.to_string() },
            ],
        }],
    )
}

pub fn key_sequence(context: BrowsingContext, text: &str) -> PerformActionsParams {
    let mut actions = Vec::with_capacity(text.chars().count() * 2);
    for ch in text.chars() {
        let value = ch.to_string();
        actions.push(KeyAction::Down {
            value: value.clone(),
        });
        actions.push(KeyAction::Up { value });
    }
    PerformActionsParams::new(
        context,
        vec![SourceActions::Key {
            id: "vibium-keyboard".to_string(),
            actions,
        }],
    )
}
