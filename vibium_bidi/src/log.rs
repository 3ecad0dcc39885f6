//! `log` module: console/runtime log entries.
//!
//! [BiDi log](https://w3c.github.io/webdriver-bidi/#module-log)

use std::borrow::Cow;

use serde::Deserialize;
use vibium_types::{Event, Method};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAdded {
    pub level: LogLevel,
    pub text: String,
    pub timestamp: u64,
}

impl Method for EntryAdded {
    fn identifier(&self) -> Cow<'static, str> {
        "log.entryAdded".into()
    }
}
impl Event for EntryAdded {}
