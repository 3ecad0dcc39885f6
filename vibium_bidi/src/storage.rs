//! `storage` module: cookie access.
//!
//! [BiDi storage](https://w3c.github.io/webdriver-bidi/#module-storage)

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use vibium_types::{Command, Method};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub size: i64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    #[serde(default)]
    pub expiry: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCookiesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<CookieFilter>,
}

impl Method for GetCookiesParams {
    fn identifier(&self) -> Cow<'static, str> {
        "storage.getCookies".into()
    }
}

impl Command for GetCookiesParams {
    type Response = GetCookiesResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCookiesResult {
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCookieParams {
    pub cookie: PartialCookie,
}

impl Method for SetCookieParams {
    fn identifier(&self) -> Cow<'static, str> {
        "storage.setCookie".into()
    }
}

impl Command for SetCookieParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCookiesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<CookieFilter>,
}

impl Method for DeleteCookiesParams {
    fn identifier(&self) -> Cow<'static, str> {
        "storage.deleteCookies".into()
    }
}

impl Command for DeleteCookiesParams {
    type Response = serde_json::Value;
}
