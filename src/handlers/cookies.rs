//! `cookies.get`/`cookies.set`/`cookies.clear` handlers, thin wrappers
//! over the `storage` module.

use vibium_bidi::storage::{Cookie, CookieFilter, DeleteCookiesParams, GetCookiesParams, PartialCookie, SetCookieParams};

use crate::error::Result;
use crate::session::SessionState;

pub async fn get(session: &mut SessionState, name: Option<&str>) -> Result<Vec<Cookie>> {
    let filter = name.map(|name| CookieFilter { name: Some(name.to_string()), domain: None });
    let params = GetCookiesParams { filter };
    let response = session.transport.send(params).await?;
    Ok(response.result.cookies.clone())
}

pub async fn set(session: &mut SessionState, cookie: PartialCookie) -> Result<()> {
    session.transport.send(SetCookieParams { cookie }).await?;
    Ok(())
}

pub async fn clear(session: &mut SessionState, name: Option<&str>) -> Result<()> {
    let filter = name.map(|name| CookieFilter { name: Some(name.to_string()), domain: None });
    session.transport.send(DeleteCookiesParams { filter }).await?;
    Ok(())
}
