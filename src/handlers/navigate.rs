//! `navigate` handler: issues `browsingContext.navigate` and returns
//! once the requested lifecycle event is observed for that context, or
//! on navigation failure.

use vibium_bidi::browsing_context::{NavigateParams, ReadinessState};

use crate::error::Result;
use crate::session::SessionState;

use super::resolve_context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    None,
}

impl From<WaitUntil> for ReadinessState {
    fn from(value: WaitUntil) -> Self {
        match value {
            WaitUntil::Load => ReadinessState::Complete,
            WaitUntil::DomContentLoaded => ReadinessState::Interactive,
            WaitUntil::None => ReadinessState::None,
        }
    }
}

pub struct NavigateResult {
    pub url: String,
    pub navigation: Option<String>,
}

pub async fn navigate(
    session: &mut SessionState,
    context: Option<&str>,
    url: &str,
    wait_until: WaitUntil,
) -> Result<NavigateResult> {
    let context = resolve_context(session, context)?;
    let mut params = NavigateParams::new(context, url);
    params.wait = Some(wait_until.into());
    let response = session.transport.send(params).await?;
    Ok(NavigateResult {
        url: response.result.url.clone(),
        navigation: response.result.navigation.clone(),
    })
}
