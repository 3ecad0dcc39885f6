//! Dialog handling: subscribes to `browsingContext.userPromptOpened`
//! and answers with `browsingContext.handleUserPrompt`.

use vibium_bidi::browsing_context::HandleUserPromptParams;

use crate::error::Result;
use crate::session::SessionState;

use super::resolve_context;

pub async fn accept(session: &mut SessionState, context: Option<&str>, prompt_text: Option<String>) -> Result<()> {
    let context = resolve_context(session, context)?;
    session
        .transport
        .send(HandleUserPromptParams::accept(context, prompt_text))
        .await?;
    Ok(())
}

pub async fn dismiss(session: &mut SessionState, context: Option<&str>) -> Result<()> {
    let context = resolve_context(session, context)?;
    session.transport.send(HandleUserPromptParams::dismiss(context)).await?;
    Ok(())
}
