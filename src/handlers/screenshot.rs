//! `screenshot` handler: wraps `browsingContext.captureScreenshot`.
//! `fullPage` maps to the `document` origin, `clip` to a rectangle,
//! and an element target resolves via the Locator and uses its box as
//! the clip rectangle.

use vibium_bidi::browsing_context::{CaptureScreenshotParams, ClipRectangle};

use crate::error::Result;
use crate::locator::{locate, Cardinality, LocateOptions, SelectorSpec};
use crate::session::SessionState;

use super::resolve_context;

pub enum ScreenshotTarget<'a> {
    Viewport,
    FullPage,
    Clip(ClipRectangle),
    Element(&'a SelectorSpec),
}

pub async fn capture(
    session: &mut SessionState,
    context: Option<&str>,
    target: ScreenshotTarget<'_>,
    timeout: std::time::Duration,
) -> Result<String> {
    let context = resolve_context(session, context)?;
    let mut params = CaptureScreenshotParams::new(context.clone());

    match target {
        ScreenshotTarget::Viewport => {}
        ScreenshotTarget::FullPage => params = params.full_page(),
        ScreenshotTarget::Clip(clip) => params = params.with_clip(clip),
        ScreenshotTarget::Element(spec) => {
            let options = LocateOptions { timeout, cardinality: Cardinality::Single };
            let mut matches = locate(&session.transport, &context, &mut session.refs, spec, &options).await?;
            let (_, element) = matches.remove(0);
            let report = super::interact::element_box(session, &element).await?;
            params = params.with_clip(ClipRectangle { x: report.0, y: report.1, width: report.2, height: report.3 });
        }
    }

    let response = session.transport.send(params).await?;
    Ok(response.result.data.clone())
}
