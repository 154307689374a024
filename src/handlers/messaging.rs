//! Text and file message handlers.
//!
//! Thin wrappers over the dispatcher: persistence and fan-out ordering live
//! there so every send path shares the persist-first guarantee.

use super::Context;
use crate::error::EventResult;
use crate::events::FileDescriptor;

/// `text_message`: persist into the pair's conversation and fan out.
pub async fn text_message(ctx: &Context<'_>, from: &str, to: &str, text: String) -> EventResult {
    ctx.dispatcher.send_text(from, to, text).await?;
    Ok(())
}

/// `file_message`: store the payload, persist the file message, fan out.
pub async fn file_message(
    ctx: &Context<'_>,
    from: &str,
    to: &str,
    file: FileDescriptor,
) -> EventResult {
    ctx.dispatcher.send_file(from, to, file).await?;
    Ok(())
}
