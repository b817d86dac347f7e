//! WebSocket echo behind an auth hook.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example echo
//!
//! Try:
//!   curl -i http://localhost:3000/echo                 # 404 from the hook
//!   websocat 'ws://localhost:3000/echo?token=letmein'  # echoes
//!   websocat 'ws://localhost:3000/echo'                # 401 before the handoff

use handoff::{DuplexConnection, HookError, Message, Phase, Request, Router, Server, Status};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), handoff::Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new().websocket("/echo", echo);
    let hooks = app.hooks();

    hooks.register_sync(Phase::OnRequest, |ctx| {
        info!(path = ctx.request().path(), upgrade = ctx.is_upgrade_request(), "incoming");
        Ok(())
    })?;

    // Plain HTTP clients have no business on this route.
    hooks.register_sync(Phase::PreValidation, |ctx| {
        if ctx.is_upgrade_eligible() && !ctx.is_upgrade_request() {
            if let Some(reply) = ctx.reply() {
                reply.status(Status::NotFound).text("not found");
            }
        }
        Ok(())
    })?;

    // Runs while hijacking: the reply channel is still there to refuse on.
    hooks.register(Phase::PreHandler, |ctx| {
        Box::pin(async move {
            if ctx.request().query_param("token").as_deref() != Some("letmein") {
                if let Some(reply) = ctx.reply() {
                    reply.status(Status::Unauthorized).text("unauthorized");
                }
            }
            Ok(())
        })
    })?;

    hooks.register_sync(Phase::OnSend, |ctx| {
        if let Some(reply) = ctx.reply() {
            info!(status = reply.status_code(), "sent");
        }
        Ok(())
    })?;

    Server::bind("0.0.0.0:3000").serve(app).await
}

async fn echo(mut conn: DuplexConnection, req: Request) -> Result<(), HookError> {
    info!(peer = %req.remote_addr(), "client connected");
    conn.send_text("hello client").await?;

    while let Some(msg) = conn.recv().await {
        match msg? {
            Message::Text(text) => conn.send_text(text.as_str()).await?,
            Message::Binary(data) => conn.send_binary(data).await?,
            _ => {}
        }
    }

    info!(peer = %req.remote_addr(), "client gone");
    Ok(())
}
