//! End-to-end tests of the hook chain and the WebSocket handoff, over real
//! sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use handoff::{
    DuplexConnection, Error, HijackState, HookError, Message, Method, Phase, Request, Response,
    Route, Router, Status,
};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, http::HeaderValue};

mod common;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(router: &Router, phase: Phase, log: &Log, name: &'static str) {
    let log = Arc::clone(log);
    router
        .hooks()
        .register_sync(phase, move |_| {
            log.lock().push(name);
            Ok(())
        })
        .unwrap();
}

fn counter(router: &Router, phase: Phase) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    router
        .hooks()
        .register_sync(phase, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    count
}

async fn never(_conn: DuplexConnection, _req: Request) -> Result<(), HookError> {
    panic!("duplex handler must not run");
}

#[tokio::test]
async fn hooks_run_in_order_then_handler_owns_the_socket() {
    let log = Log::default();
    let handler_log = Arc::clone(&log);
    let router = Router::new().websocket("/echo", move |mut conn: DuplexConnection, _req: Request| {
        let log = Arc::clone(&handler_log);
        async move {
            conn.send_text("hello client").await?;
            if let Some(msg) = conn.recv().await {
                if msg?.to_text()? == "hello server" {
                    log.lock().push("handler got hello server");
                }
            }
            conn.close().await?;
            Ok::<_, HookError>(())
        }
    });
    record(&router, Phase::OnRequest, &log, "onRequest");
    record(&router, Phase::PreParsing, &log, "preParsing");
    record(&router, Phase::PreValidation, &log, "preValidation");
    record(&router, Phase::PreHandler, &log, "preHandler");
    record(&router, Phase::PreSerialization, &log, "preSerialization");
    record(&router, Phase::OnSend, &log, "onSend");

    let server = common::spawn(router).await;
    let (mut ws, res) = connect_async(format!("ws://{}/echo", server.addr)).await.unwrap();
    assert_eq!(res.status(), 101);

    let first = ws.next().await.unwrap().unwrap();
    assert_eq!(first.to_text().unwrap(), "hello client");
    ws.send(Message::text("hello server")).await.unwrap();

    // Drain until the handler's close.
    while let Some(Ok(_)) = ws.next().await {}

    assert_eq!(
        *log.lock(),
        ["onRequest", "preParsing", "preValidation", "preHandler", "handler got hello server"]
    );
}

#[tokio::test]
async fn failing_hook_before_hijack_answers_over_http() {
    let router = Router::new().websocket("/echo", never);
    router
        .hooks()
        .register_sync(Phase::PreValidation, |_| Err(HookError::msg("kaboom")))
        .unwrap();
    let on_error = counter(&router, Phase::OnError);

    let server = common::spawn(router).await;
    let err = connect_async(format!("ws://{}/echo", server.addr)).await.err().unwrap();

    match err {
        tungstenite::Error::Http(res) => assert_eq!(res.status(), 500),
        other => panic!("expected an HTTP refusal, got {other:?}"),
    }
    assert_eq!(on_error.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn on_error_hook_can_refuse_the_upgrade() {
    let router = Router::new().websocket("/echo", never);
    router
        .hooks()
        .register_sync(Phase::PreValidation, |_| Err(HookError::msg("kaboom")))
        .unwrap();
    router
        .hooks()
        .register_sync(Phase::OnError, |ctx| {
            if let Some(reply) = ctx.reply() {
                reply.status(Status::NotFound).text("not found");
            }
            Ok(())
        })
        .unwrap();

    let server = common::spawn(router).await;
    let err = connect_async(format!("ws://{}/echo", server.addr)).await.err().unwrap();
    assert!(matches!(err, tungstenite::Error::Http(ref res) if res.status() == 404));

    let res = common::raw(server.addr, "GET", "/echo", common::UPGRADE).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body, "not found");
}

#[tokio::test]
async fn plain_client_is_answered_by_a_validation_hook() {
    let router = Router::new().websocket("/echo", never);
    router
        .hooks()
        .register_sync(Phase::PreValidation, |ctx| {
            if !ctx.is_upgrade_request() {
                if let Some(reply) = ctx.reply() {
                    reply.status(Status::NotFound).text("not found");
                }
            }
            Ok(())
        })
        .unwrap();

    let server = common::spawn(router).await;
    let res = common::get(server.addr, "/echo").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body, "not found");
}

#[tokio::test]
async fn plain_request_to_an_upgrade_route() {
    async fn page(_req: Request) -> Response {
        Response::text("use a websocket client")
    }

    let router = Router::new()
        .websocket("/bare", never)
        .route(Method::Get, "/page", Route::duplex(never).fallback(page));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let states = Arc::clone(&seen);
    router
        .hooks()
        .register_sync(Phase::PreHandler, move |ctx| {
            states.lock().push(ctx.hijack_state());
            Ok(())
        })
        .unwrap();

    let server = common::spawn(router).await;

    let bare = common::get(server.addr, "/bare").await;
    assert_eq!(bare.status, 426);
    assert_eq!(bare.header("upgrade"), Some("websocket"));

    let page = common::get(server.addr, "/page").await;
    assert_eq!(page.status, 200);
    assert_eq!(page.body, "use a websocket client");

    assert_eq!(*seen.lock(), [HijackState::NotHijacked, HijackState::NotHijacked]);
}

#[tokio::test]
async fn reply_phases_never_run_after_the_handoff() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let router = Router::new().websocket("/echo", move |conn: DuplexConnection, _req: Request| {
        let flag = Arc::clone(&flag);
        async move {
            let _conn = conn;
            // Outlive the request deadline, then fail.
            tokio::time::sleep(Duration::from_millis(150)).await;
            flag.store(true, Ordering::SeqCst);
            Err::<(), _>(HookError::msg("handler gave up"))
        }
    });
    let counts = [
        counter(&router, Phase::PreSerialization),
        counter(&router, Phase::OnSend),
        counter(&router, Phase::OnTimeout),
        counter(&router, Phase::OnError),
    ];

    let server =
        common::spawn_with(router, |s| s.request_timeout(Duration::from_millis(50))).await;
    let (mut ws, _) = connect_async(format!("ws://{}/echo", server.addr)).await.unwrap();

    // The handler's failure drops the transport without a close handshake.
    let last = loop {
        match ws.next().await {
            Some(Ok(_)) => continue,
            other => break other,
        }
    };
    assert!(
        matches!(
            last,
            Some(Err(tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)))
        ),
        "expected an abnormal closure, got {last:?}"
    );
    common::settle().await;

    assert!(ran.load(Ordering::SeqCst));
    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn slow_pre_handler_does_not_lose_early_messages() {
    let router = Router::new().websocket("/echo", |mut conn: DuplexConnection, _req: Request| async move {
        // The client has already sent by the time we look.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Some(msg) = conn.recv().await {
            let msg = msg?;
            if msg.is_text() {
                conn.send(msg).await?;
            }
        }
        Ok::<_, HookError>(())
    });
    router
        .hooks()
        .register(Phase::PreHandler, |_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
        })
        .unwrap();

    let server = common::spawn(router).await;
    let (mut ws, _) = connect_async(format!("ws://{}/echo", server.addr)).await.unwrap();
    ws.send(Message::text("one")).await.unwrap();
    ws.send(Message::text("two")).await.unwrap();

    let a = ws.next().await.unwrap().unwrap();
    let b = ws.next().await.unwrap().unwrap();
    assert_eq!(a.to_text().unwrap(), "one");
    assert_eq!(b.to_text().unwrap(), "two");
}

#[tokio::test]
async fn pre_handler_can_still_refuse_while_hijacking() {
    let router = Router::new().websocket("/echo", never);
    router
        .hooks()
        .register_sync(Phase::PreHandler, |ctx| {
            assert_eq!(ctx.hijack_state(), HijackState::Hijacking);
            if ctx.request().query_param("token").as_deref() != Some("secret") {
                if let Some(reply) = ctx.reply() {
                    reply.status(Status::Unauthorized).text("unauthorized");
                }
            }
            Ok(())
        })
        .unwrap();

    let server = common::spawn(router).await;
    let err = connect_async(format!("ws://{}/echo", server.addr)).await.err().unwrap();
    assert!(matches!(err, tungstenite::Error::Http(ref res) if res.status() == 401));
}

#[tokio::test]
async fn negotiated_subprotocol_reaches_both_sides() {
    let router = Router::new().route(
        Method::Get,
        "/chat",
        Route::duplex(|mut conn: DuplexConnection, _req: Request| async move {
            let proto = conn.protocol().unwrap_or("none").to_owned();
            conn.send_text(proto).await?;
            conn.close().await?;
            Ok::<_, HookError>(())
        })
        .protocols(["chat.v2", "chat.v1"]),
    );
    let server = common::spawn(router).await;

    let mut req = format!("ws://{}/chat", server.addr).into_client_request().unwrap();
    req.headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static("chat.v1, chat.v2"));
    let (mut ws, res) = connect_async(req).await.unwrap();

    assert_eq!(
        res.headers().get("sec-websocket-protocol").and_then(|v| v.to_str().ok()),
        Some("chat.v1")
    );
    let msg = ws.next().await.unwrap().unwrap();
    assert_eq!(msg.to_text().unwrap(), "chat.v1");
}

#[tokio::test]
async fn malformed_upgrade_is_refused_with_400() {
    let router = Router::new().websocket("/echo", never);
    let server = common::spawn(router).await;

    let res = common::raw(
        server.addr,
        "GET",
        "/echo",
        &[("Connection", "Upgrade, close"), ("Upgrade", "websocket"), ("Sec-WebSocket-Version", "8")],
    )
    .await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn registration_fails_once_serving() {
    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }
    let router = Router::new().on(Method::Get, "/", ok);
    let hooks = router.hooks();
    assert!(hooks.register_sync(Phase::OnRequest, |_| Ok(())).is_ok());

    let server = common::spawn(router).await;
    assert_eq!(common::get(server.addr, "/").await.status, 200);

    assert!(hooks.is_frozen());
    let err = hooks.register_sync(Phase::OnRequest, |_| Ok(())).err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(hooks.hooks_for(Phase::OnRequest).len(), 1);
}

#[tokio::test]
async fn unknown_method_is_405() {
    let server = common::spawn(Router::new()).await;
    let res = common::raw(server.addr, "BREW", "/", &[]).await;
    assert_eq!(res.status, 405);
}

#[tokio::test]
async fn unmatched_path_runs_global_hooks_then_404s() {
    let router = Router::new();
    let on_request = counter(&router, Phase::OnRequest);
    let server = common::spawn(router).await;

    let res = common::get(server.addr, "/missing").await;
    assert_eq!(res.status, 404);
    assert_eq!(on_request.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_disconnect_mid_hook_does_not_break_the_server() {
    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }
    let router = Router::new().on(Method::Get, "/slow", ok).on(Method::Get, "/ok", ok);
    router
        .hooks()
        .register(Phase::PreHandler, |ctx| {
            let slow = ctx.request().path() == "/slow";
            Box::pin(async move {
                if slow {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok(())
            })
        })
        .unwrap();

    let server = common::spawn(router).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /slow HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    drop(stream);

    common::settle().await;
    let res = common::get(server.addr, "/ok").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "ok");
}

#[tokio::test]
async fn oversized_body_is_refused_before_validation() {
    async fn size(req: Request) -> Response {
        Response::text(req.body().len().to_string())
    }
    let router = Router::new().on(Method::Post, "/upload", size);
    let validated = counter(&router, Phase::PreValidation);
    let on_error = counter(&router, Phase::OnError);

    let server = common::spawn_with(router, |s| s.body_limit(16)).await;

    let small = common::post(server.addr, "/upload", b"0123456789").await;
    assert_eq!(small.status, 200);
    assert_eq!(small.body, "10");

    let big = common::post(server.addr, "/upload", &[b'x'; 64]).await;
    assert_eq!(big.status, 413);
    assert_eq!(big.body, "Payload Too Large");

    assert_eq!(validated.load(Ordering::SeqCst), 1);
    assert_eq!(on_error.load(Ordering::SeqCst), 1);
}
