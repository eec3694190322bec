use http::HeaderValue;
use quickserve::{BoxError, RequestContext, Routes, Server, handler_fn};
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Serialize)]
struct Greeting {
    message: String,
}

// curl -v http://127.0.0.1:1999/hello?name=world
async fn hello(ctx: &mut RequestContext) -> Result<(), BoxError> {
    let greeting = Greeting { message: format!("you asked for {}", ctx.target()) };
    ctx.respond(serde_json::to_string(&greeting)?).await;
    Ok(())
}

async fn root(ctx: &mut RequestContext) -> Result<(), BoxError> {
    ctx.respond_with("hello world\r\n", HeaderValue::from_static("text/plain")).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let routes = Routes::builder()
        .route("", handler_fn(root))
        .route("hello", handler_fn(hello))
        .build();

    let mut server = Server::builder().routes(routes).build().expect("routes are set");

    let url = server.start().await.expect("bind 127.0.0.1:1999");
    info!(%url, "serving");

    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
    server.stop();
}
