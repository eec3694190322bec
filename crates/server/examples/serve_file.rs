use http::HeaderValue;
use quickserve::{BoxError, RequestContext, Routes, Server, handler_fn};
use tokio::fs::File;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

// curl -v http://127.0.0.1:1999/manifest
async fn manifest(ctx: &mut RequestContext) -> Result<(), BoxError> {
    let file = File::open("Cargo.toml").await?;
    ctx.respond_file(file, HeaderValue::from_static("text/plain")).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let routes = Routes::builder().route("manifest", handler_fn(manifest)).build();

    let mut server = Server::builder().routes(routes).max_in_flight(4).build().expect("routes are set");

    let url = server.start().await.expect("bind 127.0.0.1:1999");
    info!(%url, "serving this crate's manifest");

    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
    server.stop();
}
