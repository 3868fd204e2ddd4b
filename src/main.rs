use std::sync::Arc;

use ags_resource_proxy::handlers::{handle_rejection, proxy_routes};
use ags_resource_proxy::models::ProxyContext;
use ags_resource_proxy::config::{load_config, CONFIG_PATH, LISTEN_ADDR, LISTEN_PORT};
use warp::Filter;

#[tokio::main]
async fn main() {
    let config = match load_config(CONFIG_PATH) {
        Ok(config) => Some(Arc::new(config)),
        Err(e) => {
            // Without a snapshot the referrer gate rejects every request and
            // ping reports hasConfig: false.
            eprintln!("{}", e);
            None
        }
    };

    let ctx = ProxyContext::new(config);
    let routes = proxy_routes(ctx).recover(handle_rejection);

    println!(
        "Resource proxy running on http://127.0.0.1:{}",
        LISTEN_PORT
    );
    warp::serve(routes).run((LISTEN_ADDR, LISTEN_PORT)).await;
}
