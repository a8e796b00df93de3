use std::net::SocketAddr;

use foodgram::{api, config::Config, state::State};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = match State::new(config).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Listening on {address}");
    warp::serve(api::routes(state)).run(address).await;
}
