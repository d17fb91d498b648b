use std::sync::Arc;

mod config;
mod handler;
mod http;
mod logger;
mod server;
mod upstream;

#[cfg(test)]
mod testutil;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::load_from(config::DEFAULT_CONFIG_PATH)?;
    logger::init(&cfg)?;

    // Worker count comes from config; tokio picks one per core otherwise
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let state = Arc::new(config::AppState::new(&cfg)?);
    let listener = server::create_reusable_listener(addr)?;

    logger::log_server_start(&addr, &cfg);

    let signals = Arc::new(server::signal::SignalHandler::new());
    server::signal::start_signal_handler(Arc::clone(&signals));

    // Connections are served with spawn_local, so the loop runs on a LocalSet
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::start_server_loop(
            listener,
            state,
            Arc::clone(&signals.shutdown),
        ))
        .await
}
