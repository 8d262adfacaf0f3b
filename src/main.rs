use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use rust_gateway_server::config::{Config, ServerContext};
use rust_gateway_server::logger;
use rust_gateway_server::server::{self, SignalHandler, TaskWorker};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Worker thread count comes from `server.workers`, else the CPU count
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;
    let drain_timeout = cfg.write_timeout() + cfg.read_timeout();

    let context = ServerContext::from_config(cfg)?.with_worker(Arc::new(TaskWorker::new()));
    logger::log_server_start(&addr, &context.config, &context.pipeline.names());

    let signals = Arc::new(SignalHandler::new());
    server::start_signal_handler(Arc::clone(&signals));

    server::start_server_loop(
        listener,
        context,
        Arc::new(AtomicUsize::new(0)),
        signals,
        drain_timeout,
    )
    .await;
    Ok(())
}
