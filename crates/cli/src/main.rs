mod bot_commands;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    courier_gateway::AppState,
    courier_pipeline::{BatchBuffer, Batcher, Pipeline, batcher::RECONCILE_PERIOD, register_handlers},
    courier_queue::{DEFAULT_CONCURRENCY, DeliveryQueue, SqliteJobStore, WorkerPool},
    courier_store::RecordStore,
    courier_transport::TransportRegistry,
    courier_webhook::Poster,
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier — messaging-network relay gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "COURIER_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to.
    #[arg(long, global = true, default_value = "0.0.0.0", env = "COURIER_BIND")]
    bind: String,

    /// Port to listen on.
    #[arg(long, global = true, default_value_t = 8080, env = "COURIER_PORT")]
    port: u16,

    /// SQLite database path.
    #[arg(long, global = true, default_value = "courier.db", env = "COURIER_DB")]
    db: PathBuf,

    /// Delivery worker concurrency.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY, env = "COURIER_CONCURRENCY")]
    concurrency: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// Bot management.
    Bots {
        #[command(subcommand)]
        action: bot_commands::BotAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let pool = courier_store::open(&cli.db).await?;
    SqliteJobStore::init(&pool).await?;
    BatchBuffer::init(&pool).await?;

    let store = RecordStore::new(pool.clone());
    let queue = DeliveryQueue::new(Arc::new(SqliteJobStore::new(pool.clone())));
    let batcher = Batcher::new(BatchBuffer::new(pool), store.clone(), Arc::clone(&queue));
    let poster = Poster::with_defaults()?;

    let mut workers = WorkerPool::new(Arc::clone(&queue), cli.concurrency);
    register_handlers(&mut workers, store.clone(), poster);
    workers.start().await?;

    let _reconciler = batcher.spawn_reconciler(RECONCILE_PERIOD);

    let pipeline = Pipeline::new(store.clone(), Arc::clone(&queue), Arc::clone(&batcher));
    let state = AppState {
        pipeline,
        store,
        transports: Arc::new(TransportRegistry::new()),
    };

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    courier_gateway::serve(addr, state).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();

    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    match cli.command.take() {
        None | Some(Commands::Serve) => serve(cli).await,
        Some(Commands::Bots { action }) => bot_commands::handle_bots(action, &cli.db).await,
    }
}
