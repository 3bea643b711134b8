use anyhow::Context;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use ticketcore::access::{Blacklist, SnapshotCache};
use ticketcore::access::snapshot::BlacklistSource;
use ticketcore::commands::{ArgValue, CommandContext, CommandTable};
use ticketcore::shared::models::{Actor, WorkspaceSettings};
use ticketcore::store::{MemoryStore, SharedStore};
use ticketcore::tasks::WorkerPool;
use ticketcore::tests::fakes::{
    FakeChannelApi, InMemoryRepository, RecordingArchiver, StaticBlacklist, StaticDirectory,
};
use ticketcore::{EngineConfig, Invocation, TicketEngine};

const DEMO_WORKSPACE: u64 = 1;
const DEMO_OWNER: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config_path = std::env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref()).context("loading configuration")?;
    info!(
        "ticketcore starting: {} workers, queue depth {}",
        config.workers, config.queue_depth
    );

    let store = connect_store(&config).await?;

    let demo = std::env::var("TICKETCORE_DEMO").map_or(false, |v| v == "1");
    if !demo {
        anyhow::bail!(
            "no database or chat platform backend is linked into this binary; \
             embed the ticketcore library in a deployment or set TICKETCORE_DEMO=1"
        );
    }

    run_demo(config, store).await
}

#[cfg(feature = "cache")]
async fn connect_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    use ticketcore::store::RedisStore;

    match RedisStore::new(&config.redis_url).await {
        Ok(store) => {
            info!("Connected to shared store at {}", config.redis_url);
            Ok(Arc::new(store))
        }
        Err(e) if std::env::var("TICKETCORE_DEMO").is_ok() => {
            warn!("Shared store unavailable ({e}), demo falls back to in-process store");
            Ok(Arc::new(MemoryStore::new()))
        }
        Err(e) => Err(e).context("connecting to the shared store"),
    }
}

#[cfg(not(feature = "cache"))]
async fn connect_store(_: &EngineConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    warn!("Built without the cache feature, using the in-process store");
    Ok(Arc::new(MemoryStore::new()))
}

/// Wires the engine to in-memory collaborators and pushes a few commands
/// through the worker pool as a smoke test.
async fn run_demo(config: EngineConfig, store: Arc<dyn SharedStore>) -> anyhow::Result<()> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.put_settings(WorkspaceSettings::new(DEMO_WORKSPACE, DEMO_OWNER));
    let channels = Arc::new(FakeChannelApi::new());
    let lobby = channels.add_text_channel(DEMO_WORKSPACE, None, "lobby");

    let blacklist_source = Arc::new(StaticBlacklist::new(Blacklist::default()));
    let blacklist = Arc::new(SnapshotCache::new(blacklist_source.load_blacklist().await?));
    let refresher = {
        let source = Arc::clone(&blacklist_source);
        blacklist.spawn_refresher(config.blacklist_refresh(), move || {
            let source = Arc::clone(&source);
            async move { source.load_blacklist().await }
        })
    };

    let pool = WorkerPool::new(config.workers, config.queue_depth);
    let engine = Arc::new(
        TicketEngine::new(
            config,
            repo.clone(),
            channels.clone(),
            Arc::new(RecordingArchiver::new()),
            store,
            Arc::new(StaticDirectory::new()),
        )
        .with_blacklist(Arc::clone(&blacklist)),
    );
    let table = Arc::new(CommandTable::new());

    let customer = Actor::new(42, "demo-user");
    let open = {
        let (engine, table) = (Arc::clone(&engine), Arc::clone(&table));
        let ctx = CommandContext {
            invocation: Invocation::interactive(DEMO_WORKSPACE, customer.clone()),
            channel_id: lobby,
        };
        pool.submit("demo-open", async move {
            table
                .dispatch(&engine, &ctx, "open", vec![("subject".to_string(), ArgValue::Text("Demo".into()))])
                .await
        })?
    };
    match open.join().await? {
        Ok(reply) => info!("open: {reply}"),
        Err(e) => error!("open: {}", e.user_message()),
    }

    if let Some(ticket) = repo.tickets(DEMO_WORKSPACE).into_iter().find(|t| t.open) {
        if let Some(channel_id) = ticket.channel_id {
            let owner = Actor::new(DEMO_OWNER, "owner");
            for command in ["claim", "close"] {
                let (engine, table) = (Arc::clone(&engine), Arc::clone(&table));
                let ctx = CommandContext {
                    invocation: Invocation::interactive(DEMO_WORKSPACE, owner.clone()),
                    channel_id,
                };
                let handle = pool.submit(format!("demo-{command}"), async move {
                    table.dispatch(&engine, &ctx, command, Vec::new()).await
                })?;
                match handle.join().await? {
                    Ok(reply) => info!("{command}: {reply}"),
                    Err(e) => error!("{command}: {}", e.user_message()),
                }
            }
        }
    }

    info!("Engine metrics: {:?}", engine.metrics());
    info!("Demo finished, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    refresher.abort();
    pool.shutdown().await;
    info!("ticketcore stopped");
    Ok(())
}
