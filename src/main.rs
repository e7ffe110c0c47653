use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use aurwatch::aur::AurClient;
use aurwatch::checker::registry::builtin_registry;
use aurwatch::checker::CheckerSelector;
use aurwatch::concurrent::ConcurrentChecker;
use aurwatch::config::{self, Config};
use aurwatch::logging::{self, LogQuery};
use aurwatch::orchestrator::{AsyncOrchestrator, OrchestratorConfig};
use aurwatch::scheduler::Scheduler;
use aurwatch::server::{self, AppState};
use aurwatch::services::aur::AurService;
use aurwatch::services::package::PackageService;
use aurwatch::services::upstream::UpstreamService;
use aurwatch::services::ServiceCatalog;
use aurwatch::store::Store;

#[derive(Parser)]
#[command(name = "aurwatch")]
#[command(version, about = "Watches upstream releases for AUR packages")]
struct Cli {
    /// Path to the config file; defaults to <data dir>/config.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,

    /// Arm the periodic scheduler at startup with this interval.
    #[arg(long)]
    check_interval_minutes: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let _log_guard = logging::init(&config.log_level, &config::log_dir())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let store = Arc::new(Store::open(&config.database_path())?);

    let registry = Arc::new(builtin_registry(&config.checkers));
    let selector = Arc::new(CheckerSelector::new(
        Arc::clone(&registry),
        &config.url_rules,
    )?);
    let checker = Arc::new(ConcurrentChecker::with_cache_settings(
        selector,
        Duration::from_secs(config.cache_ttl_minutes * 60),
        config.cache_max_size,
        config.cache_eviction_policy,
    ));

    let orchestrator = AsyncOrchestrator::new(
        Arc::clone(&checker),
        OrchestratorConfig {
            worker_count: config.async_worker_count,
            ..Default::default()
        },
    );
    orchestrator.start();

    let aur = AurService::new(Arc::clone(&store), AurClient::new());
    let upstream = UpstreamService::new(Arc::clone(&store), checker, Arc::clone(&orchestrator));
    let scheduler = Scheduler::new(Arc::new(ServiceCatalog {
        aur: Arc::clone(&aur),
        upstream: Arc::clone(&upstream),
    }));

    if let Some(interval) = cli
        .check_interval_minutes
        .or(Some(config.check_interval_minutes))
        .filter(|&m| m > 0)
    {
        scheduler.start(interval);
    }

    let state = AppState {
        packages: Arc::new(PackageService::new(store)),
        aur,
        upstream,
        scheduler,
        registry,
        logs: Arc::new(LogQuery::new(config::log_dir())),
    };

    let listen = cli.listen.unwrap_or_else(|| config.listen_address.clone());
    server::serve(state, &listen).await
}
