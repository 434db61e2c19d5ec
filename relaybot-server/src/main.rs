use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use relaybot_core::persistence::JsonFileStore;
use relaybot_core::platforms::console::ConsoleService;
use relaybot_core::plugins::HelpPlugin;
use relaybot_core::{Bot, BotConfig};

mod commands;

#[derive(Parser, Debug, Clone)]
#[command(name = "relaybot")]
#[command(author, version, about = "RelayBot - multi-service chat bot with a plugin pipeline")]
struct Args {
    /// JSON file with engine settings. Missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where plugin state is kept between runs.
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Command prefix used by the console service.
    #[arg(long, default_value = "!")]
    prefix: String,

    /// Name the bot answers to.
    #[arg(long, default_value = "RelayBot")]
    name: String,

    /// Don't attach the stdin/stdout console. The bot then only restores and
    /// re-saves plugin state.
    #[arg(long, default_value = "false")]
    no_console: bool,
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("installing log bridge")?;
    let filter = EnvFilter::from_default_env().add_directive("relaybot=info".parse()?);
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("setting global subscriber")?;
    Ok(())
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relaybot")
        .join("plugins_state.json")
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = Args::parse();
    info!(
        "RelayBot starting. name={}, prefix={}, console={}",
        args.name, args.prefix, !args.no_console
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_bot(args));
    // A console read can be parked on stdin; don't wait on it.
    runtime.shutdown_timeout(Duration::from_millis(500));

    if let Err(e) = &result {
        error!("Bot error: {:?}", e);
    }
    info!("Main finished. Goodbye!");
    result
}

async fn run_bot(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => BotConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BotConfig::default(),
    };
    config.validate()?;

    let store = JsonFileStore::new(args.state_path.clone().unwrap_or_else(default_state_path));
    info!("Plugin state file: {}", store.path().display());

    let mut bot = Bot::new(config);
    info!(
        "Queue capacity {}, autosave {:?}s, plugin timeout {:?}ms",
        bot.config().queue_capacity,
        bot.config().autosave_secs,
        bot.config().plugin_timeout_ms
    );
    bot.set_store(Arc::new(store));

    if !args.no_console {
        bot.add_service(Arc::new(ConsoleService::new(&args.name, &args.prefix)))?;
    }
    bot.add_plugin("builtin", Box::new(commands::builtin_commands()?))?;
    bot.add_plugin("help", Box::new(HelpPlugin::new()))?;

    // Plugins start from defaults if the state file can't be read.
    match bot.restore().await {
        Ok(failures) if !failures.is_empty() => {
            warn!("{} plugin(s) failed to restore state", failures.len());
        }
        Ok(_) => {}
        Err(e) => error!("Could not restore plugin state: {}", e),
    }

    let bot = Arc::new(bot);
    let report = bot.open().await?;
    for (name, e) in &report.failed {
        warn!("Service '{}' unavailable: {}", name, e);
    }

    // Handle Ctrl-C to signal shutdown
    let bot_for_signal = Arc::clone(&bot);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl_c: {:?}", e);
            return;
        }
        info!("Ctrl-C received; shutting down.");
        bot_for_signal.shutdown();
    });

    let summary = bot.run().await?;
    info!(
        "Dispatched {} message(s), suppressed {}, {} plugin failure(s)",
        summary.dispatched,
        summary.suppressed,
        bot.failure_count()
    );
    Ok(())
}
