mod app;
mod components;
mod config;
mod error;
mod event;
mod executor;
mod handler;
mod provider;
mod theme;
mod tree;
mod tui;
mod ui;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use tokio::task;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::{AppConfig, LoggingConfig, WatcherConfig};
use crate::event::{Event, EventHandler};
use crate::executor::AffinityExecutor;
use crate::provider::fs::FsProvider;
use crate::provider::memory::{self, MemoryProvider};
use crate::provider::TreeProvider;
use crate::tree::{NotificationRouter, TreeCache};
use crate::tui::{install_panic_hook, Tui};

/// Browse a live tree whose provider must be driven from one worker thread.
#[derive(Parser, Debug)]
#[command(name = "tree-inspect", version, about)]
struct Cli {
    /// Root path to display (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Browse a self-mutating in-memory desktop instead of the filesystem
    #[arg(long)]
    demo: bool,

    /// Path to a config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Disable change subscriptions (manual refresh only)
    #[arg(long)]
    no_watch: bool,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            watcher: WatcherConfig {
                enabled: self.no_watch.then_some(false),
                ..WatcherConfig::default()
            },
            logging: LoggingConfig {
                file: self.log_file.clone(),
                ..LoggingConfig::default()
            },
            ..AppConfig::default()
        }
    }
}

/// Send tracing output to the log file; the terminal belongs to the UI.
fn init_logging(config: &AppConfig) -> error::Result<()> {
    let path = config.log_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
    Ok(())
}

/// Mutate the demo tree once per second until `stop` fires.
fn spawn_churn(provider: Arc<MemoryProvider>) -> (std_mpsc::Sender<()>, JoinHandle<()>) {
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    let join = thread::spawn(move || {
        let mut step = 0;
        while let Err(std_mpsc::RecvTimeoutError::Timeout) =
            stop_rx.recv_timeout(Duration::from_secs(1))
        {
            if let Err(err) = memory::churn_step(&provider, step) {
                tracing::warn!(%err, step, "demo churn failed");
            }
            step += 1;
        }
    });
    (stop_tx, join)
}

fn canonical_root(path: &Path) -> error::Result<PathBuf> {
    path.canonicalize().map_err(|_| {
        error::AppError::InvalidPath(format!("{} does not exist", path.display()))
    })
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    init_logging(&config)?;

    let executor = AffinityExecutor::new(config.executor_config());
    let handle = executor.start(|| {
        tracing::info!(thread = ?thread::current().name(), "provider worker started");
        Ok(())
    })?;

    let worker = handle
        .submit_async(|| thread::current().name().map(str::to_owned))
        .await?;
    tracing::debug!(?worker, "provider worker accepting work");

    let mut churn = None;
    let (provider, source_label, watching): (Arc<dyn TreeProvider>, String, bool) = if cli.demo
    {
        let provider = Arc::new(MemoryProvider::new(handle.clone(), "desktop"));
        memory::seed_demo(&provider)?;
        churn = Some(spawn_churn(Arc::clone(&provider)));
        (provider as Arc<dyn TreeProvider>, "demo desktop".to_string(), true)
    } else {
        let root = canonical_root(&cli.path)?;
        let settings = config.watch_settings();
        let watching = settings.enabled;
        let provider = FsProvider::new(&root, handle.clone(), settings)?;
        (
            Arc::new(provider) as Arc<dyn TreeProvider>,
            root.display().to_string(),
            watching,
        )
    };

    install_panic_hook(config.thread_name().to_string());

    let mut events = EventHandler::new(config.tick_rate());
    let router = NotificationRouter::new(events.sender());
    let cache = task::block_in_place(|| TreeCache::new(provider, handle.clone(), router))?;
    let mut tui = Tui::new(config.mouse_enabled())?;
    let mut app = App::new(
        cache,
        handle,
        theme::resolve_theme(config.theme_scheme()),
        source_label,
        watching,
    );

    let result = run(&mut tui, &mut app, &mut events).await;
    tui.restore()?;

    match task::block_in_place(|| app.cache.clear()) {
        Ok(released) => tracing::debug!(released, "subscriptions released"),
        Err(err) => tracing::warn!(%err, "failed to release subscriptions"),
    }
    if let Some((stop, join)) = churn {
        let _ = stop.send(());
        let _ = join.join();
    }
    let outcome = executor.shutdown(config.join_timeout())?;
    tracing::info!(?outcome, "executor shut down");

    result
}

async fn run(tui: &mut Tui, app: &mut App, events: &mut EventHandler) -> error::Result<()> {
    loop {
        tui.draw(app)?;

        handle_event(app, events.next().await?);

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Apply one event to the app. Cache operations block on the provider
/// worker, so they run under `block_in_place` and other runtime tasks keep
/// making progress.
fn handle_event(app: &mut App, event: Event) {
    task::block_in_place(|| match event {
        Event::Key(key) => handler::handle_key_event(app, key),
        Event::Mouse(mouse) => handler::handle_mouse_event(app, mouse),
        Event::Structure(change) => app.handle_structure_change(change),
        Event::Tick => {
            app.clear_expired_status();
            app.check_worker();
        }
        Event::Resize(_, _) => {}
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::time::Instant;
    use tokio::sync::mpsc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn blocking_event_handling_leaves_the_runtime_running() {
        let executor = AffinityExecutor::new(ExecutorConfig::default());
        let handle = executor.start(|| Ok(())).unwrap();
        let provider = Arc::new(MemoryProvider::new(handle.clone(), "desktop"));
        memory::seed_demo(&provider).unwrap();

        let elapsed = tokio::spawn(async move {
            let (tx, _rx) = mpsc::unbounded_channel();
            let cache = TreeCache::new(
                provider as Arc<dyn TreeProvider>,
                handle.clone(),
                NotificationRouter::new(tx),
            )
            .unwrap();
            let mut app = App::new(
                cache,
                handle.clone(),
                theme::dark_theme(),
                "demo desktop".to_string(),
                true,
            );

            // The worker stays busy until a task on this runtime opens the gate.
            let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
            handle
                .post(move || {
                    let _ = gate_rx.recv_timeout(Duration::from_secs(5));
                })
                .unwrap();
            tokio::spawn(async move {
                let _ = gate_tx.send(());
            });

            let started = Instant::now();
            let refresh = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE);
            handle_event(&mut app, Event::Key(refresh));
            started.elapsed()
        })
        .await
        .unwrap();

        assert!(elapsed < Duration::from_secs(2));
        executor.shutdown(Duration::from_secs(2)).unwrap();
    }
}
