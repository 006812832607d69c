use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use push_coordinator::app::{
    poll_event, Action, AppEvent, AppState, Config, Operation, StatusSnapshot,
};
use push_coordinator::push::{NotificationPermission, ReadinessGate, SubscriptionManager};
use push_coordinator::sdk::{ConsentValue, SdkCommands, SdkInitializer};
use push_coordinator::sim::{SimulatedBrowser, SimulatedSdk};
use push_coordinator::ui;
use push_coordinator::worker::{
    self, ClickedNotification, FileDismissalStore, NotificationWorker, WorkerEvent,
};

/// Push Coordinator - web push subscription lifecycle and notification delivery
#[derive(Parser)]
#[command(name = "push-coordinator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the TUI (default)
    Tui,
    /// Print a one-shot status snapshot as JSON
    Status,
    /// Run the notification delivery worker
    Worker {
        /// Socket path (defaults to the configured path)
        #[arg(long, env = "PUSH_COORDINATOR_SOCKET")]
        socket: Option<PathBuf>,
    },
    /// Apply a consent decision once the SDK is ready
    Consent {
        /// in (y) or out (n)
        value: ConsentValue,
    },
    /// Send a page view once the SDK is ready
    PageView {
        /// Page name (defaults to the page title)
        name: Option<String>,
    },
    /// Deliver an event to a running worker
    Send {
        /// Socket path (defaults to the configured path)
        #[arg(long, env = "PUSH_COORDINATOR_SOCKET")]
        socket: Option<PathBuf>,
        #[command(subcommand)]
        event: SendEvent,
    },
}

#[derive(Subcommand)]
enum SendEvent {
    /// Push message; the data is delivered as-is
    Push {
        /// Payload text, JSON or plain
        data: Option<String>,
    },
    /// Click on a notification
    Click {
        /// Target URL stored in the notification data
        #[arg(long)]
        url: Option<String>,
        /// Named action button
        #[arg(long)]
        action: Option<String>,
        #[arg(long, default_value = "notification")]
        id: String,
    },
    /// Dismiss a notification
    Close {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value = "notification")]
        id: String,
    },
    /// Ask the worker to skip waiting
    SkipWaiting,
    /// Lifecycle: install
    Install,
    /// Lifecycle: activate
    Activate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 設定を先に読み込む（ファイルがなければ作成）
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}, using defaults", e);
        Config::default()
    });

    // ログ初期化
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level)?;

    match cli.command {
        Some(Commands::Status) => run_status(&config),
        Some(Commands::Consent { value }) => run_sdk_command(&config, SdkCommand::Consent(value)),
        Some(Commands::PageView { name }) => run_sdk_command(&config, SdkCommand::PageView(name)),
        Some(Commands::Worker { socket }) => {
            run_worker(&config, socket.unwrap_or_else(|| config.socket_path.clone()))
        }
        Some(Commands::Send { socket, event }) => {
            send(socket.unwrap_or_else(|| config.socket_path.clone()), event)
        }
        Some(Commands::Tui) | None => run_tui(&config),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let log_dir = directories::ProjectDirs::from("", "", "push-coordinator")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("push-coordinator"));

    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("push-coordinator.log"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(log_file))
        .init();

    info!("Push Coordinator starting");
    Ok(())
}

/// Simulated page: browser, SDK and the manager in front of them
struct Platform {
    browser: Arc<SimulatedBrowser>,
    sdk: Arc<SimulatedSdk>,
    gate: ReadinessGate,
    manager: Arc<SubscriptionManager>,
    commands: SdkCommands,
}

impl Platform {
    fn new(config: &Config) -> Self {
        let browser = Arc::new(SimulatedBrowser::new(&config.scope));
        browser.set_prompt_response(config.sim.prompt_response.clone());

        let sdk = Arc::new(SimulatedSdk::new(browser.clone()));
        if config.sim.sdk_fail {
            sdk.set_configure_error(Some("SDK failed to load".to_string()));
        }

        let gate = ReadinessGate::global().clone();
        let manager = SubscriptionManager::new(browser.clone(), sdk.clone(), gate.clone())
            .with_ready_timeout(config.ready_timeout())
            .with_defaults(config.worker.notification.clone());

        let commands = SdkCommands::new(sdk.clone(), gate.clone(), config.scope.clone());

        Self {
            browser,
            sdk,
            gate,
            manager: Arc::new(manager),
            commands,
        }
    }

    fn initializer(&self, config: &Config) -> SdkInitializer {
        SdkInitializer::new(
            self.browser.clone(),
            self.sdk.clone(),
            self.gate.clone(),
            config.sdk.clone(),
        )
        .with_worker(config.worker.script_path.clone(), config.scope.clone())
        .with_load_delay(Duration::from_millis(config.sim.sdk_load_delay_ms))
    }
}

fn run_status(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let platform = Platform::new(config);

    let snapshot = runtime.block_on(async {
        platform.initializer(config).run().await;
        StatusSnapshot::capture(&platform.manager).await
    });

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

enum SdkCommand {
    Consent(ConsentValue),
    PageView(Option<String>),
}

fn run_sdk_command(config: &Config, command: SdkCommand) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let platform = Platform::new(config);

    let sent = runtime.block_on(async {
        platform.initializer(config).run().await;
        match command {
            SdkCommand::Consent(value) => platform.commands.set_consent(value).await,
            SdkCommand::PageView(name) => platform.commands.send_page_view(name.as_deref()).await,
        }
    })?;

    let output = serde_json::json!({
        "sent": sent,
        "sdk": platform.gate.state(),
        "consent": platform.sdk.consent(),
        "page_views": platform.sdk.page_views(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_worker(config: &Config, socket_path: PathBuf) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    let browser = Arc::new(SimulatedBrowser::registered(&config.scope));
    // A push can only arrive for a granted subscription
    browser.set_permission(NotificationPermission::Granted);

    let mut notification_worker = NotificationWorker::new(browser, &config.worker);
    if let Some(ref path) = config.worker.dismissal_log {
        info!("Recording dismissals to {}", path.display());
        notification_worker =
            notification_worker.with_dismissal_store(Arc::new(FileDismissalStore::new(path.clone())));
    }
    let notification_worker = Arc::new(notification_worker);

    println!("Worker listening on {}", socket_path.display());
    let result = runtime.block_on(async {
        tokio::select! {
            result = worker::run_listener(&socket_path, notification_worker) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Worker shutting down");
                Ok(())
            }
        }
    });

    // Clean up socket on exit
    let _ = std::fs::remove_file(&socket_path);
    result
}

fn send(socket_path: PathBuf, event: SendEvent) -> Result<()> {
    let event = match event {
        SendEvent::Push { data } => WorkerEvent::Push {
            data: data.map(String::into_bytes),
        },
        SendEvent::Click { url, action, id } => WorkerEvent::NotificationClick {
            notification: clicked(id, None, url),
            action,
        },
        SendEvent::Close { url, tag, id } => WorkerEvent::NotificationClose {
            notification: clicked(id, tag, url),
        },
        SendEvent::SkipWaiting => WorkerEvent::Message {
            data: serde_json::json!({ "type": "SKIP_WAITING" }),
        },
        SendEvent::Install => WorkerEvent::Install,
        SendEvent::Activate => WorkerEvent::Activate,
    };

    let ack = worker::send_event(&socket_path, &event)?;
    if !ack.ok {
        anyhow::bail!(
            "Worker rejected {} event: {}",
            event.kind(),
            ack.error.unwrap_or_default()
        );
    }

    println!("{}", ack.outcome.unwrap_or_else(|| "ok".to_string()));
    Ok(())
}

fn clicked(id: String, tag: Option<String>, url: Option<String>) -> ClickedNotification {
    ClickedNotification {
        id,
        tag,
        data: match url {
            Some(url) => serde_json::json!({ "url": url }),
            None => serde_json::Value::Null,
        },
    }
}

fn run_tui(config: &Config) -> Result<()> {
    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Runtime::new()?;
    let platform = Platform::new(config);

    let (tx, rx) = mpsc::channel::<AppEvent>(100);

    // SDK load runs in the background; the view learns about it through the gate
    runtime.spawn(platform.initializer(config).run());
    {
        let gate = platform.gate.clone();
        let tx = tx.clone();
        runtime.spawn(async move {
            gate.await_ready(None).await;
            let _ = tx.send(AppEvent::SdkResolved).await;
        });
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut state = AppState::new(Duration::from_secs(config.info_dismiss_secs));

    let result = run_app(&mut terminal, &mut state, &platform, tx, rx, &runtime);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    platform: &Platform,
    tx: mpsc::Sender<AppEvent>,
    mut rx: mpsc::Receiver<AppEvent>,
    runtime: &tokio::runtime::Runtime,
) -> Result<()> {
    spawn_refresh(runtime, &platform.manager, &tx);

    loop {
        terminal.draw(|frame| ui::render(frame, state))?;

        // Results from background operations (non-blocking)
        while let Ok(event) = rx.try_recv() {
            handle_app_event(state, event, runtime, platform, &tx);
        }

        if let Some(event) = poll_event(Duration::from_millis(100)).context("Failed to read input")? {
            handle_app_event(state, event, runtime, platform, &tx);
        }

        state.tick(Instant::now());

        if state.should_quit {
            return Ok(());
        }
    }
}

fn handle_app_event(
    state: &mut AppState,
    event: AppEvent,
    runtime: &tokio::runtime::Runtime,
    platform: &Platform,
    tx: &mpsc::Sender<AppEvent>,
) {
    match event {
        AppEvent::Key(key) => handle_action(state, Action::from(key), runtime, platform, tx),
        AppEvent::Resize(_, _) => {}
        AppEvent::Snapshot(snapshot) => state.apply_snapshot(snapshot),
        AppEvent::Subscribed(result) => {
            state.finish_subscribe(result);
            spawn_refresh(runtime, &platform.manager, tx);
        }
        AppEvent::Unsubscribed(result) => {
            state.finish_unsubscribe(result);
            spawn_refresh(runtime, &platform.manager, tx);
        }
        AppEvent::TestNotified(result) => state.finish_test(result),
        AppEvent::SdkResolved => spawn_refresh(runtime, &platform.manager, tx),
        AppEvent::ConsentSet(value, result) => state.finish_consent(value, result),
        AppEvent::PageViewSent(result) => state.finish_page_view(result),
    }
}

fn handle_action(
    state: &mut AppState,
    action: Action,
    runtime: &tokio::runtime::Runtime,
    platform: &Platform,
    tx: &mpsc::Sender<AppEvent>,
) {
    let manager = platform.manager.clone();
    let tx = tx.clone();

    match action {
        Action::Subscribe => {
            if state.begin(Operation::Subscribe) {
                runtime.spawn(async move {
                    let result = manager.subscribe().await.map_err(|e| e.to_string());
                    let _ = tx.send(AppEvent::Subscribed(result)).await;
                });
            }
        }
        Action::Unsubscribe => {
            if state.begin(Operation::Unsubscribe) {
                runtime.spawn(async move {
                    let result = manager.unsubscribe().await;
                    let _ = tx.send(AppEvent::Unsubscribed(result)).await;
                });
            }
        }
        Action::TestNotification => {
            if state.begin(Operation::TestNotification) {
                runtime.spawn(async move {
                    let result = manager.show_test_notification().await.map_err(|e| e.to_string());
                    let _ = tx.send(AppEvent::TestNotified(result)).await;
                });
            }
        }
        Action::SetConsent(value) => {
            let commands = platform.commands.clone();
            runtime.spawn(async move {
                let result = commands.set_consent(value).await.map_err(|e| format!("{:#}", e));
                let _ = tx.send(AppEvent::ConsentSet(value, result)).await;
            });
        }
        Action::SendPageView => {
            let commands = platform.commands.clone();
            runtime.spawn(async move {
                let result = commands.send_page_view(None).await.map_err(|e| format!("{:#}", e));
                let _ = tx.send(AppEvent::PageViewSent(result)).await;
            });
        }
        Action::Refresh => spawn_refresh(runtime, &manager, &tx),
        Action::Quit => state.should_quit = true,
        Action::None => {}
    }
}

fn spawn_refresh(
    runtime: &tokio::runtime::Runtime,
    manager: &Arc<SubscriptionManager>,
    tx: &mpsc::Sender<AppEvent>,
) {
    let manager = manager.clone();
    let tx = tx.clone();
    runtime.spawn(async move {
        let snapshot = StatusSnapshot::capture(&manager).await;
        let _ = tx.send(AppEvent::Snapshot(snapshot)).await;
    });
}
