use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

mod api;
mod app;
mod clock;
mod config;
mod error;
mod session;
mod types;
mod ui;

use app::{AppCommand, AppEvent, AppState};
use clock::{ClockGuard, TICK_PERIOD};
use config::{AppConfig, ServiceProfile};
use session::GenerationRequest;

/// Generate product shots from an image and a text prompt.
#[derive(Parser, Debug)]
#[command(name = "studio", version)]
struct Cli {
    /// Which bundled generation service to use; clears any configured service_url.
    #[arg(long, value_enum, global = true)]
    profile: Option<ServiceProfile>,

    /// Explicit service base URL; overrides --profile.
    #[arg(long, global = true)]
    service_url: Option<String>,

    /// Path to config.toml (or the directory holding it).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single generation without the interactive screen.
    Generate {
        /// Image to upload.
        #[arg(long, conflicts_with = "sample", required_unless_present = "sample")]
        image: Option<PathBuf>,

        /// Bundled sample number (1-8); also supplies the prompt. Sample images are read
        /// from sample_dir (STUDIO_SAMPLE_DIR or config.toml, default ./samples).
        #[arg(long)]
        sample: Option<usize>,

        /// Prompt text; replaces the sample prompt when both are given.
        #[arg(long)]
        prompt: Option<String>,

        /// Save the result to the download directory.
        #[arg(long)]
        download: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.clone())?;
    if let Some(profile) = cli.profile {
        config.set_profile(profile);
    }
    if let Some(url) = cli.service_url.clone() {
        config.set_service_url(url)?;
    }

    match cli.command {
        Some(Command::Generate { image, sample, prompt, download }) => {
            setup_tracing(LogTarget::Stderr)?;
            run_once(config, image, sample, prompt, download).await
        }
        None => {
            setup_tracing(LogTarget::File(AppConfig::log_path()?))?;
            run_interactive(config).await
        }
    }
}

enum LogTarget {
    Stderr,
    File(PathBuf),
}

fn setup_tracing(target: LogTarget) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact();
    let result = match target {
        LogTarget::Stderr => builder.with_writer(io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
    };
    result.map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
        anyhow!("failed to initialise tracing: {err}")
    })
}

async fn run_interactive(config: AppConfig) -> Result<()> {
    info!("starting studio against {} ({:?} profile)", config.service_base(), config.profile());
    let client = api::Client::new(config.service_base(), config.sample_dir().clone())?;

    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();

    let controller = Controller::new(client.clone(), event_tx, config.download_dir().clone());
    controller.spawn(command_rx);

    let mut app_state = AppState::new(client.base_url());

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let ui_result = ui::run(&mut terminal, &mut app_state, &mut event_rx, command_tx);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    ui_result
}

async fn run_once(
    config: AppConfig,
    image: Option<PathBuf>,
    sample: Option<usize>,
    prompt: Option<String>,
    download: bool,
) -> Result<()> {
    let client = api::Client::new(config.service_base(), config.sample_dir().clone())?;
    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();
    Controller::new(client.clone(), event_tx, config.download_dir().clone()).spawn(command_rx);

    let mut app = AppState::new(client.base_url());
    if let Some(path) = image {
        app.upload(&path);
    } else if let Some(number) = sample {
        let index = number.checked_sub(1).unwrap_or(usize::MAX);
        if !app.choose_sample(index) {
            bail!("sample must be between 1 and {}", types::SAMPLE_INPUTS.len());
        }
    }
    if let Some(text) = prompt {
        app.session.update_prompt(text);
    }
    if let Some(notice) = app.notice.take() {
        bail!(notice.message);
    }
    if let Some(input) = app.session.input() {
        info!("input image: {}", input.preview());
    }

    let Some(command) = app.submit() else {
        let message = app.notice.take().map(|n| n.message).unwrap_or_default();
        bail!(message);
    };
    command_tx.send(command).map_err(|_| anyhow!("controller is not running"))?;

    let mut stderr = io::stderr();
    while app.session.is_in_flight() {
        let event = event_rx.recv().await.ok_or_else(|| anyhow!("controller stopped"))?;
        app.handle_event(event);
        if app.session.is_in_flight() {
            let _ = write!(stderr, "\rGenerating your image... {}s", app.session.elapsed_seconds());
            let _ = stderr.flush();
        }
    }
    let _ = writeln!(stderr);

    let Some(result) = app.session.result().cloned() else {
        let message = app.notice.take().map(|n| n.message).unwrap_or_default();
        bail!(message);
    };
    println!("{}", result.display_url);

    if download {
        if let Some(command) = app.request_download() {
            command_tx.send(command).map_err(|_| anyhow!("controller is not running"))?;
            match event_rx.recv().await {
                Some(AppEvent::Downloaded { path }) => println!("{}", path.display()),
                Some(AppEvent::Error(message)) => bail!(message),
                _ => bail!("download did not complete"),
            }
        }
    }
    Ok(())
}

struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    client: api::Client,
    event_tx: UnboundedSender<AppEvent>,
    download_dir: PathBuf,
}

impl Controller {
    fn new(client: api::Client, event_tx: UnboundedSender<AppEvent>, download_dir: PathBuf) -> Self {
        let inner = ControllerInner { client, event_tx, download_dir };
        Self { inner: Arc::new(inner) }
    }

    fn spawn(self, mut command_rx: UnboundedReceiver<AppCommand>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if let Err(err) = Controller::handle_command(inner.clone(), command).await {
                    error!("command error: {err:#}");
                    let _ = inner.event_tx.send(AppEvent::Error(format!("{err:#}")));
                }
            }
        });
    }

    async fn handle_command(inner: Arc<ControllerInner>, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Generate(request) => {
                Controller::generate(inner, request).await;
            }
            AppCommand::Download { display_url } => {
                let path = inner
                    .client
                    .download(&display_url, &inner.download_dir)
                    .await
                    .context("failed to download generated image")?;
                let _ = inner.event_tx.send(AppEvent::Downloaded { path });
            }
        }
        Ok(())
    }

    /// Runs one generation with the elapsed clock held for exactly the
    /// duration of the call.
    async fn generate(inner: Arc<ControllerInner>, request: GenerationRequest) {
        let clock = ClockGuard::start(TICK_PERIOD, {
            let event_tx = inner.event_tx.clone();
            move || {
                let _ = event_tx.send(AppEvent::ClockTick);
            }
        });
        let outcome = inner.client.generate(&request).await;
        drop(clock);

        let event = match outcome {
            Ok(display_url) => {
                info!("generation finished: {display_url}");
                AppEvent::GenerationSucceeded { display_url }
            }
            Err(err) => {
                error!("error generating image: {err:#}");
                AppEvent::GenerationFailed { message: format!("{err:#}") }
            }
        };
        let _ = inner.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_service(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for sample in types::SAMPLE_INPUTS {
            std::fs::write(dir.path().join(sample.label()), b"sample").unwrap();
        }
        dir
    }

    async fn drive(app: &mut AppState, event_rx: &mut UnboundedReceiver<AppEvent>) {
        while app.session.is_in_flight() {
            let event = event_rx.recv().await.unwrap();
            app.handle_event(event);
        }
    }

    #[tokio::test]
    async fn successful_generation_resolves_session() {
        let service = Router::new().route(
            "/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(1_200)).await;
                Json(json!({ "url": "outputs/img123.png" }))
            }),
        );
        let base = spawn_service(service).await;
        let samples = sample_dir();
        let client = api::Client::new(&base, samples.path().to_path_buf()).unwrap();

        let (event_tx, mut event_rx) = unbounded_channel();
        let (command_tx, command_rx) = unbounded_channel();
        Controller::new(client, event_tx, samples.path().join("out")).spawn(command_rx);

        let mut app = AppState::new(base.clone());
        app.choose_sample(0);
        command_tx.send(app.submit().unwrap()).unwrap();
        drive(&mut app, &mut event_rx).await;

        let result = app.session.result().unwrap();
        assert!(result.display_url.starts_with(&format!("{base}/outputs/img123.png?t=")));
        assert!(app.session.elapsed_seconds() >= 1);
        let settled = app.session.elapsed_seconds();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }
        assert_eq!(app.session.elapsed_seconds(), settled);
    }

    #[tokio::test]
    async fn failed_generation_clears_in_flight() {
        let service =
            Router::new().route("/generate", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base = spawn_service(service).await;
        let samples = sample_dir();
        let client = api::Client::new(&base, samples.path().to_path_buf()).unwrap();

        let (event_tx, mut event_rx) = unbounded_channel();
        let (command_tx, command_rx) = unbounded_channel();
        Controller::new(client, event_tx, samples.path().join("out")).spawn(command_rx);

        let mut app = AppState::new(base);
        app.choose_sample(5);
        command_tx.send(app.submit().unwrap()).unwrap();
        drive(&mut app, &mut event_rx).await;

        assert!(app.session.result().is_none());
        assert!(!app.session.is_in_flight());
        assert!(app.notice.as_ref().is_some_and(|n| n.is_error));
    }

    #[test]
    fn generate_requires_image_or_sample() {
        assert!(Cli::try_parse_from(["studio", "generate", "--prompt", "x"]).is_err());
        assert!(Cli::try_parse_from(["studio", "generate", "--image", "a.png", "--sample", "1"])
            .is_err());
        let cli = Cli::try_parse_from(["studio", "--profile", "remote", "generate", "--sample", "2"])
            .unwrap();
        assert_eq!(cli.profile, Some(ServiceProfile::Remote));
        assert!(matches!(cli.command, Some(Command::Generate { sample: Some(2), .. })));
    }

    #[test]
    fn sample_help_names_the_sample_directory() {
        use clap::CommandFactory;
        let mut command = Cli::command();
        let generate = command.find_subcommand_mut("generate").unwrap();
        let help = generate.render_long_help().to_string();
        assert!(help.contains("STUDIO_SAMPLE_DIR"), "{help}");
    }
}
