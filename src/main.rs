mod api;
mod app;
mod config;
mod loader;
mod logging;
mod model;
mod ui;
mod view;

use std::{
    io,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};

use crate::{
    api::{BackendClient, FetchError},
    app::{App, KeyAction, SystemBrowser},
    config::Config,
    loader::{ThreadSpawner, TreeLoader},
    model::Group,
    ui::{RenderTarget, TerminalTarget},
};

type CrosstermTarget = TerminalTarget<CrosstermBackend<io::Stdout>>;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(&config)?;
    info!(api_url = %config.api_url, "starting gitlab-tree");

    let client = BackendClient::new(&config)?;
    let mut target = setup_terminal()?;
    let result = run_app(&mut target, client);
    restore_terminal(&mut target)?;
    result
}

fn setup_terminal() -> Result<CrosstermTarget> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(TerminalTarget::new(Terminal::new(backend)?))
}

fn restore_terminal(target: &mut CrosstermTarget) -> Result<()> {
    disable_raw_mode()?;
    let terminal = target.terminal_mut();
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app<T: RenderTarget>(target: &mut T, client: BackendClient) -> Result<()> {
    let mut loading = Some(start_loader(client.clone()));
    let mut app: Option<App> = None;
    let mut browser = SystemBrowser;
    loop {
        if let Some(handle) = loading.as_mut() {
            match handle.receiver.try_recv() {
                Ok(initial) => {
                    app = Some(build_app(&client, initial));
                    loading = None;
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    app = Some(build_app(
                        &client,
                        InitialLoad {
                            groups: Err(FetchError::Network("loader thread exited".to_string())),
                            health: None,
                        },
                    ));
                    loading = None;
                }
                Err(mpsc::TryRecvError::Empty) => {}
            }
        }

        let mut pending_action = None;
        if let Some(app_ref) = app.as_mut() {
            app_ref.poll_loader();
            let visible = app_ref.visible_rows();
            app_ref.ensure_selection(visible.len());
            app_ref.tick_toast();
            app_ref.advance_tick();

            target.draw(app_ref, &visible)?;

            // redraw faster while spinners are on screen
            let wait = if app_ref.loader.is_busy() { 100 } else { 200 };
            if event::poll(Duration::from_millis(wait))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Release {
                        pending_action = Some(app_ref.handle_key(key.code, &visible, &mut browser)?);
                    }
                }
            }
        } else if let Some(handle) = loading.as_mut() {
            target.draw_loading(handle.tick)?;
            handle.tick = handle.tick.wrapping_add(1);

            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Char('q') {
                        return Ok(());
                    }
                }
            }
        } else {
            return Ok(());
        }

        if let Some(action) = pending_action {
            match action {
                KeyAction::Quit => return Ok(()),
                KeyAction::Reload => {
                    info!("full reload requested");
                    loading = Some(start_loader(client.clone()));
                    app = None;
                }
                KeyAction::None => {}
            }
        }
    }
}

struct InitialLoad {
    groups: Result<Vec<Group>, FetchError>,
    health: Option<String>,
}

struct LoadHandle {
    receiver: mpsc::Receiver<InitialLoad>,
    tick: usize,
}

fn start_loader(client: BackendClient) -> LoadHandle {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let health = match client.health() {
            Ok(health) => Some(describe_health(&health)),
            Err(err) => {
                warn!(error = %err, "health check failed");
                None
            }
        };
        let groups = loader::list_top_level_groups(&client);
        let _ = sender.send(InitialLoad { groups, health });
    });
    LoadHandle { receiver, tick: 0 }
}

fn describe_health(health: &model::Health) -> String {
    let gitlab = if health.gitlab_configured {
        "gitlab configured"
    } else {
        "gitlab not configured"
    };
    format!("{}, {gitlab}", health.status)
}

fn build_app(client: &BackendClient, initial: InitialLoad) -> App {
    let source = Arc::new(client.clone());
    let (groups, status) = match initial.groups {
        Ok(groups) => {
            let status = format!("{} top-level groups", groups.len());
            (groups, status)
        }
        Err(err) => (Vec::new(), format!("load error: {err} (R to retry)")),
    };
    let loader = TreeLoader::new(source, Box::new(ThreadSpawner), groups);
    App::new(loader, client.base_url().to_string(), Some(status)).with_health(initial.health)
}
