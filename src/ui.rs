use anyhow::Result;
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::{
    app::{App, Toast},
    loader::NodeKind,
    view::{self, RowKind, TreeRow},
};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Anything the event loop can draw the tree onto.
pub trait RenderTarget {
    fn draw(&mut self, app: &App, rows: &[TreeRow]) -> Result<()>;
    fn draw_loading(&mut self, tick: usize) -> Result<()>;
}

pub struct TerminalTarget<B: Backend> {
    terminal: Terminal<B>,
}

impl<B: Backend> TerminalTarget<B> {
    pub fn new(terminal: Terminal<B>) -> Self {
        Self { terminal }
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }
}

impl<B: Backend> RenderTarget for TerminalTarget<B> {
    fn draw(&mut self, app: &App, rows: &[TreeRow]) -> Result<()> {
        self.terminal.draw(|frame| ui(frame, app, rows))?;
        Ok(())
    }

    fn draw_loading(&mut self, tick: usize) -> Result<()> {
        self.terminal.draw(|frame| ui_loading(frame, tick))?;
        Ok(())
    }
}

fn ui(frame: &mut Frame, app: &App, rows: &[TreeRow]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)])
        .split(frame.size());

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| ListItem::new(row_line(app, row)))
        .collect();

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[0]);

    let list = List::new(items)
        .block(Block::default().title("GitLab Tree").borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !rows.is_empty() {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(list, main_chunks[0], &mut state);

    let details_lines = match rows.get(app.selected) {
        Some(row) => view::details(&app.loader, row),
        None => vec!["No selection".to_string()],
    };
    let details = Paragraph::new(details_lines.join("\n"))
        .block(Block::default().title("Details").borders(Borders::ALL));
    frame.render_widget(details, main_chunks[1]);

    let footer = Paragraph::new(footer_text(app));
    frame.render_widget(footer, chunks[1]);

    if let Some(toast) = &app.toast {
        render_toast(frame, toast);
    }
}

fn row_line(app: &App, row: &TreeRow) -> String {
    let indent = "  ".repeat(row.depth);
    let spinner = SPINNER[app.tick % SPINNER.len()];
    match row.kind {
        RowKind::Group(id) => {
            let Some(node) = app.loader.node(id) else {
                return format!("{indent}??? group {id}");
            };
            let marker = if node.loading {
                format!("[{spinner}]")
            } else if node.expanded {
                "[-]".to_string()
            } else {
                "[+]".to_string()
            };
            let kind = match node.kind {
                NodeKind::Group => "group",
                NodeKind::Subgroup => "subgroup",
            };
            format!("{indent}{marker} {kind} {}", node.group.name)
        }
        RowKind::Project { parent, index } => {
            let name = view::project_at(&app.loader, parent, index)
                .map(|project| project.name.as_str())
                .unwrap_or_default();
            format!("{indent} *  project {name}")
        }
        RowKind::Loading(_) => format!("{indent}{spinner} loading..."),
        RowKind::Error(id) => {
            let err = app
                .loader
                .node(id)
                .and_then(|node| node.error.as_deref())
                .unwrap_or("load failed");
            format!("{indent}! {err} (enter to retry)")
        }
        RowKind::Empty(_) => format!("{indent}(no items)"),
    }
}

fn footer_text(app: &App) -> String {
    let stats = app.loader.stats();
    let help =
        "q quit | R reload | r refresh | arrows move/expand | enter toggle | o open | / search";
    let mut info = app.backend_url.clone();
    if let Some(health) = &app.health {
        info.push_str(&format!(" ({health})"));
    }
    info.push_str(&format!(
        " | groups: {}, subgroups: {}, projects: {}",
        stats.groups, stats.subgroups, stats.projects
    ));
    if stats.loading > 0 {
        info.push_str(&format!(", loading: {}", stats.loading));
    }
    if let Some(status) = &app.status {
        info.push_str(&format!(" | {status}"));
    }
    if let Some(query) = &app.search_query {
        let label = if app.search_mode { "search*" } else { "search" };
        info.push_str(&format!(" | {label}: {query}"));
    }
    format!("{help}\n{info}")
}

fn ui_loading(frame: &mut Frame, tick: usize) {
    let block = Block::default().title("GitLab Tree").borders(Borders::ALL);
    let paragraph = Paragraph::new(loading_message(tick)).block(block);
    frame.render_widget(paragraph, frame.size());
}

fn render_toast(frame: &mut Frame, toast: &Toast) {
    let area = frame.size();
    let width = u16::try_from(toast.message.len())
        .unwrap_or(u16::MAX)
        .saturating_add(4);
    let y = 1u16.min(area.height);
    let height = 3u16.min(area.height.saturating_sub(y));
    let x = area.width.saturating_sub(width.saturating_add(1));
    let rect = Rect::new(x, y, width.min(area.width), height);
    let block = Block::default().title("Notice").borders(Borders::ALL);
    let paragraph = Paragraph::new(toast.message.clone()).block(block);
    frame.render_widget(paragraph, rect);
}

pub fn loading_message(tick: usize) -> String {
    let frame = SPINNER[tick % SPINNER.len()];
    format!("{frame} loading groups from backend...")
}
