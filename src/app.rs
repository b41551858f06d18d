use anyhow::Result;
use crossterm::event::KeyCode;
use tracing::debug;

use crate::{
    loader::{Expansion, LoadOutcome, TreeLoader},
    model::GroupId,
    view::{self, RowKind, TreeRow},
};

pub trait BrowserOpener {
    fn open(&mut self, url: &str) -> Result<()>;
}

pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&mut self, url: &str) -> Result<()> {
        open::that(url).map_err(|err| anyhow::anyhow!("open failed: {err}"))?;
        Ok(())
    }
}

pub struct Toast {
    pub message: String,
    remaining: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Quit,
    Reload,
}

pub struct App {
    pub loader: TreeLoader,
    pub selected: usize,
    pub backend_url: String,
    pub health: Option<String>,
    pub status: Option<String>,
    pub toast: Option<Toast>,
    pub search_query: Option<String>,
    pub search_mode: bool,
    pub tick: usize,
    pending_g: bool,
}

impl App {
    pub const TOAST_TTL: u8 = 10;

    pub fn new(loader: TreeLoader, backend_url: String, status: Option<String>) -> Self {
        Self {
            loader,
            selected: 0,
            backend_url,
            health: None,
            status,
            toast: None,
            search_query: None,
            search_mode: false,
            tick: 0,
            pending_g: false,
        }
    }

    pub fn with_health(mut self, health: Option<String>) -> Self {
        self.health = health;
        self
    }

    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let rows = view::visible_rows(&self.loader);
        match &self.search_query {
            Some(query) => view::filter_rows(&rows, &self.loader, query),
            None => rows,
        }
    }

    /// Drains finished fetches and keeps the cursor on the same row when
    /// rows above it appear or vanish.
    pub fn poll_loader(&mut self) -> usize {
        let before = self.visible_rows();
        let anchor = before.get(self.selected).copied();
        let events = self.loader.poll();
        if events.is_empty() {
            return 0;
        }
        for event in &events {
            match &event.outcome {
                LoadOutcome::Loaded {
                    subgroups,
                    projects,
                } => {
                    debug!(node = event.node_id, visible = event.visible, subgroups, projects, "node loaded")
                }
                LoadOutcome::Failed(err) => {
                    debug!(node = event.node_id, visible = event.visible, %err, "node load failed")
                }
            }
        }
        let after = self.visible_rows();
        if let Some(anchor) = anchor {
            if let Some(pos) = after.iter().position(|row| *row == anchor) {
                self.selected = pos;
            }
        }
        self.ensure_selection(after.len());
        events.iter().filter(|event| event.visible).count()
    }

    pub fn ensure_selection(&mut self, visible_len: usize) {
        if visible_len == 0 {
            self.selected = 0;
        } else if self.selected >= visible_len {
            self.selected = visible_len - 1;
        }
    }

    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn move_down(&mut self, visible_len: usize) {
        if self.selected + 1 < visible_len {
            self.selected += 1;
        }
    }

    fn move_top(&mut self) {
        self.selected = 0;
    }

    fn move_bottom(&mut self, visible_len: usize) {
        if visible_len > 0 {
            self.selected = visible_len - 1;
        }
    }

    fn collapse_or_parent(&mut self, visible: &[TreeRow]) {
        let Some(row) = visible.get(self.selected).copied() else {
            return;
        };
        if let RowKind::Group(id) = row.kind {
            if self.loader.collapse(id) {
                self.ensure_selection(self.visible_rows().len());
                return;
            }
        }
        if let Some(parent) = row.parent(&self.loader) {
            self.select_group(parent, visible);
        }
    }

    fn expand_or_child(&mut self, visible: &[TreeRow]) {
        let Some(row) = visible.get(self.selected).copied() else {
            return;
        };
        match row.kind {
            RowKind::Group(id) => {
                let Some(node) = self.loader.node(id) else {
                    return;
                };
                let has_child_row = visible
                    .get(self.selected + 1)
                    .is_some_and(|next| next.depth == row.depth + 1);
                if node.expanded && node.loaded && has_child_row {
                    self.selected += 1;
                } else {
                    self.expand(id);
                }
            }
            RowKind::Error(id) => self.expand(id),
            _ => {}
        }
    }

    fn toggle_selected(&mut self, visible: &[TreeRow]) {
        let Some(row) = visible.get(self.selected).copied() else {
            return;
        };
        match row.kind {
            RowKind::Group(id) => {
                if !self.loader.collapse(id) {
                    self.expand(id);
                }
            }
            RowKind::Error(id) => self.expand(id),
            _ => {}
        }
        self.ensure_selection(self.visible_rows().len());
    }

    fn expand(&mut self, id: GroupId) {
        let outcome = self.loader.expand(id);
        debug!(node = id, ?outcome, "expand requested");
        if outcome == Expansion::UnknownNode {
            self.set_status(format!("unknown group {id}"));
        }
    }

    fn select_group(&mut self, id: GroupId, visible: &[TreeRow]) {
        if let Some(pos) = visible
            .iter()
            .position(|row| row.kind == RowKind::Group(id))
        {
            self.selected = pos;
        }
    }

    fn refresh_selected(&mut self, visible: &[TreeRow]) {
        let Some(row) = visible.get(self.selected) else {
            return;
        };
        let owner = row.owner();
        let name = self
            .loader
            .node(owner)
            .map(|node| node.group.name.clone())
            .unwrap_or_else(|| owner.to_string());
        self.loader.refresh(Some(owner));
        self.set_toast(format!("Refreshing {name}"));
        self.ensure_selection(self.visible_rows().len());
    }

    fn open_selected<B: BrowserOpener + ?Sized>(
        &mut self,
        visible: &[TreeRow],
        browser: &mut B,
    ) -> Result<String> {
        let Some(row) = visible.get(self.selected) else {
            anyhow::bail!("no selection");
        };
        let Some(url) = view::row_url(&self.loader, row) else {
            anyhow::bail!("selection has no URL");
        };
        let url = url.to_string();
        browser.open(&url)?;
        Ok(url)
    }

    pub fn set_status(&mut self, message: String) {
        self.status = Some(message);
    }

    pub fn set_toast(&mut self, message: String) {
        self.toast = Some(Toast {
            message,
            remaining: Self::TOAST_TTL,
        });
    }

    pub fn tick_toast(&mut self) {
        if let Some(toast) = self.toast.as_mut() {
            if toast.remaining > 0 {
                toast.remaining -= 1;
            }
            if toast.remaining == 0 {
                self.toast = None;
            }
        }
    }

    fn consume_pending_g(&mut self) -> bool {
        if self.pending_g {
            self.pending_g = false;
            true
        } else {
            false
        }
    }

    fn start_search(&mut self) {
        self.search_mode = true;
        self.search_query = Some(String::new());
        self.selected = 0;
    }

    fn exit_search_mode(&mut self) {
        self.search_mode = false;
        if self.search_query.as_deref() == Some("") {
            self.search_query = None;
        }
    }

    fn clear_search(&mut self) {
        self.search_query = None;
        self.search_mode = false;
    }

    fn push_search_char(&mut self, ch: char) {
        self.search_query.get_or_insert_with(String::new).push(ch);
        self.selected = 0;
    }

    fn pop_search_char(&mut self) {
        if let Some(query) = &mut self.search_query {
            query.pop();
            if query.is_empty() && !self.search_mode {
                self.search_query = None;
            }
        }
    }

    pub fn handle_key(
        &mut self,
        key: KeyCode,
        visible: &[TreeRow],
        browser: &mut dyn BrowserOpener,
    ) -> Result<KeyAction> {
        if self.search_mode {
            match key {
                KeyCode::Esc => self.clear_search(),
                KeyCode::Enter => self.exit_search_mode(),
                KeyCode::Backspace => self.pop_search_char(),
                KeyCode::Char(ch) => self.push_search_char(ch),
                _ => {}
            }
            return Ok(KeyAction::None);
        }

        let action = match key {
            KeyCode::Char('q') => KeyAction::Quit,
            KeyCode::Char('R') => KeyAction::Reload,
            KeyCode::Char('r') => {
                self.refresh_selected(visible);
                KeyAction::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_up();
                KeyAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_down(visible.len());
                KeyAction::None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.collapse_or_parent(visible);
                KeyAction::None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.expand_or_child(visible);
                KeyAction::None
            }
            KeyCode::Enter => {
                self.toggle_selected(visible);
                KeyAction::None
            }
            KeyCode::Char('g') => {
                if self.consume_pending_g() {
                    self.move_top();
                } else {
                    self.pending_g = true;
                }
                KeyAction::None
            }
            KeyCode::Char('G') => {
                self.move_bottom(visible.len());
                KeyAction::None
            }
            KeyCode::Char('o') => {
                match self.open_selected(visible, browser) {
                    Ok(url) => {
                        self.set_status(format!("opened {url}"));
                        self.set_toast("Opened in browser".to_string());
                    }
                    Err(err) => self.set_status(format!("open failed: {err}")),
                }
                KeyAction::None
            }
            KeyCode::Char('/') => {
                self.start_search();
                KeyAction::None
            }
            KeyCode::Esc => {
                self.clear_search();
                KeyAction::None
            }
            _ => KeyAction::None,
        };

        if key != KeyCode::Char('g') {
            self.pending_g = false;
        }

        Ok(action)
    }
}
