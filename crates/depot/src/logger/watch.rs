use std::{
    collections::HashMap,
    io::{self, Stdout},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, MouseButton, MouseEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

/// The pane set is fixed: every package gets exactly these four, arranged two columns
/// wide, top row at 2/3 height and bottom row at 1/3.
pub const PANES: [&str; 4] = ["build", "check", "lint", "script"];

struct PaneBuffer {
    lines: Vec<String>,
}

impl PaneBuffer {
    fn new() -> Self {
        PaneBuffer {
            lines: vec![String::new()],
        }
    }

    /// Appends a fragment, interpreting exactly two ANSI codes: erase-line (`ESC [2K`),
    /// which clears the pane's current line to support progress-bar redraws, and
    /// cursor-to-column-1 (`ESC [1G`), which is stripped. Everything else (including a
    /// bare `\r`, which most progress meters also use) is treated as the same "start this
    /// line over" signal. This is the minimum redraw behavior the real tools need; a full
    /// terminal emulator is deliberately not implemented.
    fn append(&mut self, data: &str) {
        let mut chunk = data;
        while !chunk.is_empty() {
            if let Some(rest) = chunk.strip_prefix("\u{1b}[2K") {
                if let Some(last) = self.lines.last_mut() {
                    last.clear();
                }
                chunk = rest;
                continue;
            }
            if let Some(rest) = chunk.strip_prefix("\u{1b}[1G") {
                chunk = rest;
                continue;
            }

            let next_special = ['\n', '\r']
                .iter()
                .filter_map(|c| chunk.find(*c))
                .min();
            let next_esc = chunk.find("\u{1b}[2K").or_else(|| chunk.find("\u{1b}[1G"));
            let boundary = [next_special, next_esc]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(chunk.len());

            if let Some(last) = self.lines.last_mut() {
                last.push_str(&chunk[..boundary]);
            }

            if boundary == chunk.len() {
                break;
            }

            match chunk.as_bytes()[boundary] {
                b'\n' => self.lines.push(String::new()),
                b'\r' => {
                    if let Some(last) = self.lines.last_mut() {
                        last.clear();
                    }
                }
                _ => {}
            }
            chunk = &chunk[boundary + 1..];
        }

        const MAX_LINES: usize = 2000;
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(0..excess);
        }
    }
}

struct WatchState {
    /// Display order of packages (buttons left-to-right).
    packages: Vec<String>,
    active: usize,
    panes: HashMap<(String, &'static str), PaneBuffer>,
}

pub struct WatchLogger {
    state: Mutex<WatchState>,
    shutdown: AtomicBool,
}

impl WatchLogger {
    pub fn new(packages: Vec<String>, initial: Option<&str>) -> Self {
        let mut panes = HashMap::new();
        for pkg in &packages {
            for pane in PANES {
                panes.insert((pkg.clone(), pane), PaneBuffer::new());
            }
        }

        // A single-package run starts with that package visible; otherwise the first
        // package in display order.
        let active = match initial {
            Some(name) => packages.iter().position(|p| p == name).unwrap_or(0),
            None => 0,
        };

        WatchLogger {
            state: Mutex::new(WatchState {
                packages,
                active,
                panes,
            }),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn register_pane(&self, pkg: &str, pane: &'static str) {
        let mut state = self.state.lock().unwrap();
        state
            .panes
            .entry((pkg.to_string(), pane))
            .or_insert_with(PaneBuffer::new);
        if !state.packages.iter().any(|p| p == pkg) {
            state.packages.push(pkg.to_string());
        }
    }

    pub fn log(&self, pkg: &str, pane: &'static str, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        let mut state = self.state.lock().unwrap();
        let key = (pkg.to_string(), pane);
        state
            .panes
            .entry(key)
            .or_insert_with(PaneBuffer::new)
            .append(&text);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Enters the alt screen and runs the render loop on a dedicated OS thread until the
    /// user quits (q/Esc/Ctrl-C) or a button click switches the visible package. Mutations
    /// to widget state happen only here, on this thread — producers only ever append to
    /// `panes` via `log`, never touch the terminal directly.
    pub fn run(&self) -> Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
            .context("Failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("Failed to initialize terminal")?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture).ok();
        self.shutdown.store(true, Ordering::SeqCst);

        if let Err(err) = result {
            log::error!("watch UI event loop failed: {err:#}");
        }

        // The TUI's own exit keybindings share the same shutdown path as an outside
        // SIGINT: kill every spawned child, then exit directly, since a `--watch` run
        // never settles its own future otherwise.
        crate::workspace::process::kill_all();
        std::process::exit(130);
    }

    fn event_loop(&self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut button_rects: Vec<Rect> = Vec::new();

        loop {
            terminal.draw(|frame| {
                let area = frame.size();
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(1), Constraint::Length(3)])
                    .split(area);

                let state = self.state.lock().unwrap();
                render_panes(frame, chunks[0], &state);
                button_rects = render_buttons(frame, chunks[1], &state);
            })?;

            if event::poll(Duration::from_millis(80))? {
                match event::read()? {
                    Event::Key(key) => match key.code {
                        KeyCode::Esc | KeyCode::Char('q') => break,
                        KeyCode::Char('c')
                            if key
                                .modifiers
                                .contains(crossterm::event::KeyModifiers::CONTROL) =>
                        {
                            break;
                        }
                        _ => {}
                    },
                    Event::Mouse(mouse) => {
                        if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                            let (x, y) = (mouse.column, mouse.row);
                            if let Some(idx) = button_rects.iter().position(|r| {
                                x >= r.x && x < r.x + r.width && y >= r.y && y < r.y + r.height
                            }) {
                                self.state.lock().unwrap().active = idx;
                            }
                        }
                    }
                    _ => {}
                }
            }

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
        }

        Ok(())
    }
}

fn render_panes(
    frame: &mut ratatui::Frame,
    area: Rect,
    state: &WatchState,
) {
    let Some(active_pkg) = state.packages.get(state.active) else {
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(2, 3), Constraint::Ratio(1, 3)])
        .split(area);

    for (row_idx, row_area) in rows.iter().enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(*row_area);

        for (col_idx, col_area) in cols.iter().enumerate() {
            let pane_idx = row_idx * 2 + col_idx;
            let Some(pane_name) = PANES.get(pane_idx) else {
                continue;
            };

            let text = state
                .panes
                .get(&(active_pkg.clone(), *pane_name))
                .map(|buf| {
                    buf.lines
                        .iter()
                        .map(|l| Line::from(l.clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let block = Block::default().borders(Borders::ALL).title(*pane_name);
            let para = Paragraph::new(text).block(block);
            frame.render_widget(para, *col_area);
        }
    }
}

fn render_buttons(frame: &mut ratatui::Frame, area: Rect, state: &WatchState) -> Vec<Rect> {
    if state.packages.is_empty() {
        return Vec::new();
    }

    let button_width = state
        .packages
        .iter()
        .map(|p| p.len() as u16 + 4)
        .max()
        .unwrap_or(8);

    let constraints: Vec<Constraint> = state
        .packages
        .iter()
        .map(|_| Constraint::Length(button_width))
        .collect();

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (idx, (pkg, col)) in state.packages.iter().zip(cols.iter()).enumerate() {
        let style = if idx == state.active {
            Style::default().fg(Color::Black).bg(Color::Green)
        } else {
            Style::default().fg(Color::White).bg(Color::Black)
        };
        let label = Line::from(Span::styled(format!(" {pkg} "), style));
        let para = Paragraph::new(label).block(Block::default().borders(Borders::ALL));
        frame.render_widget(para, *col);
    }

    cols.to_vec()
}

/// Kicks off the render loop on a background thread so the async scheduler driving
/// subordinate processes isn't blocked on terminal I/O.
pub fn spawn_watch_ui(logger: std::sync::Arc<WatchLogger>) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || logger.run())
}
