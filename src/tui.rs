use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{Phase, ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::config::ResolvedConfig;
use crate::error::MinerError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    completed: Option<(usize, usize)>,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    active: bool,
}

pub struct Tui {
    kind: ProgressSinkKind,
    summary: RunSummary,
    state: Arc<Mutex<AppState>>,
    log_scroll: u16,
}

/// Settings shown in the details panel.
#[derive(Debug, Clone)]
struct RunSummary {
    cell_lines: String,
    statistics: String,
    workers: String,
    grouping: String,
    targets: String,
}

impl RunSummary {
    fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            cell_lines: config.cell_lines.join(", "),
            statistics: config
                .statistics
                .enabled()
                .map(|statistic| statistic.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            workers: config.workers.to_string(),
            grouping: config.grouping.to_string(),
            targets: config.targets.to_string(),
        }
    }
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            state.phase = event.phase;
            if event.completed.is_some() {
                state.completed = event.completed;
            }
            state.status = message.clone();
            let line = match event.completed {
                Some((done, total)) => format!("{message} ({done}/{total})"),
                None => message,
            };
            push_event(&mut state.events, line.clone());
            push_log(
                &mut state.logs,
                format!("[{}] {:<6} {line}", timestamp(), event.phase.label()),
            );
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind, config: &ResolvedConfig) -> Self {
        Self {
            kind,
            summary: RunSummary::from_config(config),
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Plan,
                completed: None,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                active: false,
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread and draws its progress until it returns.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, MinerError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                let elapsed = state.started.elapsed();
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick, elapsed))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                self.set_active(false);
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        // The worker is left running and dies with the process. Outputs it had
        // not committed yet are never persisted and are redone next run.
        self.set_active(false);
        restore_terminal()?;
        Err(miette::Report::msg("run abandoned; unfinished outputs were not written"))
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') => !self.is_active(),
            KeyCode::Esc => true,
            KeyCode::F(4) | KeyCode::Char('l') => {
                self.toggle_logs();
                false
            }
            KeyCode::PageUp => {
                self.scroll_logs(-5);
                false
            }
            KeyCode::PageDown => {
                self.scroll_logs(5);
                false
            }
            _ => false,
        }
    }

    fn toggle_logs(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.view = match state.view {
                View::Operational => View::Logs,
                View::Logs => View::Operational,
            };
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let next = self.log_scroll as i32 + delta as i32;
        self.log_scroll = next.max(0) as u16;
    }

    fn is_active(&self) -> bool {
        self.state.lock().map(|state| state.active).unwrap_or(false)
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
            }
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize, elapsed: Duration) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui.kind, tick), chunks[0]);
    frame.render_widget(draw_gauge(state, elapsed), chunks[1]);

    match state.view {
        View::Operational => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[2]);
            frame.render_widget(draw_status_panel(state), main[0]);
            frame.render_widget(draw_details_panel(&tui.summary), main[1]);
        }
        View::Logs => frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[2]),
    }

    let footer = Paragraph::new(Line::from(Span::styled(
        "q quit when done · Esc abandon run · l logs · PgUp/PgDn scroll",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, chunks[3]);
}

fn draw_header(kind: ProgressSinkKind, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match kind {
        ProgressSinkKind::Mine => "Mine",
        ProgressSinkKind::Concatenate => "Concat",
    };
    let line = Line::from(vec![
        Span::styled(
            "EPIMINE",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Mode: Interactive   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(vec![line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_gauge(state: &AppState, elapsed: Duration) -> Gauge<'static> {
    let ratio = progress_ratio(state.completed);
    let color = if state.phase == Phase::Done {
        Color::Green
    } else {
        Color::Cyan
    };
    let label = match state.completed {
        Some((done, total)) => format!("{done}/{total} · {}s", elapsed.as_secs()),
        None => format!("{}s", elapsed.as_secs()),
    };
    Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", state.phase.label())),
        )
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(label)
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let status_color = if state.active {
        Color::Cyan
    } else {
        Color::Green
    };
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Now: ", Style::default().fg(Color::Gray)),
            Span::styled(state.status.clone(), Style::default().fg(status_color)),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_details_panel(summary: &RunSummary) -> Paragraph<'static> {
    let field = |name: &'static str, value: &str| {
        Line::from(vec![
            Span::styled(format!("{name}: "), Style::default().fg(Color::Gray)),
            Span::raw(value.to_string()),
        ])
    };
    let lines = vec![
        Line::from(Span::styled(
            "RUN",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        field("Cell lines", &summary.cell_lines),
        field("Statistics", &summary.statistics),
        field("Grouping", &summary.grouping),
        field("Workers", &summary.workers),
        field("Targets", &summary.targets),
    ];
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &AppState, scroll: u16) -> Paragraph<'static> {
    let lines = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Logs "))
        .scroll((scroll, 0))
}

fn progress_ratio(completed: Option<(usize, usize)>) -> f64 {
    match completed {
        Some((_, 0)) | None => 0.0,
        Some((done, total)) => (done as f64 / total as f64).clamp(0.0, 1.0),
    }
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
