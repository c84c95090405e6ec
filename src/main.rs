use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use deck_terminal::config::AppConfig;
use deck_terminal::cooldown::{CooldownTicker, TICK_INTERVAL, now_ms};
use deck_terminal::deck::validate_for_save;
use deck_terminal::demo::DemoBackend;
use deck_terminal::faction::{faction_label, rule_label};
use deck_terminal::persist;
use deck_terminal::recommend::unit_score;
use deck_terminal::state::{
    Action, AppState, Delta, Effect, Focus, InputMode, ProviderCommand, apply_delta,
    default_state, focus_label, startup_effects, update,
};
use deck_terminal::worker;

struct App {
    state: AppState,
    should_quit: bool,
    backend_name: &'static str,
    cmd_tx: Option<mpsc::Sender<ProviderCommand>>,
    delta_tx: mpsc::Sender<Delta>,
    cooldown_ticker: Option<CooldownTicker>,
}

impl App {
    fn new(
        state: AppState,
        backend_name: &'static str,
        cmd_tx: Option<mpsc::Sender<ProviderCommand>>,
        delta_tx: mpsc::Sender<Delta>,
    ) -> Self {
        Self {
            state,
            should_quit: false,
            backend_name,
            cmd_tx,
            delta_tx,
            cooldown_ticker: None,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.state.input_mode != InputMode::Normal {
            self.on_input_key(key);
            return;
        }
        if self.state.help_overlay && key.code != KeyCode::Char('q') {
            self.dispatch(Action::ToggleHelp);
            return;
        }
        let action = match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('/') => {
                let current = self.state.filters.search_text.clone();
                self.begin_input(InputMode::Search, current);
                return;
            }
            KeyCode::Char('N') => {
                let current = self.state.deck.name.clone();
                self.begin_input(InputMode::DeckName, current);
                return;
            }
            KeyCode::Char('e') => {
                let current = self.state.pending_email.clone().unwrap_or_default();
                self.begin_input(InputMode::Email, current);
                return;
            }
            KeyCode::Char('v') => {
                self.begin_input(InputMode::Code, String::new());
                return;
            }
            KeyCode::Char('n') => Action::CycleNation,
            KeyCode::Char('t') => Action::CycleType,
            KeyCode::Char('f') => Action::CycleFactionRule,
            KeyCode::Char('o') => Action::ToggleOwnedOnly,
            KeyCode::Char('c') => Action::CyclePointCap,
            KeyCode::Tab => Action::ToggleFocus,
            KeyCode::Char('j') | KeyCode::Down => Action::SelectNext,
            KeyCode::Char('k') | KeyCode::Up => Action::SelectPrev,
            KeyCode::Char('a') | KeyCode::Enter => Action::AddSelected,
            KeyCode::Char('x') | KeyCode::Backspace | KeyCode::Delete => Action::RemoveSelected,
            KeyCode::Char('r') => Action::Recommend,
            KeyCode::Char('R') => Action::ResetDeck,
            KeyCode::Char('s') => Action::Save,
            KeyCode::Char('L') => Action::SignOut,
            KeyCode::Char('g') | KeyCode::F(5) => Action::ReloadCatalog,
            KeyCode::Char('?') => Action::ToggleHelp,
            _ => return,
        };
        self.dispatch(action);
    }

    fn begin_input(&mut self, mode: InputMode, initial: String) {
        self.state.input_mode = mode;
        self.state.input_buffer = initial;
    }

    fn on_input_key(&mut self, key: KeyEvent) {
        let mode = self.state.input_mode;
        match key.code {
            KeyCode::Esc => {
                self.state.input_mode = InputMode::Normal;
                self.state.input_buffer.clear();
                if mode == InputMode::Search {
                    self.dispatch(Action::SetSearch(String::new()));
                }
            }
            KeyCode::Enter => {
                self.state.input_mode = InputMode::Normal;
                let text = std::mem::take(&mut self.state.input_buffer);
                let action = match mode {
                    InputMode::Search => Action::SetSearch(text),
                    InputMode::DeckName => Action::RenameDeck(text),
                    InputMode::Email => Action::RequestSignIn(text),
                    InputMode::Code => Action::VerifyCode(text),
                    InputMode::Normal => return,
                };
                self.dispatch(action);
            }
            KeyCode::Backspace => {
                self.state.input_buffer.pop();
                if mode == InputMode::Search {
                    self.dispatch(Action::SetSearch(self.state.input_buffer.clone()));
                }
            }
            KeyCode::Char(ch) => {
                if mode == InputMode::Code && !ch.is_ascii_digit() {
                    return;
                }
                self.state.input_buffer.push(ch);
                if mode == InputMode::Search {
                    self.dispatch(Action::SetSearch(self.state.input_buffer.clone()));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, action: Action) {
        let effects = update(&mut self.state, action, now_ms());
        self.run_effects(effects);
    }

    fn on_delta(&mut self, delta: Delta) {
        let effects = apply_delta(&mut self.state, delta, now_ms());
        self.run_effects(effects);
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Provider(cmd) => self.send_command(cmd),
                Effect::Persist => persist::save_from_state(&self.state),
                Effect::StartCooldownTicker => self.start_ticker(),
                Effect::StopCooldownTicker => {
                    if let Some(mut ticker) = self.cooldown_ticker.take() {
                        ticker.cancel();
                    }
                }
            }
        }
    }

    fn send_command(&mut self, cmd: ProviderCommand) {
        let Some(tx) = &self.cmd_tx else {
            self.state.push_log("[WARN] Provider unavailable");
            return;
        };
        if tx.send(cmd).is_err() {
            self.state.push_log("[WARN] Provider request failed");
            self.cmd_tx = None;
        }
    }

    fn start_ticker(&mut self) {
        if self.cooldown_ticker.as_ref().is_some_and(CooldownTicker::is_running) {
            return;
        }
        let tx = self.delta_tx.clone();
        self.cooldown_ticker = Some(CooldownTicker::start(TICK_INTERVAL, move |_| {
            tx.send(Delta::CooldownTick).is_ok()
        }));
    }
}

fn main() -> io::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = AppConfig::from_env();
    let mut state = default_state(Some(config.default_cap));
    state.recommend = config.recommend;
    match config.faction_table() {
        Ok(table) => state.factions = table,
        Err(err) => state.push_log(format!("[WARN] Faction table: {err:#}; using defaults")),
    }
    persist::load_into_state(&mut state);

    let provider: Box<dyn deck_terminal::backend::Backend> = match config.make_backend() {
        Ok(provider) => provider,
        Err(err) => {
            state.push_log(format!("[ERR] Backend setup failed: {err:#}; using demo data"));
            let demo = DemoBackend::new(None, config.demo_cooldown_secs)
                .map_err(|err| io::Error::other(format!("{err:#}")))?;
            Box::new(demo)
        }
    };
    let backend_name = provider.name();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let term_backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(term_backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    worker::spawn_provider(tx.clone(), cmd_rx, provider);

    let mut app = App::new(state, backend_name, Some(cmd_tx), tx);
    let effects = startup_effects(&mut app.state, now_ms());
    app.run_effects(effects);
    let res = run_app(&mut terminal, &mut app, rx);
    persist::save_from_state(&app.state);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            app.on_delta(delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(1),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(chunks[1]);
    render_catalog(frame, columns[0], &app.state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(7)])
        .split(columns[1]);
    render_deck(frame, right[0], &app.state);
    let totals = Paragraph::new(totals_text(&app.state))
        .block(Block::default().title("Totals").borders(Borders::ALL));
    frame.render_widget(totals, right[1]);

    let console = Paragraph::new(console_text(&app.state, chunks[2].height.saturating_sub(2)))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let (status, status_style) = status_line(&app.state);
    frame.render_widget(Paragraph::new(status).style(status_style), chunks[3]);

    let footer = Paragraph::new(footer_text(&app.state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[4]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let state = &app.state;
    let who = match &state.session {
        Some(session) => format!("Signed in: {}", session.email),
        None => "Not signed in".to_string(),
    };
    let line1 = format!(
        " DECK TERMINAL | {} | Cap {} | Rule {} | {} backend",
        state.deck.name,
        state.deck.point_cap,
        rule_label(state.deck.faction_rule),
        app.backend_name
    );
    let mut line2 = format!(" {who} | Focus: {}", focus_label(state.focus));
    if state.catalog_loading {
        line2.push_str(" | loading catalog...");
    }
    if state.ownership_loading {
        line2.push_str(" | loading collection...");
    }
    format!("{line1}\n{line2}")
}

fn catalog_title(state: &AppState, count: usize) -> String {
    let filters = &state.filters;
    let search = if filters.search_text.is_empty() {
        "-".to_string()
    } else {
        format!("\"{}\"", filters.search_text)
    };
    format!(
        "Catalog ({count}) | Search {search} | Nation {} | Type {} | {} | Owned {}",
        filters.nation,
        filters.unit_type,
        rule_label(filters.faction_rule),
        if filters.owned_only { "only" } else { "any" }
    )
}

fn render_catalog(frame: &mut Frame, area: Rect, state: &AppState) {
    let units = state.filtered_units();
    let focused = state.focus == Focus::Catalog;
    let block = Block::default()
        .title(catalog_title(state, units.len()))
        .borders(Borders::ALL)
        .border_style(focus_border(focused));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if units.is_empty() {
        let msg = if state.catalog.is_empty() {
            "Catalog not loaded"
        } else {
            "No units match the current filters"
        };
        let empty = Paragraph::new(msg).style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let visible = inner.height as usize;
    let (start, end) = visible_range(state.selected_unit, units.len(), visible);
    let mut lines = Vec::with_capacity(end - start);
    for (idx, unit) in units.iter().enumerate().take(end).skip(start) {
        let addable = state.can_add_unit(unit);
        let in_deck = state.deck.count_of(&unit.id);
        let marker = if addable { "+" } else { " " };
        let copies = match state.ownership.as_ref().and_then(|m| m.get(&unit.id)) {
            Some(rec) if rec.is_owned() => format!("x{}", rec.copies),
            Some(_) => "--".to_string(),
            None => String::new(),
        };
        let text = format!(
            "{marker} {:<22} {:<14} {:<9} {:>3}pt {:>5.2} {:>3} {}",
            truncate(&unit.name, 22),
            truncate(&unit.nation, 14),
            truncate(&unit.unit_type, 9),
            unit.points,
            unit_score(unit),
            copies,
            if in_deck > 0 {
                format!("[{in_deck}]")
            } else {
                String::new()
            }
        );
        let mut style = if addable {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        if focused && idx == state.selected_unit {
            style = style.bg(Color::DarkGray).fg(Color::White);
        }
        lines.push(Line::from(Span::styled(text, style)));
    }
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_deck(frame: &mut Frame, area: Rect, state: &AppState) {
    let focused = state.focus == Focus::Deck;
    let block = Block::default()
        .title(format!("Deck: {}", state.deck.name))
        .borders(Borders::ALL)
        .border_style(focus_border(focused));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let entries = state.deck.entries();
    if entries.is_empty() {
        let empty = Paragraph::new("Empty deck. Press a to add or r to recommend.")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let visible = inner.height as usize;
    let (start, end) = visible_range(state.selected_entry, entries.len(), visible);
    let mut lines = Vec::with_capacity(end - start);
    for (idx, entry) in entries.iter().enumerate().take(end).skip(start) {
        let text = match state.catalog.get(&entry.unit_id) {
            Some(unit) => format!(
                "{:>2}x {:<22} {:>3}pt",
                entry.count,
                truncate(&unit.name, 22),
                unit.points * entry.count
            ),
            None => format!("{:>2}x (unknown {})", entry.count, entry.unit_id),
        };
        let style = if focused && idx == state.selected_entry {
            Style::default().bg(Color::DarkGray).fg(Color::White)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(text, style)));
    }
    frame.render_widget(Paragraph::new(lines), inner);
}

fn totals_text(state: &AppState) -> String {
    let totals = state.totals();
    let eff = totals
        .effective_by_range
        .iter()
        .enumerate()
        .map(|(range, value)| format!("R{range} {value:.1}"))
        .collect::<Vec<_>>()
        .join("  ");
    let verdict = match validate_for_save(&state.deck, &state.deck_context()) {
        Ok(_) => "Ready to save".to_string(),
        Err(err) => err.to_string(),
    };
    let saved = state
        .last_saved_id
        .as_deref()
        .map(|id| format!(" | last saved {id}"))
        .unwrap_or_default();
    format!(
        "Points {}/{} | Units {}\nFaction {} | Rule {}\n{eff}\n{verdict}{saved}",
        totals.points,
        state.deck.point_cap,
        totals.unit_count,
        faction_label(totals.faction),
        rule_label(state.deck.faction_rule),
    )
}

fn status_line(state: &AppState) -> (String, Style) {
    let prompt = match state.input_mode {
        InputMode::Normal => None,
        InputMode::Search => Some("Search"),
        InputMode::DeckName => Some("Deck name"),
        InputMode::Email => Some("Email"),
        InputMode::Code => Some("Sign-in code"),
    };
    if let Some(prompt) = prompt {
        return (
            format!(" {prompt}: {}_  (Enter confirm, Esc cancel)", state.input_buffer),
            Style::default().fg(Color::Cyan),
        );
    }

    let mut text = state.status.clone().unwrap_or_default();
    if state.cooldown_remaining > 0 {
        if !text.is_empty() {
            text.push_str(" | ");
        }
        text.push_str(&format!("Sign-in available in {}s", state.cooldown_remaining));
    }
    if state.save_pending {
        text.push_str(" | saving...");
    }
    (
        format!(" {text}"),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

fn footer_text(state: &AppState) -> String {
    let sign = if state.session.is_some() {
        "L Sign out"
    } else {
        "e Email | v Code"
    };
    format!(
        "/ Search | n Nation | t Type | f Faction | o Owned | c Cap | Tab Focus | a Add | x Remove | r Recommend | R Reset | N Name | s Save | {sign} | ? Help | q Quit"
    )
}

fn console_text(state: &AppState, lines: u16) -> String {
    if state.logs.is_empty() {
        return "No messages yet".to_string();
    }
    let take = usize::from(lines.max(1));
    let skip = state.logs.len().saturating_sub(take);
    state
        .logs
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn focus_border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('~');
    out
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Deck Terminal - Help",
        "",
        "Catalog filters:",
        "  /            Search by name",
        "  n / t        Cycle nation / type",
        "  f            Cycle faction rule (deck and filter)",
        "  o            Owned units only (signed in)",
        "",
        "Deck:",
        "  Tab          Switch catalog / deck",
        "  j/k or Up/Dn Move",
        "  a / Enter    Add selected unit",
        "  x / Bksp     Remove one copy",
        "  c            Cycle point cap",
        "  r            Recommend a deck",
        "  R            Reset deck",
        "  N            Rename deck",
        "  s            Save deck",
        "",
        "Account:",
        "  e            Request sign-in code",
        "  v            Enter sign-in code",
        "  L            Sign out",
        "  g / F5       Reload catalog",
        "  q            Quit",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
