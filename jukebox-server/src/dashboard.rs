//! Terminal dashboard for the jukebox server

use crate::metrics::{format_duration, truncate_id, LogLevel, Metrics, ServerStatus};
use crate::network::{self, ServerConfig};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use jukebox_core::NowPlaying;
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table},
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

/// Dashboard state for scrolling etc.
struct DashboardState {
    /// Log scroll position (0 = most recent at bottom)
    log_scroll: usize,
    /// Whether auto-scroll is enabled (follows new logs)
    auto_scroll: bool,
    /// Log count at the last frame, to spot new entries
    seen_logs: usize,
}

impl DashboardState {
    fn scroll_up(&mut self, by: usize, log_count: usize) {
        if log_count > 0 {
            self.log_scroll = (self.log_scroll + by).min(log_count.saturating_sub(1));
            self.auto_scroll = false;
        }
    }

    fn scroll_down(&mut self, by: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(by);
        if self.log_scroll == 0 {
            self.auto_scroll = true;
        }
    }
}

/// Run the dashboard
pub async fn run(config: ServerConfig, metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Start server in background
    let metrics_for_network = Arc::clone(&metrics);
    tokio::spawn(async move {
        if let Err(e) = network::run_server(config, Arc::clone(&metrics_for_network)).await {
            let mut m = metrics_for_network.write();
            m.status = ServerStatus::Error;
            m.log(LogLevel::Error, format!("Server error: {}", e));
        }
    });

    let mut state = DashboardState {
        log_scroll: 0,
        auto_scroll: true,
        seen_logs: 0,
    };

    // Main loop
    let tick_rate = Duration::from_millis(100);
    let mut should_quit = false;

    while !should_quit {
        // New log lines came in, scroll to bottom if auto-scroll enabled
        let log_count = metrics.read().logs.len();
        if log_count != state.seen_logs {
            state.seen_logs = log_count;
            if state.auto_scroll {
                state.log_scroll = 0;
            }
        }

        // Draw
        terminal.draw(|f| draw(f, &metrics, &state))?;

        // Handle input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let log_count = metrics.read().logs.len();

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => should_quit = true,
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            should_quit = true
                        }
                        KeyCode::Up | KeyCode::Char('k') => state.scroll_up(1, log_count),
                        KeyCode::Down | KeyCode::Char('j') => state.scroll_down(1),
                        KeyCode::PageUp => state.scroll_up(10, log_count),
                        KeyCode::PageDown => state.scroll_down(10),
                        KeyCode::Home => state.scroll_up(log_count, log_count),
                        KeyCode::End => state.scroll_down(usize::MAX),
                        KeyCode::Char('a') => {
                            state.auto_scroll = !state.auto_scroll;
                            if state.auto_scroll {
                                state.log_scroll = 0;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Draw the dashboard
fn draw(f: &mut Frame, metrics: &Arc<RwLock<Metrics>>, state: &DashboardState) {
    let m = metrics.read();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Length(7),  // Stats
            Constraint::Min(6),     // Queues
            Constraint::Min(8),     // Logs
            Constraint::Length(1),  // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], &m);
    draw_stats(f, chunks[1], &m);
    draw_queues(f, chunks[2], &m);
    draw_logs(f, chunks[3], &m, state);
    draw_footer(f, chunks[4], state);
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics) {
    let (status_text, status_style) = match m.status {
        ServerStatus::Starting => ("STARTING", Style::default().fg(Color::Yellow)),
        ServerStatus::Running => ("RUNNING", Style::default().fg(Color::Green)),
        ServerStatus::Error => ("ERROR", Style::default().fg(Color::Red)),
    };

    let title = vec![Line::from(vec![
        Span::styled("Shared Jukebox", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  Status: "),
        Span::styled(status_text, status_style),
        Span::raw("  │  Uptime: "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
        Span::raw("  │  Port: "),
        Span::styled(m.port.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("  │  Data: "),
        Span::styled(m.data_dir.display().to_string(), Style::default().fg(Color::Cyan)),
    ])];

    let header = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));

    f.render_widget(header, area);
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(25),
            Constraint::Percentage(35),
        ])
        .split(area);

    // Now playing
    let (title, source) = match &m.snapshot.current_item {
        Some(NowPlaying::Queued(item)) => (
            item.title.clone().unwrap_or_else(|| item.content_id.clone()),
            format!("from {}", item.owner_name),
        ),
        Some(NowPlaying::History(pick)) => (pick.display_name.clone(), "from history".to_string()),
        None => ("idle".to_string(), String::new()),
    };
    let playing_for = m
        .snapshot
        .started_at
        .map(|started_at| format_duration(chrono::Utc::now().signed_duration_since(started_at).num_seconds()))
        .unwrap_or_else(|| "-".to_string());
    let host = if m.host_attached { ("attached", Color::Green) } else { ("none", Color::Yellow) };

    let playing_info = vec![
        Line::from(vec![
            Span::raw("Track: "),
            Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![Span::raw("       "), Span::styled(source, Style::default().fg(Color::DarkGray))]),
        Line::from(vec![
            Span::raw("Playing for: "),
            Span::styled(playing_for, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Host: "),
            Span::styled(host.0, Style::default().fg(host.1)),
        ]),
    ];

    let playing_block = Paragraph::new(playing_info)
        .block(Block::default().borders(Borders::ALL).title(" Now Playing "));
    f.render_widget(playing_block, chunks[0]);

    // Connections
    let conn_info = vec![
        Line::from(vec![
            Span::raw("Active: "),
            Span::styled(
                m.active_connections.to_string(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::raw("Total: "),
            Span::styled(m.total_connections.to_string(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Peak: "),
            Span::styled(m.peak_connections.to_string(), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::raw("Participants: "),
            Span::styled(m.snapshot.queues.len().to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ];

    let conn_block = Paragraph::new(conn_info)
        .block(Block::default().borders(Borders::ALL).title(" Connections "));
    f.render_widget(conn_block, chunks[1]);

    // Totals
    let totals_info = vec![
        Line::from(vec![
            Span::raw("Tracks: "),
            Span::styled(
                format!("{} ({} history)", m.stats.tracks_started, m.stats.history_fallbacks),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Line::from(vec![
            Span::raw("Pending: "),
            Span::styled(m.pending_items().to_string(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Skips / denied: "),
            Span::styled(
                format!("{} / {}", m.stats.skips, m.stats.denials),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(vec![
            Span::raw("Store failures: "),
            Span::styled(
                m.stats.store_failures.to_string(),
                if m.stats.store_failures > 0 {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::Green)
                },
            ),
        ]),
    ];

    let totals_block = Paragraph::new(totals_info)
        .block(Block::default().borders(Borders::ALL).title(" Totals "));
    f.render_widget(totals_block, chunks[2]);
}

/// Wait table, longest waiting first
fn draw_queues(f: &mut Frame, area: Rect, m: &Metrics) {
    let mut queues: Vec<_> = m.snapshot.queues.iter().collect();
    queues.sort_by(|a, b| b.wait_seconds.cmp(&a.wait_seconds));

    let rows: Vec<Row> = queues
        .iter()
        .map(|q| {
            let next = q.items.first().map(|item| item.content_id.clone()).unwrap_or_default();
            let style = if q.items.is_empty() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(vec![
                q.display_name.clone(),
                truncate_id(q.identity.as_str()),
                format_duration(q.wait_seconds as i64),
                q.items.len().to_string(),
                next,
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(25),
            Constraint::Percentage(20),
            Constraint::Percentage(15),
            Constraint::Percentage(10),
            Constraint::Percentage(30),
        ],
    )
    .header(
        Row::new(vec!["Name", "Identity", "Waited", "Queued", "Next"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Queues "));

    f.render_widget(table, area);
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total_logs = m.logs.len();

    let log_items: Vec<ListItem> = m.logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::Blue),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Connection => Style::default().fg(Color::Green),
                LogLevel::Playback => Style::default().fg(Color::Magenta),
            };

            let time = entry.timestamp.format("%H:%M:%S").to_string();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", entry.level.as_str()), level_style),
                Span::raw(&entry.message),
            ]))
        })
        .collect();

    let scroll_indicator = if state.auto_scroll {
        " [AUTO] ".to_string()
    } else if total_logs > 0 {
        format!(" [{}/{}] ", total_logs - state.log_scroll, total_logs)
    } else {
        String::new()
    };

    let logs = List::new(log_items)
        .block(Block::default().borders(Borders::ALL).title(format!(" Activity Log{}", scroll_indicator)));

    f.render_widget(logs, area);

    if total_logs > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state = ScrollbarState::new(total_logs)
            .position(total_logs.saturating_sub(state.log_scroll + visible_height));

        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let auto_text = if state.auto_scroll { "ON " } else { "OFF" };
    let auto_color = if state.auto_scroll { Color::Green } else { Color::Yellow };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Q ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Quit  "),
        Span::styled(" ↑↓ ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Scroll  "),
        Span::styled(" PgUp/Dn ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Page  "),
        Span::styled(" A ", Style::default().fg(Color::Black).bg(Color::White)),
        Span::raw(" Auto-scroll: "),
        Span::styled(auto_text, Style::default().fg(auto_color)),
    ]));

    f.render_widget(footer, area);
}
