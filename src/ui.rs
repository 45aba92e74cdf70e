use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use customer_ltv::{CustomerSummary, PipelineOutput, RankedCustomer};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Ranking,
    Excluded,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Ranking => Page::Excluded,
            Page::Excluded => Page::Ranking,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Ranking => "LTV Ranking",
            Page::Excluded => "No Entry Time",
        }
    }
}

pub struct App {
    pub output: PipelineOutput,
    pub source: String,
    pub state: TableState,
    pub excluded_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(output: PipelineOutput, source: &str) -> Self {
        let mut state = TableState::default();
        if !output.ranking.entries.is_empty() {
            state.select(Some(0));
        }

        let mut excluded_state = TableState::default();
        if !output.ranking.excluded.is_empty() {
            excluded_state.select(Some(0));
        }

        Self {
            output,
            source: source.to_string(),
            state,
            excluded_state,
            current_page: Page::Ranking,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    fn page_len(&self) -> usize {
        match self.current_page {
            Page::Ranking => self.output.ranking.entries.len(),
            Page::Excluded => self.output.ranking.excluded.len(),
        }
    }

    fn page_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Ranking => &mut self.state,
            Page::Excluded => &mut self.excluded_state,
        }
    }

    pub fn selected_customer(&self) -> Option<&RankedCustomer> {
        self.state
            .selected()
            .and_then(|i| self.output.ranking.entries.get(i))
    }

    /// Id and summary of whatever row is selected on the current page
    pub fn selected_summary(&self) -> Option<(&str, &CustomerSummary)> {
        let id = match self.current_page {
            Page::Ranking => self.selected_customer().map(|r| r.customer_id.as_str()),
            Page::Excluded => self
                .excluded_state
                .selected()
                .and_then(|i| self.output.ranking.excluded.get(i))
                .map(String::as_str),
        }?;
        self.output.aggregator.get(id).map(|s| (id, s))
    }

    /// Move the selection by `delta` rows, wrapping at both ends when `wrap`
    fn move_by(&mut self, delta: isize, wrap: bool) {
        let len = self.page_len();
        if len == 0 {
            return;
        }
        let state = self.page_state();
        let current = state.selected().unwrap_or(0) as isize;
        let last = len as isize - 1;
        let target = current + delta;

        let i = if wrap {
            target.rem_euclid(len as isize)
        } else {
            target.clamp(0, last)
        };
        state.select(Some(i as usize));
    }

    pub fn next(&mut self) {
        self.move_by(1, true);
    }

    pub fn previous(&mut self) {
        self.move_by(-1, true);
    }

    pub fn page_down(&mut self) {
        self.move_by(20, false);
    }

    pub fn page_up(&mut self) {
        self.move_by(-20, false);
    }

    pub fn home(&mut self) {
        if self.page_len() > 0 {
            self.page_state().select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let len = self.page_len();
        if len > 0 {
            self.page_state().select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab | KeyCode::BackTab => app.next_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_detail_panel(f, split[1], app);
        split[0]
    } else {
        chunks[1]
    };

    match app.current_page {
        Page::Ranking => render_ranking(f, content, app),
        Page::Excluded => render_excluded(f, content, app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::Ranking, Page::Excluded].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    let stats = &app.output.stats;
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("{} events", stats.ingested),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("{} customers", stats.customers),
        Style::default().fg(Color::Green),
    ));
    if stats.skipped > 0 {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("{} skipped", stats.skipped),
            Style::default().fg(Color::Red),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ", app.source)),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_ranking(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["#", "Customer", "LTV", "Weeks", "Visits/wk", "Spend/visit"]);

    let rows = app.output.ranking.entries.iter().enumerate().map(|(i, r)| {
        Row::new(vec![
            Cell::from(format!("{}", i + 1)),
            Cell::from(truncate(&r.customer_id, 30)),
            Cell::from(format!("{:.2}", r.ltv)).style(Style::default().fg(Color::Green)),
            Cell::from(format!("{}", r.score.week_count)),
            Cell::from(format!("{:.2}", r.score.avg_weekly_visits)),
            Cell::from(format!("{:.2}", r.score.avg_expenditure_per_visit)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(32),
            Constraint::Length(14),
            Constraint::Length(7),
            Constraint::Length(10),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Top Customers by LTV "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_excluded(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["Customer", "Events", "Visits", "Spending"]);

    let aggregator = &app.output.aggregator;
    let rows = app.output.ranking.excluded.iter().map(|id| {
        let (events, visits, spending) = aggregator
            .get(id)
            .map(|s| (s.event_count, s.visit_count, s.total_spending))
            .unwrap_or_default();
        Row::new(vec![
            Cell::from(truncate(id, 30)),
            Cell::from(format!("{}", events)),
            Cell::from(format!("{}", visits)),
            Cell::from(format!("{:.2}", spending)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Customers without a CUSTOMER event "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.excluded_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Ranking => (app.state.selected(), app.output.ranking.entries.len()),
        Page::Excluded => (app.excluded_state.selected(), app.output.ranking.excluded.len()),
    };
    let selected = selected.map(|i| i + 1).unwrap_or(0);

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let status = Paragraph::new(vec![Line::from(vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        key("Enter"),
        Span::raw(" Details | "),
        key("Tab"),
        Span::raw(" Page | "),
        key("↑/↓"),
        Span::raw(" Nav | "),
        key("PgUp/PgDn"),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ])])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Customer Details ");

    let (id, summary) = match app.selected_summary() {
        Some(selected) => selected,
        None => {
            f.render_widget(Paragraph::new("No customer selected").block(block), area);
            return;
        }
    };

    let label = |text: &'static str| {
        Span::styled(
            text,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    };
    let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };

    let mut content = vec![
        Line::from(""),
        Line::from(vec![label("  Customer: "), Span::raw(id.to_string())]),
        Line::from(""),
        Line::from(vec![label("  Entry: "), Span::raw(time(summary.entry_time))]),
        Line::from(vec![label("  Exit:  "), Span::raw(time(summary.exit_time))]),
        Line::from(""),
        Line::from(vec![label("  Visits: "), Span::raw(summary.visit_count.to_string())]),
        Line::from(vec![label("  Images: "), Span::raw(summary.image_count.to_string())]),
        Line::from(vec![label("  Orders: "), Span::raw(summary.order_count.to_string())]),
        Line::from(vec![
            label("  Spending: "),
            Span::styled(
                format!("{:.2}", summary.total_spending),
                Style::default().fg(Color::Green),
            ),
        ]),
    ];

    if app.current_page == Page::Ranking {
        if let Some(ranked) = app.selected_customer() {
            let s = &ranked.score;
            content.extend([
                Line::from(""),
                Line::from("  ─────────────────────────────────────"),
                Line::from(""),
                Line::from(vec![Span::styled(
                    "  SCORE",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                )]),
                Line::from(""),
                Line::from(vec![
                    label("  Spend/visit: "),
                    Span::raw(format!("{:.4}", s.avg_expenditure_per_visit)),
                ]),
                Line::from(vec![label("  Weeks: "), Span::raw(s.week_count.to_string())]),
                Line::from(vec![
                    label("  Visits/week: "),
                    Span::raw(format!("{:.4}", s.avg_weekly_visits)),
                ]),
                Line::from(vec![
                    label("  Spend/week: "),
                    Span::raw(format!("{:.4}", s.avg_weekly_expenditure)),
                ]),
                Line::from(vec![
                    label("  LTV (52 × 10): "),
                    Span::styled(
                        format!("{:.2}", s.ltv),
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    ),
                ]),
            ]);
        }
    }

    content.push(Line::from(""));
    content.push(Line::from(vec![Span::styled(
        "  Press Enter to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )]));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
