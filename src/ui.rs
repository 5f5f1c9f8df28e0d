pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::{
    app::App,
    catalog::{Decision, Difficulty, DifficultyFilter},
    identity::IdentityWidget,
    session::Choice,
    util::truncate_with_ellipsis,
};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

const TITLE: &str = "Micro-Decision Trainer";
const TAGLINE: &str = "Train yourself to make quick decisions under time pressure";
const TIMEOUT_REMINDER: &str = "A quick decision is often better than no decision!";

/// Scenario text in the results list is cut to this many columns
pub const SCENARIO_PREVIEW_WIDTH: usize = 80;

/// Lines each result occupies in the results list
const RESULT_LINES: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let [header, body, footer] = frame_layout(area);

        render_header(self.identity(), header, buf);

        let screen = screen::current_screen(self.phase());
        screen.render(self, body, buf);

        Paragraph::new(Span::styled(
            screen.legend(),
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(footer, buf);
    }
}

/// Header, body and key legend
pub fn frame_layout(area: Rect) -> [Rect; 3] {
    Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .horizontal_margin(HORIZONTAL_MARGIN)
    .vertical_margin(VERTICAL_MARGIN)
    .areas(area)
}

pub fn difficulty_color(difficulty: Difficulty) -> Color {
    match difficulty {
        Difficulty::Easy => Color::Green,
        Difficulty::Medium => Color::Yellow,
        Difficulty::Hard => Color::Red,
    }
}

/// Countdown colour for the share of time left
pub fn timer_color(fraction_remaining: f64) -> Color {
    if fraction_remaining > 0.5 {
        Color::Green
    } else if fraction_remaining > 0.25 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_header(identity: &IdentityWidget, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);

    Paragraph::new(Span::styled(TITLE, bold_style.fg(Color::Cyan))).render(area, buf);

    if let Some(line) = identity_line(identity) {
        Paragraph::new(line)
            .alignment(Alignment::Right)
            .render(area, buf);
    }
}

fn identity_line(identity: &IdentityWidget) -> Option<Line<'static>> {
    if !identity.is_enabled() {
        return None;
    }

    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let line = if let Some(status) = identity.status() {
        Line::from(Span::styled(
            status.to_string(),
            Style::default().fg(Color::Yellow),
        ))
    } else if identity.is_loading() {
        Line::from(Span::styled("Checking sign-in...", dim_style))
    } else if let Some(user) = identity.user() {
        Line::from(vec![
            Span::styled("● ", Style::default().fg(Color::Green)),
            Span::raw(user.display_name().to_string()),
            Span::styled("  (o) sign out", dim_style),
        ])
    } else {
        Line::from(Span::styled("(g) Sign in with Google", dim_style))
    };

    Some(line)
}

pub(crate) fn render_menu(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let [tagline, _, difficulty_label, difficulty, _, length_label, length_bar, _, available, _, notice] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .areas(area);

    Paragraph::new(Span::styled(
        TAGLINE,
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(tagline, buf);

    let menu = app.menu();
    let catalog = app.trainer().catalog();

    Paragraph::new(Span::styled("Difficulty", bold_style)).render(difficulty_label, buf);

    let selector = DifficultyFilter::ALL
        .iter()
        .flat_map(|filter| {
            let label = format!(" {} ({}) ", filter, catalog.count_matching(*filter));
            let style = if *filter == menu.difficulty {
                bold_style.add_modifier(Modifier::REVERSED)
            } else {
                dim_style
            };
            [Span::styled(label, style), Span::raw(" ")]
        })
        .collect::<Vec<Span>>();
    Paragraph::new(Line::from(selector)).render(difficulty, buf);

    Paragraph::new(Line::from(vec![
        Span::styled("Session length: ", bold_style),
        Span::raw(format!("{} decisions", menu.length)),
    ]))
    .render(length_label, buf);

    let (min, max) = app.length_bounds();
    let bar = (min..=max)
        .map(|n| if n <= menu.length { '■' } else { '·' })
        .collect::<String>();
    Paragraph::new(Line::from(vec![
        Span::styled(format!("{min} "), dim_style),
        Span::styled(bar, Style::default().fg(Color::Cyan)),
        Span::styled(format!(" {max}"), dim_style),
    ]))
    .render(length_bar, buf);

    let count = catalog.count_matching(menu.difficulty);
    Paragraph::new(Span::styled(
        format!(
            "{} of {} scenarios will be drawn",
            menu.length.min(count),
            count
        ),
        dim_style,
    ))
    .render(available, buf);

    if let Some(text) = app.notice() {
        Paragraph::new(Span::styled(
            text.to_string(),
            bold_style.fg(Color::Yellow),
        ))
        .wrap(Wrap { trim: true })
        .render(notice, buf);
    }
}

/// Rows of the playing screen
#[derive(Debug, Clone, PartialEq)]
pub struct PlayingLayout {
    pub progress: Rect,
    pub category: Rect,
    pub gauge: Rect,
    pub counter: Rect,
    pub scenario: Rect,
    pub options: Vec<Rect>,
}

fn wrapped_height(text: &str, width: u16) -> u16 {
    if width == 0 {
        return 1;
    }
    let lines = text.width().div_ceil(width as usize).max(1);
    // word wrapping can spill one line past the column estimate
    let lines = if lines > 1 { lines + 1 } else { lines };
    lines.min(u16::MAX as usize) as u16
}

pub fn playing_layout(body: Rect, decision: &Decision) -> PlayingLayout {
    let option_count = decision.options.len();

    let mut constraints = vec![
        Constraint::Length(1), // progress
        Constraint::Length(1), // category
        Constraint::Length(1), // gauge
        Constraint::Length(1), // counter
        Constraint::Length(1),
        Constraint::Length(wrapped_height(&decision.scenario, body.width)),
        Constraint::Length(1),
    ];
    constraints.extend((0..option_count).map(|_| Constraint::Length(1)));
    constraints.push(Constraint::Min(0));

    let chunks = Layout::vertical(constraints).split(body);

    PlayingLayout {
        progress: chunks[0],
        category: chunks[1],
        gauge: chunks[2],
        counter: chunks[3],
        scenario: chunks[5],
        options: chunks[7..7 + option_count].to_vec(),
    }
}

/// Screen rows of the options of `decision` when drawn into a frame of size `area`
pub fn option_rows(area: Rect, decision: &Decision) -> Vec<Rect> {
    let [_, body, _] = frame_layout(area);
    playing_layout(body, decision).options
}

/// Index of the option drawn at (`column`, `row`), if any
pub fn option_at(area: Rect, decision: &Decision, column: u16, row: u16) -> Option<usize> {
    option_rows(area, decision)
        .iter()
        .position(|rect| rect.contains(Position::new(column, row)))
}

pub(crate) fn render_playing(app: &App, area: Rect, buf: &mut Buffer) {
    let trainer = app.trainer();
    let Some(decision) = trainer.current_decision() else {
        return;
    };

    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let layout = playing_layout(area, decision);

    let session = trainer.session();
    Paragraph::new(Span::styled(
        format!(
            "Decision {} of {}",
            session.current_index() + 1,
            session.len()
        ),
        dim_style,
    ))
    .render(layout.progress, buf);

    Paragraph::new(Line::from(vec![
        Span::styled(
            decision.category.clone(),
            bold_style.fg(difficulty_color(decision.difficulty)),
        ),
        Span::styled(format!("  {}", decision.difficulty), dim_style),
    ]))
    .render(layout.category, buf);

    let (remaining, fraction) = trainer
        .timer()
        .map(|t| (t.remaining(), t.fraction_remaining()))
        .unwrap_or((0, 0.0));
    let color = timer_color(fraction);

    Gauge::default()
        .gauge_style(Style::default().fg(color))
        .ratio(fraction.clamp(0.0, 1.0))
        .label("")
        .render(layout.gauge, buf);

    Paragraph::new(Span::styled(format!("{remaining}s"), bold_style.fg(color)))
        .alignment(Alignment::Center)
        .render(layout.counter, buf);

    Paragraph::new(Span::styled(decision.scenario.clone(), bold_style))
        .wrap(Wrap { trim: true })
        .render(layout.scenario, buf);

    let label_width = (area.width as usize).saturating_sub(4);
    for (idx, (option, row)) in decision.options.iter().zip(&layout.options).enumerate() {
        Paragraph::new(Line::from(vec![
            Span::styled(format!("[{}] ", idx + 1), bold_style.fg(Color::Cyan)),
            Span::raw(truncate_with_ellipsis(option, label_width.saturating_sub(3))),
        ]))
        .render(*row, buf);
    }
}

pub(crate) fn render_feedback(app: &App, area: Rect, buf: &mut Buffer) {
    let session = app.trainer().session();
    let Some(result) = session.last_result() else {
        return;
    };

    let bold_style = Style::default().add_modifier(Modifier::BOLD);

    let mut lines = if result.timed_out {
        vec![
            Line::from(Span::styled("Time's Up!", bold_style.fg(Color::Red))),
            Line::from(""),
            Line::from(Span::styled(
                TIMEOUT_REMINDER,
                Style::default().add_modifier(Modifier::ITALIC),
            )),
        ]
    } else {
        vec![
            Line::from(Span::styled("Decision Made!", bold_style.fg(Color::Green))),
            Line::from(""),
            Line::from(vec![
                Span::raw("You chose: "),
                Span::styled(result.chosen.label().to_string(), bold_style),
            ]),
            Line::from(format!("Time: {:.1}s", result.time_spent)),
        ]
    };

    let next_label = if session.is_last() {
        "View Results"
    } else {
        "Next Decision"
    };
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("[ {next_label} ]"),
        bold_style.fg(Color::Cyan),
    )));

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(area, buf);
}

pub(crate) fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);

    let [title, stats, _, list] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    Paragraph::new(Span::styled(
        "Session Complete!",
        bold_style.fg(Color::Green),
    ))
    .alignment(Alignment::Center)
    .render(title, buf);

    let summary = app.trainer().summary();
    Paragraph::new(Line::from(vec![
        Span::styled(summary.decision_rate_label(), bold_style.fg(Color::Cyan)),
        Span::styled(" decision rate   ", dim_style),
        Span::styled(summary.average_time_label(), bold_style.fg(Color::Cyan)),
        Span::styled(" avg time   ", dim_style),
        Span::styled(summary.total.to_string(), bold_style.fg(Color::Cyan)),
        Span::styled(" decisions", dim_style),
    ]))
    .alignment(Alignment::Center)
    .render(stats, buf);

    let results = app.trainer().results();
    let visible = (list.height / RESULT_LINES) as usize;
    let max_scroll = results.len().saturating_sub(visible);
    let scroll = app.results_scroll().min(max_scroll);

    let lines = results
        .iter()
        .enumerate()
        .skip(scroll)
        .take(visible)
        .flat_map(|(idx, result)| {
            let choice_style = match result.chosen {
                Choice::Picked(_) => bold_style,
                Choice::NoDecision => bold_style.fg(Color::Red),
            };
            [
                Line::from(format!(
                    "{}. {}",
                    idx + 1,
                    truncate_with_ellipsis(&result.decision.scenario, SCENARIO_PREVIEW_WIDTH)
                )),
                Line::from(vec![
                    Span::raw("   "),
                    Span::styled(result.chosen.label().to_string(), choice_style),
                    Span::styled(format!("  {:.1}s", result.time_spent), dim_style),
                ]),
            ]
        })
        .collect::<Vec<Line>>();

    Paragraph::new(lines).render(list, buf);
}
