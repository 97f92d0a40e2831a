use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Row, Table, Wrap},
};

use crate::aggregate::{recent_visits, segment_widths, ChartSlice, Rgb};
use crate::dashboard::Dashboard;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const RECENT_LIMIT: usize = 5;

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// Draws the whole screen and returns where the search button landed.
pub fn draw(frame: &mut Frame, dashboard: &Dashboard, tick: usize) -> Rect {
    let mut constraints = vec![Constraint::Length(3), Constraint::Length(3)];
    if dashboard.is_loading() {
        constraints.push(Constraint::Length(1));
    }
    if dashboard.error().is_some() {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Min(0));

    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    draw_header(frame, areas[0]);
    let button = draw_search(frame, areas[1], dashboard);

    let mut next = 2;
    if dashboard.is_loading() {
        draw_spinner(frame, areas[next], tick);
        next += 1;
    }
    if let Some(message) = dashboard.error() {
        draw_error(frame, areas[next], message);
        next += 1;
    }
    if !dashboard.records().is_empty() {
        draw_chart(frame, areas[next], dashboard);
    }

    button
}

fn draw_header(frame: &mut Frame, area: Rect) {
    let title = Paragraph::new(Line::from(vec![
        Span::styled("🎓 ", Style::default().fg(Color::Green)),
        Span::styled(
            "Student Attendance Analytics",
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(title, area);
}

fn draw_search(frame: &mut Frame, area: Rect, dashboard: &Dashboard) -> Rect {
    let row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(12)])
        .split(area);

    let input = if dashboard.input().is_empty() {
        Span::styled("Enter Student ID", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(dashboard.input())
    };
    let field = Paragraph::new(Line::from(input))
        .block(Block::default().title("Student ID").borders(Borders::ALL));
    frame.render_widget(field, row[0]);

    let typed = u16::try_from(dashboard.input().chars().count()).unwrap_or(u16::MAX);
    let cursor_x = row[0].x.saturating_add(1).saturating_add(typed);
    frame.set_cursor_position((cursor_x.min(row[0].right().saturating_sub(2)), row[0].y + 1));

    let button = Paragraph::new("Search")
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(Color::White)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(button, row[1]);
    row[1]
}

fn draw_spinner(frame: &mut Frame, area: Rect, tick: usize) {
    let spinner = Paragraph::new(Line::from(vec![
        Span::styled(
            SPINNER[tick % SPINNER.len()],
            Style::default().fg(Color::Green),
        ),
        Span::raw(" Loading"),
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(spinner, area);
}

fn draw_error(frame: &mut Frame, area: Rect, message: &str) {
    let banner = Paragraph::new(Line::from(vec![
        Span::styled("✖ ", Style::default().fg(Color::Red)),
        Span::styled(message, Style::default().fg(Color::Red)),
    ]))
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::LEFT)
            .border_style(Style::default().fg(Color::Red)),
    );
    frame.render_widget(banner, area);
}

fn draw_chart(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let counts = dashboard.course_counts();
    let slices = counts.slices();

    let mut block = Block::default()
        .title("Course Distribution")
        .borders(Borders::ALL);
    if let Some(student) = dashboard.shown_student() {
        block = block.title_bottom(Line::from(format!(" Student {student} ")).right_aligned());
    }
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(slices.len() as u16),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let title = Paragraph::new(counts.title())
        .alignment(Alignment::Center)
        .style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(title, parts[0]);

    frame.render_widget(Paragraph::new(proportion_bar(&slices, parts[2].width)), parts[2]);
    frame.render_widget(Paragraph::new(legend(&slices)), parts[3]);

    let rows: Vec<Row> = recent_visits(dashboard.records(), RECENT_LIMIT)
        .into_iter()
        .map(|record| {
            Row::new(vec![
                record.course,
                record.section,
                record.timings,
                record.timestamp,
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(25),
            Constraint::Percentage(15),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ],
    )
    .header(
        Row::new(vec!["Course", "Section", "Timings", "Timestamp"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title("Recent Visits"));
    frame.render_widget(table, parts[5]);
}

fn proportion_bar(slices: &[ChartSlice], width: u16) -> Line<'static> {
    let counts: Vec<usize> = slices.iter().map(|slice| slice.count).collect();
    let spans: Vec<Span> = segment_widths(&counts, width)
        .into_iter()
        .zip(slices)
        .filter(|(cells, _)| *cells > 0)
        .map(|(cells, slice)| {
            Span::styled(
                " ".repeat(cells as usize),
                Style::default().bg(to_color(slice.color)),
            )
        })
        .collect();
    Line::from(spans)
}

fn legend(slices: &[ChartSlice]) -> Vec<Line<'static>> {
    slices
        .iter()
        .map(|slice| {
            Line::from(vec![
                Span::styled("■ ", Style::default().fg(to_color(slice.color))),
                Span::raw(format!(
                    "{}  {} ({:.1}%)",
                    slice.course,
                    slice.count,
                    slice.share * 100.0
                )),
            ])
        })
        .collect()
}
