use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::time::Duration as StdDuration;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_MILLIS: u128 = 100;
const PULSE_SECONDS: u64 = 5;
const HEADLINE: &str = "Generating your image...";
const PULSE_MESSAGES: &[&str] = &[
    "Studying your product...",
    "Fine-tuning on the subject, hang tight...",
    "Composing the scene...",
    "Lighting and shadows...",
    "Polishing the final render...",
];

pub fn render(frame: &mut ratatui::Frame, area: Rect, elapsed_secs: u64, animation: StdDuration) {
    let block = Block::default().borders(Borders::ALL).title("Output");
    let inner_height = block.inner(area).height as usize;
    let lines = center_vertically(loading_lines(elapsed_secs, animation), inner_height);
    let paragraph =
        Paragraph::new(lines).alignment(Alignment::Center).wrap(Wrap { trim: true }).block(block);
    frame.render_widget(paragraph, area);
}

pub fn loading_lines(elapsed_secs: u64, animation: StdDuration) -> Vec<Line<'static>> {
    let spinner = spinner_frame(animation);
    vec![
        Line::from(Span::styled(
            spinner,
            Style::default().fg(Color::LightYellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(HEADLINE, Style::default().fg(Color::Gray))),
        Line::from(Span::styled(
            pulse_message(elapsed_secs),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!("{elapsed_secs}s"),
            Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD),
        )),
    ]
}

fn spinner_frame(animation: StdDuration) -> &'static str {
    let index = (animation.as_millis() / FRAME_MILLIS) as usize % SPINNER_FRAMES.len();
    SPINNER_FRAMES[index]
}

fn pulse_message(elapsed_secs: u64) -> &'static str {
    let index = (elapsed_secs / PULSE_SECONDS) as usize % PULSE_MESSAGES.len();
    PULSE_MESSAGES[index]
}

pub(crate) fn center_vertically(
    lines: Vec<Line<'static>>,
    target_height: usize,
) -> Vec<Line<'static>> {
    if target_height == 0 {
        return Vec::new();
    }
    let line_count = lines.len();
    if line_count >= target_height {
        return lines;
    }

    let top_padding = (target_height - line_count) / 2;
    let mut output = Vec::with_capacity(target_height);
    output.extend(std::iter::repeat_with(|| Line::from("")).take(top_padding));
    output.extend(lines);
    output
}
