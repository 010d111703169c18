mod loading;

use crate::{
    api::DOWNLOAD_FILE_NAME,
    app::{AppCommand, AppEvent, AppState, Focus},
    session::InputImage,
    types::SAMPLE_INPUTS,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KEY_HINTS: &str =
    "Tab focus | Enter confirm | Ctrl+G generate | Ctrl+D download | Esc quit";

#[derive(Debug)]
pub enum KeyOutcome {
    Continue,
    Command(AppCommand),
    Quit,
}

pub fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    event_rx: &mut UnboundedReceiver<AppEvent>,
    command_tx: UnboundedSender<AppCommand>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        loop {
            match event_rx.try_recv() {
                Ok(event) => app.handle_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("controller channel closed");
                    break;
                }
            }
        }

        terminal.draw(|frame| draw(frame, app, started.elapsed()))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match handle_key(app, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Command(command) => {
                if command_tx.send(command).is_err() {
                    app.handle_event(AppEvent::Error("controller is not running".into()));
                }
            }
            KeyOutcome::Quit => break,
        }
    }
    Ok(())
}

pub fn handle_key(app: &mut AppState, key: KeyEvent) -> KeyOutcome {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return KeyOutcome::Quit;
    }
    if app.notice.is_some() {
        app.dismiss_notice();
        return KeyOutcome::Continue;
    }
    if ctrl {
        let command = match key.code {
            KeyCode::Char('g') => app.submit(),
            KeyCode::Char('d') => app.request_download(),
            _ => None,
        };
        return command.map(KeyOutcome::Command).unwrap_or(KeyOutcome::Continue);
    }

    match key.code {
        KeyCode::Esc => return KeyOutcome::Quit,
        KeyCode::Tab => {
            app.focus = app.focus.next();
            return KeyOutcome::Continue;
        }
        _ => {}
    }

    match app.focus {
        Focus::Prompt => match key.code {
            KeyCode::Enter => {
                if let Some(command) = app.submit() {
                    return KeyOutcome::Command(command);
                }
            }
            KeyCode::Backspace => app.pop_prompt_char(),
            KeyCode::Char(c) => app.push_prompt_char(c),
            _ => {}
        },
        Focus::ImagePath => match key.code {
            KeyCode::Enter => app.upload_from_input(),
            KeyCode::Backspace => {
                app.path_input.pop();
            }
            KeyCode::Char(c) => app.path_input.push(c),
            _ => {}
        },
        Focus::Samples => match key.code {
            KeyCode::Up | KeyCode::Char('k') => app.move_sample_cursor(false),
            KeyCode::Down | KeyCode::Char('j') => app.move_sample_cursor(true),
            KeyCode::Enter => {
                app.choose_sample(app.sample_cursor);
            }
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if let Some(index) = c.to_digit(10).and_then(|d| (d as usize).checked_sub(1)) {
                    app.choose_sample(index);
                }
            }
            _ => {}
        },
    }
    KeyOutcome::Continue
}

fn draw(frame: &mut ratatui::Frame, app: &AppState, animation: Duration) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(SAMPLE_INPUTS.len() as u16 + 2),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, rows[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);
    draw_input(frame, body[0], app);
    if app.session.is_in_flight() {
        loading::render(frame, body[1], app.session.elapsed_seconds(), animation);
    } else {
        draw_output(frame, body[1], app);
    }

    draw_samples(frame, rows[2], app);
    draw_status(frame, rows[3], app);
    draw_footer(frame, rows[4], app);
}

fn focus_style(app: &AppState, focus: Focus) -> Style {
    if app.focus == focus {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn draw_header(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let title = Line::from(vec![
        Span::styled(
            "Generative Studio",
            Style::default().fg(Color::LightYellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} @ {}", app.session.phase().label(), app.service_base()),
            Style::default().fg(Color::Gray),
        ),
    ]);
    let header =
        Paragraph::new(title).alignment(Alignment::Center).block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn draw_input(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let path = Paragraph::new(app.path_input.as_str()).block(
        Block::default()
            .title("Upload image (path, under 5MB)")
            .borders(Borders::ALL)
            .border_style(focus_style(app, Focus::ImagePath)),
    );
    frame.render_widget(path, chunks[0]);

    let preview_text = match app.session.input() {
        Some(InputImage::Uploaded { preview, .. }) => format!("Uploaded: {preview}"),
        Some(InputImage::Sample { preview }) => format!("Sample: {preview}"),
        None => "No image selected".to_string(),
    };
    let preview = Paragraph::new(preview_text)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().title("Preview").borders(Borders::ALL));
    frame.render_widget(preview, chunks[1]);

    let prompt_text = if app.session.prompt().is_empty() {
        Line::from(Span::styled(
            "e.g., A photo of a dog. A dog is in a park playing with a ball.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(app.session.prompt().to_string())
    };
    let prompt = Paragraph::new(prompt_text).wrap(Wrap { trim: false }).block(
        Block::default()
            .title("Text prompt")
            .borders(Borders::ALL)
            .border_style(focus_style(app, Focus::Prompt)),
    );
    frame.render_widget(prompt, chunks[2]);
}

fn draw_output(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let block = Block::default().borders(Borders::ALL).title("Output");
    let lines = match app.session.result() {
        Some(result) => vec![
            Line::from(Span::styled(
                "Generated image",
                Style::default().fg(Color::LightGreen).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(result.display_url.clone()),
            Line::from(""),
            Line::from(Span::styled(
                format!("Ctrl+D saves it as {DOWNLOAD_FILE_NAME}"),
                Style::default().fg(Color::DarkGray),
            )),
        ],
        None => vec![Line::from(Span::styled(
            "Your generated image will appear here.",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let inner_height = block.inner(area).height as usize;
    let paragraph = Paragraph::new(loading::center_vertically(lines, inner_height))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);
    frame.render_widget(paragraph, area);
}

fn draw_samples(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let items: Vec<ListItem> = SAMPLE_INPUTS
        .iter()
        .enumerate()
        .map(|(idx, sample)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", idx + 1), Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!("{:<22}", sample.label()),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    sample.teaser(),
                    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                ),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .title("Try a sample")
                .borders(Borders::ALL)
                .border_style(focus_style(app, Focus::Samples)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if app.focus == Focus::Samples {
        state.select(Some(app.sample_cursor));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_status(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let text = if app.status_lines.is_empty() {
        "Pick a sample or upload an image to begin.".to_string()
    } else {
        app.status_lines.join("\n")
    };
    let status = Paragraph::new(text).block(Block::default().title("Status").borders(Borders::ALL));
    frame.render_widget(status, area);
}

fn draw_footer(frame: &mut ratatui::Frame, area: Rect, app: &AppState) {
    let footer = match &app.notice {
        Some(notice) => {
            let color = if notice.is_error { Color::LightRed } else { Color::LightGreen };
            Paragraph::new(format!("{} (press any key)", notice.message))
                .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
        }
        None => Paragraph::new(KEY_HINTS)
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)),
    };
    frame.render_widget(footer.alignment(Alignment::Center), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn press(app: &mut AppState, code: KeyCode) -> KeyOutcome {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(app: &mut AppState, c: char) -> KeyOutcome {
        handle_key(app, KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    #[test]
    fn typing_edits_the_focused_field() {
        let mut app = AppState::new("http://localhost:8000");
        press(&mut app, KeyCode::Char('h'));
        press(&mut app, KeyCode::Char('i'));
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('/'));

        assert_eq!(app.session.prompt(), "hi");
        assert_eq!(app.path_input, "/");
    }

    #[test]
    fn notice_swallows_the_next_key() {
        let mut app = AppState::new("http://localhost:8000");
        assert!(matches!(ctrl(&mut app, 'g'), KeyOutcome::Continue));
        assert!(app.notice.is_some());

        press(&mut app, KeyCode::Char('x'));
        assert!(app.notice.is_none());
        assert_eq!(app.session.prompt(), "");
    }

    #[test]
    fn sample_digit_then_generate_emits_command() {
        let mut app = AppState::new("http://localhost:8000");
        app.focus = Focus::Samples;
        press(&mut app, KeyCode::Char('2'));

        assert!(matches!(ctrl(&mut app, 'g'), KeyOutcome::Command(AppCommand::Generate(_))));
        assert!(matches!(ctrl(&mut app, 'g'), KeyOutcome::Continue));
        assert!(app.notice.as_ref().is_some_and(|n| n.message.contains("already in progress")));
    }

    #[test]
    fn escape_and_ctrl_c_quit() {
        let mut app = AppState::new("http://localhost:8000");
        assert!(matches!(press(&mut app, KeyCode::Esc), KeyOutcome::Quit));
        assert!(matches!(ctrl(&mut app, 'c'), KeyOutcome::Quit));
    }

    #[test]
    fn renders_elapsed_time_while_generating() {
        let mut app = AppState::new("http://localhost:8000");
        app.choose_sample(0);
        app.submit().unwrap();
        for _ in 0..7 {
            app.handle_event(AppEvent::ClockTick);
        }

        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|frame| draw(frame, &app, Duration::ZERO)).unwrap();

        let buffer = terminal.backend().buffer();
        let rendered: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(rendered.contains("7s"));
        assert!(rendered.contains("Generating your image..."));
    }
}
