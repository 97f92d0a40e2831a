use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Position, layout::Rect, Terminal};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::client::QueryClient;
use crate::dashboard::Dashboard;
use crate::models::Delivery;
use crate::ui;

const TICK_RATE: Duration = Duration::from_millis(100);

/// Raw mode and the alternate screen, restored on drop.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

enum Action {
    None,
    Submit,
    Quit,
}

fn key_action(dashboard: &mut Dashboard, key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    match key.code {
        KeyCode::Esc => Action::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Enter => Action::Submit,
        KeyCode::Backspace => {
            dashboard.backspace();
            Action::None
        }
        KeyCode::Char(c) => {
            dashboard.push_char(c);
            Action::None
        }
        _ => Action::None,
    }
}

fn mouse_action(mouse: MouseEvent, button: Rect) -> Action {
    let clicked = matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left))
        && button.contains(Position::new(mouse.column, mouse.row));
    if clicked {
        Action::Submit
    } else {
        Action::None
    }
}

pub fn run(
    mut client: QueryClient,
    mut deliveries: UnboundedReceiver<Delivery>,
    initial_student: Option<String>,
) -> Result<()> {
    let mut guard = TerminalGuard::enter()?;
    let mut dashboard = Dashboard::new();
    if let Some(student_id) = initial_student {
        dashboard.set_input(student_id);
        dashboard.submit(&mut client);
    }

    let mut tick = 0usize;
    let mut last_tick = Instant::now();
    let mut button = Rect::default();

    loop {
        guard
            .terminal
            .draw(|frame| button = ui::draw(frame, &dashboard, tick))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            let action = match event::read()? {
                Event::Key(key) => key_action(&mut dashboard, key),
                Event::Mouse(mouse) => mouse_action(mouse, button),
                Event::Paste(text) => {
                    dashboard.set_input(format!("{}{}", dashboard.input(), text.trim()));
                    Action::None
                }
                _ => Action::None,
            };
            match action {
                Action::Quit => break,
                Action::Submit => dashboard.submit(&mut client),
                Action::None => {}
            }
        }

        while let Ok(delivery) = deliveries.try_recv() {
            if dashboard.apply(delivery) {
                debug!(phase = ?dashboard.phase(), "delivery applied");
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            tick = tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }

    client.cancel();
    info!("dashboard closed");
    Ok(())
}
