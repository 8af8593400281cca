use std::io::stdout;

use crossterm::event::{DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture};
use crossterm::execute;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::DefaultTerminal;

use crate::error::Result;
use crate::fmt::money;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .add_modifier(Modifier::BOLD);

pub const FOOTER_STYLE: Style = Style::new().fg(Color::DarkGray);

pub const AMOUNT_STYLE: Style = Style::new().fg(Color::Rgb(80, 220, 100));
pub const AMOUNT_ZERO_STYLE: Style = Style::new().fg(Color::DarkGray);

pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(40, 40, 60))
    .add_modifier(Modifier::BOLD);

/// Format a charge as a colored Span; zero amounts are dimmed.
pub fn money_span(amount: f64) -> Span<'static> {
    let style = if amount == 0.0 {
        AMOUNT_ZERO_STYLE
    } else {
        AMOUNT_STYLE
    };
    Span::styled(money(amount), style)
}

/// Enter the alternate screen with mouse and focus reporting on. A panic hook
/// restores the terminal before the default hook prints.
pub fn init_terminal() -> Result<DefaultTerminal> {
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = execute!(stdout(), DisableMouseCapture, DisableFocusChange);
        ratatui::restore();
        hook(info);
    }));

    let terminal = ratatui::init();
    execute!(stdout(), EnableMouseCapture, EnableFocusChange)?;
    Ok(terminal)
}

pub fn restore_terminal(terminal: DefaultTerminal) {
    drop(terminal);
    let _ = execute!(stdout(), DisableMouseCapture, DisableFocusChange);
    ratatui::restore();
}
