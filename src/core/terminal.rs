/// Colored line output for the viewer, on top of crossterm.
use std::io::{self, stdout, Stdout, Write};

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::QueueableCommand;

pub struct TerminalContext {
    out: Stdout,
}

impl Default for TerminalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalContext {
    pub fn new() -> Self {
        Self { out: stdout() }
    }

    pub fn print_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Print a colored line, resetting the color afterwards
    pub fn print_colored_line(&mut self, text: &str, color: TerminalColor) -> io::Result<()> {
        self.out.queue(SetForegroundColor(color.into()))?;
        write!(self.out, "{text}")?;
        self.out.queue(ResetColor)?;
        writeln!(self.out)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalColor {
    Red,
    Green,
    Yellow,
    Cyan,
    Magenta,
    Default,
}

impl From<TerminalColor> for Color {
    fn from(color: TerminalColor) -> Self {
        match color {
            TerminalColor::Red => Color::Red,
            TerminalColor::Green => Color::Green,
            TerminalColor::Yellow => Color::Yellow,
            TerminalColor::Cyan => Color::Cyan,
            TerminalColor::Magenta => Color::Magenta,
            TerminalColor::Default => Color::Reset,
        }
    }
}
