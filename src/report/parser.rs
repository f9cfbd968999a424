//! ANSI terminal output parser using VTE
//!
//! Reduces the agent's TUI output to printable text and line boundaries.
//! The CLI redraws its status area with cursor movement and line erases
//! rather than plain newlines, so those count as boundaries too.

use std::collections::VecDeque;
use vte::{Params, Parser, Perform};

/// Parsed output element from ANSI stream
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedElement {
    /// Plain text content
    Text(String),
    /// Newline
    Newline,
    /// Carriage return (line update)
    CarriageReturn,
    /// Erase in line, or cursor moved to another line
    ClearLine,
    /// Clear screen
    ClearScreen,
}

impl ParsedElement {
    /// Whether this element ends the current logical line
    pub fn is_line_break(&self) -> bool {
        !matches!(self, ParsedElement::Text(_))
    }
}

/// ANSI parser state
pub struct AnsiParser {
    parser: Parser,
    elements: VecDeque<ParsedElement>,
    text_buffer: String,
}

impl Default for AnsiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiParser {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            elements: VecDeque::new(),
            text_buffer: String::new(),
        }
    }

    /// Parse input bytes and return parsed elements
    pub fn parse(&mut self, data: &[u8]) -> Vec<ParsedElement> {
        let mut performer = ParserPerformer {
            elements: &mut self.elements,
            text_buffer: &mut self.text_buffer,
        };

        for byte in data {
            self.parser.advance(&mut performer, *byte);
        }

        performer.flush_text();

        self.elements.drain(..).collect()
    }

    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.elements.clear();
        self.text_buffer.clear();
    }
}

struct ParserPerformer<'a> {
    elements: &'a mut VecDeque<ParsedElement>,
    text_buffer: &'a mut String,
}

impl ParserPerformer<'_> {
    fn flush_text(&mut self) {
        if !self.text_buffer.is_empty() {
            let text = std::mem::take(self.text_buffer);
            self.elements.push_back(ParsedElement::Text(text));
        }
    }

    fn push(&mut self, element: ParsedElement) {
        self.flush_text();
        self.elements.push_back(element);
    }
}

impl Perform for ParserPerformer<'_> {
    fn print(&mut self, c: char) {
        self.text_buffer.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x0A => self.push(ParsedElement::Newline),
            0x0D => self.push(ParsedElement::CarriageReturn),
            0x09 => self.text_buffer.push(' '),
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        action: char,
    ) {
        match action {
            'J' => {
                let mode = params.iter().next().and_then(|p| p.first().copied()).unwrap_or(0);
                if mode == 2 || mode == 3 {
                    self.push(ParsedElement::ClearScreen);
                } else {
                    self.push(ParsedElement::ClearLine);
                }
            }
            // Erase in line, cursor up/down/next/prev line, absolute position
            'K' | 'A' | 'B' | 'E' | 'F' | 'H' | 'f' => self.push(ParsedElement::ClearLine),
            // Cursor forward renders as blank space between words
            'C' => self.text_buffer.push(' '),
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}
