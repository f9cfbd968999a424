//! Agent state extraction from terminal output
//!
//! Watches the CLI's status line and slash-command confirmations for the
//! permission mode and model the agent is actually in.

use super::parser::{AnsiParser, ParsedElement};
use super::StateReport;
use crate::core::state::{Model, PermissionMode};
use once_cell::sync::Lazy;
use regex::Regex;

static PLAN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)plan mode on").unwrap());

static ACCEPT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)accept edits on").unwrap());

static BYPASS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bypass permissions on").unwrap());

/// Shortcut hint shown in the status line only when no mode banner is
static DEFAULT_HINT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?\s*for shortcuts").unwrap());

static MODEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)set model to\s+(?:claude[- ])?(opus|sonnet)").unwrap()
});

/// Extracts `StateReport`s from raw PTY output
pub struct StatusExtractor {
    parser: AnsiParser,
    current_line: String,
    permission_mode: Option<PermissionMode>,
    model: Option<Model>,
}

impl Default for StatusExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusExtractor {
    pub fn new() -> Self {
        Self {
            parser: AnsiParser::new(),
            current_line: String::new(),
            permission_mode: None,
            model: None,
        }
    }

    /// Process raw PTY output; returns the facets that changed since the last report
    pub fn process(&mut self, data: &[u8]) -> Option<StateReport> {
        let mut report = StateReport::default();

        for element in self.parser.parse(data) {
            match element {
                ParsedElement::Text(text) => self.current_line.push_str(&text),
                ParsedElement::ClearScreen => self.current_line.clear(),
                _ => {
                    let line = std::mem::take(&mut self.current_line);
                    self.process_line(&line, &mut report);
                }
            }
        }

        // Status line is usually the last, unterminated line of a redraw
        if !self.current_line.is_empty() {
            let line = self.current_line.clone();
            self.process_line(&line, &mut report);
        }

        if report.is_empty() {
            None
        } else {
            Some(report)
        }
    }

    fn process_line(&mut self, line: &str, report: &mut StateReport) {
        if let Some(mode) = detect_permission_mode(line) {
            if self.permission_mode != Some(mode) {
                self.permission_mode = Some(mode);
                report.permission_mode = Some(mode);
            }
        }

        if let Some(model) = detect_model(line) {
            if self.model != Some(model) {
                self.model = Some(model);
                report.model = Some(model);
            }
        }
    }

    /// Last permission mode seen in the output
    pub fn permission_mode(&self) -> Option<PermissionMode> {
        self.permission_mode
    }

    /// Last model seen in the output
    pub fn model(&self) -> Option<Model> {
        self.model
    }

    pub fn reset(&mut self) {
        self.parser.reset();
        self.current_line.clear();
        self.permission_mode = None;
        self.model = None;
    }
}

fn detect_permission_mode(line: &str) -> Option<PermissionMode> {
    if PLAN_REGEX.is_match(line) {
        Some(PermissionMode::Plan)
    } else if ACCEPT_REGEX.is_match(line) {
        Some(PermissionMode::AcceptEdits)
    } else if BYPASS_REGEX.is_match(line) {
        Some(PermissionMode::BypassPermissions)
    } else if DEFAULT_HINT_REGEX.is_match(line) {
        Some(PermissionMode::Default)
    } else {
        None
    }
}

fn detect_model(line: &str) -> Option<Model> {
    MODEL_REGEX
        .captures(line)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
