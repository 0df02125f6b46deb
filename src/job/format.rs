//! Renders `directory_fmt` and `filename_fmt` templates against file metadata.
//!
//! Templates use `{key}` fields with an optional `[[fill]align][0][width]` spec, e.g.
//! `{index:>02}`. Literal braces are written `{{` and `}}`.
use serde_json::Value;

use crate::message::{value_to_string, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Spec {
    fill: char,
    align: Option<Align>,
    width: usize,
}

impl Spec {
    fn parse(spec: &str) -> Self {
        let chars: Vec<char> = spec.chars().collect();
        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        };

        let mut fill = None;
        let mut align = None;
        let mut rest = 0;
        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            fill = Some(chars[0]);
            align = align_of(chars[1]);
            rest = 2;
        } else if let Some(first) = chars.first().copied().and_then(align_of) {
            align = Some(first);
            rest = 1;
        }

        let mut digits: String = chars[rest..].iter().take_while(|c| c.is_ascii_digit()).collect();
        if digits.starts_with('0') {
            fill.get_or_insert('0');
            align.get_or_insert(Align::Right);
            digits.remove(0);
        }

        Self {
            fill: fill.unwrap_or(' '),
            align,
            width: digits.parse().unwrap_or(0),
        }
    }

    fn apply(&self, value: &Value, rendered: String) -> String {
        let len = rendered.chars().count();
        if len >= self.width {
            return rendered;
        }
        let padding = self.width - len;
        let align = self.align.unwrap_or(if value.is_number() { Align::Right } else { Align::Left });
        let pad = |n: usize| self.fill.to_string().repeat(n);
        match align {
            Align::Left => rendered + &pad(padding),
            Align::Right => pad(padding) + &rendered,
            Align::Center => pad(padding / 2) + &rendered + &pad(padding - padding / 2),
        }
    }
}

/// Render `template`. Keys absent from `data` render as `None`.
///
/// Path separators inside values are replaced with `_`, so one template always yields exactly
/// one path component.
pub fn format(template: &str, data: &Metadata) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let field: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let (key, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = data.get(key).unwrap_or(&Value::Null);
                let rendered = sanitize(&value_to_string(value));
                output.push_str(&Spec::parse(spec).apply(value, rendered));
            }
            c => output.push(c),
        }
    }
    output
}

fn sanitize(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}
