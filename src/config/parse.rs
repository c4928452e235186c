//! Text form of the configuration: INI sections with `=`/`:` delimiters.

use std::fmt::Write as _;

use super::Section;

/// A syntax problem found while parsing, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Parsed document: default-section options plus the ordered named sections.
pub(crate) struct Document {
    pub defaults: Section,
    pub sections: Vec<(String, Section)>,
}

/// Normalise an option name the way the file format does.
pub(crate) fn option_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The value `parse` would read back after `render` wrote `value`: outer
/// whitespace trimmed and each line stripped of its indentation.
pub(crate) fn normalize_value(value: &str) -> String {
    value
        .trim()
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with('#') || trimmed.starts_with(';')
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Parse INI text.
///
/// Continuation lines (indented deeper than their option) append to the
/// previous value with a newline. Indented whitespace-only lines inside a
/// value are kept as empty lines; trailing ones are dropped. Duplicate
/// sections or duplicate options in one section are rejected.
pub(crate) fn parse(text: &str, default_section: &str) -> Result<Document, ParseError> {
    let mut doc = Document {
        defaults: Section::default(),
        sections: Vec::new(),
    };
    // Index into `doc.sections`, or `None` for the default section.
    let mut current: Option<Option<usize>> = None;
    // Option being filled and the indentation of its first line.
    let mut last_option: Option<(String, usize)> = None;
    // Blank continuation lines seen since the last non-blank one.
    let mut pending_blank = 0;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim();
        let indent = indent_of(raw_line);

        if trimmed.is_empty() {
            let continues = matches!(&last_option, Some((_, opt_indent)) if indent > *opt_indent);
            if continues {
                pending_blank += 1;
            } else {
                last_option = None;
            }
            continue;
        }
        if is_comment(trimmed) {
            last_option = None;
            continue;
        }

        if let (Some((key, opt_indent)), Some(target)) = (&last_option, current) {
            if indent > *opt_indent {
                let section = match target {
                    Some(i) => &mut doc.sections[i].1,
                    None => &mut doc.defaults,
                };
                if let Some(value) = section.get_mut(key) {
                    for _ in 0..pending_blank {
                        value.push('\n');
                    }
                    value.push('\n');
                    value.push_str(trimmed);
                }
                pending_blank = 0;
                continue;
            }
        }
        pending_blank = 0;

        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .ok_or_else(|| ParseError::new(line_no, "unterminated section header"))?
                .trim();
            if name.is_empty() {
                return Err(ParseError::new(line_no, "empty section name"));
            }
            last_option = None;
            if name == default_section {
                current = Some(None);
                continue;
            }
            if doc.sections.iter().any(|(n, _)| n == name) {
                return Err(ParseError::new(
                    line_no,
                    format!("section '{name}' already exists"),
                ));
            }
            doc.sections.push((name.to_string(), Section::default()));
            current = Some(Some(doc.sections.len() - 1));
            continue;
        }

        let target = current
            .ok_or_else(|| ParseError::new(line_no, "option found before any section header"))?;

        let split_at = trimmed
            .find(['=', ':'])
            .ok_or_else(|| ParseError::new(line_no, format!("missing '=' in '{trimmed}'")))?;
        let key = option_key(&trimmed[..split_at]);
        if key.is_empty() {
            return Err(ParseError::new(line_no, "empty option name"));
        }
        let value = trimmed[split_at + 1..].trim().to_string();

        let section = match target {
            Some(i) => &mut doc.sections[i].1,
            None => &mut doc.defaults,
        };
        if section.contains(&key) {
            return Err(ParseError::new(
                line_no,
                format!("option '{key}' already exists in this section"),
            ));
        }
        section.insert(key.clone(), value);
        last_option = Some((key, indent));
        pending_blank = 0;
    }

    Ok(doc)
}

/// Render a document back to INI text. The default section comes first and
/// is omitted when empty; multi-line values are written as tab-indented
/// continuation lines.
pub(crate) fn render(defaults: &Section, sections: &[(String, Section)], default_section: &str) -> String {
    let mut out = String::new();
    if !defaults.is_empty() {
        render_section(&mut out, default_section, defaults);
    }
    for (name, section) in sections {
        render_section(&mut out, name, section);
    }
    out
}

fn render_section(out: &mut String, name: &str, section: &Section) {
    let _ = writeln!(out, "[{name}]");
    for (key, value) in section.iter() {
        let value = value.replace('\n', "\n\t");
        if value.is_empty() {
            let _ = writeln!(out, "{key} =");
        } else {
            let _ = writeln!(out, "{key} = {value}");
        }
    }
    out.push('\n');
}
