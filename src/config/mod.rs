//! Configuration layer: ordered sections of string options.
//!
//! ```text
//!   source.cfg  ──read──▶ ┌────────┐ ──get_typed──▶ Value
//!                         │ Config │
//!   source.cfg ◀──write── └────────┘ ◀──set / merge──
//! ```
//!
//! Values are kept exactly as written so that `write` reproduces them;
//! `${section:option}` references are checked when a file is read and
//! expanded when a value is fetched.

mod interpolate;
mod parse;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;

use crate::data::model::{Value, ValueKind};
use crate::error::{Error, Result};
use crate::units::Quantity;

pub use parse::ParseError;

/// Name of the section whose options every other section inherits.
pub const DEFAULT_SECTION: &str = "DEFAULT";

// ---------------------------------------------------------------------------
// Section – ordered option → raw value mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    options: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        self.options
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite, keeping the original position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.options.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.options.iter().position(|(k, _)| k == key)?;
        Some(self.options.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Section {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut section = Section::default();
        for (key, value) in iter {
            section.insert(parse::option_key(&key.into()), value);
        }
        section
    }
}

// ---------------------------------------------------------------------------
// SectionView – a section seen through its inherited defaults
// ---------------------------------------------------------------------------

/// Read-only view of one section including the options it inherits.
#[derive(Debug, Clone, Copy)]
pub struct SectionView<'a> {
    config: &'a Config,
    name: &'a str,
}

impl<'a> SectionView<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Raw (un-interpolated) value, falling back to the default section.
    pub fn get(&self, option: &str) -> Option<&'a str> {
        self.config.lookup_raw(self.name, option)
    }

    pub fn contains(&self, option: &str) -> bool {
        self.get(option).is_some()
    }

    /// Own options first, then inherited ones not overridden.
    pub fn options(&self) -> Vec<(&'a str, &'a str)> {
        self.config.options_of(self.name)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    default_section: String,
    defaults: Section,
    sections: Vec<(String, Section)>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::with_default_section(DEFAULT_SECTION)
    }

    pub fn with_default_section(name: impl Into<String>) -> Self {
        Self {
            default_section: name.into(),
            defaults: Section::default(),
            sections: Vec::new(),
        }
    }

    pub fn default_section(&self) -> &str {
        &self.default_section
    }

    /// Options every section inherits.
    pub fn defaults(&self) -> &Section {
        &self.defaults
    }

    /// Read a configuration file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_with_default_section(path, DEFAULT_SECTION)
    }

    pub fn read_with_default_section(path: impl AsRef<Path>, default_section: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = Self::parse_text(&text, default_section, path)?;
        debug!(
            "read {} sections from {}",
            config.sections.len(),
            path.display()
        );
        Ok(config)
    }

    fn parse_text(text: &str, default_section: &str, origin: &Path) -> Result<Self> {
        let doc = parse::parse(text, default_section).map_err(|e| Error::ConfigFile {
            path: origin.to_path_buf(),
            reason: format!("line {}: {}", e.line, e.reason),
        })?;
        let config = Self {
            default_section: default_section.to_string(),
            defaults: doc.defaults,
            sections: doc.sections,
        };
        config.check_references()?;
        Ok(config)
    }

    /// Expand every value once so broken references surface immediately.
    ///
    /// A default option is expanded in every section that inherits it, and
    /// in the default section only when nothing inherits it.
    fn check_references(&self) -> Result<()> {
        for (option, raw) in self.defaults.iter() {
            let mut inheritors = self
                .sections
                .iter()
                .filter(|(_, section)| !section.contains(option))
                .map(|(name, _)| name.as_str())
                .peekable();
            if inheritors.peek().is_none() {
                interpolate::expand(self, &self.default_section, option, raw)?;
            }
            for name in inheritors {
                interpolate::expand(self, name, option, raw)?;
            }
        }
        for (name, section) in &self.sections {
            for (option, raw) in section.iter() {
                interpolate::expand(self, name, option, raw)?;
            }
        }
        Ok(())
    }

    /// Write the configuration in the same text format it is read from.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string())?;
        debug!("wrote configuration to {}", path.display());
        Ok(())
    }

    // -- sections -----------------------------------------------------------

    /// Section names in file order, excluding the default section.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(n, _)| n.as_str())
    }

    /// Sections whose view satisfies `predicate`, in file order.
    ///
    /// Evaluated lazily over the current state; call again to re-scan.
    pub fn sections_with<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a str> + 'a
    where
        P: Fn(&SectionView<'a>) -> bool + 'a,
    {
        self.sections
            .iter()
            .map(move |(name, _)| SectionView {
                config: self,
                name: name.as_str(),
            })
            .filter(move |view| predicate(view))
            .map(|view| view.name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|(n, _)| n == name)
    }

    fn is_known(&self, name: &str) -> bool {
        name == self.default_section || self.has_section(name)
    }

    /// Own options of a section (the default section included).
    pub fn section(&self, name: &str) -> Option<&Section> {
        if name == self.default_section {
            return Some(&self.defaults);
        }
        self.sections.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        if name == self.default_section {
            return Some(&mut self.defaults);
        }
        self.sections
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn view<'a>(&'a self, name: &'a str) -> Result<SectionView<'a>> {
        if !self.is_known(name) {
            return Err(Error::SectionNotFound(name.to_string()));
        }
        Ok(SectionView { config: self, name })
    }

    /// Create an empty section. Returns `false` if it already existed.
    pub fn add_section(&mut self, name: &str) -> bool {
        if self.is_known(name) {
            return false;
        }
        self.sections.push((name.to_string(), Section::default()));
        true
    }

    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        let idx = self.sections.iter().position(|(n, _)| n == name)?;
        Some(self.sections.remove(idx).1)
    }

    /// Copy a section under a new name. With `ignore_defaults` only the
    /// section's own options are copied; otherwise inherited ones too.
    pub fn copy_section(&mut self, from: &str, to: &str, ignore_defaults: bool) -> Result<()> {
        let copied: Section = if ignore_defaults {
            self.section(from)
                .cloned()
                .ok_or_else(|| Error::SectionNotFound(from.to_string()))?
        } else {
            self.view(from)?
                .options()
                .into_iter()
                .collect()
        };
        self.add_section(to);
        if let Some(target) = self.section_mut(to) {
            for (key, value) in copied.iter() {
                target.insert(key, value);
            }
        }
        Ok(())
    }

    // -- options ------------------------------------------------------------

    pub(crate) fn lookup_raw(&self, section: &str, option: &str) -> Option<&str> {
        if section == self.default_section {
            return self.defaults.get(option);
        }
        let own = self.sections.iter().find(|(n, _)| n == section)?;
        own.1.get(option).or_else(|| self.defaults.get(option))
    }

    fn options_of(&self, section: &str) -> Vec<(&str, &str)> {
        let mut options: Vec<(&str, &str)> = Vec::new();
        if section != self.default_section {
            if let Some(own) = self.section(section) {
                options.extend(own.iter());
            }
        }
        for (key, value) in self.defaults.iter() {
            if !options.iter().any(|(k, _)| *k == key) {
                options.push((key, value));
            }
        }
        options
    }

    /// Raw options of a section including inherited ones.
    pub fn options<'a>(&'a self, section: &'a str) -> Result<Vec<(&'a str, &'a str)>> {
        Ok(self.view(section)?.options())
    }

    pub fn has_option(&self, section: &str, option: &str) -> bool {
        self.lookup_raw(section, &parse::option_key(option)).is_some()
    }

    /// Raw value without interpolation.
    pub fn get_raw(&self, section: &str, option: &str) -> Result<Option<&str>> {
        if !self.is_known(section) {
            return Err(Error::SectionNotFound(section.to_string()));
        }
        Ok(self.lookup_raw(section, &parse::option_key(option)))
    }

    /// Interpolated value, `None` when the option is absent.
    pub fn get(&self, section: &str, option: &str) -> Result<Option<String>> {
        let key = parse::option_key(option);
        match self.get_raw(section, &key)? {
            Some(raw) => interpolate::expand(self, section, &key, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Interpolated value coerced to `kind`.
    ///
    /// `fallback` is returned only when the option is absent; a present
    /// value that does not coerce is a `TypeCoercion` error.
    pub fn get_typed(
        &self,
        section: &str,
        option: &str,
        kind: ValueKind,
        fallback: Option<Value>,
    ) -> Result<Option<Value>> {
        let Some(text) = self.get(section, option)? else {
            return Ok(fallback);
        };
        kind.coerce(&text)
            .map(Some)
            .ok_or_else(|| Error::TypeCoercion {
                section: section.to_string(),
                option: parse::option_key(option),
                value: text,
                kind: kind.to_string(),
            })
    }

    pub fn get_int(&self, section: &str, option: &str) -> Result<Option<i64>> {
        Ok(self
            .get_typed(section, option, ValueKind::Int, None)?
            .and_then(|v| v.as_i64()))
    }

    pub fn get_float(&self, section: &str, option: &str) -> Result<Option<f64>> {
        Ok(self
            .get_typed(section, option, ValueKind::Float, None)?
            .and_then(|v| v.as_f64()))
    }

    pub fn get_bool(&self, section: &str, option: &str) -> Result<Option<bool>> {
        Ok(self
            .get_typed(section, option, ValueKind::Bool, None)?
            .and_then(|v| v.as_bool()))
    }

    pub fn get_quantity(&self, section: &str, option: &str) -> Result<Option<Quantity>> {
        Ok(self
            .get_typed(section, option, ValueKind::Quantity, None)?
            .and_then(|v| v.as_quantity().cloned()))
    }

    pub fn get_path(&self, section: &str, option: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .get_typed(section, option, ValueKind::Path, None)?
            .and_then(|v| v.as_path().cloned()))
    }

    /// Set an option in an existing section.
    ///
    /// The value is stored the way the file format reads it back (outer
    /// whitespace and per-line indentation dropped). A `$` that is not part
    /// of `$$` or `${...}` is an `Interpolation` error.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) -> Result<()> {
        let key = parse::option_key(option);
        let value = parse::normalize_value(&value.into());
        interpolate::check_syntax(section, &key, &value)?;
        let target = self
            .section_mut(section)
            .ok_or_else(|| Error::SectionNotFound(section.to_string()))?;
        target.insert(key, value);
        Ok(())
    }

    pub fn remove_option(&mut self, section: &str, option: &str) -> Option<String> {
        self.section_mut(section)?.remove(&parse::option_key(option))
    }

    /// Overlay `other` option by option; its values win.
    pub fn merge(&mut self, other: &Config) {
        for (key, value) in other.defaults.iter() {
            self.defaults.insert(key, value);
        }
        for (name, section) in &other.sections {
            self.add_section(name);
            if let Some(target) = self.section_mut(name) {
                for (key, value) in section.iter() {
                    target.insert(key, value);
                }
            }
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&parse::render(
            &self.defaults,
            &self.sections,
            &self.default_section,
        ))
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_text(s, DEFAULT_SECTION, Path::new("<string>"))
    }
}
