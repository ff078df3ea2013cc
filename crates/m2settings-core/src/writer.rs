//! Settings file output with backup of the previous file
//!
//! An existing destination is renamed to a timestamp-suffixed sibling before
//! the new content is written, so the previous bytes always survive a failed
//! write.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default suffix appended to backup files
pub const DEFAULT_BACKUP_TIMESTAMP_FORMAT: &str = "-%Y%m%d%H%M%S";

/// Errors raised while backing up or writing the output file
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to move {} to {}", from.display(), to.display())]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid backup timestamp format '{0}'")]
    TimestampFormat(String),

    #[error("Unsupported encoding '{0}'")]
    UnsupportedEncoding(String),
}

/// Text encodings supported for the output file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    /// Big-endian with a byte order mark
    Utf16,
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Utf16 => "UTF-16",
            TextEncoding::Latin1 => "ISO-8859-1",
            TextEncoding::Ascii => "US-ASCII",
        }
    }

    /// Encode text; characters outside a single-byte charset become `?`
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            TextEncoding::Utf16 => [0xFE, 0xFF]
                .into_iter()
                .chain(text.encode_utf16().flat_map(u16::to_be_bytes))
                .collect(),
            TextEncoding::Latin1 => single_byte(text, 0xFF),
            TextEncoding::Ascii => single_byte(text, 0x7F),
        }
    }
}

fn single_byte(text: &str, max: u32) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).ok().filter(|b| u32::from(*b) <= max).unwrap_or(b'?'))
        .collect()
}

impl FromStr for TextEncoding {
    type Err = WriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('_', "-");
        match normalized.as_str() {
            "UTF-8" | "UTF8" => Ok(TextEncoding::Utf8),
            "UTF-16LE" | "UTF16LE" => Ok(TextEncoding::Utf16Le),
            "UTF-16BE" | "UTF16BE" => Ok(TextEncoding::Utf16Be),
            "UTF-16" | "UTF16" => Ok(TextEncoding::Utf16),
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" => Ok(TextEncoding::Latin1),
            "US-ASCII" | "ASCII" => Ok(TextEncoding::Ascii),
            _ => Err(WriteError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that chrono can render a strftime pattern
pub fn validate_timestamp_format(pattern: &str) -> Result<(), WriteError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(WriteError::TimestampFormat(pattern.to_string()));
    }
    Ok(())
}

/// Where and how the settings file is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    /// `None` writes UTF-8
    pub encoding: Option<TextEncoding>,
    pub backup: bool,
    pub backup_timestamp_format: String,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoding: None,
            backup: true,
            backup_timestamp_format: DEFAULT_BACKUP_TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// Sibling path the existing file is moved to when backed up at `now`
    pub fn backup_path(&self, now: DateTime<Local>) -> Result<PathBuf, WriteError> {
        validate_timestamp_format(&self.backup_timestamp_format)?;
        let timestamp = now.format(&self.backup_timestamp_format).to_string();

        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(timestamp);
        Ok(self.path.with_file_name(name))
    }
}

/// Move an existing destination aside
///
/// Returns the backup path, or `None` when backups are disabled or there is
/// nothing to back up.
pub fn backup(target: &OutputTarget, now: DateTime<Local>) -> Result<Option<PathBuf>, WriteError> {
    if !target.backup {
        return Ok(None);
    }
    if !target.path.exists() {
        log::debug!("Output file does not exist; skipping backup");
        return Ok(None);
    }

    let backup_path = target.backup_path(now)?;
    log::info!(
        "Backing up: {} to: {}",
        target.path.display(),
        backup_path.display()
    );
    fs::rename(&target.path, &backup_path).map_err(|source| WriteError::Backup {
        from: target.path.clone(),
        to: backup_path.clone(),
        source,
    })?;

    Ok(Some(backup_path))
}

/// Write `content` to the destination, truncating whatever is there
pub fn write_content(target: &OutputTarget, content: &str) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: target.path.clone(),
        source,
    };

    if let Some(parent) = target.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let encoding = target.encoding.unwrap_or_default();
    let bytes = encoding.encode(content);

    // The handle is released on every path when the writer drops
    let file = File::create(&target.path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Back up the existing destination (if enabled) and write the new content
pub fn write(target: &OutputTarget, content: &str) -> Result<Option<PathBuf>, WriteError> {
    let backup_path = backup(target, Local::now())?;
    write_content(target, content)?;
    Ok(backup_path)
}
