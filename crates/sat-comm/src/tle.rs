//! TLE ingest, validation and on-disk caching.
//!
//! Accepts the bare two-line form and the three-line form whose first line
//! is a `"0 "`-prefixed satellite name. Validated records are cached as
//! `{norad}_{epoch-date}.tle` files so the last known elements survive a
//! catalog outage.

use chrono::{Days, NaiveDate};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::{CommError, Result};

static LINE1_RE: OnceLock<Regex> = OnceLock::new();
static LINE2_RE: OnceLock<Regex> = OnceLock::new();

fn line1_re() -> &'static Regex {
    LINE1_RE.get_or_init(|| {
        Regex::new(
            r"^\d \d{5}\w [\d ]{5}[\d\w ]{3} \d{5}\.\d{8} [ -]\.\d{8} [ -]\d{5}-\d [ -]\d{5}-\d 0 [ \d]\d{4}$",
        )
        .expect("valid TLE line 1 pattern")
    })
}

fn line2_re() -> &'static Regex {
    LINE2_RE.get_or_init(|| {
        Regex::new(
            r"^\d \d{5} [\d ]{3}\.\d{4} [\d ]{3}\.\d{4} \d{7} [\d ]{3}\.\d{4} [\d ]{3}\.\d{4} [\d ]{2}\.\d{8}[ \d]{6}$",
        )
        .expect("valid TLE line 2 pattern")
    })
}

/// A validated two-line element set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TleRecord {
    pub line1: String,
    pub line2: String,
    /// Satellite name from the `"0 "` line of a three-line set.
    pub name: Option<String>,
    /// Element-set epoch, date resolution.
    pub epoch: NaiveDate,
    pub norad_id: u32,
}

impl TleRecord {
    /// Build a record from the two data lines.
    pub fn from_lines(line1: &str, line2: &str) -> Result<Self> {
        let line1 = line1.trim();
        let line2 = line2.trim();

        if !line1_re().is_match(line1) || !line2_re().is_match(line2) {
            return Err(CommError::TleData("TLE lines have incorrect format".into()));
        }

        let epoch = decode_epoch(line1)?;
        let norad_id = line2[2..7]
            .trim()
            .parse::<u32>()
            .map_err(|_| CommError::TleData("unreadable catalog number".into()))?;

        Ok(Self {
            line1: line1.to_string(),
            line2: line2.to_string(),
            name: None,
            epoch,
            norad_id,
        })
    }

    /// Build a record from free text, accepting both the two-line and the
    /// `"0 "`-name-prefixed three-line variants.
    pub fn from_text(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        match lines.as_slice() {
            [name, line1, line2, ..] if name.starts_with("0 ") => {
                let mut record = Self::from_lines(line1, line2)?;
                record.name = Some(name[2..].trim().to_string());
                Ok(record)
            }
            [line1, line2, ..] => Self::from_lines(line1, line2),
            _ => Err(CommError::TleData(
                "expected two TLE lines separated by a newline".into(),
            )),
        }
    }

    /// Read a record from a `.tle` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Cache file name: catalog number as printed in line 2, plus the epoch
    /// date.
    pub fn cache_file_name(&self) -> String {
        format!("{}_{}.tle", &self.line2[2..7], self.epoch)
    }

    /// Persist the two data lines under `dir`, creating it when absent.
    /// Returns the written path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.cache_file_name());
        fs::write(&path, format!("{}\n{}", self.line1, self.line2))?;
        info!("TLE file {} saved", path.display());
        Ok(path)
    }
}

fn decode_epoch(line1: &str) -> Result<NaiveDate> {
    let year: i32 = line1[18..20]
        .trim()
        .parse()
        .map_err(|_| CommError::TleData("unreadable epoch year".into()))?;
    let day: u64 = line1[20..23]
        .trim()
        .parse()
        .map_err(|_| CommError::TleData("unreadable epoch day".into()))?;

    let year = if year <= 50 { year + 2000 } else { year + 1900 };
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|jan1| jan1.checked_add_days(Days::new(day.saturating_sub(1))))
        .ok_or_else(|| CommError::TleData(format!("epoch day {day} is out of range")))
}
