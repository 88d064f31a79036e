use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use chrono::Local;
use serde::{Deserialize, Serialize};

pub const SIZE_COLUMN_WIDTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeUnit {
    B,
    KB,
    MB,
    #[default]
    GB,
    TB,
}

impl SizeUnit {
    pub fn bytes_per_unit(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::KB => 1024,
            SizeUnit::MB => 1024 * 1024,
            SizeUnit::GB => 1024 * 1024 * 1024,
            SizeUnit::TB => 1024 * 1024 * 1024 * 1024,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
            SizeUnit::TB => "TB",
        }
    }

    pub fn to_bytes(self, value: f64) -> u64 {
        if !value.is_finite() || value <= 0.0 {
            return 0;
        }
        (value * self.bytes_per_unit() as f64) as u64
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(SizeUnit::B),
            "KB" | "K" => Ok(SizeUnit::KB),
            "MB" | "M" => Ok(SizeUnit::MB),
            "GB" | "G" => Ok(SizeUnit::GB),
            "TB" | "T" => Ok(SizeUnit::TB),
            other => Err(format!("unknown size unit: {other}")),
        }
    }
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_size(bytes: u64, unit: SizeUnit) -> String {
    let value = (bytes as f64 / unit.bytes_per_unit() as f64).round() as u64;
    let text = format!("{} {}", group_thousands(value), unit.label());
    format!("{text:>SIZE_COLUMN_WIDTH$}")
}

pub fn format_system_time(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => {
            let datetime: chrono::DateTime<Local> = time.into();
            datetime.format("%Y-%m-%d %H:%M").to_string()
        }
        None => "-".to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    if total_secs > 3600 {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    } else if total_secs > 60 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else if duration.as_secs_f64() > 1.0 {
        format!("{total_secs}s")
    } else {
        format!("{}ms", duration.subsec_millis())
    }
}

pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
