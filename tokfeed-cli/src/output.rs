use std::path::PathBuf;

use anyhow::Result;
#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use tokfeed::{FeedSnapshot, VideoItem};

use crate::cli::OutputFormat;

/// Local paths produced by `tokfeed cache`.
#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub video_id: String,
    pub avatar: Option<PathBuf>,
    pub cover: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

#[cfg(not(feature = "colored-output"))]
#[derive(Clone, Copy)]
enum Color {
    Green,
    Yellow,
    Cyan,
    Blue,
    Red,
}

pub struct OutputManager {
    #[cfg_attr(not(feature = "colored-output"), allow(dead_code))]
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_feed(&self, snapshot: &FeedSnapshot, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_feed_pretty(snapshot)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(snapshot)?),
            OutputFormat::JsonCompact => Ok(serde_json::to_string(snapshot)?),
        }
    }

    pub fn format_cache(&self, report: &CacheReport, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_cache_pretty(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::JsonCompact => Ok(serde_json::to_string(report)?),
        }
    }

    fn format_feed_pretty(&self, snapshot: &FeedSnapshot) -> String {
        let mut output = String::new();
        output.push_str(&self.colorize(
            &format!(
                "Feed: {} items, produced {}",
                snapshot.len(),
                snapshot.produced_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Color::Green,
            true,
        ));
        output.push('\n');
        for item in &snapshot.items {
            output.push_str(&self.format_item(item));
        }
        output
    }

    fn format_item(&self, item: &VideoItem) -> String {
        let mut line = format!(
            "  {}  {}  {}",
            self.colorize(
                &item.create_time.format("%Y-%m-%d %H:%M").to_string(),
                Color::Yellow,
                false
            ),
            self.colorize(&format!("@{}", item.author.unique_id), Color::Cyan, true),
            self.colorize(&item.id, Color::Blue, false),
        );
        if item.is_ad {
            line.push_str(&format!("  {}", self.colorize("[ad]", Color::Red, false)));
        }
        line.push('\n');
        line
    }

    fn format_cache_pretty(&self, report: &CacheReport) -> String {
        let mut output = String::new();
        output.push_str(&self.colorize(
            &format!("Media for {}:", report.video_id),
            Color::Green,
            true,
        ));
        output.push('\n');
        for (label, path) in [
            ("Avatar", &report.avatar),
            ("Cover", &report.cover),
            ("Video", &report.video),
        ] {
            let value = match path {
                Some(path) => self.colorize(&path.display().to_string(), Color::Cyan, false),
                None => self.colorize("unavailable", Color::Red, false),
            };
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize(label, Color::Yellow, false),
                value
            ));
        }
        output
    }

    #[cfg(feature = "colored-output")]
    fn colorize(&self, text: &str, color: Color, bold: bool) -> String {
        if !self.colored {
            return text.to_string();
        }
        let colored = text.color(color);
        if bold {
            colored.bold().to_string()
        } else {
            colored.to_string()
        }
    }

    #[cfg(not(feature = "colored-output"))]
    fn colorize(&self, text: &str, _color: Color, _bold: bool) -> String {
        text.to_string()
    }
}
