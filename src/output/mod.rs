//! Output formatting and management

use crate::scanner::{AddressReport, DomainReport, ProbeOutcome, Report};
use crate::utils::target_parser::Target;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use uuid::Uuid;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Append reports to this file instead of printing them
    pub file: Option<String>,
    pub colored: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
        }
    }
}

/// A report together with what was asked for and when
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub id: Uuid,
    /// Token as received, before classification
    pub token: String,
    pub target: Target,
    pub generated_at: DateTime<Utc>,
    pub report: Report,
}

impl ReportEnvelope {
    pub fn new(token: impl Into<String>, target: Target, report: Report) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: token.into(),
            target,
            generated_at: Utc::now(),
            report,
        }
    }
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Render and emit one report
    pub fn write_report(&self, envelope: &ReportEnvelope) -> io::Result<()> {
        let output = self.render(envelope)?;

        match &self.config.file {
            Some(filename) => {
                let mut file = OpenOptions::new().create(true).append(true).open(filename)?;
                file.write_all(output.as_bytes())?;
            }
            None => print!("{}", output),
        }

        Ok(())
    }

    pub fn render(&self, envelope: &ReportEnvelope) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(envelope)),
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(envelope)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    fn format_text(&self, envelope: &ReportEnvelope) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} ({})\n",
            self.paint("Report for", Paint::Heading),
            self.paint(&envelope.target.to_string(), Paint::Emphasis),
            envelope.target.kind()
        ));

        match &envelope.report {
            Report::Domain(domain) => self.format_domain(&mut out, domain),
            Report::Address(address) => self.format_address(&mut out, address),
        }
        out.push('\n');
        out
    }

    fn format_domain(&self, out: &mut String, domain: &DomainReport) {
        self.format_outcome(out, &domain.resolution, "");
        self.format_outcome(out, &domain.authority, "");
        for address in &domain.per_address {
            out.push('\n');
            self.format_address(out, address);
        }
    }

    fn format_address(&self, out: &mut String, report: &AddressReport) {
        out.push_str(&format!(
            "{} {} {}\n",
            self.paint("==", Paint::Muted),
            self.paint(&report.address.to_string(), Paint::Emphasis),
            self.paint(&format!("({}/5 probes succeeded)", report.success_count()), Paint::Muted)
        ));
        for outcome in &report.outcomes {
            self.format_outcome(out, outcome, "  ");
        }
    }

    fn format_outcome(&self, out: &mut String, outcome: &ProbeOutcome, indent: &str) {
        let status = if outcome.succeeded {
            self.paint("ok", Paint::Success)
        } else {
            self.paint("failed", Paint::Failure)
        };
        out.push_str(&format!("{}[{}] {}\n", indent, outcome.name, status));

        for line in outcome.value.lines().filter(|line| !line.is_empty()) {
            out.push_str(&format!("{}    {}\n", indent, line));
        }
        if let Some(raw) = &outcome.raw_error {
            if !outcome.value.contains(raw.as_str()) {
                for line in raw.lines().filter(|line| !line.is_empty()) {
                    out.push_str(&format!("{}    {}\n", indent, self.paint(line, Paint::Muted)));
                }
            }
        }
    }

    /// Apply color formatting if enabled
    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.config.colored {
            return text.to_string();
        }
        match paint {
            Paint::Heading => text.bright_white().bold().to_string(),
            Paint::Emphasis => text.bright_cyan().bold().to_string(),
            Paint::Success => text.green().to_string(),
            Paint::Failure => text.red().to_string(),
            Paint::Muted => text.bright_black().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Paint {
    Heading,
    Emphasis,
    Success,
    Failure,
    Muted,
}
