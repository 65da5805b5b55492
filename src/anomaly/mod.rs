//! Layered anomaly detection.
//!
//! An [`AnomalyScanner`] runs a base detector followed by any number of
//! additional [`AnomalyDetector`] layers. Each detector sees only the parsed
//! file, never another detector's findings, and the scanner concatenates
//! their results in order. Adding a layer therefore only ever appends.

pub mod base;
pub mod imports;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::{PemapError, Result};
use crate::formats::pe::types::{Import, ImportSection};
use crate::mapping::{AddressMapper, HeaderAccessor};

pub use base::BaseScan;
pub use imports::ImportAnomalyDetector;

/// What kind of irregularity was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalySubtype {
    InvalidSection,
    OverlappingSections,
    FractionatedDatadir,
    Kernel32ByOrdinalImports,
}

/// The structure an anomaly belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructureKey {
    SectionTable,
    ImportSection,
    ImportDll,
}

/// Subtype-specific detail attached to an anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum AnomalyPayload {
    /// The imports the anomaly is about.
    Imports(Vec<Import>),
    /// Names of the sections involved.
    Sections(Vec<String>),
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub subtype: AnomalySubtype,
    pub key: StructureKey,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnomalyPayload>,
}

impl Anomaly {
    pub fn new(subtype: AnomalySubtype, key: StructureKey, description: impl Into<String>) -> Self {
        Self {
            subtype,
            key,
            description: description.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: AnomalyPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Imports attached to the anomaly; empty for other payloads.
    pub fn imports(&self) -> &[Import] {
        match &self.payload {
            Some(AnomalyPayload::Imports(imports)) => imports,
            _ => &[],
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Everything a detector may inspect.
pub struct ScanContext<'a> {
    pub file_name: &'a str,
    pub headers: &'a dyn HeaderAccessor,
    pub mapper: &'a AddressMapper<'a>,
    pub imports: Option<&'a ImportSection>,
}

impl ScanContext<'_> {
    pub fn file_size(&self) -> u64 {
        self.headers.file_size()
    }
}

/// One stage of the scan.
pub trait AnomalyDetector {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Heading for this detector's part of the report.
    fn title(&self) -> &str;

    /// Produces this detector's findings.
    fn scan(&self, ctx: &ScanContext<'_>) -> Result<Vec<Anomaly>>;

    /// Renders this detector's findings.
    fn report(&self, found: &[Anomaly]) -> String {
        let mut out = format!("{}\n{}\n", self.title(), "-".repeat(self.title().len()));
        if found.is_empty() {
            out.push_str("no anomalies found\n");
        }
        for anomaly in found {
            out.push_str("* ");
            out.push_str(&anomaly.description);
            out.push('\n');
        }
        out
    }
}

/// Combined output of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub anomalies: Vec<Anomaly>,
    pub report: String,
}

impl ScanResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PemapError::Serialization(e.to_string()))
    }
}

/// Runs a base detector and an ordered list of layers over one file.
pub struct AnomalyScanner {
    base: Box<dyn AnomalyDetector>,
    layers: Vec<Box<dyn AnomalyDetector>>,
}

impl AnomalyScanner {
    pub fn new(base: Box<dyn AnomalyDetector>) -> Self {
        Self {
            base,
            layers: Vec::new(),
        }
    }

    /// The standard chain: section checks, then the import checks.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(Box::new(BaseScan::new(config.base_section_checks)))
            .with_layer(Box::new(ImportAnomalyDetector::from_config(config)))
    }

    pub fn with_layer(mut self, layer: Box<dyn AnomalyDetector>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn push_layer(&mut self, layer: Box<dyn AnomalyDetector>) {
        self.layers.push(layer);
    }

    /// Detector names in execution order.
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors().map(|d| d.name()).collect()
    }

    fn detectors(&self) -> impl Iterator<Item = &(dyn AnomalyDetector + 'static)> + '_ {
        std::iter::once(self.base.as_ref()).chain(self.layers.iter().map(|l| l.as_ref()))
    }

    pub fn scan(&self, ctx: &ScanContext<'_>) -> Result<ScanResult> {
        let mut anomalies = Vec::new();
        let mut report = format!("Scanned file: {}\n", ctx.file_name);

        for detector in self.detectors() {
            let found = detector.scan(ctx)?;
            debug!(detector = detector.name(), found = found.len(), "Detector finished");
            report.push('\n');
            report.push_str(&detector.report(&found));
            anomalies.extend(found);
        }

        Ok(ScanResult { anomalies, report })
    }
}

impl Default for AnomalyScanner {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}
