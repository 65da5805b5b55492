//! Import table heuristics.

use tracing::debug;

use crate::anomaly::{
    Anomaly, AnomalyDetector, AnomalyPayload, AnomalySubtype, ScanContext, StructureKey,
};
use crate::config::ScanConfig;
use crate::core::address_range::ByteRange;
use crate::error::Result;
use crate::formats::pe::types::{Import, ImportSection, Location};

/// Flags import metadata scattered outside its section and kernel32.dll
/// imports by ordinal.
#[derive(Debug, Clone, Copy)]
pub struct ImportAnomalyDetector {
    fractionated: bool,
    kernel32: bool,
}

impl ImportAnomalyDetector {
    pub fn new() -> Self {
        Self {
            fractionated: true,
            kernel32: true,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            fractionated: config.fractionated_imports,
            kernel32: config.kernel32_ordinals,
        }
    }

    /// Import data whose bytes lie outside the section that holds the import
    /// directory.
    pub fn check_fractionated_imports(ctx: &ScanContext<'_>) -> Vec<Anomaly> {
        let Some(section) = ctx.imports else {
            return Vec::new();
        };
        let Some(owner) = ctx.headers.section_by_offset(section.directory_offset) else {
            debug!(
                offset = section.directory_offset,
                "No section owns the import directory"
            );
            return Vec::new();
        };
        let range = ByteRange::with_len(
            ctx.headers.aligned_pointer_to_raw(owner),
            ctx.headers.read_size(owner),
        );
        let file_size = ctx.file_size();

        let mut affected: Vec<Import> = Vec::new();
        for import in &section.imports {
            let fragmented = import
                .locations
                .iter()
                .any(|loc| !is_tolerated(loc, &range, file_size));
            if fragmented && !affected.contains(import) {
                affected.push(import.clone());
            }
        }
        if affected.is_empty() {
            return Vec::new();
        }

        let description = format!(
            "Imports are fractionated! Affected import DLLs: {}",
            dll_names(&affected)
        );
        vec![Anomaly::new(
            AnomalySubtype::FractionatedDatadir,
            StructureKey::ImportSection,
            description,
        )
        .with_payload(AnomalyPayload::Imports(affected))]
    }

    /// kernel32.dll imports that use ordinals.
    pub fn check_kernel32_imports(section: &ImportSection) -> Vec<Anomaly> {
        let by_ordinal: Vec<Import> = section
            .imports
            .iter()
            .filter(|i| i.name.eq_ignore_ascii_case("kernel32.dll") && i.has_ordinal_imports())
            .cloned()
            .collect();
        if by_ordinal.is_empty() {
            return Vec::new();
        }

        let ordinals = by_ordinal
            .iter()
            .flat_map(|i| i.ordinal_imports.iter())
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        vec![Anomaly::new(
            AnomalySubtype::Kernel32ByOrdinalImports,
            StructureKey::ImportDll,
            format!("Imports from kernel32.dll by ordinal, namely: {}", ordinals),
        )
        .with_payload(AnomalyPayload::Imports(by_ordinal))]
    }
}

impl Default for ImportAnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A location is fine if it is the unmapped sentinel, starts past the end of
/// the file, or lies wholly inside the owning section.
fn is_tolerated(loc: &Location, section: &ByteRange, file_size: u64) -> bool {
    if loc.is_unmapped() {
        return true;
    }
    let Ok(from) = u64::try_from(loc.from) else {
        return false;
    };
    from >= file_size || section.contains_range(&ByteRange::with_len(from, loc.size))
}

fn dll_names(imports: &[Import]) -> String {
    imports
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AnomalyDetector for ImportAnomalyDetector {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn title(&self) -> &str {
        "Import section"
    }

    fn scan(&self, ctx: &ScanContext<'_>) -> Result<Vec<Anomaly>> {
        let Some(section) = ctx.imports else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        if self.fractionated {
            found.extend(Self::check_fractionated_imports(ctx));
        }
        if self.kernel32 {
            found.extend(Self::check_kernel32_imports(section));
        }
        Ok(found)
    }
}
