//! One-call entry points running the whole pipeline.

use std::path::Path;

use tracing::{debug, info};

use crate::anomaly::{AnomalyScanner, ScanContext, ScanResult};
use crate::config::Config;
use crate::error::Result;
use crate::formats::pe::{parse_imports, PeHeaders};
use crate::io::{self, FileAccessor};
use crate::mapping::{AddressMapper, MappingBuilder};

/// Parse, map and scan the PE file at `path`.
///
/// The file is opened with the access strategy from `config.io`; the report
/// names the file by its final path component.
pub fn analyze_path<P: AsRef<Path>>(path: P, config: &Config) -> Result<ScanResult> {
    let path = path.as_ref();
    let file = io::open(path, &config.io).map_err(|e| crate::log_error!(e, "open"))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    analyze_accessor(&name, file.as_ref(), config)
}

/// Parse, map and scan a PE image served by `file`.
pub fn analyze_accessor(
    name: &str,
    file: &dyn FileAccessor,
    config: &Config,
) -> Result<ScanResult> {
    let span = crate::span_trace!("analyze", file = name, size = file.len());
    let _guard = span.enter();

    let headers = PeHeaders::parse(file, &config.limits)?;
    let mappings = MappingBuilder::new(&headers).build()?;
    let mapper = AddressMapper::new(mappings, file).with_chunk_size(config.mapper.chunk_size);
    debug!(
        mappings = mapper.mappings().len(),
        len = mapper.len(),
        "Address space ready"
    );

    let imports = parse_imports(&headers, &mapper, &config.limits)?;

    let ctx = ScanContext {
        file_name: name,
        headers: &headers,
        mapper: &mapper,
        imports: imports.as_ref(),
    };
    let result = AnomalyScanner::from_config(&config.scan).scan(&ctx)?;
    info!(anomalies = result.anomalies.len(), "Scan complete");
    Ok(result)
}
