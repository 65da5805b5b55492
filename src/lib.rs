//! pemap: PE section mapping and anomaly detection.
//!
//! A PE file is read through a [`FileAccessor`](io::FileAccessor), its
//! section table is turned into virtual-to-physical mappings by a
//! [`MappingBuilder`](mapping::MappingBuilder), and the resulting
//! [`AddressMapper`](mapping::AddressMapper) serves reads of the virtual
//! address space on demand. Parsed imports then feed a chain of anomaly
//! detectors.
//!
//! ```no_run
//! use pemap::{analyze_path, Config};
//!
//! let result = analyze_path("sample.exe", &Config::default())?;
//! print!("{}", result.report);
//! # Ok::<(), pemap::PemapError>(())
//! ```

pub mod anomaly;
pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;
pub mod mapping;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyScanner, ScanContext, ScanResult};
pub use api::{analyze_accessor, analyze_path};
pub use config::Config;
pub use error::{PemapError, Result};
pub use io::FileAccessor;
pub use mapping::{AddressMapper, MappingBuilder, PhysicalRange, SectionMapping, VirtualRange};
