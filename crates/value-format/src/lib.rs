//! value-format: unit-aware display of raw device telemetry
//!
//! A unit is configured by a compact property string such as
//! `label=Temperature;formatString=%.1f;numerator=1;denominator=10`. Parsed
//! units scale raw integers, render them with printf-style templates (or, for
//! timestamp units, calendar templates), and report whether a timestamp value
//! is still in the future.

mod error;
pub use error::{ConfigError, RenderError};

mod props;
pub use props::{parse_properties, Properties, PropertyError};

mod template;
pub use template::{render, Arg};

mod unit;
pub use unit::{local_offset, Activity, ConversionKind, UnitFormat, DEFAULT_TIMESTAMP_FORMAT};

mod cache;
pub use cache::UnitCache;

mod loader;
pub use loader::{load_unit_definitions, load_unit_file};

/// Parse a unit format from its configuration string.
pub fn parse(name: &str, config: &str) -> Result<UnitFormat, ConfigError> {
    UnitFormat::parse(name, config)
}

/// Render a raw value; rendering failures come back as diagnostic text.
pub fn format(unit: &UnitFormat, raw: impl Into<i64>) -> String {
    unit.format(raw)
}

pub fn activity_hint(unit: &UnitFormat, raw: impl Into<i64>) -> Activity {
    unit.activity_hint(raw)
}
