use crate::props::{parse_properties, Properties};
use crate::template::{self, Arg};
use crate::{ConfigError, RenderError};
use std::fmt;
use std::str::FromStr;
use time::{format_description, OffsetDateTime, UtcOffset};

/// Template used for timestamp units without an explicit `formatString`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

const KEY_LABEL: &str = "label";
const KEY_CONVERSION: &str = "conversion";
const KEY_FORMAT: &str = "formatString";
const KEY_VALUE: &str = "valueString";
const KEY_NUMERATOR: &str = "numerator";
const KEY_DENOMINATOR: &str = "denominator";
const KEY_EDITOR: &str = "editor";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ConversionKind {
    #[default]
    None,
    UnixSecondsUtc,
    UnixSecondsLocal,
}

impl ConversionKind {
    pub fn is_timestamp(self) -> bool {
        !matches!(self, ConversionKind::None)
    }
}

impl FromStr for ConversionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(ConversionKind::None),
            v if v.eq_ignore_ascii_case("none") => Ok(ConversionKind::None),
            v if v.eq_ignore_ascii_case("unixSecondsUTC") => Ok(ConversionKind::UnixSecondsUtc),
            v if v.eq_ignore_ascii_case("unixSecondsLocal") => {
                Ok(ConversionKind::UnixSecondsLocal)
            }
            other => Err(format!(
                "unknown conversion {other:?} (expected none, unixSecondsUTC or unixSecondsLocal)"
            )),
        }
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversionKind::None => "none",
            ConversionKind::UnixSecondsUtc => "unixSecondsUTC",
            ConversionKind::UnixSecondsLocal => "unixSecondsLocal",
        })
    }
}

/// Freshness of a displayed value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Activity {
    Active,
    Inactive,
}

/// A named rule for turning raw telemetry into display text. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitFormat {
    name: String,
    label: String,
    print_format: String,
    edit_format: String,
    numerator: i64,
    denominator: i64,
    conversion: ConversionKind,
    editor: Option<String>,
    extra: Properties,
}

impl UnitFormat {
    /// Parse a unit from its `key=value;...` configuration string.
    pub fn parse(name: &str, config: &str) -> Result<Self, ConfigError> {
        let mut props = parse_properties(config)
            .map_err(|e| ConfigError::new(name, e.segment(), e.to_string()))?;

        let conversion = match props.remove(KEY_CONVERSION) {
            Some(v) => v
                .parse::<ConversionKind>()
                .map_err(|reason| ConfigError::new(name, KEY_CONVERSION, reason))?,
            None => ConversionKind::None,
        };
        let numerator = positive(name, KEY_NUMERATOR, props.remove(KEY_NUMERATOR))?;
        let denominator = positive(name, KEY_DENOMINATOR, props.remove(KEY_DENOMINATOR))?;
        let scaled = (numerator, denominator) != (1, 1);

        let print_format = props.remove(KEY_FORMAT).unwrap_or_else(|| {
            if conversion.is_timestamp() {
                DEFAULT_TIMESTAMP_FORMAT.to_string()
            } else if scaled {
                "%f".to_string()
            } else {
                "%d".to_string()
            }
        });
        let edit_format = props
            .remove(KEY_VALUE)
            .unwrap_or_else(|| print_format.clone());
        for (field, template) in [(KEY_FORMAT, &print_format), (KEY_VALUE, &edit_format)] {
            check_template(conversion, scaled, template)
                .map_err(|reason| ConfigError::new(name, field, reason))?;
        }
        let label = props
            .remove(KEY_LABEL)
            .unwrap_or_else(|| name.to_string());
        let editor = props.remove(KEY_EDITOR).filter(|e| !e.is_empty());

        tracing::debug!(unit = name, %conversion, numerator, denominator, "parsed unit format");
        Ok(Self {
            name: name.to_string(),
            label,
            print_format,
            edit_format,
            numerator,
            denominator,
            conversion,
            editor,
            extra: props,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn print_format(&self) -> &str {
        &self.print_format
    }

    pub fn edit_format(&self) -> &str {
        &self.edit_format
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    pub fn conversion(&self) -> ConversionKind {
        self.conversion
    }

    pub fn editor(&self) -> Option<&str> {
        self.editor.as_deref()
    }

    /// Consumer-specific property that is not one of the recognized keys.
    pub fn property<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.extra.get_or(key, default)
    }

    pub fn properties(&self) -> &Properties {
        &self.extra
    }

    /// Render `raw` for display using the host's local offset where needed.
    /// Never fails: a rendering error becomes inline diagnostic text.
    pub fn format(&self, raw: impl Into<i64>) -> String {
        self.format_at(raw, local_offset())
    }

    /// As [`UnitFormat::format`], with an explicit offset for local-time units.
    pub fn format_at(&self, raw: impl Into<i64>, local: UtcOffset) -> String {
        self.render_or_diagnose(&self.print_format, raw.into(), local)
    }

    /// Render `raw` with the edit template, for pre-filling input fields.
    pub fn edit_text(&self, raw: impl Into<i64>) -> String {
        self.render_or_diagnose(&self.edit_format, raw.into(), local_offset())
    }

    /// Fallible rendering with the print template.
    pub fn try_format(&self, raw: impl Into<i64>, local: UtcOffset) -> Result<String, RenderError> {
        self.render(&self.print_format, raw.into(), local)
    }

    fn render_or_diagnose(&self, template: &str, raw: i64, local: UtcOffset) -> String {
        match self.render(template, raw, local) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(unit = %self.name, raw, error = %e, "value rendering failed");
                e.diagnostic()
            }
        }
    }

    fn render(&self, template: &str, raw: i64, local: UtcOffset) -> Result<String, RenderError> {
        let offset = match self.conversion {
            ConversionKind::None => {
                let arg = if (self.numerator, self.denominator) != (1, 1) {
                    Arg::Float(raw as f64 * self.numerator as f64 / self.denominator as f64)
                } else {
                    Arg::Int(raw)
                };
                return template::render(template, arg);
            }
            ConversionKind::UnixSecondsUtc => UtcOffset::UTC,
            ConversionKind::UnixSecondsLocal => local,
        };
        if raw == 0 {
            return Ok(String::new());
        }
        let items = format_description::parse(template)
            .map_err(|e| RenderError::InvalidTemplate(e.to_string()))?;
        let at = OffsetDateTime::from_unix_timestamp(raw)
            .map_err(|_| RenderError::OutOfRange(raw))?
            .to_offset(offset);
        at.format(&items).map_err(|e| RenderError::Time(e.to_string()))
    }

    /// Activity hint relative to the host clock.
    pub fn activity_hint(&self, raw: impl Into<i64>) -> Activity {
        self.activity_hint_at(raw, OffsetDateTime::now_utc())
    }

    /// Timestamp units are `Inactive` once the stored instant is at or before
    /// `now`; everything else is always `Active`.
    pub fn activity_hint_at(&self, raw: impl Into<i64>, now: OffsetDateTime) -> Activity {
        if !self.conversion.is_timestamp() {
            return Activity::Active;
        }
        // Both sides are absolute instants, so the display offset does not matter
        if raw.into() <= now.unix_timestamp() {
            Activity::Inactive
        } else {
            Activity::Active
        }
    }
}

/// Render-free check for timestamp templates, a dry render for numeric ones.
fn check_template(conversion: ConversionKind, scaled: bool, template: &str) -> Result<(), String> {
    if conversion.is_timestamp() {
        return format_description::parse(template)
            .map(drop)
            .map_err(|e| e.to_string());
    }
    let sample = if scaled { Arg::Float(0.0) } else { Arg::Int(0) };
    template::render(template, sample)
        .map(drop)
        .map_err(|e| e.to_string())
}

fn positive(unit: &str, field: &str, raw: Option<String>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else { return Ok(1) };
    match raw.trim().parse::<i64>() {
        Ok(v) if v >= 1 => Ok(v),
        Ok(v) => Err(ConfigError::new(
            unit,
            field,
            format!("must be a positive integer, got {v}"),
        )),
        Err(e) => Err(ConfigError::new(
            unit,
            field,
            format!("not an integer ({raw:?}): {e}"),
        )),
    }
}

/// Local UTC offset of the host, or UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "local offset unavailable; using UTC");
        UtcOffset::UTC
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn unit(config: &str) -> UnitFormat {
        UnitFormat::parse("test", config).unwrap()
    }

    #[test]
    fn parses_recognized_and_extra_keys() {
        let u = unit("label=Temperature;formatString=%.1f °C;valueString=%.1f;numerator=1;denominator=10;editor=slider;color=red");
        assert_eq!(u.name(), "test");
        assert_eq!(u.label(), "Temperature");
        assert_eq!(u.print_format(), "%.1f °C");
        assert_eq!(u.edit_format(), "%.1f");
        assert_eq!((u.numerator(), u.denominator()), (1, 10));
        assert_eq!(u.editor(), Some("slider"));
        assert_eq!(u.conversion(), ConversionKind::None);
        assert_eq!(u.property("color", "black"), "red");
        assert_eq!(u.property("size", "small"), "small");
        assert_eq!(u.properties().len(), 1);
    }

    #[test]
    fn defaults() {
        let u = unit("");
        assert_eq!(u.label(), "test");
        assert_eq!(u.print_format(), "%d");
        assert_eq!(u.edit_format(), "%d");
        assert_eq!((u.numerator(), u.denominator()), (1, 1));
        assert_eq!(u.editor(), None);

        assert_eq!(unit("denominator=100").print_format(), "%f");
        assert_eq!(
            unit("conversion=unixSecondsUTC").print_format(),
            DEFAULT_TIMESTAMP_FORMAT
        );
    }

    #[test]
    fn rejects_non_positive_and_non_numeric_scale() {
        for (config, field) in [
            ("numerator=0", "numerator"),
            ("denominator=-5", "denominator"),
            ("denominator=ten", "denominator"),
            ("numerator=1.5", "numerator"),
        ] {
            let err = UnitFormat::parse("power", config).unwrap_err();
            assert_eq!(err.unit, "power");
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn rejects_unknown_conversion_bad_timestamp_template_and_syntax() {
        let err = UnitFormat::parse("t", "conversion=fortnights").unwrap_err();
        assert_eq!(err.field, "conversion");
        let err = UnitFormat::parse("t", "conversion=unixSecondsUTC;formatString=[year").unwrap_err();
        assert_eq!(err.field, "formatString");
        let err = UnitFormat::parse("t", "label=x;broken").unwrap_err();
        assert_eq!(err.unit, "t");
        assert_eq!(err.field, "broken");
    }

    #[test]
    fn scaling() {
        let u = unit("numerator=1;denominator=10;formatString=%.1f");
        assert_eq!(u.format(157), "15.7");
        assert_eq!(u.format(-5), "-0.5");
        let u = unit("numerator=3;denominator=2;formatString=%.2f");
        assert_eq!(u.format(5i32), "7.50");
    }

    #[test]
    fn unscaled_renders_raw_integer() {
        assert_eq!(unit("formatString=%d rpm").format(1200), "1200 rpm");
        assert_eq!(unit("").format(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn broken_templates_fail_at_parse_time() {
        for (config, field) in [
            ("numerator=1;denominator=10;formatString=%d", "formatString"),
            ("formatString=%d/%d", "formatString"),
            ("formatString=%99999999999999999999d", "formatString"),
            ("formatString=%.5000f;denominator=2", "formatString"),
            ("formatString=%d;valueString=%q", "valueString"),
            ("conversion=unixSecondsUTC;valueString=[hour", "valueString"),
        ] {
            let err = UnitFormat::parse("t", config).unwrap_err();
            assert_eq!(err.field, field, "{config}");
        }
    }

    #[test]
    fn rendering_failures_become_diagnostics() {
        let u = unit("conversion=unixSecondsUTC");
        assert!(matches!(
            u.try_format(i64::MIN, UtcOffset::UTC),
            Err(RenderError::OutOfRange(_))
        ));
        assert!(u.format(i64::MIN).starts_with("OutOfRange: "));
    }

    #[test]
    fn timestamp_utc() {
        let u = unit("conversion=unixSecondsUTC");
        assert_eq!(u.format(0), "");
        assert_eq!(u.format(1_000_000_000), "2001-09-09 01:46:40");
        let u = unit("conversion=unixSecondsUTC;formatString=[day].[month].[year] [hour]:[minute]");
        assert_eq!(u.format(86_400), "02.01.1970 00:00");
    }

    #[test]
    fn timestamp_local_uses_offset() -> anyhow::Result<()> {
        let u = unit("conversion=unixSecondsLocal;formatString=[hour]:[minute]");
        let plus_two = UtcOffset::from_hms(2, 0, 0)?;
        assert_eq!(u.format_at(1_000_000_000, plus_two), "03:46");
        assert_eq!(u.format_at(0, plus_two), "");
        Ok(())
    }

    #[test]
    fn timestamp_out_of_range_is_diagnostic() {
        let u = unit("conversion=unixSecondsUTC");
        assert!(u.format(i64::MAX).starts_with("OutOfRange: "));
    }

    #[test]
    fn activity_hint() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let u = unit("conversion=unixSecondsUTC");
        let past = (now - Duration::hours(1)).unix_timestamp();
        let future = (now + Duration::days(3650)).unix_timestamp();
        assert_eq!(u.activity_hint_at(past, now), Activity::Inactive);
        assert_eq!(u.activity_hint_at(now.unix_timestamp(), now), Activity::Inactive);
        assert_eq!(u.activity_hint_at(future, now), Activity::Active);

        let local = unit("conversion=unixSecondsLocal");
        assert_eq!(local.activity_hint_at(past, now), Activity::Inactive);
        assert_eq!(local.activity_hint_at(future, now), Activity::Active);

        assert_eq!(unit("").activity_hint_at(past, now), Activity::Active);
    }

    #[test]
    fn activity_hint_against_host_clock() {
        let u = unit("conversion=unixSecondsUTC");
        assert_eq!(u.activity_hint(1_000_000_000), Activity::Inactive);
        assert_eq!(u.activity_hint(4_000_000_000i64), Activity::Active);
    }
}
