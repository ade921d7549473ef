//! Builtin macro vocabulary

use super::{MacroContext, MacroError, MacroFn};
use chrono::{DateTime, SecondsFormat, Utc};

/// Calendar parts from coarsest to finest
const CALENDAR_PARTS: [&str; 5] = ["year", "month", "day", "hour", "minute"];

/// Epoch origin used by `date_bin`
const DATE_BIN_ORIGIN: &str = "timestamp '1970-01-01T00:00:00Z'";

pub(super) const MACROS: &[(&str, MacroFn)] = &[
    ("dateBin", date_bin),
    ("dateBinAlias", date_bin_alias),
    ("interval", interval),
    ("timeFilter", time_filter),
    ("timeFrom", time_from),
    ("timeGroup", time_group),
    ("timeGroupAlias", time_group_alias),
    ("timeRange", time_filter),
    ("timeRangeFrom", time_range_from),
    ("timeRangeTo", time_range_to),
    ("timeTo", time_to),
];

fn expect_args(args: &[String], expected: usize) -> Result<(), MacroError> {
    if args.len() != expected {
        return Err(MacroError::BadArgumentCount {
            expected,
            received: args.len(),
        });
    }
    Ok(())
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn interval_literal(ctx: &MacroContext) -> String {
    format!("interval '{} second'", ctx.interval.as_secs())
}

fn interval(ctx: &MacroContext, _args: &[String]) -> Result<String, MacroError> {
    Ok(interval_literal(ctx))
}

fn time_filter(ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    expect_args(args, 1)?;
    let column = &args[0];
    Ok(format!(
        "{column} >= '{}' AND {column} <= '{}'",
        format_time(&ctx.time_range.from),
        format_time(&ctx.time_range.to)
    ))
}

fn time_range_from(ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    expect_args(args, 1)?;
    Ok(format!("{} >= '{}'", args[0], format_time(&ctx.time_range.from)))
}

fn time_range_to(ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    expect_args(args, 1)?;
    Ok(format!("{} <= '{}'", args[0], format_time(&ctx.time_range.to)))
}

fn time_from(ctx: &MacroContext, _args: &[String]) -> Result<String, MacroError> {
    Ok(format!(
        "cast('{}' as timestamp)",
        format_time(&ctx.time_range.from)
    ))
}

fn time_to(ctx: &MacroContext, _args: &[String]) -> Result<String, MacroError> {
    Ok(format!("cast('{}' as timestamp)", format_time(&ctx.time_range.to)))
}

fn date_bin(ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    date_bin_with_suffix(ctx, args, None)
}

fn date_bin_alias(ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    date_bin_with_suffix(ctx, args, Some("_binned"))
}

fn date_bin_with_suffix(
    ctx: &MacroContext,
    args: &[String],
    suffix: Option<&str>,
) -> Result<String, MacroError> {
    expect_args(args, 1)?;
    let column = &args[0];
    let alias = suffix.map_or_else(String::new, |s| format!(" as {column}{s}"));
    Ok(format!(
        "date_bin({}, {column}, {DATE_BIN_ORIGIN}){alias}",
        interval_literal(ctx)
    ))
}

fn time_group(_ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    expect_args(args, 2)?;
    time_group_sql(&args[0], &args[1], false)
}

fn time_group_alias(_ctx: &MacroContext, args: &[String]) -> Result<String, MacroError> {
    expect_args(args, 2)?;
    time_group_sql(&args[0], &args[1], true)
}

/// `datepart` expressions for the part just above `unit` and `unit` itself
fn time_group_sql(column: &str, unit: &str, with_alias: bool) -> Result<String, MacroError> {
    let unit = unit.trim_matches('\'');
    let idx = CALENDAR_PARTS
        .iter()
        .position(|p| *p == unit)
        .ok_or_else(|| {
            MacroError::InvalidArgument(format!(
                "unsupported time group unit '{unit}', expected one of {}",
                CALENDAR_PARTS.join(", ")
            ))
        })?;

    let parts = &CALENDAR_PARTS[idx.saturating_sub(1)..=idx];
    let exprs: Vec<String> = parts
        .iter()
        .map(|part| {
            if with_alias {
                format!("datepart('{part}', {column}) as {column}_{part}")
            } else {
                format!("datepart('{part}', {column})")
            }
        })
        .collect();
    Ok(exprs.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_group_parts_per_unit() {
        assert_eq!(time_group_sql("t", "year", false).unwrap(), "datepart('year', t)");
        assert_eq!(
            time_group_sql("t", "month", false).unwrap(),
            "datepart('year', t),datepart('month', t)"
        );
        assert_eq!(
            time_group_sql("t", "hour", false).unwrap(),
            "datepart('day', t),datepart('hour', t)"
        );
    }

    #[test]
    fn test_time_group_unknown_unit() {
        let err = time_group_sql("t", "week", false).unwrap_err();
        assert!(matches!(err, MacroError::InvalidArgument(_)));
        assert!(err.to_string().contains("week"));
    }

    #[test]
    fn test_vocabulary_has_no_duplicates() {
        let mut names: Vec<_> = MACROS.iter().map(|(n, _)| *n).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
