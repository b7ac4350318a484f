//! Expansion of macro templates over a time window.
//!
//! Given a template such as `s3://bucket/dt=DATE/hr=HOUR/` and a window
//! `[start, end)` in unix seconds, expansion emits one concrete prefix per
//! unit of the template's granularity. The window start is floored and the
//! end is ceiled to the unit, so partially covered units are included.
//! Every prefix carries back its unit start as `mdate`, which the time
//! resolver uses for macro-timed tables.

use chrono::{DateTime, Utc};

use crate::time::pattern::PatternMacro;

/// One expanded prefix plus the unit start it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPrefix {
    /// Concrete prefix with all macro tokens substituted.
    pub prefix: String,

    /// Unix seconds of the unit start; `None` for macro-less templates.
    pub mdate: Option<i64>,
}

fn substitute(template: &str, unit_start: i64) -> String {
    // Formatting never fails for on-or-after-epoch seconds; clamp below.
    let ts = DateTime::<Utc>::from_timestamp(unit_start.max(0), 0)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch"));

    template
        .replace(
            PatternMacro::Date.token(),
            &ts.format("%Y-%m-%d").to_string(),
        )
        .replace(PatternMacro::Hour.token(), &ts.format("%H").to_string())
        .replace(PatternMacro::Minute.token(), &ts.format("%M").to_string())
        .replace(PatternMacro::Second.token(), &ts.format("%S").to_string())
}

/// Expand `template` over the half-open window `[start, end)`.
///
/// - Macro-less templates yield the template itself, with no `mdate`.
/// - `TIMESTAMP` substitutes the window start directly.
/// - Hierarchical macros yield one prefix per unit, ordered by time.
///
/// An empty window (`end <= start`) yields no prefixes for hierarchical
/// macros.
pub fn expand(template: &str, start: i64, end: i64) -> Vec<ExpandedPrefix> {
    match PatternMacro::extract(template) {
        PatternMacro::Invalid => vec![ExpandedPrefix {
            prefix: template.to_string(),
            mdate: None,
        }],
        PatternMacro::Timestamp => vec![ExpandedPrefix {
            prefix: template.replace(PatternMacro::Timestamp.token(), &start.to_string()),
            mdate: Some(start),
        }],
        leaf => {
            let unit = leaf.unit_seconds().expect("hierarchical macros have units");
            let aligned_start = start.div_euclid(unit) * unit;
            let aligned_end = if end.rem_euclid(unit) == 0 {
                end
            } else {
                (end.div_euclid(unit) + 1) * unit
            };

            let mut out = Vec::new();
            let mut t = aligned_start;
            while t < aligned_end {
                out.push(ExpandedPrefix {
                    prefix: substitute(template, t),
                    mdate: Some(t),
                });
                t += unit;
            }
            out
        }
    }
}
