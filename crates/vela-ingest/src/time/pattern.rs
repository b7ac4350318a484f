//! Path-template macros and their classification.
//!
//! Table locations may embed time macros, e.g.
//! `s3://bucket/events/dt=DATE/hr=HOUR/`. The macros form a strict
//! hierarchy (DATE > HOUR > MINUTE > SECOND) plus the standalone
//! TIMESTAMP; a template is classified by the deepest complete chain it
//! contains. Anything else is [`PatternMacro::Invalid`] and is listed
//! as-is.

pub const HOUR_MINUTES: i64 = 60;
pub const MINUTE_SECONDS: i64 = 60;
pub const DAY_HOURS: i64 = 24;
pub const HOUR_SECONDS: i64 = HOUR_MINUTES * MINUTE_SECONDS;
pub const DAY_SECONDS: i64 = HOUR_SECONDS * DAY_HOURS;

/// Macros accepted in table locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternMacro {
    /// Daily partition, e.g. `/dt=DATE`.
    Date,
    /// Hourly partition, e.g. `/dt=DATE/hr=HOUR`.
    Hour,
    /// Minute partition, e.g. `/dt=DATE/hr=HOUR/mi=MINUTE`.
    Minute,
    /// Second partition, e.g. `/dt=DATE/hr=HOUR/mi=MINUTE/se=SECOND`.
    Second,
    /// Unix-timestamp directory, e.g. `/ts=TIMESTAMP`.
    Timestamp,
    /// Not a recognized macro combination.
    Invalid,
}

impl PatternMacro {
    /// Literal token substituted in path templates.
    pub fn token(self) -> &'static str {
        match self {
            PatternMacro::Date => "DATE",
            PatternMacro::Hour => "HOUR",
            PatternMacro::Minute => "MINUTE",
            PatternMacro::Second => "SECOND",
            PatternMacro::Timestamp => "TIMESTAMP",
            PatternMacro::Invalid => "",
        }
    }

    /// Next finer macro in the hierarchy.
    pub fn child(self) -> Option<PatternMacro> {
        match self {
            PatternMacro::Date => Some(PatternMacro::Hour),
            PatternMacro::Hour => Some(PatternMacro::Minute),
            PatternMacro::Minute => Some(PatternMacro::Second),
            _ => None,
        }
    }

    /// Unit width in seconds.
    pub fn unit_seconds(self) -> Option<i64> {
        match self {
            PatternMacro::Date => Some(DAY_SECONDS),
            PatternMacro::Hour => Some(HOUR_SECONDS),
            PatternMacro::Minute => Some(MINUTE_SECONDS),
            PatternMacro::Second => Some(1),
            _ => None,
        }
    }

    /// How many child units fit into one unit of this macro.
    pub fn child_count(self) -> Option<i64> {
        match self {
            PatternMacro::Date => Some(DAY_HOURS),
            PatternMacro::Hour => Some(HOUR_MINUTES),
            PatternMacro::Minute => Some(MINUTE_SECONDS),
            _ => None,
        }
    }

    /// Classify a path template by the macros it contains.
    pub fn extract(template: &str) -> PatternMacro {
        let ts = template.contains(PatternMacro::Timestamp.token());
        let date = template.contains(PatternMacro::Date.token());
        let hour = template.contains(PatternMacro::Hour.token());
        let minute = template.contains(PatternMacro::Minute.token());
        let second = template.contains(PatternMacro::Second.token());

        if second && minute && hour && date {
            return PatternMacro::Second;
        }
        if minute && hour && date {
            return PatternMacro::Minute;
        }
        if hour && date && !second {
            return PatternMacro::Hour;
        }
        if date && !minute && !second {
            return PatternMacro::Date;
        }
        if ts && !date && !hour && !minute && !second {
            return PatternMacro::Timestamp;
        }

        PatternMacro::Invalid
    }
}
