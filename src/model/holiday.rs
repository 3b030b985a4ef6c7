use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holiday {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub date: NaiveDate,
    pub is_paid: bool,
}

/// Which days count as non-working for the employees the policy is assigned
/// to. Stored as a tagged JSON record; unknown shapes fail at decode rather
/// than being silently skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeekOffPattern {
    /// Fixed weekdays off every week, e.g. Saturday and Sunday.
    Weekly { weekdays: Vec<String> },
    /// A weekday off only on given occurrences within the month,
    /// e.g. 1st and 3rd Saturday.
    MonthlyOccurrence { weekday: String, occurrences: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeekOffPolicy {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub pattern: sqlx::types::Json<WeekOffPattern>,
}

fn weekday_matches(name: &str, weekday: Weekday) -> bool {
    let parsed = match name.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    };
    parsed == Some(weekday)
}

impl WeekOffPattern {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            WeekOffPattern::Weekly { weekdays } => weekdays
                .iter()
                .any(|name| weekday_matches(name, date.weekday())),
            WeekOffPattern::MonthlyOccurrence {
                weekday,
                occurrences,
            } => {
                if !weekday_matches(weekday, date.weekday()) {
                    return false;
                }
                // 1-based occurrence of this weekday within the month
                let occurrence = ((date.day() - 1) / 7 + 1) as u8;
                occurrences.contains(&occurrence)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn weekly_pattern_matches_listed_weekdays() {
        let pattern = WeekOffPattern::Weekly {
            weekdays: vec!["sat".into(), "sun".into()],
        };
        assert!(pattern.matches(d("2026-03-07"))); // Saturday
        assert!(pattern.matches(d("2026-03-08"))); // Sunday
        assert!(!pattern.matches(d("2026-03-09"))); // Monday
    }

    #[test]
    fn monthly_occurrence_matches_first_and_third_saturday() {
        let pattern = WeekOffPattern::MonthlyOccurrence {
            weekday: "saturday".into(),
            occurrences: vec![1, 3],
        };
        assert!(pattern.matches(d("2026-03-07"))); // 1st Saturday
        assert!(!pattern.matches(d("2026-03-14"))); // 2nd Saturday
        assert!(pattern.matches(d("2026-03-21"))); // 3rd Saturday
        assert!(!pattern.matches(d("2026-03-20"))); // a Friday
    }

    #[test]
    fn unknown_pattern_kind_is_refused_at_decode() {
        let raw = r#"{"kind":"units_of_production","units":10}"#;
        assert!(serde_json::from_str::<WeekOffPattern>(raw).is_err());
    }
}
