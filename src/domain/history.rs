use chrono::{DateTime, NaiveDate, Utc};

/// Which slice of an account's history a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    /// Every operation, in creation order
    All,
    /// Operations with `from <= created_at <= to`
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl HistoryWindow {
    /// Resolve optional caller bounds into a window.
    ///
    /// Supplying either bound switches to ranged mode; the missing side is
    /// filled with [`history_floor`] or [`history_ceiling`]. Bounds beyond
    /// those limits are clamped to them.
    pub fn resolve(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self, InvalidWindow> {
        if from.is_none() && to.is_none() {
            return Ok(HistoryWindow::All);
        }

        let (floor, ceiling) = (history_floor(), history_ceiling());
        let from = from.unwrap_or(floor).clamp(floor, ceiling);
        let to = to.unwrap_or(ceiling).clamp(floor, ceiling);
        if from > to {
            return Err(InvalidWindow { from, to });
        }

        Ok(HistoryWindow::Range { from, to })
    }
}

/// Earliest instant a ranged query can ask for.
/// Kept within four-digit years so stored timestamps compare lexically.
pub fn history_floor() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Latest instant a ranged query can ask for.
pub fn history_ceiling() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl std::fmt::Display for InvalidWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "range start {} is after range end {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidWindow {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_bounds_is_all() {
        assert_eq!(HistoryWindow::resolve(None, None), Ok(HistoryWindow::All));
    }

    #[test]
    fn test_both_bounds() {
        let window = HistoryWindow::resolve(Some(at(1)), Some(at(10))).unwrap();
        assert_eq!(
            window,
            HistoryWindow::Range {
                from: at(1),
                to: at(10)
            }
        );
    }

    #[test]
    fn test_only_from_is_still_ranged() {
        let window = HistoryWindow::resolve(Some(at(5)), None).unwrap();
        assert_eq!(
            window,
            HistoryWindow::Range {
                from: at(5),
                to: history_ceiling()
            }
        );
    }

    #[test]
    fn test_only_to_is_still_ranged() {
        let window = HistoryWindow::resolve(None, Some(at(5))).unwrap();
        assert_eq!(
            window,
            HistoryWindow::Range {
                from: history_floor(),
                to: at(5)
            }
        );
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = HistoryWindow::resolve(Some(at(10)), Some(at(1))).unwrap_err();
        assert_eq!(err.from, at(10));
        assert_eq!(err.to, at(1));
    }

    #[test]
    fn test_bounds_outside_four_digit_years_are_clamped() {
        let far_future = Utc.with_ymd_and_hms(12000, 1, 1, 0, 0, 0).unwrap();
        let far_past = Utc.with_ymd_and_hms(-50, 1, 1, 0, 0, 0).unwrap();

        let window = HistoryWindow::resolve(Some(far_past), Some(far_future)).unwrap();
        assert_eq!(
            window,
            HistoryWindow::Range {
                from: history_floor(),
                to: history_ceiling()
            }
        );

        // Both beyond the ceiling: an empty but valid window
        let window = HistoryWindow::resolve(Some(far_future), None).unwrap();
        assert_eq!(
            window,
            HistoryWindow::Range {
                from: history_ceiling(),
                to: history_ceiling()
            }
        );
    }

    #[test]
    fn test_sentinels_are_four_digit_years() {
        assert!(history_floor().to_rfc3339().starts_with("0001-01-01"));
        assert!(history_ceiling().to_rfc3339().starts_with("9999-12-31"));
    }
}
