//! Calendar segmentation for sources that publish per year or per month.
//!
//! A requested range is cut into contiguous half-open segments
//! `[start, end)` aligned on calendar boundaries. Each segment maps to one
//! source identifier through a URL template.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPeriod {
    Year,
    Month,
}

impl SegmentPeriod {
    /// Start of the period containing `ts`.
    pub fn floor(self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            SegmentPeriod::Year => first_of_month(ts.year(), 1),
            SegmentPeriod::Month => first_of_month(ts.year(), ts.month()),
        }
    }

    /// Start of the period following the one starting at `start`.
    pub fn next(self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            SegmentPeriod::Year => first_of_month(start.year() + 1, 1),
            SegmentPeriod::Month if start.month() == 12 => first_of_month(start.year() + 1, 1),
            SegmentPeriod::Month => first_of_month(start.year(), start.month() + 1),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One calendar period, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Segment {
    /// Still receiving data: `now - grace` falls before the segment's end.
    pub fn is_open(&self, now: NaiveDateTime, grace: Duration) -> bool {
        now - grace < self.end
    }
}

/// Partition `[start, end]` into calendar segments.
///
/// The first segment starts at the period floor of `start`; segments are
/// emitted while their start is `<= end`.
pub fn segments(period: SegmentPeriod, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Segment> {
    let mut out = Vec::new();
    let Some(mut seg_start) = period.floor(start) else {
        return out;
    };
    while seg_start <= end {
        let Some(seg_end) = period.next(seg_start) else {
            break;
        };
        out.push(Segment {
            start: seg_start,
            end: seg_end,
        });
        seg_start = seg_end;
    }
    out
}

/// How a segmented source is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub period: SegmentPeriod,
    /// Earliest date the source publishes.
    pub history_start: NaiveDate,
    /// Reporting lag tolerated at the end of an elapsed segment.
    pub coverage_margin: Duration,
    /// A segment counts as open until `now - open_grace` passes its end.
    pub open_grace: Duration,
    /// Placeholders: `{year}`, `{month}`, `{start}`, `{end}` (dates as `%Y-%m-%d`).
    pub url_template: String,
}

impl SegmentPlan {
    pub fn source_id(&self, segment: &Segment) -> String {
        self.url_template
            .replace("{year}", &segment.start.year().to_string())
            .replace("{month}", &format!("{:02}", segment.start.month()))
            .replace("{start}", &segment.start.format("%Y-%m-%d").to_string())
            .replace("{end}", &segment.end.format("%Y-%m-%d").to_string())
    }

    /// Last timestamp a complete cached segment must reach.
    pub fn required_coverage(&self, segment: &Segment) -> NaiveDateTime {
        segment.end - self.coverage_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn yearly_segments_cover_range() {
        let segs = segments(SegmentPeriod::Year, at(2014, 6, 15), at(2016, 1, 1));
        assert_eq!(
            segs,
            vec![
                Segment {
                    start: at(2014, 1, 1),
                    end: at(2015, 1, 1),
                },
                Segment {
                    start: at(2015, 1, 1),
                    end: at(2016, 1, 1),
                },
                Segment {
                    start: at(2016, 1, 1),
                    end: at(2017, 1, 1),
                },
            ]
        );
    }

    #[test]
    fn monthly_segments_roll_over_december() {
        let segs = segments(SegmentPeriod::Month, at(2019, 11, 20), at(2020, 2, 1));
        let starts: Vec<_> = segs.iter().map(|s| s.start).collect();
        assert_eq!(
            starts,
            vec![at(2019, 11, 1), at(2019, 12, 1), at(2020, 1, 1), at(2020, 2, 1)]
        );
        assert_eq!(segs[1].end, at(2020, 1, 1));
    }

    #[test]
    fn empty_when_end_precedes_start() {
        assert!(segments(SegmentPeriod::Month, at(2020, 5, 1), at(2020, 4, 1)).is_empty());
    }

    #[test]
    fn open_respects_grace() {
        let seg = Segment {
            start: at(2020, 1, 1),
            end: at(2020, 2, 1),
        };
        assert!(seg.is_open(at(2020, 1, 31), Duration::zero()));
        assert!(!seg.is_open(at(2020, 2, 1), Duration::zero()));
        assert!(seg.is_open(at(2020, 2, 1) + Duration::hours(12), Duration::days(1)));
        assert!(!seg.is_open(at(2020, 2, 3), Duration::days(1)));
    }

    #[test]
    fn template_expansion() {
        let plan = SegmentPlan {
            period: SegmentPeriod::Month,
            history_start: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            coverage_margin: Duration::hours(3),
            open_grace: Duration::days(1),
            url_template: "http://x/data?from={start}&to={end}&y={year}&m={month}".into(),
        };
        let seg = Segment {
            start: at(2020, 3, 1),
            end: at(2020, 4, 1),
        };
        assert_eq!(
            plan.source_id(&seg),
            "http://x/data?from=2020-03-01&to=2020-04-01&y=2020&m=03"
        );
        assert_eq!(
            plan.required_coverage(&seg),
            at(2020, 3, 31) + Duration::hours(21)
        );
    }
}
