//! Pool predicates for classifying tickets
//!
//! A pool is a conjunction of filters over a ticket's search fields and
//! creation time. Match profiles are built from named pools; the pipeline
//! evaluates each pool against every claimed ticket before handing the
//! per-pool ticket lists to a match function.

use chrono::{DateTime, Utc};

use crate::types::Ticket;

/// Which bounds of a double-range filter are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeExclusion {
    /// `[min, max]`
    None,
    /// `(min, max]`
    Min,
    /// `[min, max)`
    Max,
    /// `(min, max)`
    Both,
}

/// Numeric range filter over a `double_args` entry
#[derive(Debug, Clone)]
pub struct DoubleRangeFilter {
    pub double_arg: String,
    pub min: f64,
    pub max: f64,
    pub exclude: RangeExclusion,
}

impl DoubleRangeFilter {
    pub fn new(double_arg: impl Into<String>, min: f64, max: f64, exclude: RangeExclusion) -> Self {
        Self {
            double_arg: double_arg.into(),
            min,
            max,
            exclude,
        }
    }

    // Raw float comparisons so that NaN fails every exclusion mode.
    fn is_in_range(&self, v: f64) -> bool {
        match self.exclude {
            RangeExclusion::None => self.min <= v && v <= self.max,
            RangeExclusion::Min => self.min < v && v <= self.max,
            RangeExclusion::Max => self.min <= v && v < self.max,
            RangeExclusion::Both => self.min < v && v < self.max,
        }
    }
}

/// Exact-match filter over a `string_args` entry
#[derive(Debug, Clone)]
pub struct StringEqualsFilter {
    pub string_arg: String,
    pub value: String,
}

impl StringEqualsFilter {
    pub fn new(string_arg: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            string_arg: string_arg.into(),
            value: value.into(),
        }
    }
}

/// Filter requiring a tag to be present on the ticket
#[derive(Debug, Clone)]
pub struct TagPresentFilter {
    pub tag: String,
}

impl TagPresentFilter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// Named predicate selecting tickets that share compatible attributes
#[derive(Debug, Clone)]
pub struct Pool {
    pub name: String,
    pub double_range_filters: Vec<DoubleRangeFilter>,
    pub string_equals_filters: Vec<StringEqualsFilter>,
    pub tag_present_filters: Vec<TagPresentFilter>,
    /// Exclusive lower bound on `created_at`; `None` disables the bound.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`; `None` disables the bound.
    pub created_before: Option<DateTime<Utc>>,
}

impl Pool {
    /// Create a pool with no filters; every ticket is in it.
    pub fn unfiltered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            double_range_filters: Vec::new(),
            string_equals_filters: Vec::new(),
            tag_present_filters: Vec::new(),
            created_after: None,
            created_before: None,
        }
    }

    /// Evaluate the pool predicate against a ticket.
    ///
    /// Deterministic: depends only on the ticket's search fields and
    /// creation time.
    pub fn contains(&self, ticket: &Ticket) -> bool {
        self.matches_created_time(ticket.created_at)
            && self.matches_double_ranges(ticket)
            && self.matches_string_equals(ticket)
            && self.matches_tags(ticket)
    }

    fn matches_created_time(&self, created_at: DateTime<Utc>) -> bool {
        if let Some(after) = self.created_after {
            if created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if created_at >= before {
                return false;
            }
        }
        true
    }

    fn matches_double_ranges(&self, ticket: &Ticket) -> bool {
        self.double_range_filters.iter().all(|f| {
            ticket
                .search_fields
                .double_args
                .get(&f.double_arg)
                .is_some_and(|v| f.is_in_range(*v))
        })
    }

    fn matches_string_equals(&self, ticket: &Ticket) -> bool {
        self.string_equals_filters.iter().all(|f| {
            ticket
                .search_fields
                .string_args
                .get(&f.string_arg)
                .is_some_and(|v| *v == f.value)
        })
    }

    fn matches_tags(&self, ticket: &Ticket) -> bool {
        self.tag_present_filters
            .iter()
            .all(|f| ticket.search_fields.has_tag(&f.tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchFields;
    use crate::utils::current_timestamp;
    use chrono::Duration;
    use std::collections::HashMap;

    fn ticket_with_fields(search_fields: SearchFields) -> Ticket {
        Ticket {
            id: "tkt".to_string(),
            assignment: None,
            search_fields,
            extensions: Vec::new(),
            persistent_field: HashMap::new(),
            created_at: current_timestamp(),
        }
    }

    fn ticket_with_double(arg: &str, v: f64) -> Ticket {
        ticket_with_fields(SearchFields {
            double_args: HashMap::from([(arg.to_string(), v)]),
            ..Default::default()
        })
    }

    #[test]
    fn test_unfiltered_pool_contains_everything() {
        let pool = Pool::unfiltered("everyone");
        let ticket = ticket_with_fields(SearchFields::default());
        assert!(pool.contains(&ticket));
    }

    #[test]
    fn test_double_range_exclusion_modes() {
        let cases = [
            (RangeExclusion::None, [true, true, true]),
            (RangeExclusion::Min, [false, true, true]),
            (RangeExclusion::Max, [true, true, false]),
            (RangeExclusion::Both, [false, true, false]),
        ];

        for (exclude, expected) in cases {
            let mut pool = Pool::unfiltered("ranked");
            pool.double_range_filters
                .push(DoubleRangeFilter::new("mmr", 1000.0, 2000.0, exclude));

            let at_min = pool.contains(&ticket_with_double("mmr", 1000.0));
            let inside = pool.contains(&ticket_with_double("mmr", 1500.0));
            let at_max = pool.contains(&ticket_with_double("mmr", 2000.0));
            assert_eq!(
                [at_min, inside, at_max],
                expected,
                "exclusion mode {exclude:?}"
            );
        }
    }

    #[test]
    fn test_double_range_rejects_nan_in_all_modes() {
        for exclude in [
            RangeExclusion::None,
            RangeExclusion::Min,
            RangeExclusion::Max,
            RangeExclusion::Both,
        ] {
            let mut pool = Pool::unfiltered("ranked");
            pool.double_range_filters
                .push(DoubleRangeFilter::new("mmr", 0.0, 100.0, exclude));
            assert!(
                !pool.contains(&ticket_with_double("mmr", f64::NAN)),
                "NaN accepted by {exclude:?}"
            );
        }
    }

    #[test]
    fn test_double_range_missing_arg_fails() {
        let mut pool = Pool::unfiltered("ranked");
        pool.double_range_filters.push(DoubleRangeFilter::new(
            "mmr",
            0.0,
            100.0,
            RangeExclusion::None,
        ));
        let ticket = ticket_with_fields(SearchFields::default());
        assert!(!pool.contains(&ticket));
    }

    #[test]
    fn test_string_equals_filter() {
        let mut pool = Pool::unfiltered("duelists");
        pool.string_equals_filters
            .push(StringEqualsFilter::new("mode", "1vs1"));

        let matching = ticket_with_fields(SearchFields {
            string_args: HashMap::from([("mode".to_string(), "1vs1".to_string())]),
            ..Default::default()
        });
        let wrong_value = ticket_with_fields(SearchFields {
            string_args: HashMap::from([("mode".to_string(), "2vs2".to_string())]),
            ..Default::default()
        });
        let missing = ticket_with_fields(SearchFields::default());

        assert!(pool.contains(&matching));
        assert!(!pool.contains(&wrong_value));
        assert!(!pool.contains(&missing));
    }

    #[test]
    fn test_tag_present_filter() {
        let mut pool = Pool::unfiltered("casual");
        pool.tag_present_filters.push(TagPresentFilter::new("casual"));

        let tagged = ticket_with_fields(SearchFields {
            tags: vec!["ranked".to_string(), "casual".to_string()],
            ..Default::default()
        });
        let untagged = ticket_with_fields(SearchFields {
            tags: vec!["ranked".to_string()],
            ..Default::default()
        });

        assert!(pool.contains(&tagged));
        assert!(!pool.contains(&untagged));
    }

    #[test]
    fn test_created_time_bounds_are_exclusive() {
        let now = current_timestamp();
        let ticket = ticket_with_fields(SearchFields::default());

        let mut pool = Pool::unfiltered("fresh");
        pool.created_after = Some(now - Duration::seconds(60));
        pool.created_before = Some(now + Duration::seconds(60));
        assert!(pool.contains(&ticket));

        // A bound equal to created_at excludes the ticket.
        pool.created_after = Some(ticket.created_at);
        assert!(!pool.contains(&ticket));

        pool.created_after = None;
        pool.created_before = Some(ticket.created_at);
        assert!(!pool.contains(&ticket));
    }

    #[test]
    fn test_all_filters_are_a_conjunction() {
        let mut pool = Pool::unfiltered("strict");
        pool.double_range_filters.push(DoubleRangeFilter::new(
            "mmr",
            0.0,
            100.0,
            RangeExclusion::None,
        ));
        pool.tag_present_filters.push(TagPresentFilter::new("casual"));

        let only_mmr = ticket_with_double("mmr", 50.0);
        assert!(!pool.contains(&only_mmr));

        let both = ticket_with_fields(SearchFields {
            double_args: HashMap::from([("mmr".to_string(), 50.0)]),
            tags: vec!["casual".to_string()],
            ..Default::default()
        });
        assert!(pool.contains(&both));
    }
}
