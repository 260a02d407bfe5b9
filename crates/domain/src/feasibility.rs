//! Feasibility Analyzer: required vs. available study hours, the hard
//! floor, and the coverage ratio that drives compression.

/// Hard floor per topic: every topic gets at least a quarter hour.
const MIN_HOURS_PER_TOPIC: f64 = 0.25;

/// Structured feasibility verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityVerdict {
    pub total_required_hours: f64,
    pub min_required_hours: f64,
    pub total_available_hours: f64,
    pub coverage_ratio: f64,
    pub feasible: bool,
    pub shortfall_hours: f64,
}

impl FeasibilityVerdict {
    /// `true` when feasible but coverage is below 1 — compression applies.
    pub fn is_overloaded(&self) -> bool {
        self.feasible && self.coverage_ratio < 1.0
    }

    pub fn suggestions(&self) -> Vec<String> {
        vec![
            "Reduce the number of topics in scope".to_string(),
            "Extend the planning horizon".to_string(),
            "Increase daily study hours".to_string(),
        ]
    }
}

/// Computes the feasibility verdict for a set of pending topics against an
/// enumerated list of eligible dates and a flat daily capacity.
pub fn analyze(
    topic_estimated_hours: &[f64],
    eligible_date_count: usize,
    daily_capacity_hours: f64,
) -> FeasibilityVerdict {
    let total_required_hours: f64 = topic_estimated_hours.iter().sum();
    let min_required_hours = topic_estimated_hours.len() as f64 * MIN_HOURS_PER_TOPIC;
    let total_available_hours = eligible_date_count as f64 * daily_capacity_hours;

    let coverage_ratio = if total_required_hours == 0.0 {
        1.0
    } else {
        total_available_hours / total_required_hours
    };

    let feasible = total_available_hours >= min_required_hours;
    let shortfall_hours = (min_required_hours - total_available_hours).max(0.0);

    FeasibilityVerdict {
        total_required_hours,
        min_required_hours,
        total_available_hours,
        coverage_ratio,
        feasible,
        shortfall_hours,
    }
}
