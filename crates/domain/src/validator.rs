//! Schedule Validator: an independent, predicate-based check of a proposed
//! schedule against the topic graph and calendar constraints. Never
//! generates a schedule itself — only judges one.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Everything the validator needs about the topic graph and calendar,
/// assembled independently of whatever produced the proposed schedule.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub eligible_dates: HashSet<NaiveDate>,
    pub exam_dates: HashMap<Uuid, NaiveDate>,
    pub topic_owners: HashMap<Uuid, Uuid>,
    pub prerequisites: HashMap<Uuid, HashSet<Uuid>>,
}

/// A single item in the schedule under review.
#[derive(Debug, Clone)]
pub struct ProposedItem {
    pub topic_id: Uuid,
    pub course_id: Uuid,
    pub date: NaiveDate,
    pub allocated_hours: f64,
    pub sequence_order: i32,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown topic {0}")]
    UnknownTopic(Uuid),
    #[error("unknown course {0}")]
    UnknownCourse(Uuid),
    #[error("topic {topic_id} placed on {date}, outside the eligible-date set")]
    DateNotEligible { topic_id: Uuid, date: NaiveDate },
    #[error("topic {topic_id} placed on or after its course's exam date")]
    OnOrAfterExamDate { topic_id: Uuid, date: NaiveDate },
    #[error("topic {topic_id} placed under course {actual}, owned by {expected}")]
    WrongCourse {
        topic_id: Uuid,
        expected: Uuid,
        actual: Uuid,
    },
    #[error("prerequisite {prerequisite_id} of {topic_id} missing from the schedule")]
    MissingPrerequisite {
        topic_id: Uuid,
        prerequisite_id: Uuid,
    },
    #[error("prerequisite {prerequisite_id} placed after dependent {dependent_id}")]
    PrerequisiteAfterDependent {
        prerequisite_id: Uuid,
        dependent_id: Uuid,
    },
    #[error(
        "prerequisite {prerequisite_id} shares a day with dependent {dependent_id} but does not precede it in sequence order"
    )]
    PrerequisiteOrderConflict {
        prerequisite_id: Uuid,
        dependent_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    DailyOverload {
        date: NaiveDate,
        total_hours: f64,
        capacity: f64,
    },
    FewerTopicsScheduled {
        scheduled: usize,
        provided: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First ten error messages, used to prime the repair-loop prompt.
    pub fn first_errors(&self, n: usize) -> Vec<String> {
        self.errors.iter().take(n).map(|e| e.to_string()).collect()
    }
}

/// Overload threshold: daily hours beyond this multiple of capacity warn,
/// never fail.
const OVERLOAD_MULTIPLIER: f64 = 1.5;

/// Validates a flattened list of proposed items against the context.
pub fn validate(
    items: &[ProposedItem],
    ctx: &ValidationContext,
    daily_capacity_hours: f64,
    topics_provided: usize,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for item in items {
        let Some(&owner) = ctx.topic_owners.get(&item.topic_id) else {
            errors.push(ValidationError::UnknownTopic(item.topic_id));
            continue;
        };
        if !ctx.exam_dates.contains_key(&item.course_id) {
            errors.push(ValidationError::UnknownCourse(item.course_id));
            continue;
        }
        if owner != item.course_id {
            errors.push(ValidationError::WrongCourse {
                topic_id: item.topic_id,
                expected: owner,
                actual: item.course_id,
            });
        }
        if !ctx.eligible_dates.contains(&item.date) {
            errors.push(ValidationError::DateNotEligible {
                topic_id: item.topic_id,
                date: item.date,
            });
        }
        if let Some(&exam_date) = ctx.exam_dates.get(&owner) {
            if item.date >= exam_date {
                errors.push(ValidationError::OnOrAfterExamDate {
                    topic_id: item.topic_id,
                    date: item.date,
                });
            }
        }
    }

    // Earliest (date, sequence_order) placement per topic, for prerequisite checks.
    let mut earliest: HashMap<Uuid, (NaiveDate, i32)> = HashMap::new();
    for item in items {
        earliest
            .entry(item.topic_id)
            .and_modify(|e| {
                if (item.date, item.sequence_order) < *e {
                    *e = (item.date, item.sequence_order);
                }
            })
            .or_insert((item.date, item.sequence_order));
    }

    for (topic_id, prereqs) in &ctx.prerequisites {
        if !earliest.contains_key(topic_id) {
            continue; // topic itself unscheduled; already warned separately
        }
        let dependent_earliest = earliest[topic_id];
        for prereq_id in prereqs {
            match earliest.get(prereq_id) {
                None => errors.push(ValidationError::MissingPrerequisite {
                    topic_id: *topic_id,
                    prerequisite_id: *prereq_id,
                }),
                Some(&prereq_earliest) => {
                    if prereq_earliest.0 > dependent_earliest.0 {
                        errors.push(ValidationError::PrerequisiteAfterDependent {
                            prerequisite_id: *prereq_id,
                            dependent_id: *topic_id,
                        });
                    } else if prereq_earliest.0 == dependent_earliest.0
                        && prereq_earliest.1 >= dependent_earliest.1
                    {
                        errors.push(ValidationError::PrerequisiteOrderConflict {
                            prerequisite_id: *prereq_id,
                            dependent_id: *topic_id,
                        });
                    }
                }
            }
        }
    }

    let mut hours_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    for item in items {
        *hours_by_day.entry(item.date).or_insert(0.0) += item.allocated_hours;
    }
    for (date, total_hours) in hours_by_day {
        if total_hours > daily_capacity_hours * OVERLOAD_MULTIPLIER {
            warnings.push(ValidationWarning::DailyOverload {
                date,
                total_hours,
                capacity: daily_capacity_hours,
            });
        }
    }

    let scheduled: HashSet<Uuid> = items.iter().map(|i| i.topic_id).collect();
    if scheduled.len() < topics_provided {
        warnings.push(ValidationWarning::FewerTopicsScheduled {
            scheduled: scheduled.len(),
            provided: topics_provided,
        });
    }

    ValidationReport { errors, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_prereq(topic: Uuid, course: Uuid, prereq: Uuid, exam: NaiveDate) -> ValidationContext {
        let mut ctx = ValidationContext::default();
        ctx.exam_dates.insert(course, exam);
        ctx.topic_owners.insert(topic, course);
        ctx.topic_owners.insert(prereq, course);
        ctx.prerequisites.insert(topic, HashSet::from([prereq]));
        ctx.eligible_dates.insert(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        ctx.eligible_dates.insert(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        ctx
    }

    #[test]
    fn rejects_date_outside_eligible_set() {
        let course = Uuid::new_v4();
        let topic = Uuid::new_v4();
        let mut ctx = ValidationContext::default();
        ctx.exam_dates.insert(course, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        ctx.topic_owners.insert(topic, course);

        let items = vec![ProposedItem {
            topic_id: topic,
            course_id: course,
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            allocated_hours: 1.0,
            sequence_order: 0,
        }];
        let report = validate(&items, &ctx, 3.0, 1);
        assert!(report.errors.contains(&ValidationError::DateNotEligible {
            topic_id: topic,
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        }));
    }

    #[test]
    fn rejects_placement_on_or_after_exam_date() {
        let course = Uuid::new_v4();
        let topic = Uuid::new_v4();
        let exam = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let mut ctx = ValidationContext::default();
        ctx.exam_dates.insert(course, exam);
        ctx.topic_owners.insert(topic, course);
        ctx.eligible_dates.insert(exam);

        let items = vec![ProposedItem {
            topic_id: topic,
            course_id: course,
            date: exam,
            allocated_hours: 1.0,
            sequence_order: 0,
        }];
        let report = validate(&items, &ctx, 3.0, 1);
        assert!(matches!(
            report.errors[0],
            ValidationError::OnOrAfterExamDate { .. }
        ));
    }

    #[test]
    fn flags_prerequisite_placed_after_dependent() {
        let course = Uuid::new_v4();
        let dependent = Uuid::new_v4();
        let prereq = Uuid::new_v4();
        let exam = NaiveDate::from_ymd_opt(2026, 12, 1).unwrap();
        let ctx = ctx_with_prereq(dependent, course, prereq, exam);

        let items = vec![
            ProposedItem {
                topic_id: dependent,
                course_id: course,
                date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                allocated_hours: 1.0,
                sequence_order: 0,
            },
            ProposedItem {
                topic_id: prereq,
                course_id: course,
                date: NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
                allocated_hours: 1.0,
                sequence_order: 0,
            },
        ];
        let report = validate(&items, &ctx, 3.0, 2);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::PrerequisiteAfterDependent { .. })));
    }

    #[test]
    fn allows_same_day_prerequisite_with_strict_order() {
        let course = Uuid::new_v4();
        let dependent = Uuid::new_v4();
        let prereq = Uuid::new_v4();
        let exam = NaiveDate::from_ymd_opt(2026, 12, 1).unwrap();
        let ctx = ctx_with_prereq(dependent, course, prereq, exam);
        let day = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();

        let items = vec![
            ProposedItem {
                topic_id: prereq,
                course_id: course,
                date: day,
                allocated_hours: 1.0,
                sequence_order: 0,
            },
            ProposedItem {
                topic_id: dependent,
                course_id: course,
                date: day,
                allocated_hours: 1.0,
                sequence_order: 1,
            },
        ];
        let report = validate(&items, &ctx, 3.0, 2);
        assert!(report.is_valid());
    }

    #[test]
    fn warns_but_does_not_fail_on_overload() {
        let course = Uuid::new_v4();
        let topic = Uuid::new_v4();
        let mut ctx = ValidationContext::default();
        let exam = NaiveDate::from_ymd_opt(2026, 12, 1).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        ctx.exam_dates.insert(course, exam);
        ctx.topic_owners.insert(topic, course);
        ctx.eligible_dates.insert(day);

        let items = vec![ProposedItem {
            topic_id: topic,
            course_id: course,
            date: day,
            allocated_hours: 10.0,
            sequence_order: 0,
        }];
        let report = validate(&items, &ctx, 3.0, 1);
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }
}
