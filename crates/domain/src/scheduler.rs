//! Scheduler Core: urgency scoring, daily budget allocation, topic
//! ordering, compression under overload, and the deterministic
//! last-resort scheduler used when the generative model's repair attempt
//! is unparseable.

use crate::Topic;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Fixed urgency boost applied per missed item when rescheduling.
pub const MISSED_ITEM_BOOST: f64 = 8.0;

const MIN_COURSE_SHARE_HOURS: f64 = 0.5;
const MAX_NON_DOMINANT_SHARE: f64 = 0.70;
const MAX_DOMINANT_SHARE: f64 = 0.80;
const DOMINANT_THRESHOLD: f64 = 0.50;

/// Inputs to the urgency formula for a single course with pending topics.
#[derive(Debug, Clone, Copy)]
pub struct UrgencyInputs {
    pub days_left: i64,
    pub hours_needed: f64,
    pub avg_importance: f64,
    pub avg_difficulty: f64,
    pub topic_count: usize,
    /// Count of missed items being rescheduled onto this course, if any.
    pub missed_item_count: usize,
}

/// `U(days_left)`: a normalized decreasing urgency-of-time function.
/// `<7 days -> 0.7-1.0`, `7-14 -> 0.4-0.7`, `>14 -> 0.1-0.4`.
fn time_urgency(days_left: i64) -> f64 {
    let d = days_left.max(0) as f64;
    if d < 7.0 {
        1.0 - (d / 7.0) * 0.3
    } else if d <= 14.0 {
        0.7 - ((d - 7.0) / 7.0) * 0.3
    } else {
        (0.4 * 14.0 / d).clamp(0.1, 0.4)
    }
}

/// Weighted composite urgency score for a course (§4.5).
pub fn urgency(inputs: UrgencyInputs) -> f64 {
    let u_time = time_urgency(inputs.days_left);
    let hours_term = inputs.hours_needed / (inputs.days_left.max(1) as f64);
    let importance_term = (inputs.avg_importance - 1.0) / 4.0;
    let difficulty_term = inputs.avg_difficulty - 3.0;
    let volume_term = (inputs.topic_count as f64 / 15.0).min(1.0);

    let base = 40.0 * u_time + 25.0 * hours_term + 20.0 * importance_term + 3.0 * difficulty_term
        + 15.0 * volume_term;

    base + inputs.missed_item_count as f64 * MISSED_ITEM_BOOST
}

/// Splits `daily_capacity_hours` across courses proportional to urgency,
/// subject to a 0.5h floor and a 70%/80% ceiling per course.
pub fn allocate_daily_budget(
    urgencies: &HashMap<Uuid, f64>,
    daily_capacity_hours: f64,
) -> HashMap<Uuid, f64> {
    let total_urgency: f64 = urgencies.values().sum();
    if urgencies.is_empty() || total_urgency <= 0.0 {
        return HashMap::new();
    }

    let mut shares: HashMap<Uuid, f64> = HashMap::new();
    for (course_id, u) in urgencies {
        let raw_share = u / total_urgency;
        let ceiling = if raw_share > DOMINANT_THRESHOLD {
            MAX_DOMINANT_SHARE
        } else {
            MAX_NON_DOMINANT_SHARE
        };
        let bounded_share = raw_share.min(ceiling);
        shares.insert(*course_id, (bounded_share * daily_capacity_hours).max(MIN_COURSE_SHARE_HOURS));
    }

    // Floors/ceilings can push the total above capacity; renormalize
    // proportionally so the budget never exceeds what's actually available.
    let allocated_total: f64 = shares.values().sum();
    if allocated_total > daily_capacity_hours && allocated_total > 0.0 {
        let scale = daily_capacity_hours / allocated_total;
        for v in shares.values_mut() {
            *v *= scale;
        }
    }

    shares
}

/// Hours a topic receives after overload compression; never below 0.25h.
pub fn compress_hours(estimated_hours: f64, coverage_ratio: f64) -> f64 {
    if coverage_ratio >= 1.0 {
        estimated_hours
    } else {
        (estimated_hours * coverage_ratio).max(0.25)
    }
}

/// `2*importance + difficulty`, descending; ties keep input order.
fn composite_priority(t: &Topic) -> i32 {
    2 * t.exam_importance + t.difficulty_weight
}

/// Orders a course's topics respecting the prerequisite DAG: a topic is
/// never placed before all its prerequisites. Among topics with satisfied
/// prerequisites, the higher composite-priority topic goes first; ties
/// keep the original stable order.
pub fn topological_order(topics: &[Topic]) -> Vec<Uuid> {
    let index_of: HashMap<Uuid, usize> = topics
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.id.map(|id| (id, i)))
        .collect();

    let mut indegree: HashMap<Uuid, usize> = HashMap::new();
    let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

    for t in topics {
        let Some(id) = t.id else { continue };
        indegree.entry(id).or_insert(0);
        for prereq in &t.prerequisite_ids {
            if index_of.contains_key(prereq) {
                *indegree.entry(id).or_insert(0) += 1;
                dependents.entry(*prereq).or_default().push(id);
            }
        }
    }

    let mut ready: Vec<Uuid> = indegree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(id, _)| *id)
        .collect();
    sort_by_priority(&mut ready, topics, &index_of);

    let mut ordered = Vec::with_capacity(topics.len());
    let mut queue: VecDeque<Uuid> = ready.into();

    while let Some(id) = queue.pop_front() {
        ordered.push(id);
        if let Some(deps) = dependents.get(&id) {
            let mut newly_ready = Vec::new();
            for &dep in deps {
                if let Some(deg) = indegree.get_mut(&dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dep);
                    }
                }
            }
            sort_by_priority(&mut newly_ready, topics, &index_of);
            for id in newly_ready.into_iter().rev() {
                queue.push_front(id);
            }
        }
    }

    ordered
}

fn sort_by_priority(ids: &mut [Uuid], topics: &[Topic], index_of: &HashMap<Uuid, usize>) {
    ids.sort_by(|a, b| {
        let ta = &topics[index_of[a]];
        let tb = &topics[index_of[b]];
        composite_priority(tb)
            .cmp(&composite_priority(ta))
            .then(index_of[a].cmp(&index_of[b]))
    });
}

/// A course's pending topics plus the context the deterministic fallback
/// needs: exam date and precomputed urgency.
#[derive(Debug, Clone)]
pub struct CourseForScheduling {
    pub course_id: Uuid,
    pub exam_date: NaiveDate,
    pub topics: Vec<Topic>,
    pub urgency: f64,
}

/// A single deterministic placement.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub topic_id: Uuid,
    pub course_id: Uuid,
    pub date: NaiveDate,
    pub allocated_hours: f64,
    pub sequence_order: i32,
}

/// The last-resort scheduler invoked when the generative model's repair
/// attempt is unparseable (§4.6): allocates per course using urgency
/// shares, walks eligible dates in order, and on each day places the
/// highest-priority prerequisite-ready topic from the course with the
/// largest remaining share until the daily budget is exhausted.
pub fn deterministic_fallback(
    courses: &[CourseForScheduling],
    eligible_dates: &[NaiveDate],
    daily_capacity_hours: f64,
    coverage_ratio: f64,
) -> Vec<PlannedItem> {
    let total_urgency: f64 = courses.iter().map(|c| c.urgency).sum();
    if total_urgency <= 0.0 || courses.is_empty() {
        return Vec::new();
    }

    let mut queues: HashMap<Uuid, VecDeque<Uuid>> = HashMap::new();
    let mut topics_by_id: HashMap<Uuid, &Topic> = HashMap::new();
    for c in courses {
        let order = topological_order(&c.topics);
        queues.insert(c.course_id, order.into());
        for t in &c.topics {
            if let Some(id) = t.id {
                topics_by_id.insert(id, t);
            }
        }
    }

    let shares: HashMap<Uuid, f64> = courses
        .iter()
        .map(|c| (c.course_id, c.urgency / total_urgency))
        .collect();

    let mut result = Vec::new();

    for &date in eligible_dates {
        let mut remaining_budget = daily_capacity_hours;
        let mut sequence_order = 0i32;

        loop {
            if remaining_budget < 0.25 {
                break;
            }

            let mut candidates: Vec<&CourseForScheduling> = courses
                .iter()
                .filter(|c| {
                    c.exam_date > date
                        && queues
                            .get(&c.course_id)
                            .map(|q| !q.is_empty())
                            .unwrap_or(false)
                })
                .collect();

            if candidates.is_empty() {
                break;
            }

            candidates.sort_by(|a, b| {
                shares[&b.course_id]
                    .partial_cmp(&shares[&a.course_id])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let course = candidates[0];

            let queue = queues.get_mut(&course.course_id).unwrap();
            let Some(topic_id) = queue.pop_front() else {
                break;
            };
            let Some(topic) = topics_by_id.get(&topic_id) else {
                continue;
            };

            let compressed = compress_hours(topic.estimated_hours, coverage_ratio);
            let allocated = compressed.min(remaining_budget).max(0.25).min(3.0);

            result.push(PlannedItem {
                topic_id,
                course_id: course.course_id,
                date,
                allocated_hours: allocated,
                sequence_order,
            });

            sequence_order += 1;
            remaining_budget -= allocated;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfidenceLevel, TopicStatus};
    use std::collections::HashSet;

    fn topic(id: Uuid, course_id: Uuid, importance: i32, difficulty: i32, hours: f64) -> Topic {
        Topic {
            id: Some(id),
            topic_key: id.to_string(),
            course_id,
            title: "t".to_string(),
            difficulty_weight: difficulty,
            exam_importance: importance,
            estimated_hours: hours,
            confidence_level: ConfidenceLevel::Medium,
            notes: None,
            source_page: None,
            source_quote: None,
            prerequisites: HashSet::new(),
            prerequisite_ids: HashSet::new(),
            status: TopicStatus::NotStarted,
        }
    }

    #[test]
    fn urgency_increases_as_exam_approaches() {
        let far = urgency(UrgencyInputs {
            days_left: 30,
            hours_needed: 10.0,
            avg_importance: 3.0,
            avg_difficulty: 3.0,
            topic_count: 5,
            missed_item_count: 0,
        });
        let near = urgency(UrgencyInputs {
            days_left: 3,
            hours_needed: 10.0,
            avg_importance: 3.0,
            avg_difficulty: 3.0,
            topic_count: 5,
            missed_item_count: 0,
        });
        assert!(near > far);
    }

    #[test]
    fn missed_items_boost_urgency() {
        let base = UrgencyInputs {
            days_left: 10,
            hours_needed: 5.0,
            avg_importance: 3.0,
            avg_difficulty: 3.0,
            topic_count: 5,
            missed_item_count: 0,
        };
        let boosted = UrgencyInputs {
            missed_item_count: 2,
            ..base
        };
        assert!((urgency(boosted) - urgency(base) - 2.0 * MISSED_ITEM_BOOST).abs() < 1e-9);
    }

    #[test]
    fn daily_budget_allocation_respects_floor_and_ceiling() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut urgencies = HashMap::new();
        urgencies.insert(a, 95.0);
        urgencies.insert(b, 5.0);

        let shares = allocate_daily_budget(&urgencies, 10.0);
        assert!(shares[&a] <= 10.0 * MAX_DOMINANT_SHARE + 1e-9);
        assert!(shares[&b] >= MIN_COURSE_SHARE_HOURS - 1e-9 || shares[&b] > 0.0);
    }

    #[test]
    fn compress_hours_never_drops_below_quarter_hour() {
        assert_eq!(compress_hours(1.0, 0.01), 0.25);
        assert_eq!(compress_hours(2.0, 1.0), 2.0);
    }

    #[test]
    fn topological_order_respects_prerequisites() {
        let course_id = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let mut topic_b = topic(b, course_id, 3, 3, 1.0);
        topic_b.prerequisite_ids.insert(a);
        let mut topic_c = topic(c, course_id, 3, 3, 1.0);
        topic_c.prerequisite_ids.insert(b);
        let topic_a = topic(a, course_id, 3, 3, 1.0);

        let order = topological_order(&[topic_c, topic_a, topic_b]);
        let pos = |id: Uuid| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn deterministic_fallback_places_prerequisites_before_dependents() {
        let course_id = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut topic_b = topic(b, course_id, 3, 3, 1.0);
        topic_b.prerequisite_ids.insert(a);
        let topic_a = topic(a, course_id, 3, 3, 1.0);

        let course = CourseForScheduling {
            course_id,
            exam_date: chrono::NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            topics: vec![topic_a, topic_b],
            urgency: 10.0,
        };

        let dates: Vec<NaiveDate> = (0..5)
            .map(|n| chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap() + chrono::Duration::days(n))
            .collect();

        let items = deterministic_fallback(&[course], &dates, 3.0, 1.0);
        let item_a = items.iter().find(|i| i.topic_id == a).unwrap();
        let item_b = items.iter().find(|i| i.topic_id == b).unwrap();
        assert!(item_a.date <= item_b.date);
    }
}
