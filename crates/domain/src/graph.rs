//! Topic Graph Model: sanitizing raw extractor output into a validated,
//! acyclic, stably-identified topic set.

use crate::{ConfidenceLevel, Topic, TopicStatus};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Per-run cap on sanitized topics, independent of per-user quota.
const PER_RUN_CAP: usize = 50;

const MAX_TITLE_LEN: usize = 200;
const MAX_SOURCE_CONTEXT_LEN: usize = 100;

/// Failure modes that are programmer errors, not per-topic diagnostics.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("input is not a sequence of topic records")]
    InvalidInput,
    #[error("no valid topics after sanitization")]
    NoValidTopics,
}

/// A loosely-typed topic record as produced by the generative model, before
/// sanitization. Numeric-looking fields are carried as JSON values because
/// the model may emit strings, missing fields, or out-of-range numbers.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawTopic {
    pub topic_key: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub difficulty_weight: Option<serde_json::Value>,
    #[serde(default)]
    pub exam_importance: Option<serde_json::Value>,
    #[serde(default)]
    pub estimated_hours: Option<serde_json::Value>,
    pub confidence_level: Option<String>,
    pub notes: Option<String>,
    pub source_page: Option<i32>,
    pub source_quote: Option<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

/// Outcome of [`sanitize`]: the cleaned topics plus diagnostics that never
/// fail the run, only annotate it.
#[derive(Debug, Clone, Default)]
pub struct SanitizeOutcome {
    pub topics: Vec<Topic>,
    pub notes: Vec<String>,
    pub truncated_due_to_quota: bool,
}

/// Parses a JSON value expected to be an array of topic-like objects.
/// Returns [`GraphError::InvalidInput`] when it is not a sequence.
pub fn parse_raw_topics(value: &serde_json::Value) -> Result<Vec<RawTopic>, GraphError> {
    let arr = value.as_array().ok_or(GraphError::InvalidInput)?;
    Ok(arr
        .iter()
        .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
        .collect())
}

/// Cleans, deduplicates, clamps and caps a list of raw topic records.
///
/// `course_id` is stamped on every surviving topic. `quota` is the caller's
/// remaining per-user extraction budget; it further caps the per-run cap.
pub fn sanitize(
    raw_topics: &[RawTopic],
    course_id: Uuid,
    quota: usize,
) -> Result<SanitizeOutcome, GraphError> {
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut notes = Vec::new();
    let mut topics = Vec::new();

    for (index, raw) in raw_topics.iter().enumerate() {
        let title = match &raw.title {
            Some(t) if !t.trim().is_empty() => t.trim(),
            _ => {
                notes.push(format!("record {index}: missing or empty title, discarded"));
                continue;
            }
        };
        let title_key = title.to_lowercase();
        if seen_titles.contains(&title_key) {
            notes.push(format!("record {index}: duplicate title \"{title}\", discarded"));
            continue;
        }

        let title = truncate_chars(title, MAX_TITLE_LEN);

        let difficulty_weight = clamp_int_score(raw.difficulty_weight.as_ref());
        let exam_importance = clamp_int_score(raw.exam_importance.as_ref());
        let estimated_hours = clamp_hours(raw.estimated_hours.as_ref());

        let confidence_level = match raw.confidence_level.as_deref() {
            Some("high") => ConfidenceLevel::High,
            Some("low") => ConfidenceLevel::Low,
            _ => ConfidenceLevel::Medium,
        };

        let source_quote = raw
            .source_quote
            .as_deref()
            .map(|s| truncate_chars(s.trim(), MAX_SOURCE_CONTEXT_LEN));

        let mut topic_key = raw
            .topic_key
            .clone()
            .filter(|k| !k.is_empty() && !seen_keys.contains(k))
            .unwrap_or_else(|| format!("t{index:02}"));

        if seen_keys.contains(&topic_key) {
            let suffix = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) % 100_000;
            topic_key = format!("t{index:02}_{suffix}");
        }

        seen_titles.insert(title_key);
        seen_keys.insert(topic_key.clone());

        topics.push(Topic {
            id: None,
            topic_key,
            course_id,
            title,
            difficulty_weight,
            exam_importance,
            estimated_hours,
            confidence_level,
            notes: raw.notes.clone(),
            source_page: raw.source_page,
            source_quote,
            prerequisites: raw.prerequisites.iter().cloned().collect(),
            prerequisite_ids: HashSet::new(),
            status: TopicStatus::NotStarted,
        });
    }

    if topics.len() > PER_RUN_CAP {
        let dropped = topics.len() - PER_RUN_CAP;
        topics.truncate(PER_RUN_CAP);
        notes.push(format!("{dropped} topic(s) discarded: exceeded per-run cap of {PER_RUN_CAP}"));
    }

    let mut truncated_due_to_quota = false;
    if topics.len() > quota {
        topics.truncate(quota);
        truncated_due_to_quota = true;
    }

    if topics.is_empty() {
        return Err(GraphError::NoValidTopics);
    }

    Ok(SanitizeOutcome {
        topics,
        notes,
        truncated_due_to_quota,
    })
}

fn clamp_int_score(value: Option<&serde_json::Value>) -> i32 {
    let n = value.and_then(|v| v.as_f64()).unwrap_or(3.0);
    if !n.is_finite() {
        return 3;
    }
    (n.round() as i32).clamp(1, 5)
}

fn clamp_hours(value: Option<&serde_json::Value>) -> f64 {
    let n = value.and_then(|v| v.as_f64()).unwrap_or(1.0);
    if !n.is_finite() {
        return 1.0;
    }
    n.clamp(0.5, 5.0)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Outcome of [`detect_and_break_cycles`].
#[derive(Debug, Clone, Default)]
pub struct CycleRepairOutcome {
    pub topics: Vec<Topic>,
    /// Edges removed to break cycles, as (source key, target key) pairs.
    pub removed_edges: Vec<(String, String)>,
    pub has_cycles: bool,
}

/// Performs a stack-based DFS over the prerequisite relation (keyed on
/// `topic_key`) and removes exactly the edge that closes each detected
/// cycle — edge-level repair, never node deletion.
pub fn detect_and_break_cycles(topics: Vec<Topic>) -> CycleRepairOutcome {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for t in &topics {
        adjacency.insert(
            t.topic_key.clone(),
            t.prerequisites.iter().cloned().collect(),
        );
    }

    let mut removed: HashSet<(String, String)> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();

    let keys: Vec<String> = topics.iter().map(|t| t.topic_key.clone()).collect();

    for start in &keys {
        if visited.contains(start) {
            continue;
        }
        // Explicit iterative DFS with an index stack, per node an `on_stack`
        // membership set — avoids recursion-depth concerns at the 50-topic cap.
        let mut stack_nodes = vec![start.clone()];
        let mut stack_children: Vec<usize> = vec![0];
        let mut on_stack: HashSet<String> = HashSet::from([start.clone()]);
        visited.insert(start.clone());

        while let Some(current) = stack_nodes.last().cloned() {
            let children = adjacency.get(&current).cloned().unwrap_or_default();
            let child_idx = *stack_children.last().unwrap();

            if child_idx >= children.len() {
                stack_nodes.pop();
                stack_children.pop();
                on_stack.remove(&current);
                continue;
            }

            *stack_children.last_mut().unwrap() += 1;
            let child = &children[child_idx];

            if !adjacency.contains_key(child) {
                // Prerequisite referencing an unknown key; left for resolution
                // to drop later, not a cycle concern here.
                continue;
            }

            if on_stack.contains(child) {
                removed.insert((current.clone(), child.clone()));
                continue;
            }

            if !visited.contains(child) {
                visited.insert(child.clone());
                on_stack.insert(child.clone());
                stack_nodes.push(child.clone());
                stack_children.push(0);
            }
        }
    }

    let has_cycles = !removed.is_empty();

    let topics = topics
        .into_iter()
        .map(|mut t| {
            t.prerequisites
                .retain(|p| !removed.contains(&(t.topic_key.clone(), p.clone())));
            t
        })
        .collect();

    CycleRepairOutcome {
        topics,
        removed_edges: removed.into_iter().collect(),
        has_cycles,
    }
}

/// Assigns a fresh system identifier to every topic and resolves AI-level
/// `topic_key` prerequisite references to those identifiers. Unknown keys
/// and self-references are dropped silently.
pub fn assign_stable_identifiers(mut topics: Vec<Topic>) -> Vec<Topic> {
    let key_to_id: HashMap<String, Uuid> = topics
        .iter_mut()
        .map(|t| {
            let id = Uuid::new_v4();
            t.id = Some(id);
            (t.topic_key.clone(), id)
        })
        .collect();

    for t in &mut topics {
        let own_id = t.id.unwrap();
        t.prerequisite_ids = t
            .prerequisites
            .iter()
            .filter_map(|key| key_to_id.get(key).copied())
            .filter(|id| *id != own_id)
            .collect();
    }

    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(key: &str, title: &str, prereqs: &[&str]) -> RawTopic {
        RawTopic {
            topic_key: Some(key.to_string()),
            title: Some(title.to_string()),
            prerequisites: prereqs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn sanitize_rejects_missing_title() {
        let raws = vec![RawTopic {
            title: None,
            ..Default::default()
        }];
        let err = sanitize(&raws, Uuid::new_v4(), 50).unwrap_err();
        assert_eq!(err, GraphError::NoValidTopics);
    }

    #[test]
    fn sanitize_dedupes_case_insensitive_titles() {
        let raws = vec![raw("t00", "Linear Algebra", &[]), raw("t01", "linear algebra", &[])];
        let outcome = sanitize(&raws, Uuid::new_v4(), 50).unwrap();
        assert_eq!(outcome.topics.len(), 1);
        assert_eq!(outcome.notes.len(), 1);
    }

    #[test]
    fn sanitize_clamps_out_of_range_scores() {
        let mut r = raw("t00", "Topic A", &[]);
        r.difficulty_weight = Some(serde_json::json!(99));
        r.estimated_hours = Some(serde_json::json!(0.01));
        let outcome = sanitize(&[r], Uuid::new_v4(), 50).unwrap();
        assert_eq!(outcome.topics[0].difficulty_weight, 5);
        assert_eq!(outcome.topics[0].estimated_hours, 0.5);
    }

    #[test]
    fn sanitize_defaults_non_numeric_scores() {
        let mut r = raw("t00", "Topic A", &[]);
        r.difficulty_weight = Some(serde_json::json!("not-a-number"));
        let outcome = sanitize(&[r], Uuid::new_v4(), 50).unwrap();
        assert_eq!(outcome.topics[0].difficulty_weight, 3);
    }

    #[test]
    fn sanitize_caps_to_quota_and_flags_truncation() {
        let raws: Vec<RawTopic> = (0..10)
            .map(|i| raw(&format!("t{i:02}"), &format!("Topic {i}"), &[]))
            .collect();
        let outcome = sanitize(&raws, Uuid::new_v4(), 3).unwrap();
        assert_eq!(outcome.topics.len(), 3);
        assert!(outcome.truncated_due_to_quota);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let raws = vec![raw("t00", "Topic A", &[]), raw("t01", "Topic B", &["t00"])];
        let first = sanitize(&raws, Uuid::new_v4(), 50).unwrap();
        let as_raw: Vec<RawTopic> = first
            .topics
            .iter()
            .map(|t| RawTopic {
                topic_key: Some(t.topic_key.clone()),
                title: Some(t.title.clone()),
                difficulty_weight: Some(serde_json::json!(t.difficulty_weight)),
                exam_importance: Some(serde_json::json!(t.exam_importance)),
                estimated_hours: Some(serde_json::json!(t.estimated_hours)),
                confidence_level: Some(match t.confidence_level {
                    ConfidenceLevel::High => "high".to_string(),
                    ConfidenceLevel::Medium => "medium".to_string(),
                    ConfidenceLevel::Low => "low".to_string(),
                }),
                notes: t.notes.clone(),
                source_page: t.source_page,
                source_quote: t.source_quote.clone(),
                prerequisites: t.prerequisites.iter().cloned().collect(),
            })
            .collect();
        let second = sanitize(&as_raw, first.topics[0].course_id, 50).unwrap();
        assert_eq!(second.topics.len(), first.topics.len());
    }

    #[test]
    fn detect_and_break_cycles_removes_exactly_one_edge_in_a_three_cycle() {
        let course_id = Uuid::new_v4();
        let raws = vec![
            raw("t00", "A", &["t01"]),
            raw("t01", "B", &["t02"]),
            raw("t02", "C", &["t00"]),
        ];
        let sanitized = sanitize(&raws, course_id, 50).unwrap();
        let outcome = detect_and_break_cycles(sanitized.topics);

        assert!(outcome.has_cycles);
        assert_eq!(outcome.removed_edges.len(), 1);

        let total_prereqs: usize = outcome.topics.iter().map(|t| t.prerequisites.len()).sum();
        assert_eq!(total_prereqs, 2);
    }

    #[test]
    fn detect_and_break_cycles_is_idempotent() {
        let course_id = Uuid::new_v4();
        let raws = vec![
            raw("t00", "A", &["t01"]),
            raw("t01", "B", &["t02"]),
            raw("t02", "C", &["t00"]),
        ];
        let sanitized = sanitize(&raws, course_id, 50).unwrap();
        let once = detect_and_break_cycles(sanitized.topics);
        let twice = detect_and_break_cycles(once.topics.clone());
        assert!(!twice.has_cycles);
        assert_eq!(twice.removed_edges.len(), 0);
    }

    #[test]
    fn assign_stable_identifiers_drops_unknown_and_self_references() {
        let course_id = Uuid::new_v4();
        let mut t = Topic {
            id: None,
            topic_key: "t00".to_string(),
            course_id,
            title: "A".to_string(),
            difficulty_weight: 3,
            exam_importance: 3,
            estimated_hours: 1.0,
            confidence_level: ConfidenceLevel::Medium,
            notes: None,
            source_page: None,
            source_quote: None,
            prerequisites: HashSet::new(),
            prerequisite_ids: HashSet::new(),
            status: TopicStatus::NotStarted,
        };
        t.prerequisites.insert("t00".to_string()); // self-reference
        t.prerequisites.insert("unknown".to_string()); // unknown key

        let resolved = assign_stable_identifiers(vec![t]);
        assert!(resolved[0].prerequisite_ids.is_empty());
    }
}
