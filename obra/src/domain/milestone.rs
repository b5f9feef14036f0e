//! Milestone: a zero-duration checkpoint over a set of Epics.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub required_epic_ids: Vec<String>,
    pub achieved: bool,
    pub achieved_at: Option<i64>,
    pub updated_at: i64,
}

impl Milestone {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>, required_epic_ids: Vec<String>) -> Self {
        let name = name.into();
        Self {
            id: generate_id("milestone", &name),
            project_id: project_id.into(),
            name,
            required_epic_ids,
            achieved: false,
            achieved_at: None,
            updated_at: now_ms(),
        }
    }

    /// Evaluates `achieved` from the status of every required Epic, never
    /// setting it true unless all are COMPLETED.
    pub fn evaluate(&mut self, epic_statuses: &HashMap<String, crate::domain::task::TaskStatus>) {
        use crate::domain::task::TaskStatus;
        let all_complete = !self.required_epic_ids.is_empty()
            && self
                .required_epic_ids
                .iter()
                .all(|id| matches!(epic_statuses.get(id), Some(TaskStatus::Completed)));
        if all_complete && !self.achieved {
            self.achieved = true;
            self.achieved_at = Some(now_ms());
        }
        self.updated_at = now_ms();
    }
}

impl Record for Milestone {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "milestones"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("project_id".into(), IndexValue::String(self.project_id.clone()));
        m.insert("achieved".into(), IndexValue::Bool(self.achieved));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskStatus;

    #[test]
    fn achieved_only_when_every_epic_completed() {
        let mut m = Milestone::new("p1", "GA", vec!["e1".into(), "e2".into()]);
        let mut statuses = HashMap::new();
        statuses.insert("e1".to_string(), TaskStatus::Completed);
        statuses.insert("e2".to_string(), TaskStatus::InProgress);
        m.evaluate(&statuses);
        assert!(!m.achieved);

        statuses.insert("e2".to_string(), TaskStatus::Completed);
        m.evaluate(&statuses);
        assert!(m.achieved);
        assert!(m.achieved_at.is_some());
    }
}
