//! Marathon Curriculum
//!
//! The fixed 14-day plan: two topics per day, a theory topic followed by a
//! practice topic. The plan is data, loaded from a YAML document.

use crate::retrieval::TopicMetadata;
use crate::session::MARATHON_TOPICS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    #[default]
    Theory,
    Practice,
}

/// A single marathon topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub day: usize,
    #[serde(default, rename = "type")]
    pub kind: TopicKind,
    pub title: String,
    #[serde(default)]
    pub main_concept: String,
    #[serde(default)]
    pub related_concepts: Vec<String>,
    #[serde(default)]
    pub pain_point: String,
    #[serde(default)]
    pub key_insight: String,
    /// Instruction for the work product of a practice topic.
    #[serde(default)]
    pub task: String,
}

impl Topic {
    pub fn is_practice(&self) -> bool {
        self.kind == TopicKind::Practice
    }
}

impl From<&Topic> for TopicMetadata {
    fn from(topic: &Topic) -> Self {
        TopicMetadata {
            title: topic.title.clone(),
            main_concept: topic.main_concept.clone(),
            related_concepts: topic.related_concepts.clone(),
            pain_point: topic.pain_point.clone(),
            key_insight: topic.key_insight.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    pub topics: Vec<Topic>,
}

impl Curriculum {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let curriculum: Curriculum =
            serde_yaml::from_str(raw).context("Failed to parse curriculum YAML")?;
        if curriculum.topics.len() != MARATHON_TOPICS {
            warn!(
                topics = curriculum.topics.len(),
                expected = MARATHON_TOPICS,
                "Curriculum size differs from the marathon length"
            );
        }
        Ok(curriculum)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read curriculum {}", path.display()))?;
        let curriculum = Self::from_yaml(&raw)?;
        info!(path = %path.display(), topics = curriculum.len(), "Curriculum loaded");
        Ok(curriculum)
    }

    pub fn topic(&self, index: usize) -> Option<&Topic> {
        self.topics.get(index)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Topics scheduled for a 1-based marathon day.
    pub fn day_topics(&self, day: usize) -> Vec<&Topic> {
        self.topics.iter().filter(|t| t.day == day).collect()
    }
}
