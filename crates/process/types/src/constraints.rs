//! Constraint records consumed by synthesis
//!
//! A [`ConstraintSet`] is the structured output of the upstream extraction
//! stage: named activities plus typed relations between them.

use crate::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Relations ────────────────────────────────────────────────────────

/// `before` must happen before `after`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Precedence {
    pub before: String,
    pub after: String,
}

impl Precedence {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }
}

/// An unordered pair of activities.
///
/// Stored with the lexically smaller name first so `(A, B)` and `(B, A)`
/// compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityPair {
    pub first: String,
    pub second: String,
}

impl ActivityPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }

    /// The other member of the pair, if `name` is one of them
    pub fn partner(&self, name: &str) -> Option<&str> {
        if self.first == name {
            Some(&self.second)
        } else if self.second == name {
            Some(&self.first)
        } else {
            None
        }
    }
}

/// A set of activities forming a declared cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConstraint {
    /// Members in declaration order, without duplicates
    pub activities: Vec<String>,
}

impl LoopConstraint {
    pub fn new<I, S>(activities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<String> = Vec::new();
        for name in activities {
            let name = name.into();
            if !members.contains(&name) {
                members.push(name);
            }
        }
        Self { activities: members }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.iter().any(|a| a == name)
    }
}

/// A lookup set of unordered activity pairs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPairSet(BTreeSet<ActivityPair>);

impl ActivityPairSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: ActivityPair) -> bool {
        self.0.insert(pair)
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.0.contains(&ActivityPair::new(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityPair> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ActivityPair> for ActivityPairSet {
    fn from_iter<T: IntoIterator<Item = ActivityPair>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Constraint set ───────────────────────────────────────────────────

/// Activities plus the relations synthesis must honour
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    /// Explicitly declared activities. When empty, the activity set is
    /// whatever the relations mention.
    pub activities: Vec<String>,
    pub precedences: Vec<Precedence>,
    pub choices: Vec<ActivityPair>,
    pub parallels: Vec<ActivityPair>,
    pub loops: Vec<LoopConstraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an activity
    pub fn activity(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.activities.contains(&name) {
            self.activities.push(name);
        }
        self
    }

    /// `before` happens before `after`
    pub fn precedence(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.precedences.push(Precedence::new(before, after));
        self
    }

    /// Exactly one of `a` and `b` happens
    pub fn choice(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.choices.push(ActivityPair::new(a, b));
        self
    }

    /// `a` and `b` happen concurrently
    pub fn parallel(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.parallels.push(ActivityPair::new(a, b));
        self
    }

    /// The given activities form a repeatable cycle
    pub fn looped<I, S>(mut self, activities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loops.push(LoopConstraint::new(activities));
        self
    }

    /// Whether no relation of any kind is present
    pub fn is_empty(&self) -> bool {
        self.precedences.is_empty()
            && self.choices.is_empty()
            && self.parallels.is_empty()
            && self.loops.is_empty()
            && self.activities.is_empty()
    }

    /// Every activity, in order of first mention
    pub fn all_activities(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !seen.iter().any(|s| s == name) {
                seen.push(name.to_string());
            }
        };
        for name in &self.activities {
            push(name);
        }
        for p in &self.precedences {
            push(&p.before);
            push(&p.after);
        }
        for pair in self.choices.iter().chain(&self.parallels) {
            push(&pair.first);
            push(&pair.second);
        }
        for l in &self.loops {
            for name in &l.activities {
                push(name);
            }
        }
        seen
    }

    /// Pairs that must never co-occur on one execution, derived from choices
    pub fn mutual_exclusions(&self) -> ActivityPairSet {
        self.choices.iter().cloned().collect()
    }

    /// Pairs that were explicitly declared concurrent
    pub fn declared_parallels(&self) -> ActivityPairSet {
        self.parallels.iter().cloned().collect()
    }

    /// Loops that contain the given activity
    pub fn loops_containing<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LoopConstraint> + 'a {
        self.loops.iter().filter(move |l| l.contains(name))
    }

    /// Reject sets synthesis cannot work with
    pub fn validate(&self) -> ProcessResult<()> {
        if self.is_empty() {
            return Err(ProcessError::EmptyConstraintSet);
        }

        if !self.activities.is_empty() {
            if let Some(unknown) = self
                .all_activities()
                .into_iter()
                .find(|name| !self.activities.contains(name))
            {
                return Err(ProcessError::UnknownActivity(unknown));
            }
        }

        if let Some(name) = self.all_activities().into_iter().find(|n| n.trim().is_empty()) {
            return Err(ProcessError::ValidationError(format!(
                "Activity name must not be blank: {:?}",
                name
            )));
        }

        for pair in self.choices.iter().chain(&self.parallels) {
            if pair.first == pair.second {
                return Err(ProcessError::ValidationError(format!(
                    "Activity '{}' cannot be paired with itself",
                    pair.first
                )));
            }
        }

        if self.loops.iter().any(|l| l.activities.is_empty()) {
            return Err(ProcessError::ValidationError(
                "Loop must contain at least one activity".into(),
            ));
        }

        if let Some(pair) = self
            .choices
            .iter()
            .find(|c| self.parallels.contains(c))
        {
            return Err(ProcessError::ValidationError(format!(
                "Activities '{}' and '{}' are declared both exclusive and parallel",
                pair.first, pair.second
            )));
        }

        Ok(())
    }
}
