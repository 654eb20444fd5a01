//! Coarse file classification by path convention.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Model,
    Controller,
    Service,
    Job,
    Policy,
    Mailer,
    Helper,
    Concern,
    Spec,
    Migration,
    Schema,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Model => "model",
            Category::Controller => "controller",
            Category::Service => "service",
            Category::Job => "job",
            Category::Policy => "policy",
            Category::Mailer => "mailer",
            Category::Helper => "helper",
            Category::Concern => "concern",
            Category::Spec => "spec",
            Category::Migration => "migration",
            Category::Schema => "schema",
            Category::Other => "other",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Model,
            Category::Controller,
            Category::Service,
            Category::Job,
            Category::Policy,
            Category::Mailer,
            Category::Helper,
            Category::Concern,
            Category::Spec,
            Category::Migration,
            Category::Schema,
            Category::Other,
        ]
    }

    /// Classify a path relative to the project root. Concerns are checked
    /// before models and controllers since they live underneath them.
    pub fn classify(path: &str) -> Category {
        let path = path.replace('\\', "/");
        let padded = format!("/{}", path);
        let ruby = path.ends_with(".rb");
        let under = |dir: &str| ruby && padded.contains(&format!("/{}/", dir));

        if under("app/models/concerns") || under("app/controllers/concerns") {
            Category::Concern
        } else if under("app/models") {
            Category::Model
        } else if under("app/controllers") {
            Category::Controller
        } else if under("app/services") {
            Category::Service
        } else if under("app/jobs") || under("app/sidekiq") {
            Category::Job
        } else if under("app/policies") {
            Category::Policy
        } else if under("app/mailers") {
            Category::Mailer
        } else if under("app/helpers") {
            Category::Helper
        } else if (under("spec") || under("test"))
            && (path.ends_with("_spec.rb") || path.ends_with("_test.rb"))
        {
            Category::Spec
        } else if under("db/migrate") {
            Category::Migration
        } else if padded.ends_with("/db/schema.rb") {
            Category::Schema
        } else {
            Category::Other
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::all()
            .iter()
            .find(|c| c.as_str() == s.to_lowercase())
            .copied()
            .ok_or_else(|| Error::InvalidQuery(format!("Unknown category: {}", s)))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
