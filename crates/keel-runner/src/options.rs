//! Invocation options for the runner

use std::fmt;

/// Migration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Apply pending definitions in ascending order
    #[default]
    Up,
    /// Revert applied definitions in descending order
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Parameters of one `run` invocation
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Which way to migrate
    pub direction: Direction,
    /// Cap on definitions applied per schema; 0 means no cap
    pub num_migrations: usize,
    /// Schemas to operate on
    pub schema_names: Vec<String>,
}

impl Options {
    /// Migrate `schema_names` all the way up.
    pub fn up<S: Into<String>>(schema_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            direction: Direction::Up,
            num_migrations: 0,
            schema_names: schema_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Revert every applied definition of `schema_names`.
    pub fn down<S: Into<String>>(schema_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            direction: Direction::Down,
            ..Self::up(schema_names)
        }
    }

    /// Cap the number of definitions applied per schema.
    pub fn limit(mut self, num_migrations: usize) -> Self {
        self.num_migrations = num_migrations;
        self
    }
}
