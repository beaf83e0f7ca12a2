//! Task model and the built-in data source

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    pub fn new(description: impl Into<String>, is_complete: bool, priority: i32) -> Self {
        Self {
            description: description.into(),
            is_complete,
            priority,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_complete { "x" } else { " " };
        write!(f, "[{}] {} (p{})", mark, self.description, self.priority)
    }
}

/// The task list used when no `--tasks` file is given
pub fn builtin_tasks() -> Vec<Task> {
    vec![
        Task::new("Take out the trash", true, 3),
        Task::new("Walk the dog", false, 2),
        Task::new("Make my bed", true, 1),
        Task::new("Unload the dishwasher", false, 0),
        Task::new("Make dinner", true, 5),
    ]
}

/// Load a JSON array of tasks
pub fn load_tasks<P: AsRef<Path>>(path: P) -> Result<Vec<Task>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file {}", path.display()))?;
    let tasks: Vec<Task> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid tasks file {}", path.display()))?;
    Ok(tasks)
}
