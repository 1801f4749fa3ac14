//! Task management commands for CLI.

use clap::Subcommand;
use pomoflow_core::storage::Database;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Create {
        /// Task title
        title: String,
        /// Task description
        #[arg(long)]
        description: Option<String>,
        /// Estimated pomodoros (default: 1)
        #[arg(long, default_value = "1")]
        estimated: u32,
    },
    /// List tasks
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Get task details
    Get {
        /// Task ID
        id: String,
    },
    /// Update a task
    Update {
        /// Task ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New description (empty clears it)
        #[arg(long)]
        description: Option<String>,
        /// New estimated pomodoros
        #[arg(long)]
        estimated: Option<u32>,
        /// Set completed status
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        TaskAction::Create {
            title,
            description,
            estimated,
        } => {
            if title.trim().is_empty() {
                return Err("task title must not be empty".into());
            }
            let task = db.create_task(title.trim(), description.as_deref(), estimated.max(1))?;
            eprintln!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { json } => {
            let tasks = db.list_tasks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks.");
            } else {
                for task in tasks {
                    println!(
                        "{}  [{}/{}]  {}",
                        task.id, task.completed_pomodoros, task.estimated_pomodoros, task.title
                    );
                }
            }
        }
        TaskAction::Get { id } => {
            let task = db.find_task(&id)?.ok_or(format!("Task not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Update {
            id,
            title,
            description,
            estimated,
            completed,
        } => {
            let mut task = db.find_task(&id)?.ok_or(format!("Task not found: {id}"))?;

            if let Some(t) = title {
                if t.trim().is_empty() {
                    return Err("task title must not be empty".into());
                }
                task.title = t.trim().to_string();
            }
            if let Some(d) = description {
                task.description = Some(d).filter(|d| !d.is_empty());
            }
            if let Some(e) = estimated {
                task.estimated_pomodoros = e.max(1);
            }
            if let Some(c) = completed {
                task.completed = c;
            }

            let task = db.update_task(&task)?;
            eprintln!("Task updated: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Delete { id } => {
            db.delete_task(&id)?;
            println!("Task deleted: {id}");
        }
    }
    Ok(())
}
