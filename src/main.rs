use afaire::client::TaskClient;
use afaire::config::Config;
use afaire::model::{SortKey, Task, TaskDraft};
use afaire::store::TaskStore;
use anyhow::{Result, bail};
use std::env;
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: afaire <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list [sort-key]     Show all tasks (date-asc, date-desc, priority,");
    eprintln!("                      title, status, default)");
    eprintln!("  add <input>         Create a task. Example: Buy milk @2026-09-01 !high");
    eprintln!("  show <id>           Show one task");
    eprintln!("  done <id>           Toggle a task's completed flag");
    eprintln!("  rm <id>             Delete a task");
    eprintln!("  search <query>      Server-side search");
    eprintln!("  stats               Show aggregate counters");
    eprintln!("  complete-all        Mark every pending task completed");
}

fn render(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!("[{}] #{} {} ({})", mark, task.id, task.title, task.priority);
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {}", due));
    }
    if let Some(description) = &task.description {
        line.push_str(&format!("\n      {}", description));
    }
    line
}

fn print_tasks(store: &TaskStore) {
    for task in store.tasks() {
        println!("{}", render(&task));
    }
    let stats = store.stats();
    println!(
        "{} tasks: {} completed, {} pending",
        stats.total, stats.completed, stats.pending
    );
}

/// Fails the command when an action left an error message behind.
fn check_store_error(store: &TaskStore) -> Result<()> {
    if let Some(message) = store.error() {
        bail!(message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        usage();
        return Ok(());
    };

    let config = Config::load()?;
    let client = TaskClient::new(&config.base_url)?;
    let store = TaskStore::new(client.clone());

    match command.as_str() {
        "list" => {
            store.fetch_tasks().await;
            check_store_error(&store)?;
            if let Some(key) = args.get(2) {
                let key: SortKey = key.parse().map_err(anyhow::Error::msg)?;
                store.sort_tasks(key);
            }
            print_tasks(&store);
        }
        "add" => {
            let input = args[2..].join(" ");
            if input.is_empty() {
                usage();
                bail!("add needs a task description");
            }
            let task = store.create_task(TaskDraft::from_smart_input(&input)).await?;
            println!("Created {}", render(&task));
        }
        "show" => {
            let id = parse_id(&args)?;
            let task = client.get_task(id).await?;
            println!("{}", render(&task));
        }
        "done" => {
            let id = parse_id(&args)?;
            store.fetch_tasks().await;
            check_store_error(&store)?;
            store.toggle_task(id).await?;
            match store.task_by_id(id) {
                Some(task) => println!("{}", render(&task)),
                None => bail!("no task with id {}", id),
            }
        }
        "rm" => {
            let id = parse_id(&args)?;
            store.fetch_tasks().await;
            check_store_error(&store)?;
            store.delete_task(id).await?;
            println!("Deleted #{}", id);
        }
        "search" => {
            let query = args[2..].join(" ");
            store.search_tasks(&query).await;
            check_store_error(&store)?;
            print_tasks(&store);
        }
        "stats" => {
            store.fetch_stats().await;
            check_store_error(&store)?;
            let stats = store.stats();
            println!("total:     {}", stats.total);
            println!("completed: {}", stats.completed);
            println!("pending:   {}", stats.pending);
        }
        "complete-all" => {
            store.fetch_tasks().await;
            check_store_error(&store)?;
            store.mark_all_completed().await?;
            print_tasks(&store);
        }
        _ => {
            usage();
            bail!("unknown command: {}", command);
        }
    }

    Ok(())
}

fn parse_id(args: &[String]) -> Result<i64> {
    let Some(raw) = args.get(2) else {
        usage();
        bail!("missing task id");
    };
    Ok(raw.parse()?)
}
