// Main entry point for the fragdb CLI
// Opens an in-memory cluster and provides an interactive shell over the
// sharded student/grade operations

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use fragdb::{MemoryCluster, MemoryShard, SeedData, ShardedQueryEngine};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type Engine = ShardedQueryEngine<Arc<MemoryShard>>;

/// fragdb - student records sharded by student id
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of shards
    #[arg(short, long, env = "FRAGDB_SHARDS", default_value_t = 3)]
    shards: usize,

    /// JSON file of courses, students and grades to load at startup
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Execute a single command and exit
    #[arg(short, long)]
    execute: Option<String>,

    /// Log routing and fan-out decisions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let cluster = MemoryCluster::open(args.shards)?;
    let engine = cluster.engine()?;

    if let Some(path) = &args.seed {
        let report = SeedData::from_path(path)?.apply(&cluster, &engine)?;
        println!("Seeded {}", report);
    }

    // If a command was provided, execute it and exit
    if let Some(command) = args.execute {
        let outcome = execute_command(&cluster, &engine, &command);
        cluster.close();
        return outcome;
    }

    println!("╔════════════════════════════════════════════╗");
    println!("║        fragdb Interactive Shell            ║");
    println!("╚════════════════════════════════════════════╝");
    println!();
    println!("Running with {} shards", cluster.shard_count());
    println!("Type '.help' for help");
    println!("Type '.exit' to quit");
    println!();

    let outcome = repl(|command| execute_command(&cluster, &engine, command));
    cluster.close();
    outcome
}

fn init_logging(verbose: bool) {
    let default = if verbose { "fragdb=debug" } else { "fragdb=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Read-eval-print loop over stdin
fn repl<F>(mut execute_fn: F) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("fragdb> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('.') {
            match input {
                ".exit" | ".quit" => {
                    println!("Goodbye!");
                    break;
                }
                ".help" => {
                    print_help();
                    continue;
                }
                _ => {
                    println!("Unknown command: {}", input);
                    println!("Type '.help' for help");
                    continue;
                }
            }
        }

        if let Err(e) = execute_fn(input) {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}

fn execute_command(cluster: &MemoryCluster, engine: &Engine, input: &str) -> Result<()> {
    let words: Vec<&str> = input.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return Ok(());
    };

    match (command.to_lowercase().as_str(), args) {
        ("student", [id, name, age, email]) => {
            let age = parse_number(age, "age")?;
            report_insert(engine.insert_student(id, name, age, email)?, "student");
        }
        ("grade", [id, course, score]) => {
            let score = parse_number(score, "score")?;
            report_insert(engine.insert_grade(id, course, score)?, "grade");
        }
        ("update", [id, course, score]) => {
            let score = parse_number(score, "score")?;
            println!("{} row(s) updated", engine.update_grade(id, course, score)?);
        }
        ("drop", [id, course]) => {
            let removed = engine.delete_student_from_course(id, course)?;
            println!("{} row(s) deleted", removed);
        }
        ("profile", [id]) => println!("{}", engine.get_student_profile(id)?),
        ("avg", []) => print_or_empty(engine.avg_score_by_department()?),
        ("top", []) => print_or_empty(engine.students_with_most_courses()?),
        ("stats", []) => {
            for stats in engine.shard_stats()? {
                println!("{}", stats.format());
            }
        }
        ("route", [id]) => println!("{} -> shard {}", id, engine.shard_for(id)?),
        ("course", [id, title @ .., department]) if !title.is_empty() => {
            cluster.load_course(id, &title.join(" "), department)?;
            println!("Course {} loaded on {} shard(s)", id, cluster.shard_count());
        }
        ("sql", [shard, ..]) => {
            let index: usize = shard
                .parse()
                .with_context(|| format!("Invalid shard index '{}'", shard))?;
            let statement = input
                .strip_prefix(command)
                .map(str::trim_start)
                .and_then(|rest| rest.strip_prefix(*shard))
                .map(str::trim)
                .unwrap_or_default();
            if statement.is_empty() {
                bail!("Usage: sql <shard> <statement>");
            }
            let Some(target) = cluster.shard(index) else {
                bail!("No shard {} (cluster has {})", index, cluster.shard_count());
            };
            println!("{}", target.run(statement)?.format());
        }
        (
            "student" | "grade" | "update" | "drop" | "profile" | "avg" | "top" | "stats"
            | "route" | "course" | "sql",
            _,
        ) => bail!("Wrong arguments for '{}'. Type '.help' for usage", command),
        _ => bail!("Unknown command '{}'. Type '.help' for help", command),
    }

    Ok(())
}

fn parse_number(text: &str, what: &str) -> Result<i64> {
    text.parse()
        .with_context(|| format!("Invalid {} '{}': expected an integer", what, text))
}

fn report_insert(written: bool, what: &str) {
    if written {
        println!("Inserted {}", what);
    } else {
        println!("{} already exists, nothing written", what);
    }
}

fn print_or_empty(result: String) {
    if result.is_empty() {
        println!("(no grades)");
    } else {
        println!("{}", result);
    }
}

fn print_help() {
    println!("╔════════════════════════════════════════════╗");
    println!("║              fragdb Help                   ║");
    println!("╚════════════════════════════════════════════╝");
    println!();
    println!("Special Commands:");
    println!("  .help              Show this help message");
    println!("  .exit, .quit       Exit the shell");
    println!();
    println!("Writes (routed to the student's shard):");
    println!("  student <id> <name> <age> <email>");
    println!("  grade <id> <course> <score>");
    println!("  update <id> <course> <score>");
    println!("  drop <id> <course>");
    println!();
    println!("Reads:");
    println!("  profile <id>       Name and email of one student");
    println!("  avg                Average score per department (all shards)");
    println!("  top                Students with the most courses (all shards)");
    println!("  stats              Student and grade counts per shard");
    println!("  route <id>         Shard that owns a student");
    println!();
    println!("Setup and inspection:");
    println!("  course <id> <title> <department>   Load a course on every shard");
    println!("  sql <shard> <statement>            Run SQL on one shard");
    println!("    sql 0 SELECT * FROM Grade");
    println!();
    println!("Notes:");
    println!("  - Arguments are separated by whitespace");
    println!("  - A course title may span several words");
    println!();
}
