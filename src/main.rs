//! Flowrunner CLI Entry Point
//!
//! Loads a flow definition, starts a run against an in-memory store and
//! drives it to settlement, honoring suspensions along the way.
//!
//! # Usage
//!
//! ```bash
//! # Execute a flow
//! flowrunner flow.yaml
//!
//! # Seed initial run state
//! flowrunner flow.yaml --state retries=3 --state user='"alice"'
//!
//! # Preview the action tree without executing
//! flowrunner flow.yaml --dry-run
//!
//! # Tighten the hot-loop budget
//! flowrunner flow.yaml --max-hot-loop 200
//! ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use log::{error, info};
use serde_json::{Map, Value};

use flowrunner::action::registry::register_builtin_actions;
use flowrunner::engine::{Engine, DEFAULT_MAX_HOT_LOOP};
use flowrunner::flow::{load_flow, Flow, NodeId, RunStatus};
use flowrunner::store::FlowStore;
use flowrunner::{MemoryStore, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    flow_path: String,
    dry_run: bool,
    verbose: bool,
    max_hot_loop: u32,
    initial_state: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flow_path: String::new(),
            dry_run: false,
            verbose: false,
            max_hot_loop: DEFAULT_MAX_HOT_LOOP,
            initial_state: Map::new(),
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Durable Workflow Interpreter");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] <FLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <FLOW_FILE>         Path to flow definition YAML file");
    println!();
    println!("Options:");
    println!("  --dry-run           Print the action tree without executing");
    println!("  --state KEY=VALUE   Seed initial run state (repeatable)");
    println!("  --max-hot-loop N    Step budget per execution (default: {})", DEFAULT_MAX_HOT_LOOP);
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowrunner onboarding.yaml");
    println!("  flowrunner onboarding.yaml --state retries=3");
    println!("  flowrunner onboarding.yaml --dry-run");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--max-hot-loop" => {
                i += 1;
                if i >= args.len() {
                    return Err("--max-hot-loop requires a number argument".to_string());
                }
                config.max_hot_loop = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid hot-loop value: {}", args[i]))?;
            }
            "--state" => {
                i += 1;
                if i >= args.len() {
                    return Err("--state requires a KEY=VALUE argument".to_string());
                }
                let (key, value) = parse_state_entry(&args[i])?;
                config.initial_state.insert(key, value);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if !config.flow_path.is_empty() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.flow_path = arg.clone();
            }
        }
        i += 1;
    }

    if config.flow_path.is_empty() {
        return Err("No flow file specified".to_string());
    }

    Ok(config)
}

/// Parses a `KEY=VALUE` state entry; the value is taken as JSON when it
/// parses, as a plain string otherwise.
fn parse_state_entry(entry: &str) -> Result<(String, Value), String> {
    let Some((key, raw)) = entry.split_once('=') else {
        return Err(format!("Invalid state entry '{}', expected KEY=VALUE", entry));
    };
    if key.is_empty() {
        return Err(format!("Invalid state entry '{}', empty key", entry));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Prints the action tree of a flow, depth-first.
fn print_tree(flow: &Flow) {
    println!("Flow: {} (active: {})", flow.name, flow.is_active());
    for &root in flow.roots() {
        print_subtree(flow, root, 1);
    }
}

fn print_subtree(flow: &Flow, node: NodeId, depth: usize) {
    let Some(record) = flow.node(node) else {
        return;
    };
    let config = if record.config.is_null() {
        String::new()
    } else {
        format!("  {}", record.config)
    };
    println!("{}- {}{}", "  ".repeat(depth), record.action, config);
    for &child in flow.children(node) {
        print_subtree(flow, child, depth + 1);
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    // Register the built-in action vocabulary before loading, so the
    // parser can validate action names.
    register_builtin_actions();

    // Load flow definition
    let flow = load_flow(&config.flow_path).map_err(|e| {
        error!("Failed to load flow: {}", e);
        format!("Could not load flow from '{}': {}", config.flow_path, e)
    })?;

    info!(
        "Flow loaded: '{}', {} action nodes",
        flow.name,
        flow.len()
    );

    if config.dry_run {
        println!();
        print_tree(&flow);
        return Ok(());
    }

    // Create and configure the engine over an in-memory store
    let store = Arc::new(MemoryStore::new());
    let mut engine = Engine::new(store);
    engine.set_max_hot_loop(config.max_hot_loop);
    engine.store().insert_flow(flow.clone());

    let start_time = Instant::now();

    let seed = flowrunner::engine::admission::RunSeed {
        state: (!config.initial_state.is_empty()).then(|| config.initial_state.clone()),
        parent_run: None,
        trigger: None,
    };
    let Some(mut run) = engine.start_run_with(&flow, None, seed)? else {
        return Err("Run refused by admission control".into());
    };

    // Drive the run across suspensions until it settles. The store
    // copy is authoritative once the scheduler drain has run.
    while run.status == RunStatus::Waiting {
        if let Some(continue_after) = run.continue_after {
            let wait = continue_after - Utc::now();
            if let Ok(wait) = wait.to_std() {
                info!("Run {} suspended; resuming at {}", run.id, continue_after);
                thread::sleep(wait);
            }
        }
        engine.run_pending();
        if let Some(latest) = engine.store().run(run.id) {
            run = latest;
        }
    }

    let total_time = start_time.elapsed();

    // Print summary
    println!();
    match run.outcome {
        Some(outcome) => println!("Run {} finished: {}", run.id, outcome),
        None => println!("Run {} did not settle", run.id),
    }
    println!("Total execution time: {:.2?}", total_time);
    println!();
    println!("Final state:");
    println!("{}", serde_json::to_string_pretty(&Value::Object(run.state.clone()))?);
    if !run.log.is_empty() {
        println!();
        println!("Run log:");
        print!("{}", run.log);
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
