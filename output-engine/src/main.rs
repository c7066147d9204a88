//! CLI entry point for replaying recorded sessions through the output engine.
//!
//! A scenario file holds a tree snapshot and a list of steps (notifications,
//! tree mutations, status queries). Each step's speech and braille output is
//! written to stdout as one JSON object per line.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scenario with the default configuration
//! engine-replay replay demos/checkbox_focus.json
//!
//! # Replay with a configuration file
//! engine-replay replay demos/checkbox_focus.json --config demos/engine.toml
//!
//! # Report templates that use unknown attributes
//! engine-replay check-config --config demos/engine.toml
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;

use output_engine::{
    BrailleRegion, ChannelBrailleSink, ChannelSpeechSink, Config, Context, EngineError,
    EventDispatcher, MemoryTree, NotificationEvent, ObjectId, Sinks, State, TreeSnapshot,
    Utterance,
};

/// CLI command to execute
#[derive(Debug, Clone, PartialEq)]
enum Command {
    /// Replay a scenario file
    Replay {
        scenario: PathBuf,
        config: Option<PathBuf>,
    },
    /// Load a configuration and report template diagnostics
    CheckConfig { config: Option<PathBuf> },
    /// Show help message
    Help,
}

/// Parse command line arguments (without the program name)
fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };

    let mut config = None;
    let mut positional = Vec::new();
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" | "-c" => match rest.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return Err("--config requires a path argument".into()),
            },
            other if other.starts_with('-') => return Err(format!("Unknown argument: {}", other)),
            other => positional.push(PathBuf::from(other)),
        }
    }

    match first.as_str() {
        "replay" => {
            let mut positional = positional.into_iter();
            let Some(scenario) = positional.next() else {
                return Err("replay requires a scenario file (e.g., replay session.json)".into());
            };
            if let Some(extra) = positional.next() {
                return Err(format!("Unexpected argument: {}", extra.display()));
            }
            Ok(Command::Replay { scenario, config })
        }
        "check-config" => Ok(Command::CheckConfig { config }),
        "--help" | "-h" | "help" => Ok(Command::Help),
        arg => Err(format!("Unknown command: {}", arg)),
    }
}

/// Print help message to stdout
fn print_help() {
    println!("engine-replay - Replay accessibility sessions through the output engine");
    println!();
    println!("USAGE:");
    println!("    engine-replay replay <SCENARIO> [--config <PATH>]");
    println!("    engine-replay check-config [--config <PATH>]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Configuration file (default: platform config dir)");
    println!("    -h, --help             Print this help message");
    println!();
    println!("OUTPUT:");
    println!("    One JSON object per presented step on stdout.");
    println!("    Logs and errors are written to stderr (set RUST_LOG to adjust).");
}

/// A recorded session.
#[derive(Debug, Deserialize)]
struct Scenario {
    tree: TreeSnapshot,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    /// Deliver a notification
    Event(NotificationEvent),
    /// Destroy an object and its subtree
    Remove(ObjectId),
    /// Flip a state flag without notifying
    SetState { object: ObjectId, state: State, on: bool },
    /// Rename an object without notifying
    Rename { object: ObjectId, name: String },
    /// Present the current target in an explicit context
    Present(Context),
}

/// Loads the configuration and applies its log level.
///
/// A path given with `--config` must exist and parse. Without one, the
/// default location is tried and defaults fill in for a missing file.
fn load_config(path: Option<PathBuf>) -> Result<Config, EngineError> {
    let config = match path {
        Some(path) => Config::read_from_path(&path)?,
        None => Config::load(),
    };
    if env::var_os("RUST_LOG").is_none() {
        match config.general.log_level.parse::<log::LevelFilter>() {
            Ok(level) => log::set_max_level(level),
            Err(_) => log::warn!("[CONFIG] Unknown log level {:?}", config.general.log_level),
        }
    }
    Ok(config)
}

fn drain<T>(rx: &mut UnboundedReceiver<Vec<T>>) -> Vec<T> {
    let mut all = Vec::new();
    while let Ok(batch) = rx.try_recv() {
        all.extend(batch);
    }
    all
}

/// Runs every step and returns one JSON line per step that produced output.
fn run_scenario(scenario: Scenario, config: &Config) -> Result<Vec<serde_json::Value>, EngineError> {
    let (speech, mut speech_rx) = ChannelSpeechSink::new();
    let (braille, mut braille_rx) = ChannelBrailleSink::new();
    let tree = MemoryTree::from_snapshot(scenario.tree);
    let mut engine = EventDispatcher::from_config(tree, config)?.with_sinks(Sinks {
        speech: Some(Box::new(speech)),
        braille: Some(Box::new(braille)),
    });

    let mut lines = Vec::new();
    for (index, step) in scenario.steps.into_iter().enumerate() {
        match step {
            Step::Event(event) => {
                engine.dispatch(event);
            }
            Step::Remove(object) => engine.tree_mut().remove(object),
            Step::SetState { object, state, on } => {
                engine.tree_mut().set_state(object, state, on);
            }
            Step::Rename { object, name } => {
                engine.tree_mut().set_name(object, name);
            }
            Step::Present(context) => {
                engine.present_command(context);
            }
        }

        let utterances: Vec<Utterance> = drain(&mut speech_rx);
        let regions: Vec<BrailleRegion> = drain(&mut braille_rx);
        if utterances.is_empty() && regions.is_empty() {
            continue;
        }
        lines.push(serde_json::json!({
            "step": index,
            "speech": utterances,
            "braille": regions,
        }));
    }
    Ok(lines)
}

/// Handle the replay command
fn handle_replay(scenario: &Path, config: &Config) -> i32 {
    let contents = match std::fs::read_to_string(scenario) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("[REPLAY] Failed to read {}: {}", scenario.display(), e);
            return 1;
        }
    };
    let scenario: Scenario = match serde_json::from_str(&contents) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("[REPLAY] Invalid scenario: {}", e);
            return 1;
        }
    };

    match run_scenario(scenario, config) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            0
        }
        Err(e) => {
            eprintln!("[REPLAY] Failed to build engine: {}", e);
            1
        }
    }
}

/// Handle the check-config command
fn handle_check_config(path: Option<PathBuf>) -> i32 {
    let result = load_config(path).and_then(|config| {
        let mut templates = config.template_registry()?;
        let scripts = config.script_registry()?;
        templates.check_attributes(&config.attribute_resolver(), &scripts);
        Ok(templates)
    });
    match result {
        Ok(templates) => {
            let diagnostics: Vec<serde_json::Value> = templates
                .diagnostics()
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "layer": d.layer,
                        "template": d.template,
                        "unknown": d.unknown,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "valid": true,
                "diagnostics": diagnostics,
            });
            println!("{}", output);
            0
        }
        Err(e) => {
            println!("{}", serde_json::json!({ "valid": false, "error": e.to_string() }));
            1
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information.");
            process::exit(1);
        }
    };

    init_logging();

    let exit_code = match command {
        Command::Replay { scenario, config } => match load_config(config) {
            Ok(config) => handle_replay(&scenario, &config),
            Err(e) => {
                eprintln!("[REPLAY] Invalid configuration: {}", e);
                1
            }
        },
        Command::CheckConfig { config } => handle_check_config(config),
        Command::Help => {
            print_help();
            0
        }
    };

    log::debug!("Exiting with code: {}", exit_code);
    process::exit(exit_code);
}

/// Starts the logger before anything is loaded.
///
/// Without `RUST_LOG` every level passes the filter and `log::set_max_level`
/// decides, so the configured level can take over once the file is read.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format_timestamp_millis()
        .init();
    if env::var_os("RUST_LOG").is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
