//! Eventual CLI
//!
//! Runs the canonical promise scenarios on a fresh event loop and prints
//! how each one settled.

use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum};
use eventual::{EventLoopConfig, Handler, Promise, PromiseState, Runtime, SettledOutcome, Value, VERSION};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eventual")]
#[command(author, version, about = "Run settle-once promise scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Fail a drain after N microtasks (runaway guard, off by default)
    #[arg(long, value_name = "N", global = true)]
    microtask_limit: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario and print its outcome
    Scenario {
        /// The scenario to run
        #[arg(value_enum)]
        name: Scenario,
    },

    /// Run every scenario in order
    Scenarios,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// all() over values settled by microtasks and by a task
    All,
    /// all_settled() over a fulfillment and a rejection
    AllSettled,
    /// race() between a promise that never settles and a resolved one
    Race,
    /// any() where every input rejects
    Any,
    /// then() chain where a handler returns a promise
    Chain,
    /// catch() recovering a rejection, followed by finally()
    Recover,
}

const ALL_SCENARIOS: [Scenario; 6] = [
    Scenario::All,
    Scenario::AllSettled,
    Scenario::Race,
    Scenario::Any,
    Scenario::Chain,
    Scenario::Recover,
];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    setup_logging(cli.verbose);
    tracing::info!(version = VERSION, "eventual starting");

    let mut config = EventLoopConfig::default();
    if let Some(limit) = cli.microtask_limit {
        config = config.with_microtask_limit(limit);
    }

    match cli.command {
        Commands::Scenario { name } => run_scenario(name, &config),
        Commands::Scenarios => ALL_SCENARIOS
            .iter()
            .try_for_each(|name| run_scenario(*name, &config)),
    }
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_scenario(name: Scenario, config: &EventLoopConfig) -> anyhow::Result<()> {
    let runtime = Runtime::with_config(config.clone());
    let promise = build_scenario(name, &runtime);
    let stats = runtime.run().map_err(|e| anyhow!("{e}"))?;
    tracing::debug!(scenario = ?name, ?stats, "scenario finished");

    let outcome = match (promise.state(), promise.result()) {
        (PromiseState::Fulfilled, Some(value)) => {
            serde_json::to_value(SettledOutcome::Fulfilled { value })?
        }
        (PromiseState::Rejected, Some(reason)) => {
            serde_json::to_value(SettledOutcome::Rejected { reason })?
        }
        _ => serde_json::json!({ "status": "pending" }),
    };
    let report = serde_json::json!({
        "scenario": format!("{:?}", name),
        "outcome": outcome,
        "microtasks": stats.microtasks_processed,
        "tasks": stats.tasks_processed,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn number_handler(f: fn(f64) -> f64) -> Handler {
    Handler::new(move |value| Ok(Value::from(f(value.as_number().unwrap_or(f64::NAN)))))
}

fn build_scenario(name: Scenario, runtime: &Runtime) -> Promise {
    match name {
        Scenario::All => {
            let late = Promise::with_resolvers();
            let resolve = late.resolve.clone();
            runtime.event_loop().enqueue_task(move || resolve.call(2));
            Promise::all(vec![
                Value::from(Promise::resolve(1)),
                Value::from(late.promise),
                Value::from(3),
            ])
        }
        Scenario::AllSettled => {
            Promise::all_settled(vec![Promise::resolve(1), Promise::reject("x")])
        }
        Scenario::Race => {
            let never = Promise::new(|_, _| Ok(()));
            Promise::race(vec![never, Promise::resolve(5)])
        }
        Scenario::Any => Promise::any(vec![Promise::reject("a"), Promise::reject("b")]),
        Scenario::Chain => Promise::resolve(2)
            .then(Some(number_handler(|n| n * 10.0)), None)
            .then(
                Some(Handler::new(|value| {
                    let next = value.as_number().unwrap_or(0.0) + 1.0;
                    Ok(Value::from(Promise::resolve(next)))
                })),
                None,
            ),
        Scenario::Recover => Promise::reject("boom")
            .catch(Some(Handler::new(|reason| {
                Ok(Value::from(format!("recovered from {}", reason)))
            })))
            .finally(|| {
                tracing::info!("cleanup ran");
                Ok(Value::Undefined)
            }),
    }
}
