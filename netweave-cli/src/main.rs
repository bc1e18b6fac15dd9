use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use netweave_core::builder::{Topology, TopologyBuilder};
use netweave_core::config::load_intent;
use netweave_core::orchestrator::Deployment;
use netweave_core::plan::{Plan, PlannedResource};

#[derive(Parser)]
#[command(name = "netweave")]
#[command(about = "Synthesise dual-stack network topologies", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an intent file and synthesise its topology
    Validate {
        /// Path to intent file
        #[arg(default_value = "intent.json")]
        file: PathBuf,
    },
    /// Show the resources that would be provisioned, in order
    Plan {
        /// Path to intent file
        #[arg(default_value = "intent.json")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Render outputs against what an orchestrator reported
    Outputs {
        /// Path to intent file
        file: PathBuf,

        /// Path to deployment report (JSON)
        deployment: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file, format } => run_plan(&file, format),
        Commands::Outputs { file, deployment } => run_outputs(&file, &deployment),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn synthesise(file: &Path) -> Result<Topology, String> {
    let intent = load_intent(file).map_err(|e| e.to_string())?;
    TopologyBuilder::new(&intent)
        .build()
        .map_err(|e| format!("Synthesis failed: {}", e))
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let topology = synthesise(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources synthesised successfully.",
            topology.graph.len()
        )
        .green()
        .bold()
    );
    for node in topology.graph.nodes() {
        println!("  • {} {}", node.kind, node.id);
    }
    Ok(())
}

fn run_plan(file: &Path, format: Format) -> Result<(), String> {
    let plan = synthesise(file)?.plan();
    match format {
        Format::Json => {
            let json = plan
                .to_json()
                .map_err(|e| format!("Failed to serialize plan: {}", e))?;
            println!("{}", json);
        }
        Format::Text => print_plan(&plan),
    }
    Ok(())
}

fn run_outputs(file: &Path, deployment: &Path) -> Result<(), String> {
    let plan = synthesise(file)?.plan();

    let content = fs::read_to_string(deployment)
        .map_err(|e| format!("Failed to read {}: {}", deployment.display(), e))?;
    let deployment = Deployment::from_json(&content)
        .map_err(|e| format!("Invalid deployment report: {}", e))?;

    let rendered = plan
        .render_outputs(&deployment)
        .map_err(|e| format!("Failed to render outputs: {}", e))?;
    for (name, value) in rendered {
        println!("{} = {}", name.cyan().bold(), value);
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "Nothing to provision.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for resource in plan.resources() {
        print_resource(resource);
    }

    if !plan.outputs().is_empty() {
        println!("{}", "Outputs:".cyan().bold());
        for output in plan.outputs() {
            println!("  {} = {}", output.name.bold(), output.value);
        }
        println!();
    }

    println!("{}", plan.summary().to_string().bold());
}

fn print_resource(resource: &PlannedResource) {
    println!(
        "  {} {} {}",
        "+".green().bold(),
        resource.kind.to_string().cyan().bold(),
        resource.id
    );

    // name first, the rest alphabetical
    let mut keys: Vec<&String> = resource.attributes.keys().collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    for key in keys {
        let value = resource.attributes[key].to_string();
        if key == "name" {
            println!("      {}: {}", key.bold(), value.white().bold());
        } else {
            println!("      {}: {}", key, value.green());
        }
    }

    if !resource.depends_on.is_empty() {
        let deps: Vec<&str> = resource.depends_on.iter().map(|d| d.as_str()).collect();
        println!("      {} {}", "depends on:".dimmed(), deps.join(", ").dimmed());
    }
    if !resource.implicit_children.is_empty() {
        let kinds: Vec<String> = resource
            .implicit_children
            .iter()
            .map(|k| k.to_string())
            .collect();
        println!("      {} {}", "implicit:".yellow(), kinds.join(", "));
    }
    println!();
}
