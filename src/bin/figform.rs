use clap::{Parser, Subcommand};
use figform::config::OrchestratorConfig;
use figform::eval::Preflight;
use figform::expression::Dependencies;
use figform::form::Template;
use figform::functions::FunctionRegistry;
use figform::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "figform.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preflight every expression of a template and print what it reads
    Check {
        template: PathBuf,

        /// Only print problems
        #[arg(short, long)]
        quiet: bool,
    },
    /// List the registered custom functions
    Functions,
}

fn run(cli: &Cli) -> Result<bool, Error> {
    let config = if cli.config.exists() {
        OrchestratorConfig::from_file(&cli.config)?
    } else {
        OrchestratorConfig::default()
    };
    debug!("config: {:?}", config);
    let functions = Arc::new(FunctionRegistry::standard());

    match &cli.command {
        Command::Check { template, quiet } => {
            let template = Template::from_file(template)?;
            info!(
                "template {} loaded: {} elements, {} fragments",
                template.code,
                template.elements.len(),
                template.fragments.len()
            );
            let preflight =
                Preflight::from_config(Arc::new(template.fragments.clone()), functions, &config.evaluator)?;

            let mut problems = 0;
            for element in template.ordered_elements() {
                for (slot, expression) in element.expressions() {
                    match preflight.check(expression) {
                        Ok(resolved) => {
                            let dependencies = Dependencies::of(&resolved);
                            if !*quiet && !dependencies.is_static() {
                                println!("{}.{}: {}", element.code, slot, dependencies);
                            }
                        }
                        Err(e) => {
                            problems += 1;
                            println!("{}.{}: ERROR {}", element.code, slot, e);
                        }
                    }
                }
            }
            println!("{} problem(s) found", problems);
            Ok(problems == 0)
        }
        Command::Functions => {
            for (name, function) in functions.iter() {
                let preview = match function.preview() {
                    Ok(value) => value.to_string(),
                    Err(e) => format!("error: {}", e),
                };
                println!("{}: {}", name, function.description);
                println!("    args: {:?} => {}", function.args_default, preview);
            }
            Ok(true)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
