//! FHIR Catalog - command-line entry point
//!
//! Bootstraps the surrogate key catalog against the configured database and
//! resolves individual values through it.
//!
//! Usage:
//!   fhir-catalog bootstrap
//!   fhir-catalog resolve-system http://loinc.org
//!   fhir-catalog resolve-quantity-code mg
//!   fhir-catalog resource-type Patient

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferrum_catalog::{config::Config, logging, metrics, startup, StartOutcome, SurrogateKeyCatalog};

#[derive(Parser, Debug)]
#[clap(name = "fhir-catalog")]
#[clap(about = "Surrogate key catalog for FHIR search indexes", version)]
struct Args {
    /// Print Prometheus metrics after the command completes
    #[clap(long, global = true)]
    print_metrics: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the vocabularies and print a summary
    Bootstrap,
    /// Resolve (or register) the id of a coding system
    ResolveSystem { value: String },
    /// Resolve (or register) the id of a quantity code
    ResolveQuantityCode { value: String },
    /// Look up the id of a resource type
    ResourceType { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.logging.deployment_environment,
        "Starting FHIR catalog"
    );

    let (pool, catalog) = startup::connect_catalog(&config)
        .await
        .context("Failed to initialize catalog")?;

    let outcome = catalog.start().await.context("Catalog bootstrap failed")?;

    let result = run(&args.command, &catalog, &outcome).await;
    pool.close().await;
    result?;

    if args.print_metrics {
        print!("{}", metrics::render()?);
    }
    Ok(())
}

async fn run(
    command: &Command,
    catalog: &SurrogateKeyCatalog,
    outcome: &StartOutcome,
) -> anyhow::Result<()> {
    if let StartOutcome::SchemaPending { current_version } = outcome {
        anyhow::bail!(
            "Schema version {:?} is below the catalog minimum; run migrations first",
            current_version
        );
    }

    match command {
        Command::Bootstrap => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        Command::ResolveSystem { value } => {
            let id = catalog
                .system_id(value)
                .await
                .with_context(|| format!("Failed to resolve system '{value}'"))?;
            println!("{id}");
        }
        Command::ResolveQuantityCode { value } => {
            let id = catalog
                .quantity_code_id(value)
                .await
                .with_context(|| format!("Failed to resolve quantity code '{value}'"))?;
            println!("{id}");
        }
        Command::ResourceType { name } => {
            let id = catalog.resource_type_id(name)?;
            println!("{id}");
        }
    }
    Ok(())
}
