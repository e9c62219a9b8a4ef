use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use whos_next::batch::{BatchOptions, score_csv};
use whos_next::clients::{AnalyticsService, HttpAnalyticsClient};
use whos_next::config::Config;
use whos_next::credits::CreditLedger;
use whos_next::lookup::LookupStatus;
use whos_next::models::AttributeValue;
use whos_next::{Dashboard, DashboardSettings, render, shell};

#[derive(Parser)]
#[command(name = "whos-next")]
#[command(about = "Employee attrition dashboard client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List units and their sub-categories
    Filters,
    /// Aggregate attrition statistics for a filter selection
    Overview {
        /// Unit to include (repeatable). Defaults to every unit.
        #[arg(long = "unit")]
        units: Vec<String>,
        /// Sub-category to include (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Show one employee's profile
    Employee {
        /// Employee identifier
        id: String,
    },
    /// Score one employee, optionally with what-if overrides
    Predict {
        /// Employee identifier
        id: String,
        /// Scoring model (defaults to dashboard.default_model)
        #[arg(long)]
        model: Option<String>,
        /// Override an attribute before scoring, as ATTR=VALUE (repeatable)
        #[arg(long = "set", value_name = "ATTR=VALUE")]
        overrides: Vec<String>,
        /// Also request retention recommendations (uses a credit)
        #[arg(long)]
        recommend: bool,
    },
    /// Show the remaining recommendation credits
    Credits,
    /// List the scoring models the service offers
    Models,
    /// Score every row of a CSV file
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        model: Option<String>,
    },
    /// Interactive dashboard
    Shell,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.runtime.log_level)
        .unwrap_or_else(|_| EnvFilter::new("whos_next=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_override(raw: &str) -> Result<(String, AttributeValue)> {
    let Some((attribute, value)) = raw.split_once('=') else {
        bail!("override '{}' must look like ATTR=VALUE", raw);
    };
    Ok((attribute.trim().to_string(), AttributeValue::parse(value)))
}

async fn connect(
    service: Arc<dyn AnalyticsService>,
    config: &Config,
    select_all: bool,
) -> Result<Dashboard> {
    let mut settings = DashboardSettings::from(config);
    settings.select_all_on_start = select_all;
    Dashboard::connect(service, settings)
        .await
        .context("could not load the filter catalog")
}

/// Search and wait for the lookup to settle. Fails unless the employee was found.
async fn find_employee(dashboard: &mut Dashboard, id: &str) -> Result<()> {
    dashboard.search(id)?;
    dashboard.settle().await;
    match dashboard.lookup().status() {
        LookupStatus::Found { .. } => Ok(()),
        other => bail!("{}", render::lookup_status(other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(&config);
    info!(
        "using analytics service at {} (timeout {} ms)",
        config.service.base_url, config.service.request_timeout_ms
    );

    let service: Arc<dyn AnalyticsService> = Arc::new(HttpAnalyticsClient::from_config(&config)?);

    match cli.command {
        Commands::Filters => {
            let catalog = service.filter_catalog().await?;
            render::catalog_table(&catalog, None).printstd();
        }
        Commands::Overview { units, roles } => {
            let mut dashboard = connect(service, &config, false).await?;
            dashboard.apply_filters(&units, &roles)?;
            dashboard.settle().await;
            render::print_overview(dashboard.overview());
        }
        Commands::Employee { id } => {
            let mut dashboard = connect(service, &config, false).await?;
            find_employee(&mut dashboard, &id).await?;
            if let Some(table) = render::profile_table(dashboard.lookup()) {
                table.printstd();
            }
        }
        Commands::Predict {
            id,
            model,
            overrides,
            recommend,
        } => {
            let mut dashboard = connect(service, &config, false).await?;
            find_employee(&mut dashboard, &id).await?;
            for raw in &overrides {
                let (attribute, value) = parse_override(raw)?;
                dashboard.set_override(&attribute, value)?;
            }
            dashboard.predict(model.as_deref())?;
            dashboard.settle().await;
            let Some(prediction) = dashboard.workflow().prediction() else {
                match dashboard.workflow().last_error() {
                    Some(err) => bail!("prediction failed: {}", err),
                    None => bail!("prediction failed"),
                }
            };
            render::print_prediction(prediction);

            if recommend {
                dashboard.recommend()?;
                dashboard.settle().await;
                match dashboard.workflow().recommendations() {
                    Some(recommendations) => render::print_recommendations(recommendations),
                    None => {
                        if let Some(err) = dashboard.workflow().last_error() {
                            eprintln!("recommendations failed: {}", err);
                        }
                    }
                }
                println!("{}", render::credits_line(dashboard.ledger()));
            }
        }
        Commands::Credits => {
            let ledger = CreditLedger::seeded(service.credit_balance().await?);
            println!("{}", render::credits_line(&ledger));
        }
        Commands::Models => {
            for model in service.list_models().await? {
                let marker = if model == config.dashboard.default_model { "*" } else { " " };
                println!("{} {}", marker, model);
            }
        }
        Commands::Batch {
            input,
            output,
            model,
        } => {
            let reader = BufReader::new(
                File::open(&input).with_context(|| format!("cannot open {}", input.display()))?,
            );
            let writer = BufWriter::new(
                File::create(&output)
                    .with_context(|| format!("cannot create {}", output.display()))?,
            );
            let options = BatchOptions {
                model_id: model.unwrap_or_else(|| config.dashboard.default_model.clone()),
                concurrency: config.batch.concurrency,
                request_timeout: config.request_timeout(),
            };
            let summary = score_csv(service.as_ref(), reader, writer, &options).await?;
            println!(
                "{} rows: {} scored, {} failed -> {}",
                summary.rows,
                summary.scored,
                summary.failed,
                output.display()
            );
        }
        Commands::Shell => {
            let select_all = config.dashboard.select_all_on_start;
            let mut dashboard = connect(service, &config, select_all).await?;
            shell::run(&mut dashboard).await?;
        }
    }

    Ok(())
}
