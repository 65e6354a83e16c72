use anyhow::Context as _;
use clap::Parser;
use posture_cli::cli::{parse_services, Cli, Commands, OutputFormat};
use posture_cli::output;
use posture_engine::{planner, Engine, EngineConfig};
use posture_fixtures::FixtureRegistry;
use posture_rules::loader;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            rules,
            fixtures,
            services,
            output,
            output_file,
            workers,
            call_timeout,
            deadline,
            verbose,
        } => {
            init_logging(verbose);

            let services = parse_services(services.as_deref());
            let rulesets = loader::load_dir(&rules, services.as_deref())
                .with_context(|| format!("loading rule sets from {rules}"))?;
            let registry = FixtureRegistry::from_dir(&fixtures)
                .with_context(|| format!("loading fixtures from {fixtures}"))?;
            // Unknown action names are a load-time rejection, not a
            // runtime discovery failure
            for ruleset in &rulesets {
                loader::validate_actions(ruleset, &registry)?;
            }

            let config = EngineConfig {
                workers,
                call_timeout: Duration::from_secs(call_timeout),
                run_deadline: deadline.map(Duration::from_secs),
            };
            let engine = Engine::with_config(Arc::new(registry), config);

            let cancel = engine.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let report = engine.run(&rulesets).await?;

            let mut sink: Box<dyn Write> = match &output_file {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("creating {path}"))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };
            match output {
                OutputFormat::Console => output::render_console(&report, &mut sink)?,
                OutputFormat::Json => output::render_json(&report, &mut sink)?,
            }
            sink.flush()?;

            if report.summary.failed > 0 || report.summary.errors > 0 {
                std::process::exit(1);
            }
        }

        Commands::Validate {
            rules,
            services,
            fixtures,
            verbose,
        } => {
            init_logging(verbose);

            let services = parse_services(services.as_deref());
            let rulesets = loader::load_dir(&rules, services.as_deref())
                .with_context(|| format!("loading rule sets from {rules}"))?;

            let registry = match &fixtures {
                Some(dir) => Some(
                    FixtureRegistry::from_dir(dir)
                        .with_context(|| format!("loading fixtures from {dir}"))?,
                ),
                None => None,
            };

            for ruleset in &rulesets {
                planner::plan(ruleset)
                    .map_err(|err| anyhow::anyhow!("{}: {err}", ruleset.service))?;
                if let Some(registry) = &registry {
                    loader::validate_actions(ruleset, registry)?;
                }
            }

            let checks: usize = rulesets.iter().map(|r| r.checks.len()).sum();
            println!(
                "{} rule set(s) valid ({} checks across services: {})",
                rulesets.len(),
                checks,
                rulesets
                    .iter()
                    .map(|r| r.service.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "posture=debug,posture_engine=debug,posture_rules=debug"
    } else {
        "posture=info,posture_engine=info,posture_rules=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
