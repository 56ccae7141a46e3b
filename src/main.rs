use anyhow::{Context, Result};
use batchpipe::cli::commands::{BuildCommand, ValidateCommand};
use batchpipe::cli::output::*;
use batchpipe::cli::{Cli, Command};
use batchpipe::core::BuildConfig;
use batchpipe::execution::ExecutionEvent;
use batchpipe::{logging, site};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    logging::init_logging(cli.verbose)?;

    match &cli.command {
        Command::Build(cmd) => build(cmd).await?,
        Command::Validate(cmd) => validate(cmd)?,
    }

    Ok(())
}

async fn build(cmd: &BuildCommand) -> Result<()> {
    let config = cmd.resolve()?;

    println!(
        "{} Building {} from {}",
        INFO,
        style(&config.name).bold(),
        style(&config.source).cyan()
    );

    let pipeline = site::pipeline(&config).context("Failed to assemble pipeline")?;

    let spinner = create_spinner();
    let progress = spinner.clone();
    pipeline.add_event_handler(move |event| match &event {
        ExecutionEvent::StageStarted { .. } => progress.set_message(format_execution_event(&event)),
        _ => progress.println(format_execution_event(&event)),
    });

    match pipeline.run().await {
        Ok(output) => {
            let written = output.items().map_or(0, |items| items.len());
            spinner.println(format!(
                "{} Wrote {} files to {}",
                CHECK,
                style(written).cyan(),
                style(config.base.join(&config.output).display()).bold()
            ));
        }
        Err(e) => {
            spinner.finish_and_clear();
            println!("{} {} {}", CROSS, style(&config.name).bold(), style("failed").red());
            error!("{:#}", e);
            std::process::exit(1);
        }
    }

    if config.watch {
        spinner.set_message(format!(
            "{} Watching {} (Ctrl-C to stop)",
            EYES,
            style(&config.source).cyan()
        ));
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        spinner.finish_and_clear();
        println!("{} Stopped watching", INFO);
    } else {
        spinner.finish_and_clear();
    }

    Ok(())
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating build configuration...", INFO);

    match BuildConfig::from_file(&cmd.config) {
        Ok(config) => {
            println!("{} Build configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Source: {}", style(&config.source).cyan());
            println!("  Output: {}", style(config.output.display()).cyan());
            println!("  Collections: {}", style(config.collections.len()).cyan());
            if config.watch {
                println!("  Watch: {} ms debounce", style(config.debounce_ms).cyan());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}
