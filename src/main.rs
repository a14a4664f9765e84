use clap::Parser;
use std::process;
use tablextract::{
    Cli, ExtractionOptions, ExtractionReport, OutputFormatter, OutputMode, Tablextract,
    TablextractError, UserFriendlyError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(&cli);

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let app = match Tablextract::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return 1;
        }
    };

    let options = match ExtractionOptions::from_cli(&cli) {
        Ok(options) => options,
        Err(e) => {
            app.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&options, &app);
    }

    match app.extract_table(&options).await {
        Ok(report) => {
            app.output_formatter().print_extraction_report(&report);
            exit_code_for_report(&report)
        }
        Err(e) => {
            app.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for_report(report: &ExtractionReport) -> i32 {
    if report.is_success() {
        0
    } else if report.tool_started {
        4 // Tool ran and failed, including being killed by a signal
    } else {
        5 // Tool could not be driven
    }
}

fn exit_code_for(error: &TablextractError) -> i32 {
    match error {
        TablextractError::Cancelled => 130, // Interrupted (SIGINT)
        TablextractError::MissingTableName
        | TablextractError::InvalidTableName { .. }
        | TablextractError::InvalidPath { .. }
        | TablextractError::SourceNotFound { .. }
        | TablextractError::StagedFileMissing { .. } => 2,
        TablextractError::OverwriteDeclined { .. } => 3,
        TablextractError::Spawn { .. } => 5,
        TablextractError::Permission { .. } => 7,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "tablextract.toml".to_string());

    match Tablextract::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  tablextract <log-file> --table <table> --config {}", config_path);
            println!("\nEdit the file to point tool.install_dir at your dbtran installation.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(options: &ExtractionOptions, app: &Tablextract) -> i32 {
    let formatter = app.output_formatter();

    formatter.info("DRY RUN MODE - Nothing will be copied or executed");
    formatter.print_separator();

    let plan = match app.plan_extraction(options) {
        Ok(plan) => plan,
        Err(e) => {
            app.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    let request = &plan.request;
    match formatter.mode() {
        OutputMode::Json => {
            let value = serde_json::json!({
                "type": "dry_run",
                "request": request,
                "command": request.command().display(),
                "would_overwrite": plan.would_overwrite,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ => {
            println!("  Log file:     {}", request.source.display());
            println!("  Staged as:    {}", request.staged_path.display());
            println!("  Table:        {}", request.qualified_table);
            println!("  Output:       {}", request.output_path.display());
            println!("  Working dir:  {}", request.tool_dir.display());
            println!("  Command:      {}", request.command().display());

            if plan.would_overwrite {
                formatter.warning("A staged copy already exists and would be replaced");
            }

            formatter.print_separator();
            formatter.success("Dry run completed successfully");
        }
    }

    0
}

fn print_startup_error(error: &TablextractError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
