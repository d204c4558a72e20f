use clubhouse::config::{load_config, Config};
use clubhouse::core::{OperationOutcome, QueryResult};
use clubhouse::entities::{OrganizationRepository, OrganizationSearch};
use serde_json::json;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: clubhouse <config.toml> status
       clubhouse <config.toml> organizations [name-prefix] [page] [page-size]";

enum Command {
    Status,
    Organizations(OrganizationSearch),
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("status") if args.len() == 1 => Ok(Command::Status),
        Some("organizations") if args.len() <= 4 => {
            let number = |i: usize, what: &str| -> Result<Option<i64>, String> {
                args.get(i)
                    .map(|raw| raw.parse::<i64>().map_err(|_| format!("{} must be an integer, got '{}'", what, raw)))
                    .transpose()
            };
            Ok(Command::Organizations(OrganizationSearch {
                name: args.get(1).cloned(),
                page: number(2, "page")?,
                page_size: number(3, "page-size")?,
                ..OrganizationSearch::default()
            }))
        }
        Some(other) => Err(format!("unknown command or arguments: {}", other)),
        None => Err("missing command".to_string()),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_listing(outcome: OperationOutcome<QueryResult>) -> ExitCode {
    match outcome {
        OperationOutcome::Success(result) => {
            println!("{}", json!({ "total_count": result.total_count, "rows": result.rows }));
            ExitCode::SUCCESS
        }
        OperationOutcome::Failure { kind, message } => {
            println!(
                "{}",
                json!({ "error": kind, "status": kind.http_status(), "message": message })
            );
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(config_path) = args.first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let command = match parse_command(&args[1..]) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);
    info!("Starting clubhouse with {}", config_path);

    let dispatcher = match config.build_dispatcher() {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("Failed to open database: {}", e);
            eprintln!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match command {
        Command::Status => {
            println!(
                "{}",
                json!({
                    "pool": dispatcher.pool().status(),
                    "procedures": dispatcher.catalog().len(),
                    "guard_mode": format!("{:?}", config.guard.mode),
                })
            );
            ExitCode::SUCCESS
        }
        Command::Organizations(search) => {
            let repo = OrganizationRepository::new(dispatcher.clone(), config.guard.mode);
            print_listing(repo.search(&search))
        }
    };
    dispatcher.pool().close();
    code
}
