//! whexec - resilient SQL execution against Redshift and PostgreSQL.

mod cli;
mod output;

use std::io::Write;

use cli::{Cli, Command, OutputFormat};
use tracing::{error, info, warn};
use warehouse_exec::config::{Config, ConnectionConfig};
use warehouse_exec::db::{decode_row, Cursor};
use warehouse_exec::error::{Result, WarehouseError};
use warehouse_exec::logging;
use warehouse_exec::query::{
    ExecuteOptions, ExecutionGateway, GatewayOptions, QueryOptions, ScriptOptions, StreamOptions,
};

fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Finished with errors");
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

/// Runs the requested command. Returns false when a failure was recorded
/// without aborting.
fn run(cli: &Cli) -> Result<bool> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let mut execution = config.execution.clone();
    cli.apply_execution_overrides(&mut execution)?;
    execution.apply_env_defaults();

    let connection = resolve_connection(cli, &config)?.ok_or_else(|| {
        WarehouseError::config("No database connection configured. Use --help for usage information.")
    })?;

    let options = GatewayOptions::from_config(&execution, &connection);
    let mut gateway = ExecutionGateway::connect(&connection, execution.dialect, options)?;

    let outcome = run_command(&mut gateway, &cli.command);
    let errors = gateway.error_occurred();
    if let Err(e) = gateway.close() {
        warn!("Failed to close connection: {}", e);
    }

    outcome?;
    Ok(!errors)
}

fn run_command(gateway: &mut ExecutionGateway, command: &Command) -> Result<()> {
    match command {
        Command::Run { file, .. } => {
            let options = ScriptOptions {
                variables: command.variables(),
                ..Default::default()
            };
            let count = gateway.execute_script(file, &options)?;
            info!("Ran {} statement(s) from {}", count, file.display());
        }
        Command::Exec { sql, ignore } => {
            let options = ExecuteOptions {
                ignore: ignore.clone(),
                quiet: None,
            };
            if let Some(count) = gateway.execute(sql, &options)? {
                println!("{count}");
            }
        }
        Command::Query { sql, format } => {
            if let Some(records) = gateway.query(sql, &QueryOptions::default())? {
                println!("{}", output::format_records(&records, *format));
            }
        }
        Command::Stream {
            sql,
            fetch_size,
            format,
        } => {
            let options = StreamOptions {
                fetch_size: *fetch_size,
                quiet: None,
            };
            let stdout = std::io::stdout();
            stream_query(gateway, sql, &options, *format, &mut stdout.lock())?;
        }
    }
    Ok(())
}

/// Prints a streamed result one record per line.
///
/// The cursor is closed and auto-commit restored even when reading fails
/// partway, so the cursor's transaction never outlives the command.
fn stream_query(
    gateway: &mut ExecutionGateway,
    sql: &str,
    options: &StreamOptions,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let streamed = match gateway.streaming_query(sql, options)? {
        Some(mut cursor) => {
            let printed = print_records(cursor.as_mut(), format, out);
            let closed = cursor.close().map_err(WarehouseError::from);
            printed.and(closed)
        }
        None => Ok(()),
    };
    let restored = gateway.restore_auto_commit();

    streamed?;
    restored
}

fn print_records(cursor: &mut dyn Cursor, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let columns = cursor.columns().to_vec();
    while cursor.advance()? {
        let record = decode_row(&*cursor, &columns)?;
        writeln!(out, "{}", output::format_streamed_record(&record, format))
            .map_err(|e| WarehouseError::internal(format!("Failed to write output: {e}")))?;
    }
    Ok(())
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(WarehouseError::config(format!(
                    "Connection '{name}' not found in config file"
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.merge(&cli.session_overrides());
        conn.apply_env_defaults();
    }

    Ok(connection)
}
