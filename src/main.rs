use clap::{ArgGroup, Parser};
use log::{error, info};
use p1reader::output::{self, format_record};
use p1reader::{Config, InputHandle, OutputFormat, P1Manager, P1Record};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;

/// Read telegrams from the P1 port of a smart meter and print the decoded values.
#[derive(Parser, Debug)]
#[command(version, about)]
#[command(group(ArgGroup::new("format").args(["power", "table", "string", "code", "json"])))]
struct Args {
    /// Print time and net power only
    #[arg(short, long)]
    power: bool,

    /// Print a table with header, date, time, energies and net power
    #[arg(short, long)]
    table: bool,

    /// Print description and value of every known field
    #[arg(short, long)]
    string: bool,

    /// Print OBIS code and value of every known field
    #[arg(short, long)]
    code: bool,

    /// Print every record as JSON
    #[arg(short, long)]
    json: bool,

    /// Number of telegrams to read, 0 reads forever
    #[arg(short, long)]
    iter: Option<u64>,

    /// Read recorded telegrams from this file instead of the serial port
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Configuration file, defaults to config/p1.yaml or p1.yaml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn format(&self) -> Option<OutputFormat> {
        match (self.power, self.table, self.string, self.code, self.json) {
            (true, _, _, _, _) => Some(OutputFormat::Power),
            (_, true, _, _, _) => Some(OutputFormat::Table),
            (_, _, true, _, _) => Some(OutputFormat::String),
            (_, _, _, true, _) => Some(OutputFormat::Code),
            (_, _, _, _, true) => Some(OutputFormat::Json),
            _ => None,
        }
    }

    fn apply(&self, config: &mut Config) {
        if let Some(format) = self.format() {
            config.output.format = format;
        }
        if let Some(iterations) = self.iter {
            config.driver.iterations = iterations;
        }
        if let Some(file) = &self.file {
            config.source.kind = p1reader::config::SourceKind::File;
            config.source.file = file.clone();
        }
    }
}

fn print_record(record: &P1Record, format: OutputFormat) {
    match format_record(record, format) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => error!("Unable to print telegram: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let default_filter = std::env::var("P1_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    let input = match InputHandle::from_config(&config.source, &config.capture) {
        Ok(i) => i,
        Err(e) => {
            error!("Unable to open the telegram source: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (tx, mut rx) = mpsc::channel::<P1Record>(16);
    let format = config.output.format;

    /* Records are printed by their own task */
    let printer = tokio::spawn(async move {
        if format == OutputFormat::Table {
            println!();
            println!("{}", output::table_header());
        }
        while let Some(record) = rx.recv().await {
            print_record(&record, format);
        }
    });

    let mut manager = P1Manager::new(tx, input, config.capture_options(), config.driver.clone());
    let result = manager.start_thread().await;
    drop(manager);

    if let Err(e) = printer.await {
        error!("Printer task failed: {}", e);
    }

    match result {
        Ok(delivered) => {
            info!("Done, {} telegrams read", delivered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Aborting: {}", e);
            ExitCode::FAILURE
        }
    }
}
