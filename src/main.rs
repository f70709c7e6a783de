use alacak360::application::aggregation::DebtorRanking;
use alacak360::config::{LedgerArgs, LedgerConfig};
use alacak360::domain::ports::CaseFilter;
use alacak360::infrastructure::open_store;
use alacak360::interfaces::csv::case_writer::CaseWriter;
use alacak360::interfaces::csv::request_reader::RequestReader;
use alacak360::interfaces::handler::{Reply, Request, RequestHandler, Response};
use alacak360::logging;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: LedgerArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a CSV batch of requests, then print a report
    Process {
        /// Input requests CSV file
        input: PathBuf,

        /// What to print once the batch is applied
        #[arg(long, value_enum, default_value_t = Report::Cases)]
        report: Report,

        /// Reference date for aging (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Ranking used by the debtors report
        #[arg(long, value_enum, default_value_t = DebtorRanking::Risk)]
        sort_by: DebtorRanking,

        /// Number of debtors in the debtors report
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the liveness indicator
    Health,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Report {
    Cases,
    Dashboard,
    Debtors,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = LedgerConfig::from_args(cli.settings).into_diagnostic()?;
    let store = open_store(&config).into_diagnostic()?;
    let handler = RequestHandler::new(store, &config);

    match cli.command {
        Command::Health => {
            let stdout = io::stdout();
            serde_json::to_writer(stdout.lock(), &handler.health()).into_diagnostic()?;
            println!();
        }
        Command::Process {
            input,
            report,
            today,
            sort_by,
            limit,
        } => {
            let file = File::open(input).into_diagnostic()?;
            let reader = RequestReader::new(BufReader::new(file));
            for (line, request) in reader.requests().enumerate() {
                // header is line 1
                let line = line + 2;
                match request {
                    Ok(request) => {
                        if let Response::Failure(failure) = handler.handle(request).await {
                            tracing::warn!(line, kind = ?failure.kind, "Error processing request: {}", failure.message);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(line, "Error reading request: {}", e);
                    }
                }
            }

            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            print_report(&handler, report, today, sort_by, limit).await?;
        }
    }

    Ok(())
}

async fn print_report(
    handler: &RequestHandler,
    report: Report,
    today: NaiveDate,
    sort_by: DebtorRanking,
    limit: usize,
) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match report {
        Report::Cases => {
            let cases = handler
                .ledger()
                .list(CaseFilter::default())
                .await
                .into_diagnostic()?;
            CaseWriter::new(&mut out)
                .write_cases(cases.iter())
                .into_diagnostic()?;
        }
        Report::Dashboard => match handler.handle(Request::Dashboard { today }).await {
            Response::Success(Reply::Dashboard(summary)) => {
                serde_json::to_writer_pretty(&mut out, &summary).into_diagnostic()?;
                writeln!(out).into_diagnostic()?;
            }
            Response::Success(_) => return Err(miette!("unexpected dashboard reply")),
            Response::Failure(failure) => return Err(miette!("{}", failure.message)),
        },
        Report::Debtors => {
            let request = Request::TopDebtors {
                limit,
                sort_by,
                today,
            };
            match handler.handle(request).await {
                Response::Success(Reply::Debtors(debtors)) => {
                    serde_json::to_writer_pretty(&mut out, &debtors).into_diagnostic()?;
                    writeln!(out).into_diagnostic()?;
                }
                Response::Success(_) => return Err(miette!("unexpected debtors reply")),
                Response::Failure(failure) => return Err(miette!("{}", failure.message)),
            }
        }
    }
    Ok(())
}
