mod oasis;
mod server;

use crate::oasis::analysis::ForecastErrorTable;
use crate::oasis::summary::{ErrorSummary, hourly_profile, weekday_profile};
use crate::oasis::{DEFAULT_BASE_URL, DEFAULT_TAC_AREA, OasisClient, areas, format_period};
use crate::server::{ReportQueries, start_server};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::debug;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Parser)]
#[command(
    name = "oasis-load-error",
    about = "Hourly load forecast error from CAISO OASIS reports"
)]
struct Cli {
    /// OASIS SingleZip endpoint
    #[arg(long, env = "OASIS_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch forecast and actual load and print the hourly error table.
    Report {
        /// OASIS query name of the forecast report.
        #[arg(long, default_value = "SLD_FCST")]
        forecast_query: String,

        /// OASIS query name of the actual load report.
        #[arg(long)]
        actual_query: String,

        /// First operating date (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// End of the period, exclusive (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,

        /// TAC area to analyse.
        #[arg(long, default_value = DEFAULT_TAC_AREA)]
        tac_area: String,

        /// Print the merged table as CSV instead of the text report.
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// List the known TAC areas.
    Zones,
    /// Serve the error analysis over HTTP.
    Serve {
        /// OASIS query name of the forecast report.
        #[arg(long, default_value = "SLD_FCST")]
        forecast_query: String,

        /// OASIS query name of the actual load report.
        #[arg(long)]
        actual_query: String,

        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:3044")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = OasisClient::with_base_url(cli.base_url);
    debug!(base_url = client.base_url(), "using OASIS endpoint");

    match cli.command {
        Commands::Report {
            forecast_query,
            actual_query,
            start,
            end,
            tac_area,
            csv,
        } => {
            if start >= end {
                bail!("--start ({}) must be before --end ({})", start, end);
            }
            let (period_start, period_end) = format_period(start, end);

            let table = client
                .fetch_forecast_error(
                    &forecast_query,
                    &actual_query,
                    &period_start,
                    &period_end,
                    &tac_area,
                )
                .await?;

            if csv {
                print!("{}", table.to_csv()?);
            } else {
                print_report(&tac_area, &table);
            }
        }
        Commands::Zones => {
            for area in areas::list_tac_areas() {
                println!("{}", area);
            }
        }
        Commands::Serve {
            forecast_query,
            actual_query,
            bind,
        } => {
            let queries = ReportQueries {
                forecast: forecast_query,
                actual: actual_query,
            };
            start_server(client, queries, &bind).await?;
        }
    }

    Ok(())
}

fn print_report(tac_area: &str, table: &ForecastErrorTable) {
    let label = areas::get_tac_area(tac_area)
        .map(|area| area.to_string())
        .unwrap_or_else(|| tac_area.to_string());
    println!("=== Load Forecast Error: {} ===\n", label);

    if table.is_empty() {
        println!("No hours with both forecast and actual load.");
        return;
    }

    let columns = table.columns();
    println!(
        "{:10} | {:6} | {:11} | {:9} | {:9} | {:13} | {:13} | over",
        columns[0], columns[1], columns[2], columns[3], columns[4], columns[5], columns[6]
    );
    for row in table.rows() {
        println!(
            "{} | {:6} | {:11.2} | {:9.2} | {:9.2} | {:13.2} | {:+13.2} | {}",
            row.opr_dt,
            row.opr_hr,
            row.mw_forecast,
            row.mw_actual,
            row.abs_error,
            row.percent_error,
            row.forecast_bias,
            if row.is_over_forecast() { "*" } else { "" }
        );
    }

    let summary = ErrorSummary::from_table(table);
    println!("\n=== Summary ({} hours) ===", summary.hours);
    println!("  MAE: {:.2} MW", summary.mean_absolute_error);
    match summary.mean_absolute_percent_error {
        Some(mape) => println!("  MAPE: {:.2}%", mape),
        None => println!("  MAPE: n/a"),
    }
    println!("  RMSE: {:.2} MW", summary.root_mean_square_error);
    println!(
        "  Mean bias: {:+.2} MW ({})",
        summary.mean_bias,
        summary.bias_direction()
    );
    if let Some(worst) = &summary.worst_hour {
        println!(
            "  Worst hour: {} HE{} | {:.2} MW off",
            worst.opr_dt, worst.opr_hr, worst.abs_error
        );
    }

    println!("\n=== Error by Hour ===");
    for bucket in hourly_profile(table) {
        println!(
            "  HE{:02} | MAE {:8.2} MW | Bias {:+8.2} MW",
            bucket.key, bucket.mean_absolute_error, bucket.mean_bias
        );
    }

    println!("\n=== Error by Weekday ===");
    for bucket in weekday_profile(table) {
        let day = WEEKDAYS.get(bucket.key as usize).copied().unwrap_or("?");
        println!(
            "  {} | MAE {:8.2} MW | Bias {:+8.2} MW",
            day, bucket.mean_absolute_error, bucket.mean_bias
        );
    }
}
