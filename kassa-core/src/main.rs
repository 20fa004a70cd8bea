//! `kassa` - command line front end of the fiscal register

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kassa_core::{Config, FiscalError, FiscalRegister, NewReceipt, init_logger_with_file};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{ClosingKind, OrderLine, PayedBy};
use shared::money::{format_amount, parse_amount};
use shared::util::{format_ts, now_local, parse_ts};
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "kassa")]
#[command(about = "Fiscal register core: signed receipt chain, closings, journal", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Payment {
    Cash,
    Debit,
    Credit,
}

impl From<Payment> for PayedBy {
    fn from(p: Payment) -> Self {
        match p {
            Payment::Cash => PayedBy::Cash,
            Payment::Debit => PayedBy::DebitCard,
            Payment::Credit => PayedBy::CreditCard,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register state and due closings
    Status,

    /// Create the start receipt of a new register
    Start {
        #[arg(long)]
        user: Option<String>,
    },

    /// Sell: items as `product:count:gross:tax[:group]`
    Sell {
        #[arg(required = true, value_parser = parse_item)]
        items: Vec<OrderLine>,
        #[arg(long, value_enum, default_value = "cash")]
        payment: Payment,
        #[arg(long)]
        user: Option<String>,
    },

    /// Void a receipt
    Storno {
        receipt_num: i64,
        #[arg(long)]
        user: Option<String>,
    },

    /// Create a control receipt
    Control {
        #[arg(long)]
        user: Option<String>,
    },

    /// Day closing (Tagesabschluss)
    Eod {
        /// Reference time, defaults to now
        #[arg(long, value_parser = parse_time)]
        at: Option<chrono::NaiveDateTime>,
    },

    /// Month closing (Monatsabschluss), catches up earlier months
    Eom {
        #[arg(long, value_parser = parse_time)]
        at: Option<chrono::NaiveDateTime>,
    },

    /// Print a stored closing again, by default the latest day closing
    Reprint {
        /// Receipt number of the closing
        receipt_num: Option<i64>,
        /// Latest month closing instead of the latest day closing
        #[arg(long, conflicts_with = "receipt_num")]
        month: bool,
    },

    /// Verify the whole signature chain
    Verify,

    /// Lift the halt after an integrity violation was investigated
    Resume,

    /// Most recent journal lines
    Journal {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn parse_item(text: &str) -> Result<OrderLine, String> {
    let parts: Vec<&str> = text.split(':').collect();
    if !(4..=5).contains(&parts.len()) {
        return Err(format!("expected product:count:gross:tax[:group], got {text:?}"));
    }
    let count = Decimal::from_str(parts[1].trim()).map_err(|e| format!("count: {e}"))?;
    let gross = parse_amount(parts[2]).ok_or_else(|| format!("gross: {:?}", parts[2]))?;
    let tax = Decimal::from_str(parts[3].trim()).map_err(|e| format!("tax: {e}"))?;
    let line = OrderLine::new(parts[0].trim(), count, gross, tax);
    Ok(match parts.get(4) {
        Some(group) => line.with_group(group.trim()),
        None => line,
    })
}

fn parse_time(text: &str) -> Result<chrono::NaiveDateTime, String> {
    parse_ts(text).ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM:SS, got {text:?}"))
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(out) => println!("{out}"),
            Err(e) => tracing::error!(error = %e, "Output not serializable"),
        }
    } else {
        println!("{}", text());
    }
}

#[derive(Serialize)]
struct ReceiptOutput<'a> {
    receipt_num: i64,
    timestamp: String,
    payed_by: &'a str,
    gross: String,
    signature: &'a str,
    damaged: bool,
}

fn print_receipt(json: bool, finalized: &kassa_core::FinalizedReceipt) {
    let r = &finalized.receipt;
    let out = ReceiptOutput {
        receipt_num: r.receipt_num,
        timestamp: format_ts(&r.timestamp),
        payed_by: r.payed_by.action_text(),
        gross: format_amount(r.gross),
        signature: &r.signature,
        damaged: finalized.damaged,
    };
    print(json, &out, || {
        format!(
            "Beleg {} {} {} {}\n{}",
            out.receipt_num, out.timestamp, out.payed_by, out.gross, out.signature
        )
    });
}

fn print_closings(json: bool, outcomes: &[kassa_core::ClosingOutcome]) {
    for outcome in outcomes {
        print_receipt(json, &outcome.report);
        if !json {
            for text in outcome.record.printable_lines(false) {
                println!("  {text}");
            }
        }
        if let Some(null_receipt) = &outcome.null_receipt {
            print_receipt(json, null_receipt);
        }
        print(json, &outcome.export, || format!("DEP export: {:?}", outcome.export));
    }
}

async fn run(cli: Cli, register: FiscalRegister) -> Result<(), FiscalError> {
    let json = cli.json;
    match cli.command {
        Commands::Status => {
            let status = register.status(&now_local()).await?;
            print(json, &status, || format!("{status:#?}"));
        }
        Commands::Start { user } => print_receipt(json, &register.start_receipt(user).await?),
        Commands::Sell {
            items,
            payment,
            user,
        } => {
            let mut receipt = NewReceipt::sale(payment.into(), items);
            receipt.user_id = user;
            print_receipt(json, &register.sell(receipt).await?);
        }
        Commands::Storno { receipt_num, user } => {
            print_receipt(json, &register.storno(receipt_num, user, None).await?);
        }
        Commands::Control { user } => print_receipt(json, &register.control_receipt(user).await?),
        Commands::Eod { at } => {
            let outcome = register.end_of_day(&at.unwrap_or_else(now_local)).await?;
            print_closings(json, std::slice::from_ref(&outcome));
        }
        Commands::Eom { at } => {
            let outcomes = register.end_of_month(&at.unwrap_or_else(now_local)).await?;
            print_closings(json, &outcomes);
        }
        Commands::Reprint { receipt_num, month } => {
            let receipt_num = match receipt_num {
                Some(num) => Some(num),
                None => {
                    let kind = if month { ClosingKind::Month } else { ClosingKind::Day };
                    register.last_closing(kind).await?.map(|r| r.receipt_num)
                }
            };
            match receipt_num {
                Some(num) => {
                    let record = register.reprint_closing(num).await?;
                    print(json, &record, || record.printable_lines(false).join("\n"));
                }
                None => println!("No closing stored yet"),
            }
        }
        Commands::Verify => {
            let report = register.verify_chain().await?;
            print(json, &report, || {
                format!(
                    "{} receipts verified ({} counters, {} unsigned, {} damaged)",
                    report.verified, report.counter_checked, report.unsigned, report.damaged
                )
            });
        }
        Commands::Resume => register.resume_after_intervention(),
        Commands::Journal { limit } => {
            let lines = register.journal(limit).await?;
            print(json, &lines, || {
                lines
                    .iter()
                    .map(|l| l.text.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 1. 环境 (.env) 和日志
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();
    init_logger_with_file(Some(&config.log_level), None, config.log_dir.as_deref());

    // 2. 打开收银机
    let register = FiscalRegister::open(config)
        .await
        .context("Failed to open the fiscal register")?;

    // 3. 执行命令
    match run(cli, register).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(code = %e.code(), category = e.category().name(), error = %e, "Command failed");
            let report = serde_json::to_string(&e.report()).context("Error report not serializable")?;
            eprintln!("{report}");
            Ok(if e.is_retryable() {
                ExitCode::from(75)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
