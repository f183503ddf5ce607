use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use referral_ledger::ledger_constants::is_env_flag_set;
use referral_ledger::store::ledger::TxLogFilter;
use referral_ledger::{EarningsType, EngineConfig, LedgerEngine, Role};

#[derive(Parser, Debug)]
#[command(name = "referral-ledger", version, about = "Referral ledger operator CLI")]
struct Cli {
    /// Engine config (TOML); LEDGER_* env vars override it
    #[arg(long, global = true, default_value = "ledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and apply the schema
    Init,

    /// Register a member
    Register {
        #[arg(long)]
        username: String,
        /// MEMBER, APPROVER, MERCHANT or ADMIN
        #[arg(long, default_value = "MEMBER", value_parser = parse_role)]
        role: Role,
        /// Upline member id
        #[arg(long)]
        referrer: Option<i64>,
    },

    /// Create or update a package definition
    Package {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        name: String,
        /// Maturity payout percentage
        #[arg(long)]
        percentage: f64,
        #[arg(long)]
        days: i64,
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },

    /// Credit the company reserve
    FundReserve {
        #[arg(long)]
        amount: f64,
    },

    /// Credit a merchant's float
    Float {
        #[arg(long)]
        merchant: i64,
        #[arg(long)]
        amount: f64,
    },

    /// Buy a package (wallet, then earnings, then bounty)
    Purchase {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        package: i64,
        #[arg(long)]
        amount: f64,
    },

    /// Buy a package from earnings and bounty only
    Reinvest {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        package: i64,
        #[arg(long)]
        amount: f64,
    },

    /// Claim a matured package connection
    Claim {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        connection: i64,
    },

    /// Request a withdrawal from an earnings bucket
    Withdraw {
        #[arg(long)]
        member: i64,
        /// PACKAGE or REFERRAL
        #[arg(long = "type", value_parser = parse_earnings_type)]
        earnings_type: EarningsType,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        payout: String,
    },

    ApproveWithdrawal {
        #[arg(long)]
        request: i64,
        #[arg(long)]
        by: i64,
    },

    RejectWithdrawal {
        #[arg(long)]
        request: i64,
        #[arg(long)]
        by: i64,
        #[arg(long)]
        reason: String,
    },

    /// Open a top-up request
    Deposit {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        merchant: Option<i64>,
    },

    ApproveDeposit {
        #[arg(long)]
        request: i64,
        #[arg(long)]
        by: i64,
    },

    RejectDeposit {
        #[arg(long)]
        request: i64,
        #[arg(long)]
        by: i64,
        #[arg(long)]
        reason: String,
    },

    /// Show a member with their direct referrer and ancestry path
    Member {
        #[arg(long)]
        member: i64,
    },

    /// List a member's notifications
    Notifications {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        unread: bool,
        /// Mark everything read after listing
        #[arg(long)]
        mark_read: bool,
    },

    /// Show a member's buckets
    Balance {
        #[arg(long)]
        member: i64,
    },

    /// Transaction log, newest first
    History {
        #[arg(long)]
        member: Option<i64>,
        /// RFC 3339 lower bound (inclusive)
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound (exclusive)
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Check stored balances against the transaction log
    Reconcile {
        /// Single member; all ledgers when omitted
        #[arg(long)]
        member: Option<i64>,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).ok_or_else(|| format!("unknown role '{s}'"))
}

fn parse_earnings_type(s: &str) -> Result<EarningsType, String> {
    EarningsType::parse(s).ok_or_else(|| format!("unknown earnings type '{s}'"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // init tracing from env LEDGER_LOG or RUST_LOG
    let filter = std::env::var("LEDGER_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(!is_env_flag_set("NO_COLOR"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_env(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let mut engine = LedgerEngine::open(config).context("opening ledger database")?;

    run(&mut engine, cli.cmd)
}

fn run(engine: &mut LedgerEngine, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init => {
            info!(
                "[LEDGER] database ready at {}",
                engine.config().database_path.display()
            );
            print_json(&engine.company_funds()?)
        }
        Commands::Register {
            username,
            role,
            referrer,
        } => print_json(&engine.register_member(&username, role, referrer)?),
        Commands::Package {
            id,
            name,
            percentage,
            days,
            disabled,
        } => print_json(&engine.upsert_package(id, &name, percentage, days, !disabled)?),
        Commands::FundReserve { amount } => print_json(&engine.fund_company_reserve(amount)?),
        Commands::Float { merchant, amount } => {
            let balance = engine.top_up_merchant_float(merchant, amount)?;
            print_json(&serde_json::json!({ "merchant_id": merchant, "float": balance }))
        }
        Commands::Purchase {
            member,
            package,
            amount,
        } => print_json(&engine.purchase(member, package, amount)?),
        Commands::Reinvest {
            member,
            package,
            amount,
        } => print_json(&engine.reinvest(member, package, amount)?),
        Commands::Claim { member, connection } => {
            print_json(&engine.claim_package(member, connection)?)
        }
        Commands::Withdraw {
            member,
            earnings_type,
            amount,
            payout,
        } => print_json(&engine.request_withdrawal(member, earnings_type, amount, &payout)?),
        Commands::ApproveWithdrawal { request, by } => {
            print_json(&engine.approve_withdrawal(request, by)?)
        }
        Commands::RejectWithdrawal {
            request,
            by,
            reason,
        } => print_json(&engine.reject_withdrawal(request, by, &reason)?),
        Commands::Deposit {
            member,
            amount,
            merchant,
        } => print_json(&engine.request_deposit(member, amount, merchant)?),
        Commands::ApproveDeposit { request, by } => print_json(&engine.approve_deposit(request, by)?),
        Commands::RejectDeposit {
            request,
            by,
            reason,
        } => print_json(&engine.reject_deposit(request, by, &reason)?),
        Commands::Member { member } => {
            let record = engine.member(member)?;
            print_json(&serde_json::json!({
                "member": record,
                "referrer_id": engine.referrer(member)?,
                "hierarchy": engine.hierarchy(member)?,
            }))
        }
        Commands::Notifications {
            member,
            unread,
            mark_read,
        } => {
            print_json(&engine.notifications(member, unread)?)?;
            if mark_read {
                let marked = engine.mark_notifications_read(member)?;
                info!("[NOTIFY] marked {} notifications read for member #{}", marked, member);
            }
            Ok(())
        }
        Commands::Balance { member } => print_json(&engine.balances(member)?),
        Commands::History {
            member,
            since,
            until,
            limit,
        } => {
            let filter = TxLogFilter {
                member_id: member,
                since,
                until,
                limit: Some(limit),
            };
            print_json(&engine.transactions(&filter)?)
        }
        Commands::Reconcile { member: Some(member) } => print_json(&engine.reconcile(member)?),
        Commands::Reconcile { member: None } => {
            let mismatches = engine.reconcile_all()?;
            print_json(&mismatches)?;
            if mismatches.is_empty() {
                Ok(())
            } else {
                Err(anyhow!("{} ledgers out of balance", mismatches.len()))
            }
        }
    }
}
