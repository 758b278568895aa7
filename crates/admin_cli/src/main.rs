use std::{error::Error, io::Write};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{Engine, TransferToken};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "pocketpay_admin")]
#[command(about = "Operator utilities for PocketPay (accounts, PINs, wallets, tokens)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./pocketpay.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Account(Account),
    Pin(Pin),
    Wallet(Wallet),
    /// Completed transfers of an account, newest first.
    History(AccountArg),
    Token(Token),
}

#[derive(Args, Debug)]
struct AccountArg {
    #[arg(long)]
    account: Uuid,
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create(AccountCreateArgs),
}

#[derive(Args, Debug)]
struct AccountCreateArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
    /// Prompted for when omitted.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct Pin {
    #[command(subcommand)]
    command: PinCommand,
}

#[derive(Subcommand, Debug)]
enum PinCommand {
    Set(PinSetArgs),
}

#[derive(Args, Debug)]
struct PinSetArgs {
    #[arg(long)]
    account: Uuid,
    /// Prompted for when omitted.
    #[arg(long)]
    pin: Option<String>,
}

#[derive(Args, Debug)]
struct Wallet {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Balance and credited top-ups.
    Show(AccountArg),
}

#[derive(Args, Debug)]
struct Token {
    #[command(subcommand)]
    command: TokenCommand,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    Show(TokenShowArgs),
}

#[derive(Args, Debug)]
struct TokenShowArgs {
    #[arg(long)]
    token: String,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, Box<dyn Error + Send + Sync>> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn prompt_secret(prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                break;
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                    out.flush()?;
                }
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
                out.flush()?;
            }
            _ => {}
        }
    }

    Ok(buf)
}

/// Ask for a secret twice until both entries match (three tries).
fn prompt_secret_twice(label: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let mut out = std::io::stderr();
    for _ in 0..3 {
        let first = prompt_secret(&format!("{label}: "))?;
        if first.is_empty() {
            execute!(
                out,
                cursor::MoveToColumn(0),
                terminal::Clear(ClearType::CurrentLine),
                Print(format!("{label} must not be empty.\r\n"))
            )?;
            continue;
        }

        let second = prompt_secret(&format!("Confirm {}: ", label.to_lowercase()))?;
        if first == second {
            return Ok(first);
        }

        execute!(
            out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print("Entries do not match. Try again.\r\n")
        )?;
    }

    Err("too many attempts".into())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_token(token: &TransferToken) {
    let amount = token
        .amount
        .map_or_else(|| "-".to_string(), |amount| amount.to_string());
    let receiver = token
        .receiver
        .as_ref()
        .map_or("-", |party| party.email.as_str());
    let when = token
        .redeemed_at
        .map_or_else(|| token.created_at.to_rfc3339(), |at| at.to_rfc3339());

    println!(
        "{}  {:<8}  {:>12}  {} -> {}  {}",
        token.token,
        token.status.as_str(),
        amount,
        token.sender.email,
        receiver,
        when
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Account(Account {
            command: AccountCommand::Create(args),
        }) => {
            let password = match args.password {
                Some(password) => password,
                None => prompt_secret_twice("Password")?,
            };
            let account = engine.register(&args.email, &args.name, &password).await?;
            println!("created account: {} ({})", account.email, account.id);
        }
        Command::Pin(Pin {
            command: PinCommand::Set(args),
        }) => {
            let pin = match args.pin {
                Some(pin) => pin,
                None => prompt_secret_twice("PIN")?,
            };
            engine.set_pin(args.account, &pin).await?;
            println!("pin set for account {}", args.account);
        }
        Command::Wallet(Wallet {
            command: WalletCommand::Show(args),
        }) => {
            let account = engine.account(args.account).await?;
            let wallet = engine.wallet(args.account).await?;
            println!(
                "{} ({}): balance {} (updated {})",
                account.display_name,
                account.email,
                wallet.balance,
                wallet.updated_at.to_rfc3339()
            );
            for top_up in engine.top_ups(args.account).await? {
                println!(
                    "  top-up {:<24}  {:>12}  {}",
                    top_up.reference,
                    top_up.amount,
                    top_up.created_at.to_rfc3339()
                );
            }
        }
        Command::History(args) => {
            let transfers = engine.history(args.account).await?;
            if transfers.is_empty() {
                println!("no completed transfers");
            }
            for transfer in &transfers {
                print_token(transfer);
            }
        }
        Command::Token(Token {
            command: TokenCommand::Show(args),
        }) => match engine.lookup_token(&args.token).await? {
            Some(token) => print_token(&token),
            None => {
                eprintln!("token not found: {}", args.token);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
