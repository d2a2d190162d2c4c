//! mirrorctl - drive the inbox mirror from the command line

use anyhow::{Context, Result, bail};
use log::{error, info};
use std::io::Read;
use std::sync::Arc;

use mirror::config::CONFIG_FILE;
use mirror::sync::watermark;
use mirror::{
    Admission, GmailClient, HistoryId, MailService, MailStore, MirrorConfig, ReconcileOutcome, SqliteMailStore,
    SyncEngine, TokenFile,
};

const USAGE: &str = "\
Usage: mirrorctl [--account EMAIL] <command>

Commands:
  init [--force]         Write a default mirror.json to the config directory
  enumerate              List the whole inbox and store new messages
  watch [--topic NAME]   Register for push notifications
  push <FILE|->          Handle a Pub/Sub push body read from FILE or stdin
  reconcile [--from ID]  Replay history from ID (default: stored watermark)
  status                 Show the watermark and the newest messages";

#[derive(Debug, PartialEq)]
enum Command {
    Init { force: bool },
    Enumerate,
    Watch { topic: Option<String> },
    Push { source: String },
    Reconcile { from: Option<HistoryId> },
    Status,
    Help,
}

#[derive(Debug, PartialEq)]
struct Invocation {
    account: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut account = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--account" {
            account = Some(iter.next().context("--account needs a value")?.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
        ["init"] => Command::Init { force: false },
        ["init", "--force"] => Command::Init { force: true },
        ["enumerate"] => Command::Enumerate,
        ["watch"] => Command::Watch { topic: None },
        ["watch", "--topic", topic] => Command::Watch {
            topic: Some(topic.to_string()),
        },
        ["push", source] => Command::Push {
            source: source.to_string(),
        },
        ["reconcile"] => Command::Reconcile { from: None },
        ["reconcile", "--from", from] => Command::Reconcile {
            from: Some(HistoryId::new(*from)),
        },
        ["status"] => Command::Status,
        other => bail!("Unrecognized arguments: {}\n\n{}", other.join(" "), USAGE),
    };

    Ok(Invocation { account, command })
}

fn read_push_body(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut body = Vec::new();
        std::io::stdin()
            .read_to_end(&mut body)
            .context("Failed to read push body from stdin")?;
        Ok(body)
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read push body from {}", source))
    }
}

fn resolve_account(explicit: Option<String>, gmail: &dyn MailService) -> Result<String> {
    match explicit {
        Some(account) => Ok(account),
        None => Ok(gmail
            .get_profile()
            .context("Failed to resolve account from the Gmail profile")?
            .email_address),
    }
}

fn describe(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Applied { history_id, stats } => format!(
            "applied {} pages (+{} -{} restored {}), watermark {}",
            stats.pages, stats.added, stats.removed, stats.restored, history_id
        ),
        ReconcileOutcome::Rebased {
            history_id,
            enumeration,
        } => format!(
            "history expired, rebuilt ({} created, {} refreshed, {} pruned), watermark {}",
            enumeration.stats.created, enumeration.stats.refreshed, enumeration.stats.pruned, history_id
        ),
    }
}

fn print_status(store: &dyn MailStore, account: &str) -> Result<()> {
    let watermark = store.get_watermark(account)?;
    println!("account:   {}", account);
    match watermark {
        Some(wm) => println!(
            "watermark: {} (updated {})",
            wm.history_id.as_ref().map_or("none", HistoryId::as_str),
            wm.updated_at.to_rfc3339()
        ),
        None => println!("watermark: none"),
    }
    println!("messages:  {}", store.count_messages(account)?);

    for message in store.list_messages(account, 10, 0)? {
        println!(
            "  {} {}{} | {} | {}",
            message.received_at.format("%Y-%m-%d %H:%M"),
            if message.is_starred { "* " } else { "" },
            message.id,
            message.sender,
            message.subject
        );
    }
    Ok(())
}

/// Write the default config, with environment overrides applied
fn init_config(force: bool) -> Result<()> {
    if config::config_exists(CONFIG_FILE) && !force {
        bail!("{} already exists; pass --force to overwrite it", CONFIG_FILE);
    }
    let mut cfg = MirrorConfig::default();
    cfg.apply_overrides(|key| std::env::var(key).ok());
    let path = cfg.save()?;
    println!("wrote {}", path.display());
    Ok(())
}

fn run(args: Vec<String>) -> Result<()> {
    let invocation = parse_args(&args)?;
    match invocation.command {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::Init { force } => return init_config(force),
        _ => {}
    }

    let cfg = MirrorConfig::load()?;
    let database_path = cfg.database_path()?;
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let store = Arc::new(SqliteMailStore::new(&database_path)?);
    info!("Using database {}", database_path.display());

    if let (Command::Status, Some(account)) = (&invocation.command, &invocation.account) {
        return print_status(store.as_ref(), account);
    }

    let gmail = GmailClient::new(Arc::new(TokenFile::new(cfg.token_path()?)));
    if !gmail.has_credentials() {
        bail!("No Gmail credential found at {}", cfg.token_path()?.display());
    }

    let account = resolve_account(invocation.account, &gmail)?;
    let engine = SyncEngine::new(store, cfg.sync_options());

    match invocation.command {
        Command::Enumerate => {
            let result = engine.enumerate(&account, &gmail)?;
            println!(
                "{} listed, {} created, {} skipped, {} filtered, watermark {}",
                result.stats.listed, result.stats.created, result.stats.skipped, result.stats.filtered, result.history_id
            );
        }
        Command::Watch { topic } => {
            let topic = topic
                .or(cfg.pubsub_topic.clone())
                .context("No Pub/Sub topic: pass --topic or set MIRROR_PUBSUB_TOPIC")?;
            let history_id = engine.register_watch(&account, &gmail, &topic)?;
            println!("watching {}, watermark {}", topic, history_id);
        }
        Command::Push { source } => {
            let body = read_push_body(&source)?;
            match engine.handle_push(&account, &gmail, &body)? {
                Admission::Applied(outcome) => println!("{}", describe(&outcome)),
                Admission::Ignored(reason) => println!("ignored: {:?}", reason),
            }
        }
        Command::Reconcile { from } => {
            let from = match from {
                Some(from) => from,
                None => watermark::stored_position(engine.store(), &account)?
                    .context("No watermark yet: run `mirrorctl enumerate` first")?,
            };
            let outcome = engine.reconcile(&account, &gmail, &from)?;
            println!("{}", describe(&outcome));
        }
        Command::Status => print_status(engine.store(), &account)?,
        Command::Help | Command::Init { .. } => {}
    }

    Ok(())
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(std::env::args().skip(1).collect()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
