//! CLI entry point for `mailslot`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

use mailslot::config::{self, Config};
use mailslot::inbox::{self, RateLimiter, Submission};
use mailslot::ingest::{Delivery, Envelope, Ingestor, Outcome};
use mailslot::model::mailbox::{MailboxKey, MessageMode};
use mailslot::model::message::InboxMessage;
use mailslot::store::Backend;

#[derive(Parser)]
#[command(name = "mailslot", version, about = "Disposable slug@domain mailboxes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a mailbox and print its private token
    Create {
        /// Mailbox address (slug@domain); a name is generated when omitted
        address: Option<String>,
        /// Domain for a generated name (default: first allowed domain)
        #[arg(long, conflicts_with = "address")]
        domain: Option<String>,
        #[arg(long, value_enum, default_value = "anonymous")]
        mode: Mode,
    },
    /// Ingest one raw email (RFC 5322) from a file or stdin
    Ingest {
        /// Path to the raw message, or "-" for stdin
        #[arg(default_value = "-")]
        file: PathBuf,
        /// Envelope recipient
        #[arg(long)]
        to: String,
        /// Envelope sender
        #[arg(long, default_value = "")]
        from: String,
        /// Transport message id; redelivering with the same id overwrites
        #[arg(long, env = "MAILSLOT_TRANSPORT_ID")]
        id: Option<String>,
    },
    /// Leave an anonymous note in a mailbox
    Send {
        address: String,
        text: String,
        /// Client identifier used for rate limiting
        #[arg(long, default_value = "cli")]
        client: String,
    },
    /// List messages, newest first
    List {
        address: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one message and mark it read
    Read { address: String, id: String },
    /// Delete one message, or the whole mailbox when no id is given
    Delete { address: String, id: Option<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Anonymous,
    Identified,
}

impl From<Mode> for MessageMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Anonymous => MessageMode::Anonymous,
            Mode::Identified => MessageMode::Identified,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let store = Backend::from_config(&config)?;

    match cli.command {
        Commands::Create {
            address,
            domain,
            mode,
        } => cmd_create(&store, &config, address.as_deref(), domain.as_deref(), mode),
        Commands::Ingest { file, to, from, id } => cmd_ingest(store, &config, &file, to, from, id),
        Commands::Send {
            address,
            text,
            client,
        } => cmd_send(&store, &config, &address, &text, &client),
        Commands::List { address, json } => cmd_list(&store, &config, &address, json),
        Commands::Read { address, id } => cmd_read(&store, &config, &address, &id),
        Commands::Delete { address, id } => cmd_delete(&store, &config, &address, id.as_deref()),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailslot.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Parse an address and check it against the served domains.
fn mailbox(config: &Config, address: &str) -> anyhow::Result<MailboxKey> {
    Ok(MailboxKey::parse_allowed(
        address,
        &config.mailbox.allowed_domains,
    )?)
}

fn cmd_create(
    store: &Backend,
    config: &Config,
    address: Option<&str>,
    domain: Option<&str>,
    mode: Mode,
) -> anyhow::Result<()> {
    let meta = match address {
        Some(address) => {
            let key = mailbox(config, address)?;
            inbox::create_mailbox(store, &key, mode.into(), Utc::now())?
        }
        None => {
            let allowed = &config.mailbox.allowed_domains;
            let domain = match domain {
                Some(d) => d.to_lowercase(),
                None => allowed
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no allowed domains configured"))?,
            };
            if !allowed.contains(&domain) {
                return Err(mailslot::error::MailslotError::DomainNotAllowed(domain).into());
            }
            inbox::create_generated_mailbox(store, &domain, mode.into(), Utc::now())?
        }
    };
    println!("Created {}@{}", meta.slug, meta.domain);
    println!("Token: {}", meta.token);
    Ok(())
}

fn cmd_ingest(
    store: Backend,
    config: &Config,
    file: &Path,
    to: String,
    from: String,
    id: Option<String>,
) -> anyhow::Result<()> {
    let raw = if file == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(file).map_err(|e| mailslot::error::MailslotError::io(file, e))?
    };

    let ingestor = Ingestor::new(store, config.mailbox.allowed_domains.clone())
        .with_max_content_chars(config.limits.max_content_chars);
    let delivery = Delivery {
        envelope: Envelope {
            recipient: to,
            sender: from,
        },
        raw,
        transport_id: id,
    };

    // A store failure propagates as a non-zero exit so the caller can retry.
    match ingestor.ingest(&delivery)? {
        Outcome::Stored { key, id } => println!("Stored {id} at {key}"),
        Outcome::Dropped(reason) => println!("Dropped: {reason}"),
    }
    Ok(())
}

fn cmd_send(
    store: &Backend,
    config: &Config,
    address: &str,
    text: &str,
    client: &str,
) -> anyhow::Result<()> {
    let key = mailbox(config, address)?;
    let state = config::rate_limit_path(config);
    let limiter = RateLimiter::load(
        &state,
        config.limits.rate_limit,
        Duration::from_secs(config.limits.rate_limit_window_secs),
    );
    let submission = Submission {
        mailbox: &key,
        content: text,
        client,
    };
    let now = Utc::now();
    let sent = inbox::submit_anonymous(store, &limiter, &submission, now);
    // A hit counts even when the submission then fails.
    limiter.save(&state, now)?;
    let message = sent?;
    println!("Sent {}", message.id());
    Ok(())
}

fn cmd_list(store: &Backend, config: &Config, address: &str, json: bool) -> anyhow::Result<()> {
    let key = mailbox(config, address)?;
    let messages = inbox::list_messages(store, &key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No messages for {key}");
        return Ok(());
    }
    for message in &messages {
        let marker = if message.is_read() { ' ' } else { '*' };
        let when = message.created_at().format("%Y-%m-%d %H:%M");
        let summary = match message {
            InboxMessage::Email(m) => format!("{} | {}", m.from_name, m.subject),
            InboxMessage::Anonymous(_) => "(anonymous)".to_string(),
        };
        println!("{marker} {when}  {:<28}  {summary}", message.id());
    }
    Ok(())
}

fn cmd_read(store: &Backend, config: &Config, address: &str, id: &str) -> anyhow::Result<()> {
    let key = mailbox(config, address)?;
    let message = inbox::set_read(store, &key, id, true)?;

    if let InboxMessage::Email(m) = &message {
        println!("From:     {} <{}>", m.from_name, m.from);
        println!("Reply-To: {}", m.reply_to);
        println!("Subject:  {}", m.subject);
    }
    println!("Date:     {}", message.created_at().to_rfc2822());
    println!();
    println!("{}", message.content());
    Ok(())
}

fn cmd_delete(
    store: &Backend,
    config: &Config,
    address: &str,
    id: Option<&str>,
) -> anyhow::Result<()> {
    let key = mailbox(config, address)?;
    match id {
        Some(id) => {
            inbox::delete_message(store, &key, id)?;
            println!("Deleted {id}");
        }
        None => {
            let count = inbox::delete_mailbox(store, &key)?;
            println!("Deleted {key} and {count} message(s)");
        }
    }
    Ok(())
}
