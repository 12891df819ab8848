use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use usermsg::{
    Builder, DeliveredMessage, DialogType, Dispatcher, DispatcherBuilder, MessageRegistry,
    RecipientIndex, RecipientSet,
};

#[derive(Parser)]
#[command(name = "usermsg")]
#[command(about = "Send and inspect user messages over zenoh")]
struct Cli {
    /// Zenoh endpoints to connect to
    #[arg(long = "connect", value_name = "ENDPOINT")]
    connect: Vec<String>,

    /// Root of the per-recipient key expressions
    #[arg(long, default_value = usermsg::dispatcher::DEFAULT_KEY_PREFIX)]
    prefix: String,

    /// Output structured JSON logs
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate a registered message from JSON and send it
    Send {
        /// Registered message type, e.g. SayText2
        message: String,

        /// Recipient indices
        #[arg(long = "to", value_delimiter = ',', required = true)]
        to: Vec<RecipientIndex>,

        /// Field values as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,

        /// Request reliable delivery
        #[arg(long)]
        reliable: bool,
    },
    /// Send a plugin dialog
    Dialog {
        /// MSG, MENU, TEXT, ENTRY or ASKCONNECT
        kind: DialogType,

        #[arg(long = "to", value_delimiter = ',', required = true)]
        to: Vec<RecipientIndex>,

        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Print user messages as they arrive
    Listen {
        /// Only messages addressed to this recipient
        #[arg(long)]
        recipient: Option<RecipientIndex>,

        /// Exit after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
    /// Print the built-in zenoh session defaults as JSON5
    Config,
    /// List registered message types
    Types,
}

fn init_logger(json_mode: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("usermsg=debug,zenoh=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("usermsg=info,zenoh=warn"))
    };

    if json_mode {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn recipients(to: &[RecipientIndex], reliable: bool) -> Arc<RecipientSet> {
    Arc::new(
        to.iter()
            .copied()
            .collect::<RecipientSet>()
            .with_reliable(reliable),
    )
}

fn render(msg: &DeliveredMessage, registry: &MessageRegistry) -> serde_json::Value {
    let data = if msg.is_protobuf {
        match msg.decode(registry) {
            Ok(decoded) => decoded.to_json(),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        }
    } else {
        let hex: String = msg.payload.iter().map(|b| format!("{:02x}", b)).collect();
        serde_json::json!({ "legacy": hex })
    };
    serde_json::json!({
        "recipient": msg.recipient,
        "message": msg.message_name,
        "index": msg.message_index,
        "reliable": msg.reliable,
        "data": data,
    })
}

fn run(cli: Cli, dispatcher: &Dispatcher) -> usermsg::Result<()> {
    match cli.command {
        Command::Send {
            message,
            to,
            data,
            reliable,
        } => {
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| usermsg::Error::Config(format!("invalid --data: {}", e)))?;
            let receipt = dispatcher.create_message(recipients(&to, reliable), &message, &data)?;
            info!(
                "Sent {} ({} bytes) to {} recipients",
                receipt.message_name, receipt.payload_len, receipt.recipients
            );
        }
        Command::Dialog { kind, to, data } => {
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| usermsg::Error::Config(format!("invalid --data: {}", e)))?;
            let receipt = dispatcher.create_dialog(recipients(&to, false), kind, &data)?;
            info!("Sent {} dialog to {} recipients", kind, receipt.recipients);
        }
        Command::Listen { recipient, count } => {
            let listener = dispatcher.listener(recipient)?;
            info!("Listening on {}", listener.key_expr());
            let mut seen = 0;
            while count.is_none_or(|n| seen < n) {
                let msg = listener
                    .recv()
                    .map_err(|e| usermsg::Error::Zenoh(e.to_string()))?;
                println!("{}", render(&msg, &dispatcher.registry()));
                seen += 1;
            }
        }
        Command::Config | Command::Types => {}
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.json, cli.debug);

    match cli.command {
        Command::Config => {
            print!(
                "{}",
                usermsg::config::generate_json5(
                    &usermsg::config::session_overrides(),
                    "usermsg session defaults"
                )
            );
            return;
        }
        Command::Types => {
            let registry = MessageRegistry::global().read();
            let mut types: Vec<_> = registry
                .names()
                .filter_map(|name| registry.get(name))
                .collect();
            types.sort_by_key(|t| t.index);
            for t in types {
                let format = if t.is_protobuf() { "protobuf" } else { "legacy" };
                println!("{:>4}  {:<12} {}", t.index, t.name, format);
            }
            return;
        }
        _ => {}
    }

    let mut builder = DispatcherBuilder::default().with_key_prefix(cli.prefix.clone());
    if !cli.connect.is_empty() {
        builder = builder.with_connect_endpoints(cli.connect.clone());
    }
    let dispatcher = match builder.build() {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("Failed to start dispatcher: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(cli, &dispatcher);
    if let Err(e) = dispatcher.shutdown() {
        error!("Failed to close session: {}", e);
    }
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
