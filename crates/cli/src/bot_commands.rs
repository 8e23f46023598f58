//! `courier bots` subcommands.

use std::path::Path;

use {clap::Subcommand, uuid::Uuid};

use courier_store::{NewBot, RecordStore};

#[derive(Subcommand)]
pub enum BotAction {
    /// Register a bot. Prints the generated id and API key.
    Add {
        #[arg(long)]
        name: String,
        /// Transport account identifier (e.g. the account address).
        #[arg(long)]
        identifier: String,
        /// Callback URL messages are forwarded to. Can be set later.
        #[arg(long)]
        callback_url: Option<String>,
        /// API key for /send. Generated when omitted.
        #[arg(long)]
        api_key: Option<String>,
        /// Debounce window in seconds. 0 disables batching.
        #[arg(long, default_value_t = 0)]
        response_delay: u32,
    },
    /// List registered bots.
    List,
    /// Set (or clear, when omitted) a bot's callback URL.
    SetCallback {
        id: String,
        #[arg(long)]
        url: Option<String>,
    },
}

pub async fn handle_bots(action: BotAction, db: &Path) -> anyhow::Result<()> {
    let pool = courier_store::open(db).await?;
    let store = RecordStore::new(pool);

    match action {
        BotAction::Add {
            name,
            identifier,
            callback_url,
            api_key,
            response_delay,
        } => {
            let api_key = api_key.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            let bot = store
                .create_bot(NewBot {
                    name,
                    identifier,
                    callback_url,
                    api_key,
                    response_delay_secs: response_delay,
                })
                .await?;
            println!("id:      {}", bot.id);
            println!("api_key: {}", bot.api_key);
        },
        BotAction::List => {
            for bot in store.list_bots().await? {
                println!(
                    "{}  {}  delay={}s  callback={}",
                    bot.id,
                    bot.name,
                    bot.response_delay_secs,
                    bot.callback_url.as_deref().unwrap_or("-"),
                );
            }
        },
        BotAction::SetCallback { id, url } => {
            store.set_callback_url(&id, url.as_deref()).await?;
            println!("callback updated for {id}");
        },
    }
    Ok(())
}
