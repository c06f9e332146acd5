use std::path::PathBuf;

/// Runtime configuration, read once at startup from the environment (a
/// `.env` file is honored). Everything has a default; missing backup
/// credentials disable the remote channel and nothing else.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub snapshot_path: PathBuf,
    pub backup: Option<BackupConfig>,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    pub fn from_env() -> Config {
        let port = dotenv::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000);
        let snapshot_path =
            dotenv::var("SNAPSHOT_PATH").unwrap_or_else(|_| "palaver.json".to_owned()).into();
        let backup = match (dotenv::var("BACKUP_BOT_TOKEN"), dotenv::var("BACKUP_CHAT_ID")) {
            (Ok(bot_token), Ok(chat_id)) if !bot_token.is_empty() && !chat_id.is_empty() => {
                Some(BackupConfig { bot_token, chat_id })
            }
            _ => None,
        };
        Config { port, snapshot_path, backup }
    }
}
