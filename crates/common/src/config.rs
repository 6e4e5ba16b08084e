use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// IRC server host
    pub irc_host: String,

    /// IRC server port (default: 6697)
    pub irc_port: u16,

    /// Connect to the IRC server over TLS (default: true)
    pub irc_tls: bool,

    /// Nick the bot registers with
    pub irc_nick: String,

    /// NickServ password, identified with after registration
    pub irc_nick_password: Option<String>,

    /// Channels to serve, case-folded, in configured order
    pub channels: Vec<String>,

    /// Case-folded nicks whose messages are never processed
    pub ignores: HashSet<String>,

    /// Channel that receives operational alerts
    pub alerts_channel: String,

    /// Maximum concurrently running title fetches per channel (default: 3)
    pub max_workers_per_channel: usize,

    /// How long the delivery stage waits for a single title (default: 30)
    pub title_timeout_secs: u64,

    /// Text placed before every delivered title
    pub title_prefix: String,

    /// Case-folded titles that are never posted
    pub skip_titles: HashSet<String>,

    /// Per-request HTTP timeout for title fetches (default: 15)
    pub http_timeout_secs: u64,

    /// Verify HTTPS certificates when fetching titles (default: false)
    pub http_verify_tls: bool,

    /// Maximum number of response bytes read per page (default: 1 MiB)
    pub http_max_body_bytes: usize,

    /// User agent sent with title fetches
    pub user_agent: String,

    /// Emit JSON formatted logs
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };

        let channels: Vec<String> = split_list(&required("TITLEBOT_CHANNELS")?, ',')
            .into_iter()
            .map(|c| casefold(&c))
            .collect();
        if channels.is_empty() {
            anyhow::bail!("TITLEBOT_CHANNELS must name at least one channel");
        }

        let max_workers_per_channel: usize = lookup("TITLEBOT_MAX_WORKERS_PER_CHANNEL")
            .unwrap_or_else(|| "3".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("TITLEBOT_MAX_WORKERS_PER_CHANNEL must be a valid usize"))?;
        if max_workers_per_channel == 0 {
            anyhow::bail!("TITLEBOT_MAX_WORKERS_PER_CHANNEL must be at least 1");
        }

        let title_timeout_secs: u64 = lookup("TITLEBOT_TITLE_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("TITLEBOT_TITLE_TIMEOUT_SECS must be a valid u64"))?;
        if title_timeout_secs == 0 {
            anyhow::bail!("TITLEBOT_TITLE_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            irc_host: required("IRC_HOST")?,
            irc_port: lookup("IRC_PORT")
                .unwrap_or_else(|| "6697".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("IRC_PORT must be a valid u16"))?,
            irc_tls: parse_bool("IRC_TLS", lookup("IRC_TLS"), true)?,
            irc_nick: required("IRC_NICK")?,
            irc_nick_password: lookup("IRC_NICK_PASSWORD").filter(|p| !p.is_empty()),
            channels,
            ignores: lookup("TITLEBOT_IGNORES")
                .map(|v| split_list(&v, ',').iter().map(|u| casefold(u)).collect())
                .unwrap_or_default(),
            alerts_channel: required("TITLEBOT_ALERTS_CHANNEL")?,
            max_workers_per_channel,
            title_timeout_secs,
            title_prefix: lookup("TITLEBOT_TITLE_PREFIX").unwrap_or_else(|| "↳".to_string()),
            skip_titles: lookup("TITLEBOT_SKIP_TITLES")
                .map(|v| split_list(&v, '|').iter().map(|t| casefold(t)).collect())
                .unwrap_or_default(),
            http_timeout_secs: lookup("TITLEBOT_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TITLEBOT_HTTP_TIMEOUT_SECS must be a valid u64"))?,
            http_verify_tls: parse_bool(
                "TITLEBOT_HTTP_VERIFY_TLS",
                lookup("TITLEBOT_HTTP_VERIFY_TLS"),
                false,
            )?,
            http_max_body_bytes: lookup("TITLEBOT_HTTP_MAX_BODY_BYTES")
                .unwrap_or_else(|| "1048576".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TITLEBOT_HTTP_MAX_BODY_BYTES must be a valid usize"))?,
            user_agent: lookup("TITLEBOT_USER_AGENT")
                .unwrap_or_else(|| format!("titlebot/{}", env!("CARGO_PKG_VERSION"))),
            log_json: parse_bool("TITLEBOT_LOG_JSON", lookup("TITLEBOT_LOG_JSON"), false)?,
        })
    }

    pub fn title_timeout(&self) -> Duration {
        Duration::from_secs(self.title_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Case-fold an identifier for comparison (channels, nicks, titles).
pub fn casefold(s: &str) -> String {
    s.trim().to_lowercase()
}

fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> anyhow::Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!("{key} must be a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("IRC_HOST", "irc.example.net"),
            ("IRC_NICK", "TitleBot"),
            ("TITLEBOT_CHANNELS", "#Rust, #bots"),
            ("TITLEBOT_ALERTS_CHANNEL", "#titlebot-alerts"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> anyhow::Result<AppConfig> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.irc_port, 6697);
        assert!(config.irc_tls);
        assert_eq!(config.irc_nick_password, None);
        assert_eq!(config.channels, vec!["#rust".to_string(), "#bots".to_string()]);
        assert!(config.ignores.is_empty());
        assert_eq!(config.max_workers_per_channel, 3);
        assert_eq!(config.title_timeout(), Duration::from_secs(30));
        assert_eq!(config.title_prefix, "↳");
        assert!(config.skip_titles.is_empty());
        assert!(!config.http_verify_tls);
        assert_eq!(config.http_max_body_bytes, 1024 * 1024);
        assert!(config.user_agent.starts_with("titlebot/"));
    }

    #[test]
    fn test_lists_are_casefolded() {
        let mut vars = base_vars();
        vars.insert("TITLEBOT_IGNORES", "SomeBot,  Other ");
        vars.insert("TITLEBOT_SKIP_TITLES", "Imgur: The magic of the Internet|YouTube");
        let config = load(&vars).unwrap();
        assert!(config.ignores.contains("somebot"));
        assert!(config.ignores.contains("other"));
        assert!(config.skip_titles.contains("imgur: the magic of the internet"));
        assert!(config.skip_titles.contains("youtube"));
    }

    #[test]
    fn test_missing_required() {
        let mut vars = base_vars();
        vars.remove("IRC_HOST");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("IRC_HOST"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut vars = base_vars();
        vars.insert("TITLEBOT_MAX_WORKERS_PER_CHANNEL", "0");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_zero_title_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("TITLEBOT_TITLE_TIMEOUT_SECS", "0");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("TITLEBOT_TITLE_TIMEOUT_SECS"));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut vars = base_vars();
        vars.insert("IRC_TLS", "maybe");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("IRC_TLS"));
    }

    #[test]
    fn test_blank_channel_list_rejected() {
        let mut vars = base_vars();
        vars.insert("TITLEBOT_CHANNELS", " , ");
        assert!(load(&vars).is_err());
    }
}
