use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    repost::PromptTimeouts,
    settings::{parse_toggle, GuildDefaults, RepostMode},
    Result,
};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub settings_file: PathBuf,

    // Guild defaults
    pub guild_defaults: GuildDefaults,

    // Interaction timings
    pub prompt_timeouts: PromptTimeouts,
    pub widget_idle_timeout: Duration,
    pub post_cache_ttl: Duration,

    // Providers
    pub pixiv_base_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| var(key).map(|s| s.trim().to_string()).and_then(non_empty);
        let env_u64 = |key: &str| -> Result<Option<u64>> {
            env_str(key)
                .map(|s| {
                    s.parse::<u64>()
                        .map_err(|_| Error::Config(format!("{key} must be an integer, got {s:?}")))
                })
                .transpose()
        };
        let env_ms = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_millis(env_u64(key)?.unwrap_or(default)))
        };

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let settings_file = PathBuf::from(
            env_str("SETTINGS_FILE").unwrap_or_else(|| "/tmp/artbot-settings.json".to_string()),
        );

        let defaults = GuildDefaults::default();
        let repost_mode = match env_str("DEFAULT_REPOST_MODE") {
            Some(s) => s
                .parse::<RepostMode>()
                .map_err(|e| Error::Config(format!("DEFAULT_REPOST_MODE: {e}")))?,
            None => defaults.repost_mode,
        };
        let limit = positive("DEFAULT_REPOST_LIMIT", env_u64("DEFAULT_REPOST_LIMIT")?)?
            .unwrap_or(defaults.limit);
        let large_set = positive("DEFAULT_LARGE_SET", env_u64("DEFAULT_LARGE_SET")?)?
            .unwrap_or(defaults.large_set);
        let env_toggle = |key: &str, default: bool| -> Result<bool> {
            match env_str(key) {
                Some(s) => parse_toggle(&s).map_err(|e| Error::Config(format!("{key}: {e}"))),
                None => Ok(default),
            }
        };
        let nsfw = env_toggle("DEFAULT_NSFW", defaults.nsfw)?;
        let crosspost = env_toggle("DEFAULT_CROSSPOST", defaults.crosspost)?;
        let pixiv = env_toggle("DEFAULT_PIXIV", defaults.pixiv)?;

        let prompt_timeouts = PromptTimeouts {
            mode: env_ms("MODE_PROMPT_TIMEOUT_MS", 15_000)?,
            nsfw: env_ms("NSFW_PROMPT_TIMEOUT_MS", 10_000)?,
            large_set: env_ms("LARGE_SET_PROMPT_TIMEOUT_MS", 15_000)?,
        };
        let widget_idle_timeout = env_ms("WIDGET_IDLE_TIMEOUT_MS", 120_000)?;
        let post_cache_ttl = env_ms("POST_CACHE_TTL_MS", 30_000)?;

        let pixiv_base_url = env_str("PIXIV_BASE_URL")
            .unwrap_or_else(|| "https://www.pixiv.net".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            telegram_bot_token,
            settings_file,
            guild_defaults: GuildDefaults {
                repost_mode,
                limit,
                large_set,
                nsfw,
                crosspost,
                pixiv,
            },
            prompt_timeouts,
            widget_idle_timeout,
            post_cache_ttl,
            pixiv_base_url,
        })
    }
}

fn positive(key: &str, v: Option<u64>) -> Result<Option<usize>> {
    match v {
        Some(0) => Err(Error::Config(format!("{key} must be positive"))),
        Some(n) => usize::try_from(n)
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} is too large"))),
        None => Ok(None),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap();
        assert_eq!(cfg.settings_file, PathBuf::from("/tmp/artbot-settings.json"));
        assert_eq!(cfg.guild_defaults, GuildDefaults::default());
        assert_eq!(cfg.prompt_timeouts, PromptTimeouts::default());
        assert_eq!(cfg.widget_idle_timeout, Duration::from_secs(120));
        assert_eq!(cfg.post_cache_ttl, Duration::from_secs(30));
        assert_eq!(cfg.pixiv_base_url, "https://www.pixiv.net");
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(load(&[]), Err(Error::Config(_))));
        assert!(matches!(
            load(&[("TELEGRAM_BOT_TOKEN", "  ")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DEFAULT_NSFW", "on"),
            ("DEFAULT_CROSSPOST", "disabled"),
            ("DEFAULT_REPOST_MODE", "Embeds"),
            ("DEFAULT_REPOST_LIMIT", "7"),
            ("NSFW_PROMPT_TIMEOUT_MS", "500"),
            ("PIXIV_BASE_URL", "http://127.0.0.1:9000/"),
        ])
        .unwrap();
        assert!(cfg.guild_defaults.nsfw);
        assert!(!cfg.guild_defaults.crosspost);
        assert!(cfg.guild_defaults.pixiv);
        assert_eq!(cfg.guild_defaults.repost_mode, RepostMode::Embeds);
        assert_eq!(cfg.guild_defaults.limit, 7);
        assert_eq!(cfg.prompt_timeouts.nsfw, Duration::from_millis(500));
        assert_eq!(cfg.pixiv_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        for (k, v) in [
            ("DEFAULT_REPOST_LIMIT", "0"),
            ("DEFAULT_LARGE_SET", "lots"),
            ("POST_CACHE_TTL_MS", "-1"),
            ("DEFAULT_REPOST_MODE", "gallery"),
            ("DEFAULT_PIXIV", "sometimes"),
        ] {
            let res = load(&[("TELEGRAM_BOT_TOKEN", "t"), (k, v)]);
            assert!(matches!(res, Err(Error::Config(_))), "{k}={v}");
        }
    }

    #[test]
    fn dotenv_lines_are_parsed() {
        let parsed = parse_dotenv("# comment\nA=1\n B = \"two words\" \nbad line\n=x\nC='3'\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
    }
}
