use anyhow::Result;
use clap::Args;
use wantwatch_core::config::{WatchConfig, default_config_path};

use crate::output::OutputMode;

/// Arguments for `wantwatch config`.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Print the default config file location and exit
    #[arg(long)]
    path: bool,
}

/// Print the effective configuration (file + environment) with secrets masked.
pub fn run_config(args: &ConfigArgs, config: &WatchConfig, output: OutputMode) -> Result<()> {
    if args.path {
        match default_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no config directory on this platform"),
        }
        return Ok(());
    }

    print!("{}", render_config(config, output)?);
    Ok(())
}

/// Masked config as JSON, or as TOML for the human modes.
fn render_config(config: &WatchConfig, output: OutputMode) -> Result<String> {
    let masked = config.masked();
    if output.is_json() {
        Ok(serde_json::to_string_pretty(&masked)? + "\n")
    } else {
        Ok(toml::to_string_pretty(&masked)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wantwatch_core::config::EmailConfig;

    fn config() -> WatchConfig {
        let mut config = WatchConfig::default();
        config.discogs.username = Some("digger".to_string());
        config.discogs.token = Some("super-secret".to_string());
        config.notify.email = Some(EmailConfig {
            from: "bot@example.com".to_string(),
            to: "me@example.com".to_string(),
            password: Some("hunter2".to_string()),
            ..EmailConfig::default()
        });
        config
    }

    #[test]
    fn json_mode_renders_masked_json() {
        let rendered = render_config(&config(), OutputMode::Json).expect("render");
        let json: serde_json::Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(json["discogs"]["token"], "********");
        assert_eq!(json["notify"]["email"]["password"], "********");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn human_modes_render_masked_toml() {
        for mode in [OutputMode::Text, OutputMode::Pretty] {
            let rendered = render_config(&config(), mode).expect("render");
            let parsed: WatchConfig = toml::from_str(&rendered).expect("toml round-trips");
            assert_eq!(parsed.discogs.username.as_deref(), Some("digger"));
            assert!(!rendered.contains("super-secret"));
        }
    }
}
