use std::path::PathBuf;

use anyhow::Context;

/// Where progress lives: `$XDG_DATA_HOME`, else `~/.local/share/phonicspath`.
pub fn default_data_path() -> anyhow::Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg).join("phonicspath"));
    }
    let mut home = PathBuf::from(std::env::var("HOME").context("HOME is not set")?);
    home.push(".local/share/phonicspath");
    Ok(home)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub profile: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn resolve(
        data_dir: Option<PathBuf>,
        profile: Option<String>,
        log_level: Option<String>,
    ) -> anyhow::Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_path()?,
        };
        Ok(Self {
            data_dir,
            profile: profile.filter(|p| !p.trim().is_empty()),
            log_level: log_level.unwrap_or_else(|| "warn".to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win() {
        let config = Config::resolve(
            Some(PathBuf::from("/tmp/progress")),
            Some("sam".into()),
            Some("debug".into()),
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/progress"));
        assert_eq!(config.profile.as_deref(), Some("sam"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn blank_profile_means_default() {
        let config = Config::resolve(Some(PathBuf::from(".")), Some("  ".into()), None).unwrap();
        assert_eq!(config.profile, None);
        assert_eq!(config.log_level, "warn");
    }
}
