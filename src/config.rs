use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything the pipeline needs to run. Loaded once at startup and
/// immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub email: String,
    pub password: String,
    pub course_id: i64,
    pub group_id: i64,
    #[serde(default)]
    pub show_table: bool,
}

/// On-disk shape: any field may be missing, in which case the user is asked
/// for it and the completed file is written back.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PartialConfig {
    email: Option<String>,
    password: Option<String>,
    course_id: Option<i64>,
    group_id: Option<i64>,
    show_table: Option<bool>,
}

/// Load the config file, prompting on stdin for any missing values. A
/// missing or unparsable file starts from scratch rather than aborting.
pub fn load_or_prompt(path: &Path) -> Result<AppConfig> {
    let mut partial = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<PartialConfig>(&raw) {
            Ok(partial) => partial,
            Err(err) => {
                warn!("config file {} is not valid JSON ({}), starting fresh", path.display(), err);
                PartialConfig::default()
            }
        },
        Err(_) => {
            warn!("config file {} not found, values will be prompted", path.display());
            PartialConfig::default()
        }
    };

    let mut changed = false;
    let email = take_or_prompt(&mut partial.email, "email", &mut changed)?;
    let password = take_or_prompt(&mut partial.password, "password", &mut changed)?;
    let course_id = take_or_prompt(&mut partial.course_id, "course_id", &mut changed)?;
    let group_id = take_or_prompt(&mut partial.group_id, "group_id", &mut changed)?;
    let show_table = match partial.show_table {
        Some(flag) => flag,
        None => {
            changed = true;
            prompt_flag("show_table")?
        }
    };

    let config = AppConfig {
        email,
        password,
        course_id,
        group_id,
        show_table,
    };

    if changed {
        let json = serde_json::to_string_pretty(&config)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        info!("config written to {}", path.display());
    }

    Ok(config)
}

fn take_or_prompt<T>(slot: &mut Option<T>, name: &str, changed: &mut bool) -> Result<T>
where
    T: FromStr,
{
    if let Some(value) = slot.take() {
        return Ok(value);
    }
    *changed = true;
    prompt_value(name)
}

fn prompt_value<T: FromStr>(name: &str) -> Result<T> {
    loop {
        let input = read_line(&format!("Enter a value for '{name}': "))?;
        match input.trim().parse::<T>() {
            Ok(value) => return Ok(value),
            Err(_) => eprintln!("'{}' is not a valid value for {name}", input.trim()),
        }
    }
}

fn prompt_flag(name: &str) -> Result<bool> {
    loop {
        let input = read_line(&format!("Enter a value for '{name}' (yes/no): "))?;
        match parse_flag(input.trim()) {
            Some(flag) => return Ok(flag),
            None => eprintln!("'{}' is not a yes/no value", input.trim()),
        }
    }
}

/// Accepts the usual spellings; an empty answer means "no".
pub fn parse_flag(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "y" | "yes" => Some(true),
        "false" | "0" | "f" | "n" | "no" | "" => Some(false),
        _ => None,
    }
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag("yes"), Some(true));
        assert_eq!(parse_flag("Y"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn partial_config_tolerates_missing_fields() {
        let partial: PartialConfig =
            serde_json::from_str(r#"{"email": "a@b.c", "course_id": 7}"#).unwrap();
        assert_eq!(partial.email.as_deref(), Some("a@b.c"));
        assert_eq!(partial.course_id, Some(7));
        assert!(partial.password.is_none());
        assert!(partial.group_id.is_none());
    }

    #[test]
    fn full_config_roundtrips() {
        let config = AppConfig {
            email: "a@b.c".into(),
            password: "secret".into(),
            course_id: 3,
            group_id: 14,
            show_table: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.course_id, 3);
        assert!(back.show_table);
    }
}
