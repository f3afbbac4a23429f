use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context as _, Error, bail};
use sensor_monitor::aggregator::LogMode;

pub const DEFAULT_EXPORT_PATH: &str = "log_sensor_60s.csv";

pub const HELP: &str = "commands: min <v> | max <v> | thresholds <min> <max> | log on|off | save [path] | table | chart | status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Min(f64),
    Max(f64),
    Thresholds(f64, f64),
    Log(LogMode),
    Save(PathBuf),
    Table,
    Chart,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(name) = words.next() else {
            bail!("empty command");
        };
        let rest: Vec<&str> = words.collect();

        let command = match (name, rest.as_slice()) {
            ("min", [v]) => Command::Min(parse_number(v)?),
            ("max", [v]) => Command::Max(parse_number(v)?),
            ("thresholds", [min, max]) => Command::Thresholds(parse_number(min)?, parse_number(max)?),
            ("log", ["on"]) => Command::Log(LogMode::ContinuousAppend),
            ("log", ["off"]) => Command::Log(LogMode::Off),
            ("save", []) => Command::Save(PathBuf::from(DEFAULT_EXPORT_PATH)),
            ("save", [path]) => Command::Save(PathBuf::from(path)),
            ("table", []) => Command::Table,
            ("chart", []) => Command::Chart,
            ("status", []) => Command::Status,
            ("help", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => bail!("unknown command: {}", s.trim()),
        };

        Ok(command)
    }
}

fn parse_number(s: &str) -> anyhow::Result<f64> {
    let v: f64 = s
        .parse()
        .with_context(|| format!("failed to parse number: {s}"))?;
    if !v.is_finite() {
        bail!("expected a finite number: {s}");
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("min -5".parse::<Command>().unwrap(), Command::Min(-5.0));
        assert_eq!("max 31.5".parse::<Command>().unwrap(), Command::Max(31.5));
        assert_eq!(
            "thresholds 10 20".parse::<Command>().unwrap(),
            Command::Thresholds(10.0, 20.0)
        );
        assert_eq!(
            "  log on ".parse::<Command>().unwrap(),
            Command::Log(LogMode::ContinuousAppend)
        );
        assert_eq!("log off".parse::<Command>().unwrap(), Command::Log(LogMode::Off));
        assert_eq!(
            "save".parse::<Command>().unwrap(),
            Command::Save(PathBuf::from(DEFAULT_EXPORT_PATH))
        );
        assert_eq!(
            "save /tmp/out.csv".parse::<Command>().unwrap(),
            Command::Save(PathBuf::from("/tmp/out.csv"))
        );
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_commands() {
        assert!("".parse::<Command>().is_err());
        assert!("min".parse::<Command>().is_err());
        assert!("min warm".parse::<Command>().is_err());
        assert!("log maybe".parse::<Command>().is_err());
        assert!("reboot".parse::<Command>().is_err());
    }

    #[test]
    fn rejects_non_finite_thresholds() {
        assert!("min NaN".parse::<Command>().is_err());
        assert!("min inf".parse::<Command>().is_err());
        assert!("max -infinity".parse::<Command>().is_err());
        assert!("thresholds 1e17 inf".parse::<Command>().is_err());
        assert_eq!(
            "thresholds 1e17 1e16".parse::<Command>().unwrap(),
            Command::Thresholds(1e17, 1e16)
        );
    }
}
