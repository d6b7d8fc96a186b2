//! Startup configuration: a Java-style properties file (key=value, `#` or
//! `!` comments).  Unknown keys are ignored so property files can be
//! shared with other tools.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// SW501 dip switches, `gpp_dipsw` as a binary literal.
    pub gpp_dipsw: u8,
    /// Monitor ROM image path.
    pub monitor_rom: Option<String>,
    /// H17 boot ROM image path.
    pub h17_rom: Option<String>,
    /// Every property as read, for the card keys.
    props: BTreeMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let config = Self::parse(&text);
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Self {
        let mut config = Config::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("ignoring malformed property line: {}", line);
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();

            match key.as_str() {
                "gpp_dipsw" => match u8::from_str_radix(&value, 2) {
                    Ok(v) => config.gpp_dipsw = v,
                    Err(_) => warn!("gpp_dipsw is not a binary literal: {}", value),
                },
                "monitor_rom" => config.monitor_rom = Some(value.clone()),
                "h17_rom" => config.h17_rom = Some(value.clone()),
                _ => debug!("property {} = {}", key, value),
            }
            config.props.insert(key, value);
        }

        config
    }

    /// Is any property present for the given card prefix?
    pub fn has_card(&self, card: &str) -> bool {
        let prefix = format!("{}_", card);
        self.props.keys().any(|k| k.starts_with(&prefix))
    }

    /// `<card>_driveN` properties: (0-based unit, drive-type string).
    pub fn card_drives(&self, card: &str) -> Vec<(usize, String)> {
        self.numbered(card, "drive")
    }

    /// Every `<card>_diskN` property across the disk cards:
    /// (card key, 0-based unit, split image spec).
    pub fn card_disks(&self) -> Vec<(String, usize, Vec<String>)> {
        let mut out = Vec::new();
        for card in ["h17", "h37", "mms77316"] {
            for (unit, value) in self.numbered(card, "disk") {
                out.push((card.to_string(), unit, split_args(&value)));
            }
        }
        out
    }

    fn numbered(&self, card: &str, what: &str) -> Vec<(usize, String)> {
        let prefix = format!("{}_{}", card, what);
        let mut out = Vec::new();
        for (key, value) in &self.props {
            if let Some(rest) = key.strip_prefix(&prefix) {
                match rest.parse::<usize>() {
                    Ok(n) if n >= 1 => out.push((n - 1, value.clone())),
                    _ => warn!("ignoring property {} (bad unit number)", key),
                }
            }
        }
        out
    }
}

/// Split a mount/image spec on whitespace: path first, options after.
pub fn split_args(spec: &str) -> Vec<String> {
    spec.split_whitespace().map(|s| s.to_string()).collect()
}
