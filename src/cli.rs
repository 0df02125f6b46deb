use clap::Parser;
use gallery_downloader::config::{Config, ConfigError};
use std::path::PathBuf;
use toml::Value;

/// What to do with each URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Download,
    PrintUrls,
    PrintKeywords,
}

#[derive(Parser, Debug)]
#[clap(name = "gallery-dl", author, version, about = "Download images from various sources", long_about = None)]
pub struct Cli {
    /// URLs to download images from
    #[clap(value_name = "URL")]
    pub urls: Vec<String>,

    /// Print download urls
    #[clap(short = 'g', long = "get-urls", help_heading = "MODE")]
    pub get_urls: bool,

    /// Print a list of available keywords for the given URLs
    #[clap(long, help_heading = "MODE")]
    pub list_keywords: bool,

    /// Print a list of extractors with description and example URL
    #[clap(long, help_heading = "LISTS")]
    pub list_extractors: bool,

    /// Print a list of available modules/supported sites
    #[clap(long, help_heading = "LISTS")]
    pub list_modules: bool,

    /// Destination directory
    #[clap(short = 'd', long = "dest", value_name = "DEST", help_heading = "SAVE")]
    pub dest: Option<PathBuf>,

    #[clap(short, long, value_name = "USER", help_heading = "AUTH")]
    pub username: Option<String>,

    #[clap(short, long, value_name = "PASS", help_heading = "AUTH")]
    pub password: Option<String>,

    /// Additional configuration files
    #[clap(short = 'c', long = "config", value_name = "CFG", action = clap::ArgAction::Append)]
    pub config: Vec<PathBuf>,

    /// Additional 'key=value' option values
    #[clap(short = 'o', long = "option", value_name = "OPT", action = clap::ArgAction::Append)]
    pub options: Vec<String>,

    /// Print debug output
    #[clap(short, long)]
    pub verbose: bool,
}

impl Cli {
    #[inline]
    pub const fn mode(&self) -> Mode {
        if self.get_urls {
            Mode::PrintUrls
        } else if self.list_keywords {
            Mode::PrintKeywords
        } else {
            Mode::Download
        }
    }

    /// Build the configuration: default file, `-c` files, then `-d`/`-u`/`-p` and `-o` on top.
    ///
    /// Broken `-o` options are reported and skipped.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load_default();
        for file in &self.config {
            config.merge_file(file)?;
        }

        if let Some(dest) = &self.dest {
            config.set(&["base-directory"], Value::String(dest.display().to_string()));
        }
        if let Some(username) = &self.username {
            config.set(&["username"], Value::String(username.clone()));
        }
        if let Some(password) = &self.password {
            config.set(&["password"], Value::String(password.clone()));
        }

        for option in &self.options {
            if let Err(error) = config.parse_option(option) {
                eprintln!("{}", error);
            }
        }
        Ok(config)
    }
}
