use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};
use clap::Parser;
use furigana_annotator_rust::{ReadingMode, RunOptions};

#[derive(Parser, Debug)]
#[command(
    name = "furigana-annotator-rust",
    version,
    about = "Annotate Japanese text in HTML with furigana and part-of-speech colors"
)]
struct Cli {
    /// HTML file to annotate (reads stdin when omitted)
    input: Option<String>,

    /// Add ruby readings (default when neither --readings nor --colors is given)
    #[arg(long = "readings")]
    readings: bool,

    /// Color tokens by part of speech
    #[arg(long = "colors")]
    colors: bool,

    /// Reading script: hiragana, katakana or romaji
    #[arg(short = 't', long = "reading-type")]
    reading_type: Option<ReadingMode>,

    /// Use the dark color palette (saved for later runs)
    #[arg(long = "dark", conflicts_with = "light")]
    dark: bool,

    /// Use the light color palette (saved for later runs)
    #[arg(long = "light")]
    light: bool,

    /// Tokenizer service base URL (overrides settings)
    #[arg(short = 'u', long = "tokenizer-url")]
    tokenizer_url: Option<String>,

    /// Exclude a word from annotation (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Remove a word from the excluded list (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Clear the excluded word list
    #[arg(long = "clear-excluded")]
    clear_excluded: bool,

    /// Show excluded words and exit
    #[arg(long = "show-excluded")]
    show_excluded: bool,

    /// Serve the message API over HTTP at ADDR instead of annotating
    #[arg(long = "server", value_name = "ADDR")]
    server: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    furigana_annotator_rust::logging::init(cli.verbose)?;

    let options = RunOptions {
        settings_path: cli.read_settings.clone(),
        tokenizer_url: cli.tokenizer_url.clone(),
        readings: cli.readings,
        colors: cli.colors,
        reading_type: cli.reading_type,
        dark: if cli.dark {
            Some(true)
        } else if cli.light {
            Some(false)
        } else {
            None
        },
        exclude: cli.exclude.clone(),
        include: cli.include.clone(),
        clear_excluded: cli.clear_excluded,
        show_excluded: cli.show_excluded,
    };

    if let Some(addr) = cli.server {
        return furigana_annotator_rust::run_server(options, addr).await;
    }

    let input = read_input(&cli)?;
    let output = furigana_annotator_rust::run(options, input).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn read_input(cli: &Cli) -> Result<Option<String>> {
    if let Some(path) = cli.input.as_deref() {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path))?;
        return Ok(Some(html));
    }
    let list_only = cli.show_excluded
        || cli.clear_excluded
        || !cli.exclude.is_empty()
        || !cli.include.is_empty();
    if list_only && io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .with_context(|| "stdin must be UTF-8 HTML")?;
    Ok(Some(buffer))
}
