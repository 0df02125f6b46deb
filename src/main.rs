use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use gallery_downloader::cache::Cache;
use gallery_downloader::config::Config;
use gallery_downloader::extractors::{Context, Extractor, MessageStream, Registry};
use gallery_downloader::http::HttpClient;
use gallery_downloader::job::{run, DownloadJob, JobError, KeywordJob, UrlJob};
use gallery_downloader::progress_bars::ProgressArcs;
use log::{debug, LevelFilter};
use std::io;
use std::sync::Arc;

mod cli;

use cli::{Cli, Mode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut logger = env_logger::builder();
    logger.format_timestamp(None);
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let config = args.load_config()?;
    let registry = Registry::builtin()?;

    if args.list_modules {
        for category in registry.categories() {
            println!("{}", category);
        }
        return Ok(());
    }

    if args.list_extractors {
        for info in registry.iter() {
            println!("{}", info.name().bold());
            println!("{}", info.description);
            if let Some(test) = info.tests.first() {
                println!("Example: {}", test.url);
            }
            println!();
        }
        return Ok(());
    }

    if args.urls.is_empty() {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "the following arguments are required: <URL>...",
            )
            .exit();
    }

    let config = Arc::new(config);
    let cache = Cache::open(Cache::path_from_config(&config)).await;

    for url in &args.urls {
        if let Err(error) = process(args.mode(), url, &registry, &cache, &config).await {
            debug!("{:?}", error);
            eprintln!("{}", error.diagnostic(url).bold().red());
        }
    }

    Ok(())
}

async fn process(
    mode: Mode,
    url: &str,
    registry: &Registry,
    cache: &Cache,
    config: &Arc<Config>,
) -> Result<(), JobError> {
    let extractor = registry.resolve(url)?;
    let info = extractor.info();

    let transport = Arc::new(HttpClient::new()?);
    let context = Context::new(transport.clone(), cache.clone(), config.clone());
    let stream = MessageStream::new(extractor, context);

    match mode {
        Mode::PrintUrls => run(&mut UrlJob::new(io::stdout()), stream).await,
        Mode::PrintKeywords => run(&mut KeywordJob::new(io::stdout()), stream).await,
        Mode::Download => {
            let bars = ProgressArcs::initialize(&info.name());
            let mut job = DownloadJob::new(info, config, transport.client(), bars);
            run(&mut job, stream).await?;
            println!(
                "{} {} {}",
                job.downloaded().to_string().bold().blue(),
                "files".bold().blue(),
                "downloaded".bold()
            );
            Ok(())
        }
    }
}
