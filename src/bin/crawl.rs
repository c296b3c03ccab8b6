use anyhow::{Context, Result};
use clap::Parser;
use sitesage::{telemetry, CorpusWriter, CrawlArgs, Crawler, HttpFetcher};

#[derive(Parser, Debug)]
#[command(
    name = "sitesage-crawl",
    about = "Crawl one website breadth-first into a deduplicated text corpus"
)]
struct CrawlCli {
    #[command(flatten)]
    crawl: CrawlArgs,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let cli = CrawlCli::parse();
    let controls = cli.crawl.build_controls();

    let fetcher = HttpFetcher::new(controls.user_agent(), controls.request_timeout())
        .context("failed to build HTTP client")?;
    let mut corpus = CorpusWriter::create(&cli.crawl.output)
        .with_context(|| format!("failed to create {}", cli.crawl.output.display()))?;

    tracing::info!(
        start = %controls.start_url(),
        output = %cli.crawl.output.display(),
        "starting crawl"
    );
    let report = Crawler::new(fetcher, controls)
        .run(&mut corpus)
        .context("failed to write corpus")?;
    println!("{report}");
    println!("corpus written to {}", cli.crawl.output.display());
    Ok(())
}
