use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};

use xshare::host::FileImageLoader;
use xshare::{wait, HostServices, Page, ShareConfig, ShareController, ShareOutcome, TimeZoneSetting};

#[derive(Parser)]
#[command(name = "xshare", version, about = "Render feed posts from a saved page as share cards")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one post of a saved feed page to a PNG card
    Card(CardArgs),
    /// Print the default configuration as JSON
    Config,
}

#[derive(Args)]
struct CardArgs {
    /// Saved HTML of the feed page
    page: PathBuf,
    /// Directory the PNG is written to
    #[arg(long)]
    out: PathBuf,
    /// Index of the post to share, in document order
    #[arg(long, default_value_t = 0)]
    post: usize,
    /// Directory holding avatar images (defaults to the page's directory)
    #[arg(long)]
    assets: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Origin the page was saved from, e.g. https://x.com
    #[arg(long)]
    origin: Option<String>,
    /// Format timestamps in UTC instead of local time
    #[arg(long)]
    utc: bool,
    /// Also copy the card to the system clipboard
    #[arg(long)]
    copy: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Card(args) => card(args).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&ShareConfig::default())?);
            Ok(())
        }
    }
}

async fn card(args: CardArgs) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(&args.page)
        .await
        .with_context(|| format!("failed to read {}", args.page.display()))?;
    let mut config = match &args.config {
        Some(path) => ShareConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ShareConfig::default(),
    };
    if args.utc {
        config.timezone = TimeZoneSetting::utc();
    }

    let assets = args.assets.clone().unwrap_or_else(|| {
        args.page
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let mut host = HostServices::noop().with_images(Arc::new(FileImageLoader::new(assets)));
    if args.copy {
        host = with_system_clipboard(host)?;
    }

    let page = Page::from_html(&html, args.origin.as_deref())?;
    let controller = ShareController::new(page.clone(), config.clone(), host)?;
    controller.install();

    let post_selector = config.selectors.post.clone();
    let action_selector = config.action_selector();
    let ready = wait::wait_for(
        || {
            page.query_selector_all(page.root(), &action_selector)
                .map(|actions| !actions.is_empty())
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        Duration::from_millis(50),
    )
    .await;
    if !ready {
        return Err(anyhow!("no share action appeared; is `{}` present?", config.selectors.feed_root));
    }

    let posts = page.query_selector_all(page.root(), &post_selector)?;
    let post = *posts
        .get(args.post)
        .with_context(|| format!("post {} not found ({} on page)", args.post, posts.len()))?;
    let button = page
        .query_selector(post, &action_selector)?
        .with_context(|| format!("post {} has no action bar", args.post))?;

    page.click(button)?;
    let report = controller
        .settle_actions()
        .await
        .into_iter()
        .next()
        .context("share action did not run")?;
    controller.shutdown();

    match report.outcome {
        ShareOutcome::Presented(overlay) => {
            tokio::fs::create_dir_all(&args.out).await?;
            let path = overlay.save_to(&args.out).await?;
            if args.copy {
                overlay.copy().await?;
            }
            overlay.dismiss();
            println!("{}", path.display());
            Ok(())
        }
        ShareOutcome::ExtractionFailed(e) => Err(anyhow!(e).context("post extraction failed")),
        ShareOutcome::RenderFailed(e) => Err(anyhow!(e).context("card rendering failed")),
    }
}

#[cfg(feature = "system-clipboard")]
fn with_system_clipboard(host: HostServices) -> anyhow::Result<HostServices> {
    Ok(host.with_clipboard(Arc::new(xshare::host::ArboardClipboard)))
}

#[cfg(not(feature = "system-clipboard"))]
fn with_system_clipboard(_host: HostServices) -> anyhow::Result<HostServices> {
    Err(anyhow!("built without the system-clipboard feature"))
}
