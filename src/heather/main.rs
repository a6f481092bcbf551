use anyhow::Context;
use chrono::{NaiveDate, Timelike, Utc};
use clap::Parser;
use hotspots::api_client::{HeatmapApi, HttpHeatmapClient, NearbyQuery};
use hotspots::config::EngineConfig;
use hotspots::density::{DensityTier, TierFilter, classify};
use hotspots::display::event_time_label;
use hotspots::models::{HeatmapMode, QueryParameters};
use hotspots::refresh::RefreshOutcome;
use hotspots::regions::RegionCatalog;
use hotspots::selection::SearchRadius;
use hotspots::session::MapSession;
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect heatmap hotspots from the command line", long_about = None)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Fetch one hour and print the merged hotspots and events
    Snapshot {
        #[arg(short, long, default_value = "madrid")]
        region: String,
        /// Defaults to today in the configured timezone
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Defaults to the current hour
        #[arg(long)]
        hour: Option<u8>,
        #[arg(short, long, default_value = "heuristic")]
        mode: HeatmapMode,
        /// Only show one tier (high, medium, low)
        #[arg(short, long)]
        tier: Option<DensityTier>,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// List events around a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        hour: Option<u8>,
        /// Search radius in meters: 200, 300 or 500
        #[arg(short, long)]
        radius: Option<u32>,
    },
    /// List the selectable regions
    Regions {
        /// Ask the backend instead of using the built-in list
        #[arg(long)]
        remote: bool,
    },
}

#[derive(Serialize)]
struct SnapshotReport<'a> {
    region: &'a str,
    target: &'a str,
    weather: &'a str,
    peak_score: Option<f64>,
    counts: hotspots::density::TierCounts,
    hotspots: Vec<&'a hotspots::clustering::HotspotCluster>,
    events: Vec<&'a hotspots::models::Event>,
}

fn when(config: &EngineConfig, date: Option<NaiveDate>, hour: Option<u8>) -> anyhow::Result<(NaiveDate, u8)> {
    let now = Utc::now().with_timezone(&config.tz()?);
    let hour = hour.unwrap_or(now.hour() as u8);
    if hour > 23 {
        anyhow::bail!("hour must be between 0 and 23, got {}", hour);
    }
    Ok((date.unwrap_or(now.date_naive()), hour))
}

async fn snapshot(
    config: EngineConfig,
    client: &HttpHeatmapClient,
    params: QueryParameters,
    tier: Option<DensityTier>,
    json: bool,
) -> anyhow::Result<()> {
    let tz = config.tz()?;
    let mut session = MapSession::new(config)?;
    session.set_tier_filter(tier.map(TierFilter::Only).unwrap_or_default());

    let region = params.region_id.clone();
    match session.refresh(client, params).await {
        RefreshOutcome::Applied(_) => {}
        RefreshOutcome::Failed(e) => return Err(e).context("heatmap refresh failed"),
        RefreshOutcome::Superseded => anyhow::bail!("refresh was superseded"),
    }

    if json {
        let report = SnapshotReport {
            region: &region,
            target: session.target_label(),
            weather: session.weather_summary(),
            peak_score: session.peak_score(),
            counts: session.tier_counts(),
            hotspots: session.visible_clusters(),
            events: session.visible_events(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} · {}", region, session.target_label());
    if !session.weather_summary().is_empty() {
        println!("{}", session.weather_summary());
    }
    let counts = session.tier_counts();
    println!(
        "{} hotspots ({} alta, {} media, {} baja), pico {}",
        session.clusters().len(),
        counts.high,
        counts.medium,
        counts.low,
        session
            .peak_score()
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string())
    );

    for cluster in session.visible_clusters() {
        println!(
            "  {:>5.2} {:<5} {:.5},{:.5}  r={:.0}m  n={}",
            cluster.score,
            classify(cluster.score).label(),
            cluster.lat,
            cluster.lon,
            cluster.effective_radius(),
            cluster.member_count
        );
    }

    let events = session.visible_events();
    if !events.is_empty() {
        println!("Eventos:");
        for (time, group) in &events.iter().chunk_by(|e| event_time_label(e, tz)) {
            println!("  {} {}", time, group.map(|e| e.title.as_str()).join(" | "));
        }
    }

    Ok(())
}

async fn nearby(config: &EngineConfig, client: &HttpHeatmapClient, query: NearbyQuery) -> anyhow::Result<()> {
    let tz = config.tz()?;
    let events = client.fetch_nearby_events(&query).await?;
    info!("{} events within {}m", events.len(), query.radius_m);

    for nearby in events {
        println!(
            "{:>6} {}  {}  {}",
            nearby
                .distance_m
                .map(|d| format!("{:.0}m", d))
                .unwrap_or_default(),
            event_time_label(&nearby.event, tz),
            nearby.event.title,
            nearby.event.venue.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = EngineConfig::from_env()?;
    let client = HttpHeatmapClient::new(&config.api_base, config.request_timeout())?;

    match args.cmd {
        Command::Snapshot {
            region,
            date,
            hour,
            mode,
            tier,
            json,
        } => {
            let (date, hour) = when(&config, date, hour)?;
            let params = QueryParameters {
                region_id: region,
                date,
                hour,
                mode,
            };
            snapshot(config, &client, params, tier, json).await
        }
        Command::Nearby {
            lat,
            lon,
            date,
            hour,
            radius,
        } => {
            let (date, hour) = when(&config, date, hour)?;
            let radius = match radius {
                Some(m) => SearchRadius::from_meters(m)
                    .with_context(|| format!("unsupported radius {}m, use 200, 300 or 500", m))?,
                None => config.search_radius()?,
            };
            let query = NearbyQuery {
                lat,
                lon,
                date,
                hour,
                radius_m: radius.meters(),
                limit: config.nearby_limit,
            };
            nearby(&config, &client, query).await
        }
        Command::Regions { remote } => {
            let catalog = if remote {
                match client.fetch_regions().await {
                    Ok(regions) if !regions.is_empty() => RegionCatalog::new(regions),
                    Ok(_) => {
                        warn!("Backend returned no regions, using the built-in list");
                        RegionCatalog::builtin()
                    }
                    Err(e) => {
                        warn!("Failed to fetch regions: {}", e);
                        RegionCatalog::builtin()
                    }
                }
            } else {
                RegionCatalog::builtin()
            };

            for region in catalog.iter() {
                println!("{:<10} {:<10} {:.4},{:.4}", region.id, region.label, region.lat, region.lon);
            }
            Ok(())
        }
    }
}
