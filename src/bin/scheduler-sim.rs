//! Scheduler simulator CLI
//!
//! Drives the matchmaking scheduler against the mock game service with a
//! hand-advanced clock, so scheduling behavior can be inspected without a
//! server connection.
//!
//! Usage:
//!   cargo run --bin scheduler-sim -- --help
//!   cargo run --bin scheduler-sim run --ticks 60 --step-secs 30
//!   cargo run --bin scheduler-sim run --config matchmaking.toml --capacity 3
//!   cargo run --bin scheduler-sim controls --config matchmaking.toml
//!   cargo run --bin scheduler-sim category --base 180 --increment 2

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};

use botmatch::clock::{seconds, Clock, ManualClock};
use botmatch::config::{validate_config, MatchmakingConfig};
use botmatch::matchmaking::{configured_time_controls, game_category};
use botmatch::service::MockGameService;
use botmatch::types::{GameId, Perf, UserProfile};
use botmatch::utils::lock_unpoisoned;
use botmatch::{AcceptanceMemory, LiveOpponentSelector, MatchmakingScheduler, SlotTracker};

#[derive(Parser)]
#[command(name = "scheduler-sim")]
#[command(about = "Simulate the matchmaking scheduler against a mock game server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler for a number of simulated ticks
    Run {
        /// Path to a matchmaking TOML config; defaults to a permissive config
        #[arg(short, long)]
        config: Option<String>,
        /// Number of scheduling passes
        #[arg(short, long, default_value = "60")]
        ticks: u32,
        /// Simulated seconds between passes
        #[arg(short, long, default_value = "30")]
        step_secs: i64,
        /// Concurrency budget (3 enables per-lane accounting)
        #[arg(long, default_value = "3")]
        capacity: usize,
        /// How many ticks an accepted game runs before finishing
        #[arg(long, default_value = "8")]
        game_ticks: u32,
    },
    /// List the time controls a config would challenge with
    Controls {
        #[arg(short, long)]
        config: String,
    },
    /// Show the rating category of a time control
    Category {
        #[arg(long, default_value = "standard")]
        variant: String,
        #[arg(long, default_value = "0")]
        base: i64,
        #[arg(long, default_value = "0")]
        increment: i64,
        #[arg(long, default_value = "0")]
        days: i64,
    },
}

fn load_config(path: Option<&str>) -> Result<MatchmakingConfig> {
    match path {
        Some(path) => MatchmakingConfig::from_toml_file(path),
        None => {
            let config = MatchmakingConfig {
                allow_matchmaking: true,
                challenge_timeout: 0,
                challenge_initial_time: vec![60, 180, 600],
                challenge_increment: vec![0, 2],
                challenge_days: vec![2],
                ..Default::default()
            };
            validate_config(&config)?;
            Ok(config)
        }
    }
}

fn simulated_profile() -> UserProfile {
    let mut perfs = HashMap::new();
    for category in ["bullet", "blitz", "rapid", "classical", "correspondence"] {
        perfs.insert(
            category.to_string(),
            Perf {
                rating: 1700,
                games: 50,
            },
        );
    }
    UserProfile {
        username: "simbot".to_string(),
        perfs,
    }
}

async fn run_simulation(
    config: MatchmakingConfig,
    ticks: u32,
    step_secs: i64,
    capacity: usize,
    game_length: u32,
) -> Result<()> {
    let profile = simulated_profile();
    let service = Arc::new(MockGameService::with_test_bots(profile.clone()));
    let clock = Arc::new(ManualClock::starting_now());
    let slots = Arc::new(Mutex::new(SlotTracker::new(capacity)));
    let acceptance = Arc::new(Mutex::new(AcceptanceMemory::new()));

    let selector = Arc::new(LiveOpponentSelector::new(
        service.clone(),
        clock.clone() as Arc<dyn Clock>,
        config.clone(),
        acceptance.clone(),
    ));
    let mut scheduler = MatchmakingScheduler::new(
        service.clone(),
        selector,
        clock.clone() as Arc<dyn Clock>,
        config,
        slots.clone(),
        acceptance,
        profile,
    );

    let mut active_games: HashSet<GameId> = HashSet::new();
    let mut remaining_ticks: HashMap<GameId, u32> = HashMap::new();

    for tick in 0..ticks {
        clock.advance(seconds(step_secs));
        scheduler.tick(&active_games, 0).await;

        // Every challenge is accepted by the opponent one pass later
        if let Some(challenge_id) = scheduler.outstanding_challenge().map(str::to_string) {
            println!("[tick {tick}] challenge {challenge_id} accepted, game starting");
            scheduler.accepted_challenge(&challenge_id);
            active_games.insert(challenge_id.clone());
            remaining_ticks.insert(challenge_id, game_length);
        }

        let finished: Vec<GameId> = remaining_ticks
            .iter_mut()
            .filter_map(|(game_id, remaining)| {
                *remaining = remaining.saturating_sub(1);
                (*remaining == 0).then(|| game_id.clone())
            })
            .collect();
        for game_id in finished {
            let was_correspondence = lock_unpoisoned(&slots).is_correspondence(&game_id);
            println!("[tick {tick}] game {game_id} finished");
            active_games.remove(&game_id);
            remaining_ticks.remove(&game_id);
            lock_unpoisoned(&slots).release(&game_id);
            if was_correspondence {
                scheduler.correspondence_game_done();
            }
            scheduler.game_done();
        }
    }

    println!();
    println!("Challenges created:");
    for (opponent, request) in service.created_challenges() {
        let terms = match (request.clock_limit, request.days) {
            (_, Some(days)) => format!("{days}d"),
            (Some(limit), _) => format!("{}+{}", limit, request.clock_increment.unwrap_or(0)),
            _ => "?".to_string(),
        };
        println!("  {opponent}: {} {terms} {}", request.variant, if request.rated { "rated" } else { "casual" });
    }
    println!("Cancelled: {}", service.cancelled_challenges().len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            ticks,
            step_secs,
            capacity,
            game_ticks,
        } => {
            let config = load_config(config.as_deref())?;
            run_simulation(config, ticks, step_secs, capacity, game_ticks).await
        }
        Commands::Controls { config } => {
            let config = MatchmakingConfig::from_toml_file(&config)?;
            for control in configured_time_controls(&config, None, true) {
                println!(
                    "{control}  ({})",
                    game_category(
                        "standard",
                        control.base_time as i64,
                        control.increment as i64,
                        control.days as i64
                    )
                );
            }
            Ok(())
        }
        Commands::Category {
            variant,
            base,
            increment,
            days,
        } => {
            println!("{}", game_category(&variant, base, increment, days));
            Ok(())
        }
    }
}
