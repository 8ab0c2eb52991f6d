use std::{path::PathBuf, sync::Arc};

use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

use gamblesim_core::{
    derive_hash_hex, generate_server_seed, player_client_seed, verify_outcome, GameConfig,
    Outcome, Registry, SimulationPlan, SystemClock,
};
use gamblesim_shared::{spin_log, store::SERVER_SEED_KEY, SessionSummary, SqliteStore};

#[derive(Parser)]
#[command(name = "gamblesim-cli", about = "Admin CLI for the gamblesim store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://gamblesim.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Game config JSON file, defaults built in
    #[arg(long, env = "GAME_CONFIG")]
    game_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions, newest first
    Sessions,
    /// Create a session and make it current
    CreateSession,
    /// Make a session current
    Select { session: String },
    /// Stop a session from accepting new players
    Stop { session: String },
    /// End a session and every player in it
    Terminate { session: String },
    /// Delete a session
    Delete { session: String },
    /// End one player's session
    StopPlayer { session: String, player: String },
    /// Aggregate statistics of a session (current if omitted)
    Stats { session: Option<String> },
    /// Add simulated players to a session (current if omitted)
    Simulate {
        session: Option<String>,
        #[arg(long, default_value_t = 10)]
        players: usize,
        #[arg(long, default_value_t = 30)]
        spins: u32,
    },
    /// Export a session's spins to CSV path
    ExportCsv {
        path: PathBuf,
        #[arg(long)]
        session: Option<String>,
    },
    /// View last N spins of a session
    ViewSpins {
        #[arg(default_value_t = 20)]
        n: usize,
        #[arg(long)]
        session: Option<String>,
    },
    /// Rotate server seed to a new secret (random if omitted)
    RotateSeed { new_seed: Option<String> },
    /// Print the published hash of the current server seed
    ServerHash,
    /// Recompute a recorded spin from the stored server seed
    Verify {
        session: String,
        player: String,
        spin_index: u64,
    },
    /// Delete every session and start over
    Reset,
}

fn load_game_config(path: Option<&PathBuf>) -> anyhow::Result<GameConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(GameConfig::from_json(&json)?)
        }
        None => Ok(GameConfig::default()),
    }
}

fn session_or_current(registry: &Registry, session: Option<String>) -> String {
    session.unwrap_or_else(|| registry.current_session_id().to_string())
}

async fn run(cli: Cli, store: &SqliteStore) -> anyhow::Result<()> {
    let config = load_game_config(cli.game_config.as_ref())?;
    let mut registry = store.load_registry(config, Arc::new(SystemClock)).await;

    match cli.command {
        Commands::Sessions => {
            let current = registry.current_session_id();
            for s in registry.sessions_newest_first() {
                let row = SessionSummary::new(s, current);
                println!(
                    "{} {} {:<10} players={:<4} active={:<4} created={}",
                    if row.current { "*" } else { " " },
                    row.id,
                    row.status,
                    row.player_count,
                    row.active_player_count,
                    row.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
        }
        Commands::CreateSession => {
            let id = registry.create_session();
            store.save_registry(&registry).await?;
            println!("Created session {}", id);
        }
        Commands::Select { session } => {
            registry.switch_session(&session)?;
            store.save_registry(&registry).await?;
            println!("Current session is now {}", session);
        }
        Commands::Stop { session } => {
            registry.stop_session(&session)?;
            store.save_registry(&registry).await?;
            println!("Stopped session {}", session);
        }
        Commands::Terminate { session } => {
            registry.terminate_session(&session)?;
            store.save_registry(&registry).await?;
            println!("Terminated session {}", session);
        }
        Commands::Delete { session } => {
            registry.delete_session(&session)?;
            store.save_registry(&registry).await?;
            println!(
                "Deleted session {}. Current session is {}",
                session,
                registry.current_session_id()
            );
        }
        Commands::StopPlayer { session, player } => {
            if registry.stop_player(&session, &player)? {
                store.save_registry(&registry).await?;
                println!("Stopped {} in {}", player, session);
            } else {
                println!("{} had already ended", player);
            }
        }
        Commands::Stats { session } => {
            let session = session_or_current(&registry, session);
            let stats = registry.stats(&session)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Simulate {
            session,
            players,
            spins,
        } => {
            let session = session_or_current(&registry, session);
            let plan = SimulationPlan {
                player_count: players,
                spins_per_player: spins,
                ..SimulationPlan::default()
            };
            let report = registry.simulate(&session, &plan, &mut StdRng::from_entropy())?;
            store.save_registry(&registry).await?;
            println!(
                "Simulation completed: {} players, {} spins, {} wanted to buy",
                report.player_ids.len(),
                report.total_spins,
                report.wanted_to_buy
            );
        }
        Commands::ExportCsv { path, session } => {
            let session = session_or_current(&registry, session);
            let rows = spin_log(registry.session(&session)?);
            let mut wtr = csv::Writer::from_path(&path)?;
            for row in &rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", rows.len(), path.display());
        }
        Commands::ViewSpins { n, session } => {
            let session = session_or_current(&registry, session);
            let rows = spin_log(registry.session(&session)?);
            for r in rows.iter().rev().take(n) {
                println!(
                    "{} {:<10} #{:<4} {} {:?} payout={:<4} balance={}",
                    r.ts.to_rfc3339_opts(SecondsFormat::Secs, true),
                    r.player_id,
                    r.spin_index,
                    r.symbols,
                    r.kind,
                    r.payout,
                    r.balance_after
                );
            }
        }
        Commands::RotateSeed { new_seed } => {
            let seed = new_seed.unwrap_or_else(generate_server_seed);
            let hash = store.rotate_server_seed(&seed).await?;
            println!("Rotated server seed. New hash: {}", hash);
        }
        Commands::ServerHash => match store.get(SERVER_SEED_KEY).await? {
            Some(seed) => println!("{}", derive_hash_hex(seed.as_bytes())),
            None => println!("No server seed stored yet"),
        },
        Commands::Verify {
            session,
            player,
            spin_index,
        } => {
            let seed = store
                .get(SERVER_SEED_KEY)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no server seed stored"))?;
            let check = check_spin(&registry, &seed, &session, &player, spin_index)?;
            println!("spin #{} of {}: {}", spin_index, player, check);
        }
        Commands::Reset => {
            registry.reset();
            store.save_registry(&registry).await?;
            println!("Reset. Current session is {}", registry.current_session_id());
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum SpinCheck {
    Verified,
    Mismatch,
    /// Simulated players draw from an unseeded generator.
    NotSeeded,
}

impl std::fmt::Display for SpinCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SpinCheck::Verified => "verified",
            SpinCheck::Mismatch => "MISMATCH",
            SpinCheck::NotSeeded => "not a seeded spin (simulated player)",
        })
    }
}

/// Replay one recorded spin against the server seed.
fn check_spin(
    registry: &Registry,
    server_seed: &str,
    session: &str,
    player: &str,
    spin_index: u64,
) -> anyhow::Result<SpinCheck> {
    let p = registry.player(session, player)?;
    let entry = p
        .spin_history()
        .iter()
        .find(|e| e.spin_index == spin_index)
        .ok_or_else(|| anyhow::anyhow!("{} has no spin #{}", player, spin_index))?;
    if p.is_simulated() {
        return Ok(SpinCheck::NotSeeded);
    }
    let recorded = Outcome {
        symbols: entry.symbols,
        kind: entry.kind,
        payout: entry.payout,
    };
    let ok = verify_outcome(
        server_seed,
        &player_client_seed(session, player),
        spin_index,
        &registry.config().odds,
        &recorded,
    );
    Ok(if ok {
        SpinCheck::Verified
    } else {
        SpinCheck::Mismatch
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| "sqlite://gamblesim.db".into());
    tracing::debug!(%url, "opening store");
    let store = SqliteStore::connect(&url).await?;
    run(cli, &store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gamblesim-cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        assert!(matches!(
            parse(&["simulate", "--players", "4"]).command,
            Commands::Simulate {
                session: None,
                players: 4,
                spins: 30
            }
        ));
        assert!(matches!(
            parse(&["view-spins"]).command,
            Commands::ViewSpins { n: 20, session: None }
        ));
        assert!(matches!(
            parse(&["verify", "s", "player_1", "3"]).command,
            Commands::Verify { spin_index: 3, .. }
        ));
    }

    #[tokio::test]
    async fn simulate_then_export() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("cli.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();

        run(parse(&["simulate", "--players", "2", "--spins", "3"]), &store)
            .await
            .unwrap();
        let csv_path = dir.path().join("spins.csv");
        let csv_arg = csv_path.display().to_string();
        run(parse(&["export-csv", &csv_arg]), &store).await.unwrap();

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "balance_after"));
        let rows = reader.records().count();
        assert!((1..=6).contains(&rows));
    }

    #[test]
    fn simulated_spins_are_not_reported_as_mismatches() {
        let mut reg = Registry::new(GameConfig::default(), Arc::new(SystemClock));
        let sid = reg.current_session_id().to_string();
        let live = reg.add_player(&sid).unwrap();
        for _ in 0..4 {
            reg.spin_seeded(&sid, &live, "seed").unwrap();
        }
        let plan = SimulationPlan {
            player_count: 1,
            spins_per_player: 1,
            ..SimulationPlan::default()
        };
        let report = reg
            .simulate(&sid, &plan, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let simulated = &report.player_ids[0];

        for index in 0..4 {
            assert_eq!(
                check_spin(&reg, "seed", &sid, &live, index).unwrap(),
                SpinCheck::Verified
            );
        }
        assert!((0..4).any(|index| {
            check_spin(&reg, "other", &sid, &live, index).unwrap() == SpinCheck::Mismatch
        }));
        assert_eq!(
            check_spin(&reg, "seed", &sid, simulated, 0).unwrap(),
            SpinCheck::NotSeeded
        );
        assert!(check_spin(&reg, "seed", &sid, &live, 7).is_err());
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        assert!(run(parse(&["stop", "missing"]), &store).await.is_err());
    }
}
