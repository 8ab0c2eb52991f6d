use std::sync::Arc;

use gamblesim_core::{player_client_seed, GameConfig, Registry, Settlement, SystemClock};

fn main() {
    let server_seed = "example-server-seed";
    let mut registry = Registry::new(GameConfig::default(), Arc::new(SystemClock));
    let session = registry.current_session_id().to_string();
    let Ok(player) = registry.add_player(&session) else {
        return;
    };

    for _ in 0..10 {
        match registry.spin_seeded(&session, &player, server_seed) {
            Ok(Settlement::Settled(entry)) => {
                let reels: Vec<&str> = entry.symbols.iter().map(|s| s.glyph()).collect();
                println!(
                    "spin #{} {} {:?} payout={} balance={}",
                    entry.spin_index,
                    reels.join(" "),
                    entry.kind,
                    entry.payout,
                    entry.balance_after
                );
            }
            Ok(Settlement::InsufficientBalance { balance, .. }) => {
                println!("out of coins at {balance}");
                break;
            }
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        }
    }

    if let Ok(stats) = registry.stats(&session) {
        println!(
            "client_seed={} win_rate={:.2} near_misses={}",
            player_client_seed(&session, &player),
            stats.win_rate,
            stats.total_near_misses
        );
    }
}
