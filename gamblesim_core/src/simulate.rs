//! Batch runs of simulated players, for filling the admin charts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    clock::Millis,
    error::RegistryError,
    ledger::{BalanceEvent, PlayerId, Settlement},
    registry::Registry,
};

const MAX_SIMULATED_PLAYERS: usize = 1_000;
const MAX_SPINS_PER_PLAYER: u32 = 10_000;
const MAX_THINK_MS: Millis = 600_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationPlan {
    pub player_count: usize,
    pub spins_per_player: u32,
    /// Pause before each spin, drawn uniformly from this inclusive range.
    pub min_think_ms: Millis,
    pub max_think_ms: Millis,
    pub want_to_buy_threshold: i64,
    pub want_to_buy_chance: f64,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            player_count: 10,
            spins_per_player: 30,
            min_think_ms: 1_000,
            max_think_ms: 6_000,
            want_to_buy_threshold: 100,
            want_to_buy_chance: 0.3,
        }
    }
}

impl SimulationPlan {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.player_count == 0 || self.player_count > MAX_SIMULATED_PLAYERS {
            return Err(RegistryError::InvalidPlan("player_count must be 1..=1000"));
        }
        if self.spins_per_player == 0 || self.spins_per_player > MAX_SPINS_PER_PLAYER {
            return Err(RegistryError::InvalidPlan("spins_per_player must be 1..=10000"));
        }
        if self.min_think_ms > self.max_think_ms {
            return Err(RegistryError::InvalidPlan("min_think_ms exceeds max_think_ms"));
        }
        if self.max_think_ms > MAX_THINK_MS {
            return Err(RegistryError::InvalidPlan("max_think_ms must be at most 600000"));
        }
        if !(0.0..=1.0).contains(&self.want_to_buy_chance) {
            return Err(RegistryError::InvalidPlan("want_to_buy_chance must be within [0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub session_id: String,
    pub player_ids: Vec<PlayerId>,
    pub total_spins: u64,
    pub wanted_to_buy: usize,
}

impl Registry {
    /// Add `plan.player_count` players to `session_id` and play each of them
    /// until `spins_per_player` spins or until they can no longer pay.
    ///
    /// Each simulated timeline is backdated so its last possible spin lands at
    /// the current time; players end once their run is over.
    pub fn simulate<R: Rng + ?Sized>(
        &mut self,
        session_id: &str,
        plan: &SimulationPlan,
        rng: &mut R,
    ) -> Result<SimulationReport, RegistryError> {
        plan.validate()?;
        let session = self.session(session_id)?;
        if !session.accepts_players() {
            return Err(RegistryError::SessionClosed {
                id: session_id.to_string(),
                status: session.status(),
            });
        }

        let now = self.now_ms();
        let mut report = SimulationReport {
            session_id: session_id.to_string(),
            ..SimulationReport::default()
        };

        for _ in 0..plan.player_count {
            let gaps: Vec<Millis> = (0..plan.spins_per_player)
                .map(|_| rng.gen_range(plan.min_think_ms..=plan.max_think_ms))
                .collect();
            let span = gaps.iter().fold(0, |acc: Millis, gap| acc.saturating_add(*gap));
            let mut t = now.saturating_sub(span);
            let player_id = self.add_player_at(session_id, t)?;
            self.player_mut(session_id, &player_id)?.simulated = true;

            let mut wanted = false;
            for gap in gaps {
                t = t.saturating_add(gap).min(now);
                match self.spin_at(session_id, &player_id, rng, t)? {
                    Settlement::Settled(entry) => {
                        report.total_spins += 1;
                        if entry.balance_after < plan.want_to_buy_threshold
                            && rng.gen_bool(plan.want_to_buy_chance)
                        {
                            self.player_mut(session_id, &player_id)?.record_want_to_buy(t);
                            wanted = true;
                        }
                    }
                    Settlement::InsufficientBalance { .. } => break,
                }
            }

            self.player_mut(session_id, &player_id)?
                .end_with(BalanceEvent::End, t);
            if wanted {
                report.wanted_to_buy += 1;
            }
            report.player_ids.push(player_id);
        }

        info!(
            session = %session_id,
            players = plan.player_count,
            spins = report.total_spins,
            "simulation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{clock::ManualClock, config::GameConfig};
    use rand::{rngs::StdRng, SeedableRng};

    fn registry() -> Registry {
        Registry::new(GameConfig::default(), Arc::new(ManualClock::new(10_000_000)))
    }

    #[test]
    fn default_plan_fills_the_session() {
        let mut reg = registry();
        let sid = reg.current_session_id().to_string();
        let mut rng = StdRng::seed_from_u64(11);
        let report = reg.simulate(&sid, &SimulationPlan::default(), &mut rng).unwrap();

        let session = reg.session(&sid).unwrap();
        assert_eq!(session.player_count(), 10);
        assert_eq!(session.active_player_count(), 0);
        let spins: u64 = session.players().map(|p| p.spin_count()).sum();
        assert_eq!(spins, report.total_spins);
        for p in session.players() {
            assert!(p.is_simulated());
            assert!(p.spin_count() <= 30);
            assert!(p.end_ms().unwrap() <= 10_000_000);
            let times: Vec<f64> = p.balance_history().iter().map(|s| s.time).collect();
            assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn broke_players_stop_early() {
        let mut reg = registry();
        reg.config.starting_balance = 80;
        reg.config.odds.early_win_chance = 0.0;
        reg.config.odds.normal_win_chance = 0.0;
        let sid = reg.current_session_id().to_string();
        let plan = SimulationPlan {
            player_count: 3,
            want_to_buy_chance: 1.0,
            ..SimulationPlan::default()
        };
        let report = reg.simulate(&sid, &plan, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(report.total_spins, 6);
        assert_eq!(report.wanted_to_buy, 3);
        for p in reg.session(&sid).unwrap().players() {
            assert_eq!(p.balance(), 0);
            assert!(p.cant_afford_since_ms().is_some());
            assert!(p.wanted_to_buy_since_ms().is_some());
        }
    }

    #[test]
    fn slow_players_near_the_epoch_never_end_in_the_future() {
        let mut reg = Registry::new(GameConfig::default(), Arc::new(ManualClock::new(5_000)));
        let sid = reg.current_session_id().to_string();
        let plan = SimulationPlan {
            player_count: 2,
            spins_per_player: 10,
            min_think_ms: 600_000,
            max_think_ms: 600_000,
            ..SimulationPlan::default()
        };
        reg.simulate(&sid, &plan, &mut StdRng::seed_from_u64(4)).unwrap();
        for p in reg.session(&sid).unwrap().players() {
            assert!(p.end_ms().unwrap() <= 5_000);
            assert!(p.spin_history().iter().all(|e| e.at_ms <= 5_000));
        }
    }

    #[test]
    fn rejects_bad_plans_and_closed_sessions() {
        let mut reg = registry();
        let sid = reg.current_session_id().to_string();
        let mut rng = StdRng::seed_from_u64(0);
        let zero = SimulationPlan {
            player_count: 0,
            ..SimulationPlan::default()
        };
        let endless = SimulationPlan {
            spins_per_player: 2,
            min_think_ms: u64::MAX / 2 + 1,
            max_think_ms: u64::MAX,
            ..SimulationPlan::default()
        };
        for plan in [zero, endless] {
            assert!(matches!(
                reg.simulate(&sid, &plan, &mut rng),
                Err(RegistryError::InvalidPlan(_))
            ));
        }
        assert_eq!(reg.session(&sid).unwrap().player_count(), 0);
        reg.stop_session(&sid).unwrap();
        assert!(matches!(
            reg.simulate(&sid, &SimulationPlan::default(), &mut rng),
            Err(RegistryError::SessionClosed { .. })
        ));
    }
}
