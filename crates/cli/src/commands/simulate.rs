use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotbot_core::game::combo::{MAX_RAW_OUTCOME, MIN_RAW_OUTCOME};
use slotbot_core::game::{all_combinations, expected_delta, SPIN_COST};
use slotbot_core::{play, PayoutRule};

use super::CommandResult;

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    spins: u64,
    total_delta: i64,
    hits: BTreeMap<&'static str, u64>,
}

impl Tally {
    fn record(&mut self, rule: PayoutRule, delta: i64) {
        self.spins += 1;
        self.total_delta += delta;
        *self.hits.entry(rule.as_str()).or_default() += 1;
    }

    fn return_to_player(&self) -> f64 {
        if self.spins == 0 {
            return 0.0;
        }
        let staked = self.spins as f64 * SPIN_COST as f64;
        (staked + self.total_delta as f64) / staked
    }

    fn render(&self, heading: String) -> String {
        let mut lines = vec![heading];
        for rule in PayoutRule::ALL {
            let hits = self.hits.get(rule.as_str()).copied().unwrap_or_default();
            lines.push(format!(
                "- {}: {hits}/{} spins, delta {:+}",
                rule.as_str(),
                self.spins,
                rule.bonus() - SPIN_COST
            ));
        }
        lines.push(format!("total delta {:+}", self.total_delta));
        lines.push(format!("return to player {:.2}%", self.return_to_player() * 100.0));
        lines.join("\n")
    }
}

pub fn run(spins: Option<u64>, seed: Option<u64>) -> CommandResult {
    match spins {
        None => CommandResult::success("simulate", exact_report()),
        Some(0) => CommandResult::failure("simulate", "invalid_argument", "--spins must be > 0", 2),
        Some(spins) => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            match random_report(spins, &mut rng) {
                Ok(report) => CommandResult::success("simulate", report),
                Err(error) => CommandResult::failure("simulate", "engine", error, 1),
            }
        }
    }
}

/// Every dice value once: the exact distribution of a uniform dice.
fn exact_tally() -> Tally {
    let mut tally = Tally::default();
    for (_, combination) in all_combinations() {
        let rule = PayoutRule::classify(&combination);
        tally.record(rule, rule.bonus() - SPIN_COST);
    }
    tally
}

fn exact_report() -> String {
    let tally = exact_tally();
    let heading = format!(
        "exact payout over all {} outcomes, expected delta per spin {:+.4}",
        tally.spins,
        expected_delta()
    );
    tally.render(heading)
}

fn random_tally<R: Rng>(spins: u64, rng: &mut R) -> Result<Tally, String> {
    let mut tally = Tally::default();
    for _ in 0..spins {
        let raw = rng.gen_range(MIN_RAW_OUTCOME..=MAX_RAW_OUTCOME);
        let outcome = play(raw).map_err(|error| error.to_string())?;
        tally.record(PayoutRule::classify(&outcome.combination), outcome.payout.delta);
    }
    Ok(tally)
}

fn random_report<R: Rng>(spins: u64, rng: &mut R) -> Result<String, String> {
    let tally = random_tally(spins, rng)?;
    let mean = tally.total_delta as f64 / tally.spins as f64;
    Ok(tally.render(format!("{spins} random spins, mean delta per spin {mean:+.4}")))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{exact_report, exact_tally, random_tally};

    #[test]
    fn exact_tally_matches_the_payout_table() {
        let tally = exact_tally();

        assert_eq!(tally.spins, 64);
        assert_eq!(tally.total_delta, 12);
        assert_eq!(tally.hits.get("triple_seven"), Some(&1));
        assert_eq!(tally.hits.get("double_seven"), Some(&9));
        assert_eq!(tally.hits.get("triple"), Some(&3));
        assert_eq!(tally.hits.get("no_match"), Some(&51));
    }

    #[test]
    fn exact_report_shows_return_to_player() {
        let report = exact_report();

        assert!(report.contains("expected delta per spin +0.1875"));
        assert!(report.contains("return to player 118.75%"));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let first = random_tally(500, &mut StdRng::seed_from_u64(7)).expect("tally");
        let second = random_tally(500, &mut StdRng::seed_from_u64(7)).expect("tally");

        assert_eq!(first, second);
        assert_eq!(first.spins, 500);
        assert_eq!(first.hits.values().sum::<u64>(), 500);
    }
}
