use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ChainError, LocalChain};
use crate::{config::ChainConfig, ledger::LedgerSnapshot, Address, Amount};

/// A participant named either by hex address or by label.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Party(pub String);

impl Party {
    pub fn address(&self) -> Address {
        self.0
            .parse()
            .unwrap_or_else(|_| Address::from_label(&self.0))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Fund {
        from: Party,
        #[serde(with = "serde_amount")]
        value: Amount,
    },
    Withdraw {
        from: Party,
    },
    SetPrice {
        #[serde(with = "serde_answer")]
        answer: i128,
    },
    AdvanceTime { seconds: u64 },
    RejectIncoming { account: Party, reject: bool },
    FeedOutage { down: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scenario {
    #[serde(default = "default_deployer")]
    pub deployer: Party,
    pub steps: Vec<Step>,
}

fn default_deployer() -> Party {
    Party("deployer".into())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub step: Step,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioReport {
    pub owner: Address,
    pub price_feed: Address,
    pub outcomes: Vec<StepOutcome>,
    pub snapshot: LedgerSnapshot,
}

impl Scenario {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Runs every step in order on a fresh chain. Failed calls are recorded
    /// and do not stop the run.
    pub fn run(&self, config: ChainConfig) -> Result<ScenarioReport, ChainError> {
        let mut chain = LocalChain::deploy(config, self.deployer.address())?;
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let result = apply(&mut chain, step);
            outcomes.push(StepOutcome {
                index,
                step: step.clone(),
                ok: result.is_ok(),
                error: result.err().map(|err| err.to_string()),
            });
        }
        let report = ScenarioReport {
            owner: chain.contract().owner(),
            price_feed: chain.feed_address(),
            outcomes,
            snapshot: chain.contract().snapshot(),
        };
        info!(
            steps = report.outcomes.len(),
            failed = report.outcomes.iter().filter(|o| !o.ok).count(),
            balance = report.snapshot.balance,
            "scenario finished"
        );
        Ok(report)
    }
}

/// Integers that serde cannot buffer at 128 bits inside a tagged step.
///
/// Accepts JSON integers, integral floats (JSON numbers beyond `u64`) and
/// decimal strings; decimal strings are the exact form for amounts above
/// 2^53. Written back as decimal strings.
mod serde_int {
    use std::{fmt, marker::PhantomData, str::FromStr};

    use serde::de::{Error, Visitor};

    pub struct IntVisitor<T>(pub PhantomData<T>);

    impl<'de, T> Visitor<'de> for IntVisitor<T>
    where
        T: FromStr + TryFrom<u128> + TryFrom<i128>,
    {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer or a decimal string")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<T, E> {
            self.visit_u128(v as u128)
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<T, E> {
            self.visit_i128(v as i128)
        }

        fn visit_u128<E: Error>(self, v: u128) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_i128<E: Error>(self, v: i128) -> Result<T, E> {
            T::try_from(v).map_err(|_| E::custom(format!("integer {v} out of range")))
        }

        fn visit_f64<E: Error>(self, v: f64) -> Result<T, E> {
            if !v.is_finite() || v.fract() != 0.0 {
                return Err(E::custom(format!("{v} is not an integer")));
            }
            if v >= 0.0 && v < u128::MAX as f64 {
                self.visit_u128(v as u128)
            } else if v < 0.0 && v >= i128::MIN as f64 {
                self.visit_i128(v as i128)
            } else {
                Err(E::custom(format!("integer {v} out of range")))
            }
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<T, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid integer string {v:?}")))
        }
    }
}

pub(crate) mod serde_amount {
    use std::marker::PhantomData;

    use serde::{Deserializer, Serializer};

    use super::serde_int::IntVisitor;

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IntVisitor(PhantomData))
    }
}

pub(crate) mod serde_answer {
    use std::marker::PhantomData;

    use serde::{Deserializer, Serializer};

    use super::serde_int::IntVisitor;

    pub fn serialize<S>(value: &i128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IntVisitor(PhantomData))
    }
}

fn apply(chain: &mut LocalChain, step: &Step) -> Result<(), ChainError> {
    match step {
        Step::Fund { from, value } => chain.fund(from.address(), *value).map(drop),
        Step::Withdraw { from } => chain.withdraw(from.address()).map(drop),
        Step::SetPrice { answer } => {
            chain.set_price(*answer);
            Ok(())
        }
        Step::AdvanceTime { seconds } => {
            chain.advance_time(*seconds);
            Ok(())
        }
        Step::RejectIncoming { account, reject } => {
            chain.set_rejecting(account.address(), *reject);
            Ok(())
        }
        Step::FeedOutage { down } => {
            chain.set_feed_outage(*down);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "steps": [
            { "step": "fund", "from": "alice", "value": 1000000000000000000 },
            { "step": "fund", "from": "bob", "value": 1000 },
            { "step": "withdraw", "from": "alice" },
            { "step": "set_price", "answer": 400000000000 },
            { "step": "fund", "from": "bob", "value": 12500000000000000 },
            { "step": "withdraw", "from": "deployer" }
        ]
    }"#;

    #[test]
    fn runs_steps_and_records_failures() {
        let scenario = Scenario::from_json(SCENARIO.as_bytes()).unwrap();
        let report = scenario.run(ChainConfig::default()).unwrap();

        let ok: Vec<bool> = report.outcomes.iter().map(|o| o.ok).collect();
        assert_eq!(ok, vec![true, false, false, true, true, true]);
        assert!(report.outcomes[1]
            .error
            .as_deref()
            .unwrap()
            .contains("not sufficient amount"));
        assert!(report.outcomes[2]
            .error
            .as_deref()
            .unwrap()
            .contains("not the owner"));
        assert_eq!(report.owner, Address::from_label("deployer"));
        assert_eq!(report.snapshot.balance, 0);
        assert_eq!(report.snapshot.epoch, 1);
    }

    #[test]
    fn large_amounts_and_prices_parse() {
        let scenario = Scenario::from_json(
            br#"{ "steps": [
                { "step": "fund", "from": "alice", "value": 100000000000000000000 },
                { "step": "fund", "from": "bob", "value": "340282366920938463463374607431768211455" },
                { "step": "set_price", "answer": 250000000000 },
                { "step": "set_price", "answer": "-1" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(
            scenario.steps[0],
            Step::Fund {
                from: Party("alice".into()),
                value: 100 * 1_000_000_000_000_000_000,
            }
        );
        assert_eq!(
            scenario.steps[1],
            Step::Fund {
                from: Party("bob".into()),
                value: u128::MAX,
            }
        );
        assert_eq!(scenario.steps[2], Step::SetPrice { answer: 250_000_000_000 });
        assert_eq!(scenario.steps[3], Step::SetPrice { answer: -1 });

        let json = serde_json::to_string(&scenario).unwrap();
        assert_eq!(Scenario::from_json(json.as_bytes()).unwrap(), scenario);
    }

    #[test]
    fn malformed_integers_are_rejected() {
        for bad in [
            r#"{ "steps": [{ "step": "fund", "from": "a", "value": -5 }] }"#,
            r#"{ "steps": [{ "step": "fund", "from": "a", "value": 1.5 }] }"#,
            r#"{ "steps": [{ "step": "fund", "from": "a", "value": "ten" }] }"#,
            r#"{ "steps": [{ "step": "fund", "from": "a", "value": true }] }"#,
        ] {
            assert!(Scenario::from_json(bad.as_bytes()).is_err(), "{bad}");
        }
    }

    #[test]
    fn hundred_eth_contribution_runs() {
        let scenario = Scenario::from_json(
            br#"{ "steps": [
                { "step": "set_price", "answer": 300000000000 },
                { "step": "fund", "from": "alice", "value": 100000000000000000000 }
            ] }"#,
        )
        .unwrap();
        let report = scenario.run(ChainConfig::default()).unwrap();
        assert!(report.outcomes.iter().all(|o| o.ok));
        assert_eq!(report.snapshot.balance, 100_000_000_000_000_000_000);
    }

    #[test]
    fn parties_accept_hex_or_labels() {
        let addr = Address::from_label("carol");
        assert_eq!(Party(addr.to_string()).address(), addr);
        assert_eq!(Party("carol".into()).address(), addr);
    }
}
