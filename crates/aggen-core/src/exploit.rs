//! Exploit templates.
//!
//! An exploit names facts in terms of parameter slots rather than assets.
//! Binding it to an [`Assignment`] turns every template into a concrete
//! [`Fact`]: preconditions become the *hypothesis* a state must contain,
//! postconditions become the edits applied to produce the successor.

use serde::{Deserialize, Serialize};

use crate::fact::{self, Direction, Fact, Operator, Quality, Topology};
use crate::factbase::Factbase;
use crate::permutation::Assignment;
use crate::{Code, ExploitId, ParamSlot};

/// Malformed model or catalog data. Always fatal before search starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("unknown direction `{0}` (expected ->, <- or <->)")]
    UnknownDirection(String),
    #[error("unknown postcondition action `{0}` (expected add, insert, update or delete)")]
    UnknownAction(String),
    #[error("unknown comparison operator `{0}`")]
    UnknownOperator(String),
    #[error("exploit `{exploit}` references parameter {slot} but declares only {params}")]
    ParamOutOfRange {
        exploit: String,
        slot: usize,
        params: usize,
    },
    #[error("too many {what}: {count} exceeds the fact encoding limit of {limit}")]
    CapacityExceeded {
        what: &'static str,
        count: usize,
        limit: usize,
    },
    #[error("{field} {value} does not fit the fact encoding (limit {limit})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    Update,
    Delete,
}

impl Action {
    pub fn parse(token: &str) -> Result<Self, ModelError> {
        match token.trim() {
            "add" | "insert" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ModelError::UnknownAction(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

// ============================================================================
// Parameterized facts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamQuality {
    pub param: ParamSlot,
    pub property: Code,
    pub op: Operator,
    pub value: Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamTopology {
    pub from: ParamSlot,
    pub to: ParamSlot,
    pub dir: Direction,
    pub property: Code,
    pub op: Operator,
    pub value: Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamFact {
    Quality(ParamQuality),
    Topology(ParamTopology),
}

impl ParamFact {
    /// Substitute bound assets for parameter slots. Codes, operator and
    /// direction are copied unchanged.
    pub fn instantiate(&self, assignment: &Assignment) -> Fact {
        match *self {
            ParamFact::Quality(p) => Fact::Quality(Quality {
                asset: assignment.asset(p.param),
                property: p.property,
                op: p.op,
                value: p.value,
            }),
            ParamFact::Topology(p) => Fact::Topology(Topology {
                from: assignment.asset(p.from),
                to: assignment.asset(p.to),
                dir: p.dir,
                property: p.property,
                op: p.op,
                value: p.value,
            }),
        }
    }

    /// Property and value codes fit the fact encoding.
    pub fn check_encodable(&self) -> Result<(), ModelError> {
        let (property, value) = match self {
            ParamFact::Quality(p) => (p.property, p.value),
            ParamFact::Topology(p) => (p.property, p.value),
        };
        fact::check_code("property code", property)?;
        fact::check_code("value code", value)
    }

    fn max_slot(&self) -> ParamSlot {
        match self {
            ParamFact::Quality(p) => p.param,
            ParamFact::Topology(p) => p.from.max(p.to),
        }
    }
}

impl From<ParamQuality> for ParamFact {
    fn from(p: ParamQuality) -> Self {
        Self::Quality(p)
    }
}

impl From<ParamTopology> for ParamFact {
    fn from(p: ParamTopology) -> Self {
        Self::Topology(p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Postcondition {
    pub action: Action,
    pub fact: ParamFact,
}

// ============================================================================
// Exploit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploit {
    id: ExploitId,
    name: String,
    params: usize,
    preconditions: Vec<ParamFact>,
    postconditions: Vec<Postcondition>,
}

impl Exploit {
    /// Build an exploit, rejecting any condition that names a slot
    /// outside `0..params`.
    pub fn new(
        id: ExploitId,
        name: impl Into<String>,
        params: usize,
        preconditions: Vec<ParamFact>,
        postconditions: Vec<Postcondition>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        let slots = preconditions
            .iter()
            .chain(postconditions.iter().map(|p| &p.fact))
            .map(ParamFact::max_slot);
        for slot in slots {
            if slot.index() >= params {
                return Err(ModelError::ParamOutOfRange {
                    exploit: name,
                    slot: slot.index(),
                    params,
                });
            }
        }

        Ok(Self {
            id,
            name,
            params,
            preconditions,
            postconditions,
        })
    }

    pub fn id(&self) -> ExploitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> usize {
        self.params
    }

    pub fn preconditions(&self) -> &[ParamFact] {
        &self.preconditions
    }

    pub fn postconditions(&self) -> &[Postcondition] {
        &self.postconditions
    }

    /// Every condition's codes fit the fact encoding.
    pub fn check_encodable(&self) -> Result<(), ModelError> {
        self.preconditions
            .iter()
            .chain(self.postconditions.iter().map(|p| &p.fact))
            .try_for_each(ParamFact::check_encodable)
    }

    /// Pair an assignment with the preconditions it instantiates.
    pub fn bind(&self, assignment: Assignment) -> AssetBinding {
        let hypothesis = self
            .preconditions
            .iter()
            .map(|p| p.instantiate(&assignment))
            .collect();
        AssetBinding {
            assignment,
            hypothesis,
        }
    }

    /// Postconditions instantiated against `assignment`, in declared order.
    pub fn effects(&self, assignment: &Assignment) -> Vec<(Action, Fact)> {
        self.postconditions
            .iter()
            .map(|p| (p.action, p.fact.instantiate(assignment)))
            .collect()
    }
}

/// One assignment of an exploit's slots plus its instantiated preconditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBinding {
    pub assignment: Assignment,
    pub hypothesis: Vec<Fact>,
}

impl AssetBinding {
    /// True iff every hypothesis fact is present. An empty hypothesis holds
    /// everywhere.
    pub fn holds_in(&self, factbase: &Factbase) -> bool {
        self.hypothesis.iter().all(|fact| factbase.contains(fact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetId;

    fn pq(param: u32, property: u32, value: u32) -> ParamFact {
        ParamFact::Quality(ParamQuality {
            param: ParamSlot::new(param),
            property: Code::new(property),
            op: Operator::Eq,
            value: Code::new(value),
        })
    }

    fn pt(from: u32, to: u32) -> ParamFact {
        ParamFact::Topology(ParamTopology {
            from: ParamSlot::new(from),
            to: ParamSlot::new(to),
            dir: Direction::Forward,
            property: Code::new(5),
            op: Operator::Eq,
            value: Code::new(6),
        })
    }

    #[test]
    fn actions_parse_including_insert_alias() {
        assert_eq!(Action::parse("add").unwrap(), Action::Add);
        assert_eq!(Action::parse("insert").unwrap(), Action::Add);
        assert_eq!(Action::parse("update").unwrap(), Action::Update);
        assert_eq!(Action::parse("delete").unwrap(), Action::Delete);
        assert_eq!(
            Action::parse("upsert"),
            Err(ModelError::UnknownAction("upsert".to_string()))
        );
    }

    #[test]
    fn instantiation_substitutes_both_topology_slots() {
        let assignment = Assignment::new(vec![AssetId::new(3), AssetId::new(7)]);
        let Fact::Topology(t) = pt(1, 0).instantiate(&assignment) else {
            panic!("expected topology");
        };
        assert_eq!(t.from, AssetId::new(7));
        assert_eq!(t.to, AssetId::new(3));
        assert_eq!(t.dir, Direction::Forward);
        assert_eq!(t.property, Code::new(5));
    }

    #[test]
    fn slots_beyond_param_count_are_rejected() {
        let err = Exploit::new(ExploitId::new(0), "bad", 1, vec![pt(0, 1)], vec![]).unwrap_err();
        assert_eq!(
            err,
            ModelError::ParamOutOfRange {
                exploit: "bad".to_string(),
                slot: 1,
                params: 1
            }
        );
    }

    #[test]
    fn binding_carries_the_hypothesis_and_effects_keep_order() {
        let exploit = Exploit::new(
            ExploitId::new(0),
            "escalate",
            1,
            vec![pq(0, 0, 1)],
            vec![
                Postcondition {
                    action: Action::Delete,
                    fact: pq(0, 0, 1),
                },
                Postcondition {
                    action: Action::Add,
                    fact: pq(0, 2, 1),
                },
            ],
        )
        .unwrap();

        let assignment = Assignment::new(vec![AssetId::new(1)]);
        let binding = exploit.bind(assignment.clone());
        assert_eq!(binding.hypothesis.len(), 1);

        let effects = exploit.effects(&assignment);
        assert_eq!(effects[0].0, Action::Delete);
        assert_eq!(effects[1].0, Action::Add);
    }
}
