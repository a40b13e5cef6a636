//! Binary program formulation
//!
//! One 0/1 variable per replica slot (partition × broker). Pins fix the
//! variable's lower bound to 1 instead of adding a constraint.
//!
//! Objective (minimized), with `w` the partition weight and `x` the slot
//! variable:
//!
//! ```text
//! ( Σ_{current=0} w·x  +  Σ_{current=1} w·(1 − x)  +  Σ_{departed} w ) / 2
//! ```
//!
//! Every move is counted once when the replica leaves and once when it
//! arrives, hence the halving. The expression is stored as linear
//! coefficients plus a constant offset.
//!
//! Constraints:
//! - mass conservation: Σ w·x = target mass
//! - replication factor: Σ_b x(p,b) = target_rf(p) for every partition
//! - load balance: min_load ≤ Σ_p w·x(p,b) ≤ max_load for every broker
//!
//! A tie-break is lexicographic: the movement optimum z* is found first,
//! then [`Model::tie_break_stage`] minimizes the tie-break term subject to
//! movement ≤ z*.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, instrument};

use crate::spec::ProblemSpec;
use crate::types::ReplicaSlot;

/// Index of a decision variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

/// Decision variable: a binary slot indicator with bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub slot: ReplicaSlot,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }
}

/// Sparse linear expression Σ coef · var
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            terms: Vec::with_capacity(capacity),
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate against a full variable assignment
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Right-hand side of a constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Equal(f64),
    Range { min: f64, max: f64 },
    AtMost(f64),
}

impl Bound {
    pub fn holds(&self, value: f64, tolerance: f64) -> bool {
        match *self {
            Bound::Equal(rhs) => (value - rhs).abs() <= tolerance,
            Bound::Range { min, max } => value >= min - tolerance && value <= max + tolerance,
            Bound::AtMost(max) => value <= max + tolerance,
        }
    }
}

/// Which family a constraint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    MassConservation,
    ReplicationFactor,
    LoadBalance,
    /// Only present in the tie-break stage
    MovementCap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub expr: LinearExpr,
    pub bound: Bound,
}

/// Minimized objective: `constant + movement·x`.
///
/// `secondary` is an optional tie-break term, minimized only among
/// placements of optimal movement; it is never part of the reported
/// movement figure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objective {
    pub constant: f64,
    pub movement: LinearExpr,
    pub secondary: Option<LinearExpr>,
}

impl Objective {
    /// Movement value (tie-break excluded)
    pub fn movement_value(&self, values: &[f64]) -> f64 {
        self.constant + self.movement.eval(values)
    }
}

/// Deterministic preference among equally cheap placements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Leave the choice to the solver
    #[default]
    None,
    /// Prefer lower-numbered brokers
    PreferLowerBrokers,
}

/// A formulated binary program
#[derive(Debug, Clone)]
pub struct Model {
    pub variables: Vec<Variable>,
    pub objective: Objective,
    pub constraints: Vec<Constraint>,
    index: BTreeMap<ReplicaSlot, VarId>,
}

impl Model {
    pub fn var(&self, slot: &ReplicaSlot) -> Option<VarId> {
        self.index.get(slot).copied()
    }

    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    pub fn constraints_of(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.kind == kind)
    }

    /// Names of constraints violated by a full variable assignment
    pub fn violated_constraints(&self, values: &[f64], tolerance: f64) -> Vec<&str> {
        self.constraints
            .iter()
            .filter(|c| !c.bound.holds(c.expr.eval(values), tolerance))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Same program with the tie-break term dropped
    pub fn without_secondary(&self) -> Model {
        let mut model = self.clone();
        model.objective.secondary = None;
        model
    }

    /// Second lexicographic stage: minimize the tie-break term over
    /// placements whose movement is at most `max_movement`.
    ///
    /// The stage's objective is the tie-break alone, so solutions of it are
    /// read back against `self`. `None` when there is no tie-break.
    pub fn tie_break_stage(&self, max_movement: f64) -> Option<Model> {
        let secondary = self.objective.secondary.clone()?;
        let mut constraints = self.constraints.clone();
        constraints.push(Constraint {
            name: format!("total movement is at most {}", max_movement),
            kind: ConstraintKind::MovementCap,
            expr: self.objective.movement.clone(),
            bound: Bound::AtMost(max_movement - self.objective.constant),
        });
        Some(Model {
            variables: self.variables.clone(),
            objective: Objective {
                constant: 0.0,
                movement: secondary,
                secondary: None,
            },
            constraints,
            index: self.index.clone(),
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} variables ({} pinned), {} constraints",
            self.variables.len(),
            self.variables.iter().filter(|v| v.is_fixed()).count(),
            self.constraints.len()
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |var: &VarId| self.variables[var.0].slot.to_string();
        let render = |expr: &LinearExpr| {
            expr.terms()
                .iter()
                .map(|(var, coef)| format!("{:+} {}", coef, name(var)))
                .collect::<Vec<_>>()
                .join(" ")
        };

        writeln!(f, "MINIMIZE")?;
        writeln!(
            f,
            "  {:+} {}",
            self.objective.constant,
            render(&self.objective.movement)
        )?;
        if let Some(secondary) = &self.objective.secondary {
            writeln!(f, "  tie-break: {}", render(secondary))?;
        }
        writeln!(f, "SUBJECT TO")?;
        for constraint in &self.constraints {
            let rhs = match constraint.bound {
                Bound::Equal(rhs) => format!("= {}", rhs),
                Bound::Range { min, max } => format!("in [{}, {}]", min, max),
                Bound::AtMost(max) => format!("<= {}", max),
            };
            writeln!(f, "  {}: {} {}", constraint.name, render(&constraint.expr), rhs)?;
        }
        writeln!(f, "VARIABLES")?;
        for variable in &self.variables {
            writeln!(
                f,
                "  {} <= {} <= {} (binary)",
                variable.lower, variable.slot, variable.upper
            )?;
        }
        Ok(())
    }
}

/// Formulate the minimum-movement program for a problem spec
#[instrument(skip(spec), fields(slots = spec.slot_count()))]
pub fn formulate(spec: &ProblemSpec, tie_break: TieBreak) -> Model {
    let slot_count = spec.slot_count();
    let mut variables = Vec::with_capacity(slot_count);
    let mut index = BTreeMap::new();

    for slot in spec.slots() {
        let var = VarId(variables.len());
        let lower = if spec.is_pinned(&slot.partition, slot.broker) {
            1.0
        } else {
            0.0
        };
        index.insert(slot.clone(), var);
        variables.push(Variable {
            slot,
            lower,
            upper: 1.0,
        });
    }

    // Objective: arrivals cost +w/2, departures cost w/2 − (w/2)·x
    let mut movement = LinearExpr::with_capacity(slot_count);
    let mut constant = 0.0;
    for (idx, variable) in variables.iter().enumerate() {
        let slot = &variable.slot;
        let half_weight = spec.weight(&slot.partition) / 2.0;
        if spec.current.contains(&slot.partition, slot.broker) {
            constant += half_weight;
            movement.add_term(VarId(idx), -half_weight);
        } else {
            movement.add_term(VarId(idx), half_weight);
        }
    }
    for slot in &spec.departed {
        constant += spec.weight(&slot.partition) / 2.0;
    }

    let secondary = match tie_break {
        TieBreak::None => None,
        TieBreak::PreferLowerBrokers => Some(tie_break_expr(spec, &index)),
    };

    let mut constraints =
        Vec::with_capacity(1 + spec.partitions.len() + spec.brokers.len());

    // Mass conservation
    let mut mass = LinearExpr::with_capacity(slot_count);
    for (idx, variable) in variables.iter().enumerate() {
        mass.add_term(VarId(idx), spec.weight(&variable.slot.partition));
    }
    constraints.push(Constraint {
        name: format!("total replica weight is {}", spec.target_mass),
        kind: ConstraintKind::MassConservation,
        expr: mass,
        bound: Bound::Equal(spec.target_mass),
    });

    // Replication factor per partition
    for partition in &spec.partitions {
        let mut replicas = LinearExpr::with_capacity(spec.brokers.len());
        for broker in &spec.brokers {
            let slot = ReplicaSlot::new(partition.clone(), *broker);
            if let Some(var) = index.get(&slot) {
                replicas.add_term(*var, 1.0);
            }
        }
        let rf = spec.target_rf(partition);
        constraints.push(Constraint {
            name: format!("partition {} has replication factor {}", partition, rf),
            kind: ConstraintKind::ReplicationFactor,
            expr: replicas,
            bound: Bound::Equal(f64::from(rf)),
        });
    }

    // Load balance per broker
    let bounds = spec.bounds;
    for broker in &spec.brokers {
        let mut load = LinearExpr::with_capacity(spec.partitions.len());
        for partition in &spec.partitions {
            let slot = ReplicaSlot::new(partition.clone(), *broker);
            if let Some(var) = index.get(&slot) {
                load.add_term(*var, spec.weight(partition));
            }
        }
        let (name, bound) = if bounds.is_exact() {
            (
                format!("load of broker {} is {}", broker, bounds.min_load),
                Bound::Equal(bounds.min_load),
            )
        } else {
            (
                format!(
                    "load of broker {} is within [{}, {}]",
                    broker, bounds.min_load, bounds.max_load
                ),
                Bound::Range {
                    min: bounds.min_load,
                    max: bounds.max_load,
                },
            )
        };
        constraints.push(Constraint {
            name,
            kind: ConstraintKind::LoadBalance,
            expr: load,
            bound,
        });
    }

    let model = Model {
        variables,
        objective: Objective {
            constant,
            movement,
            secondary,
        },
        constraints,
        index,
    };
    debug!(summary = %model.summary(), "Model formulated");
    model
}

/// rank(b) + 1 on every slot
fn tie_break_expr(spec: &ProblemSpec, index: &BTreeMap<ReplicaSlot, VarId>) -> LinearExpr {
    let mut expr = LinearExpr::with_capacity(index.len());
    for (slot, var) in index {
        if let Ok(rank) = spec.brokers.binary_search(&slot.broker) {
            expr.add_term(*var, (rank + 1) as f64);
        }
    }
    expr
}
