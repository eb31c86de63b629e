//! Exhaustive search of the phase settings

use itertools::Itertools;
use tracing::{debug, info, trace};
use vm::{Options, VMInt};

use crate::{Circuit, CircuitErr, Topology};

/// Best phase setting found, with its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Best {
    pub phases: Vec<VMInt>,
    pub output: VMInt,
}

/// Try every ordering of `phases`, with a seed of 0
pub fn best_phases(
    program: &[VMInt],
    phases: &[VMInt],
    topology: Topology,
) -> Result<Best, CircuitErr> {
    best_phases_with(program, phases, topology, 0, Options::default())
}

/// Try every ordering of `phases` on a circuit with one computer for each phase
///
/// The first ordering reaching the maximum wins. Any failing run stops the search.
pub fn best_phases_with(
    program: &[VMInt],
    phases: &[VMInt],
    topology: Topology,
    seed: VMInt,
    options: Options,
) -> Result<Best, CircuitErr> {
    if phases.is_empty() {
        return Err(CircuitErr::Empty);
    }
    debug!(?phases, ?topology, seed, "Searching phases");

    let mut best: Option<Best> = None;
    for perm in phases.iter().copied().permutations(phases.len()) {
        let output = Circuit::with_options(perm.len(), program, options)?
            .run(topology, &perm, seed)?;
        trace!(phases = ?perm, output, "Tried");
        match &best {
            Some(b) if b.output >= output => (),
            _ => {
                best = Some(Best {
                    phases: perm,
                    output,
                })
            }
        }
    }

    // at least one permutation exists
    let best = best.ok_or(CircuitErr::Empty)?;
    info!(phases = ?best.phases, output = best.output, "Best phases found");
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_phases() {
        assert!(matches!(
            best_phases(&[99], &[], Topology::Linear),
            Err(CircuitErr::Empty)
        ));
    }

    #[test]
    fn single_computer() {
        // output = phase * input
        let program = [3, 11, 3, 12, 2, 11, 12, 11, 4, 11, 99];
        let best = best_phases_with(&program, &[7], Topology::Linear, 6, Options::default())
            .unwrap();
        assert_eq!(
            best,
            Best {
                phases: vec![7],
                output: 42
            }
        );
    }

    #[test]
    fn ties_keep_the_first() {
        // ignores both inputs, always outputs 5
        let program = [3, 0, 3, 0, 104, 5, 99];
        let best = best_phases(&program, &[2, 0, 1], Topology::Linear).unwrap();
        assert_eq!(best.phases, [2, 0, 1]);
        assert_eq!(best.output, 5);
    }
}
