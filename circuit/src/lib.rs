//! Chains of intcode computers
//!
//! Every computer of a [`Circuit`] runs the same program, and its output is connected to the input
//! of the next one. The input of the first computer and the output of the last one are left to
//! the caller, that can close the loop by feeding the output back (see
//! [`Circuit::run_to_completion`]).

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use vm::{
    CancelToken, Computer, ComputerErr, ComputerId, Finished, InputClosed, LoadErr, Options,
    Running, Timeout, VMInt,
};

mod search;

pub use search::{best_phases, best_phases_with, Best};

#[derive(Debug, Error)]
pub enum CircuitErr {
    #[error("A circuit needs at least one computer")]
    Empty,
    #[error(transparent)]
    Load(#[from] LoadErr),
    #[error("Got {got} phases for {expected} computers")]
    PhaseCount { expected: usize, got: usize },
    #[error(transparent)]
    Computer(#[from] ComputerErr),
    #[error("The circuit produced no output")]
    NoOutput,
}

/// How the output of the circuit is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// The seed goes through the chain once
    #[default]
    Linear,
    /// Every output is fed back in the first computer, until the chain stops
    Feedback,
}

/// A chain of loaded computers
#[derive(Debug)]
pub struct Circuit {
    computers: Vec<Computer>,
}

impl Circuit {
    /// Chain `n` computers running `program`
    pub fn new(n: usize, program: &[VMInt]) -> Result<Self, CircuitErr> {
        Self::with_options(n, program, Options::default())
    }

    pub fn with_options(n: usize, program: &[VMInt], options: Options) -> Result<Self, CircuitErr> {
        if n == 0 {
            return Err(CircuitErr::Empty);
        }
        let mut computers: Vec<Computer> = Vec::with_capacity(n);
        for i in 0..n {
            let mut computer = Computer::with_options(ComputerId(i), program, options)?;
            if let Some(prev) = computers.last_mut() {
                // fresh computers always own their output
                if let Some(output) = prev.take_output() {
                    computer.connect_input(output)
                }
            }
            computers.push(computer)
        }
        debug!(n, "Circuit built");
        Ok(Self { computers })
    }

    pub fn len(&self) -> usize {
        self.computers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computers.is_empty()
    }

    pub fn computers(&self) -> &[Computer] {
        &self.computers
    }

    /// Give `phases[i]` as the first input of the `i`th computer
    pub fn set_phases(&mut self, phases: &[VMInt]) -> Result<(), CircuitErr> {
        if phases.len() != self.computers.len() {
            return Err(CircuitErr::PhaseCount {
                expected: self.computers.len(),
                got: phases.len(),
            });
        }
        for (computer, phase) in self.computers.iter_mut().zip(phases) {
            computer.give_input(*phase)
        }
        Ok(())
    }

    /// Start all the computers
    pub fn start(self) -> Result<RunningCircuit, CircuitErr> {
        self.start_with(CancelToken::new())
    }

    pub fn start_with(self, cancel: CancelToken) -> Result<RunningCircuit, CircuitErr> {
        let mut running = Vec::with_capacity(self.computers.len());
        for computer in self.computers {
            match computer.run_with(cancel.clone()) {
                Ok(computer) => running.push(computer),
                Err(err) => {
                    // the ones already started must not be left blocked
                    cancel.cancel();
                    for computer in running {
                        let _ = computer.wait();
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(RunningCircuit {
            computers: running,
            cancel,
        })
    }

    /// Run with the given phases, feeding every output back in until the circuit stops
    ///
    /// Returns the last output.
    pub fn run_to_completion(mut self, phases: &[VMInt], seed: VMInt) -> Result<VMInt, CircuitErr> {
        self.set_phases(phases)?;
        let circuit = self.start()?;

        let mut last = None;
        let mut feeding = true;
        let mut value = seed;
        loop {
            if feeding && circuit.send_input(value).is_err() {
                debug!("First computer stopped, draining the circuit");
                feeding = false;
            }
            match circuit.receive_output() {
                Some(output) => {
                    last = Some(output);
                    value = output;
                }
                None => break,
            }
        }
        circuit.wait()?;
        last.ok_or(CircuitErr::NoOutput)
    }

    /// Run with the given phases, passing `seed` once through the chain
    ///
    /// Returns the last output.
    pub fn run_once(mut self, phases: &[VMInt], seed: VMInt) -> Result<VMInt, CircuitErr> {
        self.set_phases(phases)?;
        let mut circuit = self.start()?;

        // a first computer that already stopped will just produce no output
        let _ = circuit.send_input(seed);
        circuit.close_input();
        let mut last = None;
        while let Some(output) = circuit.receive_output() {
            last = Some(output)
        }
        circuit.wait()?;
        last.ok_or(CircuitErr::NoOutput)
    }

    pub fn run(self, topology: Topology, phases: &[VMInt], seed: VMInt) -> Result<VMInt, CircuitErr> {
        match topology {
            Topology::Linear => self.run_once(phases, seed),
            Topology::Feedback => self.run_to_completion(phases, seed),
        }
    }
}

/// A chain of running computers
#[derive(Debug)]
pub struct RunningCircuit {
    /// Never empty
    computers: Vec<Running>,
    cancel: CancelToken,
}

impl RunningCircuit {
    fn first(&self) -> &Running {
        &self.computers[0]
    }
    fn last(&self) -> &Running {
        &self.computers[self.computers.len() - 1]
    }

    /// Send a value to the first computer
    pub fn send_input(&self, value: VMInt) -> Result<(), InputClosed> {
        self.first().send_input(value)
    }

    /// Stop sending input to the first computer
    pub fn close_input(&mut self) {
        self.computers[0].close_input()
    }

    /// Wait for the next output of the last computer. `None` means it stopped
    pub fn receive_output(&self) -> Option<VMInt> {
        self.last().receive_output()
    }

    pub fn receive_output_timeout(&self, timeout: Duration) -> Result<Option<VMInt>, Timeout> {
        self.last().receive_output_timeout(timeout)
    }

    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    /// Close the ends of the circuit and wait for every computer to stop
    ///
    /// The first error is returned, after all the computers are stopped.
    pub fn wait(self) -> Result<Vec<Finished>, CircuitErr> {
        let RunningCircuit { mut computers, .. } = self;
        if let Some(first) = computers.first_mut() {
            first.close_input()
        }
        if let Some(last) = computers.last_mut() {
            last.close_output()
        }

        let mut finished = Vec::with_capacity(computers.len());
        let mut first_err = None;
        for computer in computers {
            match computer.wait() {
                Ok(f) => finished.push(f),
                Err(err) => {
                    error!(%err, "Computer failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(finished),
        }
    }
}
