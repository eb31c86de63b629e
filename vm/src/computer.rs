//! Intcode machines running on their own thread
//!
//! A [`Computer`] owns a [`VM`] and the two ends of its io channels. Calling [`Computer::run`]
//! moves the machine on a new thread, and gives back a [`Running`] handle to talk with it. The
//! machine blocks on input and output instructions until the other side of the channel is ready,
//! and closes its output when it stops: readers see that as the end of the stream.

use std::{
    collections::VecDeque,
    fmt::Display,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, error, info_span};

use crate::{LoadErr, Options, RuntimeErr, State, StopState, VMInt, VM};

/// Identity of a computer, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputerId(pub usize);

impl Display for ComputerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared flag to stop running computers
///
/// Cancelling wakes up every computer blocked on input or output that was started with a clone
/// of this token. Computers that are executing are stopped before the next instruction.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    // dropping the only sender disconnects every receiver, waking all the waiters at once
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(trigger))),
            signal,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // a poisoned lock still lets us drop the sender
        let mut trigger = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a computer stopped without errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Executed the halt instruction
    Halted,
    /// Needed input, but no one can send it anymore
    InputClosed,
    /// Had output, but no one is listening anymore
    OutputClosed,
    /// Stopped through a [`CancelToken`]
    Cancelled,
}

/// A computer that stopped without errors
#[derive(Debug, Clone)]
pub struct Finished {
    /// The machine in its final state
    pub vm: VM,
    pub exit: Exit,
}

#[derive(Debug, Error)]
pub enum ComputerErr {
    #[error("Computer {id} stopped: {source}")]
    Runtime {
        id: ComputerId,
        #[source]
        source: RuntimeErr,
    },
    #[error("Computer {id} panicked")]
    Panicked { id: ComputerId },
    #[error("Cannot spawn the thread of computer {id}")]
    Spawn {
        id: ComputerId,
        #[source]
        source: io::Error,
    },
}

/// The computer does not accept input anymore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Computer {0} does not accept input anymore")]
pub struct InputClosed(pub ComputerId);

/// No output arrived in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Timed out waiting for output of computer {0}")]
pub struct Timeout(pub ComputerId);

/// A loaded computer, not yet running
#[derive(Debug)]
pub struct Computer {
    id: ComputerId,
    vm: VM,
    /// Inputs delivered before reading the input channel
    pending: VecDeque<VMInt>,
    input: Receiver<VMInt>,
    input_tx: Option<Sender<VMInt>>,
    output: Sender<VMInt>,
    output_rx: Option<Receiver<VMInt>>,
}

impl Computer {
    /// Load a program with the default options
    pub fn load(id: ComputerId, program: &[VMInt]) -> Result<Self, LoadErr> {
        Self::with_options(id, program, Options::default())
    }

    pub fn with_options(id: ComputerId, program: &[VMInt], options: Options) -> Result<Self, LoadErr> {
        let vm = VM::with_options(program, options)?;
        let (input_tx, input) = bounded(options.channel_capacity);
        let (output, output_rx) = bounded(options.channel_capacity);
        Ok(Self {
            id,
            vm,
            pending: VecDeque::new(),
            input,
            input_tx: Some(input_tx),
            output,
            output_rx: Some(output_rx),
        })
    }

    pub fn id(&self) -> ComputerId {
        self.id
    }

    pub fn vm(&self) -> &VM {
        &self.vm
    }

    /// Queue a value that the machine will read before anything coming from the input channel
    pub fn give_input(&mut self, value: VMInt) {
        self.pending.push_back(value)
    }

    /// Sender for the input channel, if it is still the one created with the computer
    pub fn input_sender(&self) -> Option<&Sender<VMInt>> {
        self.input_tx.as_ref()
    }

    /// Receiver for the output channel, if it was not taken
    pub fn output_receiver(&self) -> Option<&Receiver<VMInt>> {
        self.output_rx.as_ref()
    }

    /// Detach the output receiver, so it can be connected to another computer
    pub fn take_output(&mut self) -> Option<Receiver<VMInt>> {
        self.output_rx.take()
    }

    /// Read input from `input` instead of the channel created with the computer
    pub fn connect_input(&mut self, input: Receiver<VMInt>) {
        self.input = input;
        self.input_tx = None;
    }

    /// Start the computer on its own thread
    pub fn run(self) -> Result<Running, ComputerErr> {
        self.run_with(CancelToken::new())
    }

    /// Start the computer on its own thread, stopping it when `cancel` is triggered
    pub fn run_with(self, cancel: CancelToken) -> Result<Running, ComputerErr> {
        let Computer {
            id,
            mut vm,
            mut pending,
            input,
            input_tx,
            output,
            output_rx,
        } = self;

        let span = info_span!("computer", %id);
        let thread_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("intcode-{}", id.0))
            .spawn(move || {
                let _enter = span.enter();
                debug!("Started");
                let res = drive(&mut vm, &mut pending, &input, &output, &thread_cancel);
                match &res {
                    Ok(exit) => debug!(?exit, pc = vm.pc(), "Stopped"),
                    Err(err) => error!(%err, "Runtime error"),
                }
                // closing the channels before handing back the machine
                drop(input);
                drop(output);
                res.map(|exit| Finished { vm, exit })
            })
            .map_err(|source| ComputerErr::Spawn { id, source })?;

        Ok(Running {
            id,
            input: input_tx,
            output: output_rx,
            cancel,
            handle,
        })
    }
}

/// Execute until the machine stops
fn drive(
    vm: &mut VM,
    pending: &mut VecDeque<VMInt>,
    input: &Receiver<VMInt>,
    output: &Sender<VMInt>,
    cancel: &CancelToken,
) -> Result<Exit, RuntimeErr> {
    loop {
        if cancel.is_cancelled() {
            return Ok(Exit::Cancelled);
        }
        match vm.step()? {
            State::Running => (),
            State::Stopped(StopState::Halted) => return Ok(Exit::Halted),
            State::Stopped(StopState::HasOutput(value)) => select! {
                send(output, value) -> res => if res.is_err() {
                    return Ok(Exit::OutputClosed);
                },
                recv(cancel.signal()) -> _ => return Ok(Exit::Cancelled),
            },
            State::Stopped(StopState::NeedInput(need_input)) => {
                let value = match pending.pop_front() {
                    Some(value) => value,
                    None => select! {
                        recv(input) -> msg => match msg {
                            Ok(value) => value,
                            Err(_) => return Ok(Exit::InputClosed),
                        },
                        recv(cancel.signal()) -> _ => return Ok(Exit::Cancelled),
                    },
                };
                need_input.give(value);
            }
        }
    }
}

/// Handle to a running computer
#[derive(Debug)]
pub struct Running {
    id: ComputerId,
    input: Option<Sender<VMInt>>,
    output: Option<Receiver<VMInt>>,
    cancel: CancelToken,
    handle: JoinHandle<Result<Finished, RuntimeErr>>,
}

impl Running {
    pub fn id(&self) -> ComputerId {
        self.id
    }

    /// Give a value to the computer, waiting until it takes it
    pub fn send_input(&self, value: VMInt) -> Result<(), InputClosed> {
        self.input
            .as_ref()
            .ok_or(InputClosed(self.id))?
            .send(value)
            .map_err(|_| InputClosed(self.id))
    }

    /// Drop the input channel: a computer waiting for input will stop
    pub fn close_input(&mut self) {
        self.input = None
    }

    /// Drop the output channel: a computer with output to give will stop
    pub fn close_output(&mut self) {
        self.output = None
    }

    /// Wait for the next output. `None` means the computer stopped
    pub fn receive_output(&self) -> Option<VMInt> {
        self.output.as_ref()?.recv().ok()
    }

    /// Wait for the next output, at most for `timeout`
    pub fn receive_output_timeout(&self, timeout: Duration) -> Result<Option<VMInt>, Timeout> {
        let Some(output) = &self.output else {
            return Ok(None);
        };
        match output.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(Timeout(self.id)),
        }
    }

    /// Collect all the output, until the computer stops
    ///
    /// The input channel is closed first, so a computer asking for more input stops instead of
    /// waiting forever.
    pub fn collect_outputs(&mut self) -> Vec<VMInt> {
        self.close_input();
        let mut outputs = vec![];
        while let Some(value) = self.receive_output() {
            outputs.push(value)
        }
        outputs
    }

    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the computer to stop
    ///
    /// Both channels are dropped first: output not yet received is lost.
    pub fn wait(self) -> Result<Finished, ComputerErr> {
        let Running {
            id,
            input,
            output,
            handle,
            ..
        } = self;
        drop(input);
        drop(output);
        match handle.join() {
            Ok(Ok(finished)) => Ok(finished),
            Ok(Err(source)) => Err(ComputerErr::Runtime { id, source }),
            Err(_) => Err(ComputerErr::Panicked { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn start(program: &[VMInt]) -> Running {
        Computer::load(ComputerId(0), program)
            .unwrap()
            .run()
            .unwrap()
    }

    fn next(running: &Running) -> Option<VMInt> {
        running
            .receive_output_timeout(TIMEOUT)
            .expect("The computer is deadlocked")
    }

    #[test]
    fn halt_immediately() {
        let mut running = start(&[99]);
        assert!(running.collect_outputs().is_empty());
        let finished = running.wait().unwrap();
        assert_eq!(finished.exit, Exit::Halted);
        assert_eq!(finished.vm.memory().as_slice(), &[99]);
        assert_eq!(finished.vm.pc(), 0);
    }

    #[test]
    fn echo() {
        let running = start(&[3, 0, 4, 0, 99]);
        running.send_input(42).unwrap();
        assert_eq!(next(&running), Some(42));
        assert_eq!(next(&running), None);
        assert_eq!(running.wait().unwrap().exit, Exit::Halted);
    }

    #[test]
    fn input_after_halt_is_refused() {
        let running = start(&[3, 0, 4, 0, 99]);
        running.send_input(1).unwrap();
        assert_eq!(next(&running), Some(1));
        assert_eq!(next(&running), None);
        assert_eq!(running.send_input(2), Err(InputClosed(ComputerId(0))));
    }

    #[test]
    fn pending_inputs_come_first() {
        let mut computer = Computer::load(ComputerId(3), &[3, 0, 3, 1, 4, 0, 4, 1, 99]).unwrap();
        computer.give_input(5);
        let running = computer.run().unwrap();
        running.send_input(6).unwrap();
        assert_eq!(next(&running), Some(5));
        assert_eq!(next(&running), Some(6));
        assert_eq!(next(&running), None);
    }

    #[test]
    fn collect_quine() {
        let quine = [
            109, 1, 204, -1, 1001, 100, 1, 100, 1008, 100, 16, 101, 1006, 101, 0, 99,
        ];
        let mut running = start(&quine);
        assert_eq!(running.collect_outputs(), quine);
    }

    #[test]
    fn collect_stops_a_starving_computer() {
        let mut running = start(&[3, 0, 4, 0, 3, 0, 99]);
        running.send_input(9).unwrap();
        assert_eq!(running.collect_outputs(), [9]);
        assert_eq!(running.wait().unwrap().exit, Exit::InputClosed);
    }

    #[test]
    fn wait_stops_a_talking_computer() {
        let running = start(&[104, 1, 1105, 1, 0]);
        assert_eq!(next(&running), Some(1));
        assert_eq!(running.wait().unwrap().exit, Exit::OutputClosed);
    }

    #[test]
    fn runtime_errors_close_the_output() {
        let running = start(&[104, 1, 42]);
        assert_eq!(next(&running), Some(1));
        assert_eq!(next(&running), None);
        match running.wait() {
            Err(ComputerErr::Runtime { id, source }) => {
                assert_eq!(id, ComputerId(0));
                assert_eq!(source, RuntimeErr::InvalidOpcode { pc: 2, opcode: 42 });
            }
            other => panic!("Expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn chained_computers() {
        let mut first = Computer::load(ComputerId(0), &[3, 0, 1001, 0, 1, 0, 4, 0, 99]).unwrap();
        let mut second = Computer::load(ComputerId(1), &[3, 0, 1002, 0, 10, 0, 4, 0, 99]).unwrap();
        second.connect_input(first.take_output().unwrap());
        assert!(second.input_sender().is_none());
        let first = first.run().unwrap();
        let second = second.run().unwrap();
        first.send_input(4).unwrap();
        assert_eq!(next(&second), Some(50));
        assert_eq!(next(&second), None);
        assert_eq!(first.wait().unwrap().exit, Exit::Halted);
        assert_eq!(second.wait().unwrap().exit, Exit::Halted);
    }

    #[test]
    fn cancel_a_blocked_computer() {
        let running = start(&[3, 0, 99]);
        running.cancel();
        assert_eq!(running.wait().unwrap().exit, Exit::Cancelled);
    }

    #[test]
    fn cancel_a_busy_computer() {
        // infinite loop, never touching io
        let cancel = CancelToken::new();
        let running = Computer::load(ComputerId(0), &[1105, 1, 0])
            .unwrap()
            .run_with(cancel.clone())
            .unwrap();
        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(running.wait().unwrap().exit, Exit::Cancelled);
    }

    #[test]
    fn buffered_channels() {
        let options = Options {
            channel_capacity: 2,
            ..Options::default()
        };
        let running = Computer::with_options(ComputerId(0), &[104, 1, 104, 2, 99], options)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(next(&running), Some(1));
        assert_eq!(next(&running), Some(2));
        assert_eq!(next(&running), None);
    }

    #[test]
    fn deadlock_is_detected_by_timeout() {
        let running = start(&[3, 0, 4, 0, 99]);
        assert_eq!(
            running.receive_output_timeout(Duration::from_millis(50)),
            Err(Timeout(ComputerId(0)))
        );
        running.cancel();
        assert_eq!(running.wait().unwrap().exit, Exit::Cancelled);
    }
}
