//! Implementation of a intcode machine
//!
//! [`VM`] is the bare machine, stepped by the caller and stopping every time it needs input or has
//! output. [`Computer`] runs a machine on its own thread, talking through channels.

use thiserror::Error;
use tracing::{trace, warn};

pub mod computer;
mod decode;
mod memory;
pub mod program;

pub use computer::{
    CancelToken, Computer, ComputerErr, ComputerId, Exit, Finished, InputClosed, Running, Timeout,
};
pub use decode::{Instruction, OpCode, Operand, Param, ParamMode};
pub use memory::Memory;

pub type VMInt = i64;

/// Possible errors during execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErr {
    #[error("{opcode} is not a valid opcode (at position {pc})")]
    InvalidOpcode { pc: usize, opcode: VMInt },
    #[error("{mode} is not a valid param mode (instruction {instruction} at position {pc})")]
    InvalidParamMode {
        pc: usize,
        instruction: VMInt,
        mode: VMInt,
    },
    #[error("Tried to write to immediate param (at position {pc})")]
    WritingToImmediate { pc: usize },
    #[error("Tried to read from negative address {address} (at position {pc})")]
    ReadingFromNegative { pc: usize, address: VMInt },
    #[error("Tried to write to negative address {address} (at position {pc})")]
    WritingToNegative { pc: usize, address: VMInt },
    #[error("Tried to jump to negative position {target} (at position {pc})")]
    JumpToNegative { pc: usize, target: VMInt },
    #[error("Integer overflow (at position {pc})")]
    Overflow { pc: usize },
}

/// Errors in loading a program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadErr {
    #[error("The program is empty")]
    EmptyProgram,
}

/// What to do when meeting an unknown opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpcode {
    /// Stop with [`RuntimeErr::InvalidOpcode`]
    #[default]
    Fail,
    /// Log a warning and advance the pc by one
    Skip,
}

/// Configuration of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    pub unknown_opcode: UnknownOpcode,
    /// Capacity of the channels created by [`Computer`]. 0 means every value is handed over
    /// directly to the receiver.
    pub channel_capacity: usize,
}

/// Possible state in which a machine need interaction
#[derive(Debug)]
pub enum StopState<'vm> {
    NeedInput(NeedInput<'vm>),
    HasOutput(VMInt),
    Halted,
}

/// Any state of a machine
#[derive(Debug)]
pub enum State<'vm> {
    Stopped(StopState<'vm>),
    Running,
}

/// A machine waiting on a input instruction
#[derive(Debug)]
pub struct NeedInput<'vm> {
    vm: &'vm mut VM,
    dst: usize,
}

impl NeedInput<'_> {
    /// Complete the input instruction
    pub fn give(self, value: VMInt) {
        self.vm.memory.write(self.dst, value);
        self.vm.pc += 1 + OpCode::IN.param_num();
    }
}

/// Stop reasons, before borrowing the machine
enum Stop {
    Input(usize),
    Output(VMInt),
    Halt,
}

/// A intcode machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VM {
    memory: Memory,
    pc: usize,
    rb: VMInt,
    options: Options,
}

impl VM {
    /// Load a program with the default options
    pub fn load(program: &[VMInt]) -> Result<Self, LoadErr> {
        Self::with_options(program, Options::default())
    }

    pub fn with_options(program: &[VMInt], options: Options) -> Result<Self, LoadErr> {
        if program.is_empty() {
            return Err(LoadErr::EmptyProgram);
        }
        Ok(VM {
            memory: Memory::new(program),
            pc: 0,
            rb: 0,
            options,
        })
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
    /// Patch the memory, e.g. before running
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
    pub fn pc(&self) -> usize {
        self.pc
    }
    pub fn rb(&self) -> VMInt {
        self.rb
    }
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn resolve(&self, param: Param) -> Result<Operand, RuntimeErr> {
        param
            .resolve(self.rb)
            .ok_or(RuntimeErr::Overflow { pc: self.pc })
    }

    /// Read from a param
    fn read_param(&self, param: Param) -> Result<VMInt, RuntimeErr> {
        match self.resolve(param)? {
            Operand::Value(value) => Ok(value),
            Operand::Address(address) => usize::try_from(address)
                .map(|pos| self.memory.read(pos))
                .map_err(|_| RuntimeErr::ReadingFromNegative {
                    pc: self.pc,
                    address,
                }),
        }
    }

    /// Address a param writes to
    fn write_address(&self, param: Param) -> Result<usize, RuntimeErr> {
        match self.resolve(param)? {
            Operand::Value(_) => Err(RuntimeErr::WritingToImmediate { pc: self.pc }),
            Operand::Address(address) => {
                usize::try_from(address).map_err(|_| RuntimeErr::WritingToNegative {
                    pc: self.pc,
                    address,
                })
            }
        }
    }

    fn jump(&mut self, target: VMInt) -> Result<(), RuntimeErr> {
        self.pc = usize::try_from(target).map_err(|_| RuntimeErr::JumpToNegative {
            pc: self.pc,
            target,
        })?;
        Ok(())
    }

    /// Execute a single instruction, without giving out borrows
    fn exec(&mut self) -> Result<Option<Stop>, RuntimeErr> {
        let instr = match Instruction::decode(&self.memory, self.pc) {
            Ok(instr) => instr,
            Err(RuntimeErr::InvalidOpcode { pc, opcode })
                if self.options.unknown_opcode == UnknownOpcode::Skip =>
            {
                warn!(pc, opcode, "Skipping unknown opcode");
                self.pc += 1;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        trace!(pc = self.pc, rb = self.rb, ?instr);

        let params = instr.params();
        let overflow = RuntimeErr::Overflow { pc: self.pc };
        match instr.opcode {
            OpCode::ADD | OpCode::MUL | OpCode::SLT | OpCode::SEQ => {
                let a = self.read_param(params[0])?;
                let b = self.read_param(params[1])?;
                let dst = self.write_address(params[2])?;
                let res = match instr.opcode {
                    OpCode::ADD => a.checked_add(b).ok_or(overflow)?,
                    OpCode::MUL => a.checked_mul(b).ok_or(overflow)?,
                    OpCode::SLT => (a < b).into(),
                    _ => (a == b).into(),
                };
                self.memory.write(dst, res);
                self.pc += instr.len();
                Ok(None)
            }
            OpCode::IN => self.write_address(params[0]).map(|dst| Some(Stop::Input(dst))),
            OpCode::OUT => {
                let value = self.read_param(params[0])?;
                self.pc += instr.len();
                Ok(Some(Stop::Output(value)))
            }
            OpCode::JNZ | OpCode::JZ => {
                let cond = self.read_param(params[0])?;
                if (cond != 0) == (instr.opcode == OpCode::JNZ) {
                    let target = self.read_param(params[1])?;
                    self.jump(target)?;
                } else {
                    self.pc += instr.len();
                }
                Ok(None)
            }
            OpCode::INCB => {
                let value = self.read_param(params[0])?;
                self.rb = self.rb.checked_add(value).ok_or(overflow)?;
                self.pc += instr.len();
                Ok(None)
            }
            OpCode::HALT => Ok(Some(Stop::Halt)),
        }
    }

    fn stop_state(&mut self, stop: Stop) -> StopState<'_> {
        match stop {
            Stop::Input(dst) => StopState::NeedInput(NeedInput { vm: self, dst }),
            Stop::Output(value) => StopState::HasOutput(value),
            Stop::Halt => StopState::Halted,
        }
    }

    /// Step the machine forward
    pub fn step(&mut self) -> Result<State<'_>, RuntimeErr> {
        Ok(match self.exec()? {
            None => State::Running,
            Some(stop) => State::Stopped(self.stop_state(stop)),
        })
    }

    /// Run the machine until it need interaction
    pub fn run(&mut self) -> Result<StopState<'_>, RuntimeErr> {
        let stop = loop {
            if let Some(stop) = self.exec()? {
                break stop;
            }
        };
        Ok(self.stop_state(stop))
    }
}
