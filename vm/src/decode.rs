//! Decoding of the instruction word

use crate::{Memory, RuntimeErr, VMInt};

/// Addressing mode of a single param
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Position,
    Immediate,
    Relative,
}

impl ParamMode {
    fn from(value: VMInt) -> Option<ParamMode> {
        match value {
            0 => Some(Self::Position),
            1 => Some(Self::Immediate),
            2 => Some(Self::Relative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    ADD,
    MUL,
    IN,
    OUT,
    JNZ,
    JZ,
    SLT,
    SEQ,
    INCB,
    HALT,
}

impl OpCode {
    pub fn from(value: VMInt) -> Option<OpCode> {
        match value {
            1 => Some(Self::ADD),
            2 => Some(Self::MUL),
            3 => Some(Self::IN),
            4 => Some(Self::OUT),
            5 => Some(Self::JNZ),
            6 => Some(Self::JZ),
            7 => Some(Self::SLT),
            8 => Some(Self::SEQ),
            9 => Some(Self::INCB),
            99 => Some(Self::HALT),
            _ => None,
        }
    }

    pub fn param_num(&self) -> usize {
        match self {
            Self::ADD | Self::MUL | Self::SLT | Self::SEQ => 3,
            Self::JNZ | Self::JZ => 2,
            Self::IN | Self::OUT | Self::INCB => 1,
            Self::HALT => 0,
        }
    }
}

/// Where a param points once the relative base is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A memory cell. Could be negative, the check is done on access
    Address(VMInt),
    /// The immediate value itself
    Value(VMInt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub mode: ParamMode,
    pub value: VMInt,
}

impl Param {
    /// Resolve the param against the relative base `rb`
    ///
    /// Returns `None` if the relative address overflows.
    pub fn resolve(self, rb: VMInt) -> Option<Operand> {
        match self.mode {
            ParamMode::Position => Some(Operand::Address(self.value)),
            ParamMode::Immediate => Some(Operand::Value(self.value)),
            ParamMode::Relative => rb.checked_add(self.value).map(Operand::Address),
        }
    }
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    params: [Param; 3],
}

impl Instruction {
    /// Decode the instruction at `pc`
    pub fn decode(memory: &Memory, pc: usize) -> Result<Instruction, RuntimeErr> {
        let word = memory.read(pc);
        let opcode = OpCode::from(word % 100).ok_or(RuntimeErr::InvalidOpcode { pc, opcode: word })?;

        let mut modes = word / 100;
        let mut params = [Param {
            mode: ParamMode::Position,
            value: 0,
        }; 3];
        for (i, param) in params.iter_mut().take(opcode.param_num()).enumerate() {
            let mode = modes % 10;
            *param = Param {
                mode: ParamMode::from(mode).ok_or(RuntimeErr::InvalidParamMode {
                    pc,
                    instruction: word,
                    mode,
                })?,
                value: memory.read(pc + 1 + i),
            };
            modes /= 10;
        }

        Ok(Instruction { opcode, params })
    }

    /// The params actually used by the opcode
    pub fn params(&self) -> &[Param] {
        &self.params[..self.opcode.param_num()]
    }

    /// Cells taken by the instruction, opcode included
    pub fn len(&self) -> usize {
        1 + self.opcode.param_num()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(words: &[VMInt]) -> Result<Instruction, RuntimeErr> {
        Instruction::decode(&Memory::new(words), 0)
    }

    #[test]
    fn position_by_default() {
        let instr = decode(&[2, 4, 5, 6]).unwrap();
        assert_eq!(instr.opcode, OpCode::MUL);
        assert_eq!(instr.len(), 4);
        assert!(instr
            .params()
            .iter()
            .all(|p| p.mode == ParamMode::Position));
        assert_eq!(
            instr.params().iter().map(|p| p.value).collect::<Vec<_>>(),
            [4, 5, 6]
        );
    }

    #[test]
    fn modes_are_read_right_to_left() {
        let instr = decode(&[1201, 7, -3, 2]).unwrap();
        assert_eq!(instr.opcode, OpCode::ADD);
        let modes: Vec<_> = instr.params().iter().map(|p| p.mode).collect();
        assert_eq!(
            modes,
            [ParamMode::Relative, ParamMode::Immediate, ParamMode::Position]
        );
    }

    #[test]
    fn unused_params_are_ignored() {
        // the `5` would be an invalid mode for a third param
        let instr = decode(&[50104, 3]).unwrap();
        assert_eq!(instr.opcode, OpCode::OUT);
        assert_eq!(instr.params().len(), 1);
        assert_eq!(instr.params()[0].mode, ParamMode::Immediate);
    }

    #[test]
    fn halt_has_no_params() {
        let instr = decode(&[99]).unwrap();
        assert_eq!(instr.opcode, OpCode::HALT);
        assert!(instr.params().is_empty());
        assert_eq!(instr.len(), 1);
    }

    #[test]
    fn invalid_opcode() {
        assert_eq!(
            decode(&[42]),
            Err(RuntimeErr::InvalidOpcode { pc: 0, opcode: 42 })
        );
        assert_eq!(
            decode(&[-1]),
            Err(RuntimeErr::InvalidOpcode { pc: 0, opcode: -1 })
        );
    }

    #[test]
    fn invalid_param_mode() {
        assert_eq!(
            decode(&[501, 0, 0, 0]),
            Err(RuntimeErr::InvalidParamMode {
                pc: 0,
                instruction: 501,
                mode: 5
            })
        );
    }

    #[test]
    fn relative_params_use_the_base() {
        let memory = Memory::new(&[22201, 10, 11, 12]);
        let instr = Instruction::decode(&memory, 0).unwrap();
        let resolved: Vec<_> = instr
            .params()
            .iter()
            .map(|p| p.resolve(100).unwrap())
            .collect();
        assert_eq!(
            resolved,
            [
                Operand::Address(110),
                Operand::Address(111),
                Operand::Address(112)
            ]
        );
    }

    #[test]
    fn immediate_params_are_values() {
        let param = Param {
            mode: ParamMode::Immediate,
            value: -1,
        };
        assert_eq!(param.resolve(100), Some(Operand::Value(-1)));
    }

    #[test]
    fn relative_overflow() {
        let param = Param {
            mode: ParamMode::Relative,
            value: VMInt::MAX,
        };
        assert_eq!(param.resolve(1), None);
    }
}
