use crate::error::VmError;
use crate::executor;
use crate::instruction::{Instruction, Register};
use crate::memory::Memory;
use crate::registers::Registers;
use crate::terminal::Terminal;

/// Conventional address at which user programs begin.
pub const PC_START: u16 = 0x3000;

/// The 3-bit condition code. Exactly one of these is ever set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCode {
    Pos = 0b001,
    Zro = 0b010,
    Neg = 0b100,
}

/// All mutable VM state, threaded through the loader and executor. Owning
/// memory, registers, PC and COND in one value (rather than as process-wide
/// globals) makes the VM embeddable and lets tests run in parallel.
pub struct Machine {
    pub registers: Registers,
    pub memory: Memory,
    pub terminal: Box<dyn Terminal>,
    pub pc: u16,
    pub condition: ConditionCode,
    pub running: bool,
}

impl Machine {
    pub fn new(terminal: Box<dyn Terminal>) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(),
            terminal,
            pc: PC_START,
            condition: ConditionCode::Zro,
            running: true,
        }
    }

    pub fn read(&mut self, address: u16) -> u16 {
        self.memory.read(address, self.terminal.as_mut())
    }

    pub fn write(&mut self, address: u16, value: u16) {
        self.memory.write(address, value);
    }

    /// Sets `COND` from the sign of the value now held in `register`. The
    /// only input is the register's current value — never the operation
    /// that produced it.
    pub fn update_flags(&mut self, register: Register) {
        let value = self.registers.read(register);

        self.condition = if value == 0 {
            ConditionCode::Zro
        } else if (value >> 15) == 1 {
            ConditionCode::Neg
        } else {
            ConditionCode::Pos
        };
    }

    /// Fetches the word at `PC`, increments `PC`, decodes, and executes.
    pub fn step(&mut self) -> Result<(), VmError> {
        let at = self.pc;
        let raw = self.read(self.pc);
        let instruction = Instruction::decode(raw);
        self.pc = self.pc.wrapping_add(1);

        log::trace!("{:#06x}: {:#06x} -> {:?}", at, raw, instruction);

        executor::execute(self, instruction, at)
    }

    /// Runs until `HALT` clears `running` or a fatal error occurs.
    pub fn run(&mut self) -> Result<(), VmError> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }
}
