//! Applies the semantic effect of one decoded instruction to a [`Machine`].

use crate::error::VmError;
use crate::instruction::{Instruction, Register};
use crate::machine::Machine;
use crate::sign_extend::SignExtend;
use crate::trap_vector::TrapVector;

pub fn execute(machine: &mut Machine, instruction: Instruction, at: u16) -> Result<(), VmError> {
    match instruction {
        // BR - branch if any tested condition bit overlaps COND.
        Instruction::Br(condition, pc_offset) => {
            let cond = machine.condition as u16;
            let hit = (condition.n && cond & 0b100 != 0)
                || (condition.z && cond & 0b010 != 0)
                || (condition.p && cond & 0b001 != 0);

            if hit {
                machine.pc = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            }
        }

        // ADD - register and immediate forms.
        Instruction::Add(dr, sr1, sr2) => {
            let value = machine
                .registers
                .read(sr1)
                .wrapping_add(machine.registers.read(sr2));
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }
        Instruction::AddImm(dr, sr1, imm5) => {
            let value = machine.registers.read(sr1).wrapping_add(imm5);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // LD - PC-relative load.
        Instruction::Ld(dr, pc_offset) => {
            let address = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            let value = machine.read(address);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // ST - PC-relative store.
        Instruction::St(sr, pc_offset) => {
            let address = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            machine.write(address, machine.registers.read(sr));
        }

        // JSR / JSRR - save linkage in R7, then jump.
        Instruction::Jsr(pc_offset) => {
            let linkage = machine.pc;
            machine.pc = machine.pc.wrapping_add(pc_offset.sign_extend(11));
            machine.registers.write(Register::R7, linkage);
        }
        Instruction::Jsrr(base_r) => {
            let linkage = machine.pc;
            machine.pc = machine.registers.read(base_r);
            machine.registers.write(Register::R7, linkage);
        }

        // AND - register and immediate forms.
        Instruction::And(dr, sr1, sr2) => {
            let value = machine.registers.read(sr1) & machine.registers.read(sr2);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }
        Instruction::AndImm(dr, sr1, imm5) => {
            let value = machine.registers.read(sr1) & imm5;
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // LDR - base+offset load.
        Instruction::Ldr(dr, base_r, offset) => {
            let address = machine.registers.read(base_r).wrapping_add(offset);
            let value = machine.read(address);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // STR - base+offset store.
        Instruction::Str(sr, base_r, offset) => {
            let address = machine.registers.read(base_r).wrapping_add(offset);
            machine.write(address, machine.registers.read(sr));
        }

        Instruction::Rti => {
            return Err(VmError::IllegalInstruction {
                opcode: 0b1000,
                pc: at,
            });
        }

        // NOT - bitwise complement.
        Instruction::Not(dr, sr) => {
            let value = !machine.registers.read(sr);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // LDI - load indirect.
        Instruction::Ldi(dr, pc_offset) => {
            let pointer = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            let address = machine.read(pointer);
            let value = machine.read(address);
            machine.registers.write(dr, value);
            machine.update_flags(dr);
        }

        // STI - store indirect.
        Instruction::Sti(sr, pc_offset) => {
            let pointer = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            let address = machine.read(pointer);
            machine.write(address, machine.registers.read(sr));
        }

        // JMP - includes RET as the BaseR=R7 special case.
        Instruction::Jmp(base_r) => {
            machine.pc = machine.registers.read(base_r);
        }

        Instruction::Reserved => {
            return Err(VmError::IllegalInstruction {
                opcode: 0b1101,
                pc: at,
            });
        }

        // LEA - load effective address, no memory access.
        Instruction::Lea(dr, pc_offset) => {
            let address = machine.pc.wrapping_add(pc_offset.sign_extend(9));
            machine.registers.write(dr, address);
        }

        Instruction::Trap(Ok(trap_vector)) => {
            machine.registers.write(Register::R7, machine.pc);
            execute_trap(machine, trap_vector)?;
        }
        Instruction::Trap(Err(vector)) => {
            return Err(VmError::UnknownTrap { vector, pc: at });
        }
    }

    Ok(())
}

fn execute_trap(machine: &mut Machine, trap_vector: TrapVector) -> Result<(), VmError> {
    log::debug!("trap {:?}", trap_vector);

    match trap_vector {
        // GETC - read one character, no echo, clear the high byte.
        TrapVector::Getc => {
            let byte = machine.terminal.read_char()?;
            machine.registers.write(Register::R0, u16::from(byte));
            machine.update_flags(Register::R0);
        }

        // OUT - write R0's low byte and flush.
        TrapVector::Out => {
            let byte = (machine.registers.read(Register::R0) & 0xFF) as u8;
            machine.terminal.write_char(byte)?;
            machine.terminal.flush()?;
        }

        // PUTS - one character per word, NUL-terminated.
        TrapVector::Puts => {
            let mut address = machine.registers.read(Register::R0);
            loop {
                let word = machine.read(address);
                if word == 0 {
                    break;
                }
                machine.terminal.write_char((word & 0xFF) as u8)?;
                address = address.wrapping_add(1);
            }
            machine.terminal.flush()?;
        }

        // IN - prompt, read and echo one character.
        TrapVector::In => {
            for &byte in b"Enter a character: " {
                machine.terminal.write_char(byte)?;
            }
            machine.terminal.flush()?;

            let byte = machine.terminal.read_char()?;
            machine.terminal.write_char(byte)?;
            machine.terminal.flush()?;

            machine.registers.write(Register::R0, u16::from(byte));
            machine.update_flags(Register::R0);
        }

        // PUTSP - two characters per word, low byte first. A terminating
        // word with a nonzero low byte and zero high byte still emits that
        // low byte before stopping.
        TrapVector::Putsp => {
            let mut address = machine.registers.read(Register::R0);
            loop {
                let word = machine.read(address);
                if word == 0 {
                    break;
                }

                let low = (word & 0xFF) as u8;
                machine.terminal.write_char(low)?;

                let high = (word >> 8) as u8;
                if high == 0 {
                    break;
                }
                machine.terminal.write_char(high)?;

                address = address.wrapping_add(1);
            }
            machine.terminal.flush()?;
        }

        // HALT - print the banner and stop the run loop.
        TrapVector::Halt => {
            for &byte in b"HALT\n" {
                machine.terminal.write_char(byte)?;
            }
            machine.terminal.flush()?;
            machine.running = false;
            log::info!("halted");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Condition;
    use crate::machine::{ConditionCode, Machine, PC_START};
    use crate::terminal::test_support::FakeTerminal;

    fn new_machine() -> Machine {
        Machine::new(Box::new(FakeTerminal::default()))
    }

    fn output_of(machine: &Machine) -> &[u8] {
        &machine
            .terminal
            .as_any()
            .downcast_ref::<FakeTerminal>()
            .unwrap()
            .output
    }

    #[test]
    fn add_immediate_sets_positive_flag() {
        let mut machine = new_machine();
        machine.registers.write(Register::R1, 0);

        execute(&mut machine, Instruction::AddImm(Register::R1, Register::R1, 1), PC_START)
            .unwrap();

        assert_eq!(machine.registers.read(Register::R1), 1);
        assert_eq!(machine.condition, ConditionCode::Pos);
    }

    #[test]
    fn add_immediate_negative_one_wraps_to_zero() {
        let mut machine = new_machine();
        machine.registers.write(Register::R1, 1);

        execute(
            &mut machine,
            Instruction::AddImm(Register::R1, Register::R1, 0xFFFF),
            PC_START,
        )
        .unwrap();

        assert_eq!(machine.registers.read(Register::R1), 0);
        assert_eq!(machine.condition, ConditionCode::Zro);
    }

    #[test]
    fn and_immediate_then_not_yields_all_ones_negative() {
        let mut machine = new_machine();
        machine.registers.write(Register::R2, 0x1234);

        execute(&mut machine, Instruction::AndImm(Register::R2, Register::R2, 0), PC_START)
            .unwrap();
        execute(&mut machine, Instruction::Not(Register::R2, Register::R2), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R2), 0xFFFF);
        assert_eq!(machine.condition, ConditionCode::Neg);
    }

    #[test]
    fn not_is_idempotent_over_two_applications() {
        let mut machine = new_machine();
        machine.registers.write(Register::R2, 0x00AA);

        execute(&mut machine, Instruction::Not(Register::R2, Register::R2), PC_START).unwrap();
        execute(&mut machine, Instruction::Not(Register::R2, Register::R2), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R2), 0x00AA);
        assert_eq!(machine.condition, ConditionCode::Pos);
    }

    #[test]
    fn br_branches_backward_when_flag_matches() {
        let mut machine = new_machine();
        machine.pc = PC_START;
        machine.condition = ConditionCode::Zro;

        let condition = Condition {
            n: true,
            z: true,
            p: true,
        };
        execute(&mut machine, Instruction::Br(condition, 0x1FF /* -1 */), PC_START).unwrap();

        assert_eq!(machine.pc, PC_START.wrapping_sub(1));
    }

    #[test]
    fn br_does_not_branch_when_no_flag_matches() {
        let mut machine = new_machine();
        machine.pc = PC_START;
        machine.condition = ConditionCode::Zro;

        let condition = Condition {
            n: true,
            z: false,
            p: true,
        };
        execute(&mut machine, Instruction::Br(condition, 5), PC_START).unwrap();

        assert_eq!(machine.pc, PC_START);
    }

    #[test]
    fn ldi_chases_the_pointer() {
        let mut machine = new_machine();
        machine.pc = PC_START;
        machine.write(PC_START.wrapping_add(1), 0x4000);
        machine.write(0x4000, 42);

        execute(&mut machine, Instruction::Ldi(Register::R0, 1), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R0), 42);
        assert_eq!(machine.condition, ConditionCode::Pos);
    }

    #[test]
    fn jsr_saves_linkage_and_jumps_pc_relative() {
        let mut machine = new_machine();
        machine.pc = PC_START.wrapping_add(1);

        execute(&mut machine, Instruction::Jsr(3), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R7), PC_START.wrapping_add(1));
        assert_eq!(machine.pc, PC_START.wrapping_add(4));
    }

    #[test]
    fn jsrr_saves_linkage_and_jumps_to_base_register() {
        let mut machine = new_machine();
        machine.pc = PC_START.wrapping_add(1);
        machine.registers.write(Register::R3, 0x5000);

        execute(&mut machine, Instruction::Jsrr(Register::R3), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R7), PC_START.wrapping_add(1));
        assert_eq!(machine.pc, 0x5000);
    }

    #[test]
    fn jmp_ret_uses_r7() {
        let mut machine = new_machine();
        machine.registers.write(Register::R7, 0x9999);

        execute(&mut machine, Instruction::Jmp(Register::R7), PC_START).unwrap();

        assert_eq!(machine.pc, 0x9999);
    }

    #[test]
    fn rti_is_fatal() {
        let mut machine = new_machine();
        let err = execute(&mut machine, Instruction::Rti, PC_START).unwrap_err();
        assert!(matches!(err, VmError::IllegalInstruction { opcode: 0b1000, .. }));
    }

    #[test]
    fn reserved_is_fatal() {
        let mut machine = new_machine();
        let err = execute(&mut machine, Instruction::Reserved, PC_START).unwrap_err();
        assert!(matches!(err, VmError::IllegalInstruction { opcode: 0b1101, .. }));
    }

    #[test]
    fn unknown_trap_is_fatal() {
        let mut machine = new_machine();
        let err = execute(&mut machine, Instruction::Trap(Err(0x99)), PC_START).unwrap_err();
        assert!(matches!(err, VmError::UnknownTrap { vector: 0x99, .. }));
    }

    #[test]
    fn halt_clears_running_and_prints_banner() {
        let mut machine = new_machine();
        execute(&mut machine, Instruction::Trap(Ok(TrapVector::Halt)), PC_START).unwrap();

        assert!(!machine.running);
        assert_eq!(output_of(&machine), b"HALT\n");
    }

    #[test]
    fn puts_stops_at_nul_word() {
        let mut machine = new_machine();
        machine.registers.write(Register::R0, 0x4000);
        machine.write(0x4000, u16::from(b'H'));
        machine.write(0x4001, u16::from(b'i'));
        machine.write(0x4002, 0);

        execute(&mut machine, Instruction::Trap(Ok(TrapVector::Puts)), PC_START).unwrap();

        assert_eq!(output_of(&machine), b"Hi");
    }

    #[test]
    fn putsp_emits_two_chars_per_word() {
        let mut machine = new_machine();
        machine.registers.write(Register::R0, 0x4000);
        machine.write(0x4000, u16::from_le_bytes([b'H', b'i']));
        machine.write(0x4001, 0);

        execute(&mut machine, Instruction::Trap(Ok(TrapVector::Putsp)), PC_START).unwrap();

        assert_eq!(output_of(&machine), b"Hi");
    }

    #[test]
    fn putsp_stops_after_lone_low_byte_in_terminating_word() {
        let mut machine = new_machine();
        machine.registers.write(Register::R0, 0x4000);
        // low byte 'Z', high byte 0: emit 'Z', then stop without a null word.
        machine.write(0x4000, u16::from(b'Z'));

        execute(&mut machine, Instruction::Trap(Ok(TrapVector::Putsp)), PC_START).unwrap();

        assert_eq!(output_of(&machine), b"Z");
    }

    #[test]
    fn getc_reads_without_echo() {
        let mut machine = Machine::new(Box::new(FakeTerminal::with_input(b"q")));

        execute(&mut machine, Instruction::Trap(Ok(TrapVector::Getc)), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R0), u16::from(b'q'));
        assert!(output_of(&machine).is_empty());
    }

    #[test]
    fn in_prompts_and_echoes() {
        let mut machine = Machine::new(Box::new(FakeTerminal::with_input(b"q")));

        execute(&mut machine, Instruction::Trap(Ok(TrapVector::In)), PC_START).unwrap();

        assert_eq!(machine.registers.read(Register::R0), u16::from(b'q'));
        assert_eq!(output_of(&machine), [b"Enter a character: ".as_ref(), b"q"].concat());
    }
}
