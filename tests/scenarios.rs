//! End-to-end scenarios: assemble a program by hand, run it to the
//! halt-loop convention, assert on final register state. Mirrors the
//! teacher's own assemble-run-assert style in its `examples/emulator.rs`.
use riscvemu::cpu::Cpu;
use riscvemu::memory::Memory;

const HALT: u32 = 0x0000006f; // jal x0, 0

fn run(words: &[u32], max_cycles: u64) -> Cpu {
    let mut memory = Memory::new(4096);
    memory.load_program(words, 0).unwrap();
    let mut cpu = Cpu::new(0);
    cpu.run(&mut memory, max_cycles).unwrap();
    cpu
}

#[test]
fn add() {
    let cpu = run(&[0x00200093, 0x00100113, 0x002081b3, HALT], 10);
    assert_eq!(cpu.registers().read(3), 3);
}

#[test]
fn sub() {
    let cpu = run(&[0x00500093, 0x00200113, 0x402081b3, HALT], 10);
    assert_eq!(cpu.registers().read(3), 3);
}

#[test]
fn or() {
    let cpu = run(&[0x00100093, 0x00200113, 0x0020e1b3, HALT], 10);
    assert_eq!(cpu.registers().read(3), 3);
}

#[test]
fn beq_taken_over_nop() {
    let cpu = run(
        &[
            0x00100093, 0x00100113, 0x00208463, 0x00000013, 0x00300193, HALT,
        ],
        10,
    );
    assert_eq!(cpu.registers().read(3), 3);
}

#[test]
fn addi() {
    let cpu = run(&[0x00100093, 0x00208113, HALT], 10);
    assert_eq!(cpu.registers().read(2), 3);
}

#[test]
fn loop_sum_1_to_10() {
    let cpu = run(
        &[
            0x00000093, 0x00100113, 0x00b00213, 0x002080b3, 0x00110113, 0xfe414ce3, 0x000081b3,
            HALT,
        ],
        100,
    );
    assert_eq!(cpu.registers().read(1), 55);
    assert_eq!(cpu.registers().read(2), 11);
    assert_eq!(cpu.registers().read(3), 55);
}
