//! Command-line front end for the simulator: loads a program (flat
//! binary or ELF), runs it, and optionally drops into an interactive
//! stepper.
use clap::Parser;
use clap_num::maybe_hex;
use riscvemu::cpu::{Cpu, Halt, StepOutcome};
use riscvemu::loader::{load_elf, load_flat};
use riscvemu::memory::Memory;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Simulate an RV32I program and report the final architectural state.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the input program. Parsed as ELF unless --flat is given.
    input: String,

    /// Treat `input` as a flat sequence of instruction words rather
    /// than an ELF executable.
    #[arg(long)]
    flat: bool,

    /// Address at which the program image is loaded (use 0x for hex).
    #[arg(long, value_parser=maybe_hex::<u32>, default_value = "0")]
    base: u32,

    /// Upper bound on the number of cycles `run` will execute.
    #[arg(long, default_value_t = 10_000)]
    max_cycles: u64,

    /// Size in bytes of the backing memory.
    #[arg(long, default_value_t = 4096)]
    memory_size: usize,

    /// Log each step at trace level (set RUST_LOG=trace to see it).
    #[arg(long)]
    trace: bool,

    /// Drop into an interactive stepper instead of running to completion.
    #[arg(long)]
    interactive: bool,
}

fn print_state(cpu: &Cpu) {
    print!("{cpu}");
}

fn run_to_completion(args: &Args, cpu: &mut Cpu, memory: &mut Memory) {
    match cpu.run(memory, args.max_cycles) {
        Ok(StepOutcome::Halted(Halt::Ecall)) => println!("halted: ecall at pc=0x{:08x}", cpu.pc()),
        Ok(StepOutcome::Halted(Halt::Ebreak)) => {
            println!("halted: ebreak at pc=0x{:08x}", cpu.pc())
        }
        Ok(StepOutcome::Continued) => println!("stopped after {} cycles", cpu.cycle()),
        Err(e) => {
            eprintln!("fatal: {e} at pc=0x{:08x}", cpu.pc());
            std::process::exit(1);
        }
    }
    print_state(cpu);
}

/// Line-oriented stepper REPL: `step`, `run N`, `regs`, `mem <addr> <len>`, `quit`.
fn interactive(cpu: &mut Cpu, memory: &mut Memory) {
    let mut editor = DefaultEditor::new().expect("failed to initialize line editor");
    println!("interactive mode; type 'help' for commands");
    loop {
        let line = match editor.readline("(riscvemu) ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        };
        let _ = editor.add_history_entry(line.as_str());
        let mut words = line.split_whitespace();
        match words.next() {
            Some("step") | Some("s") => match cpu.step(memory) {
                Ok(outcome) => println!("{outcome:?} at pc=0x{:08x}", cpu.pc()),
                Err(e) => println!("error: {e}"),
            },
            Some("run") => {
                let n = words.next().and_then(|s| s.parse().ok()).unwrap_or(1);
                match cpu.run(memory, n) {
                    Ok(outcome) => println!("{outcome:?} at pc=0x{:08x}", cpu.pc()),
                    Err(e) => println!("error: {e}"),
                }
            }
            Some("regs") => print_state(cpu),
            Some("mem") => {
                let addr = words.next().and_then(|s| s.parse::<u32>().ok());
                let len = words.next().and_then(|s| s.parse::<usize>().ok());
                match (addr, len) {
                    (Some(addr), Some(len)) => match memory.read(addr, len) {
                        Ok(bytes) => println!("{bytes:02x?}"),
                        Err(e) => println!("error: {e}"),
                    },
                    _ => println!("usage: mem <addr> <len>"),
                }
            }
            Some("help") => {
                println!("commands: step, run [n], regs, mem <addr> <len>, quit")
            }
            Some("quit") | Some("q") => break,
            Some(other) => println!("unknown command: {other}"),
            None => {}
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut memory = Memory::new(args.memory_size);
    let load_result = if args.flat {
        std::fs::read(&args.input)
            .map_err(|source| riscvemu::loader::LoadError::Io {
                path: args.input.clone(),
                source,
            })
            .and_then(|bytes| load_flat(&mut memory, &bytes, args.base))
    } else {
        load_elf(&mut memory, &args.input, args.base)
    };
    if let Err(e) = load_result {
        eprintln!("failed to load {}: {e}", args.input);
        std::process::exit(1);
    }

    let mut cpu = Cpu::new(args.base);
    if args.trace {
        log::set_max_level(log::LevelFilter::Trace);
    }

    if args.interactive {
        interactive(&mut cpu, &mut memory);
    } else {
        run_to_completion(&args, &mut cpu, &mut memory);
    }
}
