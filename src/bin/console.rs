//! A line-oriented debug console: loads a machine profile, builds the
//! machine, then drops into a loop that prints the register file and the
//! next instruction before reading one command per line. `n`/`s` steps,
//! `c` runs freely until the next `pause`, anything from [`pocket2e::debug`]'s
//! command set is otherwise accepted verbatim.

use std::io::{self, Write};

use pocket2e::builder::build_machine;
use pocket2e::debug::{self, DebugCommand, DebugResponse};
use pocket2e::profile::{NoEmbeddedResources, Profile, ResourceContext};
use termion::{clear, cursor};

fn main() {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: console <profile.json>");
            std::process::exit(1);
        }
    };

    let profile = match Profile::load(&path) {
        Ok(profile) => profile,
        Err(err) => {
            eprintln!("failed to load profile: {err}");
            std::process::exit(1);
        }
    };

    let mut ctx = ResourceContext::default();
    ctx.profile_dir = std::path::Path::new(&path).parent().map(|p| p.to_path_buf());

    let embedded = NoEmbeddedResources;
    let mut machine = match build_machine(&profile, &ctx, &embedded) {
        Ok(machine) => machine,
        Err(err) => {
            eprintln!("failed to build machine '{}': {err}", profile.name);
            std::process::exit(1);
        }
    };
    machine.reset();

    loop {
        draw(&mut machine);
        let line = match read_line() {
            Some(line) => line,
            None => break,
        };
        if line.trim() == "q" || line.trim() == "quit" {
            break;
        }
        let command = match line.trim() {
            "n" | "s" => DebugCommand::Step,
            "c" => DebugCommand::Run,
            "" => DebugCommand::Regs,
            other => match debug::parse(other) {
                Ok(command) => command,
                Err(message) => {
                    println!("{message}");
                    continue;
                }
            },
        };
        print_response(machine.execute_debug_command(command));
    }
}

fn draw(machine: &mut pocket2e::machine::Machine) {
    print!("{}{}", clear::All, cursor::Goto(1, 1));
    let DebugResponse::Registers(regs) = machine.execute_debug_command(DebugCommand::Regs) else { unreachable!() };
    println!(
        "{} A={:02x} X={:02x} Y={:02x} SP={:02x} PC={:04x} P={:02x} cycles={}",
        machine.name, regs.a, regs.x, regs.y, regs.sp, regs.pc, regs.p, regs.cycles
    );
    if let DebugResponse::Disassembly(lines) = machine.execute_debug_command(DebugCommand::Dasm(regs.pc as u32, 1)) {
        if let Some(line) = lines.first() {
            println!("next: {:04x}  {}", line.addr, line.text);
        }
    }
    print!("> ");
    io::stdout().flush().expect("stdout flush");
}

fn read_line() -> Option<String> {
    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) => None,
        Ok(_) => Some(input),
        Err(_) => None,
    }
}

fn print_response(response: DebugResponse) {
    match response {
        DebugResponse::Ok => {}
        DebugResponse::Registers(regs) => println!("{regs:?}"),
        DebugResponse::Byte(value) => println!("{value:02x}"),
        DebugResponse::Bytes(bytes) => {
            for chunk in bytes.chunks(16) {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                println!("{}", hex.join(" "));
            }
        }
        DebugResponse::Pages(pages) => {
            for page in pages.iter().filter(|p| p.region.is_some()) {
                println!("page {:04x}: {} {:?} {:?} faults={}", page.page, page.region.as_deref().unwrap_or("-"), page.tag, page.perms, page.fault_count);
            }
        }
        DebugResponse::Switches(switches) => {
            for switch in switches {
                println!("{}: active={}", switch.name, switch.active);
            }
        }
        DebugResponse::Faults(faults) => {
            for record in faults {
                println!("cycle {}: {}", record.cycle, record.fault);
            }
        }
        DebugResponse::Disassembly(lines) => {
            for line in lines {
                let bytes: Vec<String> = line.bytes.iter().map(|b| format!("{b:02x}")).collect();
                println!("{:04x}  {:<9} {}", line.addr, bytes.join(" "), line.text);
            }
        }
    }
}
