use std::io;

use jit::{
    CallingConvention, Complex, CompiledUnit, Interpreted, Kernel, Program, Register,
    RegisterFile, VmError, compile, listing, native_jit_supported,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(Debug, Clone, PartialEq)]
struct CliConfig {
    program: Option<String>,
    assignments: Vec<(Register, Complex)>,
    steps: u32,
    dump: bool,
    repl: bool,
    help: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: None,
            assignments: Vec::new(),
            steps: 1,
            dump: false,
            repl: false,
            help: false,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli_args(&args).map_err(io::Error::other)?;
    if cli.help {
        print_usage();
        return Ok(());
    }
    if cli.repl {
        return run_repl(&cli.assignments);
    }

    let text = cli
        .program
        .as_deref()
        .ok_or_else(|| io::Error::other("missing program text (see --help)"))?;
    let program = Program::parse(text)?;

    if cli.dump {
        print_listing(&program)?;
    }

    let mut initial = RegisterFile::new();
    for (register, value) in &cli.assignments {
        initial[*register] = *value;
    }

    let mut interpreted = initial;
    let kernel = Interpreted::new(program.clone());
    for _ in 0..cli.steps {
        kernel.step(&mut interpreted);
    }
    println!("interpreted after {} step(s):", cli.steps);
    print_registers(&interpreted);

    if !native_jit_supported() {
        println!("native: unavailable on this host");
        return Ok(());
    }
    let unit = compile(&program)?;
    let mut native = initial;
    for _ in 0..cli.steps {
        unit.call(&mut native);
    }
    println!("native after {} step(s):", cli.steps);
    print_registers(&native);
    if interpreted.bit_identical(&native) {
        println!("parity: bit-identical");
        Ok(())
    } else {
        Err(io::Error::other("parity: interpreted and native results differ").into())
    }
}

fn parse_cli_args(args: &[String]) -> Result<CliConfig, String> {
    let mut cfg = CliConfig::default();
    let mut index = 0usize;

    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                cfg.help = true;
                index += 1;
            }
            "--dump" => {
                cfg.dump = true;
                index += 1;
            }
            "--repl" => {
                cfg.repl = true;
                index += 1;
            }
            "--set" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --set".to_string())?;
                cfg.assignments.push(parse_assignment(raw)?);
                index += 2;
            }
            "--steps" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --steps".to_string())?;
                cfg.steps = raw
                    .parse::<u32>()
                    .map_err(|_| format!("invalid --steps value '{raw}'"))?;
                index += 2;
            }
            value if value.starts_with('-') && value.len() > 1 => {
                return Err(format!("unknown flag '{value}'"));
            }
            text => {
                if cfg.program.is_some() {
                    return Err("multiple programs provided".to_string());
                }
                cfg.program = Some(text.to_string());
                index += 1;
            }
        }
    }

    Ok(cfg)
}

/// `b=0.5,-0.25`
fn parse_assignment(raw: &str) -> Result<(Register, Complex), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected REG=RE,IM, got '{raw}'"))?;
    let register = match name.trim().as_bytes() {
        [byte] => Register::from_name(*byte),
        _ => None,
    }
    .ok_or_else(|| format!("unknown register '{name}'"))?;
    let (re, im) = value
        .split_once(',')
        .ok_or_else(|| format!("expected RE,IM, got '{value}'"))?;
    let re = re
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid real part '{re}'"))?;
    let im = im
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid imaginary part '{im}'"))?;
    Ok((register, Complex::new(re, im)))
}

fn print_usage() {
    println!("Usage:");
    println!("  mandel-jit-run [--set REG=RE,IM]... [--steps N] [--dump] <program>");
    println!("  mandel-jit-run --repl [--set REG=RE,IM]...");
    println!();
    println!("Programs are flat OP SRC DST triples, e.g. '*bb+ab'.");
    println!("  OP:  '=' assign, '+' add, '*' multiply");
    println!("  REG: a, b, c, d");
}

fn print_registers(registers: &RegisterFile) {
    for register in Register::all() {
        let value = registers[register];
        println!("  {register} = ({:?}, {:?})", value.re, value.im);
    }
}

fn print_listing(program: &Program) -> Result<(), VmError> {
    let convention = CallingConvention::host();
    println!("machine code ({convention:?}):");
    for line in listing(program, convention)? {
        let hex = line
            .bytes
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {:04x}  {:<6} {hex}", line.offset, line.label);
    }
    Ok(())
}

fn run_repl(assignments: &[(Register, Complex)]) -> Result<(), Box<dyn std::error::Error>> {
    println!("mandel-jit REPL");
    println!("history: up/down arrows, commands: .help, .regs, .reset, .set REG=RE,IM, .quit");
    println!("state: registers persist across entries");
    let mut editor = DefaultEditor::new()?;
    let mut session = ReplSession::new(assignments);
    loop {
        match editor.readline("mandel> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line.starts_with('.') {
                    if session.handle_command(line) == ReplAction::Break {
                        break;
                    }
                    continue;
                }
                if let Err(err) = session.run(line) {
                    println!("{err}");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("bye");
                break;
            }
            Err(err) => {
                return Err(Box::new(io::Error::other(err.to_string())));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReplAction {
    Continue,
    Break,
}

struct ReplSession {
    initial: RegisterFile,
    registers: RegisterFile,
    last_compiled: Option<CompiledUnit>,
}

impl ReplSession {
    fn new(assignments: &[(Register, Complex)]) -> Self {
        let mut initial = RegisterFile::new();
        for (register, value) in assignments {
            initial[*register] = *value;
        }
        Self {
            initial,
            registers: initial,
            last_compiled: None,
        }
    }

    fn handle_command(&mut self, line: &str) -> ReplAction {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            ".quit" | ".exit" => return ReplAction::Break,
            ".help" => {
                println!(".regs              show registers");
                println!(".reset             restore the initial registers");
                println!(".set REG=RE,IM     assign a register");
                println!(".quit              leave the REPL");
                println!("anything else is compiled and run for one step");
            }
            ".regs" => print_registers(&self.registers),
            ".reset" => {
                self.registers = self.initial;
                print_registers(&self.registers);
            }
            ".set" => match parse_assignment(rest) {
                Ok((register, value)) => {
                    self.registers[register] = value;
                    print_registers(&self.registers);
                }
                Err(err) => println!("{err}"),
            },
            other => println!("unknown command '{other}', try .help"),
        }
        ReplAction::Continue
    }

    fn run(&mut self, text: &str) -> Result<(), VmError> {
        let program = Program::parse(text)?;
        let mut expected = self.registers;
        Interpreted::new(program.clone()).step(&mut expected);

        if native_jit_supported() {
            let reuse = self
                .last_compiled
                .as_ref()
                .is_some_and(|unit| unit.program() == &program);
            if !reuse {
                self.last_compiled = Some(compile(&program)?);
            }
            if let Some(unit) = &self.last_compiled {
                unit.call(&mut self.registers);
            }
            if !self.registers.bit_identical(&expected) {
                println!("warning: native result differs from the interpreter");
            }
        } else {
            self.registers = expected;
        }
        print_registers(&self.registers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_assignment, parse_cli_args};
    use jit::{Complex, Register};

    fn s(value: &str) -> String {
        value.to_string()
    }

    #[test]
    fn parse_cli_defaults() {
        let cfg = parse_cli_args(&[]).expect("parse should succeed");
        assert!(cfg.program.is_none());
        assert!(cfg.assignments.is_empty());
        assert_eq!(cfg.steps, 1);
        assert!(!cfg.dump);
        assert!(!cfg.repl);
    }

    #[test]
    fn parse_cli_program_with_registers() {
        let cfg = parse_cli_args(&[
            s("--set"),
            s("a=1,0"),
            s("--set"),
            s("b=0.5,0.5"),
            s("--steps"),
            s("3"),
            s("--dump"),
            s("*bb+ab"),
        ])
        .expect("parse should succeed");
        assert_eq!(cfg.program.as_deref(), Some("*bb+ab"));
        assert_eq!(
            cfg.assignments,
            vec![
                (Register::A, Complex::new(1.0, 0.0)),
                (Register::B, Complex::new(0.5, 0.5)),
            ]
        );
        assert_eq!(cfg.steps, 3);
        assert!(cfg.dump);
    }

    #[test]
    fn parse_cli_rejects_multiple_programs() {
        let err = parse_cli_args(&[s("=aa"), s("=bb")]).expect_err("parse should fail");
        assert!(err.contains("multiple programs"));
    }

    #[test]
    fn parse_cli_rejects_unknown_flag() {
        let err = parse_cli_args(&[s("--fast")]).expect_err("parse should fail");
        assert!(err.contains("--fast"));
    }

    #[test]
    fn parse_assignment_rejects_bad_register() {
        assert!(parse_assignment("e=1,1").is_err());
        assert!(parse_assignment("ab=1,1").is_err());
        assert!(parse_assignment("a=1").is_err());
        assert_eq!(
            parse_assignment("d = -2.5, 0.25"),
            Ok((Register::D, Complex::new(-2.5, 0.25)))
        );
    }
}
