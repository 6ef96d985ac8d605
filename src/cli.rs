use crate::{input, Instruction, Interpreter, Quirks, PROGRAM_START};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{fmt, fs, io::Write, thread};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity of debug logging
    #[arg(short, long, value_enum, global = true)]
    debug: Option<DebugMode>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a ROM without a window and print the final screen
    Run(RunArgs),
    /// Write a listing of every instruction in a ROM
    Disassemble {
        /// The path to the ROM
        path: PathBuf,

        /// Where to output the disassembled ROM
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// The path to the ROM
    pub path: PathBuf,

    /// Interpreter whose behaviour to reproduce
    #[arg(short, long, value_enum, default_value_t = Mode::Chip8)]
    pub mode: Mode,

    /// Enable a compatibility quirk on top of the mode
    #[arg(long = "quirk", value_enum)]
    pub quirks: Vec<QuirkArg>,

    /// Disable a compatibility quirk of the mode
    #[arg(long = "no-quirk", value_enum)]
    pub no_quirks: Vec<QuirkArg>,

    /// Number of instructions to execute
    #[arg(short, long, default_value_t = 2_000)]
    pub steps: u64,

    /// Instructions per second
    #[arg(long, default_value_t = 700)]
    pub ips: u32,

    /// Seed for the random number generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keys held for the whole run, on the QWERTY layout (e.g. "qe")
    #[arg(long, default_value = "")]
    pub hold: String,
}

impl RunArgs {
    pub fn quirks(&self) -> Quirks {
        let mut quirks = Quirks::from(self.mode);
        for &quirk in &self.quirks {
            quirks.insert(quirk.into());
        }
        for &quirk in &self.no_quirks {
            quirks.remove(quirk.into());
        }
        quirks
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Mode {
    Chip8,
    Schip,
    Xochip,
}

impl From<Mode> for Quirks {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Chip8 => Quirks::CHIP8,
            Mode::Schip => Quirks::SCHIP,
            Mode::Xochip => Quirks::XOCHIP,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum QuirkArg {
    Shift,
    StoreLoad,
    JumpOffset,
    Logical,
    DisplaySync,
    DrawClip,
}

impl From<QuirkArg> for Quirks {
    fn from(quirk: QuirkArg) -> Self {
        match quirk {
            QuirkArg::Shift => Quirks::SHIFT,
            QuirkArg::StoreLoad => Quirks::STORE_LOAD,
            QuirkArg::JumpOffset => Quirks::JUMP_OFFSET,
            QuirkArg::Logical => Quirks::LOGICAL,
            QuirkArg::DisplaySync => Quirks::DISPLAY_SYNC,
            QuirkArg::DrawClip => Quirks::DRAW_CLIP,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum DebugMode {
    Info,
    Debug,
    Trace,
    Error,
}

impl fmt::Display for DebugMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Error => "error",
        };
        write!(f, "{level}")
    }
}

pub fn init() -> Cli {
    let cli = Cli::parse();
    std::env::set_var(
        "RUST_LOG",
        format!("quirk8={}", cli.debug.unwrap_or(DebugMode::Error)),
    );

    env_logger::init();

    cli
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let rom = fs::read(&args.path)?;
    let quirks = args.quirks();
    let mut interpreter = match args.seed {
        Some(seed) => Interpreter::with_seed(quirks, seed),
        None => Interpreter::new(quirks),
    };
    interpreter.load_program(&rom)?;
    info!(
        "Running {} [quirks: {:?}] [steps: {}]",
        args.path.display(),
        quirks,
        args.steps
    );

    let keys = input::held(&args.hold)?;
    let period = Duration::from_secs(1) / args.ips.max(1);
    for _ in 0..args.steps {
        let started = Instant::now();
        interpreter.step(keys)?;
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    print!("{}", interpreter.display());
    let timers = interpreter.timers();
    println!(
        "pc: {:#06X} delay: {} sound: {}",
        interpreter.registers().pc,
        timers.delay,
        timers.sound
    );

    Ok(())
}

/// One line per instruction word: address, opcode and mnemonic.
pub fn listing(rom: &[u8]) -> Vec<String> {
    rom.chunks_exact(2)
        .enumerate()
        .map(|(n, word)| {
            let inst = Instruction::from(u16::from_be_bytes([word[0], word[1]]));
            format!(
                "{:04X}  {:?}  {}",
                PROGRAM_START + n * 2,
                inst,
                inst.mnemonic().unwrap_or("???")
            )
        })
        .collect()
}

pub fn disassemble(path: &Path, output_file: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    if let Some(mut dir) = output_file.clone() {
        if dir.extension().is_none() {
            return Err(format!("{} is not a file", dir.display()).into());
        }
        dir.pop();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let output = output_file.unwrap_or(PathBuf::from("output.txt"));
    let mut file = fs::File::create(&output)?;
    let rom = fs::read(path)?;

    writeln!(file, "== {} ==", path.display())?;
    for line in listing(&rom) {
        writeln!(file, "{line}")?;
    }

    file.flush()?;

    info!("Wrote disassembled ROM to {}", output.display());

    Ok(())
}
