use arch::model::Model;
use color_print::cprintln;
use indexmap::IndexMap;
use std::io::Write;
use std::process::ExitCode;
use zxasm::options::AssemblerOptions;

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {author}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(author, version, about, help_template = HELP_TEMPLATE)]
struct Args {
    /// Input file
    #[clap(default_value = "main.asm")]
    input: String,

    /// Output file
    #[clap(short, long, default_value = "main.bin")]
    output: String,

    /// Options file (YAML)
    #[clap(short, long)]
    config: Option<String>,

    /// Write the symbol map (YAML)
    #[clap(short, long)]
    symbols: Option<String>,

    /// Dump the emitted bytes
    #[clap(short, long)]
    dump: bool,

    /// Target model: SPECTRUM48, SPECTRUM128, SPECTRUMP3, NEXT
    #[clap(long)]
    model: Option<String>,

    /// Predefined symbols for #ifdef
    #[clap(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Errors reported in a loop before it is aborted
    #[clap(long)]
    max_loop_errors: Option<usize>,

    /// Only names announced with .local are local within a proc
    #[clap(long)]
    explicit_locals: bool,

    /// Address of the first segment when no ORG is given
    #[clap(long, value_parser = parse_address)]
    start: Option<u16>,
}

fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix('#'))
        .or_else(|| text.strip_prefix('$'))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{text}': {e}"))
}

impl Args {
    fn options(&self) -> Result<AssemblerOptions, String> {
        let mut options = match &self.config {
            Some(path) => AssemblerOptions::from_yaml_file(path).map_err(|e| e.to_string())?,
            None => AssemblerOptions::default(),
        };
        if let Some(model) = &self.model {
            options.current_model = Some(Model::parse(model)?);
        }
        options.predefined_symbols.extend(self.defines.iter().cloned());
        if let Some(max) = self.max_loop_errors {
            options.max_loop_errors_to_report = max;
        }
        options.proc_explicit_locals_only |= self.explicit_locals;
        if let Some(start) = self.start {
            options.default_start_address = start;
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    use clap::Parser;

    zxasm::init_tracing();
    let args: Args = Args::parse();
    println!("ZX Spectrum Z80 Assembler");

    println!("1. Load Options");
    let options = match args.options() {
        Ok(options) => options,
        Err(e) => {
            cprintln!("<r,s>Invalid options</>: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("2. Assemble");
    println!("  < {}", args.input);
    let output = zxasm::compile_file(&args.input, &options);
    for line in &output.trace_output {
        cprintln!("  <cyan>trace</>: {}", line);
    }
    if output.error_count() > 0 {
        let sources = output
            .source_files
            .iter()
            .map(|name| {
                let lines = std::fs::read_to_string(name)
                    .map(|code| code.lines().map(String::from).collect::<Vec<_>>())
                    .unwrap_or_default();
                (name.clone(), lines)
            })
            .collect::<IndexMap<String, Vec<String>>>();
        for error in &output.errors {
            error.print_diag(&sources);
        }
        cprintln!("<r,s>{} error(s)</>", output.error_count());
        return ExitCode::FAILURE;
    }

    println!("3. Write Binary");
    println!("  > {}", args.output);
    let written = std::fs::File::create(&args.output).and_then(|mut file| file.write_all(&output.bytes()));
    if let Err(e) = written {
        cprintln!("<r,s>Failed to write File</>: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(path) = &args.symbols {
        println!("4. Write Symbol Map");
        println!("  > {}", path);
        if let Err(e) = std::fs::write(path, output.symbol_map().to_yaml()) {
            cprintln!("<r,s>Failed to write File</>: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if args.dump {
        for line in output.listing() {
            println!("{}", line);
        }
        println!("-------------------+-----------------------------------------------------");
    }
    ExitCode::SUCCESS
}
