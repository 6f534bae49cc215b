use anyhow::Context;
use clap::{Parser, Subcommand};
use docmerge::{Config, LogSession, OutputNaming, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    version,
    author,
    about = "Render one document per spreadsheet row",
    long_about = "Render one document per spreadsheet row.\n\n\
    Reads records from the first sheet of a spreadsheet, fills a Word (.docx) or \
    Tera text template with each record and writes the documents into an output \
    directory that is cleared on every run. Rows that fail are logged and written \
    to a failure report for reprocessing.\n\n\
    USAGE EXAMPLES:\n  \
      # Use data.xlsx and template.docx in the current directory\n  \
      docmerge\n\n  \
      # Explicit paths\n  \
      docmerge --input clients.xlsx --template letter.docx --output-dir letters\n\n  \
      # Name files after customer name and contract number\n  \
      docmerge --naming fields --name-field 客户名称 --name-field 合同编号\n\n  \
      # Create sample input to try it out\n  \
      docmerge demo --dir ./demo"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input spreadsheet; the first row holds the field names
    #[arg(short, long, env = "DOCMERGE_INPUT", default_value = "data.xlsx", value_name = "FILE")]
    input: PathBuf,

    /// Document template (.docx, or any Tera text template)
    #[arg(short, long, env = "DOCMERGE_TEMPLATE", default_value = "template.docx", value_name = "FILE")]
    template: PathBuf,

    /// Output directory (cleared at the start of every run)
    #[arg(short, long, env = "DOCMERGE_OUTPUT_DIR", default_value = "output", value_name = "PATH")]
    output_dir: PathBuf,

    /// Directory for daily log files
    #[arg(long, env = "DOCMERGE_LOG_DIR", default_value = "logs", value_name = "PATH")]
    log_dir: PathBuf,

    /// Spreadsheet receiving failed records
    #[arg(long, env = "DOCMERGE_FAILURE_REPORT", default_value = "failures.xlsx", value_name = "FILE")]
    failure_report: PathBuf,

    /// Maximum length of the name part of output files
    #[arg(long, env = "DOCMERGE_MAX_NAME_LEN", default_value_t = docmerge::DEFAULT_MAX_NAME_LEN)]
    max_name_len: usize,

    /// Output file naming policy
    #[arg(long, value_enum, default_value = "positional")]
    naming: CliNaming,

    /// Field used in file names with --naming fields (repeatable, in order)
    #[arg(long = "name-field", value_name = "FIELD")]
    name_fields: Vec<String>,

    /// Output extension override, without the dot (default: template's)
    #[arg(long, value_name = "EXT")]
    ext: Option<String>,

    /// Abort if a template placeholder has no matching column
    #[arg(long)]
    strict: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a sample spreadsheet and Word template
    Demo {
        /// Directory for the sample files
        #[arg(long, default_value = ".", value_name = "PATH")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliNaming {
    /// `<row>_<first column>.<ext>`
    Positional,
    /// Values of --name-field joined with `_`
    Fields,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let session =
        LogSession::new(&cli.log_dir, cli.verbose).context("Failed to initialize logging")?;

    if let Some(Command::Demo { dir }) = &cli.command {
        let files = session
            .scope(|| docmerge::demo::write_demo(dir))
            .context("Failed to write demo files")?;
        println!(
            "Demo files written. Try:\n  docmerge --input {} --template {}",
            files.data.display(),
            files.template.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let naming = match cli.naming {
        CliNaming::Positional => OutputNaming::Positional,
        CliNaming::Fields => OutputNaming::Fields(cli.name_fields),
    };

    let mut builder = Config::builder()
        .input(cli.input)
        .template(cli.template)
        .output_dir(cli.output_dir)
        .log_dir(cli.log_dir)
        .failure_report(cli.failure_report)
        .max_name_len(cli.max_name_len)
        .naming(naming)
        .strict_placeholders(cli.strict);

    if let Some(ext) = cli.ext {
        builder = builder.extension(ext);
    }

    let config = builder.build().context("Failed to build configuration")?;
    let pipeline = Pipeline::new(config).context("Failed to create pipeline")?;

    // Errors are logged by the pipeline itself.
    let status = match session.scope(|| pipeline.run()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    };

    Ok(status)
}
