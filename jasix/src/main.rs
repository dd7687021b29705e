extern crate clap;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use libcompression::CompressionType;
use libjasix::jasix::index_path;
use libjasix::prelude::*;

#[derive(Parser)]
#[clap(arg_required_else_help = true)]
#[clap(name = "jasix")]
#[clap(about = "Random access into block compressed annotation json and tabix indexed VCF files", long_about = None)]
#[clap(version)]
struct Cli {
    /// YAML file with index build parameters
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates <input>.jsi for a BGZF compressed annotation json file
    Index {
        input: PathBuf,
        /// Block compress the index: zstd, zlib or none
        #[clap(long, value_parser = parse_compression)]
        compress: Option<CompressionType>,
    },
    /// Prints the json records overlapping each region
    Query {
        input: PathBuf,
        /// chr, chr:pos or chr:start-end
        #[clap(short, long = "query")]
        queries: Vec<String>,
        /// Index file, <input>.jsi when not given
        #[clap(short, long)]
        index: Option<PathBuf>,
        #[clap(long)]
        header_only: bool,
        /// Lists the indexed chromosomes
        #[clap(short, long)]
        list: bool,
        #[clap(long)]
        include_header: bool,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints the virtual offset to read from for a region, or -1
    TabixOffset {
        /// BGZF compressed VCF, indexed at <input>.tbi
        input: PathBuf,
        region: String,
    },
    /// Prints whether any record falls in a region
    TabixHas {
        input: PathBuf,
        region: String,
    },
    /// Prints the build parameters in effect
    Config,
}

fn parse_compression(name: &str) -> std::result::Result<CompressionType, String> {
    match name.to_ascii_lowercase().as_str() {
        "zstd" => Ok(CompressionType::ZSTD),
        "zlib" => Ok(CompressionType::ZLIB),
        "none" => Ok(CompressionType::NONE),
        _ => Err(format!("unknown compression type '{}'", name)),
    }
}

fn main() -> ExitCode {
    sigpipe::reset();
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("jasix: {}", e);
            match e.kind() {
                ErrorKind::Input => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let parameters = match &cli.config {
        Some(path) => Parameters::from_path(path)?,
        None => Parameters::default(),
    };

    match cli.command {
        Commands::Index { input, compress } => index(&input, parameters, compress),
        Commands::Query {
            input,
            queries,
            index,
            header_only,
            list,
            include_header,
            output,
        } => {
            let index = index.unwrap_or_else(|| index_path(&input));
            let writer = output_writer(output.as_deref())?;
            query(
                &input,
                &index,
                &parameters,
                writer,
                &queries,
                header_only,
                list,
                include_header,
            )
        }
        Commands::TabixOffset { input, region } => tabix_offset(&input, &region),
        Commands::TabixHas { input, region } => tabix_has(&input, &region),
        Commands::Config => {
            let yaml = serde_yml::to_string(&parameters)?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn index(input: &Path, parameters: Parameters, compress: Option<CompressionType>) -> Result<()> {
    let output = index_path(input);
    log::info!("Indexing {} into {}", input.display(), output.display());

    let index = IndexCreator::from_path(input, parameters.clone())?.create_index()?;

    match compress {
        Some(compression_type) => {
            let parameters = parameters.with_compression_type(compression_type);
            index.write_to_path(&output, Some(&parameters))
        }
        None => index.write_to_path(&output, None),
    }
}

#[allow(clippy::too_many_arguments)]
fn query<W: Write>(
    input: &Path,
    index: &Path,
    parameters: &Parameters,
    writer: W,
    queries: &[String],
    header_only: bool,
    list: bool,
    include_header: bool,
) -> Result<()> {
    let mut qp = QueryProcessor::open(input, index, parameters, writer)?;

    if header_only {
        qp.print_header_only()?;
    } else if list {
        qp.print_chromosome_list()?;
    } else if queries.is_empty() {
        return Err(Error::Input(
            "nothing to do: give a region with -q, --list or --header-only".to_string(),
        ));
    } else {
        let count = qp.process_query(queries, include_header)?;
        log::info!("{} records matched", count);
    }

    qp.into_writer().flush()?;
    Ok(())
}

fn open_tabix(input: &Path) -> Result<TabixIndex> {
    let mut path = input.as_os_str().to_owned();
    path.push(".tbi");

    let mut index = TabixIndex::from_path(PathBuf::from(path))?;
    index.add_chr_prefix_aliases();
    Ok(index)
}

fn tabix_offset(input: &Path, region: &str) -> Result<()> {
    let index = open_tabix(input)?;
    let region = parse_query(region)?;

    match index.offset_for(&region.chromosome, region.start) {
        Some(offset) => println!("{}", offset),
        None => println!("-1"),
    }
    Ok(())
}

fn tabix_has(input: &Path, region: &str) -> Result<()> {
    let index = open_tabix(input)?;
    let region = parse_query(region)?;

    let mut reader = BgzfReader::from_path(input)?;
    let found = index.has_variants(&mut reader, &region.chromosome, region.start, region.end)?;
    println!("{}", found);
    Ok(())
}
