// External crates
use clap::{Parser, Subcommand};

// Standard library
use std::path::PathBuf;

// Internal crate imports
use driftscan::{execute_compare, execute_keywords};

/*=================================================================
=                                  ARGS                           =
=================================================================*/

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct ArgParser {
    #[clap(subcommand)]
    command: Commands,

    #[arg(long, default_value_t=0)]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Compare {
        #[arg(required=true, long)]
        config: PathBuf,

        #[arg(long, help = "Override the corpus path from the config")]
        corpus: Option<PathBuf>,

        #[arg(long, help = "Override the report output directory from the config")]
        output_dir: Option<PathBuf>,
    },

    Keywords {
        #[arg(required=true, long)]
        config: PathBuf,

        #[arg(long, help = "Override the corpus path from the config")]
        corpus: Option<PathBuf>,

        #[arg(long, help = "Override the report output directory from the config")]
        output_dir: Option<PathBuf>,
    }
}

fn main() {
    let args = ArgParser::parse();
    let threads = args.threads;
    if threads != 0 {
        std::env::set_var("RAYON_NUM_THREADS", threads.to_string());
    }

    let result = match &args.command {
        Commands::Compare {config, corpus, output_dir} => {
            execute_compare(config, corpus.as_ref(), output_dir.as_ref())
        }

        Commands::Keywords {config, corpus, output_dir} => {
            execute_keywords(config, corpus.as_ref(), output_dir.as_ref())
        }
    };
    result.unwrap()
}
